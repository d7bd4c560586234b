//! Geometry edits: rotate, crop, resize

use crate::engine::structure::copy_into_new;
use crate::error::Result;
use crate::pdf::document::Document;
use crate::pdf::geometry::{crop_rect, Margins, PageSize};
use crate::pdf::pages::PageSpec;

/// Add `degrees` to the rotation of the selected pages (all when `None`).
pub fn rotate(doc: &mut Document, degrees: i64, pages: Option<&PageSpec>) -> Result<()> {
    if degrees % 90 != 0 {
        tracing::warn!(degrees, "rotation is not a multiple of 90, viewers may ignore it");
    }
    let count = doc.page_count()?;
    let mut indices = match pages {
        Some(spec) => spec.resolve(count)?,
        None => (0..count).collect(),
    };
    // A page listed twice is still rotated once
    indices.sort_unstable();
    indices.dedup();
    for index in indices {
        let stored = doc.set_rotation(index, degrees)?;
        tracing::debug!(page = index + 1, rotation = stored, "rotated page");
    }
    Ok(())
}

/// Set every page's crop box `margins` inside its media box.
///
/// All pages are checked before any is changed, so a page too small for the
/// margins leaves the document untouched.
pub fn crop(doc: &mut Document, margins: Margins) -> Result<()> {
    let boxes = doc
        .pages_info()?
        .iter()
        .map(|info| crop_rect(info.media_box, margins))
        .collect::<Result<Vec<_>>>()?;
    for (index, rect) in boxes.into_iter().enumerate() {
        doc.set_crop_box(index, rect)?;
    }
    Ok(())
}

/// Copy every page into a new document with the media box set to `size`.
///
/// Page content keeps its original coordinates and is not scaled.
pub fn resize(source: &Document, size: PageSize) -> Result<Document> {
    let count = source.page_count()?;
    let indices: Vec<usize> = (0..count).collect();
    let mut target = copy_into_new(source, &indices)?;
    let (width, height) = size.dimensions();
    for index in 0..count {
        target.set_page_size(index, width, height)?;
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::document::document_with_pages;
    use crate::pdf::geometry::Rect;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rotate_all_is_additive() {
        let mut doc = document_with_pages(&[(100.0, 100.0), (200.0, 200.0)]).unwrap();
        rotate(&mut doc, 90, None).unwrap();
        rotate(&mut doc, 270, None).unwrap();
        rotate(&mut doc, -90, None).unwrap();
        let rotations: Vec<u16> = doc.pages_info().unwrap().iter().map(|p| p.rotation).collect();
        assert_eq!(rotations, vec![270, 270]);
    }

    #[test]
    fn test_rotate_selected_pages() {
        let mut doc = document_with_pages(&[(100.0, 100.0), (200.0, 200.0), (300.0, 300.0)]).unwrap();
        rotate(&mut doc, 180, Some(&PageSpec::from("2-z"))).unwrap();
        let rotations: Vec<u16> = doc.pages_info().unwrap().iter().map(|p| p.rotation).collect();
        assert_eq!(rotations, vec![0, 180, 180]);
    }

    #[test]
    fn test_crop_relative_to_media_box() {
        let mut doc = document_with_pages(&[(600.0, 800.0)]).unwrap();
        let margins = Margins {
            top: 10.0,
            right: 20.0,
            bottom: 30.0,
            left: 40.0,
        };
        crop(&mut doc, margins).unwrap();
        let info = doc.page_info(0).unwrap();
        assert_eq!(info.crop_box, Rect::new(40.0, 30.0, 540.0, 760.0));
        assert_eq!(info.media_box, Rect::new(0.0, 0.0, 600.0, 800.0));
    }

    #[test]
    fn test_crop_failure_changes_nothing() {
        let mut doc = document_with_pages(&[(600.0, 800.0), (100.0, 100.0)]).unwrap();
        let err = crop(&mut doc, Margins::uniform(60.0)).unwrap_err();
        assert!(err.is_validation());
        let first = doc.page_info(0).unwrap();
        assert_eq!(first.crop_box, first.media_box);
    }

    #[test]
    fn test_resize_forces_media_box() {
        let mut source = document_with_pages(&[(100.0, 100.0), (900.0, 300.0)]).unwrap();
        source.set_rotation(1, 90).unwrap();
        let out = resize(&source, PageSize::Letter).unwrap();
        let infos = out.pages_info().unwrap();
        assert_eq!(infos.len(), 2);
        for info in &infos {
            assert_eq!((info.width, info.height), (612.0, 792.0));
        }
        assert_eq!(infos[1].rotation, 90);
        // Source is left as it was
        assert_eq!(source.page_info(1).unwrap().width, 900.0);
    }
}
