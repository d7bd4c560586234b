//! Whole-document rewrites: compress, metadata, form flattening

use crate::engine::output::CompressionReport;
use crate::engine::params::MetadataUpdate;
use crate::error::Result;
use crate::pdf::document::{Document, SaveOptions};

/// Re-serialize with object streams and compressed streams.
///
/// `original_size` is the byte length of the input the document was loaded from.
pub fn compress(doc: &Document, original_size: usize) -> Result<(Vec<u8>, CompressionReport)> {
    let bytes = doc.serialize(SaveOptions::compact())?;
    let report = CompressionReport::new(original_size, bytes.len());
    if report.reduction_percent < 0.0 {
        tracing::warn!(
            original = original_size,
            compressed = bytes.len(),
            "compressed output is larger than the input"
        );
    }
    Ok((bytes, report))
}

pub fn edit_metadata(doc: &mut Document, update: &MetadataUpdate) -> Result<()> {
    doc.set_metadata(&update.to_metadata())
}

/// Burn form fields into page content. A document without a form is left as is.
pub fn flatten(doc: &mut Document) -> Result<usize> {
    let drawn = doc.flatten_form()?;
    if drawn == 0 {
        tracing::debug!("no form fields to flatten");
    }
    Ok(drawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::document::document_with_pages;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compress_reports_sizes() {
        let doc = document_with_pages(&[(595.0, 842.0); 20]).unwrap();
        let plain = doc.serialize(SaveOptions::default()).unwrap();
        let (bytes, report) = compress(&doc, plain.len()).unwrap();
        assert_eq!(report.original_size, plain.len());
        assert_eq!(report.compressed_size, bytes.len());
        assert_eq!(Document::load(&bytes).unwrap().page_count().unwrap(), 20);
    }

    #[test]
    fn test_edit_metadata_keeps_unset_fields() {
        let mut doc = document_with_pages(&[(100.0, 100.0)]).unwrap();
        edit_metadata(
            &mut doc,
            &MetadataUpdate {
                title: Some("First".to_string()),
                author: Some("Ann".to_string()),
                ..MetadataUpdate::default()
            },
        )
        .unwrap();
        edit_metadata(
            &mut doc,
            &MetadataUpdate {
                title: Some("Second".to_string()),
                author: Some(String::new()),
                ..MetadataUpdate::default()
            },
        )
        .unwrap();
        let meta = doc.metadata().unwrap();
        assert_eq!(meta.title.as_deref(), Some("Second"));
        assert_eq!(meta.author.as_deref(), Some("Ann"));
    }

    #[test]
    fn test_flatten_without_form() {
        let mut doc = document_with_pages(&[(100.0, 100.0)]).unwrap();
        assert_eq!(flatten(&mut doc).unwrap(), 0);
    }
}
