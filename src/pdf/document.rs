//! Document model adapter over qpdf
//!
//! A [`Document`] owns one qpdf handle. Page indices are zero-based here;
//! conversion from the 1-based external numbering happens in
//! [`crate::pdf::pages::PageSpec::resolve`] only.

use crate::error::{Error, Result};
use crate::pdf::geometry::{normalize_rotation, Rect};
use crate::pdf::objects::{
    as_f64, as_rect, as_text, content_streams, crop_box, dictionary, is_type, map_qpdf_error,
    media_box, new_stream, new_stream_with, num, number, pin_inherited, rect_array, resources,
    rotation, sub_dict, text_string,
};
use crate::pdf::overlay::{ImagePixels, Overlay, OverlayImage};
use qpdf::{
    ObjectStreamMode, QPdf, QPdfArray, QPdfDictionary, QPdfObject, QPdfObjectLike, QPdfObjectType,
    QPdfStream,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How far into the file the `%PDF-` marker may appear
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Per-page geometry as stored in the page tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageInfo {
    /// Media box width in points
    pub width: f64,
    /// Media box height in points
    pub height: f64,
    /// Rotation, always in `0..360`
    pub rotation: u16,
    pub media_box: Rect,
    pub crop_box: Rect,
}

/// Document information dictionary fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
}

impl Metadata {
    fn entries(&self) -> [(&'static str, Option<&String>); 6] {
        [
            ("/Title", self.title.as_ref()),
            ("/Author", self.author.as_ref()),
            ("/Subject", self.subject.as_ref()),
            ("/Keywords", self.keywords.as_ref()),
            ("/Creator", self.creator.as_ref()),
            ("/Producer", self.producer.as_ref()),
        ]
    }
}

/// Serialization options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Generate object streams, compress every stream and drop unreferenced objects
    pub compact: bool,
}

impl SaveOptions {
    pub fn compact() -> Self {
        Self { compact: true }
    }
}

/// A page copied into a target document, not yet placed in its page tree
#[derive(Debug, Clone)]
pub struct Page {
    object: QPdfObject,
}

/// In-memory PDF
pub struct Document {
    qpdf: QPdf,
    /// Image XObjects already embedded, keyed by the overlay image they hold
    embedded_images: Vec<(Arc<OverlayImage>, QPdfObject)>,
    /// Shared `q` / `Q` streams that isolate existing content from overlays
    wrappers: Option<(QPdfObject, QPdfObject)>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("pages", &self.page_count().unwrap_or(0))
            .finish()
    }
}

impl Document {
    /// Parse `bytes`. Encrypted files open when no user password is needed.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
        if !window.windows(5).any(|w| w == b"%PDF-") {
            return Err(Error::CorruptDocument {
                reason: "missing %PDF header".to_string(),
            });
        }
        let qpdf = QPdf::read_from_memory(bytes).map_err(|e| match map_qpdf_error(e) {
            Error::IncorrectPassword => Error::CorruptDocument {
                reason: "document requires a password".to_string(),
            },
            other => Error::CorruptDocument {
                reason: other.to_string(),
            },
        })?;
        let doc = Self::from_qpdf(qpdf);
        // Touch the page tree so structural damage surfaces on load
        doc.qpdf.get_num_pages().map_err(|e| Error::CorruptDocument {
            reason: e.to_string(),
        })?;
        Ok(doc)
    }

    /// Zero-page document for building results
    pub fn create_empty() -> Self {
        Self::from_qpdf(QPdf::empty())
    }

    fn from_qpdf(qpdf: QPdf) -> Self {
        Self {
            qpdf,
            embedded_images: Vec::new(),
            wrappers: None,
        }
    }

    pub fn page_count(&self) -> Result<usize> {
        self.qpdf
            .get_num_pages()
            .map(|n| n as usize)
            .map_err(map_qpdf_error)
    }

    fn page(&self, index: usize) -> Result<QPdfDictionary> {
        let total = self.page_count()?;
        u32::try_from(index)
            .ok()
            .and_then(|i| self.qpdf.get_page(i))
            .ok_or_else(|| {
                Error::validation(format!("page index {} out of range ({} pages)", index, total))
            })
    }

    pub fn page_info(&self, index: usize) -> Result<PageInfo> {
        let page = self.page(index)?;
        let media = media_box(&page);
        Ok(PageInfo {
            width: media.width,
            height: media.height,
            rotation: normalize_rotation(rotation(&page)),
            media_box: media,
            crop_box: crop_box(&page),
        })
    }

    pub fn pages_info(&self) -> Result<Vec<PageInfo>> {
        (0..self.page_count()?).map(|i| self.page_info(i)).collect()
    }

    /// Deep-copy pages of `source` into this document, in the given order.
    ///
    /// Inherited attributes are pinned onto each source page first, so the
    /// copies keep their size and rotation outside the source page tree.
    pub fn copy_pages(&mut self, source: &Document, indices: &[usize]) -> Result<Vec<Page>> {
        let total = source.page_count()?;
        if let Some(bad) = indices.iter().find(|&&i| i >= total) {
            return Err(Error::validation(format!(
                "page index {} out of range ({} pages)",
                bad, total
            )));
        }
        let mut copies = Vec::with_capacity(indices.len());
        for &index in indices {
            let page = source.page(index)?;
            pin_inherited(&source.qpdf, &page);
            copies.push(Page {
                object: self.qpdf.copy_from_foreign(&page),
            });
        }
        Ok(copies)
    }

    /// Append a page at the end of the page tree.
    ///
    /// The same copied page may be appended more than once; qpdf then inserts
    /// a shallow copy so each occurrence is its own page object.
    pub fn append_page(&mut self, page: &Page) -> Result<()> {
        self.qpdf
            .add_page(&page.object, false)
            .map_err(map_qpdf_error)
    }

    /// Append an empty page of the given size.
    pub fn add_blank_page(&mut self, width: f64, height: f64) -> Result<()> {
        let qpdf = &self.qpdf;
        let dict = dictionary(
            qpdf,
            [
                ("/Type", qpdf.new_name("/Page")),
                ("/MediaBox", rect_array(qpdf, &Rect::new(0.0, 0.0, width, height))),
                ("/Resources", qpdf.new_dictionary().into()),
                ("/Contents", new_stream(qpdf, b"").into()),
            ],
        );
        let page = dict.into_indirect();
        qpdf.add_page(&page, false).map_err(map_qpdf_error)
    }

    /// Set the media box to `width x height`, keeping its lower-left corner.
    ///
    /// A crop box that equalled the old media box follows it; any other crop
    /// box is left alone. Rotation and content are untouched.
    pub fn set_page_size(&mut self, index: usize, width: f64, height: f64) -> Result<()> {
        let page = self.page(index)?;
        pin_inherited(&self.qpdf, &page);
        let old_media = media_box(&page);
        let old_crop = page.get("/CropBox").as_ref().and_then(as_rect);
        let new_media = Rect::new(old_media.left, old_media.bottom, width, height);
        page.set("/MediaBox", rect_array(&self.qpdf, &new_media));
        if old_crop == Some(old_media) {
            page.set("/CropBox", rect_array(&self.qpdf, &new_media));
        }
        Ok(())
    }

    /// Add `delta` degrees to the page's rotation, stored mod 360.
    pub fn set_rotation(&mut self, index: usize, delta: i64) -> Result<u16> {
        let page = self.page(index)?;
        let current = rotation(&page);
        let next = normalize_rotation(current + delta);
        if next % 90 != 0 {
            tracing::warn!(page = index + 1, rotation = next, "rotation is not a multiple of 90");
        }
        page.set("/Rotate", number(&self.qpdf, f64::from(next)));
        Ok(next)
    }

    pub fn set_crop_box(&mut self, index: usize, rect: Rect) -> Result<()> {
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return Err(Error::validation(format!(
                "crop box on page {} would be {}x{}",
                index + 1,
                num(rect.width),
                num(rect.height)
            )));
        }
        let page = self.page(index)?;
        page.set("/CropBox", rect_array(&self.qpdf, &rect));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------

    fn info_dict(&self, create: bool) -> Result<Option<QPdfDictionary>> {
        let trailer = match self.qpdf.get_trailer() {
            Some(t) => t,
            None => return Ok(None),
        };
        if let Some(info) = trailer.get("/Info") {
            if is_type(&info, QPdfObjectType::Dictionary) {
                return Ok(Some(info.into()));
            }
        }
        if !create {
            return Ok(None);
        }
        let info = self.qpdf.new_dictionary().into_indirect();
        trailer.set("/Info", &info);
        Ok(Some(info.into()))
    }

    pub fn metadata(&self) -> Result<Metadata> {
        let info = match self.info_dict(false)? {
            Some(info) => info,
            None => return Ok(Metadata::default()),
        };
        let read = |key: &str| info.get(key).as_ref().and_then(as_text);
        Ok(Metadata {
            title: read("/Title"),
            author: read("/Author"),
            subject: read("/Subject"),
            keywords: read("/Keywords"),
            creator: read("/Creator"),
            producer: read("/Producer"),
        })
    }

    /// Write every field that is `Some`; `None` leaves the stored value.
    pub fn set_metadata(&mut self, update: &Metadata) -> Result<()> {
        let info = self.info_dict(true)?.ok_or_else(|| Error::Qpdf {
            reason: "document has no trailer".to_string(),
        })?;
        for (key, value) in update.entries() {
            if let Some(value) = value {
                info.set(key, text_string(&self.qpdf, value)?);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Overlays
    // ------------------------------------------------------------------------

    /// Draw `overlay` on top of the page's existing content.
    pub fn append_overlay(&mut self, index: usize, overlay: &Overlay) -> Result<()> {
        if overlay.is_empty() {
            return Ok(());
        }
        let page = self.page(index)?;
        pin_inherited(&self.qpdf, &page);
        let res = resources(&self.qpdf, &page);

        if !overlay.fonts().is_empty() {
            let fonts = sub_dict(&self.qpdf, &res, "/Font");
            for font in overlay.fonts() {
                let qpdf = &self.qpdf;
                let dict = dictionary(
                    qpdf,
                    [
                        ("/Type", qpdf.new_name("/Font")),
                        ("/Subtype", qpdf.new_name("/Type1")),
                        ("/BaseFont", qpdf.new_name(&format!("/{}", font.base_font()))),
                        ("/Encoding", qpdf.new_name("/WinAnsiEncoding")),
                    ],
                );
                fonts.set(font.resource_name(), &dict);
            }
        }

        let opacities = overlay.opacities();
        if !opacities.is_empty() {
            let states = sub_dict(&self.qpdf, &res, "/ExtGState");
            for (name, alpha) in &opacities {
                let qpdf = &self.qpdf;
                let dict = dictionary(
                    qpdf,
                    [
                        ("/Type", qpdf.new_name("/ExtGState")),
                        ("/ca", number(qpdf, *alpha)),
                        ("/CA", number(qpdf, *alpha)),
                    ],
                );
                states.set(name, &dict);
            }
        }

        let mut names: Vec<(Arc<OverlayImage>, String)> = Vec::new();
        let images = overlay.images();
        if !images.is_empty() {
            let xobjects = sub_dict(&self.qpdf, &res, "/XObject");
            for image in images {
                let stream = self.embed_image(&image);
                let name = xobject_slot(&xobjects, "/PtImg", &stream);
                xobjects.set(&name, &stream);
                names.push((image, name));
            }
        }

        let content = overlay.content(|image| {
            names
                .iter()
                .find(|(i, _)| Arc::ptr_eq(i, image))
                .map(|(_, n)| n.clone())
                .unwrap_or_default()
        })?;
        self.append_content(&page, content.as_bytes())
    }

    /// Wrap the existing content in `q ... Q` and append `data` after it.
    fn append_content(&mut self, page: &QPdfDictionary, data: &[u8]) -> Result<()> {
        let existing = content_streams(page);
        let added: QPdfObject = new_stream(&self.qpdf, data).into();
        let parts = if existing.is_empty() {
            vec![added]
        } else {
            let (open, close) = self.wrappers();
            let mut parts = Vec::with_capacity(existing.len() + 3);
            parts.push(open);
            parts.extend(existing);
            parts.push(close);
            parts.push(added);
            parts
        };
        page.set("/Contents", self.qpdf.new_array_from(parts));
        Ok(())
    }

    fn wrappers(&mut self) -> (QPdfObject, QPdfObject) {
        if let Some((open, close)) = &self.wrappers {
            return (open.clone(), close.clone());
        }
        let open: QPdfObject = new_stream(&self.qpdf, b"q\n").into();
        let close: QPdfObject = new_stream(&self.qpdf, b"\nQ\n").into();
        self.wrappers = Some((open.clone(), close.clone()));
        (open, close)
    }

    fn embed_image(&mut self, image: &Arc<OverlayImage>) -> QPdfObject {
        if let Some((_, stream)) = self
            .embedded_images
            .iter()
            .find(|(i, _)| Arc::ptr_eq(i, image))
        {
            return stream.clone();
        }
        let qpdf = &self.qpdf;
        let header = |space: &str| {
            vec![
                ("/Type", qpdf.new_name("/XObject")),
                ("/Subtype", qpdf.new_name("/Image")),
                ("/Width", number(qpdf, f64::from(image.width))),
                ("/Height", number(qpdf, f64::from(image.height))),
                ("/BitsPerComponent", number(qpdf, 8.0)),
                ("/ColorSpace", qpdf.new_name(space)),
            ]
        };
        let stream = match &image.pixels {
            ImagePixels::Jpeg { data, gray } => {
                let mut entries = header(if *gray { "/DeviceGray" } else { "/DeviceRGB" });
                entries.push(("/Filter", qpdf.new_name("/DCTDecode")));
                new_stream_with(qpdf, data, entries)
            }
            ImagePixels::Raw { rgb, alpha } => {
                let stream = new_stream_with(qpdf, rgb, header("/DeviceRGB"));
                if let Some(alpha) = alpha {
                    let mask = new_stream_with(qpdf, alpha, header("/DeviceGray"));
                    stream.get_dictionary().set("/SMask", &mask);
                }
                stream
            }
        };
        let stream: QPdfObject = stream.into();
        self.embedded_images.push((image.clone(), stream.clone()));
        stream
    }

    // ------------------------------------------------------------------------
    // Forms
    // ------------------------------------------------------------------------

    /// Burn widget appearances into page content and drop the interactive form.
    ///
    /// Returns the number of widgets drawn. A document without a form is left
    /// untouched and reports zero.
    pub fn flatten_form(&mut self) -> Result<usize> {
        let root = match self.qpdf.get_root() {
            Some(root) => root,
            None => return Ok(0),
        };
        if !root.has("/AcroForm") {
            return Ok(0);
        }

        let mut drawn = 0;
        for index in 0..self.page_count()? {
            let page = self.page(index)?;
            let annots = match page.get("/Annots") {
                Some(a) if is_type(&a, QPdfObjectType::Array) => QPdfArray::from(a),
                _ => continue,
            };

            let kept = self.qpdf.new_array();
            let mut content = String::new();
            let mut widgets = 0;
            for i in 0..annots.len() {
                let Some(annot) = annots.get(i) else { continue };
                if !is_widget(&annot) {
                    kept.push(&annot);
                    continue;
                }
                widgets += 1;
                let annot: QPdfDictionary = annot.into();
                if let Some(draw) = self.widget_appearance(&page, &annot, drawn)? {
                    content.push_str(&draw);
                    drawn += 1;
                }
            }
            if widgets == 0 {
                continue;
            }
            if kept.len() == 0 {
                page.remove("/Annots");
            } else {
                page.set("/Annots", &kept);
            }
            if !content.is_empty() {
                pin_inherited(&self.qpdf, &page);
                self.append_content(&page, content.as_bytes())?;
            }
        }

        root.remove("/AcroForm");
        tracing::debug!(widgets = drawn, "flattened form");
        Ok(drawn)
    }

    /// Register the widget's normal appearance on `page` and return the
    /// operators that draw it into the widget rectangle.
    fn widget_appearance(
        &self,
        page: &QPdfDictionary,
        annot: &QPdfDictionary,
        serial: usize,
    ) -> Result<Option<String>> {
        const HIDDEN: i64 = 1 << 1;
        let flags = annot
            .get("/F")
            .as_ref()
            .and_then(as_f64)
            .unwrap_or(0.0) as i64;
        if flags & HIDDEN != 0 {
            return Ok(None);
        }
        let Some(rect) = annot.get("/Rect").as_ref().and_then(as_rect) else {
            return Ok(None);
        };
        let Some(appearance) = normal_appearance(annot) else {
            return Ok(None);
        };
        let stream: QPdfStream = appearance.clone().into();
        let dict = stream.get_dictionary();
        let bbox = dict
            .get("/BBox")
            .as_ref()
            .and_then(as_rect)
            .unwrap_or(Rect::new(0.0, 0.0, rect.width, rect.height));
        if bbox.width <= 0.0 || bbox.height <= 0.0 {
            return Ok(None);
        }
        dict.set("/Type", self.qpdf.new_name("/XObject"));
        dict.set("/Subtype", self.qpdf.new_name("/Form"));

        let res = resources(&self.qpdf, page);
        let xobjects = sub_dict(&self.qpdf, &res, "/XObject");
        let name = format!("/PtFlat{}", serial);
        xobjects.set(&name, &appearance);

        let sx = rect.width / bbox.width;
        let sy = rect.height / bbox.height;
        Ok(Some(format!(
            "q\n{} 0 0 {} {} {} cm\n{} Do\nQ\n",
            num(sx),
            num(sy),
            num(rect.left - bbox.left * sx),
            num(rect.bottom - bbox.bottom * sy),
            name
        )))
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    /// Encode the document. Encryption is never carried over.
    pub fn serialize(&self, options: SaveOptions) -> Result<Vec<u8>> {
        let mut writer = self.qpdf.writer();
        writer.preserve_encryption(false).compress_streams(true);
        if options.compact {
            writer
                .object_stream_mode(ObjectStreamMode::Generate)
                .normalize_content(true)
                .preserve_unreferenced_objects(false);
        }
        writer
            .write_to_memory()
            .map_err(|e| Error::Serialization {
                reason: e.to_string(),
            })
    }

    pub(crate) fn qpdf(&self) -> &QPdf {
        &self.qpdf
    }

    /// Whether the page's `/Resources /<category>` holds `name`
    #[cfg(test)]
    pub(crate) fn has_page_resource(&self, index: usize, category: &str, name: &str) -> bool {
        let Ok(page) = self.page(index) else {
            return false;
        };
        match resources(&self.qpdf, &page).get(category) {
            Some(dict) if is_type(&dict, QPdfObjectType::Dictionary) => {
                QPdfDictionary::from(dict).has(name)
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn content_stream_count(&self, index: usize) -> usize {
        self.page(index).map(|p| content_streams(&p).len()).unwrap_or(0)
    }
}

fn is_widget(annot: &QPdfObject) -> bool {
    if !is_type(annot, QPdfObjectType::Dictionary) {
        return false;
    }
    let dict: QPdfDictionary = annot.clone().into();
    dict.get("/Subtype")
        .map(|s| is_type(&s, QPdfObjectType::Name) && s.as_name() == "/Widget")
        .unwrap_or(false)
}

/// `/AP /N`, resolving an appearance-state dictionary through `/AS`.
fn normal_appearance(annot: &QPdfDictionary) -> Option<QPdfObject> {
    let ap = annot.get("/AP")?;
    if !is_type(&ap, QPdfObjectType::Dictionary) {
        return None;
    }
    let normal = QPdfDictionary::from(ap).get("/N")?;
    match normal.get_type() {
        QPdfObjectType::Stream => Some(normal),
        QPdfObjectType::Dictionary => {
            let state = annot.get("/AS")?;
            if !is_type(&state, QPdfObjectType::Name) {
                return None;
            }
            let chosen = QPdfDictionary::from(normal).get(&state.as_name())?;
            is_type(&chosen, QPdfObjectType::Stream).then_some(chosen)
        }
        _ => None,
    }
}

/// First `<prefix>N` name that is free or already holds `stream`.
fn xobject_slot(xobjects: &QPdfDictionary, prefix: &str, stream: &QPdfObject) -> String {
    (0..)
        .map(|k| format!("{}{}", prefix, k))
        .find(|name| match xobjects.get(name) {
            None => true,
            Some(existing) => {
                is_type(&existing, QPdfObjectType::Null)
                    || (existing.get_id() == stream.get_id() && existing.get_id() != 0)
            }
        })
        .unwrap_or_else(|| prefix.to_string())
}

/// Shorthand used by tests and benches to build documents with known page sizes
pub fn document_with_pages(sizes: &[(f64, f64)]) -> Result<Document> {
    let mut doc = Document::create_empty();
    for &(w, h) in sizes {
        doc.add_blank_page(w, h)?;
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fonts::StandardFont;
    use crate::pdf::overlay::{Rgb, TextRun};
    use pretty_assertions::assert_eq;

    fn roundtrip(doc: &Document) -> Document {
        Document::load(&doc.serialize(SaveOptions::default()).unwrap()).unwrap()
    }

    #[test]
    fn test_load_rejects_non_pdf() {
        assert!(matches!(
            Document::load(b"hello world"),
            Err(Error::CorruptDocument { .. })
        ));
    }

    #[test]
    fn test_blank_pages_roundtrip() {
        let doc = document_with_pages(&[(100.0, 200.0), (300.0, 400.0)]).unwrap();
        let loaded = roundtrip(&doc);
        assert_eq!(loaded.page_count().unwrap(), 2);
        let info = loaded.page_info(1).unwrap();
        assert_eq!((info.width, info.height), (300.0, 400.0));
        assert_eq!(info.rotation, 0);
        assert_eq!(info.crop_box, info.media_box);
    }

    #[test]
    fn test_copy_pages_preserves_size_and_rotation() {
        let mut source = document_with_pages(&[(100.0, 100.0), (200.0, 300.0)]).unwrap();
        source.set_rotation(1, 90).unwrap();

        let mut target = Document::create_empty();
        let pages = target.copy_pages(&source, &[1, 0, 1]).unwrap();
        for page in &pages {
            target.append_page(page).unwrap();
        }
        let target = roundtrip(&target);
        let sizes: Vec<(f64, f64, u16)> = target
            .pages_info()
            .unwrap()
            .iter()
            .map(|i| (i.width, i.height, i.rotation))
            .collect();
        assert_eq!(
            sizes,
            vec![(200.0, 300.0, 90), (100.0, 100.0, 0), (200.0, 300.0, 90)]
        );
    }

    #[test]
    fn test_copy_is_independent_of_source() {
        let source = document_with_pages(&[(100.0, 100.0)]).unwrap();
        let mut target = Document::create_empty();
        let pages = target.copy_pages(&source, &[0]).unwrap();
        target.append_page(&pages[0]).unwrap();
        target.set_rotation(0, 180).unwrap();
        assert_eq!(source.page_info(0).unwrap().rotation, 0);
        assert_eq!(target.page_info(0).unwrap().rotation, 180);
    }

    #[test]
    fn test_copy_pages_rejects_out_of_range() {
        let source = document_with_pages(&[(100.0, 100.0)]).unwrap();
        let mut target = Document::create_empty();
        assert!(target.copy_pages(&source, &[1]).unwrap_err().is_validation());
    }

    #[test]
    fn test_rotation_is_additive() {
        let mut doc = document_with_pages(&[(100.0, 100.0)]).unwrap();
        assert_eq!(doc.set_rotation(0, 270).unwrap(), 270);
        assert_eq!(doc.set_rotation(0, 180).unwrap(), 90);
        assert_eq!(doc.set_rotation(0, -90).unwrap(), 0);
    }

    #[test]
    fn test_set_page_size_moves_matching_crop_box() {
        let mut doc = document_with_pages(&[(100.0, 100.0)]).unwrap();
        doc.set_crop_box(0, Rect::new(0.0, 0.0, 100.0, 100.0)).unwrap();
        doc.set_page_size(0, 595.0, 842.0).unwrap();
        let info = doc.page_info(0).unwrap();
        assert_eq!(info.media_box, Rect::new(0.0, 0.0, 595.0, 842.0));
        assert_eq!(info.crop_box, info.media_box);
    }

    #[test]
    fn test_set_page_size_keeps_lower_left_corner() {
        let mut doc = document_with_pages(&[(100.0, 100.0)]).unwrap();
        let shifted = Rect::new(50.0, 80.0, 100.0, 100.0);
        doc.page(0)
            .unwrap()
            .set("/MediaBox", rect_array(doc.qpdf(), &shifted));
        doc.set_crop_box(0, shifted).unwrap();
        doc.set_page_size(0, 595.0, 842.0).unwrap();
        let info = roundtrip(&doc).page_info(0).unwrap();
        assert_eq!(info.media_box, Rect::new(50.0, 80.0, 595.0, 842.0));
        assert_eq!(info.crop_box, info.media_box);
    }

    #[test]
    fn test_set_crop_box_rejects_empty() {
        let mut doc = document_with_pages(&[(100.0, 100.0)]).unwrap();
        assert!(doc
            .set_crop_box(0, Rect::new(10.0, 10.0, 0.0, 50.0))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let mut doc = document_with_pages(&[(100.0, 100.0)]).unwrap();
        doc.set_metadata(&Metadata {
            title: Some("Quarterly report".to_string()),
            keywords: Some("finance q3".to_string()),
            ..Metadata::default()
        })
        .unwrap();
        let meta = roundtrip(&doc).metadata().unwrap();
        assert_eq!(meta.title.as_deref(), Some("Quarterly report"));
        assert_eq!(meta.keywords.as_deref(), Some("finance q3"));
        assert_eq!(meta.author, None);
    }

    #[test]
    fn test_overlay_registers_resources_and_wraps_content() {
        let mut doc = document_with_pages(&[(200.0, 200.0)]).unwrap();
        let mut overlay = Overlay::new();
        overlay.push_text(TextRun {
            text: "1".to_string(),
            font: StandardFont::Helvetica,
            size: 12.0,
            color: Rgb::BLACK,
            opacity: 0.5,
            x: 10.0,
            y: 10.0,
            rotation: 0.0,
        });
        doc.append_overlay(0, &overlay).unwrap();

        let page = doc.page(0).unwrap();
        let res = resources(doc.qpdf(), &page);
        let fonts: QPdfDictionary = res.get("/Font").unwrap().into();
        assert!(fonts.has("/PtHelv"));
        let states: QPdfDictionary = res.get("/ExtGState").unwrap().into();
        assert!(states.has("/PtGS500"));
        // q, original, Q, overlay
        assert_eq!(content_streams(&page).len(), 4);

        let loaded = roundtrip(&doc);
        assert_eq!(loaded.page_count().unwrap(), 1);
    }

    #[test]
    fn test_repeated_overlays_survive_serialization() {
        let mut doc = document_with_pages(&[(200.0, 200.0)]).unwrap();
        let mut overlay = Overlay::new();
        overlay.push_text(TextRun {
            text: "x".to_string(),
            font: StandardFont::HelveticaBold,
            size: 10.0,
            color: Rgb::BLACK,
            opacity: 1.0,
            x: 20.0,
            y: 20.0,
            rotation: 0.0,
        });
        doc.append_overlay(0, &overlay).unwrap();
        doc.append_overlay(0, &overlay).unwrap();
        // q, q, original, Q, first, Q, second
        assert_eq!(doc.content_stream_count(0), 7);

        let loaded = roundtrip(&doc);
        assert_eq!(loaded.content_stream_count(0), 7);
        assert!(loaded.has_page_resource(0, "/Font", "/PtHelvB"));
    }

    #[test]
    fn test_flatten_without_form_is_noop() {
        let mut doc = document_with_pages(&[(100.0, 100.0)]).unwrap();
        assert_eq!(doc.flatten_form().unwrap(), 0);
        assert_eq!(doc.flatten_form().unwrap(), 0);
    }

    #[test]
    fn test_flatten_draws_widget_appearance() {
        let mut doc = document_with_pages(&[(200.0, 200.0)]).unwrap();
        let qpdf = doc.qpdf();
        let ap = new_stream_with(
            qpdf,
            b"0 0 1 rg 0 0 50 20 re f",
            [("/BBox", rect_array(qpdf, &Rect::new(0.0, 0.0, 50.0, 20.0)))],
        );
        let widget = dictionary(
            qpdf,
            [
                ("/Type", qpdf.new_name("/Annot")),
                ("/Subtype", qpdf.new_name("/Widget")),
                ("/FT", qpdf.new_name("/Tx")),
                ("/T", qpdf.new_utf8_string("name")),
                ("/Rect", rect_array(qpdf, &Rect::new(10.0, 10.0, 100.0, 40.0))),
                ("/AP", dictionary(qpdf, [("/N", ap.into())]).into()),
            ],
        )
        .into_indirect();
        let page = doc.page(0).unwrap();
        page.set("/Annots", qpdf.new_array_from([widget.clone()]));
        let root = qpdf.get_root().unwrap();
        root.set(
            "/AcroForm",
            dictionary(qpdf, [("/Fields", qpdf.new_array_from([widget]).into())]),
        );

        assert_eq!(doc.flatten_form().unwrap(), 1);
        let page = doc.page(0).unwrap();
        assert!(!page.has("/Annots"));
        assert!(!doc.qpdf().get_root().unwrap().has("/AcroForm"));
        // Second call finds no form
        assert_eq!(doc.flatten_form().unwrap(), 0);
    }
}
