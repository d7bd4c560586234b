//! Low-level qpdf object helpers
//!
//! Every direct use of the qpdf object model lives here so the rest of the
//! crate works with plain numbers, rectangles and strings.

use crate::error::{Error, Result};
use crate::pdf::geometry::Rect;
use qpdf::{QPdf, QPdfArray, QPdfDictionary, QPdfObject, QPdfObjectLike, QPdfObjectType, QPdfStream};

/// Attributes a page may inherit from its ancestors in the page tree
pub(crate) const INHERITABLE: [&str; 4] = ["/MediaBox", "/CropBox", "/Resources", "/Rotate"];

/// US Letter, used when a page tree carries no MediaBox at all
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Map qpdf crate errors to our error types
pub(crate) fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    match e.error_code() {
        qpdf::QPdfErrorCode::InvalidPassword => Error::IncorrectPassword,
        _ => Error::Qpdf {
            reason: e.to_string(),
        },
    }
}

/// Number object: an integer when the value is whole, otherwise a real.
pub(crate) fn number(qpdf: &QPdf, v: f64) -> QPdfObject {
    let v = if v.is_finite() { v } else { 0.0 };
    if v.fract() == 0.0 && v.abs() < 1e15 {
        qpdf.new_integer(v as i64).into()
    } else {
        qpdf.new_real(v, 4).into()
    }
}

/// `[left bottom right top]` array
pub(crate) fn rect_array(qpdf: &QPdf, r: &Rect) -> QPdfObject {
    qpdf.new_array_from(r.to_corners().into_iter().map(|c| number(qpdf, c)))
        .into()
}

/// Dictionary built from `(key, value)` pairs
pub(crate) fn dictionary<'a>(
    qpdf: &QPdf,
    entries: impl IntoIterator<Item = (&'a str, QPdfObject)>,
) -> QPdfDictionary {
    qpdf.new_dictionary_from(entries)
}

/// Text string object; qpdf picks PDFDoc or UTF-16 as needed.
pub(crate) fn text_string(qpdf: &QPdf, value: &str) -> Result<QPdfObject> {
    if value.contains('\0') {
        return Err(Error::validation("text must not contain NUL characters"));
    }
    Ok(qpdf.new_utf8_string(value))
}

/// Format a number the way PDF content expects: no exponent, trimmed zeros.
pub(crate) fn num(v: f64) -> String {
    if !v.is_finite() {
        return "0".to_string();
    }
    let s = format!("{:.4}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    match s {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Read a numeric object. qpdf renders integers and reals as plain decimal text.
pub(crate) fn as_f64(obj: &QPdfObject) -> Option<f64> {
    match obj.get_type() {
        QPdfObjectType::Integer | QPdfObjectType::Real => format!("{}", obj).trim().parse().ok(),
        _ => None,
    }
}

/// Read a four-number rectangle array
pub(crate) fn as_rect(obj: &QPdfObject) -> Option<Rect> {
    if obj.get_type() != QPdfObjectType::Array {
        return None;
    }
    let arr: QPdfArray = obj.clone().into();
    if arr.len() != 4 {
        return None;
    }
    let mut c = [0.0; 4];
    for (i, slot) in c.iter_mut().enumerate() {
        *slot = arr.get(i).as_ref().and_then(as_f64)?;
    }
    Some(Rect::from_corners(c))
}

pub(crate) fn is_type(obj: &QPdfObject, ty: QPdfObjectType) -> bool {
    obj.get_type() == ty
}

/// Look up a page attribute, walking `/Parent` links for inheritable keys.
pub(crate) fn inherited(page: &QPdfDictionary, key: &str) -> Option<QPdfObject> {
    if let Some(v) = page.get(key) {
        if !is_type(&v, QPdfObjectType::Null) {
            return Some(v);
        }
    }
    if !INHERITABLE.contains(&key) {
        return None;
    }
    let mut node = page.get("/Parent");
    // Guard against cyclic trees in damaged files
    for _ in 0..64 {
        let parent: QPdfDictionary = match node {
            Some(p) if is_type(&p, QPdfObjectType::Dictionary) => p.into(),
            _ => return None,
        };
        if let Some(v) = parent.get(key) {
            if !is_type(&v, QPdfObjectType::Null) {
                return Some(v);
            }
        }
        node = parent.get("/Parent");
    }
    None
}

pub(crate) fn media_box(page: &QPdfDictionary) -> Rect {
    inherited(page, "/MediaBox")
        .as_ref()
        .and_then(as_rect)
        .unwrap_or_else(|| Rect::from_corners(DEFAULT_MEDIA_BOX))
}

/// Crop box, defaulting to the media box
pub(crate) fn crop_box(page: &QPdfDictionary) -> Rect {
    inherited(page, "/CropBox")
        .as_ref()
        .and_then(as_rect)
        .unwrap_or_else(|| media_box(page))
}

pub(crate) fn rotation(page: &QPdfDictionary) -> i64 {
    inherited(page, "/Rotate")
        .as_ref()
        .and_then(as_f64)
        .map(|v| v as i64)
        .unwrap_or(0)
}

/// Copy inherited attributes onto the page itself so it can be edited in isolation.
pub(crate) fn pin_inherited(qpdf: &QPdf, page: &QPdfDictionary) {
    for key in INHERITABLE {
        if page.has(key) {
            continue;
        }
        if let Some(v) = inherited(page, key) {
            page.set(key, &v);
        } else if key == "/MediaBox" {
            page.set(key, rect_array(qpdf, &media_box(page)));
        }
    }
}

/// The page's resource dictionary, created empty if the tree has none.
pub(crate) fn resources(qpdf: &QPdf, page: &QPdfDictionary) -> QPdfDictionary {
    if let Some(res) = inherited(page, "/Resources") {
        if is_type(&res, QPdfObjectType::Dictionary) {
            return res.into();
        }
    }
    let res = qpdf.new_dictionary();
    page.set("/Resources", &res);
    res
}

/// Sub-dictionary of `parent` under `key`, created when missing.
pub(crate) fn sub_dict(qpdf: &QPdf, parent: &QPdfDictionary, key: &str) -> QPdfDictionary {
    if let Some(d) = parent.get(key) {
        if is_type(&d, QPdfObjectType::Dictionary) {
            return d.into();
        }
    }
    let d = qpdf.new_dictionary();
    parent.set(key, &d);
    d
}

/// Every stream that makes up the page content, in order.
pub(crate) fn content_streams(page: &QPdfDictionary) -> Vec<QPdfObject> {
    match page.get("/Contents") {
        Some(c) if is_type(&c, QPdfObjectType::Stream) => vec![c],
        Some(c) if is_type(&c, QPdfObjectType::Array) => {
            let arr: QPdfArray = c.into();
            (0..arr.len())
                .filter_map(|i| arr.get(i))
                .filter(|o| is_type(o, QPdfObjectType::Stream))
                .collect()
        }
        _ => Vec::new(),
    }
}

/// New indirect stream holding `data`; qpdf compresses it on write.
pub(crate) fn new_stream(qpdf: &QPdf, data: &[u8]) -> QPdfStream {
    qpdf.new_stream(data)
}

/// New indirect stream with extra dictionary entries.
pub(crate) fn new_stream_with<'a>(
    qpdf: &QPdf,
    data: &[u8],
    entries: impl IntoIterator<Item = (&'a str, QPdfObject)>,
) -> QPdfStream {
    qpdf.new_stream_with_dictionary(entries, data)
}

/// Escape bytes for use inside a `( )` string literal.
pub(crate) fn escape_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 8);
    for &b in bytes {
        match b {
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            other => out.push_str(&format!("\\{:03o}", other)),
        }
    }
    out
}

/// Read a text string value (qpdf decodes PDFDoc and UTF-16 for us).
pub(crate) fn as_text(obj: &QPdfObject) -> Option<String> {
    if is_type(obj, QPdfObjectType::String) {
        Some(obj.as_string())
    } else {
        None
    }
}
