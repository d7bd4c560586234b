//! Standard 14 font metrics for overlay text
//!
//! Overlays are drawn with the non-embedded Helvetica faces, so text widths
//! come from the Adobe font metrics rather than from a font file.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Widths of ASCII 32..=126 in Helvetica, 1/1000 em
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

/// Widths of ASCII 32..=126 in Helvetica-Bold, 1/1000 em
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // '0'..'?'
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 'P'..'_'
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // '`'..'o'
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // 'p'..'~'
];

/// Width used for Latin-1 characters outside the ASCII tables
const FALLBACK_WIDTH: u16 = 556;

/// The two faces overlays can use
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StandardFont {
    #[default]
    Helvetica,
    HelveticaBold,
}

impl StandardFont {
    pub fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
        }
    }

    /// Resource name under which the font is registered on a page
    pub fn resource_name(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "/PtHelv",
            StandardFont::HelveticaBold => "/PtHelvB",
        }
    }

    fn glyph_width(self, byte: u8) -> u16 {
        let table = match self {
            StandardFont::Helvetica => &HELVETICA,
            StandardFont::HelveticaBold => &HELVETICA_BOLD,
        };
        match byte {
            32..=126 => table[(byte - 32) as usize],
            _ => FALLBACK_WIDTH,
        }
    }

    /// Advance width of `text` at `font_size`, in points.
    ///
    /// Characters outside WinAnsi are measured at the fallback width.
    pub fn text_width(self, text: &str, font_size: f64) -> f64 {
        let units: u32 = text
            .chars()
            .filter(|c| !c.is_control())
            .map(|c| win_ansi_byte(c).map_or(FALLBACK_WIDTH, |b| self.glyph_width(b)) as u32)
            .sum();
        units as f64 * font_size / 1000.0
    }
}

fn win_ansi_byte(c: char) -> Option<u8> {
    match c as u32 {
        v @ (0x20..=0x7e | 0xa0..=0xff) => Some(v as u8),
        _ => None,
    }
}

/// Encode text for a WinAnsiEncoding simple font.
///
/// Latin-1 maps directly and control characters are dropped. Anything else
/// cannot be drawn with the standard fonts and is rejected.
pub fn encode_win_ansi(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            win_ansi_byte(c).ok_or_else(|| {
                Error::validation(format!(
                    "character '{}' (U+{:04X}) is not supported by the standard fonts",
                    c, c as u32
                ))
            })
        })
        .collect()
}
