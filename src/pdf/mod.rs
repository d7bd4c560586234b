//! PDF processing layer
//!
//! Structural edits go through qpdf ([`document`], [`security`]); rendering and
//! text extraction go through PDFium ([`raster`]).

pub mod document;
pub mod fonts;
pub mod geometry;
pub(crate) mod objects;
pub mod overlay;
pub mod pages;
pub mod preview;
pub mod raster;
pub mod security;

pub use document::{Document, Metadata, PageInfo, SaveOptions};
pub use geometry::{Margins, PageSize, Rect};
pub use pages::PageSpec;
pub use raster::{RasterFormat, Rasterizer, RasterizerConfig};
