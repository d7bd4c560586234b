//! PDF Tools MCP Server Library
//!
//! A PDF transformation engine and the MCP tools built on it:
//! - page tree edits: merge, split, extract, delete, organize
//! - geometry: rotate, crop, resize
//! - stamps: page numbers, header/footer, watermark, signature
//! - conversion: PDF to JPG/PNG, images to PDF, text extraction
//! - compress, edit metadata, flatten forms, password protection
//! - page previews with an optional crop overlay

pub mod engine;
pub mod error;
pub mod pdf;
pub mod server;
pub mod source;

pub use engine::output::{InputFile, OperationOutput, OutputFile};
pub use engine::{Engine, EngineConfig, Operation};
pub use error::{Error, Result};
pub use server::{run_server, run_server_with_config, FileSource, PdfToolsServer, ServerConfig};
