//! Error types for the PDF transformation engine

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the engine and its tool surface
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed operation parameters. Raised before any document is mutated.
    #[error("Invalid parameters: {reason}")]
    Validation { reason: String },

    /// Input bytes could not be parsed as a PDF
    #[error("Corrupt document: {reason}")]
    CorruptDocument { reason: String },

    /// PDF is password protected and no password was provided
    #[error("PDF is password protected")]
    PasswordRequired,

    /// Incorrect password provided
    #[error("Incorrect password")]
    IncorrectPassword,

    /// Final encoding of a PDF or image container failed
    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    /// Overlay image codec is not PNG or JPEG
    #[error("Unsupported image: {reason}")]
    UnsupportedImage { reason: String },

    /// PDFium could not be bound or failed to render
    #[error("Rendering failed: {reason}")]
    Rendering { reason: String },

    /// A newer render request superseded this one
    #[error("Render request was superseded")]
    RenderCancelled,

    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Cache key not found
    #[error("Cache key not found: {key}")]
    CacheKeyNotFound { key: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// qpdf error outside of load/serialize
    #[error("qpdf error: {reason}")]
    Qpdf { reason: String },

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// Image dimension exceeded
    #[error("Image dimension exceeded: {detail}")]
    ImageDimensionExceeded { detail: String },
}

impl Error {
    /// Shorthand for [`Error::Validation`]
    pub fn validation(reason: impl Into<String>) -> Self {
        Error::Validation {
            reason: reason.into(),
        }
    }

    /// True for errors caused by caller input rather than the document or environment
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. } | Error::ImageDimensionExceeded { .. }
        )
    }

    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::Validation { reason } => format!("Invalid parameters: {}", reason),
            Error::CorruptDocument { .. } => "Invalid or corrupt PDF file".to_string(),
            Error::PasswordRequired => "PDF is password protected".to_string(),
            Error::IncorrectPassword => "Incorrect password".to_string(),
            Error::Serialization { .. } => "Failed to write output".to_string(),
            Error::UnsupportedImage { .. } => "Unsupported image format (use PNG or JPEG)".to_string(),
            Error::Rendering { .. } => "Page rendering failed".to_string(),
            Error::RenderCancelled => "Render request was superseded".to_string(),
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::CacheKeyNotFound { .. } => "Cache key not found".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Json(_) => "Invalid JSON".to_string(),
            Error::Qpdf { .. } => "PDF processing error".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::ImageDimensionExceeded { detail } => {
                format!("Image dimension exceeded: {}", detail)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_internal_detail() {
        let err = Error::CorruptDocument {
            reason: "xref table at offset 1234 is broken".to_string(),
        };
        assert_eq!(err.client_message(), "Invalid or corrupt PDF file");

        let err = Error::PathAccessDenied {
            path: "/etc/passwd".to_string(),
        };
        assert!(!err.client_message().contains("/etc"));
    }

    #[test]
    fn test_validation_message_is_passed_through() {
        let err = Error::validation("page 7 out of range (1-3)");
        assert!(err.is_validation());
        assert_eq!(
            err.client_message(),
            "Invalid parameters: page 7 out of range (1-3)"
        );
    }
}
