//! Engine inputs, outputs and file naming

use serde::Serialize;

pub const PDF_MIME: &str = "application/pdf";
pub const TEXT_MIME: &str = "text/plain";

/// A file handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct InputFile {
    /// Original file name, used to derive per-page output names
    pub name: String,
    pub data: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// File name without directory and without a trailing `.pdf`
    pub fn base_name(&self) -> &str {
        let name = self
            .name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.name);
        let lower = name.to_ascii_lowercase();
        let stem = if lower.ends_with(".pdf") {
            &name[..name.len() - 4]
        } else {
            name
        };
        if stem.is_empty() {
            "document"
        } else {
            stem
        }
    }
}

/// One produced file
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    pub name: String,
    pub data: Vec<u8>,
    pub mime_type: &'static str,
}

impl OutputFile {
    pub fn pdf(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            mime_type: PDF_MIME,
        }
    }
}

/// Size change reported by compress
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompressionReport {
    pub original_size: usize,
    pub compressed_size: usize,
    /// Percentage saved, one decimal; negative when the output grew
    pub reduction_percent: f64,
}

impl CompressionReport {
    pub fn new(original_size: usize, compressed_size: usize) -> Self {
        let reduction = if original_size == 0 {
            0.0
        } else {
            (1.0 - compressed_size as f64 / original_size as f64) * 100.0
        };
        Self {
            original_size,
            compressed_size,
            reduction_percent: (reduction * 10.0).round() / 10.0,
        }
    }
}

/// Result of one operation call
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    Single(OutputFile),
    /// Ordered per-page results; page N is always at position N-1
    Multiple(Vec<OutputFile>),
    Compressed {
        file: OutputFile,
        report: CompressionReport,
    },
}

impl OperationOutput {
    pub fn files(&self) -> Vec<&OutputFile> {
        match self {
            OperationOutput::Single(f) | OperationOutput::Compressed { file: f, .. } => vec![f],
            OperationOutput::Multiple(files) => files.iter().collect(),
        }
    }

    pub fn into_files(self) -> Vec<OutputFile> {
        match self {
            OperationOutput::Single(f) | OperationOutput::Compressed { file: f, .. } => vec![f],
            OperationOutput::Multiple(files) => files,
        }
    }
}

/// `<base>_page_<n>.<ext>`, with `n` 1-based
pub fn page_file_name(base: &str, page_number: usize, extension: &str) -> String {
    format!("{}_page_{}.{}", base, page_number, extension)
}

/// `<operation_id>_<timestamp><suffix>`
pub fn operation_file_name(operation_id: &str, timestamp: i64, suffix: &str) -> String {
    format!("{}_{}{}", operation_id, timestamp, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("report.pdf", "report")]
    #[case("Report.PDF", "Report")]
    #[case("/tmp/in/scan.pdf", "scan")]
    #[case("notes", "notes")]
    #[case(".pdf", "document")]
    fn test_base_name(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(InputFile::new(name, Vec::new()).base_name(), expected);
    }

    #[test]
    fn test_names() {
        assert_eq!(page_file_name("report", 3, "pdf"), "report_page_3.pdf");
        assert_eq!(
            operation_file_name("compress", 1700000000000, "_compressed.pdf"),
            "compress_1700000000000_compressed.pdf"
        );
    }

    #[test]
    fn test_compression_report() {
        let r = CompressionReport::new(1000, 750);
        assert_eq!(r.reduction_percent, 25.0);
        assert_eq!(CompressionReport::new(1000, 1100).reduction_percent, -10.0);
        assert_eq!(CompressionReport::new(0, 10).reduction_percent, 0.0);
    }
}
