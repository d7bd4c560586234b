//! Source resolution for input files

use crate::engine::output::InputFile;
use crate::error::{Error, Result};
use crate::source::CacheManager;
use base64::Engine;
use std::path::Path;

/// Bytes of a resolved source and how to refer to it
#[derive(Debug)]
pub struct ResolvedFile {
    pub data: Vec<u8>,
    /// Human-readable origin, echoed back in results
    pub source_name: String,
    /// File name used to derive output names
    pub file_name: String,
}

impl ResolvedFile {
    pub fn into_input(self) -> InputFile {
        InputFile::new(self.file_name, self.data)
    }
}

/// Read a file from disk. The format is checked later by whoever consumes it.
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<ResolvedFile> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }
    let data = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    Ok(ResolvedFile {
        data,
        source_name: path.display().to_string(),
        file_name,
    })
}

/// Decode standard base64. `name` defaults to `document.pdf`.
pub fn resolve_base64(base64_data: &str, name: Option<&str>) -> Result<ResolvedFile> {
    let data = base64::engine::general_purpose::STANDARD.decode(base64_data.trim())?;
    Ok(ResolvedFile {
        data,
        source_name: "<base64>".to_string(),
        file_name: name.unwrap_or("document.pdf").to_string(),
    })
}

/// Look up the output of an earlier call
pub fn resolve_cache(cache_key: &str, cache: &CacheManager) -> Result<ResolvedFile> {
    let file = cache.get(cache_key).ok_or_else(|| Error::CacheKeyNotFound {
        key: cache_key.to_string(),
    })?;
    Ok(ResolvedFile {
        data: file.data,
        source_name: format!("<cache:{}>", cache_key),
        file_name: file.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::cache::CachedFile;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_resolve_base64() {
        let resolved = resolve_base64("SGVsbG8gV29ybGQ=", Some("hello.txt")).unwrap();
        assert_eq!(resolved.data, b"Hello World");
        assert_eq!(resolved.file_name, "hello.txt");
        assert_eq!(resolved.source_name, "<base64>");
    }

    #[test]
    fn test_resolve_base64_invalid() {
        let result = resolve_base64("not valid base64!!!", None);
        assert!(matches!(result, Err(Error::Base64Decode(_))));
    }

    #[test]
    fn test_resolve_path() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"%PDF-1.7").unwrap();
        let resolved = resolve_path(file.path()).unwrap();
        assert_eq!(resolved.data, b"%PDF-1.7");
        assert!(resolved.file_name.ends_with(".pdf"));

        let input = resolved.into_input();
        assert_eq!(input.data, b"%PDF-1.7");
    }

    #[test]
    fn test_resolve_path_not_found() {
        let result = resolve_path("/nonexistent/path/file.pdf");
        assert!(matches!(result, Err(Error::PdfNotFound { .. })));
    }

    #[test]
    fn test_resolve_cache() {
        let cache = CacheManager::new(4, 1024);
        cache.put(
            "k".to_string(),
            CachedFile::new("report_page_1.pdf", "application/pdf", vec![1, 2]),
        );
        let resolved = resolve_cache("k", &cache).unwrap();
        assert_eq!(resolved.file_name, "report_page_1.pdf");
        assert_eq!(resolved.source_name, "<cache:k>");
        assert!(matches!(
            resolve_cache("missing", &cache),
            Err(Error::CacheKeyNotFound { .. })
        ));
    }
}
