//! Page-tree operations: merge, split, extract, delete, organize

use crate::engine::params::APPLICATION_NAME;
use crate::error::{Error, Result};
use crate::pdf::document::{Document, Metadata};
use crate::pdf::pages::{complement, PageSpec};

/// Copy `indices` of `source`, in order, into a fresh document.
pub(crate) fn copy_into_new(source: &Document, indices: &[usize]) -> Result<Document> {
    let mut target = Document::create_empty();
    let pages = target.copy_pages(source, indices)?;
    for page in &pages {
        target.append_page(page)?;
    }
    Ok(target)
}

/// All pages of every source, in input order.
pub fn merge(sources: &[Document]) -> Result<Document> {
    if sources.is_empty() {
        return Err(Error::validation("merge needs at least one document"));
    }
    let mut target = Document::create_empty();
    for (i, source) in sources.iter().enumerate() {
        let count = source.page_count()?;
        let indices: Vec<usize> = (0..count).collect();
        for page in target.copy_pages(source, &indices)? {
            target.append_page(&page)?;
        }
        tracing::debug!(input = i, pages = count, "merged input");
    }
    if target.page_count()? == 0 {
        return Err(Error::validation("merged documents contain no pages"));
    }
    Ok(target)
}

/// One single-page document per page, titled `<base> - Page <n>`.
///
/// An empty document yields an empty list.
pub fn split(source: &Document, base_name: &str) -> Result<Vec<Document>> {
    let count = source.page_count()?;
    let mut parts = Vec::with_capacity(count);
    for index in 0..count {
        let mut part = copy_into_new(source, &[index])?;
        part.set_metadata(&Metadata {
            title: Some(format!("{} - Page {}", base_name, index + 1)),
            creator: Some(APPLICATION_NAME.to_string()),
            ..Metadata::default()
        })?;
        parts.push(part);
    }
    Ok(parts)
}

/// Only the listed pages, in the order listed.
pub fn extract_pages(source: &Document, pages: &PageSpec) -> Result<Document> {
    let indices = pages.resolve(source.page_count()?)?;
    copy_into_new(source, &indices)
}

/// Every page not listed, in original order. Removing all pages is refused.
pub fn delete_pages(source: &Document, pages: &PageSpec) -> Result<Document> {
    let count = source.page_count()?;
    let removed = pages.resolve(count)?;
    let kept = complement(&removed, count);
    if kept.is_empty() {
        return Err(Error::validation("cannot delete every page of the document"));
    }
    copy_into_new(source, &kept)
}

/// Pages in exactly the given order. Omitted pages are dropped, repeats are kept.
pub fn organize_pages(source: &Document, order: &PageSpec) -> Result<Document> {
    let indices = order.resolve(source.page_count()?)?;
    copy_into_new(source, &indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::document::document_with_pages;
    use pretty_assertions::assert_eq;

    fn widths(doc: &Document) -> Vec<f64> {
        doc.pages_info().unwrap().iter().map(|p| p.width).collect()
    }

    fn three_pages() -> Document {
        document_with_pages(&[(100.0, 500.0), (200.0, 500.0), (300.0, 500.0)]).unwrap()
    }

    #[test]
    fn test_merge_keeps_input_order() {
        let a = document_with_pages(&[(100.0, 100.0), (110.0, 100.0)]).unwrap();
        let b = document_with_pages(&[(200.0, 100.0)]).unwrap();
        let merged = merge(&[a, b]).unwrap();
        assert_eq!(widths(&merged), vec![100.0, 110.0, 200.0]);
    }

    #[test]
    fn test_merge_rejects_empty() {
        assert!(merge(&[]).unwrap_err().is_validation());
        assert!(merge(&[Document::create_empty()]).unwrap_err().is_validation());
    }

    #[test]
    fn test_split_titles_parts() {
        let parts = split(&three_pages(), "report").unwrap();
        assert_eq!(parts.len(), 3);
        let meta = parts[1].metadata().unwrap();
        assert_eq!(meta.title.as_deref(), Some("report - Page 2"));
        assert_eq!(widths(&parts[2]), vec![300.0]);
        assert!(split(&Document::create_empty(), "empty").unwrap().is_empty());
    }

    #[test]
    fn test_extract_in_caller_order() {
        let out = extract_pages(&three_pages(), &PageSpec::List(vec![3, 1])).unwrap();
        assert_eq!(widths(&out), vec![300.0, 100.0]);
    }

    #[test]
    fn test_extract_out_of_range_fails() {
        let err = extract_pages(&three_pages(), &PageSpec::List(vec![4])).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_delete_keeps_complement() {
        let out = delete_pages(&three_pages(), &PageSpec::List(vec![2])).unwrap();
        assert_eq!(widths(&out), vec![100.0, 300.0]);
    }

    #[test]
    fn test_delete_everything_fails() {
        let one = document_with_pages(&[(100.0, 100.0)]).unwrap();
        assert!(delete_pages(&one, &PageSpec::List(vec![1])).unwrap_err().is_validation());
        assert!(delete_pages(&three_pages(), &PageSpec::from("1-z"))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_organize_allows_drops_and_repeats() {
        let out = organize_pages(&three_pages(), &PageSpec::List(vec![2, 2, 1])).unwrap();
        assert_eq!(widths(&out), vec![200.0, 200.0, 100.0]);
    }
}
