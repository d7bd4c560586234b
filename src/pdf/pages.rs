//! Page selection
//!
//! Callers name pages with 1-based numbers, either as an explicit list or as a
//! range expression. [`PageSpec::resolve`] is the single place where those
//! become zero-based indices.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Pages selected by the caller, 1-based
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PageSpec {
    /// Explicit page numbers, kept in the given order
    List(Vec<u32>),
    /// Range expression such as `"1-3,5"`, `"z-1"`, `"r2"` or `"2-z:even"`
    Range(String),
}

impl From<Vec<u32>> for PageSpec {
    fn from(pages: Vec<u32>) -> Self {
        PageSpec::List(pages)
    }
}

impl From<&str> for PageSpec {
    fn from(range: &str) -> Self {
        PageSpec::Range(range.to_string())
    }
}

impl PageSpec {
    /// Zero-based indices, in selection order. Duplicates are kept.
    ///
    /// Fails with a validation error when the selection is empty or any page
    /// falls outside `1..=page_count`.
    pub fn resolve(&self, page_count: usize) -> Result<Vec<usize>> {
        let numbers = match self {
            PageSpec::List(pages) => {
                if let Some(&bad) = pages
                    .iter()
                    .find(|&&p| p == 0 || p as usize > page_count)
                {
                    return Err(out_of_range(bad, page_count));
                }
                pages.clone()
            }
            PageSpec::Range(range) => parse_page_range(range, page_count)?,
        };
        if numbers.is_empty() {
            return Err(Error::validation("no pages selected"));
        }
        Ok(numbers.into_iter().map(|p| p as usize - 1).collect())
    }
}

fn out_of_range(page: u32, page_count: usize) -> Error {
    if page_count == 0 {
        Error::validation(format!("page {} out of range (document has no pages)", page))
    } else {
        Error::validation(format!("page {} out of range (1-{})", page, page_count))
    }
}

/// Parse a range expression into 1-based page numbers.
///
/// Supports:
/// - `N` (single page)
/// - `N-M` (range, descending when `N > M`)
/// - `z` (last page), `rN` (N-th from last)
/// - `N-M:odd`, `N-M:even`, or a bare `:odd` / `:even` over all pages
/// - Comma-separated combinations
fn parse_page_range(range: &str, page_count: usize) -> Result<Vec<u32>> {
    let mut numbers = Vec::new();

    for part in range.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (range_part, parity) = if let Some(r) = part.strip_suffix(":odd") {
            (r.trim(), Some(1))
        } else if let Some(r) = part.strip_suffix(":even") {
            (r.trim(), Some(0))
        } else {
            (part, None)
        };

        let pages: Vec<u32> = if range_part.is_empty() && parity.is_some() {
            (1..=page_count as u32).collect()
        } else if let Some((start, end)) = range_part.split_once('-') {
            let start = resolve_page_ref(start, page_count)?;
            let end = resolve_page_ref(end, page_count)?;
            if start <= end {
                (start..=end).collect()
            } else {
                (end..=start).rev().collect()
            }
        } else {
            vec![resolve_page_ref(range_part, page_count)?]
        };

        match parity {
            Some(rem) => numbers.extend(pages.into_iter().filter(|p| p % 2 == rem)),
            None => numbers.extend(pages),
        }
    }

    Ok(numbers)
}

/// Resolve one page reference: `N`, `z` (last) or `rN` (N-th from last).
fn resolve_page_ref(s: &str, page_count: usize) -> Result<u32> {
    let s = s.trim();
    let invalid = || Error::validation(format!("invalid page reference `{}`", s));
    let last = page_count as u32;

    if s == "z" {
        if last == 0 {
            return Err(out_of_range(1, page_count));
        }
        return Ok(last);
    }
    if let Some(from_end) = s.strip_prefix('r') {
        let n: u32 = from_end.parse().map_err(|_| invalid())?;
        if n == 0 || n > last {
            return Err(out_of_range(n, page_count));
        }
        return Ok(last - n + 1);
    }
    let page: u32 = s.parse().map_err(|_| invalid())?;
    if page == 0 || page > last {
        return Err(out_of_range(page, page_count));
    }
    Ok(page)
}

/// Indices of `0..page_count` not present in `removed`, in original order.
pub fn complement(removed: &[usize], page_count: usize) -> Vec<usize> {
    (0..page_count).filter(|i| !removed.contains(i)).collect()
}
