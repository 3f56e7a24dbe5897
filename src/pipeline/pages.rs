//! Page-range expressions: `"1,3,5-7"` → an ordered set of page numbers.
//!
//! Parsing and resolution are separate steps. [`PageSelection::parse`]
//! validates the syntax at submission time, before a single byte is
//! downloaded, while [`PageSelection::resolve`] needs the page count and runs
//! once the PDF is open. The selection itself is immutable: it is built once
//! and only ever read.
//!
//! Resolution rules:
//! * indices are 1-based, the result is deduplicated and ascending;
//! * indices beyond the document (and `0`) are silently dropped;
//! * a reversed range such as `5-3` selects nothing.

use crate::error::PrintJobError;
use std::fmt;

/// One comma-separated element of a page-range expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSpan {
    /// A single page, `"4"`.
    Single(u32),
    /// An inclusive range, `"5-7"`. May be reversed, in which case it is empty.
    Range(u32, u32),
}

/// Which pages of a document to print.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageSelection {
    /// Every page (the default).
    #[default]
    All,
    /// The pages named by a range expression.
    Spans(Vec<PageSpan>),
}

impl PageSelection {
    /// Parse a page-range expression.
    ///
    /// A blank expression and the keyword `all` both select every page.
    pub fn parse(expr: &str) -> Result<Self, PrintJobError> {
        let expr = expr.trim();
        if expr.is_empty() || expr.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }

        let mut spans = Vec::new();
        for token in expr.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let span = match token.split_once('-') {
                Some((start, end)) => PageSpan::Range(parse_page(start, expr)?, parse_page(end, expr)?),
                None => PageSpan::Single(parse_page(token, expr)?),
            };
            spans.push(span);
        }

        if spans.is_empty() {
            return Err(PrintJobError::validation(format!(
                "Invalid page selection '{expr}': no page numbers"
            )));
        }
        Ok(PageSelection::Spans(spans))
    }

    /// True when every page is selected.
    pub fn is_all(&self) -> bool {
        matches!(self, PageSelection::All)
    }

    /// Expand the selection against a document of `total_pages` pages.
    pub fn resolve(&self, total_pages: usize) -> PageSet {
        let total = u32::try_from(total_pages).unwrap_or(u32::MAX);
        let mut pages: Vec<u32> = match self {
            PageSelection::All => (1..=total).collect(),
            PageSelection::Spans(spans) => spans
                .iter()
                .flat_map(|span| match *span {
                    PageSpan::Single(p) => p..=p,
                    // Upper bound clamped to the page count.
                    PageSpan::Range(start, end) => start..=end.min(total),
                })
                .filter(|&p| p >= 1 && p <= total)
                .collect(),
        };
        pages.sort_unstable();
        pages.dedup();
        PageSet { pages }
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSelection::All => f.write_str("all"),
            PageSelection::Spans(spans) => {
                for (i, span) in spans.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match span {
                        PageSpan::Single(p) => write!(f, "{p}")?,
                        PageSpan::Range(s, e) => write!(f, "{s}-{e}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

fn parse_page(token: &str, expr: &str) -> Result<u32, PrintJobError> {
    token.trim().parse::<u32>().map_err(|_| {
        PrintJobError::validation(format!(
            "Invalid page selection '{expr}': '{}' is not a page number",
            token.trim()
        ))
    })
}

/// A resolved, validated selection: ascending, unique, 1-based page numbers
/// that all exist in the document they were resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSet {
    pages: Vec<u32>,
}

impl PageSet {
    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.binary_search(&page).is_ok()
    }
}
