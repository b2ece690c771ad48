//! Session configuration
//!
//! Read once by the rewriter when the session starts; never mutated while
//! the output is being produced.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RewriteError};
use crate::parse_page_ranges;

/// Which pages survive `select`, by 1-based page number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSet {
    #[default]
    All,
    Odd,
    Even,
}

impl PageSet {
    pub fn matches(self, page: u32) -> bool {
        match self {
            PageSet::All => true,
            PageSet::Odd => page % 2 == 1,
            PageSet::Even => page % 2 == 0,
        }
    }

    /// True when `page` is in the set and in one of `ranges` (empty means all)
    pub fn selects(self, ranges: &[PageRange], page: u32) -> bool {
        self.matches(page) && (ranges.is_empty() || ranges.iter().any(|r| r.contains(page)))
    }
}

impl FromStr for PageSet {
    type Err = RewriteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Ok(PageSet::All),
            "odd" => Ok(PageSet::Odd),
            "even" => Ok(PageSet::Even),
            other => Err(RewriteError::InvalidParameter(format!(
                "Unknown page set: {}",
                other
            ))),
        }
    }
}

/// Inclusive 1-based page range; `end: None` runs to the last page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    #[serde(default)]
    pub end: Option<u32>,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn single(page: u32) -> Self {
        Self::new(page, page)
    }

    pub fn open(start: u32) -> Self {
        Self { start, end: None }
    }

    pub fn contains(&self, page: u32) -> bool {
        page >= self.start && self.end.map_or(true, |end| page <= end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Number of copies written into the page tree
    pub copies: u32,

    /// Repeat the whole sequence (true) or each page in place (false)
    pub collate: bool,

    pub page_set: PageSet,

    /// Empty means every page
    pub page_ranges: Vec<PageRange>,

    /// Injected as /Title when the source Info dictionary has none
    pub title: Option<String>,

    /// Flate-compress newly synthesized content streams
    pub compress: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            copies: 1,
            collate: false,
            page_set: PageSet::All,
            page_ranges: Vec::new(),
            title: None,
            compress: true,
        }
    }
}

impl Options {
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            copies: std::env::var("PDFREWRITE_COPIES")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.copies),
            collate: std::env::var("PDFREWRITE_COLLATE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.collate),
            page_set: std::env::var("PDFREWRITE_PAGE_SET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.page_set),
            page_ranges: std::env::var("PDFREWRITE_PAGE_RANGES")
                .ok()
                .and_then(|v| parse_page_ranges(&v).ok())
                .unwrap_or(defaults.page_ranges),
            title: std::env::var("PDFREWRITE_TITLE").ok(),
            compress: std::env::var("PDFREWRITE_COMPRESS")
                .map(|v| !(v == "false" || v == "0"))
                .unwrap_or(defaults.compress),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.copies == 0 {
            return Err(RewriteError::InvalidParameter(
                "copies must be at least 1".into(),
            ));
        }
        Ok(())
    }

}
