//! PDF page rewriting
//!
//! Reads a document with lopdf, applies page selection, N-up imposition and
//! page transforms, and writes a new file in a single pass with its own
//! cross-reference table.
//!
//! - `PdfRewriter`: orchestrates one session (header, body, xref, trailer)
//! - `Catalog`: page list and transformations, emits the new page tree
//! - `XrefTracker` / `serialize`: object numbering and PDF syntax

pub mod catalog;
pub mod document;
pub mod error;
pub mod geometry;
pub mod nup;
pub mod options;
pub mod output;
pub mod page;
pub mod serialize;
pub mod xref;

pub use catalog::Catalog;
pub use document::PdfRewriter;
pub use error::{Result, RewriteError};
pub use geometry::{parse_position, HorizontalPosition, Matrix, Rect, VerticalPosition};
pub use nup::{Border, NupLayout};
pub use options::{Options, PageRange, PageSet};
pub use output::OutputStream;
pub use xref::XrefTracker;

/// Parse PDF bytes into a document ready for rewriting
pub fn load_document(bytes: &[u8]) -> Result<lopdf::Document> {
    lopdf::Document::load_mem(bytes).map_err(|e| RewriteError::Structure(e.to_string()))
}

/// Parse page range string like "1-3, 5, 8-" into ranges, keeping their order
pub fn parse_page_ranges(input: &str) -> Result<Vec<PageRange>> {
    let mut ranges = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let range = if let Some((start, end)) = part.split_once('-') {
            let start = parse_page_number(start)?;
            if end.trim().is_empty() {
                // Open range like "8-"
                PageRange::open(start)
            } else {
                let end = parse_page_number(end)?;
                if start > end {
                    return Err(RewriteError::InvalidRange(format!(
                        "Start {} > end {}",
                        start, end
                    )));
                }
                PageRange::new(start, end)
            }
        } else {
            PageRange::single(parse_page_number(part)?)
        };
        ranges.push(range);
    }

    Ok(ranges)
}

fn parse_page_number(text: &str) -> Result<u32> {
    let text = text.trim();
    match text.parse::<u32>() {
        Ok(0) => Err(RewriteError::InvalidRange("Pages are numbered from 1".into())),
        Ok(page) => Ok(page),
        Err(_) => Err(RewriteError::InvalidRange(format!("Invalid page: {}", text))),
    }
}
