//! Document orchestrator
//!
//! Writes the file in a single pass:
//!
//! ```text
//! %PDF-x.y, binary marker, generator comment [, device copy comments]
//! rewritten catalog, page tree, contents, forms
//! flushed source objects
//! xref
//! trailer << /Size /Root /Info >>
//! startxref, %%EOF
//! ```

use std::collections::HashSet;
use std::io::Write;

use chrono::{DateTime, FixedOffset, Local};
use lopdf::{Dictionary, Document, Object, StringFormat};
use tracing::{debug, info, instrument};

use crate::catalog::Catalog;
use crate::error::Result;
use crate::geometry::{HorizontalPosition, Rect, VerticalPosition};
use crate::nup::{Border, NupLayout};
use crate::options::{Options, PageRange, PageSet};
use crate::output::OutputStream;
use crate::serialize::{write_name, write_object};
use crate::xref::XrefTracker;

pub const PRODUCER: &str = "pdfrewrite";

/// Rewrites one parsed document according to the requested operations
#[derive(Debug)]
pub struct PdfRewriter<'a> {
    source: &'a Document,
    options: Options,
    catalog: Catalog,
}

impl<'a> PdfRewriter<'a> {
    pub fn new(source: &'a Document, options: Options) -> Result<Self> {
        options.validate()?;
        let catalog = Catalog::new(source)?;
        Ok(Self {
            source,
            options,
            catalog,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn page_count(&self) -> usize {
        self.catalog.page_count()
    }

    /// Apply the configured page set and ranges
    pub fn select(&mut self) {
        let page_set = self.options.page_set;
        let ranges = self.options.page_ranges.clone();
        self.catalog.select(page_set, &ranges);
    }

    pub fn select_pages(&mut self, page_set: PageSet, ranges: &[PageRange]) {
        self.catalog.select(page_set, ranges);
    }

    pub fn nup(
        &mut self,
        n: u32,
        sheet: Rect,
        border: Border,
        layout: NupLayout,
        horizontal: HorizontalPosition,
        vertical: VerticalPosition,
    ) -> Result<()> {
        self.catalog
            .nup(n, sheet, border, layout, horizontal, vertical)
    }

    pub fn fit(&mut self, target: Rect, zoom: f64) {
        self.catalog.fit(target, zoom);
    }

    pub fn scale(&mut self, zoom: f64) {
        self.catalog.scale(zoom);
    }

    pub fn mirror(&mut self) {
        self.catalog.mirror();
    }

    pub fn rotate(&mut self, degrees: i32) -> Result<()> {
        self.catalog.rotate(degrees)
    }

    pub fn position(
        &mut self,
        target: Rect,
        horizontal: HorizontalPosition,
        vertical: VerticalPosition,
    ) {
        self.catalog.position(target, horizontal, vertical);
    }

    pub fn auto_rotate(&mut self, target: Rect) {
        self.catalog.auto_rotate(target);
    }

    pub fn set_media_box(&mut self, media_box: Rect) {
        self.catalog.set_media_box(media_box);
    }

    /// Write the rewritten document to `sink`, dated now.
    ///
    /// `device_copies > 0` adds the comments telling a printer driver how
    /// many copies to make itself. Returns the number of bytes written.
    pub fn output<W: Write>(&self, sink: W, device_copies: u32, device_collate: bool) -> Result<u64> {
        let now: DateTime<FixedOffset> = Local::now().into();
        self.output_at(sink, device_copies, device_collate, now)
    }

    #[instrument(skip_all, fields(pages = self.catalog.page_count(), device_copies = device_copies))]
    pub fn output_at<W: Write>(
        &self,
        sink: W,
        device_copies: u32,
        device_collate: bool,
        date: DateTime<FixedOffset>,
    ) -> Result<u64> {
        let mut out = OutputStream::new(sink);
        let mut tracker = XrefTracker::new(self.source);

        out.write_str(&format!("%PDF-{}\n", self.source.version))?;
        out.write(b"%\x81\x82\x83\x84\n")?;
        out.write_str(&format!("% This file was generated by {}\n", PRODUCER))?;
        if device_copies > 0 {
            out.write_str(&format!("%%PDFTOPDFNumCopies : {}\n", device_copies))?;
            out.write_str(&format!("%%PDFTOPDFCollate : {}\n", device_collate))?;
        }

        let root = self.catalog.output(
            &mut out,
            &mut tracker,
            self.source,
            self.options.copies,
            self.options.collate,
            self.options.compress,
        )?;

        // rendered before flush so objects it points at get written
        let info = self.render_info(&mut tracker, &date);
        let flushed = tracker.flush(&mut out, self.source)?;
        debug!(flushed, "flushed source objects");

        let xref_offset = tracker.write_table(&mut out)?;
        let mut trailer = format!("trailer\n<< /Size {} /Root {} {} R /Info ", tracker.size(), root.0, root.1)
            .into_bytes();
        trailer.extend_from_slice(&info);
        trailer.extend_from_slice(format!(" >>\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());
        out.write(&trailer)?;
        out.flush()?;

        info!(
            bytes = out.position(),
            objects = tracker.size(),
            "wrote document"
        );
        Ok(out.position())
    }

    fn source_info(&self) -> Option<&Dictionary> {
        match self.source.trailer.get(b"Info").ok()? {
            Object::Reference(id) => self.source.get_dictionary(*id).ok(),
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Info dictionary: source entries in their order, then missing defaults
    fn render_info(&self, tracker: &mut XrefTracker, date: &DateTime<FixedOffset>) -> Vec<u8> {
        let mut buf = b"<<".to_vec();
        let mut present: HashSet<&[u8]> = HashSet::new();
        if let Some(info) = self.source_info() {
            for (key, value) in info.iter() {
                push_entry(&mut buf, key, value, tracker);
                present.insert(key.as_slice());
            }
        }

        let stamp = Object::String(pdf_date(date).into_bytes(), StringFormat::Literal);
        let defaults: [(&[u8], Option<Object>); 5] = [
            (
                b"Title",
                self.options
                    .title
                    .as_deref()
                    .map(|t| Object::String(encode_text_string(t), StringFormat::Literal)),
            ),
            (b"CreationDate", Some(stamp.clone())),
            (b"ModDate", Some(stamp)),
            (
                b"Producer",
                Some(Object::String(PRODUCER.as_bytes().to_vec(), StringFormat::Literal)),
            ),
            (b"Trapped", Some(Object::Name(b"False".to_vec()))),
        ];
        for (key, value) in defaults {
            if present.contains(key) {
                continue;
            }
            if let Some(value) = value {
                push_entry(&mut buf, key, &value, tracker);
            }
        }
        buf.extend_from_slice(b" >>");
        buf
    }
}

fn push_entry(buf: &mut Vec<u8>, key: &[u8], value: &Object, tracker: &mut XrefTracker) {
    buf.push(b' ');
    write_name(buf, key);
    buf.push(b' ');
    write_object(buf, value, tracker);
}

/// `D:YYYYMMDDHHmmSS+HH'mm'`
pub fn pdf_date(date: &DateTime<FixedOffset>) -> String {
    let offset = date.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let offset = offset.abs();
    format!(
        "D:{}{}{:02}'{:02}'",
        date.format("%Y%m%d%H%M%S"),
        sign,
        offset / 3600,
        (offset % 3600) / 60
    )
}

/// PDF text string: ASCII as-is, anything else as UTF-16BE with a BOM
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}
