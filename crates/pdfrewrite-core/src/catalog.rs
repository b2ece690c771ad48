//! Page/catalog transformer
//!
//! Holds the ordered list of output pages and rewrites the document
//! catalog, page tree and page content when the document is written.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, warn};

use crate::error::{Result, RewriteError};
use crate::geometry::{HorizontalPosition, Rect, VerticalPosition};
use crate::nup::{choose_grid, is_supported, Border, NupLayout};
use crate::options::{PageRange, PageSet};
use crate::output::OutputStream;
use crate::page::{find_inherited, Page, SubPage};
use crate::xref::XrefTracker;

/// Catalog entries carried over from the source document
const CARRIED_CATALOG_KEYS: [&[u8]; 5] = [
    b"Lang",
    b"MarkInfo",
    b"Metadata",
    b"OutputIntents",
    b"ViewerPreferences",
];

#[derive(Debug, Clone)]
pub struct Catalog {
    /// Source catalog, read for the carried keys
    root: ObjectId,
    pages: Vec<Page>,
    media_box: Option<Rect>,
}

impl Catalog {
    pub fn new(doc: &Document) -> Result<Self> {
        let root = doc
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|_| RewriteError::Structure("trailer has no /Root reference".into()))?;
        let pages = doc
            .get_pages()
            .into_iter()
            .map(|(number, page_id)| Page::load(doc, number, page_id))
            .collect::<Vec<_>>();
        debug!(pages = pages.len(), "loaded page tree");
        Ok(Self {
            root,
            pages,
            media_box: None,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Keep the pages matching both the set and the ranges, in source order
    pub fn select(&mut self, page_set: PageSet, ranges: &[PageRange]) {
        let before = self.pages.len();
        self.pages.retain(|page| page_set.selects(ranges, page.number));
        debug!(before, after = self.pages.len(), "selected pages");
    }

    /// Impose `n` consecutive pages onto each sheet of size `sheet`
    pub fn nup(
        &mut self,
        n: u32,
        sheet: Rect,
        border: Border,
        layout: NupLayout,
        horizontal: HorizontalPosition,
        vertical: VerticalPosition,
    ) -> Result<()> {
        if !is_supported(n) {
            return Err(RewriteError::UnsupportedNup(n));
        }
        if n == 1 {
            return Ok(());
        }
        if sheet.is_degenerate() {
            return Err(RewriteError::InvalidParameter(
                "nup sheet has no area".into(),
            ));
        }
        if self.pages.is_empty() {
            return Ok(());
        }

        let first = self.pages[0].layout().media_box;
        let grid = choose_grid(n, &first, &sheet);
        debug!(n, cols = grid.cols, rows = grid.rows, turned = grid.turned, "nup grid");

        let sheets = self
            .pages
            .chunks(n as usize)
            .enumerate()
            .map(|(index, group)| {
                let mut subs = Vec::new();
                let mut covered: Option<Rect> = None;
                for (slot, page) in group.iter().enumerate() {
                    let page_layout = page.layout();
                    let place = grid.placement(
                        slot as u32,
                        &page_layout.media_box,
                        &layout,
                        &sheet,
                        horizontal,
                        vertical,
                    );
                    let placed = place.transform_rect(&page_layout.media_box);
                    covered = Some(covered.map_or(placed, |c| c.union(&placed)));
                    subs.extend(page.subs.iter().map(|sub| SubPage {
                        source: sub.source,
                        bbox: sub.bbox,
                        placement: sub.placement.then(&page_layout.matrix).then(&place),
                        border: if border.is_drawn() { border } else { sub.border },
                    }));
                }
                Page::sheet(index as u32 + 1, subs, sheet, covered.unwrap_or(sheet))
            })
            .collect();
        self.pages = sheets;
        Ok(())
    }

    pub fn fit(&mut self, target: Rect, zoom: f64) {
        if target.is_degenerate() {
            warn!(?target, "fit box has no area, pages keep their size");
            return;
        }
        debug!(?target, zoom, "fit");
        for page in &mut self.pages {
            page.fit(target, zoom);
        }
    }

    pub fn scale(&mut self, zoom: f64) {
        debug!(zoom, "scale");
        for page in &mut self.pages {
            page.scale(zoom);
        }
    }

    pub fn mirror(&mut self) {
        debug!("mirror");
        for page in &mut self.pages {
            page.toggle_mirror();
        }
    }

    /// Counter-clockwise rotation in degrees; must be a multiple of 90
    pub fn rotate(&mut self, degrees: i32) -> Result<()> {
        if degrees % 90 != 0 {
            return Err(RewriteError::InvalidRotation(degrees));
        }
        let turns = (degrees.rem_euclid(360) / 90) as u8;
        debug!(degrees, turns, "rotate");
        for page in &mut self.pages {
            page.rotate(turns);
        }
        Ok(())
    }

    pub fn position(
        &mut self,
        target: Rect,
        horizontal: HorizontalPosition,
        vertical: VerticalPosition,
    ) {
        debug!(?target, ?horizontal, ?vertical, "position");
        for page in &mut self.pages {
            page.position(target, horizontal, vertical);
        }
    }

    /// Turn every page whose orientation disagrees with `target` a quarter
    pub fn auto_rotate(&mut self, target: Rect) {
        let mut turned = 0;
        for page in &mut self.pages {
            let oriented = page.oriented_box();
            if (oriented.is_landscape() && target.is_portrait())
                || (oriented.is_portrait() && target.is_landscape())
            {
                page.rotate(1);
                turned += 1;
            }
        }
        debug!(turned, "auto-rotated pages");
    }

    /// Media box written on every output page, replacing the computed one
    pub fn set_media_box(&mut self, media_box: Rect) {
        debug!(?media_box, "override media box");
        self.media_box = Some(media_box);
    }

    /// Write the catalog, page tree, page contents and form XObjects.
    ///
    /// Source objects they refer to are left pending for the tracker to
    /// flush. Returns the id of the new catalog.
    pub fn output<W: Write>(
        &self,
        out: &mut OutputStream<W>,
        tracker: &mut XrefTracker,
        doc: &Document,
        copies: u32,
        collate: bool,
        compress: bool,
    ) -> Result<ObjectId> {
        let catalog_id = tracker.allocate();
        let pages_id = tracker.allocate();

        let mut forms: BTreeMap<ObjectId, (ObjectId, Rect)> = BTreeMap::new();
        let mut planned = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let layout = page.layout();
            let mut xobjects = Dictionary::new();
            let mut names = Vec::with_capacity(page.subs.len());
            for (i, sub) in page.subs.iter().enumerate() {
                let (form_id, _) = *forms
                    .entry(sub.source)
                    .or_insert_with(|| (tracker.allocate(), sub.bbox));
                let name = format!("Pg{}", i);
                xobjects.set(name.as_bytes().to_vec(), Object::Reference(form_id));
                names.push(name);
            }
            let content = page.content_stream(&layout, &names);
            let content_id = tracker.allocate();
            let media_box = self.media_box.unwrap_or(layout.media_box);
            planned.push((content_id, content, xobjects, media_box));
        }

        let order: Vec<usize> = if collate {
            (0..copies)
                .flat_map(|_| 0..planned.len())
                .collect()
        } else {
            (0..planned.len())
                .flat_map(|i| std::iter::repeat(i).take(copies as usize))
                .collect()
        };
        let kids: Vec<(ObjectId, usize)> = order
            .into_iter()
            .map(|index| (tracker.allocate(), index))
            .collect();

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        match doc.get_dictionary(self.root) {
            Ok(source) => {
                for key in CARRIED_CATALOG_KEYS {
                    if let Ok(value) = source.get(key) {
                        catalog.set(key.to_vec(), value.clone());
                    }
                }
            }
            Err(_) => warn!(root = self.root.0, "source catalog is not a dictionary"),
        }
        tracker.emit(out, catalog_id, &Object::Dictionary(catalog))?;

        let page_tree = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            (
                "Kids",
                Object::Array(kids.iter().map(|(id, _)| Object::Reference(*id)).collect()),
            ),
            ("Count", Object::Integer(kids.len() as i64)),
        ]);
        tracker.emit(out, pages_id, &Object::Dictionary(page_tree))?;

        for (page_id, index) in &kids {
            let (content_id, _, xobjects, media_box) = &planned[*index];
            let resources = Dictionary::from_iter(vec![(
                "XObject",
                Object::Dictionary(xobjects.clone()),
            )]);
            let page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("MediaBox", media_box.to_object()),
                ("Resources", Object::Dictionary(resources)),
                ("Contents", Object::Reference(*content_id)),
            ]);
            tracker.emit(out, *page_id, &Object::Dictionary(page))?;
        }

        for (content_id, content, _, _) in &planned {
            let stream = content_stream(content.clone(), compress)?;
            tracker.emit(out, *content_id, &Object::Stream(stream))?;
        }

        for (source, (form_id, bbox)) in &forms {
            let form = form_xobject(doc, *source, bbox, compress)?;
            tracker.emit(out, *form_id, &Object::Stream(form))?;
        }

        debug!(
            pages = kids.len(),
            forms = forms.len(),
            copies,
            collate,
            "wrote page tree"
        );
        Ok(catalog_id)
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn content_stream(content: Vec<u8>, compress: bool) -> Result<Stream> {
    let mut dict = Dictionary::new();
    if compress {
        dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        Ok(Stream::new(dict, deflate(&content)?))
    } else {
        Ok(Stream::new(dict, content))
    }
}

/// Decoded bytes of a content stream
fn decoded(stream: &Stream) -> Result<Vec<u8>> {
    if !stream.dict.has(b"Filter") {
        return Ok(stream.content.clone());
    }
    stream
        .decompressed_content()
        .map_err(|e| RewriteError::Stream(e.to_string()))
}

/// Source page wrapped as a Form XObject.
///
/// A single content stream is reused as-is, filters included; several
/// streams are decoded and joined.
fn form_xobject(doc: &Document, page_id: ObjectId, bbox: &Rect, compress: bool) -> Result<Stream> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|_| RewriteError::Structure(format!("page {} is not a dictionary", page_id.0)))?;

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Form".to_vec()));
    dict.set("FormType", Object::Integer(1));
    dict.set("BBox", bbox.to_object());
    match find_inherited(doc, page_id, b"Resources") {
        Some(resources) => dict.set("Resources", resources.clone()),
        None => dict.set("Resources", Object::Dictionary(Dictionary::new())),
    }
    if let Ok(group) = page.get(b"Group") {
        dict.set("Group", group.clone());
    }

    let mut streams: Vec<&Stream> = Vec::new();
    let contents = page.get(b"Contents").ok().map(|obj| match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    });
    match contents.flatten() {
        Some(Object::Stream(stream)) => streams.push(stream),
        Some(Object::Array(items)) => {
            for item in items {
                let target = match item {
                    Object::Reference(id) => doc.get_object(*id).ok(),
                    other => Some(other),
                };
                match target {
                    Some(Object::Stream(stream)) => streams.push(stream),
                    _ => warn!(page = page_id.0, "skipping non-stream content entry"),
                }
            }
        }
        Some(_) => warn!(page = page_id.0, "page /Contents is not a stream"),
        None => {}
    }

    if let [single] = streams.as_slice() {
        for key in [b"Filter".as_slice(), b"DecodeParms".as_slice()] {
            if let Ok(value) = single.dict.get(key) {
                dict.set(key.to_vec(), value.clone());
            }
        }
        return Ok(Stream::new(dict, single.content.clone()));
    }

    let mut joined = Vec::new();
    for stream in streams {
        joined.extend_from_slice(&decoded(stream)?);
        joined.push(b'\n');
    }
    if compress && !joined.is_empty() {
        dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        joined = deflate(&joined)?;
    }
    Ok(Stream::new(dict, joined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Matrix;
    use pretty_assertions::assert_eq;

    fn create_test_doc(sizes: &[(i64, i64)]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for (i, &(w, h)) in sizes.iter().enumerate() {
            let content = format!("BT /F1 12 Tf 72 72 Td (Page {}) Tj ET", i + 1);
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
            let page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(w),
                        Object::Integer(h),
                    ]),
                ),
                ("Contents", Object::Reference(content_id)),
            ]);
            kids.push(Object::Reference(doc.add_object(page)));
        }
        let count = kids.len() as i64;
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
            ("Lang", Object::String(b"en".to_vec(), lopdf::StringFormat::Literal)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc
    }

    fn letter_doc(pages: usize) -> Document {
        create_test_doc(&vec![(612, 792); pages])
    }

    fn numbers(catalog: &Catalog) -> Vec<u32> {
        catalog.pages().iter().map(|p| p.number).collect()
    }

    #[test]
    fn test_new_reads_pages_in_order() {
        let catalog = Catalog::new(&letter_doc(4)).unwrap();
        assert_eq!(catalog.page_count(), 4);
        assert_eq!(numbers(&catalog), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_new_requires_root() {
        let doc = Document::with_version("1.5");
        assert!(matches!(Catalog::new(&doc), Err(RewriteError::Structure(_))));
    }

    #[test]
    fn test_select_odd_and_even() {
        let doc = letter_doc(10);
        let mut odd = Catalog::new(&doc).unwrap();
        odd.select(PageSet::Odd, &[]);
        assert_eq!(numbers(&odd), vec![1, 3, 5, 7, 9]);

        let mut even = Catalog::new(&doc).unwrap();
        even.select(PageSet::Even, &[]);
        assert_eq!(numbers(&even), vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_select_intersects_set_and_ranges() {
        let mut catalog = Catalog::new(&letter_doc(10)).unwrap();
        catalog.select(PageSet::Odd, &[PageRange::new(3, 5)]);
        assert_eq!(numbers(&catalog), vec![3, 5]);
    }

    #[test]
    fn test_select_can_empty_the_document() {
        let mut catalog = Catalog::new(&letter_doc(3)).unwrap();
        catalog.select(PageSet::All, &[PageRange::open(9)]);
        assert_eq!(catalog.page_count(), 0);
    }

    #[test]
    fn test_nup_groups_pages() {
        for (pages, n, expected) in [(5, 2, 3), (4, 4, 1), (9, 4, 3), (16, 16, 1), (7, 6, 2)] {
            let mut catalog = Catalog::new(&letter_doc(pages)).unwrap();
            catalog
                .nup(
                    n,
                    Rect::letter(),
                    Border::None,
                    NupLayout::default(),
                    HorizontalPosition::Center,
                    VerticalPosition::Center,
                )
                .unwrap();
            assert_eq!(catalog.page_count(), expected, "{} pages {}-up", pages, n);
        }
    }

    #[test]
    fn test_nup_rejects_unsupported_without_mutation() {
        let mut catalog = Catalog::new(&letter_doc(4)).unwrap();
        let before = catalog.pages().to_vec();
        let err = catalog
            .nup(
                3,
                Rect::letter(),
                Border::None,
                NupLayout::default(),
                HorizontalPosition::Center,
                VerticalPosition::Center,
            )
            .unwrap_err();
        assert!(matches!(err, RewriteError::UnsupportedNup(3)));
        assert_eq!(catalog.pages(), before.as_slice());
    }

    #[test]
    fn test_nup_one_is_a_no_op() {
        let mut catalog = Catalog::new(&letter_doc(3)).unwrap();
        let before = catalog.pages().to_vec();
        catalog
            .nup(
                1,
                Rect::letter(),
                Border::None,
                NupLayout::default(),
                HorizontalPosition::Center,
                VerticalPosition::Center,
            )
            .unwrap();
        assert_eq!(catalog.pages(), before.as_slice());
    }

    #[test]
    fn test_nup_one_ignores_sheet_size() {
        let mut catalog = Catalog::new(&letter_doc(2)).unwrap();
        let before = catalog.pages().to_vec();
        catalog
            .nup(
                1,
                Rect::from_size(0.0, 0.0),
                Border::None,
                NupLayout::default(),
                HorizontalPosition::Center,
                VerticalPosition::Center,
            )
            .unwrap();
        assert_eq!(catalog.pages(), before.as_slice());
    }

    #[test]
    fn test_nup_rejects_empty_sheet() {
        let mut catalog = Catalog::new(&letter_doc(2)).unwrap();
        let err = catalog
            .nup(
                2,
                Rect::from_size(0.0, 0.0),
                Border::None,
                NupLayout::default(),
                HorizontalPosition::Center,
                VerticalPosition::Center,
            )
            .unwrap_err();
        assert!(err.is_invalid_parameter());
        assert_eq!(catalog.page_count(), 2);
    }

    #[test]
    fn test_fit_to_empty_box_keeps_scale() {
        let mut catalog = Catalog::new(&letter_doc(1)).unwrap();
        catalog.scale(0.5);
        let before = catalog.pages()[0].layout().matrix;
        catalog.fit(Rect::from_size(0.0, 0.0), 1.0);
        let after = catalog.pages()[0].layout().matrix;
        assert!(before.approx_eq(&after, 1e-9));
        assert_eq!(catalog.pages()[0].sizing, crate::page::Sizing::Scale(0.5));
    }

    #[test]
    fn test_rotate_rejects_partial_turns() {
        let mut catalog = Catalog::new(&letter_doc(1)).unwrap();
        assert!(matches!(
            catalog.rotate(45),
            Err(RewriteError::InvalidRotation(45))
        ));
        assert_eq!(catalog.pages()[0].quarter_turns, 0);
        catalog.rotate(-90).unwrap();
        assert_eq!(catalog.pages()[0].quarter_turns, 3);
    }

    #[test]
    fn test_auto_rotate_is_idempotent() {
        let doc = create_test_doc(&[(792, 612), (612, 792), (500, 500)]);
        let mut catalog = Catalog::new(&doc).unwrap();
        catalog.auto_rotate(Rect::letter());
        let turns: Vec<u8> = catalog.pages().iter().map(|p| p.quarter_turns).collect();
        assert_eq!(turns, vec![1, 0, 0]);
        catalog.auto_rotate(Rect::letter());
        let again: Vec<u8> = catalog.pages().iter().map(|p| p.quarter_turns).collect();
        assert_eq!(again, turns);
    }

    #[test]
    fn test_mirror_toggles() {
        let mut catalog = Catalog::new(&letter_doc(1)).unwrap();
        catalog.mirror();
        assert!(catalog.pages()[0].mirrored);
        catalog.mirror();
        assert!(!catalog.pages()[0].mirrored);
    }

    #[test]
    fn test_nup_placement_of_two_up() {
        let mut catalog = Catalog::new(&letter_doc(2)).unwrap();
        catalog
            .nup(
                2,
                Rect::letter(),
                Border::None,
                NupLayout::default(),
                HorizontalPosition::Center,
                VerticalPosition::Center,
            )
            .unwrap();
        let sheet = &catalog.pages()[0];
        assert_eq!(sheet.subs.len(), 2);
        // pages are turned a quarter and stacked, the first on the lower half
        let scale = 396.0 / 612.0;
        let first = sheet.subs[0].placement;
        let placed = first.transform_rect(&Rect::letter());
        assert!((first.scale_factor() - scale).abs() < 1e-9);
        let across = 792.0 * scale;
        let margin = (612.0 - across) / 2.0;
        assert!(placed.approx_eq(&Rect::new(margin, 0.0, margin + across, 396.0), 1e-6));
        let second = sheet.subs[1].placement.transform_rect(&Rect::letter());
        assert!(second.approx_eq(&Rect::new(margin, 396.0, margin + across, 792.0), 1e-6));
        assert!(!first.approx_eq(&Matrix::identity(), 1e-9));
    }

    #[test]
    fn test_output_writes_copies_uncollated() {
        let doc = letter_doc(2);
        let catalog = Catalog::new(&doc).unwrap();
        let mut tracker = XrefTracker::new(&doc);
        let mut out = OutputStream::new(Vec::new());
        let root = catalog
            .output(&mut out, &mut tracker, &doc, 2, false, false)
            .unwrap();
        assert!(tracker.is_recorded(root));
        let text = String::from_utf8_lossy(&out.into_inner()).to_string();
        assert!(text.contains("/Count 4"));
        assert!(text.contains("/Lang (en)"));
        assert!(text.contains("/Subtype /Form"));
        // forms are shared between copies
        assert_eq!(text.matches("/Subtype /Form").count(), 2);
    }
}
