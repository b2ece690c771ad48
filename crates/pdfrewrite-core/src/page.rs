//! Per-page transform state
//!
//! A page is a list of placed source pages plus the page-level state that
//! `rotate`, `mirror`, `scale`/`fit` and `position` accumulate. The state is
//! composed in that fixed order by [`Page::layout`], so the result does not
//! depend on the order in which the operations were requested.

use lopdf::{Document, Object, ObjectId};
use tracing::warn;

use crate::geometry::{HorizontalPosition, Matrix, Rect, VerticalPosition};
use crate::nup::Border;
use crate::serialize::format_number;

/// Guard against cyclic `/Parent` chains
const MAX_TREE_DEPTH: usize = 64;

/// Look up `key` on a page, walking up the page tree for inheritable
/// attributes. Returns the value as stored (references are not followed).
pub fn find_inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    warn!(page = page_id.0, "page tree deeper than {}", MAX_TREE_DEPTH);
    None
}

/// Follow a single level of indirection
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn inherited_box(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Rect> {
    find_inherited(doc, page_id, key)
        .and_then(|obj| resolve(doc, obj))
        .and_then(Rect::from_object)
}

/// Visible area of a source page: CropBox clipped to MediaBox
pub fn source_page_box(doc: &Document, page_id: ObjectId) -> Rect {
    let media = inherited_box(doc, page_id, b"MediaBox")
        .filter(|r| !r.is_degenerate())
        .unwrap_or_else(|| {
            warn!(page = page_id.0, "missing MediaBox, assuming Letter");
            Rect::letter()
        });
    match inherited_box(doc, page_id, b"CropBox") {
        Some(crop) => crop.intersect(&media).unwrap_or(media),
        None => media,
    }
}

/// `/Rotate` as counter-clockwise quarter turns to apply when placing the page
pub fn source_page_turns(doc: &Document, page_id: ObjectId) -> u8 {
    let degrees = find_inherited(doc, page_id, b"Rotate")
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_i64().ok())
        .unwrap_or(0);
    if degrees % 90 != 0 {
        warn!(page = page_id.0, degrees, "ignoring /Rotate that is not a multiple of 90");
        return 0;
    }
    // /Rotate is clockwise
    ((4 - (degrees / 90).rem_euclid(4)) % 4) as u8
}

/// One source page drawn on an output page
#[derive(Debug, Clone, PartialEq)]
pub struct SubPage {
    /// Source page object, drawn through its form XObject
    pub source: ObjectId,
    /// Form bounding box in source page space
    pub bbox: Rect,
    /// Form space to page space, before the page-level state
    pub placement: Matrix,
    pub border: Border,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sizing {
    Natural,
    /// Factor about the lower-left corner of the page
    Scale(f64),
    /// Aspect-preserving fit of the content into `target`, then `zoom`
    Fit { target: Rect, zoom: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub target: Rect,
    pub horizontal: HorizontalPosition,
    pub vertical: VerticalPosition,
}

/// Result of composing the page-level state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    /// Page space to output space
    pub matrix: Matrix,
    pub media_box: Rect,
    pub content_box: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based number in the source document (sheet number after `nup`)
    pub number: u32,
    pub subs: Vec<SubPage>,
    /// Media box before the page-level state
    pub base_box: Rect,
    /// Area covered by the placed sub-pages, same frame as `base_box`
    pub content_box: Rect,
    pub quarter_turns: u8,
    pub mirrored: bool,
    pub sizing: Sizing,
    pub anchor: Option<Anchor>,
}

impl Page {
    /// A source page drawn upright: its /Rotate is folded into the placement
    pub fn from_source(number: u32, source: ObjectId, bbox: Rect, turns: u8) -> Self {
        let (placement, upright) = Matrix::quarter_turn(&bbox, turns);
        Self::sheet(
            number,
            vec![SubPage {
                source,
                bbox,
                placement,
                border: Border::None,
            }],
            upright,
            upright,
        )
    }

    /// A page with fresh page-level state
    pub fn sheet(number: u32, subs: Vec<SubPage>, base_box: Rect, content_box: Rect) -> Self {
        Self {
            number,
            subs,
            base_box,
            content_box,
            quarter_turns: 0,
            mirrored: false,
            sizing: Sizing::Natural,
            anchor: None,
        }
    }

    pub fn load(doc: &Document, number: u32, page_id: ObjectId) -> Self {
        let bbox = source_page_box(doc, page_id);
        let turns = source_page_turns(doc, page_id);
        Self::from_source(number, page_id, bbox, turns)
    }

    pub fn rotate(&mut self, turns: u8) {
        self.quarter_turns = (self.quarter_turns + turns) % 4;
    }

    pub fn toggle_mirror(&mut self) {
        self.mirrored = !self.mirrored;
    }

    pub fn scale(&mut self, factor: f64) {
        self.sizing = match self.sizing {
            Sizing::Natural => Sizing::Scale(factor),
            Sizing::Scale(current) => Sizing::Scale(current * factor),
            Sizing::Fit { target, zoom } => Sizing::Fit {
                target,
                zoom: zoom * factor,
            },
        };
    }

    pub fn fit(&mut self, target: Rect, zoom: f64) {
        self.sizing = Sizing::Fit { target, zoom };
    }

    pub fn position(&mut self, target: Rect, horizontal: HorizontalPosition, vertical: VerticalPosition) {
        self.anchor = Some(Anchor {
            target,
            horizontal,
            vertical,
        });
    }

    /// Media box after rotation only; sizing and anchoring do not change it
    pub fn oriented_box(&self) -> Rect {
        Matrix::quarter_turn(&self.base_box, self.quarter_turns).1
    }

    /// Compose rotation, mirror, sizing and position into one matrix
    pub fn layout(&self) -> Layout {
        let (mut matrix, media_box) = Matrix::quarter_turn(&self.base_box, self.quarter_turns);
        let mut content = matrix.transform_rect(&self.content_box);

        if self.mirrored {
            let flip = Matrix::mirror(&media_box);
            matrix = matrix.then(&flip);
            content = flip.transform_rect(&content);
        }

        let sizing = match self.sizing {
            Sizing::Natural => None,
            Sizing::Scale(factor) => Some(Matrix::scale_about(factor, media_box.x1, media_box.y1)),
            Sizing::Fit { target, zoom } if !content.is_degenerate() && !target.is_degenerate() => {
                let factor = (target.width() / content.width())
                    .min(target.height() / content.height())
                    * zoom;
                let (cx, cy) = content.center();
                let (tx, ty) = target.center();
                Some(
                    Matrix::translate(-cx, -cy)
                        .then(&Matrix::scale(factor, factor))
                        .then(&Matrix::translate(tx, ty)),
                )
            }
            Sizing::Fit { .. } => None,
        };
        if let Some(step) = sizing {
            matrix = matrix.then(&step);
            content = step.transform_rect(&content);
        }

        if let Some(anchor) = self.anchor {
            let step = Matrix::translate(
                anchor.horizontal.offset(&content, &anchor.target),
                anchor.vertical.offset(&content, &anchor.target),
            );
            matrix = matrix.then(&step);
            content = step.transform_rect(&content);
        }

        Layout {
            matrix,
            media_box,
            content_box: content,
        }
    }

    /// Content stream drawing each sub-page through the XObject named in
    /// `names` (same order as `subs`)
    pub fn content_stream(&self, layout: &Layout, names: &[String]) -> Vec<u8> {
        let mut ops = String::new();
        for (sub, name) in self.subs.iter().zip(names) {
            let matrix = sub.placement.then(&layout.matrix);
            ops.push_str("q\n");
            ops.push_str(&matrix.to_operands());
            ops.push_str(" cm\n/");
            ops.push_str(name);
            ops.push_str(" Do\n");
            if sub.border.is_drawn() {
                push_border(&mut ops, &sub.bbox, sub.border, matrix.scale_factor());
            }
            ops.push_str("Q\n");
        }
        ops.into_bytes()
    }
}

/// Stroke `bbox` in form space so the line keeps its width on the page
fn push_border(ops: &mut String, bbox: &Rect, border: Border, scale: f64) {
    if scale <= 0.0 {
        return;
    }
    let width = border.line_width() / scale;
    let mut rects = vec![*bbox];
    if border.is_double() {
        let inset = 2.0 * width;
        rects.push(Rect::new(
            bbox.x1 + inset,
            bbox.y1 + inset,
            bbox.x2 - inset,
            bbox.y2 - inset,
        ));
    }
    ops.push_str(&format!("{} w\n", format_number(width)));
    for r in rects {
        ops.push_str(&format!(
            "{} {} {} {} re S\n",
            format_number(r.x1),
            format_number(r.y1),
            format_number(r.width()),
            format_number(r.height())
        ));
    }
}
