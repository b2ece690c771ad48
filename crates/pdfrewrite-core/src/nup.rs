//! N-up imposition: grid selection, reading order and cell placement

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RewriteError};
use crate::geometry::{HorizontalPosition, Matrix, Rect, VerticalPosition};

/// Page counts accepted by `nup`
pub const SUPPORTED_NUP: [u32; 7] = [1, 2, 4, 6, 8, 9, 16];

pub fn is_supported(n: u32) -> bool {
    SUPPORTED_NUP.contains(&n)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisOrder {
    /// Fill a row before moving to the next one
    #[default]
    HorizontalFirst,
    /// Fill a column before moving to the next one
    VerticalFirst,
}

/// Reading order of the cells on a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NupLayout {
    pub order: AxisOrder,
    pub left_to_right: bool,
    pub top_to_bottom: bool,
}

impl Default for NupLayout {
    fn default() -> Self {
        Self {
            order: AxisOrder::HorizontalFirst,
            left_to_right: true,
            top_to_bottom: true,
        }
    }
}

impl FromStr for NupLayout {
    type Err = RewriteError;

    /// CUPS `number-up-layout` keywords: `lrtb`, `lrbt`, `rltb`, `rlbt`,
    /// `tblr`, `tbrl`, `btlr`, `btrl`
    fn from_str(s: &str) -> Result<Self> {
        let keyword = s.trim().to_ascii_lowercase();
        let invalid = || RewriteError::InvalidParameter(format!("Unknown layout: {}", s));
        if keyword.len() != 4 || !keyword.is_ascii() {
            return Err(invalid());
        }
        let (first, second) = keyword.split_at(2);
        let horizontal = |d: &str| match d {
            "lr" => Some(true),
            "rl" => Some(false),
            _ => None,
        };
        let vertical = |d: &str| match d {
            "tb" => Some(true),
            "bt" => Some(false),
            _ => None,
        };
        let (order, left_to_right, top_to_bottom) =
            match (horizontal(first), vertical(second), vertical(first), horizontal(second)) {
                (Some(lr), Some(tb), _, _) => (AxisOrder::HorizontalFirst, lr, tb),
                (_, _, Some(tb), Some(lr)) => (AxisOrder::VerticalFirst, lr, tb),
                _ => return Err(invalid()),
            };
        Ok(Self {
            order,
            left_to_right,
            top_to_bottom,
        })
    }
}

/// Frame drawn around each imposed page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Border {
    #[default]
    None,
    Single,
    SingleThick,
    Double,
    DoubleThick,
}

impl Border {
    /// Stroke width in points on the output page
    pub fn line_width(self) -> f64 {
        match self {
            Border::None => 0.0,
            Border::Single | Border::Double => 0.5,
            Border::SingleThick | Border::DoubleThick => 1.0,
        }
    }

    pub fn is_double(self) -> bool {
        matches!(self, Border::Double | Border::DoubleThick)
    }

    pub fn is_drawn(self) -> bool {
        self != Border::None
    }
}

impl FromStr for Border {
    type Err = RewriteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Border::None),
            "single" => Ok(Border::Single),
            "single-thick" => Ok(Border::SingleThick),
            "double" => Ok(Border::Double),
            "double-thick" => Ok(Border::DoubleThick),
            other => Err(RewriteError::InvalidParameter(format!(
                "Unknown border: {}",
                other
            ))),
        }
    }
}

/// Grid chosen for one `nup` call.
///
/// `cols` and `rows` are counted in the reading frame: the sheet itself, or
/// the sheet turned a quarter when `turned` is set (pages then run across
/// the long edge of a portrait sheet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub cols: u32,
    pub rows: u32,
    pub turned: bool,
}

/// Sheet seen in the reading frame
fn reading_frame(sheet: &Rect, turned: bool) -> Rect {
    if turned {
        Rect::new(
            sheet.x1,
            sheet.y1,
            sheet.x1 + sheet.height(),
            sheet.y1 + sheet.width(),
        )
    } else {
        *sheet
    }
}

/// Scale at which `page` fits a `cols` x `rows` cell of `frame`
fn cell_scale(page: &Rect, frame: &Rect, cols: u32, rows: u32) -> f64 {
    let cell_w = frame.width() / cols as f64;
    let cell_h = frame.height() / rows as f64;
    (cell_w / page.width()).min(cell_h / page.height())
}

/// Pick the factorization of `n` (upright or turned) that shows `page` largest.
///
/// Ties prefer upright pages, then more columns.
pub fn choose_grid(n: u32, page: &Rect, sheet: &Rect) -> Grid {
    let mut best = Grid {
        cols: n,
        rows: 1,
        turned: false,
    };
    let mut best_scale = f64::NEG_INFINITY;
    if page.is_degenerate() || sheet.is_degenerate() {
        return best;
    }
    for turned in [false, true] {
        let frame = reading_frame(sheet, turned);
        for cols in (1..=n).rev().filter(|c| n % c == 0) {
            let rows = n / cols;
            let scale = cell_scale(page, &frame, cols, rows);
            if scale > best_scale + 1e-9 {
                best_scale = scale;
                best = Grid {
                    cols,
                    rows,
                    turned,
                };
            }
        }
    }
    best
}

impl Grid {
    pub fn capacity(&self) -> u32 {
        self.cols * self.rows
    }

    /// Cell of `slot` in the reading frame of `sheet`
    pub fn cell(&self, slot: u32, layout: &NupLayout, sheet: &Rect) -> Rect {
        let frame = reading_frame(sheet, self.turned);
        let (i, j) = match layout.order {
            AxisOrder::HorizontalFirst => (slot % self.cols, slot / self.cols),
            AxisOrder::VerticalFirst => (slot / self.rows, slot % self.rows),
        };
        let col = if layout.left_to_right {
            i
        } else {
            self.cols - 1 - i
        };
        // counted from the top edge
        let row = if layout.top_to_bottom {
            j
        } else {
            self.rows - 1 - j
        };
        let cell_w = frame.width() / self.cols as f64;
        let cell_h = frame.height() / self.rows as f64;
        let x1 = frame.x1 + col as f64 * cell_w;
        let y2 = frame.y2 - row as f64 * cell_h;
        Rect::new(x1, y2 - cell_h, x1 + cell_w, y2)
    }

    /// Map from the reading frame onto the sheet
    pub fn frame_to_sheet(&self, sheet: &Rect) -> Matrix {
        if self.turned {
            Matrix::quarter_turn(&reading_frame(sheet, true), 1).0
        } else {
            Matrix::identity()
        }
    }

    /// Full placement of a page box into `slot`: scale to the cell, anchor
    /// inside it, then carry the reading frame onto the sheet
    pub fn placement(
        &self,
        slot: u32,
        page: &Rect,
        layout: &NupLayout,
        sheet: &Rect,
        horizontal: HorizontalPosition,
        vertical: VerticalPosition,
    ) -> Matrix {
        let cell = self.cell(slot, layout, sheet);
        fit_into_cell(page, &cell, horizontal, vertical).then(&self.frame_to_sheet(sheet))
    }
}

/// Scale `page` to fit `cell`, preserving aspect ratio, and anchor it
pub fn fit_into_cell(
    page: &Rect,
    cell: &Rect,
    horizontal: HorizontalPosition,
    vertical: VerticalPosition,
) -> Matrix {
    if page.is_degenerate() {
        return Matrix::translate(cell.x1 - page.x1, cell.y1 - page.y1);
    }
    let scale = (cell.width() / page.width()).min(cell.height() / page.height());
    let scaling = Matrix::translate(-page.x1, -page.y1).then(&Matrix::scale(scale, scale));
    let scaled = scaling.transform_rect(page);
    let dx = horizontal.offset(&scaled, cell);
    let dy = vertical.offset(&scaled, cell);
    scaling.then(&Matrix::translate(dx, dy))
}
