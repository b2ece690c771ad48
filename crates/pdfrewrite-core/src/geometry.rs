//! Page geometry: boxes, affine matrices and anchor positions
//!
//! Matrices follow the PDF `cm` convention: a point is a row vector
//! `[x y 1]` multiplied on the left, so `a.then(&b)` applies `a` first.

use std::str::FromStr;

use lopdf::Object;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RewriteError};
use crate::serialize::format_number;

const EPSILON: f64 = 1e-9;

/// Axis-aligned box in PDF user space, always normalized (`x1 <= x2`, `y1 <= y2`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Rect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// US Letter, used when a source page has no usable MediaBox
    pub fn letter() -> Self {
        Self::from_size(612.0, 792.0)
    }

    /// Read a `[x1 y1 x2 y2]` array; `None` for anything else
    pub fn from_object(obj: &Object) -> Option<Self> {
        let items = match obj {
            Object::Array(items) if items.len() == 4 => items,
            _ => return None,
        };
        let mut values = [0.0; 4];
        for (slot, item) in values.iter_mut().zip(items) {
            *slot = match item {
                Object::Integer(i) => *i as f64,
                Object::Real(r) => *r as f64,
                _ => return None,
            };
        }
        Some(Self::new(values[0], values[1], values[2], values[3]))
    }

    pub fn to_object(&self) -> Object {
        Object::Array(
            [self.x1, self.y1, self.x2, self.y2]
                .iter()
                .map(|&v| number_object(v))
                .collect(),
        )
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn is_landscape(&self) -> bool {
        self.width() > self.height() + EPSILON
    }

    pub fn is_portrait(&self) -> bool {
        self.height() > self.width() + EPSILON
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() <= EPSILON || self.height() <= EPSILON
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        (r.x1 < r.x2 && r.y1 < r.y2).then_some(r)
    }

    pub fn approx_eq(&self, other: &Rect, tolerance: f64) -> bool {
        (self.x1 - other.x1).abs() <= tolerance
            && (self.y1 - other.y1).abs() <= tolerance
            && (self.x2 - other.x2).abs() <= tolerance
            && (self.y2 - other.y2).abs() <= tolerance
    }
}

/// Integral values become `Integer` so boxes stay compact in the output
pub(crate) fn number_object(value: f64) -> Object {
    if value.fract().abs() < EPSILON && value.abs() < i64::MAX as f64 {
        Object::Integer(value.round() as i64)
    } else {
        Object::Real(value as f32)
    }
}

/// PDF affine matrix `[a b c d e f]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Uniform scale keeping `(x, y)` fixed
    pub fn scale_about(s: f64, x: f64, y: f64) -> Self {
        Self::translate(-x, -y)
            .then(&Self::scale(s, s))
            .then(&Self::translate(x, y))
    }

    /// `self` followed by `next`
    pub fn then(&self, next: &Matrix) -> Matrix {
        Matrix {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Bounding box of the transformed corners
    pub fn transform_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.apply(rect.x1, rect.y1),
            self.apply(rect.x2, rect.y1),
            self.apply(rect.x1, rect.y2),
            self.apply(rect.x2, rect.y2),
        ];
        let (mut x1, mut y1) = corners[0];
        let (mut x2, mut y2) = corners[0];
        for &(x, y) in &corners[1..] {
            x1 = x1.min(x);
            y1 = y1.min(y);
            x2 = x2.max(x);
            y2 = y2.max(y);
        }
        Rect::new(x1, y1, x2, y2)
    }

    /// Counter-clockwise quarter turns of `rect` about its lower-left corner.
    ///
    /// Returns the matrix and the rotated box, which keeps the original
    /// lower-left corner and swaps width and height on odd turns.
    pub fn quarter_turn(rect: &Rect, turns: u8) -> (Matrix, Rect) {
        let (w, h) = (rect.width(), rect.height());
        let rotation = match turns % 4 {
            0 => return (Matrix::identity(), *rect),
            1 => Matrix::new(0.0, 1.0, -1.0, 0.0, h, 0.0),
            2 => Matrix::new(-1.0, 0.0, 0.0, -1.0, w, h),
            _ => Matrix::new(0.0, -1.0, 1.0, 0.0, 0.0, w),
        };
        let matrix = Matrix::translate(-rect.x1, -rect.y1)
            .then(&rotation)
            .then(&Matrix::translate(rect.x1, rect.y1));
        let rotated = if turns % 2 == 1 {
            Rect::new(rect.x1, rect.y1, rect.x1 + h, rect.y1 + w)
        } else {
            *rect
        };
        (matrix, rotated)
    }

    /// Horizontal flip about the vertical centre line of `rect`
    pub fn mirror(rect: &Rect) -> Matrix {
        Matrix::new(-1.0, 0.0, 0.0, 1.0, rect.x1 + rect.x2, 0.0)
    }

    /// Linear scale of the transform (square root of the determinant)
    pub fn scale_factor(&self) -> f64 {
        (self.a * self.d - self.b * self.c).abs().sqrt()
    }

    pub fn approx_eq(&self, other: &Matrix, tolerance: f64) -> bool {
        [
            self.a - other.a,
            self.b - other.b,
            self.c - other.c,
            self.d - other.d,
            self.e - other.e,
            self.f - other.f,
        ]
        .iter()
        .all(|delta| delta.abs() <= tolerance)
    }

    /// `a b c d e f` as content stream operands
    pub fn to_operands(&self) -> String {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .map(|&v| format_number(v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalPosition {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalPosition {
    Bottom,
    #[default]
    Center,
    Top,
}

impl HorizontalPosition {
    /// Horizontal shift that anchors `inner` inside `outer`
    pub fn offset(self, inner: &Rect, outer: &Rect) -> f64 {
        match self {
            HorizontalPosition::Left => outer.x1 - inner.x1,
            HorizontalPosition::Center => outer.center().0 - inner.center().0,
            HorizontalPosition::Right => outer.x2 - inner.x2,
        }
    }
}

impl VerticalPosition {
    pub fn offset(self, inner: &Rect, outer: &Rect) -> f64 {
        match self {
            VerticalPosition::Bottom => outer.y1 - inner.y1,
            VerticalPosition::Center => outer.center().1 - inner.center().1,
            VerticalPosition::Top => outer.y2 - inner.y2,
        }
    }
}

impl FromStr for HorizontalPosition {
    type Err = RewriteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "center" | "centre" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            other => Err(RewriteError::InvalidParameter(format!(
                "Unknown horizontal position: {}",
                other
            ))),
        }
    }
}

impl FromStr for VerticalPosition {
    type Err = RewriteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bottom" => Ok(Self::Bottom),
            "center" | "centre" => Ok(Self::Center),
            "top" => Ok(Self::Top),
            other => Err(RewriteError::InvalidParameter(format!(
                "Unknown vertical position: {}",
                other
            ))),
        }
    }
}

/// Parse a CUPS `position` keyword such as `top-left`, `right` or `center`
pub fn parse_position(keyword: &str) -> Result<(HorizontalPosition, VerticalPosition)> {
    let keyword = keyword.trim().to_ascii_lowercase();
    let mut horizontal = HorizontalPosition::Center;
    let mut vertical = VerticalPosition::Center;
    for part in keyword.split('-') {
        match part {
            "left" => horizontal = HorizontalPosition::Left,
            "right" => horizontal = HorizontalPosition::Right,
            "top" => vertical = VerticalPosition::Top,
            "bottom" => vertical = VerticalPosition::Bottom,
            "center" | "centre" => {}
            _ => {
                return Err(RewriteError::InvalidParameter(format!(
                    "Unknown position: {}",
                    keyword
                )))
            }
        }
    }
    Ok((horizontal, vertical))
}
