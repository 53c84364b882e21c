use serde::{Deserialize, Serialize};

use crate::decompose::{decompose_polygon, GeometryError};
use crate::LayerId;

/// Layout coordinate in database units.
pub type Coord = i64;

/// A 2D point in layout coordinates (database units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: Coord,
    pub y: Coord,
}

impl Point {
    pub fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }

    pub fn translate(&self, dx: Coord, dy: Coord) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn manhattan_to(&self, other: &Point) -> Coord {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Orientation of a layer, an edge, or a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dir {
    Horizontal,
    Vertical,
}

/// An axis-aligned rectangle defined by lower-left and upper-right corners.
///
/// Rectangles are closed: two rectangles sharing only an edge still
/// [`intersect`](Rect::intersects), but do not [`overlap`](Rect::overlaps).
/// Zero-width or zero-height rectangles are allowed and are used for
/// edge-shaped marker boxes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub lower_left: Point,
    pub upper_right: Point,
}

impl Rect {
    pub fn new(x1: Coord, y1: Coord, x2: Coord, y2: Coord) -> Self {
        Self {
            lower_left: Point::new(x1.min(x2), y1.min(y2)),
            upper_right: Point::new(x1.max(x2), y1.max(y2)),
        }
    }

    pub fn from_points(a: Point, b: Point) -> Self {
        Self::new(a.x, a.y, b.x, b.y)
    }

    /// Smallest rectangle enclosing all `points`.
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut r = Rect::from_points(*first, *first);
        for p in &points[1..] {
            r.lower_left.x = r.lower_left.x.min(p.x);
            r.lower_left.y = r.lower_left.y.min(p.y);
            r.upper_right.x = r.upper_right.x.max(p.x);
            r.upper_right.y = r.upper_right.y.max(p.y);
        }
        Some(r)
    }

    #[inline]
    pub fn xl(&self) -> Coord {
        self.lower_left.x
    }

    #[inline]
    pub fn yl(&self) -> Coord {
        self.lower_left.y
    }

    #[inline]
    pub fn xh(&self) -> Coord {
        self.upper_right.x
    }

    #[inline]
    pub fn yh(&self) -> Coord {
        self.upper_right.y
    }

    pub fn width(&self) -> Coord {
        self.xh() - self.xl()
    }

    pub fn height(&self) -> Coord {
        self.yh() - self.yl()
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// Narrow dimension.
    pub fn min_dim(&self) -> Coord {
        self.width().min(self.height())
    }

    /// Direction of the longer side; squares report horizontal.
    pub fn dir(&self) -> Dir {
        if self.height() > self.width() {
            Dir::Vertical
        } else {
            Dir::Horizontal
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.xl() && p.x <= self.xh() && p.y >= self.yl() && p.y <= self.yh()
    }

    pub fn contains(&self, other: &Rect) -> bool {
        self.contains_point(&other.lower_left) && self.contains_point(&other.upper_right)
    }

    /// Closed intersection test: touching rectangles intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.xl() <= other.xh()
            && self.xh() >= other.xl()
            && self.yl() <= other.yh()
            && self.yh() >= other.yl()
    }

    /// Open intersection test: the interiors share positive area.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.xl() < other.xh()
            && self.xh() > other.xl()
            && self.yl() < other.yh()
            && self.yh() > other.yl()
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        Some(Rect::new(
            self.xl().max(other.xl()),
            self.yl().max(other.yl()),
            self.xh().min(other.xh()),
            self.yh().min(other.yh()),
        ))
    }

    pub fn union(&self, other: &Rect) -> Self {
        Rect::new(
            self.xl().min(other.xl()),
            self.yl().min(other.yl()),
            self.xh().max(other.xh()),
            self.yh().max(other.yh()),
        )
    }

    pub fn bloat(&self, d: Coord) -> Self {
        Rect::new(self.xl() - d, self.yl() - d, self.xh() + d, self.yh() + d)
    }

    pub fn translate(&self, dx: Coord, dy: Coord) -> Self {
        Self {
            lower_left: self.lower_left.translate(dx, dy),
            upper_right: self.upper_right.translate(dx, dy),
        }
    }

    /// Horizontal gap to `other`; zero when the x-projections meet.
    pub fn gap_x(&self, other: &Rect) -> Coord {
        (self.xl().max(other.xl()) - self.xh().min(other.xh())).max(0)
    }

    /// Vertical gap to `other`; zero when the y-projections meet.
    pub fn gap_y(&self, other: &Rect) -> Coord {
        (self.yl().max(other.yl()) - self.yh().min(other.yh())).max(0)
    }

    /// Overlap of the x-projections; negative when they are apart.
    pub fn prl_x(&self, other: &Rect) -> Coord {
        self.xh().min(other.xh()) - self.xl().max(other.xl())
    }

    /// Overlap of the y-projections; negative when they are apart.
    pub fn prl_y(&self, other: &Rect) -> Coord {
        self.yh().min(other.yh()) - self.yl().max(other.yl())
    }

    /// Parallel run length between two rectangles.
    ///
    /// Rectangles separated along one axis report the projection overlap on
    /// the other axis. Diagonally placed rectangles report a negative value.
    pub fn prl(&self, other: &Rect) -> Coord {
        let (gx, gy) = (self.gap_x(other), self.gap_y(other));
        if gx > 0 && gy > 0 {
            self.prl_x(other).max(self.prl_y(other))
        } else if gx > 0 {
            self.prl_y(other)
        } else {
            self.prl_x(other)
        }
    }

    /// Squared Euclidean distance between the closest points.
    pub fn dist_sq(&self, other: &Rect) -> i128 {
        let gx = self.gap_x(other) as i128;
        let gy = self.gap_y(other) as i128;
        gx * gx + gy * gy
    }

    /// The region between two rectangles: the gap along separated axes and
    /// the shared projection along overlapping ones.
    pub fn gap_box(&self, other: &Rect) -> Rect {
        let (x0, x1) = if self.gap_x(other) > 0 {
            (self.xh().min(other.xh()), self.xl().max(other.xl()))
        } else {
            (self.xl().max(other.xl()), self.xh().min(other.xh()))
        };
        let (y0, y1) = if self.gap_y(other) > 0 {
            (self.yh().min(other.yh()), self.yl().max(other.yl()))
        } else {
            (self.yl().max(other.yl()), self.yh().min(other.yh()))
        };
        Rect::new(x0, y0, x1, y1)
    }
}

/// A rectilinear polygon defined by its vertices in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    pub fn bbox(&self) -> Option<Rect> {
        Rect::bounding(&self.vertices)
    }

    /// Enclosed area by the shoelace formula.
    pub fn area(&self) -> i64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0;
        }
        let twice: i128 = (0..n)
            .map(|i| {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % n];
                a.x as i128 * b.y as i128 - b.x as i128 * a.y as i128
            })
            .sum();
        (twice.abs() / 2) as i64
    }
}

/// A wire centerline with width. Every segment must be axis-aligned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub layer_id: LayerId,
    pub points: Vec<Point>,
    pub width: Coord,
    /// Extension past each end point; half the width when unset.
    pub ext: Option<Coord>,
}

impl Path {
    pub fn new(layer_id: LayerId, points: Vec<Point>, width: Coord) -> Self {
        Self {
            layer_id,
            points,
            width,
            ext: None,
        }
    }

    pub fn with_ext(mut self, ext: Coord) -> Self {
        self.ext = Some(ext);
        self
    }

    pub fn segment(layer_id: LayerId, begin: Point, end: Point, width: Coord) -> Self {
        Self::new(layer_id, vec![begin, end], width)
    }

    /// One rectangle per segment.
    pub fn to_rects(&self) -> Result<Vec<Rect>, GeometryError> {
        if self.width <= 0 {
            return Err(GeometryError::NonPositiveWidth(self.width));
        }
        let hw = self.width / 2;
        let ext = self.ext.unwrap_or(hw);
        match self.points.as_slice() {
            [] => Err(GeometryError::EmptyPath),
            [p] => Ok(vec![Rect::new(p.x - ext, p.y - hw, p.x + ext, p.y + hw)]),
            points => points
                .windows(2)
                .map(|w| {
                    let (a, b) = (w[0], w[1]);
                    if a.y == b.y {
                        Ok(Rect::new(
                            a.x.min(b.x) - ext,
                            a.y - hw,
                            a.x.max(b.x) + ext,
                            a.y + hw,
                        ))
                    } else if a.x == b.x {
                        Ok(Rect::new(
                            a.x - hw,
                            a.y.min(b.y) - ext,
                            a.x + hw,
                            a.y.max(b.y) + ext,
                        ))
                    } else {
                        Err(GeometryError::DiagonalPath { from: a, to: b })
                    }
                })
                .collect(),
        }
    }

    pub fn bbox(&self) -> Option<Rect> {
        let rects = self.to_rects().ok()?;
        rects.iter().copied().reduce(|a, b| a.union(&b))
    }
}

/// The outline of a pin figure or obstruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FigShape {
    Rect(Rect),
    Polygon(Polygon),
}

impl FigShape {
    pub fn bbox(&self) -> Option<Rect> {
        match self {
            FigShape::Rect(r) => Some(*r),
            FigShape::Polygon(p) => p.bbox(),
        }
    }

    pub fn to_rects(&self) -> Result<Vec<Rect>, GeometryError> {
        match self {
            FigShape::Rect(r) if r.is_degenerate() => Err(GeometryError::DegenerateRect(*r)),
            FigShape::Rect(r) => Ok(vec![*r]),
            FigShape::Polygon(p) => decompose_polygon(p),
        }
    }
}

impl From<Rect> for FigShape {
    fn from(r: Rect) -> Self {
        FigShape::Rect(r)
    }
}

impl From<Polygon> for FigShape {
    fn from(p: Polygon) -> Self {
        FigShape::Polygon(p)
    }
}
