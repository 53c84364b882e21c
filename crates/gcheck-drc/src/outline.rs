//! Pin outlines: boundary edges, corners and maximal rectangles of the
//! region covered by a pin's shapes.

use gcheck_core::{Coord, CoverGrid, Dir, Point, Rect};

/// Which side of the material an edge bounds, i.e. its outward normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    Left,
    Right,
    Bottom,
    Top,
}

impl Side {
    /// Material lies to the left of the walking direction.
    fn of_walk(begin: Point, end: Point) -> Side {
        if end.x > begin.x {
            Side::Bottom
        } else if end.x < begin.x {
            Side::Top
        } else if end.y > begin.y {
            Side::Right
        } else {
            Side::Left
        }
    }

    pub fn normal(self) -> (Coord, Coord) {
        match self {
            Side::Left => (-1, 0),
            Side::Right => (1, 0),
            Side::Bottom => (0, -1),
            Side::Top => (0, 1),
        }
    }

    /// Orientation of edges on this side.
    pub fn dir(self) -> Dir {
        match self {
            Side::Bottom | Side::Top => Dir::Horizontal,
            Side::Left | Side::Right => Dir::Vertical,
        }
    }
}

/// One boundary edge, walked with the material on its left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutlineEdge {
    pub begin: Point,
    pub end: Point,
    pub side: Side,
    pub begin_convex: bool,
    pub end_convex: bool,
}

impl OutlineEdge {
    pub fn len(&self) -> Coord {
        self.begin.manhattan_to(&self.end)
    }

    pub fn dir(&self) -> Dir {
        self.side.dir()
    }

    /// The edge as a zero-thickness rectangle.
    pub fn rect(&self) -> Rect {
        Rect::from_points(self.begin, self.end)
    }

    /// Shorter than `eol_width` and bounded by two convex corners.
    pub fn is_eol(&self, eol_width: Coord) -> bool {
        self.len() < eol_width && self.begin_convex && self.end_convex
    }

    /// The region `out` past the edge, widened by `along` beyond both ends.
    pub fn outward_region(&self, out: Coord, along: Coord) -> Rect {
        let r = self.rect();
        match self.side {
            Side::Top => Rect::new(r.xl() - along, r.yh(), r.xh() + along, r.yh() + out),
            Side::Bottom => Rect::new(r.xl() - along, r.yl() - out, r.xh() + along, r.yl()),
            Side::Right => Rect::new(r.xh(), r.yl() - along, r.xh() + out, r.yh() + along),
            Side::Left => Rect::new(r.xl() - out, r.yl() - along, r.xl(), r.yh() + along),
        }
    }
}

/// A vertex of the outline with its two edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corner {
    pub point: Point,
    pub convex: bool,
    pub prev: OutlineEdge,
    pub next: OutlineEdge,
}

impl Corner {
    /// Signs of the diagonal quadrant facing away from a convex corner.
    pub fn quadrant(&self) -> (Coord, Coord) {
        let (ax, ay) = self.prev.side.normal();
        let (bx, by) = self.next.side.normal();
        (ax + bx, ay + by)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinOutline {
    /// Outer loops counter-clockwise, holes clockwise.
    pub loops: Vec<Vec<OutlineEdge>>,
    /// Sorted maximal rectangles.
    pub max_rects: Vec<Rect>,
    pub area: i64,
    pub bbox: Rect,
}

fn turn(a: Point, b: Point, c: Point) -> Coord {
    let (dx0, dy0) = ((b.x - a.x).signum(), (b.y - a.y).signum());
    let (dx1, dy1) = ((c.x - b.x).signum(), (c.y - b.y).signum());
    dx0 * dy1 - dy0 * dx1
}

fn edges_of(vertices: &[Point]) -> Vec<OutlineEdge> {
    let n = vertices.len();
    (0..n)
        .map(|k| {
            let prev = vertices[(k + n - 1) % n];
            let begin = vertices[k];
            let end = vertices[(k + 1) % n];
            let next = vertices[(k + 2) % n];
            OutlineEdge {
                begin,
                end,
                side: Side::of_walk(begin, end),
                begin_convex: turn(prev, begin, end) > 0,
                end_convex: turn(begin, end, next) > 0,
            }
        })
        .collect()
}

impl PinOutline {
    /// `None` when the rectangles cover no area.
    pub fn from_rects(rects: &[Rect]) -> Option<Self> {
        let grid = CoverGrid::from_rects(rects);
        let bbox = grid.bbox()?;
        let loops = grid.loops().iter().map(|l| edges_of(l)).collect();
        Some(Self {
            loops,
            max_rects: grid.max_rects(),
            area: grid.area(),
            bbox,
        })
    }

    pub fn edges(&self) -> impl Iterator<Item = &OutlineEdge> {
        self.loops.iter().flatten()
    }

    pub fn corners(&self) -> impl Iterator<Item = Corner> + '_ {
        self.loops.iter().flat_map(|edges| {
            let n = edges.len();
            (0..n).map(move |k| {
                let prev = edges[(k + n - 1) % n];
                let next = edges[k];
                Corner {
                    point: next.begin,
                    convex: next.begin_convex,
                    prev,
                    next,
                }
            })
        })
    }

    /// Width of the widest maximal rectangle containing `p`.
    pub fn width_at(&self, p: Point) -> Coord {
        self.max_rects
            .iter()
            .filter(|r| r.contains_point(&p))
            .map(Rect::min_dim)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l_outline() -> PinOutline {
        PinOutline::from_rects(&[Rect::new(0, 0, 100, 50), Rect::new(0, 50, 90, 100)]).unwrap()
    }

    #[test]
    fn test_rect_outline() {
        let o = PinOutline::from_rects(&[Rect::new(0, 0, 100, 40)]).unwrap();
        assert_eq!(o.loops.len(), 1);
        assert_eq!(o.loops[0].len(), 4);
        assert!(o.corners().all(|c| c.convex));
        assert_eq!(o.area, 4000);
        let sides: Vec<Side> = o.edges().map(|e| e.side).collect();
        assert!(sides.contains(&Side::Top) && sides.contains(&Side::Left));
        let ll = o
            .corners()
            .find(|c| c.point == Point::new(0, 0))
            .unwrap();
        assert_eq!(ll.quadrant(), (-1, -1));
    }

    #[test]
    fn test_step_outline() {
        let o = l_outline();
        assert_eq!(o.loops[0].len(), 6);
        assert_eq!(o.corners().filter(|c| !c.convex).count(), 1);
        let step = o.edges().find(|e| e.len() == 10).unwrap();
        assert_eq!(step.side, Side::Top);
        assert_eq!(step.begin, Point::new(100, 50));
        assert!(step.begin_convex);
        assert!(!step.end_convex);
        assert_eq!(o.max_rects, vec![Rect::new(0, 0, 90, 100), Rect::new(0, 0, 100, 50)]);
        assert_eq!(o.width_at(Point::new(0, 0)), 90);
        assert_eq!(o.width_at(Point::new(100, 0)), 50);
    }

    #[test]
    fn test_ring_has_concave_hole() {
        let o = PinOutline::from_rects(&[
            Rect::new(0, 0, 100, 20),
            Rect::new(0, 80, 100, 100),
            Rect::new(0, 0, 20, 100),
            Rect::new(80, 0, 100, 100),
        ])
        .unwrap();
        assert_eq!(o.loops.len(), 2);
        assert_eq!(o.corners().filter(|c| c.convex).count(), 4);
        assert_eq!(o.corners().filter(|c| !c.convex).count(), 4);
        assert_eq!(o.area, 100 * 100 - 60 * 60);
    }

    #[test]
    fn test_outward_region() {
        let edge = OutlineEdge {
            begin: Point::new(100, 50),
            end: Point::new(60, 50),
            side: Side::Top,
            begin_convex: true,
            end_convex: true,
        };
        assert!(edge.is_eol(50));
        assert!(!edge.is_eol(40));
        assert_eq!(edge.outward_region(30, 5), Rect::new(55, 50, 105, 80));
        assert!(PinOutline::from_rects(&[Rect::new(0, 0, 0, 10)]).is_none());
    }
}
