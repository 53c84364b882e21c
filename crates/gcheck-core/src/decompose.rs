//! Rectilinear polygon decomposition and rectangle-union analysis.
//!
//! [`decompose_polygon`] turns a rectilinear polygon into disjoint rectangles
//! with a horizontal slab sweep. Vertically adjacent slabs with identical
//! x-intervals are merged, and the result is sorted, so identical input always
//! yields identical output in identical order.
//!
//! [`CoverGrid`] rasterizes a union of rectangles onto its own compressed
//! coordinates and answers area, maximal-rectangle and boundary-loop queries.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::geometry::{Coord, Point, Polygon, Rect};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("polygon needs at least 4 distinct vertices, got {0}")]
    TooFewVertices(usize),

    #[error("polygon edge {from:?} -> {to:?} is not axis-aligned")]
    NotRectilinear { from: Point, to: Point },

    #[error("polygon encloses no area")]
    ZeroArea,

    #[error("polygon boundary overlaps itself")]
    SelfOverlap,

    #[error("path segment {from:?} -> {to:?} is not axis-aligned")]
    DiagonalPath { from: Point, to: Point },

    #[error("path has no points")]
    EmptyPath,

    #[error("non-positive width {0}")]
    NonPositiveWidth(Coord),

    #[error("degenerate rectangle {0:?}")]
    DegenerateRect(Rect),
}

/// Decompose a rectilinear polygon into disjoint rectangles.
pub fn decompose_polygon(polygon: &Polygon) -> Result<Vec<Rect>, GeometryError> {
    let mut pts: Vec<Point> = Vec::with_capacity(polygon.vertices.len());
    for &p in &polygon.vertices {
        if pts.last() != Some(&p) {
            pts.push(p);
        }
    }
    while pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }
    if pts.len() < 4 {
        return Err(GeometryError::TooFewVertices(pts.len()));
    }

    // Vertical edges as (x, ylo, yhi).
    let mut verticals = Vec::new();
    for i in 0..pts.len() {
        let (a, b) = (pts[i], pts[(i + 1) % pts.len()]);
        if a.x != b.x && a.y != b.y {
            return Err(GeometryError::NotRectilinear { from: a, to: b });
        }
        if a.x == b.x {
            verticals.push((a.x, a.y.min(b.y), a.y.max(b.y)));
        }
    }

    let mut ys: Vec<Coord> = pts.iter().map(|p| p.y).collect();
    ys.sort_unstable();
    ys.dedup();

    let mut rects = Vec::new();
    // Open rectangles: (xl, xh, y where they started).
    let mut open: Vec<(Coord, Coord, Coord)> = Vec::new();
    for slab in ys.windows(2) {
        let (y0, y1) = (slab[0], slab[1]);
        let mut xs: Vec<Coord> = verticals
            .iter()
            .filter(|(_, lo, hi)| *lo <= y0 && *hi >= y1)
            .map(|(x, _, _)| *x)
            .collect();
        xs.sort_unstable();
        if xs.len() % 2 != 0 {
            return Err(GeometryError::SelfOverlap);
        }

        let mut intervals: Vec<(Coord, Coord)> = Vec::new();
        for pair in xs.chunks_exact(2) {
            if pair[0] == pair[1] {
                continue;
            }
            match intervals.last_mut() {
                Some(last) if last.1 == pair[0] => last.1 = pair[1],
                _ => intervals.push((pair[0], pair[1])),
            }
        }

        let mut next_open = Vec::with_capacity(intervals.len());
        for &(xl, xh) in &intervals {
            match open.iter().position(|&(ol, oh, _)| ol == xl && oh == xh) {
                Some(i) => next_open.push(open.swap_remove(i)),
                None => next_open.push((xl, xh, y0)),
            }
        }
        for (xl, xh, ys0) in open.drain(..) {
            rects.push(Rect::new(xl, ys0, xh, y0));
        }
        open = next_open;
    }
    if let Some(&top) = ys.last() {
        for (xl, xh, ys0) in open.drain(..) {
            rects.push(Rect::new(xl, ys0, xh, top));
        }
    }

    if rects.is_empty() {
        return Err(GeometryError::ZeroArea);
    }
    let covered: i64 = rects.iter().map(Rect::area).sum();
    if covered != polygon.area() {
        return Err(GeometryError::SelfOverlap);
    }
    rects.sort();
    Ok(rects)
}

/// A union of rectangles rasterized onto its compressed coordinates.
#[derive(Debug, Clone)]
pub struct CoverGrid {
    xs: Vec<Coord>,
    ys: Vec<Coord>,
    /// Row-major coverage, `ny` rows of `nx` cells.
    cells: Vec<bool>,
}

impl CoverGrid {
    /// Degenerate rectangles cover nothing and are ignored.
    pub fn from_rects(rects: &[Rect]) -> Self {
        let solid: Vec<&Rect> = rects.iter().filter(|r| !r.is_degenerate()).collect();
        let mut xs: Vec<Coord> = solid.iter().flat_map(|r| [r.xl(), r.xh()]).collect();
        let mut ys: Vec<Coord> = solid.iter().flat_map(|r| [r.yl(), r.yh()]).collect();
        xs.sort_unstable();
        xs.dedup();
        ys.sort_unstable();
        ys.dedup();

        let nx = xs.len().saturating_sub(1);
        let ny = ys.len().saturating_sub(1);
        let mut cells = vec![false; nx * ny];
        for r in solid {
            let (Ok(i0), Ok(i1), Ok(j0), Ok(j1)) = (
                xs.binary_search(&r.xl()),
                xs.binary_search(&r.xh()),
                ys.binary_search(&r.yl()),
                ys.binary_search(&r.yh()),
            ) else {
                continue;
            };
            for j in j0..j1 {
                for i in i0..i1 {
                    cells[j * nx + i] = true;
                }
            }
        }
        Self { xs, ys, cells }
    }

    fn nx(&self) -> usize {
        self.xs.len().saturating_sub(1)
    }

    fn ny(&self) -> usize {
        self.ys.len().saturating_sub(1)
    }

    /// Coverage of cell `(i, j)`; cells outside the grid are empty.
    pub fn covered(&self, i: isize, j: isize) -> bool {
        if i < 0 || j < 0 {
            return false;
        }
        let (i, j) = (i as usize, j as usize);
        if i >= self.nx() || j >= self.ny() {
            return false;
        }
        self.cells[j * self.nx() + i]
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|&c| c)
    }

    pub fn area(&self) -> i64 {
        let nx = self.nx();
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c)
            .map(|(k, _)| {
                let (i, j) = (k % nx, k / nx);
                (self.xs[i + 1] - self.xs[i]) * (self.ys[j + 1] - self.ys[j])
            })
            .sum()
    }

    pub fn bbox(&self) -> Option<Rect> {
        let nx = self.nx();
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c)
            .map(|(k, _)| {
                let (i, j) = (k % nx, k / nx);
                Rect::new(self.xs[i], self.ys[j], self.xs[i + 1], self.ys[j + 1])
            })
            .reduce(|a, b| a.union(&b))
    }

    /// Every rectangle inside the union that no other such rectangle
    /// contains, sorted.
    pub fn max_rects(&self) -> Vec<Rect> {
        let (nx, ny) = (self.nx(), self.ny());
        let cov = |i: usize, j: usize| self.cells[j * nx + i];
        let mut out = Vec::new();
        for j0 in 0..ny {
            let mut run: Vec<bool> = (0..nx).map(|i| cov(i, j0)).collect();
            for j1 in j0..ny {
                if j1 > j0 {
                    for (i, r) in run.iter_mut().enumerate() {
                        *r = *r && cov(i, j1);
                    }
                }
                if !run.iter().any(|&r| r) {
                    break;
                }
                let mut i = 0;
                while i < nx {
                    if !run[i] {
                        i += 1;
                        continue;
                    }
                    let s = i;
                    while i < nx && run[i] {
                        i += 1;
                    }
                    let down_blocked = j0 == 0 || (s..i).any(|k| !cov(k, j0 - 1));
                    let up_blocked = j1 + 1 >= ny || (s..i).any(|k| !cov(k, j1 + 1));
                    if down_blocked && up_blocked {
                        out.push(Rect::new(self.xs[s], self.ys[j0], self.xs[i], self.ys[j1 + 1]));
                    }
                }
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// Boundary loops with the covered region on the left of every edge:
    /// outer boundaries run counter-clockwise, holes clockwise. Each loop
    /// lists its corner vertices, collinear points removed. Regions touching
    /// only at a vertex produce separate loops.
    pub fn loops(&self) -> Vec<Vec<Point>> {
        let mut edges: BTreeMap<Point, Vec<Point>> = BTreeMap::new();
        let mut push = |a: Point, b: Point| edges.entry(a).or_default().push(b);
        for j in 0..self.ny() as isize {
            for i in 0..self.nx() as isize {
                if !self.covered(i, j) {
                    continue;
                }
                let (iu, ju) = (i as usize, j as usize);
                let (x0, x1) = (self.xs[iu], self.xs[iu + 1]);
                let (y0, y1) = (self.ys[ju], self.ys[ju + 1]);
                if !self.covered(i, j - 1) {
                    push(Point::new(x0, y0), Point::new(x1, y0));
                }
                if !self.covered(i + 1, j) {
                    push(Point::new(x1, y0), Point::new(x1, y1));
                }
                if !self.covered(i, j + 1) {
                    push(Point::new(x1, y1), Point::new(x0, y1));
                }
                if !self.covered(i - 1, j) {
                    push(Point::new(x0, y1), Point::new(x0, y0));
                }
            }
        }

        let mut loops = Vec::new();
        loop {
            let Some(start) = edges
                .iter()
                .find(|(_, outs)| !outs.is_empty())
                .map(|(&p, _)| p)
            else {
                break;
            };
            let first = take_edge(&mut edges, start, None);
            let mut vertices = vec![start];
            let (mut prev, mut cur) = (start, first);
            loop {
                let incoming = direction(prev, cur);
                if cur == start {
                    let closing = turn_rank(incoming, direction(start, first));
                    let better = edges
                        .get(&start)
                        .into_iter()
                        .flatten()
                        .any(|&to| turn_rank(incoming, direction(start, to)) < closing);
                    if !better {
                        break;
                    }
                }
                vertices.push(cur);
                let next = take_edge(&mut edges, cur, Some(incoming));
                prev = cur;
                cur = next;
            }
            loops.push(simplify_loop(vertices));
        }
        loops
    }
}

fn direction(a: Point, b: Point) -> (Coord, Coord) {
    ((b.x - a.x).signum(), (b.y - a.y).signum())
}

/// Left turns rank first, then straight, then right.
fn turn_rank(incoming: (Coord, Coord), outgoing: (Coord, Coord)) -> u8 {
    let cross = incoming.0 * outgoing.1 - incoming.1 * outgoing.0;
    match cross.signum() {
        1 => 0,
        0 => 1,
        _ => 2,
    }
}

fn take_edge(
    edges: &mut BTreeMap<Point, Vec<Point>>,
    from: Point,
    incoming: Option<(Coord, Coord)>,
) -> Point {
    let outs = edges.entry(from).or_default();
    let pick = match incoming {
        Some(dir) => (0..outs.len())
            .min_by_key(|&k| turn_rank(dir, direction(from, outs[k])))
            .unwrap_or(0),
        None => 0,
    };
    outs.swap_remove(pick)
}

fn simplify_loop(vertices: Vec<Point>) -> Vec<Point> {
    let n = vertices.len();
    (0..n)
        .filter(|&k| {
            let prev = vertices[(k + n - 1) % n];
            let next = vertices[(k + 1) % n];
            direction(prev, vertices[k]) != direction(vertices[k], next)
        })
        .map(|k| vertices[k])
        .collect()
}
