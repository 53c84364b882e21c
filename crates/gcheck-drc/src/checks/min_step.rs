use gcheck_core::{Constraint, Coord, Point, Rect};

use super::Evaluator;
use crate::model::GcPin;
use crate::outline::{OutlineEdge, PinOutline};

/// A run of consecutive short edges, with the edges around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StepRun {
    pub edges: Vec<OutlineEdge>,
    pub before: OutlineEdge,
    pub after: OutlineEdge,
}

impl StepRun {
    pub fn bbox(&self) -> Rect {
        let points: Vec<Point> = self.edges.iter().flat_map(|e| [e.begin, e.end]).collect();
        Rect::bounding(&points).unwrap_or_default()
    }

    /// A single short edge between a convex and a concave corner can be
    /// pushed out flush with the edge beyond its concave corner.
    pub fn flush_patch(&self) -> Option<Rect> {
        let [edge] = self.edges.as_slice() else {
            return None;
        };
        match (edge.begin_convex, edge.end_convex) {
            (true, false) => Some(edge.outward_region(self.after.len(), 0)),
            (false, true) => Some(edge.outward_region(self.before.len(), 0)),
            _ => None,
        }
    }
}

/// Runs of more than `max_edges` consecutive edges shorter than
/// `min_step_length`, per outline loop.
pub(crate) fn step_runs(outline: &PinOutline, min_step_length: Coord, max_edges: usize) -> Vec<StepRun> {
    let mut runs = Vec::new();
    for edges in &outline.loops {
        let n = edges.len();
        let short: Vec<bool> = edges.iter().map(|e| e.len() < min_step_length).collect();
        let Some(anchor) = short.iter().position(|s| !s) else {
            if n > max_edges {
                runs.push(StepRun {
                    edges: edges.clone(),
                    before: edges[n - 1],
                    after: edges[0],
                });
            }
            continue;
        };

        let mut current: Vec<OutlineEdge> = Vec::new();
        let mut before = edges[anchor];
        for step in 1..=n {
            let k = (anchor + step) % n;
            if short[k] {
                current.push(edges[k]);
                continue;
            }
            if current.len() > max_edges {
                runs.push(StepRun {
                    edges: std::mem::take(&mut current),
                    before,
                    after: edges[k],
                });
            }
            current.clear();
            before = edges[k];
        }
    }
    runs
}

impl<'a> Evaluator<'a> {
    pub(super) fn check_min_step_pin(
        &mut self,
        pin: &'a GcPin,
        c: &'a Constraint,
        min_step_length: Coord,
        max_edges: usize,
    ) {
        for run in step_runs(&pin.outline, min_step_length, max_edges) {
            self.emit(
                c,
                run.bbox(),
                &[pin],
                format!(
                    "{} consecutive edges shorter than {}",
                    run.edges.len(),
                    min_step_length
                ),
            );
            if let Some(patch) = run.flush_patch() {
                self.propose(c, pin, patch);
            }
        }
    }
}
