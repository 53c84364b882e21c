//! Rule evaluation over a built [`GcModel`].
//!
//! Each layer is checked against each of its constraints in turn. Pair
//! rules find partners through the layer index, self rules walk a pin's
//! own outline. Violations go to a [`MarkerStore`]; locally fixable ones
//! also leave a [`FixCandidate`] for the surgical-fix pass.

mod area;
mod corner;
mod cut;
mod eol;
mod min_step;
mod spacing;
mod width;

use std::collections::BTreeSet;

use log::debug;

use gcheck_core::{BlockObject, Constraint, ConstraintId, Coord, LayerId, Rect, Rule, Technology};

use crate::config::GcConfig;
use crate::error::GcError;
use crate::marker::{Marker, MarkerId, MarkerStore};
use crate::model::{GcModel, GcPin, NetId, PinId};

pub(crate) use spacing::notch_gap;

/// What part of the window is being checked.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    All,
    Net(NetId),
    /// Pins holding one of these objects, or belonging to a net keyed by one.
    Objects(&'a BTreeSet<BlockObject>),
}

impl Scope<'_> {
    pub fn contains(&self, model: &GcModel, pin: &GcPin) -> bool {
        match self {
            Scope::All => true,
            Scope::Net(net) => pin.net == *net,
            Scope::Objects(objs) => {
                model.pin_net(pin).is_some_and(|n| objs.contains(&n.owner))
                    || model.pin_shapes(pin).any(|s| objs.contains(&s.src))
            }
        }
    }
}

/// A local correction proposed by a rule, validated after all rules ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FixCandidate {
    pub pin: PinId,
    pub layer: LayerId,
    pub rect: Rect,
    pub constraint: ConstraintId,
}

/// Two maximal rectangles of different pins found within rule distance.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RectPair<'a> {
    pub p: &'a GcPin,
    pub a: Rect,
    pub q: &'a GcPin,
    pub b: Rect,
}

pub struct Evaluator<'a> {
    tech: &'a Technology,
    model: &'a GcModel,
    scope: Scope<'a>,
    config: &'a GcConfig,
    store: MarkerStore,
    fixes: Vec<FixCandidate>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        tech: &'a Technology,
        model: &'a GcModel,
        scope: Scope<'a>,
        config: &'a GcConfig,
        window: Option<Rect>,
    ) -> Self {
        Self {
            tech,
            model,
            scope,
            config,
            store: MarkerStore::new(window),
            fixes: Vec::new(),
        }
    }

    pub fn run(&mut self) -> Result<(), GcError> {
        let tech = self.tech;
        for layer in tech.layers.all_layers() {
            if self.model.index(layer.id).is_none() {
                return Err(GcError::IndexUnbuilt(layer.id));
            }
            for c in tech.constraints_on(layer.id) {
                if self.config.skips(c.kind()) {
                    debug!("skipping {} on layer {}", c.name, layer.name);
                    continue;
                }
                self.check(c)?;
            }
        }
        Ok(())
    }

    fn check(&mut self, c: &'a Constraint) -> Result<(), GcError> {
        match &c.rule {
            Rule::Short => self.check_short(c),
            Rule::Spacing { .. } | Rule::SpacingTable(_) => self.check_spacing(c),
            Rule::SpacingSameNet { spacing, pg_only } => self.check_same_net(c, *spacing, *pg_only),
            Rule::MinWidth { width } => {
                self.check_width(c, *width);
                Ok(())
            }
            Rule::MinArea { area } => {
                self.check_area(c, *area);
                Ok(())
            }
            Rule::MinStep {
                min_step_length,
                max_edges,
            } => {
                for pin in self.pins_in_scope(c.layer) {
                    if !pin.fixed {
                        self.check_min_step_pin(pin, c, *min_step_length, *max_edges);
                    }
                }
                Ok(())
            }
            Rule::EndOfLine(rule) => self.check_eol(c, rule),
            Rule::CornerSpacing(rule) => self.check_corner(c, rule),
            Rule::CutSpacing {
                spacing,
                center_to_center,
                same_net,
            } => self.check_cut(c, *spacing, *center_to_center, *same_net),
        }
    }

    /// Min-step on one pin, whatever its scope or fixed state.
    pub fn check_min_step_of(&mut self, pin: &'a GcPin) {
        let tech = self.tech;
        for c in tech.constraints_on(pin.layer) {
            if let Rule::MinStep {
                min_step_length,
                max_edges,
            } = c.rule
            {
                self.check_min_step_pin(pin, c, min_step_length, max_edges);
            }
        }
    }

    pub fn store(&self) -> &MarkerStore {
        &self.store
    }

    pub fn into_parts(self) -> (MarkerStore, Vec<FixCandidate>) {
        (self.store, self.fixes)
    }

    // ── Helpers shared by the rules ──────────────────────────────────

    fn in_scope(&self, pin: &GcPin) -> bool {
        self.scope.contains(self.model, pin)
    }

    fn pins_in_scope(&self, layer: LayerId) -> Vec<&'a GcPin> {
        let model = self.model;
        model
            .pins_on(layer)
            .filter(|p| self.scope.contains(model, p))
            .collect()
    }

    /// Pairs are taken from the lower pin id unless the other pin is out
    /// of scope. Pairs of fixed pins are never checked.
    fn visit_pair(&self, p: &GcPin, q: &GcPin) -> bool {
        p.id != q.id && !(p.fixed && q.fixed) && (p.id < q.id || !self.in_scope(q))
    }

    fn rect_pairs(&self, layer: LayerId, dist: Coord) -> Result<Vec<RectPair<'a>>, GcError> {
        let model = self.model;
        let index = model.index(layer).ok_or(GcError::IndexUnbuilt(layer))?;
        let mut pairs = Vec::new();
        for p in self.pins_in_scope(layer) {
            for a in &p.outline.max_rects {
                for entry in index.query_bloated(a, dist) {
                    let Some(q) = model.pin(entry.key.pin) else {
                        continue;
                    };
                    if self.visit_pair(p, q) {
                        pairs.push(RectPair {
                            p,
                            a: *a,
                            q,
                            b: entry.bbox,
                        });
                    }
                }
            }
        }
        Ok(pairs)
    }

    fn same_net(&self, p: &GcPin, q: &GcPin) -> bool {
        p.net == q.net
    }

    /// The parts of the gap between `a` and `b` that no material of
    /// `pins` crosses. Facing rectangles keep every empty stretch of their
    /// common run; a diagonal gap is kept whole or dropped.
    fn open_gaps(&self, a: &Rect, b: &Rect, pins: &[&GcPin]) -> Vec<Rect> {
        let gap = a.gap_box(b);
        let blockers: Vec<Rect> = pins
            .iter()
            .flat_map(|p| p.outline.max_rects.iter())
            .filter(|r| r.overlaps(&gap))
            .copied()
            .collect();
        if blockers.is_empty() {
            return vec![gap];
        }
        let (gx, gy) = (a.gap_x(b), a.gap_y(b));
        // Run along x when the rectangles face each other vertically.
        let along_x = match (gx > 0, gy > 0) {
            (false, true) => true,
            (true, false) => false,
            _ => return Vec::new(),
        };
        let (lo, hi) = if along_x {
            (gap.xl(), gap.xh())
        } else {
            (gap.yl(), gap.yh())
        };
        let mut blocked: Vec<(Coord, Coord)> = blockers
            .iter()
            .map(|r| {
                if along_x {
                    (r.xl().max(lo), r.xh().min(hi))
                } else {
                    (r.yl().max(lo), r.yh().min(hi))
                }
            })
            .collect();
        blocked.sort();

        let mut stretches = Vec::new();
        let mut cursor = lo;
        for (start, end) in blocked {
            if start > cursor {
                stretches.push((cursor, start));
            }
            cursor = cursor.max(end);
        }
        if cursor < hi {
            stretches.push((cursor, hi));
        }
        stretches
            .into_iter()
            .map(|(s, e)| {
                if along_x {
                    Rect::new(s, gap.yl(), e, gap.yh())
                } else {
                    Rect::new(gap.xl(), s, gap.xh(), e)
                }
            })
            .collect()
    }

    fn emit(&mut self, c: &Constraint, bbox: Rect, pins: &[&GcPin], message: String) {
        let model = self.model;
        let srcs: BTreeSet<BlockObject> = pins
            .iter()
            .filter_map(|p| model.pin_net(p))
            .map(|n| n.owner)
            .collect();
        let objects: BTreeSet<BlockObject> = pins
            .iter()
            .flat_map(|p| model.pin_shapes(p))
            .filter(|s| s.rect.intersects(&bbox))
            .map(|s| s.src)
            .collect();
        self.store.add(Marker {
            id: MarkerId {
                bbox,
                layer: c.layer,
                constraint: c.id,
                srcs,
            },
            kind: c.kind(),
            rule_name: c.name.clone(),
            message,
            objects,
        });
    }

    fn propose(&mut self, c: &Constraint, pin: &GcPin, rect: Rect) {
        self.fixes.push(FixCandidate {
            pin: pin.id,
            layer: c.layer,
            rect,
            constraint: c.id,
        });
    }
}

/// Overlap, or contact along an edge. Rectangles meeting at a single
/// point are apart at distance zero.
fn in_contact(a: &Rect, b: &Rect) -> bool {
    a.intersection(b)
        .is_some_and(|r| r.width() > 0 || r.height() > 0)
}

/// Distance between two rectangles for reporting.
fn distance(a: &Rect, b: &Rect) -> f64 {
    (a.dist_sq(b) as f64).sqrt()
}

fn below(dist_sq: i128, required: Coord) -> bool {
    let r = required as i128;
    dist_sq < r * r
}
