use gcheck_core::rules::{EolRule, ParallelEdge};
use gcheck_core::{Constraint, Coord, Rect};

use super::Evaluator;
use crate::error::GcError;
use crate::model::GcPin;
use crate::outline::{OutlineEdge, Side};

/// Regions beside both ends of an end-of-line edge: `par_space` outward
/// from each end, reaching `par_within` behind the edge and `ahead` past it.
fn side_regions(edge: &OutlineEdge, par: &ParallelEdge, ahead: Coord) -> [Rect; 2] {
    let r = edge.rect();
    let (ps, pw) = (par.par_space, par.par_within);
    match edge.side {
        Side::Top => [
            Rect::new(r.xl() - ps, r.yl() - pw, r.xl(), r.yl() + ahead),
            Rect::new(r.xh(), r.yl() - pw, r.xh() + ps, r.yl() + ahead),
        ],
        Side::Bottom => [
            Rect::new(r.xl() - ps, r.yl() - ahead, r.xl(), r.yl() + pw),
            Rect::new(r.xh(), r.yl() - ahead, r.xh() + ps, r.yl() + pw),
        ],
        Side::Right => [
            Rect::new(r.xl() - pw, r.yl() - ps, r.xl() + ahead, r.yl()),
            Rect::new(r.xl() - pw, r.yh(), r.xl() + ahead, r.yh() + ps),
        ],
        Side::Left => [
            Rect::new(r.xl() - ahead, r.yl() - ps, r.xl() + pw, r.yl()),
            Rect::new(r.xl() - ahead, r.yh(), r.xl() + pw, r.yh() + ps),
        ],
    }
}

impl<'a> Evaluator<'a> {
    fn other_material(&self, p: &GcPin, region: &Rect) -> bool {
        self.model.index(p.layer).is_some_and(|index| {
            index
                .query(region)
                .any(|e| e.key.pin != p.id && e.bbox.overlaps(region))
        })
    }

    pub(super) fn check_eol(&mut self, c: &'a Constraint, rule: &'a EolRule) -> Result<(), GcError> {
        let model = self.model;
        let index = model.index(c.layer).ok_or(GcError::IndexUnbuilt(c.layer))?;
        let preferred = self.tech.layers.get_layer(c.layer).map(|l| l.direction);

        // Owners outside the scope still report edges facing material inside it.
        for p in model.pins_on(c.layer) {
            let owner_in_scope = self.in_scope(p);
            for edge in p.outline.edges() {
                if !edge.is_eol(rule.eol_width) {
                    continue;
                }
                if self.config.ignore_long_side_eol && Some(edge.dir()) == preferred {
                    continue;
                }
                if let Some(par) = &rule.parallel_edge {
                    let [lo, hi] = side_regions(edge, par, rule.eol_within);
                    let (lo, hi) = (self.other_material(p, &lo), self.other_material(p, &hi));
                    let present = if par.two_edges { lo && hi } else { lo || hi };
                    if !present {
                        continue;
                    }
                }

                let region = edge.outward_region(rule.eol_space, rule.eol_within);
                let mut hits = Vec::new();
                for entry in index.query(&region) {
                    let Some(q) = model.pin(entry.key.pin) else {
                        continue;
                    };
                    if q.id == p.id || (p.fixed && q.fixed) || !entry.bbox.overlaps(&region) {
                        continue;
                    }
                    if !owner_in_scope && !self.in_scope(q) {
                        continue;
                    }
                    if let Some(hit) = entry.bbox.intersection(&region) {
                        hits.push((q, edge.rect().union(&hit)));
                    }
                }
                for (q, bbox) in hits {
                    self.emit(
                        c,
                        bbox,
                        &[p, q],
                        format!("end-of-line spacing < {}", rule.eol_space),
                    );
                }
            }
        }
        Ok(())
    }
}
