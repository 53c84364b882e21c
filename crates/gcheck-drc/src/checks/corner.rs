use gcheck_core::rules::CornerSpacingRule;
use gcheck_core::{Constraint, Point, Rect};

use super::Evaluator;
use crate::error::GcError;

impl<'a> Evaluator<'a> {
    /// Convex corners against different-net material diagonally across.
    pub(super) fn check_corner(
        &mut self,
        c: &'a Constraint,
        rule: &'a CornerSpacingRule,
    ) -> Result<(), GcError> {
        let model = self.model;
        let index = model.index(c.layer).ok_or(GcError::IndexUnbuilt(c.layer))?;

        // Owners outside the scope still report corners facing material inside it.
        for p in model.pins_on(c.layer) {
            let owner_in_scope = self.in_scope(p);
            let mut found = Vec::new();
            for corner in p.outline.corners() {
                if !corner.convex {
                    continue;
                }
                if let Some(w) = rule.eol_width {
                    if corner.prev.is_eol(w) || corner.next.is_eol(w) {
                        continue;
                    }
                }
                let s = rule.spacing_for(p.outline.width_at(corner.point));
                let (qx, qy) = corner.quadrant();
                let Point { x: cx, y: cy } = corner.point;
                let region = Rect::new(cx, cy, cx + qx * s, cy + qy * s);

                for entry in index.query(&region) {
                    let Some(q) = model.pin(entry.key.pin) else {
                        continue;
                    };
                    if q.net == p.net || (p.fixed && q.fixed) {
                        continue;
                    }
                    if !owner_in_scope && !self.in_scope(q) {
                        continue;
                    }
                    let b = entry.bbox;
                    let dx = if qx > 0 { b.xl() - cx } else { cx - b.xh() };
                    let dy = if qy > 0 { b.yl() - cy } else { cy - b.yh() };
                    // Strictly inside the quadrant and closer than `s` both ways.
                    if dx <= 0 || dy <= 0 || dx >= s || dy >= s {
                        continue;
                    }
                    let near = Point::new(cx + qx * dx, cy + qy * dy);
                    found.push((q, Rect::from_points(corner.point, near), dx, dy, s));
                }
            }
            for (q, bbox, dx, dy, s) in found {
                self.emit(
                    c,
                    bbox,
                    &[p, q],
                    format!("corner spacing {}x{} < {}", dx, dy, s),
                );
            }
        }
        Ok(())
    }
}
