use gcheck_core::{Constraint, Coord};

use super::Evaluator;

impl<'a> Evaluator<'a> {
    pub(super) fn check_width(&mut self, c: &'a Constraint, width: Coord) {
        for pin in self.pins_in_scope(c.layer) {
            if pin.fixed {
                continue;
            }
            for r in &pin.outline.max_rects {
                if r.min_dim() < width {
                    self.emit(c, *r, &[pin], format!("width {} < {}", r.min_dim(), width));
                }
            }
        }
    }
}
