use gcheck_core::Constraint;

use super::Evaluator;

impl<'a> Evaluator<'a> {
    pub(super) fn check_area(&mut self, c: &'a Constraint, area: i64) {
        for pin in self.pins_in_scope(c.layer) {
            if pin.fixed || pin.outline.area >= area {
                continue;
            }
            self.emit(
                c,
                pin.outline.bbox,
                &[pin],
                format!("area {} < {}", pin.outline.area, area),
            );
        }
    }
}
