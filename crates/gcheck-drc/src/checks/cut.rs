use gcheck_core::{Constraint, Coord, Rect, Rule};

use super::{below, distance, Evaluator, RectPair};
use crate::error::GcError;

/// Squared distance between centers, in doubled coordinates.
fn center_dist_sq2(a: &Rect, b: &Rect) -> i128 {
    let dx = (a.xl() + a.xh() - b.xl() - b.xh()) as i128;
    let dy = (a.yl() + a.yh() - b.yl() - b.yh()) as i128;
    dx * dx + dy * dy
}

impl<'a> Evaluator<'a> {
    pub(super) fn check_cut(
        &mut self,
        c: &'a Constraint,
        spacing: Coord,
        center_to_center: bool,
        same_net_only: bool,
    ) -> Result<(), GcError> {
        let has_same_net_rule = self
            .tech
            .constraints_on(c.layer)
            .any(|o| matches!(o.rule, Rule::CutSpacing { same_net: true, .. }));

        for RectPair { p, a, q, b } in self.rect_pairs(c.layer, spacing)? {
            let same = self.same_net(p, q);
            if same_net_only && !same {
                continue;
            }
            // Same-net pairs answer to the same-net rule when there is one.
            if !same_net_only && same && has_same_net_rule {
                continue;
            }
            if a.intersects(&b) {
                continue;
            }
            let violates = if center_to_center {
                below(center_dist_sq2(&a, &b), 2 * spacing)
            } else {
                below(a.dist_sq(&b), spacing)
            };
            if !violates {
                continue;
            }
            let what = if center_to_center { "center" } else { "cut" };
            self.emit(
                c,
                a.gap_box(&b),
                &[p, q],
                format!(
                    "{} spacing {} < {}",
                    what,
                    if center_to_center {
                        (center_dist_sq2(&a, &b) as f64).sqrt() / 2.0
                    } else {
                        distance(&a, &b)
                    },
                    spacing
                ),
            );
        }
        Ok(())
    }
}
