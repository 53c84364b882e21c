use std::collections::BTreeMap;

use gcheck_core::{Constraint, Coord, CoverGrid, Rect, Rule};

use super::{below, distance, in_contact, Evaluator, RectPair};
use crate::error::GcError;
use crate::model::{GcPin, PinId};

impl<'a> Evaluator<'a> {
    /// Different-net material that overlaps or shares an edge.
    pub(super) fn check_short(&mut self, c: &'a Constraint) -> Result<(), GcError> {
        let mut contacts: BTreeMap<(PinId, PinId), (&'a GcPin, &'a GcPin, Vec<Rect>)> = BTreeMap::new();
        for RectPair { p, a, q, b } in self.rect_pairs(c.layer, 0)? {
            if self.same_net(p, q) || self.excepted(p, &a, q, &b) {
                continue;
            }
            let Some(touch) = a.intersection(&b) else {
                continue;
            };
            if touch.width() == 0 && touch.height() == 0 {
                continue;
            }
            contacts
                .entry((p.id, q.id))
                .or_insert_with(|| (p, q, Vec::new()))
                .2
                .push(touch);
        }

        for (p, q, touches) in contacts.into_values() {
            let (solid, edges): (Vec<Rect>, Vec<Rect>) =
                touches.into_iter().partition(|r| !r.is_degenerate());
            for r in CoverGrid::from_rects(&solid).max_rects() {
                self.emit(c, r, &[p, q], format!("short of {}x{}", r.width(), r.height()));
            }
            let mut edges = edges;
            edges.sort();
            edges.dedup();
            for e in edges {
                if solid.iter().any(|s| s.contains(&e)) {
                    continue;
                }
                self.emit(c, e, &[p, q], "abutting different nets".to_string());
            }
        }
        Ok(())
    }

    /// Obstruction material that power and ground nets may ignore.
    fn excepted(&self, p: &GcPin, a: &Rect, q: &GcPin, b: &Rect) -> bool {
        let model = self.model;
        let pg = |pin: &GcPin| model.pin_net(pin).is_some_and(|n| n.kind.is_pg());
        let except = |pin: &GcPin, r: &Rect| model.obs_at(pin, r).is_some_and(|o| o.except_pg_nets);
        (except(p, a) && pg(q)) || (except(q, b) && pg(p))
    }

    fn max_obs_spacing(&self, c: &Constraint) -> Coord {
        self.model
            .pins_on(c.layer)
            .flat_map(|p| self.model.pin_shapes(p))
            .filter_map(|s| s.obs.and_then(|o| o.min_spacing))
            .max()
            .unwrap_or(0)
    }

    /// Spacing between different nets, plain or by width and run length.
    pub(super) fn check_spacing(&mut self, c: &'a Constraint) -> Result<(), GcError> {
        let dist = c.rule.interaction_distance().max(self.max_obs_spacing(c));
        for RectPair { p, a, q, b } in self.rect_pairs(c.layer, dist)? {
            if self.same_net(p, q) || in_contact(&a, &b) || self.excepted(p, &a, q, &b) {
                continue;
            }
            let oa = self.model.obs_at(p, &a);
            let ob = self.model.obs_at(q, &b);
            let obs_spacing = oa
                .and_then(|o| o.min_spacing)
                .into_iter()
                .chain(ob.and_then(|o| o.min_spacing))
                .max();
            let required = match (obs_spacing, &c.rule) {
                (Some(s), _) => s,
                (None, Rule::Spacing { spacing }) => *spacing,
                (None, Rule::SpacingTable(table)) => {
                    let wa = oa.and_then(|o| o.effective_width).unwrap_or(a.min_dim());
                    let wb = ob.and_then(|o| o.effective_width).unwrap_or(b.min_dim());
                    table.lookup(wa.max(wb), a.prl(&b))
                }
                (None, _) => continue,
            };
            if !below(a.dist_sq(&b), required) {
                continue;
            }
            for gap in self.open_gaps(&a, &b, &[p, q]) {
                self.emit(
                    c,
                    gap,
                    &[p, q],
                    format!("spacing {} < {}", distance(&a, &b), required),
                );
            }
        }
        Ok(())
    }

    /// Spacing between unconnected pieces of one net, including notches.
    pub(super) fn check_same_net(
        &mut self,
        c: &'a Constraint,
        spacing: Coord,
        pg_only: bool,
    ) -> Result<(), GcError> {
        let model = self.model;
        let applies = |pin: &GcPin| !pg_only || model.pin_net(pin).is_some_and(|n| n.kind.is_pg());

        for RectPair { p, a, q, b } in self.rect_pairs(c.layer, spacing)? {
            if !self.same_net(p, q) || !applies(p) || a.intersects(&b) {
                continue;
            }
            if !below(a.dist_sq(&b), spacing) {
                continue;
            }
            for gap in self.open_gaps(&a, &b, &[p, q]) {
                self.emit(
                    c,
                    gap,
                    &[p, q],
                    format!("same-net spacing {} < {}", distance(&a, &b), spacing),
                );
            }
        }

        for p in self.pins_in_scope(c.layer) {
            if p.fixed || !applies(p) {
                continue;
            }
            let rects = &p.outline.max_rects;
            for (i, a) in rects.iter().enumerate() {
                for b in &rects[i + 1..] {
                    let (gx, gy) = (a.gap_x(b), a.gap_y(b));
                    // Facing sides only.
                    if (gx > 0) == (gy > 0) || gx.max(gy) >= spacing || a.prl(b) <= 0 {
                        continue;
                    }
                    let Some(notch) = notch_gap(rects, a, b) else {
                        continue;
                    };
                    self.emit(
                        c,
                        notch,
                        &[p],
                        format!("notch {} < {}", gx.max(gy), spacing),
                    );
                    self.propose(c, p, notch);
                }
            }
        }
        Ok(())
    }
}

/// The empty part of the gap between two facing rectangles of one pin.
///
/// Material spanning the whole gap trims it from the ends. Material that
/// fills only part of its width, or sits in the middle, means the gap is
/// not a notch.
pub(crate) fn notch_gap(rects: &[Rect], a: &Rect, b: &Rect) -> Option<Rect> {
    let across_x = a.gap_x(b) > 0;
    let gap = a.gap_box(b);
    let (mut lo, mut hi) = if across_x {
        (gap.yl(), gap.yh())
    } else {
        (gap.xl(), gap.xh())
    };
    let current = |lo: Coord, hi: Coord| {
        if across_x {
            Rect::new(gap.xl(), lo, gap.xh(), hi)
        } else {
            Rect::new(lo, gap.yl(), hi, gap.yh())
        }
    };

    loop {
        let g = current(lo, hi);
        let Some(r) = rects.iter().find(|r| r.overlaps(&g)) else {
            break;
        };
        let (spans, r_lo, r_hi) = if across_x {
            (r.xl() <= g.xl() && r.xh() >= g.xh(), r.yl(), r.yh())
        } else {
            (r.yl() <= g.yl() && r.yh() >= g.yh(), r.xl(), r.xh())
        };
        if !spans {
            return None;
        }
        if r_lo <= lo {
            lo = r_hi;
        } else if r_hi >= hi {
            hi = r_lo;
        } else {
            return None;
        }
        if lo >= hi {
            return None;
        }
    }
    Some(current(lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::checks::Scope;
    use crate::model::GcModel;
    use crate::testutil::{add_rect, build, net, tech_with};
    use gcheck_core::rules::SpacingTable;
    use gcheck_core::{ConstraintKind, NetKind, Rule};

    fn run(model: &GcModel, tech: &gcheck_core::Technology) -> Vec<crate::marker::Marker> {
        let config = GcConfig::default();
        let mut eval = Evaluator::new(tech, model, Scope::All, &config, None);
        eval.run().unwrap();
        eval.into_parts().0.finish()
    }

    #[test]
    fn test_u_notch_gap() {
        let rects = vec![
            Rect::new(0, 0, 20, 100),
            Rect::new(0, 0, 60, 20),
            Rect::new(40, 0, 60, 100),
        ];
        assert_eq!(
            notch_gap(&rects, &rects[0], &rects[2]),
            Some(Rect::new(20, 20, 40, 100))
        );
        // A bridge in the middle splits the gap.
        let mut bridged = rects.clone();
        bridged.push(Rect::new(0, 50, 60, 60));
        assert_eq!(notch_gap(&bridged, &bridged[0], &bridged[2]), None);
    }

    #[test]
    fn test_short_reports_overlap_once() {
        let tech = tech_with(&[]);
        let mut model = GcModel::new();
        let a = net(&mut model, NetKind::Signal);
        let b = net(&mut model, NetKind::Signal);
        add_rect(&mut model, a, 1, Rect::new(0, 0, 100, 20), false);
        add_rect(&mut model, a, 1, Rect::new(0, 0, 20, 100), false);
        add_rect(&mut model, b, 1, Rect::new(10, 10, 50, 50), false);
        build(&mut model, &tech);

        let markers = run(&model, &tech);
        let shorts: Vec<Rect> = markers
            .iter()
            .filter(|m| m.kind == ConstraintKind::Short)
            .map(|m| m.bbox())
            .collect();
        assert_eq!(shorts, vec![Rect::new(10, 10, 20, 50), Rect::new(10, 10, 50, 20)]);
    }

    #[test]
    fn test_abutting_nets_short_on_edge() {
        let tech = tech_with(&[]);
        let mut model = GcModel::new();
        let a = net(&mut model, NetKind::Signal);
        let b = net(&mut model, NetKind::Signal);
        add_rect(&mut model, a, 1, Rect::new(0, 0, 100, 20), false);
        add_rect(&mut model, b, 1, Rect::new(100, 0, 200, 20), false);
        // Corner contact only is not a short.
        add_rect(&mut model, b, 1, Rect::new(-50, 20, 0, 60), false);
        build(&mut model, &tech);

        let markers = run(&model, &tech);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].bbox(), Rect::new(100, 0, 100, 20));
        assert_eq!(markers[0].srcs().len(), 2);
    }

    #[test]
    fn test_table_spacing_uses_width_and_prl() {
        let table = SpacingTable::new(vec![0, 150], vec![0, 200], vec![vec![60, 60], vec![60, 120]]);
        let tech = tech_with(&[(1, "prl", Rule::SpacingTable(table))]);
        let mut model = GcModel::new();
        let wide = net(&mut model, NetKind::Signal);
        let thin = net(&mut model, NetKind::Signal);
        add_rect(&mut model, wide, 1, Rect::new(0, 0, 1000, 200), false);
        // 100 apart with 500 of run: the wide row needs 120.
        add_rect(&mut model, thin, 1, Rect::new(0, 300, 500, 340), false);
        // 100 apart with a run of 100: 60 suffices.
        add_rect(&mut model, thin, 1, Rect::new(900, -140, 1000, -100), false);
        build(&mut model, &tech);

        let markers = run(&model, &tech);
        let spacing: Vec<_> = markers
            .iter()
            .filter(|m| m.kind == ConstraintKind::SpacingTable)
            .collect();
        assert_eq!(spacing.len(), 1);
        assert_eq!(spacing[0].bbox(), Rect::new(0, 200, 500, 300));
    }

    #[test]
    fn test_same_net_notch_and_pg_only() {
        let tech = tech_with(&[(
            1,
            "notch",
            Rule::SpacingSameNet {
                spacing: 30,
                pg_only: false,
            },
        )]);
        let mut model = GcModel::new();
        let n = net(&mut model, NetKind::Signal);
        add_rect(&mut model, n, 1, Rect::new(0, 0, 20, 100), false);
        add_rect(&mut model, n, 1, Rect::new(0, 0, 60, 20), false);
        add_rect(&mut model, n, 1, Rect::new(40, 0, 60, 100), false);
        build(&mut model, &tech);

        let config = GcConfig::default();
        let mut eval = Evaluator::new(&tech, &model, Scope::All, &config, None);
        eval.run().unwrap();
        let (store, fixes) = eval.into_parts();
        let markers = store.finish();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].bbox(), Rect::new(20, 20, 40, 100));
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].rect, Rect::new(20, 20, 40, 100));

        let pg_tech = tech_with(&[(
            1,
            "notch",
            Rule::SpacingSameNet {
                spacing: 30,
                pg_only: true,
            },
        )]);
        assert!(run(&model, &pg_tech).is_empty());
    }

    #[test]
    fn test_corner_touch_between_nets_is_spacing() {
        let tech = tech_with(&[(1, "min", Rule::Spacing { spacing: 100 })]);
        let mut model = GcModel::new();
        let a = net(&mut model, NetKind::Signal);
        let b = net(&mut model, NetKind::Signal);
        add_rect(&mut model, a, 1, Rect::new(0, 0, 100, 100), false);
        add_rect(&mut model, b, 1, Rect::new(100, 100, 200, 200), false);
        build(&mut model, &tech);

        let markers = run(&model, &tech);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].kind, ConstraintKind::Spacing);
        assert_eq!(markers[0].bbox(), Rect::new(100, 100, 100, 100));
    }

    #[test]
    fn test_partly_filled_gap_reports_open_stretches() {
        let tech = tech_with(&[(1, "min", Rule::Spacing { spacing: 60 })]);
        let mut model = GcModel::new();
        let a = net(&mut model, NetKind::Signal);
        let b = net(&mut model, NetKind::Signal);
        add_rect(&mut model, a, 1, Rect::new(0, 0, 100, 20), false);
        add_rect(&mut model, a, 1, Rect::new(0, 0, 60, 50), false);
        add_rect(&mut model, b, 1, Rect::new(0, 70, 100, 90), false);
        build(&mut model, &tech);

        let mut boxes: Vec<Rect> = run(&model, &tech).iter().map(|m| m.bbox()).collect();
        boxes.sort_by_key(|r| (r.xl(), r.yl()));
        // The thin arm is 50 away beside the tab, the tab 20 away.
        assert_eq!(boxes, vec![Rect::new(0, 50, 60, 70), Rect::new(60, 20, 100, 70)]);
    }

    #[test]
    fn test_touching_same_net_shapes_are_clean() {
        let tech = tech_with(&[
            (1, "min", Rule::Spacing { spacing: 100 }),
            (
                1,
                "same",
                Rule::SpacingSameNet {
                    spacing: 100,
                    pg_only: false,
                },
            ),
        ]);
        let mut model = GcModel::new();
        let n = net(&mut model, NetKind::Signal);
        add_rect(&mut model, n, 1, Rect::new(0, 0, 100, 20), false);
        add_rect(&mut model, n, 1, Rect::new(50, 0, 150, 20), false);
        add_rect(&mut model, n, 1, Rect::new(150, 0, 250, 20), false);
        add_rect(&mut model, n, 1, Rect::new(0, 0, 20, 120), false);
        build(&mut model, &tech);

        assert!(run(&model, &tech).is_empty());
    }
}
