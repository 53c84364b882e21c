//! Surgical fix: turn fix candidates into patch wires.

use std::collections::BTreeSet;

use log::debug;
use serde::{Deserialize, Serialize};

use gcheck_core::{BlockObject, LayerId, Point, Rect, Technology};

use crate::checks::{FixCandidate, Scope};
use crate::marker::MarkerStore;
use crate::model::GcModel;

/// A small piece of metal proposed to clear a violation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatchWire {
    pub layer: LayerId,
    pub origin: Point,
    /// Patch extent relative to `origin`.
    pub offset_box: Rect,
    pub net: BlockObject,
}

impl PatchWire {
    pub fn new(layer: LayerId, rect: Rect, net: BlockObject) -> Self {
        let origin = rect.lower_left;
        Self {
            layer,
            origin,
            offset_box: rect.translate(-origin.x, -origin.y),
            net,
        }
    }

    /// The patch in absolute coordinates.
    pub fn rect(&self) -> Rect {
        self.offset_box.translate(self.origin.x, self.origin.y)
    }
}

/// Keep the candidates that are safe to apply.
///
/// A patch must belong to a routed pin of a design net in scope, keep the
/// layer's minimum spacing to every other pin, and stay clear of markers
/// raised by other rules.
pub fn surgical_fix(
    tech: &Technology,
    model: &GcModel,
    scope: Scope<'_>,
    store: &MarkerStore,
    candidates: &[FixCandidate],
) -> Vec<PatchWire> {
    let mut out: BTreeSet<PatchWire> = BTreeSet::new();
    for cand in candidates {
        let Some(pin) = model.pin(cand.pin) else {
            continue;
        };
        let Some(net) = model.pin_net(pin) else {
            continue;
        };
        if pin.fixed || !matches!(net.owner, BlockObject::Net(_)) || !scope.contains(model, pin) {
            continue;
        }
        if store
            .overlapping(cand.layer, &cand.rect)
            .any(|m| m.constraint() != cand.constraint)
        {
            debug!("patch {:?} overlaps another violation", cand.rect);
            continue;
        }
        let clearance = tech.min_spacing(cand.layer);
        let crowded = model.index(cand.layer).is_some_and(|index| {
            index.query_bloated(&cand.rect, clearance).any(|e| {
                let d = e.bbox.dist_sq(&cand.rect);
                let c = clearance as i128;
                e.key.pin != cand.pin && (d < c * c || e.bbox.overlaps(&cand.rect))
            })
        });
        if crowded {
            debug!("patch {:?} too close to other pins", cand.rect);
            continue;
        }
        out.insert(PatchWire::new(cand.layer, cand.rect, net.owner));
    }
    out.into_iter().collect()
}
