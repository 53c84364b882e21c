use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use gcheck_core::{BlockObject, ConstraintId, ConstraintKind, LayerId, Rect};

/// Identity of a violation. Ordering compares box, layer, constraint and
/// source set in that order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarkerId {
    pub bbox: Rect,
    pub layer: LayerId,
    pub constraint: ConstraintId,
    /// Owners of the nets involved.
    pub srcs: BTreeSet<BlockObject>,
}

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    pub kind: ConstraintKind,
    pub rule_name: String,
    pub message: String,
    /// Physical objects whose shapes touch the marker box.
    pub objects: BTreeSet<BlockObject>,
}

impl Marker {
    pub fn bbox(&self) -> Rect {
        self.id.bbox
    }

    pub fn layer(&self) -> LayerId {
        self.id.layer
    }

    pub fn constraint(&self) -> ConstraintId {
        self.id.constraint
    }

    pub fn srcs(&self) -> &BTreeSet<BlockObject> {
        &self.id.srcs
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Deduplicating marker collection for one run.
#[derive(Debug, Clone, Default)]
pub struct MarkerStore {
    /// Reporting box; markers not touching it are dropped.
    window: Option<Rect>,
    markers: BTreeMap<MarkerId, Marker>,
}

impl MarkerStore {
    pub fn new(window: Option<Rect>) -> Self {
        Self {
            window,
            markers: BTreeMap::new(),
        }
    }

    fn in_window(&self, bbox: &Rect) -> bool {
        self.window.map_or(true, |w| w.intersects(bbox))
    }

    /// Returns false if the marker fell outside the window. A duplicate
    /// merges its objects into the stored marker.
    pub fn add(&mut self, marker: Marker) -> bool {
        if !self.in_window(&marker.id.bbox) {
            return false;
        }
        match self.markers.get_mut(&marker.id) {
            Some(existing) => existing.objects.extend(marker.objects),
            None => {
                self.markers.insert(marker.id.clone(), marker);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    /// Markers on `layer` whose box shares interior with `area`.
    pub fn overlapping<'a>(
        &'a self,
        layer: LayerId,
        area: &'a Rect,
    ) -> impl Iterator<Item = &'a Marker> + 'a {
        self.markers
            .values()
            .filter(move |m| m.layer() == layer && m.bbox().overlaps(area))
    }

    /// Final window filter, in identity order.
    pub fn finish(self) -> Vec<Marker> {
        let window = self.window;
        self.markers
            .into_values()
            .filter(|m| window.map_or(true, |w| w.intersects(&m.id.bbox)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcheck_core::ObjId;

    fn marker(bbox: Rect, srcs: &[BlockObject], objects: &[BlockObject]) -> Marker {
        Marker {
            id: MarkerId {
                bbox,
                layer: 1,
                constraint: ConstraintId(2),
                srcs: srcs.iter().copied().collect(),
            },
            kind: ConstraintKind::Spacing,
            rule_name: "spacing".into(),
            message: String::new(),
            objects: objects.iter().copied().collect(),
        }
    }

    #[test]
    fn test_duplicates_merge_objects() {
        let (a, b) = (BlockObject::Net(ObjId::new()), BlockObject::Net(ObjId::new()));
        let (w1, w2) = (BlockObject::Wire(ObjId::new()), BlockObject::Wire(ObjId::new()));
        let mut store = MarkerStore::new(Some(Rect::new(0, 0, 100, 100)));
        let bbox = Rect::new(10, 10, 20, 20);
        assert!(store.add(marker(bbox, &[a, b], &[w1])));
        // Source order does not matter.
        assert!(store.add(marker(bbox, &[b, a], &[w2])));
        assert_eq!(store.len(), 1);
        let stored = store.iter().next().unwrap();
        assert_eq!(stored.objects.len(), 2);
    }

    #[test]
    fn test_window_filter() {
        let a = BlockObject::Net(ObjId::new());
        let mut store = MarkerStore::new(Some(Rect::new(0, 0, 100, 100)));
        assert!(!store.add(marker(Rect::new(200, 200, 210, 210), &[a], &[])));
        // Touching the window edge counts.
        assert!(store.add(marker(Rect::new(100, 50, 120, 60), &[a], &[])));
        assert!(store.add(marker(Rect::new(5, 5, 6, 6), &[a], &[])));
        let out = store.finish();
        assert_eq!(out.len(), 2);
        assert!(out[0].id < out[1].id);
        assert_eq!(out[0].bbox(), Rect::new(5, 5, 6, 6));
    }

    #[test]
    fn test_overlapping_is_open() {
        let a = BlockObject::Net(ObjId::new());
        let mut store = MarkerStore::new(None);
        store.add(marker(Rect::new(0, 0, 10, 10), &[a], &[]));
        let probe = Rect::new(10, 0, 20, 10);
        assert_eq!(store.overlapping(1, &probe).count(), 0);
        let probe = Rect::new(5, 0, 20, 10);
        assert_eq!(store.overlapping(1, &probe).count(), 1);
        assert_eq!(store.overlapping(3, &probe).count(), 0);
    }
}
