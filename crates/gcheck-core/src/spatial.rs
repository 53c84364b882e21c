use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::{Coord, Rect};

/// An entry in the R-tree spatial index: a key and the box it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialEntry<K> {
    pub key: K,
    pub bbox: Rect,
}

impl<K> SpatialEntry<K> {
    pub fn new(key: K, bbox: Rect) -> Self {
        Self { key, bbox }
    }
}

fn envelope_of(r: &Rect) -> AABB<[Coord; 2]> {
    AABB::from_corners([r.xl(), r.yl()], [r.xh(), r.yh()])
}

impl<K> RTreeObject for SpatialEntry<K> {
    type Envelope = AABB<[Coord; 2]>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(&self.bbox)
    }
}

/// Box index with incremental insertion and removal.
///
/// Queries are closed: an entry touching the query box is returned.
#[derive(Clone)]
pub struct SpatialIndex<K> {
    tree: RTree<SpatialEntry<K>>,
}

impl<K> std::fmt::Debug for SpatialIndex<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("len", &self.tree.size())
            .finish()
    }
}

impl<K: PartialEq> SpatialIndex<K> {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Build the index from a list of entries.
    pub fn build(entries: Vec<SpatialEntry<K>>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Insert a single entry.
    pub fn insert(&mut self, key: K, bbox: Rect) {
        self.tree.insert(SpatialEntry::new(key, bbox));
    }

    /// Remove the entry with exactly this key and box.
    pub fn remove(&mut self, key: K, bbox: Rect) -> bool {
        self.tree.remove(&SpatialEntry::new(key, bbox)).is_some()
    }

    /// Find all entries whose box intersects `area`.
    pub fn query(&self, area: &Rect) -> impl Iterator<Item = &SpatialEntry<K>> {
        self.tree.locate_in_envelope_intersecting(&envelope_of(area))
    }

    /// Find all entries within `dist` of `area` along both axes.
    pub fn query_bloated(&self, area: &Rect, dist: Coord) -> impl Iterator<Item = &SpatialEntry<K>> {
        let bloated = area.bloat(dist);
        self.tree.locate_in_envelope_intersecting(&envelope_of(&bloated))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpatialEntry<K>> {
        self.tree.iter()
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl<K: PartialEq> Default for SpatialIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}
