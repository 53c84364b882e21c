//! Window geometry: nets own pins, pins own shapes.
//!
//! Shapes and pins live in arenas addressed by [`ShapeId`] and [`PinId`].
//! Slots are recycled after removal. A net whose shapes change is marked
//! dirty and its pins are regrouped on the next [`GcModel::rebuild`].

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use gcheck_core::{BlockObject, Coord, LayerId, NetKind, Rect, SpatialEntry, SpatialIndex, Technology};

use crate::error::GcError;
use crate::outline::PinOutline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PinId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetId(pub usize);

/// Where a shape came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShapeOrigin {
    Design,
    PinAccess,
    RouteNet,
}

/// Blockage attributes carried by obstruction shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObsAttrs {
    pub effective_width: Option<Coord>,
    pub min_spacing: Option<Coord>,
    pub except_pg_nets: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcShape {
    pub id: ShapeId,
    pub net: NetId,
    /// Set once pins are built.
    pub pin: Option<PinId>,
    pub layer: LayerId,
    pub rect: Rect,
    pub src: BlockObject,
    pub fixed: bool,
    pub origin: ShapeOrigin,
    pub obs: Option<ObsAttrs>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcPin {
    pub id: PinId,
    pub net: NetId,
    pub layer: LayerId,
    pub shapes: Vec<ShapeId>,
    pub outline: PinOutline,
    /// Every shape of the pin is fixed.
    pub fixed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcNet {
    pub id: NetId,
    pub owner: BlockObject,
    pub kind: NetKind,
    pub shapes: Vec<ShapeId>,
    pub pins: Vec<PinId>,
}

/// Index entry: one maximal rectangle of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RectRef {
    pub pin: PinId,
    pub idx: usize,
}

/// A shape waiting to be added.
#[derive(Debug, Clone, Copy)]
pub struct NewShape {
    pub layer: LayerId,
    pub rect: Rect,
    pub src: BlockObject,
    pub fixed: bool,
    pub origin: ShapeOrigin,
    pub obs: Option<ObsAttrs>,
}

#[derive(Debug, Default)]
pub struct GcModel {
    shapes: Vec<Option<GcShape>>,
    free_shapes: Vec<usize>,
    pins: Vec<Option<GcPin>>,
    free_pins: Vec<usize>,
    nets: Vec<GcNet>,
    owner2net: BTreeMap<BlockObject, NetId>,
    indexes: BTreeMap<LayerId, SpatialIndex<RectRef>>,
    indexed: bool,
    dirty: BTreeSet<NetId>,
}

impl GcModel {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Access ───────────────────────────────────────────────────────

    pub fn shape(&self, id: ShapeId) -> Option<&GcShape> {
        self.shapes.get(id.0)?.as_ref()
    }

    pub fn pin(&self, id: PinId) -> Option<&GcPin> {
        self.pins.get(id.0)?.as_ref()
    }

    pub fn pins(&self) -> impl Iterator<Item = &GcPin> {
        self.pins.iter().flatten()
    }

    pub fn pins_on(&self, layer: LayerId) -> impl Iterator<Item = &GcPin> {
        self.pins().filter(move |p| p.layer == layer)
    }

    pub fn net(&self, id: NetId) -> Option<&GcNet> {
        self.nets.get(id.0)
    }

    pub fn nets(&self) -> &[GcNet] {
        &self.nets
    }

    pub fn net_of(&self, owner: BlockObject) -> Option<NetId> {
        self.owner2net.get(&owner).copied()
    }

    /// Net of a pin. Pins always have one.
    pub fn pin_net(&self, pin: &GcPin) -> Option<&GcNet> {
        self.nets.get(pin.net.0)
    }

    pub fn pin_shapes<'a>(&'a self, pin: &'a GcPin) -> impl Iterator<Item = &'a GcShape> + 'a {
        pin.shapes.iter().filter_map(|&s| self.shape(s))
    }

    pub fn index(&self, layer: LayerId) -> Option<&SpatialIndex<RectRef>> {
        self.indexes.get(&layer)
    }

    pub fn rect(&self, r: RectRef) -> Option<Rect> {
        self.pin(r.pin)?.outline.max_rects.get(r.idx).copied()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Blockage attributes of the pin material under `rect`.
    pub fn obs_at(&self, pin: &GcPin, rect: &Rect) -> Option<ObsAttrs> {
        self.pin_shapes(pin)
            .filter(|s| s.rect.overlaps(rect))
            .find_map(|s| s.obs)
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// The net keyed by `owner`, created on first use.
    pub fn net_for(&mut self, owner: BlockObject, kind: NetKind) -> NetId {
        if let Some(&id) = self.owner2net.get(&owner) {
            return id;
        }
        let id = NetId(self.nets.len());
        self.nets.push(GcNet {
            id,
            owner,
            kind,
            shapes: Vec::new(),
            pins: Vec::new(),
        });
        self.owner2net.insert(owner, id);
        id
    }

    pub fn add_shape(&mut self, net: NetId, new: NewShape) -> ShapeId {
        let slot = self.free_shapes.pop().unwrap_or(self.shapes.len());
        let id = ShapeId(slot);
        let shape = GcShape {
            id,
            net,
            pin: None,
            layer: new.layer,
            rect: new.rect,
            src: new.src,
            fixed: new.fixed,
            origin: new.origin,
            obs: new.obs,
        };
        if slot == self.shapes.len() {
            self.shapes.push(Some(shape));
        } else {
            self.shapes[slot] = Some(shape);
        }
        if let Some(n) = self.nets.get_mut(net.0) {
            n.shapes.push(id);
        }
        self.dirty.insert(net);
        id
    }

    /// Drop the shapes of `net` matching `pred`. Returns how many went.
    pub fn remove_shapes<F>(&mut self, net: NetId, pred: F) -> usize
    where
        F: Fn(&GcShape) -> bool,
    {
        let Some(n) = self.nets.get(net.0) else {
            return 0;
        };
        let doomed: Vec<ShapeId> = n
            .shapes
            .iter()
            .copied()
            .filter(|&s| self.shape(s).is_some_and(&pred))
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        for s in &doomed {
            self.shapes[s.0] = None;
            self.free_shapes.push(s.0);
        }
        let gone: BTreeSet<ShapeId> = doomed.iter().copied().collect();
        self.nets[net.0].shapes.retain(|s| !gone.contains(s));
        self.dirty.insert(net);
        doomed.len()
    }

    /// Regroup the pins of every dirty net. The first call builds the layer
    /// indexes in bulk; later calls patch them per pin.
    pub fn rebuild(&mut self, tech: &Technology) -> Result<(), GcError> {
        let dirty = std::mem::take(&mut self.dirty);
        for &net in &dirty {
            self.rebuild_net(net)?;
        }
        if !self.indexed {
            self.build_indexes(tech);
        }
        debug!("rebuilt pins of {} net(s)", dirty.len());
        Ok(())
    }

    fn build_indexes(&mut self, tech: &Technology) {
        let mut entries: BTreeMap<LayerId, Vec<SpatialEntry<RectRef>>> = tech
            .layers
            .all_layers()
            .iter()
            .map(|l| (l.id, Vec::new()))
            .collect();
        for pin in self.pins.iter().flatten() {
            let list = entries.entry(pin.layer).or_default();
            for (idx, r) in pin.outline.max_rects.iter().enumerate() {
                list.push(SpatialEntry::new(RectRef { pin: pin.id, idx }, *r));
            }
        }
        self.indexes = entries
            .into_iter()
            .map(|(layer, list)| (layer, SpatialIndex::build(list)))
            .collect();
        self.indexed = true;
    }

    fn drop_pin(&mut self, id: PinId) {
        let Some(pin) = self.pins.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        if let Some(index) = self.indexes.get_mut(&pin.layer) {
            for (idx, r) in pin.outline.max_rects.iter().enumerate() {
                index.remove(RectRef { pin: id, idx }, *r);
            }
        }
        self.free_pins.push(id.0);
    }

    fn rebuild_net(&mut self, net: NetId) -> Result<(), GcError> {
        let Some(n) = self.nets.get_mut(net.0) else {
            return Ok(());
        };
        let old = std::mem::take(&mut n.pins);
        let shape_ids = n.shapes.clone();
        for pin in old {
            self.drop_pin(pin);
        }

        let mut by_layer: BTreeMap<LayerId, Vec<(ShapeId, Rect)>> = BTreeMap::new();
        for s in shape_ids {
            if let Some(shape) = self.shape(s) {
                if shape.rect.is_degenerate() {
                    return Err(GcError::Degenerate {
                        layer: shape.layer,
                        rect: shape.rect,
                    });
                }
                by_layer.entry(shape.layer).or_default().push((s, shape.rect));
            }
        }

        let mut new_pins = Vec::new();
        for (layer, members) in by_layer {
            for group in connected_groups(&members) {
                new_pins.push(self.add_pin(net, layer, group)?);
            }
        }
        self.nets[net.0].pins = new_pins;
        Ok(())
    }

    fn add_pin(&mut self, net: NetId, layer: LayerId, shapes: Vec<(ShapeId, Rect)>) -> Result<PinId, GcError> {
        let rects: Vec<Rect> = shapes.iter().map(|&(_, r)| r).collect();
        let outline = PinOutline::from_rects(&rects).ok_or(GcError::Degenerate {
            layer,
            rect: rects.first().copied().unwrap_or_default(),
        })?;
        let slot = self.free_pins.pop().unwrap_or(self.pins.len());
        let id = PinId(slot);
        let mut fixed = true;
        for &(s, _) in &shapes {
            if let Some(shape) = self.shapes.get_mut(s.0).and_then(Option::as_mut) {
                shape.pin = Some(id);
                fixed &= shape.fixed;
            }
        }
        if self.indexed {
            let index = self.indexes.entry(layer).or_default();
            for (idx, r) in outline.max_rects.iter().enumerate() {
                index.insert(RectRef { pin: id, idx }, *r);
            }
        }
        let pin = GcPin {
            id,
            net,
            layer,
            shapes: shapes.into_iter().map(|(s, _)| s).collect(),
            outline,
            fixed,
        };
        if slot == self.pins.len() {
            self.pins.push(Some(pin));
        } else {
            self.pins[slot] = Some(pin);
        }
        Ok(id)
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Group rectangles that touch, transitively. Groups come out ordered by
/// their first member.
fn connected_groups(members: &[(ShapeId, Rect)]) -> Vec<Vec<(ShapeId, Rect)>> {
    let n = members.len();
    let mut parent: Vec<usize> = (0..n).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| (members[i].1.xl(), i));
    for (k, &i) in order.iter().enumerate() {
        let a = members[i].1;
        for &j in &order[k + 1..] {
            let b = members[j].1;
            if b.xl() > a.xh() {
                break;
            }
            if a.intersects(&b) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }
    let mut groups: BTreeMap<usize, Vec<(ShapeId, Rect)>> = BTreeMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(members[i]);
    }
    groups.into_values().collect()
}
