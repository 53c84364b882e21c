//! Read-only design database consumed by the checker.
//!
//! Objects are stored flat, keyed by [`ObjId`], with parent links by id.
//! Any object can be named with a [`BlockObject`] handle, which is what
//! checkers keep in their own structures and markers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::decompose::GeometryError;
use crate::geometry::{Coord, FigShape, Path, Point, Rect};
use crate::layer::LayerId;
use crate::spatial::{SpatialEntry, SpatialIndex};
use crate::tech::{Technology, ViaDefId};

/// Unique identifier of a database object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjId(pub Uuid);

impl ObjId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to any object of the design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockObject {
    Net(ObjId),
    Terminal(ObjId),
    PinFig(ObjId),
    Wire(ObjId),
    Via(ObjId),
    Obstruction(ObjId),
}

impl BlockObject {
    pub fn id(&self) -> ObjId {
        match *self {
            BlockObject::Net(id)
            | BlockObject::Terminal(id)
            | BlockObject::PinFig(id)
            | BlockObject::Wire(id)
            | BlockObject::Via(id)
            | BlockObject::Obstruction(id) => id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            BlockObject::Net(_) => "net",
            BlockObject::Terminal(_) => "term",
            BlockObject::PinFig(_) => "pinfig",
            BlockObject::Wire(_) => "wire",
            BlockObject::Via(_) => "via",
            BlockObject::Obstruction(_) => "obs",
        }
    }
}

impl fmt::Display for BlockObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind_name(), self.id())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetKind {
    #[default]
    Signal,
    Power,
    Ground,
}

impl NetKind {
    pub fn is_pg(self) -> bool {
        matches!(self, NetKind::Power | NetKind::Ground)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Net {
    pub id: ObjId,
    pub name: String,
    pub kind: NetKind,
    pub wires: Vec<ObjId>,
    pub vias: Vec<ObjId>,
}

/// A routed wire. Fixed wires are never treated as routing candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wire {
    pub id: ObjId,
    pub net: ObjId,
    pub path: Path,
    pub fixed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViaInst {
    pub id: ObjId,
    pub net: ObjId,
    pub def: ViaDefId,
    pub origin: Point,
    pub fixed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Terminal {
    pub id: ObjId,
    pub name: String,
    pub net: Option<ObjId>,
    pub figs: Vec<ObjId>,
}

/// One physical figure of a terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinFig {
    pub id: ObjId,
    pub terminal: ObjId,
    pub layer: LayerId,
    pub shape: FigShape,
}

/// A routing blockage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obstruction {
    pub id: ObjId,
    pub layer: LayerId,
    pub shape: FigShape,
    pub owner_net: Option<ObjId>,
    /// Width used for width-dependent spacing lookups instead of the
    /// geometric width.
    pub effective_width: Option<Coord>,
    /// Spacing required around the blockage, replacing the layer rules.
    pub min_spacing: Option<Coord>,
    /// Power and ground nets may route over the blockage.
    pub except_pg_nets: bool,
}

impl Obstruction {
    pub fn new(layer: LayerId, shape: impl Into<FigShape>) -> Self {
        Self {
            id: ObjId::new(),
            layer,
            shape: shape.into(),
            owner_net: None,
            effective_width: None,
            min_spacing: None,
            except_pg_nets: false,
        }
    }

    pub fn with_owner_net(mut self, net: ObjId) -> Self {
        self.owner_net = Some(net);
        self
    }

    pub fn with_effective_width(mut self, width: Coord) -> Self {
        self.effective_width = Some(width);
        self
    }

    pub fn with_min_spacing(mut self, spacing: Coord) -> Self {
        self.min_spacing = Some(spacing);
        self
    }

    pub fn with_except_pg_nets(mut self) -> Self {
        self.except_pg_nets = true;
        self
    }
}

/// A connection figure supplied by a routing worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnFig {
    Path(Path),
    Via { def: ViaDefId, origin: Point },
    Patch { layer: LayerId, rect: Rect },
}

impl ConnFig {
    /// Rectangles of the figure on every layer it occupies.
    pub fn layer_rects(&self, tech: &Technology) -> Result<Vec<(LayerId, Rect)>, DesignError> {
        match self {
            ConnFig::Path(path) => {
                let layer = path.layer_id;
                Ok(path.to_rects()?.into_iter().map(|r| (layer, r)).collect())
            }
            ConnFig::Via { def, origin } => {
                let def = tech.via_def(*def).ok_or(DesignError::UnknownViaDef(*def))?;
                Ok(def.placed(*origin))
            }
            ConnFig::Patch { rect, .. } if rect.is_degenerate() => {
                Err(GeometryError::DegenerateRect(*rect).into())
            }
            ConnFig::Patch { layer, rect } => Ok(vec![(*layer, *rect)]),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DesignError {
    #[error("unknown net {0}")]
    UnknownNet(ObjId),

    #[error("unknown terminal {0}")]
    UnknownTerminal(ObjId),

    #[error("unknown object {0}")]
    UnknownObject(BlockObject),

    #[error("unknown via definition {0:?}")]
    UnknownViaDef(ViaDefId),

    #[error("unknown layer {0}")]
    UnknownLayer(LayerId),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Nets, terminals and blockages of one block, with their technology.
///
/// The design is never mutated by checkers and may be shared between
/// threads. Region queries are served by an index built on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Design {
    pub name: String,
    pub tech: Technology,
    nets: BTreeMap<ObjId, Net>,
    wires: BTreeMap<ObjId, Wire>,
    vias: BTreeMap<ObjId, ViaInst>,
    terminals: BTreeMap<ObjId, Terminal>,
    pin_figs: BTreeMap<ObjId, PinFig>,
    obstructions: BTreeMap<ObjId, Obstruction>,
    #[serde(skip)]
    index: OnceLock<SpatialIndex<BlockObject>>,
}

impl Design {
    pub fn new(name: &str, tech: Technology) -> Self {
        Self {
            name: name.to_string(),
            tech,
            nets: BTreeMap::new(),
            wires: BTreeMap::new(),
            vias: BTreeMap::new(),
            terminals: BTreeMap::new(),
            pin_figs: BTreeMap::new(),
            obstructions: BTreeMap::new(),
            index: OnceLock::new(),
        }
    }

    fn touch(&mut self) {
        self.index = OnceLock::new();
    }

    fn check_layer(&self, layer: LayerId) -> Result<(), DesignError> {
        if self.tech.layers.contains(layer) {
            Ok(())
        } else {
            Err(DesignError::UnknownLayer(layer))
        }
    }

    // ── Construction ─────────────────────────────────────────────────

    pub fn add_net(&mut self, name: &str, kind: NetKind) -> ObjId {
        let id = ObjId::new();
        self.nets.insert(
            id,
            Net {
                id,
                name: name.to_string(),
                kind,
                wires: Vec::new(),
                vias: Vec::new(),
            },
        );
        id
    }

    /// Geometry is not validated here; malformed wires are stored as given.
    pub fn add_wire(&mut self, net: ObjId, path: Path, fixed: bool) -> Result<ObjId, DesignError> {
        self.check_layer(path.layer_id)?;
        let id = ObjId::new();
        self.nets
            .get_mut(&net)
            .ok_or(DesignError::UnknownNet(net))?
            .wires
            .push(id);
        self.wires.insert(
            id,
            Wire {
                id,
                net,
                path,
                fixed,
            },
        );
        self.touch();
        Ok(id)
    }

    pub fn add_via(
        &mut self,
        net: ObjId,
        def: ViaDefId,
        origin: Point,
        fixed: bool,
    ) -> Result<ObjId, DesignError> {
        if self.tech.via_def(def).is_none() {
            return Err(DesignError::UnknownViaDef(def));
        }
        let id = ObjId::new();
        self.nets
            .get_mut(&net)
            .ok_or(DesignError::UnknownNet(net))?
            .vias
            .push(id);
        self.vias.insert(
            id,
            ViaInst {
                id,
                net,
                def,
                origin,
                fixed,
            },
        );
        self.touch();
        Ok(id)
    }

    pub fn add_terminal(&mut self, name: &str, net: Option<ObjId>) -> Result<ObjId, DesignError> {
        if let Some(net) = net {
            if !self.nets.contains_key(&net) {
                return Err(DesignError::UnknownNet(net));
            }
        }
        let id = ObjId::new();
        self.terminals.insert(
            id,
            Terminal {
                id,
                name: name.to_string(),
                net,
                figs: Vec::new(),
            },
        );
        Ok(id)
    }

    pub fn add_pin_fig(
        &mut self,
        terminal: ObjId,
        layer: LayerId,
        shape: impl Into<FigShape>,
    ) -> Result<ObjId, DesignError> {
        self.check_layer(layer)?;
        let id = ObjId::new();
        self.terminals
            .get_mut(&terminal)
            .ok_or(DesignError::UnknownTerminal(terminal))?
            .figs
            .push(id);
        self.pin_figs.insert(
            id,
            PinFig {
                id,
                terminal,
                layer,
                shape: shape.into(),
            },
        );
        self.touch();
        Ok(id)
    }

    pub fn add_obstruction(&mut self, obs: Obstruction) -> Result<ObjId, DesignError> {
        self.check_layer(obs.layer)?;
        if let Some(net) = obs.owner_net {
            if !self.nets.contains_key(&net) {
                return Err(DesignError::UnknownNet(net));
            }
        }
        let id = obs.id;
        self.obstructions.insert(id, obs);
        self.touch();
        Ok(id)
    }

    // ── Access ───────────────────────────────────────────────────────

    pub fn net(&self, id: ObjId) -> Option<&Net> {
        self.nets.get(&id)
    }

    pub fn net_by_name(&self, name: &str) -> Option<&Net> {
        self.nets.values().find(|n| n.name == name)
    }

    pub fn nets(&self) -> impl Iterator<Item = &Net> {
        self.nets.values()
    }

    pub fn wire(&self, id: ObjId) -> Option<&Wire> {
        self.wires.get(&id)
    }

    pub fn via(&self, id: ObjId) -> Option<&ViaInst> {
        self.vias.get(&id)
    }

    pub fn terminal(&self, id: ObjId) -> Option<&Terminal> {
        self.terminals.get(&id)
    }

    pub fn pin_fig(&self, id: ObjId) -> Option<&PinFig> {
        self.pin_figs.get(&id)
    }

    pub fn obstruction(&self, id: ObjId) -> Option<&Obstruction> {
        self.obstructions.get(&id)
    }

    pub fn obstructions(&self) -> impl Iterator<Item = &Obstruction> {
        self.obstructions.values()
    }

    pub fn contains(&self, obj: BlockObject) -> bool {
        match obj {
            BlockObject::Net(id) => self.nets.contains_key(&id),
            BlockObject::Terminal(id) => self.terminals.contains_key(&id),
            BlockObject::PinFig(id) => self.pin_figs.contains_key(&id),
            BlockObject::Wire(id) => self.wires.contains_key(&id),
            BlockObject::Via(id) => self.vias.contains_key(&id),
            BlockObject::Obstruction(id) => self.obstructions.contains_key(&id),
        }
    }

    /// The net an object belongs to, if any.
    pub fn owning_net(&self, obj: BlockObject) -> Option<ObjId> {
        match obj {
            BlockObject::Net(id) => self.nets.contains_key(&id).then_some(id),
            BlockObject::Terminal(id) => self.terminals.get(&id)?.net,
            BlockObject::PinFig(id) => {
                let fig = self.pin_figs.get(&id)?;
                self.terminals.get(&fig.terminal)?.net
            }
            BlockObject::Wire(id) => self.wires.get(&id).map(|w| w.net),
            BlockObject::Via(id) => self.vias.get(&id).map(|v| v.net),
            BlockObject::Obstruction(id) => self.obstructions.get(&id)?.owner_net,
        }
    }

    /// Rectangles of a via instance on every layer of its definition.
    pub fn via_rects(&self, via: &ViaInst) -> Result<Vec<(LayerId, Rect)>, DesignError> {
        let def = self
            .tech
            .via_def(via.def)
            .ok_or(DesignError::UnknownViaDef(via.def))?;
        Ok(def.placed(via.origin))
    }

    /// Bounding box of a physical object. Nets and terminals have none.
    pub fn obj_bbox(&self, obj: BlockObject) -> Option<Rect> {
        match obj {
            BlockObject::Net(_) | BlockObject::Terminal(_) => None,
            BlockObject::PinFig(id) => self.pin_figs.get(&id)?.shape.bbox(),
            BlockObject::Wire(id) => self.wires.get(&id)?.path.bbox(),
            BlockObject::Via(id) => {
                let via = self.vias.get(&id)?;
                let bbox = self.tech.via_def(via.def)?.bbox()?;
                Some(bbox.translate(via.origin.x, via.origin.y))
            }
            BlockObject::Obstruction(id) => self.obstructions.get(&id)?.shape.bbox(),
        }
    }

    fn physical_objects(&self) -> impl Iterator<Item = BlockObject> + '_ {
        self.pin_figs
            .keys()
            .map(|&id| BlockObject::PinFig(id))
            .chain(self.wires.keys().map(|&id| BlockObject::Wire(id)))
            .chain(self.vias.keys().map(|&id| BlockObject::Via(id)))
            .chain(self.obstructions.keys().map(|&id| BlockObject::Obstruction(id)))
    }

    fn index(&self) -> &SpatialIndex<BlockObject> {
        self.index.get_or_init(|| {
            let mut entries = Vec::new();
            for obj in self.physical_objects() {
                match self.obj_bbox(obj) {
                    Some(bbox) => entries.push(SpatialEntry::new(obj, bbox)),
                    None => log::warn!("{}: {} has no extent and is not indexed", self.name, obj),
                }
            }
            log::debug!("{}: indexed {} object(s)", self.name, entries.len());
            SpatialIndex::build(entries)
        })
    }

    /// Physical objects whose bounding box touches `area`, sorted.
    pub fn query(&self, area: &Rect) -> Vec<BlockObject> {
        let mut found: Vec<BlockObject> = self.index().query(area).map(|e| e.key).collect();
        found.sort();
        found
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
