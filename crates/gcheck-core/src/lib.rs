//! # gcheck core
//!
//! Layout database for the checker: integer geometric primitives, polygon
//! decomposition, the technology (layers, rules, via masters), the design
//! (nets, terminals, wires, vias, obstructions) and an R-tree spatial index.

pub mod decompose;
pub mod design;
pub mod geometry;
pub mod layer;
pub mod rules;
pub mod spatial;
pub mod tech;

pub use decompose::{decompose_polygon, CoverGrid, GeometryError};
pub use design::{BlockObject, ConnFig, Design, DesignError, NetKind, ObjId, Obstruction};
pub use geometry::{Coord, Dir, FigShape, Path, Point, Polygon, Rect};
pub use layer::{Layer, LayerId, LayerKind, LayerStack};
pub use rules::{Constraint, ConstraintId, ConstraintKind, Rule};
pub use spatial::{SpatialEntry, SpatialIndex};
pub use tech::{TechError, Technology, ViaDef, ViaDefId};
