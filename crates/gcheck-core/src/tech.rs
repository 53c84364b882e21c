use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Coord, Point, Rect};
use crate::layer::{Layer, LayerId, LayerStack};
use crate::rules::{Constraint, ConstraintId, ConstraintKind, Rule};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TechError {
    #[error("layer {0} is not defined")]
    UnknownLayer(LayerId),

    #[error("duplicate layer id {0}")]
    DuplicateLayer(LayerId),

    #[error("{kind:?} rules do not apply to layer {layer}")]
    RuleNotApplicable { kind: ConstraintKind, layer: LayerId },
}

/// Index of a via definition within its technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViaDefId(pub usize);

/// A via master: rectangles per layer, relative to the via origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViaDef {
    pub name: String,
    pub shapes: Vec<(LayerId, Vec<Rect>)>,
}

impl ViaDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shapes: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: LayerId, rects: Vec<Rect>) -> Self {
        self.shapes.push((layer, rects));
        self
    }

    /// Shapes of an instance placed at `origin`.
    pub fn placed(&self, origin: Point) -> Vec<(LayerId, Rect)> {
        self.shapes
            .iter()
            .flat_map(|(layer, rects)| {
                rects
                    .iter()
                    .map(move |r| (*layer, r.translate(origin.x, origin.y)))
            })
            .collect()
    }

    /// Bounding box over all layers, relative to the origin.
    pub fn bbox(&self) -> Option<Rect> {
        self.shapes
            .iter()
            .flat_map(|(_, rects)| rects.iter().copied())
            .reduce(|a, b| a.union(&b))
    }
}

/// Layers, rules, and via masters of a process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    pub layers: LayerStack,
    constraints: Vec<Constraint>,
    via_defs: Vec<ViaDef>,
}

impl Technology {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Add a layer. Every layer gets an implicit short constraint.
    pub fn add_layer(&mut self, layer: Layer) -> Result<LayerId, TechError> {
        let id = layer.id;
        if self.layers.contains(id) {
            return Err(TechError::DuplicateLayer(id));
        }
        self.layers.add_layer(layer);
        self.push_constraint(id, "short", Rule::Short);
        Ok(id)
    }

    pub fn add_constraint(
        &mut self,
        layer: LayerId,
        name: &str,
        rule: Rule,
    ) -> Result<ConstraintId, TechError> {
        let kind = self
            .layers
            .get_layer(layer)
            .ok_or(TechError::UnknownLayer(layer))?
            .kind;
        if !rule.applies_to(kind) {
            return Err(TechError::RuleNotApplicable {
                kind: rule.kind(),
                layer,
            });
        }
        Ok(self.push_constraint(layer, name, rule))
    }

    fn push_constraint(&mut self, layer: LayerId, name: &str, rule: Rule) -> ConstraintId {
        let id = ConstraintId(self.constraints.len());
        self.constraints.push(Constraint {
            id,
            layer,
            name: name.to_string(),
            rule,
        });
        id
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(id.0)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraints_on(&self, layer: LayerId) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(move |c| c.layer == layer)
    }

    /// First constraint of `kind` on `layer`.
    pub fn find(&self, layer: LayerId, kind: ConstraintKind) -> Option<&Constraint> {
        self.constraints_on(layer).find(|c| c.kind() == kind)
    }

    /// The smallest different-net spacing any two shapes on `layer` must keep.
    pub fn min_spacing(&self, layer: LayerId) -> Coord {
        self.constraints_on(layer)
            .filter_map(|c| match &c.rule {
                Rule::Spacing { spacing } => Some(*spacing),
                Rule::SpacingTable(table) => Some(table.min_spacing()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    pub fn add_via_def(&mut self, def: ViaDef) -> ViaDefId {
        self.via_defs.push(def);
        ViaDefId(self.via_defs.len() - 1)
    }

    pub fn via_def(&self, id: ViaDefId) -> Option<&ViaDef> {
        self.via_defs.get(id.0)
    }

    pub fn via_defs(&self) -> &[ViaDef] {
        &self.via_defs
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
