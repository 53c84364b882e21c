use serde::{Deserialize, Serialize};

use crate::geometry::{Coord, Dir};

/// A unique layer identifier.
pub type LayerId = u32;

/// What a layer carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    /// Metal layer carrying wires and via enclosures.
    Routing,
    /// Via cut layer between two routing layers.
    Cut,
}

/// Represents a technology layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    /// Preferred routing direction.
    pub direction: Dir,
    /// Default wire width.
    pub width: Coord,
    pub description: String,
}

impl Layer {
    pub fn new(id: LayerId, name: &str, kind: LayerKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            direction: Dir::Horizontal,
            width: 0,
            description: String::new(),
        }
    }

    pub fn routing(id: LayerId, name: &str, direction: Dir) -> Self {
        Self::new(id, name, LayerKind::Routing).with_direction(direction)
    }

    pub fn cut(id: LayerId, name: &str) -> Self {
        Self::new(id, name, LayerKind::Cut)
    }

    pub fn with_direction(mut self, direction: Dir) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_width(mut self, width: Coord) -> Self {
        self.width = width;
        self
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    pub fn is_routing(&self) -> bool {
        self.kind == LayerKind::Routing
    }

    pub fn is_cut(&self) -> bool {
        self.kind == LayerKind::Cut
    }
}

/// The ordered layers of a technology, bottom to top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn add_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn get_layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn get_layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.get_layer(id).is_some()
    }

    pub fn all_layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn routing_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.is_routing())
    }

    pub fn cut_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.is_cut())
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_lookup() {
        let mut stack = LayerStack::new();
        stack.add_layer(Layer::routing(1, "M1", Dir::Horizontal).with_width(100));
        stack.add_layer(Layer::cut(2, "V1"));
        stack.add_layer(Layer::routing(3, "M2", Dir::Vertical));
        assert_eq!(stack.layer_count(), 3);
        assert_eq!(stack.get_layer_by_name("V1").map(|l| l.id), Some(2));
        assert_eq!(stack.routing_layers().count(), 2);
        assert_eq!(stack.cut_layers().count(), 1);
        assert_eq!(stack.get_layer(3).map(|l| l.direction), Some(Dir::Vertical));
        assert!(!stack.contains(4));
    }
}
