//! Fixtures shared by the unit tests.

use gcheck_core::{
    BlockObject, Design, Dir, Layer, LayerId, NetKind, ObjId, Rect, Rule, Technology, ViaDef,
};

use crate::model::{GcModel, NetId, NewShape, ShapeId, ShapeOrigin};

pub const M1: LayerId = 1;
pub const V1: LayerId = 2;
pub const M2: LayerId = 3;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// M1 (horizontal), V1, M2 (vertical) and one via master, with no rules
/// beyond the implicit shorts.
pub fn tech() -> Technology {
    tech_with(&[])
}

pub fn tech_with(rules: &[(LayerId, &str, Rule)]) -> Technology {
    let mut tech = Technology::new("test");
    tech.add_layer(Layer::routing(M1, "M1", Dir::Horizontal)).unwrap();
    tech.add_layer(Layer::cut(V1, "V1")).unwrap();
    tech.add_layer(Layer::routing(M2, "M2", Dir::Vertical)).unwrap();
    tech.add_via_def(
        ViaDef::new("V1_0")
            .with_layer(M1, vec![Rect::new(-50, -50, 50, 50)])
            .with_layer(V1, vec![Rect::new(-25, -25, 25, 25)])
            .with_layer(M2, vec![Rect::new(-50, -50, 50, 50)]),
    );
    for (layer, name, rule) in rules {
        tech.add_constraint(*layer, name, rule.clone()).unwrap();
    }
    tech
}

pub fn design_with(rules: &[(LayerId, &str, Rule)]) -> Design {
    Design::new("top", tech_with(rules))
}

pub fn net(model: &mut GcModel, kind: NetKind) -> NetId {
    model.net_for(BlockObject::Net(ObjId::new()), kind)
}

pub fn net_keyed(model: &mut GcModel, owner: BlockObject, kind: NetKind) -> NetId {
    model.net_for(owner, kind)
}

pub fn add_rect(model: &mut GcModel, net: NetId, layer: LayerId, rect: Rect, fixed: bool) -> ShapeId {
    model.add_shape(
        net,
        NewShape {
            layer,
            rect,
            src: BlockObject::Wire(ObjId::new()),
            fixed,
            origin: ShapeOrigin::Design,
            obs: None,
        },
    )
}

pub fn build(model: &mut GcModel, tech: &Technology) {
    model.rebuild(tech).unwrap();
}
