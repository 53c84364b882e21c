//! The checking worker.
//!
//! A [`GcWorker`] owns the geometry model of one window of a shared
//! [`Design`] and drives it through two small state machines:
//!
//! ```text
//! build:  Unbuilt -> BaseBuilt -> CandidatesAdded -> Finalized
//! run:    Idle -> Ran -> Ended
//! ```
//!
//! `init` (or `init_pa0` + `init_pa1`) builds the model, `main` checks it and
//! `end` hands out the markers. Routing workers then feed their current
//! geometry back with `update_dr_net` and re-run `main` on the same model.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};

use gcheck_core::{
    BlockObject, ConnFig, Design, DesignError, GeometryError, LayerId, NetKind, ObjId, Rect,
    Technology,
};

use crate::checks::{Evaluator, Scope};
use crate::config::GcConfig;
use crate::error::GcError;
use crate::marker::{Marker, MarkerStore};
use crate::model::{GcModel, GcNet, GcPin, NetId, NewShape, ObsAttrs, PinId, ShapeOrigin};
use crate::patch::{surgical_fix, PatchWire};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Unbuilt,
    BaseBuilt,
    CandidatesAdded,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Ran,
    Ended,
}

/// Current figures of one net, as held by a routing worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteNet {
    pub net: ObjId,
    pub figs: Vec<ConnFig>,
}

#[derive(Debug)]
pub struct GcWorker<'d> {
    design: Option<&'d Design>,
    config: GcConfig,
    ext_box: Option<Rect>,
    drc_box: Option<Rect>,
    window_dirty: bool,
    build: BuildState,
    run: RunState,
    model: GcModel,
    target_net: Option<BlockObject>,
    target_objs: BTreeSet<BlockObject>,
    pa_objs: Vec<(ConnFig, BlockObject)>,
    dr_nets: BTreeMap<ObjId, Vec<ConnFig>>,
    store: MarkerStore,
    markers: Vec<Marker>,
    pwires: Vec<PatchWire>,
}

impl Default for GcWorker<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d> GcWorker<'d> {
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    pub fn with_config(config: GcConfig) -> Self {
        Self {
            design: None,
            config,
            ext_box: None,
            drc_box: None,
            window_dirty: false,
            build: BuildState::Unbuilt,
            run: RunState::Idle,
            model: GcModel::new(),
            target_net: None,
            target_objs: BTreeSet::new(),
            pa_objs: Vec::new(),
            dr_nets: BTreeMap::new(),
            store: MarkerStore::default(),
            markers: Vec::new(),
            pwires: Vec::new(),
        }
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn build_state(&self) -> BuildState {
        self.build
    }

    pub fn run_state(&self) -> RunState {
        self.run
    }

    fn out_of_phase(&self, op: &'static str) -> GcError {
        GcError::OutOfPhase {
            op,
            phase: format!("{:?}/{:?}", self.build, self.run),
        }
    }

    /// The bound design, once a model exists.
    fn bound(&self, op: &'static str) -> Result<&'d Design, GcError> {
        match (self.build, self.design) {
            (BuildState::Unbuilt, _) | (_, None) => Err(self.out_of_phase(op)),
            (_, Some(design)) => Ok(design),
        }
    }

    fn reset_results(&mut self) {
        self.store = MarkerStore::default();
        self.markers.clear();
        self.run = RunState::Idle;
    }

    // ── Window ───────────────────────────────────────────────────────

    pub fn set_ext_box(&mut self, rect: Rect) {
        if self.build != BuildState::Unbuilt && self.ext_box != Some(rect) {
            self.window_dirty = true;
        }
        self.ext_box = Some(rect);
    }

    pub fn ext_box(&self) -> Option<Rect> {
        self.ext_box
    }

    pub fn set_drc_box(&mut self, rect: Rect) {
        if self.build != BuildState::Unbuilt && self.drc_box() != Some(rect) {
            self.window_dirty = true;
        }
        self.drc_box = Some(rect);
    }

    /// The reporting box. Defaults to the extraction box.
    pub fn drc_box(&self) -> Option<Rect> {
        self.drc_box.or(self.ext_box)
    }

    // ── Scope ────────────────────────────────────────────────────────

    /// Check only the net `obj` is or belongs to. The net must have
    /// geometry in the window.
    pub fn set_target_net(&mut self, obj: BlockObject) -> bool {
        if self.build == BuildState::Unbuilt {
            return false;
        }
        match self.resolve_net(obj) {
            Some(key) => {
                self.target_net = Some(key);
                true
            }
            None => false,
        }
    }

    pub fn reset_target_net(&mut self) {
        self.target_net = None;
    }

    pub fn target_net(&self) -> Option<BlockObject> {
        self.target_net
    }

    pub fn add_target_obj(&mut self, obj: BlockObject) {
        self.target_objs.insert(obj);
    }

    pub fn set_target_objs(&mut self, objs: BTreeSet<BlockObject>) {
        self.target_objs = objs;
    }

    pub fn target_objs(&self) -> &BTreeSet<BlockObject> {
        &self.target_objs
    }

    fn has_shapes(&self, key: BlockObject) -> bool {
        self.model
            .net_of(key)
            .and_then(|id| self.model.net(id))
            .is_some_and(|n| !n.shapes.is_empty())
    }

    fn resolve_net(&self, obj: BlockObject) -> Option<BlockObject> {
        if self.has_shapes(obj) {
            return Some(obj);
        }
        let key = owner_key(self.design?, obj);
        self.has_shapes(key).then_some(key)
    }

    /// Target net first, then target objects, then everything.
    fn scope(&self) -> Scope<'_> {
        if let Some(id) = self.target_net.and_then(|key| self.model.net_of(key)) {
            return Scope::Net(id);
        }
        if self.target_objs.is_empty() {
            Scope::All
        } else {
            Scope::Objects(&self.target_objs)
        }
    }

    // ── Toggles ──────────────────────────────────────────────────────

    /// Loading design geometry is decided at build time, so flipping this
    /// on a built model makes the window stale.
    pub fn set_ignore_db(&mut self, ignore: bool) {
        if self.build != BuildState::Unbuilt && self.config.ignore_db != ignore {
            self.window_dirty = true;
        }
        self.config.ignore_db = ignore;
    }

    pub fn set_ignore_min_area(&mut self, ignore: bool) {
        self.config.ignore_min_area = ignore;
    }

    pub fn set_ignore_long_side_eol(&mut self, ignore: bool) {
        self.config.ignore_long_side_eol = ignore;
    }

    pub fn set_ignore_corner_spacing(&mut self, ignore: bool) {
        self.config.ignore_corner_spacing = ignore;
    }

    pub fn set_enable_surgical_fix(&mut self, enable: bool) {
        self.config.enable_surgical_fix = enable;
    }

    // ── Build ────────────────────────────────────────────────────────

    pub fn init(&mut self, design: &'d Design) -> Result<(), GcError> {
        self.init_pa0(design)?;
        self.init_pa1()
    }

    /// Bind the design and build the base model: design geometry plus any
    /// routing-net overrides.
    pub fn init_pa0(&mut self, design: &'d Design) -> Result<(), GcError> {
        if self.build != BuildState::Unbuilt {
            return Err(self.out_of_phase("init_pa0"));
        }
        self.model = self.base_model(design)?;
        self.design = Some(design);
        self.build = BuildState::BaseBuilt;
        self.window_dirty = false;
        debug!(
            "base model of {} built: {} net(s), {} pin(s)",
            design.name,
            self.model.nets().len(),
            self.model.pins().count()
        );
        Ok(())
    }

    /// Inject a pin-access candidate figure owned by `owner`.
    pub fn add_pa_obj(&mut self, fig: ConnFig, owner: BlockObject) -> Result<(), GcError> {
        let design = self.bound("add_pa_obj")?;
        let ext = self.ext_box.ok_or(GcError::WindowUnset)?;
        let rects = fig_rects(&design.tech, std::slice::from_ref(&fig))?;
        let key = owner_key(design, owner);
        let net = self.model.net_for(key, net_kind(design, key));
        add_rects(&mut self.model, net, rects, owner, ShapeOrigin::PinAccess, ext);
        self.pa_objs.push((fig, owner));
        self.build = BuildState::CandidatesAdded;
        self.reset_results();
        Ok(())
    }

    /// Regroup the pins touched by candidates and make the model checkable.
    pub fn init_pa1(&mut self) -> Result<(), GcError> {
        if !matches!(self.build, BuildState::BaseBuilt | BuildState::CandidatesAdded) {
            return Err(self.out_of_phase("init_pa1"));
        }
        let design = self.bound("init_pa1")?;
        self.model.rebuild(&design.tech)?;
        self.build = BuildState::Finalized;
        self.reset_results();
        debug!("model finalized with {} candidate(s)", self.pa_objs.len());
        Ok(())
    }

    /// Drop every pin-access candidate and return to the base model.
    pub fn reset_pa_objs(&mut self) -> Result<(), GcError> {
        let design = self.bound("reset_pa_objs")?;
        let nets: Vec<NetId> = self.model.nets().iter().map(|n| n.id).collect();
        let removed: usize = nets
            .into_iter()
            .map(|n| {
                self.model
                    .remove_shapes(n, |s| s.origin == ShapeOrigin::PinAccess)
            })
            .sum();
        self.model.rebuild(&design.tech)?;
        self.pa_objs.clear();
        self.build = BuildState::BaseBuilt;
        self.reset_results();
        debug!("removed {} candidate shape(s)", removed);
        Ok(())
    }

    fn base_model(&self, design: &Design) -> Result<GcModel, GcError> {
        let ext = self.ext_box.ok_or(GcError::WindowUnset)?;
        let mut model = GcModel::new();
        if !self.config.ignore_db {
            let n = load_design(&mut model, design, ext, &self.dr_nets);
            debug!("loaded {} design shape(s) in {:?}", n, ext);
        }
        for (&id, figs) in &self.dr_nets {
            match fig_rects(&design.tech, figs) {
                Ok(rects) => {
                    let key = BlockObject::Net(id);
                    let net = model.net_for(key, net_kind(design, key));
                    add_rects(&mut model, net, rects, key, ShapeOrigin::RouteNet, ext);
                }
                Err(e) => warn!("skipping routed figures of net {}: {}", id, e),
            }
        }
        model.rebuild(&design.tech)?;
        Ok(model)
    }

    // ── Run ──────────────────────────────────────────────────────────

    /// Check every rule over the current scope. Earlier results are
    /// discarded.
    pub fn main(&mut self) -> Result<(), GcError> {
        if self.build != BuildState::Finalized {
            return Err(self.out_of_phase("main"));
        }
        if self.window_dirty {
            return Err(GcError::StaleWindow);
        }
        let design = self.bound("main")?;
        let window = self.drc_box().ok_or(GcError::WindowUnset)?;

        let scope = self.scope();
        let mut eval = Evaluator::new(&design.tech, &self.model, scope, &self.config, Some(window));
        eval.run()?;
        let (store, candidates) = eval.into_parts();
        let patches = if self.config.enable_surgical_fix {
            surgical_fix(&design.tech, &self.model, scope, &store, &candidates)
        } else {
            Vec::new()
        };

        for pw in patches {
            if !self.pwires.contains(&pw) {
                self.pwires.push(pw);
            }
        }
        info!(
            "checked {:?}: {} marker(s), {} patch wire(s)",
            window,
            store.len(),
            self.pwires.len()
        );
        self.store = store;
        self.markers.clear();
        self.run = RunState::Ran;
        Ok(())
    }

    /// Materialize the markers of the last run.
    pub fn end(&mut self) -> Result<(), GcError> {
        if self.run != RunState::Ran {
            return Err(self.out_of_phase("end"));
        }
        self.markers = std::mem::take(&mut self.store).finish();
        self.run = RunState::Ended;
        Ok(())
    }

    pub fn markers(&self) -> Result<&[Marker], GcError> {
        if self.run != RunState::Ended {
            return Err(self.out_of_phase("markers"));
        }
        Ok(&self.markers)
    }

    pub fn pwires(&self) -> Result<&[PatchWire], GcError> {
        if self.run != RunState::Ended {
            return Err(self.out_of_phase("pwires"));
        }
        Ok(&self.pwires)
    }

    pub fn clear_pwires(&mut self) {
        self.pwires.clear();
    }

    // ── Model access ─────────────────────────────────────────────────

    pub fn nets(&self) -> Result<&[GcNet], GcError> {
        self.bound("nets")?;
        Ok(self.model.nets())
    }

    /// The window net keyed by `obj` or owning it.
    pub fn net(&self, obj: BlockObject) -> Option<&GcNet> {
        let key = match self.model.net_of(obj) {
            Some(_) => obj,
            None => owner_key(self.design?, obj),
        };
        self.model.net(self.model.net_of(key)?)
    }

    pub fn pin(&self, id: PinId) -> Option<&GcPin> {
        self.model.pin(id)
    }

    pub fn model(&self) -> &GcModel {
        &self.model
    }

    // ── Incremental updates ──────────────────────────────────────────

    /// Replace the movable geometry of one design net with routed figures.
    /// Fixed shapes and pin-access candidates of the net are kept.
    pub fn update_dr_net(&mut self, route: &RouteNet) -> Result<(), GcError> {
        let design = self.bound("update_dr_net")?;
        let ext = self.ext_box.ok_or(GcError::WindowUnset)?;
        let key = BlockObject::Net(route.net);
        if design.net(route.net).is_none() {
            return Err(GcError::UnknownNet(key));
        }
        let rects = fig_rects(&design.tech, &route.figs)?;

        let net = self.model.net_for(key, net_kind(design, key));
        let removed = self
            .model
            .remove_shapes(net, |s| !s.fixed && s.origin != ShapeOrigin::PinAccess);
        let added = add_rects(&mut self.model, net, rects, key, ShapeOrigin::RouteNet, ext);
        self.model.rebuild(&design.tech)?;
        self.dr_nets.insert(route.net, route.figs.clone());
        self.reset_results();
        debug!(
            "net {}: replaced {} shape(s) with {} routed shape(s)",
            route.net, removed, added
        );
        Ok(())
    }

    /// Min-step on one pin, outside the normal run. The marker store is
    /// left alone.
    pub fn check_min_step(&self, pin: PinId) -> Result<Vec<Marker>, GcError> {
        let design = self.bound("check_min_step")?;
        if self.model.is_dirty() {
            return Err(self.out_of_phase("check_min_step"));
        }
        let pin = self.model.pin(pin).ok_or(GcError::UnknownPin(pin))?;
        let mut eval = Evaluator::new(&design.tech, &self.model, Scope::All, &self.config, None);
        eval.check_min_step_of(pin);
        Ok(eval.into_parts().0.finish())
    }

    /// Bring the model back in line with the window and scope after they
    /// were changed.
    pub fn update_gc_worker(&mut self) -> Result<(), GcError> {
        let design = self.bound("update_gc_worker")?;
        if self.window_dirty {
            let ext = self.ext_box.ok_or(GcError::WindowUnset)?;
            let mut model = self.base_model(design)?;
            for (fig, owner) in &self.pa_objs {
                match fig_rects(&design.tech, std::slice::from_ref(fig)) {
                    Ok(rects) => {
                        let key = owner_key(design, *owner);
                        let net = model.net_for(key, net_kind(design, key));
                        add_rects(&mut model, net, rects, *owner, ShapeOrigin::PinAccess, ext);
                    }
                    Err(e) => warn!("skipping candidate of {}: {}", owner, e),
                }
            }
            model.rebuild(&design.tech)?;
            self.model = model;
            self.window_dirty = false;
            debug!("rebuilt window {:?}", ext);
        }
        if let Some(key) = self.target_net {
            if !self.has_shapes(key) {
                debug!("target net {} left the window", key);
                self.target_net = None;
            }
        }
        self.reset_results();
        Ok(())
    }
}

// ── Loading ──────────────────────────────────────────────────────────

/// The key of the window net an object's shapes belong to. Terminals
/// without a net and unowned obstructions get a net of their own.
fn owner_key(design: &Design, obj: BlockObject) -> BlockObject {
    if let Some(net) = design.owning_net(obj) {
        return BlockObject::Net(net);
    }
    match obj {
        BlockObject::PinFig(id) => design
            .pin_fig(id)
            .map_or(obj, |fig| BlockObject::Terminal(fig.terminal)),
        _ => obj,
    }
}

fn net_kind(design: &Design, key: BlockObject) -> NetKind {
    match key {
        BlockObject::Net(id) => design.net(id).map(|n| n.kind).unwrap_or_default(),
        _ => NetKind::Signal,
    }
}

fn check_rects(tech: &Technology, rects: &[(LayerId, Rect)]) -> Result<(), DesignError> {
    for &(layer, rect) in rects {
        if !tech.layers.contains(layer) {
            return Err(DesignError::UnknownLayer(layer));
        }
        if rect.is_degenerate() {
            return Err(GeometryError::DegenerateRect(rect).into());
        }
    }
    Ok(())
}

fn fig_rects(tech: &Technology, figs: &[ConnFig]) -> Result<Vec<(LayerId, Rect)>, DesignError> {
    let mut rects = Vec::new();
    for fig in figs {
        rects.extend(fig.layer_rects(tech)?);
    }
    check_rects(tech, &rects)?;
    Ok(rects)
}

/// Add the movable rectangles that reach into `ext`. Returns how many.
fn add_rects(
    model: &mut GcModel,
    net: NetId,
    rects: Vec<(LayerId, Rect)>,
    src: BlockObject,
    origin: ShapeOrigin,
    ext: Rect,
) -> usize {
    let mut added = 0;
    for (layer, rect) in rects.into_iter().filter(|(_, r)| r.intersects(&ext)) {
        model.add_shape(
            net,
            NewShape {
                layer,
                rect,
                src,
                fixed: false,
                origin,
                obs: None,
            },
        );
        added += 1;
    }
    added
}

struct Loaded {
    key: BlockObject,
    fixed: bool,
    obs: Option<ObsAttrs>,
    rects: Vec<(LayerId, Rect)>,
}

/// Shapes of one design object. Movable wiring of nets that were rerouted
/// is left out.
fn design_shapes(
    design: &Design,
    obj: BlockObject,
    rerouted: &BTreeMap<ObjId, Vec<ConnFig>>,
) -> Result<Option<Loaded>, DesignError> {
    let missing = DesignError::UnknownObject(obj);
    let loaded = match obj {
        BlockObject::Wire(id) => {
            let wire = design.wire(id).ok_or(missing)?;
            if !wire.fixed && rerouted.contains_key(&wire.net) {
                return Ok(None);
            }
            let layer = wire.path.layer_id;
            Loaded {
                key: BlockObject::Net(wire.net),
                fixed: wire.fixed,
                obs: None,
                rects: wire.path.to_rects()?.into_iter().map(|r| (layer, r)).collect(),
            }
        }
        BlockObject::Via(id) => {
            let via = design.via(id).ok_or(missing)?;
            if !via.fixed && rerouted.contains_key(&via.net) {
                return Ok(None);
            }
            Loaded {
                key: BlockObject::Net(via.net),
                fixed: via.fixed,
                obs: None,
                rects: design.via_rects(via)?,
            }
        }
        BlockObject::PinFig(id) => {
            let fig = design.pin_fig(id).ok_or(missing)?;
            Loaded {
                key: owner_key(design, obj),
                fixed: true,
                obs: None,
                rects: fig.shape.to_rects()?.into_iter().map(|r| (fig.layer, r)).collect(),
            }
        }
        BlockObject::Obstruction(id) => {
            let o = design.obstruction(id).ok_or(missing)?;
            Loaded {
                key: owner_key(design, obj),
                fixed: true,
                obs: Some(ObsAttrs {
                    effective_width: o.effective_width,
                    min_spacing: o.min_spacing,
                    except_pg_nets: o.except_pg_nets,
                }),
                rects: o.shape.to_rects()?.into_iter().map(|r| (o.layer, r)).collect(),
            }
        }
        BlockObject::Net(_) | BlockObject::Terminal(_) => return Ok(None),
    };
    check_rects(&design.tech, &loaded.rects)?;
    Ok(Some(loaded))
}

/// Load every design object reaching into `ext`. Malformed objects are
/// skipped. Returns the number of shapes added.
fn load_design(
    model: &mut GcModel,
    design: &Design,
    ext: Rect,
    rerouted: &BTreeMap<ObjId, Vec<ConnFig>>,
) -> usize {
    let mut added = 0;
    for obj in design.query(&ext) {
        let loaded = match design_shapes(design, obj, rerouted) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => continue,
            Err(e) => {
                warn!("skipping {}: {}", obj, e);
                continue;
            }
        };
        let net = model.net_for(loaded.key, net_kind(design, loaded.key));
        for (layer, rect) in loaded.rects.into_iter().filter(|(_, r)| r.intersects(&ext)) {
            model.add_shape(
                net,
                NewShape {
                    layer,
                    rect,
                    src: obj,
                    fixed: loaded.fixed,
                    origin: ShapeOrigin::Design,
                    obs: loaded.obs,
                },
            );
            added += 1;
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{design_with, init_logger, M1, M2, V1};
    use gcheck_core::rules::SpacingTable;
    use gcheck_core::{ConstraintKind, Obstruction, Path, Point, Polygon, Rule};

    const EXT: Rect = Rect {
        lower_left: Point { x: -200, y: -200 },
        upper_right: Point { x: 1200, y: 600 },
    };

    fn spacing_design() -> Design {
        design_with(&[(M1, "spacing", Rule::Spacing { spacing: 100 })])
    }

    /// A horizontal M1 wire from x=0 to x=1000, 100 wide, centered on `y`.
    fn bar(design: &mut Design, net: ObjId, y: i64) -> ObjId {
        let path = Path::segment(M1, Point::new(0, y), Point::new(1000, y), 100).with_ext(0);
        design.add_wire(net, path, false).unwrap()
    }

    fn run(worker: &mut GcWorker<'_>) -> Vec<Marker> {
        worker.main().unwrap();
        worker.end().unwrap();
        worker.markers().unwrap().to_vec()
    }

    fn checked<'d>(design: &'d Design) -> GcWorker<'d> {
        let mut worker = GcWorker::new();
        worker.set_ext_box(EXT);
        worker.init(design).unwrap();
        worker
    }

    #[test]
    fn test_same_net_gap_is_clean() {
        init_logger();
        let mut design = spacing_design();
        let a = design.add_net("a", NetKind::Signal);
        bar(&mut design, a, 0);
        bar(&mut design, a, 150);

        let mut worker = checked(&design);
        assert!(run(&mut worker).is_empty());
    }

    #[test]
    fn test_different_net_gap_reported() {
        init_logger();
        let mut design = spacing_design();
        let a = design.add_net("a", NetKind::Signal);
        let b = design.add_net("b", NetKind::Signal);
        let wa = bar(&mut design, a, 0);
        let wb = bar(&mut design, b, 150);

        let mut worker = checked(&design);
        let markers = run(&mut worker);
        assert_eq!(markers.len(), 1);
        let m = &markers[0];
        assert_eq!(m.bbox(), Rect::new(0, 50, 1000, 100));
        assert_eq!(m.layer(), M1);
        assert_eq!(m.kind, ConstraintKind::Spacing);
        let srcs: BTreeSet<BlockObject> = [BlockObject::Net(a), BlockObject::Net(b)].into();
        assert_eq!(m.srcs(), &srcs);
        let objects: BTreeSet<BlockObject> = [BlockObject::Wire(wa), BlockObject::Wire(wb)].into();
        assert_eq!(m.objects, objects);
    }

    #[test]
    fn test_ignore_min_area() {
        init_logger();
        let mut design = design_with(&[(M1, "area", Rule::MinArea { area: 200_000 })]);
        let a = design.add_net("a", NetKind::Signal);
        bar(&mut design, a, 0);

        let mut worker = checked(&design);
        let markers = run(&mut worker);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].kind, ConstraintKind::MinArea);

        worker.set_ignore_min_area(true);
        assert!(run(&mut worker).is_empty());
    }

    #[test]
    fn test_main_is_idempotent() {
        let mut design = spacing_design();
        let a = design.add_net("a", NetKind::Signal);
        let b = design.add_net("b", NetKind::Signal);
        bar(&mut design, a, 0);
        bar(&mut design, b, 150);

        let mut worker = checked(&design);
        let first = run(&mut worker);
        let second = run(&mut worker);
        assert_eq!(first, second);
    }

    #[test]
    fn test_target_net_reports_subset() {
        let mut design = spacing_design();
        let a = design.add_net("a", NetKind::Signal);
        let b = design.add_net("b", NetKind::Signal);
        let c = design.add_net("c", NetKind::Signal);
        bar(&mut design, a, 0);
        let wb = bar(&mut design, b, 150);
        bar(&mut design, c, 300);

        let mut worker = checked(&design);
        let all = run(&mut worker);
        assert_eq!(all.len(), 2);

        // A wire resolves to its net.
        assert!(worker.set_target_net(BlockObject::Wire(wb)));
        assert_eq!(worker.target_net(), Some(BlockObject::Net(b)));
        assert_eq!(run(&mut worker).len(), 2);

        assert!(worker.set_target_net(BlockObject::Net(a)));
        let only_a = run(&mut worker);
        assert_eq!(only_a.len(), 1);
        assert!(all.contains(&only_a[0]));
        assert!(only_a[0].srcs().contains(&BlockObject::Net(a)));

        // Unknown objects leave the scope alone.
        assert!(!worker.set_target_net(BlockObject::Net(ObjId::new())));
        assert_eq!(worker.target_net(), Some(BlockObject::Net(a)));

        worker.reset_target_net();
        worker.add_target_obj(BlockObject::Net(c));
        let only_c = run(&mut worker);
        assert_eq!(only_c.len(), 1);
        assert!(only_c[0].srcs().contains(&BlockObject::Net(c)));
    }

    #[test]
    fn test_widening_drc_box_keeps_markers() {
        let mut design = spacing_design();
        let a = design.add_net("a", NetKind::Signal);
        let b = design.add_net("b", NetKind::Signal);
        bar(&mut design, a, 0);
        bar(&mut design, b, 150);

        let mut worker = GcWorker::new();
        worker.set_ext_box(EXT);
        worker.set_drc_box(Rect::new(-200, -200, 1200, 20));
        worker.init(&design).unwrap();
        let narrow = run(&mut worker);
        assert!(narrow.is_empty());

        worker.set_drc_box(EXT);
        assert_eq!(worker.main(), Err(GcError::StaleWindow));
        worker.update_gc_worker().unwrap();
        let wide = run(&mut worker);
        assert_eq!(wide.len(), 1);
        assert!(narrow.iter().all(|m| wide.contains(m)));
    }

    #[test]
    fn test_check_min_step_without_main() {
        let mut design = design_with(&[(
            M1,
            "step",
            Rule::MinStep {
                min_step_length: 20,
                max_edges: 0,
            },
        )]);
        let a = design.add_net("a", NetKind::Signal);
        let term = design.add_terminal("A", Some(a)).unwrap();
        let l_shape = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 50),
            Point::new(90, 50),
            Point::new(90, 100),
            Point::new(0, 100),
        ]);
        design.add_pin_fig(term, M1, l_shape).unwrap();

        let worker = checked(&design);
        let net = worker.net(BlockObject::Net(a)).unwrap();
        assert_eq!(net.pins.len(), 1);
        let markers = worker.check_min_step(net.pins[0]).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].bbox(), Rect::new(90, 50, 100, 50));
        assert_eq!(markers[0].kind, ConstraintKind::MinStep);
        // Nothing was run.
        assert_eq!(worker.run_state(), RunState::Idle);
        assert_eq!(
            worker.check_min_step(PinId(99)),
            Err(GcError::UnknownPin(PinId(99)))
        );
    }

    #[test]
    fn test_pin_access_trial_and_reset() {
        let mut design = spacing_design();
        let a = design.add_net("a", NetKind::Signal);
        let b = design.add_net("b", NetKind::Signal);
        bar(&mut design, b, 300);
        let term = design.add_terminal("A", Some(a)).unwrap();
        let fig = design.add_pin_fig(term, M1, Rect::new(0, 0, 100, 100)).unwrap();

        let mut worker = GcWorker::new();
        worker.set_ext_box(EXT);
        worker.init_pa0(&design).unwrap();
        assert_eq!(worker.build_state(), BuildState::BaseBuilt);

        // Access stub from the pin up towards net b.
        let stub = ConnFig::Patch {
            layer: M1,
            rect: Rect::new(20, 100, 80, 200),
        };
        worker.add_pa_obj(stub, BlockObject::PinFig(fig)).unwrap();
        assert_eq!(worker.build_state(), BuildState::CandidatesAdded);
        worker.init_pa1().unwrap();
        let markers = run(&mut worker);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].bbox(), Rect::new(20, 200, 80, 250));
        assert!(markers[0].objects.contains(&BlockObject::PinFig(fig)));
        // The stub joined the pin of net a.
        assert_eq!(worker.net(BlockObject::Net(a)).unwrap().pins.len(), 1);

        worker.reset_pa_objs().unwrap();
        assert_eq!(worker.build_state(), BuildState::BaseBuilt);
        worker.init_pa1().unwrap();
        assert!(run(&mut worker).is_empty());
    }

    #[test]
    fn test_update_dr_net_moves_one_net() {
        let mut design = spacing_design();
        let a = design.add_net("a", NetKind::Signal);
        let b = design.add_net("b", NetKind::Signal);
        bar(&mut design, a, 0);
        bar(&mut design, b, 150);

        let mut worker = checked(&design);
        assert_eq!(run(&mut worker).len(), 1);
        let a_pins = worker.net(BlockObject::Net(a)).unwrap().pins.clone();

        let moved = RouteNet {
            net: b,
            figs: vec![ConnFig::Path(
                Path::segment(M1, Point::new(0, 400), Point::new(1000, 400), 100).with_ext(0),
            )],
        };
        worker.update_dr_net(&moved).unwrap();
        assert_eq!(worker.run_state(), RunState::Idle);
        assert!(run(&mut worker).is_empty());
        // Net a was not regrouped.
        assert_eq!(worker.net(BlockObject::Net(a)).unwrap().pins, a_pins);

        let stray = RouteNet {
            net: ObjId::new(),
            figs: Vec::new(),
        };
        assert!(matches!(
            worker.update_dr_net(&stray),
            Err(GcError::UnknownNet(_))
        ));

        // The override survives a rebuild of the window.
        worker.set_ext_box(Rect::new(-300, -300, 1300, 700));
        worker.update_gc_worker().unwrap();
        assert!(run(&mut worker).is_empty());
    }

    #[test]
    fn test_surgical_fix_through_worker() {
        let mut design = design_with(&[
            (
                M1,
                "step",
                Rule::MinStep {
                    min_step_length: 20,
                    max_edges: 0,
                },
            ),
            (M1, "spacing", Rule::Spacing { spacing: 30 }),
        ]);
        let a = design.add_net("a", NetKind::Signal);

        let mut worker = checked(&design);
        worker.set_enable_surgical_fix(true);
        let route = RouteNet {
            net: a,
            figs: vec![
                ConnFig::Patch {
                    layer: M1,
                    rect: Rect::new(0, 0, 100, 50),
                },
                ConnFig::Patch {
                    layer: M1,
                    rect: Rect::new(0, 50, 90, 100),
                },
            ],
        };
        worker.update_dr_net(&route).unwrap();
        run(&mut worker);
        run(&mut worker);
        let expected = PatchWire::new(M1, Rect::new(90, 50, 100, 100), BlockObject::Net(a));
        assert_eq!(worker.pwires().unwrap(), &[expected]);

        worker.clear_pwires();
        assert!(worker.pwires().unwrap().is_empty());
    }

    #[test]
    fn test_phase_errors() {
        let design = spacing_design();
        let mut worker = GcWorker::new();
        assert_eq!(worker.init(&design), Err(GcError::WindowUnset));
        assert!(matches!(
            worker.main(),
            Err(GcError::OutOfPhase { op: "main", .. })
        ));
        assert!(!worker.set_target_net(BlockObject::Net(ObjId::new())));
        assert!(worker.nets().is_err());

        worker.set_ext_box(EXT);
        worker.init(&design).unwrap();
        assert!(matches!(
            worker.end(),
            Err(GcError::OutOfPhase { op: "end", .. })
        ));
        assert!(worker.markers().is_err());
        assert!(worker.init(&design).is_err());
        worker.main().unwrap();
        assert!(worker.markers().is_err());
        worker.end().unwrap();
        assert!(worker.markers().unwrap().is_empty());
        assert_eq!(worker.build_state(), BuildState::Finalized);
    }

    #[test]
    fn test_stale_window_and_ignore_db() {
        let mut design = spacing_design();
        let a = design.add_net("a", NetKind::Signal);
        let b = design.add_net("b", NetKind::Signal);
        bar(&mut design, a, 0);
        bar(&mut design, b, 150);

        let mut worker = checked(&design);
        worker.set_ignore_db(true);
        assert_eq!(worker.main(), Err(GcError::StaleWindow));
        worker.update_gc_worker().unwrap();
        assert!(run(&mut worker).is_empty());
        assert!(worker.nets().unwrap().is_empty());
    }

    #[test]
    fn test_target_net_dropped_when_window_moves() {
        let mut design = spacing_design();
        let a = design.add_net("a", NetKind::Signal);
        bar(&mut design, a, 0);

        let mut worker = checked(&design);
        assert!(worker.set_target_net(BlockObject::Net(a)));
        worker.set_ext_box(Rect::new(5000, 5000, 6000, 6000));
        worker.update_gc_worker().unwrap();
        assert_eq!(worker.target_net(), None);
    }

    #[test]
    fn test_malformed_object_skipped() {
        init_logger();
        let mut design = spacing_design();
        let a = design.add_net("a", NetKind::Signal);
        let b = design.add_net("b", NetKind::Signal);
        bar(&mut design, a, 0);
        bar(&mut design, b, 150);
        let slanted = Polygon::new(vec![
            Point::new(0, 300),
            Point::new(100, 300),
            Point::new(50, 400),
        ]);
        design.add_obstruction(Obstruction::new(M1, slanted)).unwrap();

        let mut worker = checked(&design);
        assert_eq!(run(&mut worker).len(), 1);
        assert_eq!(worker.nets().unwrap().len(), 2);
    }

    #[test]
    fn test_vias_and_obstructions_load_on_their_layers() {
        let mut design = design_with(&[(
            V1,
            "cut",
            Rule::CutSpacing {
                spacing: 100,
                center_to_center: false,
                same_net: false,
            },
        )]);
        let a = design.add_net("a", NetKind::Signal);
        let def = gcheck_core::ViaDefId(0);
        let via = design.add_via(a, def, Point::new(0, 0), false).unwrap();
        let obs = design
            .add_obstruction(Obstruction::new(V1, Rect::new(75, -25, 125, 25)))
            .unwrap();

        let mut worker = checked(&design);
        let markers = run(&mut worker);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].bbox(), Rect::new(25, -25, 75, 25));
        let srcs: BTreeSet<BlockObject> =
            [BlockObject::Net(a), BlockObject::Obstruction(obs)].into();
        assert_eq!(markers[0].srcs(), &srcs);
        assert!(markers[0].objects.contains(&BlockObject::Via(via)));

        let net = worker.net(BlockObject::Via(via)).unwrap();
        let layers: BTreeSet<LayerId> = net
            .pins
            .iter()
            .filter_map(|&p| worker.pin(p))
            .map(|p| p.layer)
            .collect();
        assert_eq!(layers, [M1, V1, M2].into());
    }

    #[test]
    fn test_workers_share_a_design() {
        let mut design = spacing_design();
        let a = design.add_net("a", NetKind::Signal);
        let b = design.add_net("b", NetKind::Signal);
        bar(&mut design, a, 0);
        bar(&mut design, b, 150);

        let design = &design;
        let results: Vec<Vec<Marker>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(move || {
                        let mut worker = checked(design);
                        run(&mut worker)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results[0].len(), 1);
        assert_eq!(results[0], results[1]);
    }

    #[test]
    fn test_obstruction_min_spacing_replaces_rule() {
        init_logger();
        let markers_with = |obs: Obstruction| {
            let mut design = spacing_design();
            let a = design.add_net("a", NetKind::Signal);
            bar(&mut design, a, 0);
            design.add_obstruction(obs).unwrap();
            let mut worker = checked(&design);
            run(&mut worker)
        };

        // 120 away: clean under the rule, too close for the obstruction.
        let far = Rect::new(0, 170, 1000, 200);
        assert!(markers_with(Obstruction::new(M1, far)).is_empty());
        let markers = markers_with(Obstruction::new(M1, far).with_min_spacing(150));
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].bbox(), Rect::new(0, 50, 1000, 170));

        // 80 away: the smaller obstruction value wins over the rule.
        let near = Rect::new(0, 130, 1000, 160);
        assert_eq!(markers_with(Obstruction::new(M1, near)).len(), 1);
        assert!(markers_with(Obstruction::new(M1, near).with_min_spacing(50)).is_empty());
    }

    #[test]
    fn test_obstruction_effective_width_selects_table_row() {
        init_logger();
        let markers_with = |obs: Obstruction| {
            let table =
                SpacingTable::new(vec![0, 150], vec![0, 200], vec![vec![60, 60], vec![60, 120]]);
            let mut design = design_with(&[(M1, "prl", Rule::SpacingTable(table))]);
            let a = design.add_net("a", NetKind::Signal);
            bar(&mut design, a, 150);
            design.add_obstruction(obs).unwrap();
            let mut worker = checked(&design);
            run(&mut worker)
        };

        // A thin blockage 100 away needs only 60.
        let thin = Rect::new(0, 300, 1000, 340);
        assert!(markers_with(Obstruction::new(M1, thin)).is_empty());
        let markers = markers_with(Obstruction::new(M1, thin).with_effective_width(200));
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].kind, ConstraintKind::SpacingTable);
        assert_eq!(markers[0].bbox(), Rect::new(0, 200, 1000, 300));
    }

    #[test]
    fn test_obstruction_except_pg_nets() {
        init_logger();
        let markers_with = |kind: NetKind, obs: Obstruction| {
            let mut design = spacing_design();
            let a = design.add_net("a", kind);
            bar(&mut design, a, 0);
            design.add_obstruction(obs).unwrap();
            let mut worker = checked(&design);
            run(&mut worker)
        };
        let blockage = || Obstruction::new(M1, Rect::new(200, 0, 300, 100));

        assert!(markers_with(NetKind::Power, blockage().with_except_pg_nets()).is_empty());

        let markers = markers_with(NetKind::Signal, blockage().with_except_pg_nets());
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].kind, ConstraintKind::Short);
        assert_eq!(markers[0].bbox(), Rect::new(200, 0, 300, 50));

        assert_eq!(markers_with(NetKind::Power, blockage()).len(), 1);
    }
}
