//! # gcheck DRC
//!
//! Windowed geometric design rule checking for detailed routing.
//!
//! A [`GcWorker`] loads every object of a [`gcheck_core::Design`] reaching
//! into its extraction box, groups the shapes of each net into pins, and
//! checks them against the technology's constraints. Violations inside the
//! reporting box come back as [`Marker`]s. Routing workers push their
//! current geometry with [`GcWorker::update_dr_net`] and re-check only
//! what they touched.

pub mod checks;
pub mod config;
pub mod error;
pub mod marker;
pub mod model;
pub mod outline;
pub mod patch;
pub mod worker;

#[cfg(test)]
mod testutil;

pub use checks::{Evaluator, FixCandidate, Scope};
pub use config::GcConfig;
pub use error::GcError;
pub use marker::{Marker, MarkerId, MarkerStore};
pub use model::{GcModel, GcNet, GcPin, GcShape, NetId, PinId, ShapeId, ShapeOrigin};
pub use outline::PinOutline;
pub use patch::{surgical_fix, PatchWire};
pub use worker::{BuildState, GcWorker, RouteNet, RunState};
