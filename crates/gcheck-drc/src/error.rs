use thiserror::Error;

use gcheck_core::{BlockObject, DesignError, GeometryError, LayerId, Rect};

use crate::model::PinId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GcError {
    #[error("extraction box is not set")]
    WindowUnset,

    #[error("`{op}` is not valid in phase {phase}")]
    OutOfPhase { op: &'static str, phase: String },

    #[error("window changed after the model was built; call update_gc_worker first")]
    StaleWindow,

    #[error("unknown pin {0:?}")]
    UnknownPin(PinId),

    #[error("{0} is not a net of the design")]
    UnknownNet(BlockObject),

    #[error("no spatial index for layer {0}")]
    IndexUnbuilt(LayerId),

    #[error("degenerate shape {rect:?} on layer {layer}")]
    Degenerate { layer: LayerId, rect: Rect },

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Design(#[from] DesignError),
}

impl GcError {
    /// Internal inconsistency of the model, as opposed to caller misuse.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            GcError::IndexUnbuilt(_) | GcError::Degenerate { .. } | GcError::Geometry(_)
        )
    }
}
