use serde::{Deserialize, Serialize};

use gcheck_core::ConstraintKind;

/// Checker switches. Missing fields in JSON take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Load only injected geometry, nothing from the design.
    pub ignore_db: bool,
    pub ignore_min_area: bool,
    /// Skip end-of-line edges running along the preferred direction.
    pub ignore_long_side_eol: bool,
    pub ignore_corner_spacing: bool,
    pub enable_surgical_fix: bool,
}

impl GcConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Whether a whole rule family is switched off.
    pub fn skips(&self, kind: ConstraintKind) -> bool {
        match kind {
            ConstraintKind::MinArea => self.ignore_min_area,
            ConstraintKind::CornerSpacing => self.ignore_corner_spacing,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GcConfig::from_json(r#"{ "ignore_min_area": true }"#).unwrap();
        assert!(config.ignore_min_area);
        assert!(!config.enable_surgical_fix);
        assert!(config.skips(ConstraintKind::MinArea));
        assert!(!config.skips(ConstraintKind::CornerSpacing));
        assert!(!config.skips(ConstraintKind::Short));
    }
}
