//! Design rule (constraint) definitions.
//!
//! Constraints are immutable once added to a [`Technology`](crate::Technology).
//! Each one lives on a single layer and is identified by a [`ConstraintId`]
//! that markers use as part of their identity.

use serde::{Deserialize, Serialize};

use crate::geometry::Coord;
use crate::layer::{LayerId, LayerKind};

/// Index of a constraint within its technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstraintId(pub usize);

/// The rule family a constraint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    Short,
    MinWidth,
    Spacing,
    SpacingTable,
    SpacingSameNet,
    EndOfLine,
    CornerSpacing,
    MinStep,
    MinArea,
    CutSpacing,
}

/// Parallel-run-length spacing table.
///
/// `spacing[i][j]` applies when the wider shape's width exceeds `widths[i]`
/// and the parallel run length exceeds `prls[j]`. Row and column 0 always
/// apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpacingTable {
    pub widths: Vec<Coord>,
    pub prls: Vec<Coord>,
    pub spacing: Vec<Vec<Coord>>,
}

impl SpacingTable {
    pub fn new(widths: Vec<Coord>, prls: Vec<Coord>, spacing: Vec<Vec<Coord>>) -> Self {
        Self {
            widths,
            prls,
            spacing,
        }
    }

    pub fn lookup(&self, width: Coord, prl: Coord) -> Coord {
        let row = self.widths.iter().rposition(|&w| width > w).unwrap_or(0);
        let col = self.prls.iter().rposition(|&p| prl > p).unwrap_or(0);
        self.spacing
            .get(row)
            .and_then(|r| r.get(col).or(r.last()))
            .copied()
            .unwrap_or(0)
    }

    pub fn min_spacing(&self) -> Coord {
        self.lookup(0, Coord::MIN)
    }

    pub fn max_spacing(&self) -> Coord {
        self.spacing.iter().flatten().copied().max().unwrap_or(0)
    }
}

/// Optional parallel-edge qualifier of an end-of-line rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelEdge {
    pub par_space: Coord,
    pub par_within: Coord,
    /// Both sides must have a parallel neighbor.
    pub two_edges: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EolRule {
    pub eol_width: Coord,
    pub eol_space: Coord,
    pub eol_within: Coord,
    pub parallel_edge: Option<ParallelEdge>,
}

impl EolRule {
    pub fn new(eol_width: Coord, eol_space: Coord, eol_within: Coord) -> Self {
        Self {
            eol_width,
            eol_space,
            eol_within,
            parallel_edge: None,
        }
    }

    pub fn with_parallel_edge(mut self, par_space: Coord, par_within: Coord, two_edges: bool) -> Self {
        self.parallel_edge = Some(ParallelEdge {
            par_space,
            par_within,
            two_edges,
        });
        self
    }
}

/// Convex-corner spacing keyed by the width at the corner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CornerSpacingRule {
    /// Corners of end-of-line edges narrower than this are exempt.
    pub eol_width: Option<Coord>,
    /// `(width, spacing)` pairs in ascending width order.
    pub spacing: Vec<(Coord, Coord)>,
}

impl CornerSpacingRule {
    pub fn spacing_for(&self, width: Coord) -> Coord {
        self.spacing
            .iter()
            .rev()
            .find(|(w, _)| width >= *w)
            .or(self.spacing.first())
            .map(|(_, s)| *s)
            .unwrap_or(0)
    }
}

/// The body of a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rule {
    /// Different-net geometry must not overlap or abut.
    Short,
    MinWidth { width: Coord },
    Spacing { spacing: Coord },
    SpacingTable(SpacingTable),
    /// Spacing between unconnected geometry of one net, notches included.
    SpacingSameNet { spacing: Coord, pg_only: bool },
    EndOfLine(EolRule),
    CornerSpacing(CornerSpacingRule),
    MinStep { min_step_length: Coord, max_edges: usize },
    MinArea { area: i64 },
    /// Cut-to-cut spacing. `same_net` rules apply only to same-net pairs and
    /// take precedence over the general rule there.
    CutSpacing {
        spacing: Coord,
        center_to_center: bool,
        same_net: bool,
    },
}

impl Rule {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Rule::Short => ConstraintKind::Short,
            Rule::MinWidth { .. } => ConstraintKind::MinWidth,
            Rule::Spacing { .. } => ConstraintKind::Spacing,
            Rule::SpacingTable(_) => ConstraintKind::SpacingTable,
            Rule::SpacingSameNet { .. } => ConstraintKind::SpacingSameNet,
            Rule::EndOfLine(_) => ConstraintKind::EndOfLine,
            Rule::CornerSpacing(_) => ConstraintKind::CornerSpacing,
            Rule::MinStep { .. } => ConstraintKind::MinStep,
            Rule::MinArea { .. } => ConstraintKind::MinArea,
            Rule::CutSpacing { .. } => ConstraintKind::CutSpacing,
        }
    }

    /// How far from a shape this rule can find a partner. Self-only rules
    /// report zero.
    pub fn interaction_distance(&self) -> Coord {
        match self {
            Rule::Short | Rule::MinWidth { .. } | Rule::MinStep { .. } | Rule::MinArea { .. } => 0,
            Rule::Spacing { spacing } => *spacing,
            Rule::SpacingTable(table) => table.max_spacing(),
            Rule::SpacingSameNet { spacing, .. } => *spacing,
            Rule::EndOfLine(eol) => {
                let par = eol
                    .parallel_edge
                    .as_ref()
                    .map(|p| p.par_space + p.par_within)
                    .unwrap_or(0);
                eol.eol_space.max(eol.eol_within).max(par)
            }
            Rule::CornerSpacing(corner) => {
                corner.spacing.iter().map(|(_, s)| *s).max().unwrap_or(0)
            }
            Rule::CutSpacing { spacing, .. } => *spacing,
        }
    }

    pub fn applies_to(&self, kind: LayerKind) -> bool {
        match self {
            Rule::Short => true,
            Rule::CutSpacing { .. } => kind == LayerKind::Cut,
            _ => kind == LayerKind::Routing,
        }
    }
}

/// A rule bound to a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: ConstraintId,
    pub layer: LayerId,
    /// Rule label used in reports.
    pub name: String,
    pub rule: Rule,
}

impl Constraint {
    pub fn kind(&self) -> ConstraintKind {
        self.rule.kind()
    }
}
