//! Layout representation and fitness scoring.

use crate::geometry::{rotate_polygon, translate_polygon, Point};
use crate::tree::{PartId, SourceRef};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One part placed on a sheet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlacedPart {
    /// Id of the placed part.
    pub part_id: PartId,
    /// Caller-side reference of the part.
    pub source: SourceRef,
    /// Translation of the part's local origin.
    pub x: f64,
    /// Translation of the part's local origin.
    pub y: f64,
    /// Rotation in degrees, applied before translation.
    pub rotation: f64,
}

impl PlacedPart {
    /// Applies this placement to a loop given in the part's local frame.
    pub fn transformed_outline(&self, outline: &[Point]) -> Vec<Point> {
        translate_polygon(
            &rotate_polygon(outline, self.rotation),
            Point::new(self.x, self.y),
        )
    }
}

/// A complete multi-sheet layout with its score.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlacementResult {
    /// Parts per sheet, in placement order.
    pub sheets: Vec<Vec<PlacedPart>>,
    /// Fitness (lower is better).
    pub fitness: f64,
    /// Utilization ratio (0.0 - 1.0).
    pub utilization: f64,
    /// Number of placed parts.
    pub placed: usize,
    /// Number of parts in the run.
    pub total: usize,
    /// Ids of parts that could not be placed.
    pub unplaced: Vec<PartId>,
}

/// The layout handed to display callbacks.
pub type Layout = PlacementResult;

impl PlacementResult {
    /// Number of sheets used.
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Returns true if every part was placed.
    pub fn all_placed(&self) -> bool {
        self.unplaced.is_empty()
    }

    /// Iterates over all placed parts with their sheet index.
    pub fn placements(&self) -> impl Iterator<Item = (usize, &PlacedPart)> + '_ {
        self.sheets
            .iter()
            .enumerate()
            .flat_map(|(sheet, parts)| parts.iter().map(move |p| (sheet, p)))
    }

    /// Progress label in the form `"placed/total"`.
    pub fn placed_ratio(&self) -> String {
        format!("{}/{}", self.placed, self.total)
    }

    /// Returns utilization as a percentage string.
    pub fn utilization_percent(&self) -> String {
        format!("{:.1}%", self.utilization * 100.0)
    }
}

/// Layout score: `2·unplaced + sheets + (1 − utilization)/2`.
///
/// Each unplaced part outweighs any sheet, each sheet outweighs any utilization difference.
pub fn layout_fitness(unplaced: usize, sheets: usize, utilization: f64) -> f64 {
    2.0 * unplaced as f64 + sheets as f64 + (1.0 - utilization.clamp(0.0, 1.0)) / 2.0
}

/// Summary statistics for a layout.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayoutSummary {
    /// Total parts requested.
    pub total_requested: usize,
    /// Total parts placed.
    pub total_placed: usize,
    /// Utilization percentage.
    pub utilization_percent: f64,
    /// Number of sheets used.
    pub sheets_used: usize,
    /// Fitness of the layout.
    pub fitness: f64,
}

impl From<&PlacementResult> for LayoutSummary {
    fn from(result: &PlacementResult) -> Self {
        Self {
            total_requested: result.total,
            total_placed: result.placed,
            utilization_percent: result.utilization * 100.0,
            sheets_used: result.sheet_count(),
            fitness: result.fitness,
        }
    }
}
