//! # PolyNest 2D
//!
//! NFP-driven irregular nesting for the PolyNest engine.
//!
//! This crate turns the core types of `polynest-core` into a working nester: a no-fit-polygon
//! engine backed by `i_overlay`, a per-cycle NFP cache, a sheet-based bottom-left-fill placement
//! evaluator, and the [`Nester2D`] orchestrator that ties them to the genetic algorithm.
//!
//! ## Features
//!
//! - Inside and outside NFPs for arbitrary simple polygons, with a closed form for rectangular
//!   bins and an edge merge for convex pairs
//! - Parts with holes; optional placement into the holes of other parts
//! - Parallel NFP batches on a fixed-size rayon pool, one panic-isolated job per pair
//! - Multi-sheet layouts scored by unplaced parts, sheet count and utilization
//!
//! ## Quick Start
//!
//! ```rust
//! use polynest_d2::geometry::rectangle;
//! use polynest_d2::{NestConfig, Nester2D, PolygonTree};
//!
//! let parts = PolygonTree::from_loops(vec![rectangle(40.0, 20.0), rectangle(30.0, 30.0)]).unwrap();
//! let config = NestConfig::new().with_rotations(4).with_seed(1);
//!
//! let mut nester = Nester2D::new(config, parts, rectangle(100.0, 50.0)).unwrap();
//! nester.start(None, None).unwrap();
//!
//! let best = nester.run_for(5).unwrap().unwrap();
//! assert!(best.all_placed());
//! println!("{} sheets, utilization {}", best.sheet_count(), best.utilization_percent());
//! ```

pub mod clipper;
pub mod nester;
pub mod nfp;
pub mod nfp_cache;
pub mod placement;

// Re-exports
pub use nester::{CycleOutcome, CyclePhase, NestHandle, Nester2D};
pub use nfp::{Nfp, NfpJob};
pub use nfp_cache::{CacheStats, NfpCache, NfpKey, NfpOperand, BIN_ID};
pub use placement::{NfpLookup, PlacementEvaluator};
pub use polynest_core::{
    geometry, Bounds, DisplayCallback, Error, Layout, LayoutSummary, NestConfig, NestOptions,
    PartId, PlacedPart, PlacementResult, Point, PolygonTree, ProgressCallback, Result,
};
