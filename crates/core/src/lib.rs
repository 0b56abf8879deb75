//! # PolyNest Core
//!
//! Core types and algorithms for the PolyNest irregular nesting engine.
//!
//! This crate holds everything that does not depend on polygon clipping: the geometry
//! contract, the polygon tree the caller hands in, the nesting configuration, the genetic
//! algorithm and the layout/result types. The NFP engine and the orchestrator live in
//! `polynest-d2`.
//!
//! ## Core Components
//!
//! - **Geometry**: [`Point`], [`Bounds`], [`geometry::polygon_area`],
//!   [`geometry::point_in_polygon`] and friends
//! - **Polygon tree**: [`PolygonTree`], an arena of parts and their holes
//! - **GA**: [`GeneticAlgorithm`], [`Individual`]
//! - **Results**: [`PlacementResult`], [`PlacedPart`], [`result::layout_fitness`]
//!
//! ## Configuration
//!
//! Use [`NestConfig`] to configure a run:
//!
//! ```rust
//! use polynest_core::NestConfig;
//!
//! let config = NestConfig::new()
//!     .with_spacing(2.0)
//!     .with_rotations(8)
//!     .with_population_size(20);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization support

pub mod error;
pub mod ga;
pub mod geometry;
pub mod result;
pub mod solver;
pub mod tree;

// Re-exports
pub use error::{Error, Result};
pub use ga::{GaConfig, GeneticAlgorithm, Individual};
pub use geometry::{Bounds, Containment, Point};
pub use result::{Layout, LayoutSummary, PlacedPart, PlacementResult};
pub use solver::{DisplayCallback, NestConfig, NestOptions, ProgressCallback};
pub use tree::{PartId, PartNode, PolygonTree, SourceRef};
