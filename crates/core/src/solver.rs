//! Nesting configuration and callback types.

use crate::result::PlacementResult;
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Progress callback: fraction of the current NFP batch that has completed (0.0 to 1.0).
pub type ProgressCallback = Box<dyn FnMut(f64) + Send>;

/// Display callback: `(layout, utilization, "placed/total")` on improvement, all `None` otherwise.
pub type DisplayCallback = Box<dyn FnMut(Option<&PlacementResult>, Option<f64>, Option<&str>) + Send>;

/// Configuration for a nesting run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NestConfig {
    /// Integer grid scale used when snapping coordinates for clipping.
    pub clipper_scale: u64,

    /// Maximum deviation tolerated when simplifying loops.
    pub curve_tolerance: f64,

    /// Minimum gap between parts and between parts and the bin edge.
    pub spacing: f64,

    /// Number of evenly spaced rotations tried per part (1 = no rotation).
    pub rotations: u32,

    /// Number of individuals in the GA population.
    pub population_size: usize,

    /// Per-gene mutation probability in percent (0 - 100).
    pub mutation_rate: u32,

    /// Place parts inside the holes of other parts.
    pub use_holes: bool,

    /// Keep concave pockets and secondary regions of NFPs.
    pub explore_concave: bool,

    /// Number of worker threads (0 = auto).
    pub threads: usize,

    /// Random seed for reproducible runs (None = entropy).
    pub seed: Option<u64>,
}

impl Default for NestConfig {
    fn default() -> Self {
        Self {
            clipper_scale: 10_000_000,
            curve_tolerance: 0.3,
            spacing: 0.0,
            rotations: 4,
            population_size: 10,
            mutation_rate: 10,
            use_holes: false,
            explore_concave: false,
            threads: 0,
            seed: None,
        }
    }
}

impl NestConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clipping grid scale.
    pub fn with_clipper_scale(mut self, scale: u64) -> Self {
        self.clipper_scale = scale;
        self
    }

    /// Sets the curve tolerance.
    pub fn with_curve_tolerance(mut self, tolerance: f64) -> Self {
        self.curve_tolerance = tolerance;
        self
    }

    /// Sets the spacing between parts.
    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing;
        self
    }

    /// Sets the number of rotations.
    pub fn with_rotations(mut self, rotations: u32) -> Self {
        self.rotations = rotations;
        self
    }

    /// Sets the population size.
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    /// Sets the mutation rate in percent.
    pub fn with_mutation_rate(mut self, rate: u32) -> Self {
        self.mutation_rate = rate;
        self
    }

    /// Enables placing parts inside holes.
    pub fn with_use_holes(mut self, enabled: bool) -> Self {
        self.use_holes = enabled;
        self
    }

    /// Enables concave exploration.
    pub fn with_explore_concave(mut self, enabled: bool) -> Self {
        self.explore_concave = enabled;
        self
    }

    /// Sets the worker thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Checks every field against its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.clipper_scale == 0 {
            return Err(Error::ConfigError(format!(
                "clipper_scale must be positive, got {}",
                self.clipper_scale
            )));
        }
        if !(self.curve_tolerance.is_finite() && self.curve_tolerance > 0.0) {
            return Err(Error::ConfigError(format!(
                "curve_tolerance must be positive, got {}",
                self.curve_tolerance
            )));
        }
        if !(self.spacing.is_finite() && self.spacing >= 0.0) {
            return Err(Error::ConfigError(format!(
                "spacing must be non-negative, got {}",
                self.spacing
            )));
        }
        if self.rotations < 1 {
            return Err(Error::ConfigError("rotations must be at least 1".into()));
        }
        if self.population_size <= 2 {
            return Err(Error::ConfigError(format!(
                "population_size must be greater than 2, got {}",
                self.population_size
            )));
        }
        if self.mutation_rate > 100 {
            return Err(Error::ConfigError(format!(
                "mutation_rate must be within 0..=100, got {}",
                self.mutation_rate
            )));
        }
        Ok(())
    }

    /// Applies the set fields of `options`, silently keeping the current value for any field
    /// whose new value is out of range.
    pub fn merge_options(&mut self, options: &NestOptions) {
        if let Some(scale) = options.clipper_scale {
            if scale > 0 {
                self.clipper_scale = scale;
            }
        }
        if let Some(tolerance) = options.curve_tolerance {
            if tolerance.is_finite() && tolerance > 1e-9 {
                self.curve_tolerance = tolerance;
            }
        }
        if let Some(spacing) = options.spacing {
            if spacing.is_finite() && spacing >= 0.0 {
                self.spacing = spacing;
            }
        }
        if let Some(rotations) = options.rotations {
            if rotations > 0 {
                self.rotations = rotations;
            }
        }
        if let Some(size) = options.population_size {
            if size > 2 {
                self.population_size = size;
            }
        }
        if let Some(rate) = options.mutation_rate {
            if (1..=100).contains(&rate) {
                self.mutation_rate = rate;
            }
        }
        if let Some(enabled) = options.use_holes {
            self.use_holes = enabled;
        }
        if let Some(enabled) = options.explore_concave {
            self.explore_concave = enabled;
        }
        if let Some(threads) = options.threads {
            self.threads = threads;
        }
        if let Some(seed) = options.seed {
            self.seed = Some(seed);
        }
    }
}

/// Partial configuration update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NestOptions {
    pub clipper_scale: Option<u64>,
    pub curve_tolerance: Option<f64>,
    pub spacing: Option<f64>,
    pub rotations: Option<u32>,
    pub population_size: Option<usize>,
    pub mutation_rate: Option<u32>,
    pub use_holes: Option<bool>,
    pub explore_concave: Option<bool>,
    pub threads: Option<usize>,
    pub seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NestConfig::default();
        assert_eq!(config.clipper_scale, 10_000_000);
        assert_eq!(config.curve_tolerance, 0.3);
        assert_eq!(config.spacing, 0.0);
        assert_eq!(config.rotations, 4);
        assert_eq!(config.population_size, 10);
        assert_eq!(config.mutation_rate, 10);
        assert!(!config.use_holes);
        assert!(!config.explore_concave);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = NestConfig::new()
            .with_spacing(2.0)
            .with_rotations(8)
            .with_population_size(20)
            .with_seed(42);
        assert_eq!(config.spacing, 2.0);
        assert_eq!(config.rotations, 8);
        assert_eq!(config.population_size, 20);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(NestConfig::new().with_rotations(0).validate().is_err());
        assert!(NestConfig::new().with_population_size(2).validate().is_err());
        assert!(NestConfig::new().with_mutation_rate(101).validate().is_err());
        assert!(NestConfig::new().with_spacing(-1.0).validate().is_err());
        assert!(NestConfig::new().with_clipper_scale(0).validate().is_err());
        assert!(NestConfig::new()
            .with_curve_tolerance(0.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_merge_options_keeps_previous_on_invalid() {
        let mut config = NestConfig::new();
        config.merge_options(&NestOptions {
            rotations: Some(0),
            population_size: Some(2),
            mutation_rate: Some(0),
            clipper_scale: Some(0),
            curve_tolerance: Some(0.0),
            spacing: Some(1.5),
            use_holes: Some(true),
            ..Default::default()
        });
        assert_eq!(config.rotations, 4);
        assert_eq!(config.population_size, 10);
        assert_eq!(config.mutation_rate, 10);
        assert_eq!(config.curve_tolerance, 0.3);
        assert_eq!(config.clipper_scale, 10_000_000);
        assert_eq!(config.spacing, 1.5);
        assert!(config.use_holes);
    }
}
