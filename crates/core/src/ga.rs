//! Genetic algorithm over part orderings and rotations.
//!
//! The population is evolved one generation at a time by the orchestrator: individuals are
//! scored externally through [`GeneticAlgorithm::set_fitness`], and [`GeneticAlgorithm::generation`]
//! is only called once every individual carries a fitness.
//!
//! Every operator takes the random source explicitly, so a seeded `StdRng` reproduces a run.

use crate::geometry::{polygon_area, polygon_bounds, rotate_polygon, Bounds, Point};
use crate::solver::NestConfig;
use crate::tree::PartId;
use crate::{Error, Result};
use rand::prelude::*;
use std::collections::{HashMap, HashSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// GA parameters derived from [`NestConfig`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GaConfig {
    /// Population size.
    pub population_size: usize,
    /// Per-gene mutation probability in percent.
    pub mutation_rate: u32,
    /// Number of evenly spaced rotations.
    pub rotations: u32,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self::from(&NestConfig::default())
    }
}

impl From<&NestConfig> for GaConfig {
    fn from(config: &NestConfig) -> Self {
        Self {
            population_size: config.population_size,
            mutation_rate: config.mutation_rate,
            rotations: config.rotations,
        }
    }
}

impl GaConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the population size.
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    /// Sets the mutation rate in percent.
    pub fn with_mutation_rate(mut self, rate: u32) -> Self {
        self.mutation_rate = rate.min(100);
        self
    }

    /// Sets the number of rotations.
    pub fn with_rotations(mut self, rotations: u32) -> Self {
        self.rotations = rotations;
        self
    }
}

/// A candidate solution: placement order plus one rotation per position.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Individual {
    /// Part ids in placement order.
    pub placement: Vec<PartId>,
    /// Rotation in degrees for the part at the same position.
    pub rotation: Vec<f64>,
    /// Fitness once scored (lower is better).
    pub fitness: Option<f64>,
}

impl Individual {
    /// Number of genes.
    pub fn len(&self) -> usize {
        self.placement.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.placement.is_empty()
    }

    fn sort_key(&self) -> f64 {
        self.fitness.unwrap_or(f64::INFINITY)
    }
}

/// Population owner and evolution operators.
#[derive(Debug, Clone)]
pub struct GeneticAlgorithm {
    config: GaConfig,
    outlines: HashMap<PartId, Vec<Point>>,
    bin_bounds: Bounds,
    population: Vec<Individual>,
    generation: u32,
}

impl GeneticAlgorithm {
    /// Seeds a population from `parts`.
    ///
    /// The seed individual orders parts by decreasing absolute area; the remaining slots are
    /// filled with mutations of it.
    pub fn new<R: Rng>(
        parts: Vec<(PartId, Vec<Point>)>,
        bin_bounds: Bounds,
        config: GaConfig,
        rng: &mut R,
    ) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::InvalidGeometry("no parts to nest".into()));
        }
        if config.population_size == 0 {
            return Err(Error::ConfigError("population_size must be positive".into()));
        }

        let mut order: Vec<(PartId, f64)> = parts
            .iter()
            .map(|(id, outline)| (*id, polygon_area(outline).abs()))
            .collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut ga = Self {
            config,
            outlines: parts.into_iter().collect(),
            bin_bounds,
            population: Vec::new(),
            generation: 0,
        };

        let placement: Vec<PartId> = order.into_iter().map(|(id, _)| id).collect();
        let rotation = placement
            .iter()
            .map(|&id| ga.random_angle(id, rng))
            .collect();
        let adam = Individual {
            placement,
            rotation,
            fitness: None,
        };

        let mut population = vec![adam.clone()];
        while population.len() < ga.config.population_size {
            population.push(ga.mutate(&adam, rng));
        }
        ga.population = population;

        log::debug!(
            "GA seeded with {} individuals over {} parts",
            ga.population.len(),
            ga.outlines.len()
        );
        Ok(ga)
    }

    /// Picks a rotation for `id` from the evenly spaced candidates, in random order, whose
    /// rotated bounding box fits strictly inside the bin's. Falls back to 0.
    pub fn random_angle<R: Rng>(&self, id: PartId, rng: &mut R) -> f64 {
        let count = self.config.rotations.max(1);
        let step = 360.0 / count as f64;
        let mut angles: Vec<f64> = (0..count).map(|i| i as f64 * step).collect();
        angles.shuffle(rng);

        let Some(outline) = self.outlines.get(&id) else {
            return 0.0;
        };
        for angle in angles {
            let fits = polygon_bounds(&rotate_polygon(outline, angle)).is_some_and(|bb| {
                bb.width < self.bin_bounds.width && bb.height < self.bin_bounds.height
            });
            if fits {
                return angle;
            }
        }
        0.0
    }

    /// Returns a mutated copy without fitness.
    ///
    /// Each position independently swaps with its successor and independently draws a new
    /// rotation, both with probability `mutation_rate / 100`. Swaps move ids only; the rotation
    /// vector stays positional.
    pub fn mutate<R: Rng>(&self, individual: &Individual, rng: &mut R) -> Individual {
        let mut clone = Individual {
            placement: individual.placement.clone(),
            rotation: individual.rotation.clone(),
            fitness: None,
        };
        let rate = 0.01 * self.config.mutation_rate as f64;
        let n = clone.placement.len();

        for i in 0..n {
            if rng.gen::<f64>() < rate {
                let j = i + 1;
                if j < n {
                    clone.placement.swap(i, j);
                }
            }
            if rng.gen::<f64>() < rate {
                clone.rotation[i] = self.random_angle(clone.placement[i], rng);
            }
        }
        clone
    }

    /// Single-point crossover producing two children.
    pub fn mate<R: Rng>(
        &self,
        male: &Individual,
        female: &Individual,
        rng: &mut R,
    ) -> (Individual, Individual) {
        let n = male.placement.len();
        let cut = (rng.gen::<f64>().clamp(0.1, 0.9) * n.saturating_sub(1) as f64).round() as usize;
        (
            Self::splice(male, female, cut),
            Self::splice(female, male, cut),
        )
    }

    fn splice(head: &Individual, tail: &Individual, cut: usize) -> Individual {
        let cut = cut.min(head.placement.len());
        let mut placement: Vec<PartId> = head.placement[..cut].to_vec();
        let mut rotation: Vec<f64> = head.rotation[..cut].to_vec();
        let taken: HashSet<PartId> = placement.iter().copied().collect();

        for (id, angle) in tail.placement.iter().zip(&tail.rotation) {
            if !taken.contains(id) {
                placement.push(*id);
                rotation.push(*angle);
            }
        }
        Individual {
            placement,
            rotation,
            fitness: None,
        }
    }

    /// Replaces the population with the next generation.
    ///
    /// The best individual survives unchanged; the rest are mutated children of weighted
    /// parent picks.
    pub fn generation<R: Rng>(&mut self, rng: &mut R) {
        self.population
            .sort_by(|a, b| a.sort_key().total_cmp(&b.sort_key()));

        let size = self.population.len();
        let mut next = Vec::with_capacity(size);
        if let Some(elite) = self.population.first() {
            next.push(elite.clone());
        }

        while next.len() < size {
            let male = self.random_weighted_individual(None, rng);
            let female = self.random_weighted_individual(Some(male), rng);
            let (child1, child2) = self.mate(
                &self.population[male],
                &self.population[female],
                rng,
            );
            next.push(self.mutate(&child1, rng));
            if next.len() < size {
                next.push(self.mutate(&child2, rng));
            }
        }

        self.population = next;
        self.generation += 1;
        log::debug!(
            "GA generation {} (elite fitness {:?})",
            self.generation,
            self.population.first().and_then(|i| i.fitness)
        );
    }

    /// Picks a population index, biased towards the front of the (sorted) population.
    ///
    /// Returns 0 if the population is empty or `exclude` is its only member.
    pub fn random_weighted_individual<R: Rng>(&self, exclude: Option<usize>, rng: &mut R) -> usize {
        let candidates: Vec<usize> = (0..self.population.len())
            .filter(|&i| Some(i) != exclude)
            .collect();
        let Some(&first) = candidates.first() else {
            return 0;
        };

        let n = candidates.len() as f64;
        let r: f64 = rng.gen();
        let weight = 1.0 / n;
        let mut lower = 0.0;
        let mut upper = weight;

        for (i, &idx) in candidates.iter().enumerate() {
            if r > lower && r < upper {
                return idx;
            }
            lower = upper;
            upper += 2.0 * weight * ((n - i as f64) / n);
        }
        first
    }

    /// Index of the first individual without fitness.
    pub fn next_unevaluated(&self) -> Option<usize> {
        self.population.iter().position(|i| i.fitness.is_none())
    }

    /// Records the fitness of the individual at `index`.
    pub fn set_fitness(&mut self, index: usize, fitness: f64) {
        if let Some(individual) = self.population.get_mut(index) {
            individual.fitness = Some(fitness);
        }
    }

    /// The current population.
    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    /// Best scored individual.
    pub fn best(&self) -> Option<&Individual> {
        self.population
            .iter()
            .filter(|i| i.fitness.is_some())
            .min_by(|a, b| a.sort_key().total_cmp(&b.sort_key()))
    }

    /// Number of completed generations.
    pub fn generation_count(&self) -> u32 {
        self.generation
    }

    /// Parameters in use.
    pub fn config(&self) -> &GaConfig {
        &self.config
    }
}
