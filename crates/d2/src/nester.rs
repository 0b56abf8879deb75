//! 2D nesting orchestrator.
//!
//! [`Nester2D`] owns one run: the prepared bin and parts, the GA population, the NFP cache, the
//! best layout so far and a fixed-size worker pool. The caller drives it with [`Nester2D::tick`],
//! one optimization cycle per call, and can stop it from any thread through a [`NestHandle`].

use crate::clipper::{clean_polygon, offset_polygon};
use crate::nfp::{compute_batch, compute_job, Nfp, NfpJob};
use crate::nfp_cache::{required_keys, CacheStats, NfpCache, NfpKey, NfpOperand};
use crate::placement::PlacementEvaluator;
use polynest_core::geometry::{
    polygon_area, polygon_bounds, translate_polygon, with_hole_winding, with_outer_winding,
    Bounds, Point,
};
use polynest_core::solver::{DisplayCallback, NestConfig, ProgressCallback};
use polynest_core::tree::PolygonTree;
use polynest_core::{Error, GaConfig, GeneticAlgorithm, PlacementResult, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Step of the cycle currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CyclePhase {
    /// No cycle in flight.
    Idle = 0,
    /// Picking the next individual to score.
    SelectIndividual = 1,
    /// Computing the NFPs the individual needs.
    ComputeNfpBatch = 2,
    /// Running the placement evaluator.
    EvaluatePlacement = 3,
    /// Writing the fitness back into the population.
    RecordFitness = 4,
    /// Comparing against the best layout and notifying the display callback.
    PublishIfImproved = 5,
}

impl CyclePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CyclePhase::SelectIndividual,
            2 => CyclePhase::ComputeNfpBatch,
            3 => CyclePhase::EvaluatePlacement,
            4 => CyclePhase::RecordFitness,
            5 => CyclePhase::PublishIfImproved,
            _ => CyclePhase::Idle,
        }
    }
}

/// What a call to [`Nester2D::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// An individual was scored and became the new best layout.
    Improved,
    /// An individual was scored without beating the best layout.
    Evaluated,
    /// A cycle was already in flight.
    Skipped,
    /// The nester is stopped; nothing was recorded.
    Stopped,
}

#[derive(Debug, Default)]
struct SharedState {
    running: AtomicBool,
    busy: AtomicBool,
    phase: AtomicU8,
    completed: AtomicUsize,
    total: AtomicUsize,
}

/// Thread-safe view of a running nester.
#[derive(Debug, Clone)]
pub struct NestHandle {
    state: Arc<SharedState>,
}

impl NestHandle {
    /// Stops further cycling. An in-flight NFP batch finishes, but its results are discarded.
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::SeqCst);
    }

    /// Returns true between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Returns true while a cycle is in flight.
    pub fn is_busy(&self) -> bool {
        self.state.busy.load(Ordering::SeqCst)
    }

    /// Completion fraction of the current (or last) NFP batch.
    pub fn progress(&self) -> f64 {
        batch_fraction(&self.state)
    }

    /// Phase of the cycle in flight.
    pub fn phase(&self) -> CyclePhase {
        CyclePhase::from_u8(self.state.phase.load(Ordering::SeqCst))
    }
}

fn batch_fraction(state: &SharedState) -> f64 {
    let total = state.total.load(Ordering::SeqCst);
    if total == 0 {
        return 1.0;
    }
    state.completed.load(Ordering::SeqCst) as f64 / total as f64
}

/// Holds the busy flag for one cycle. Dropping it, on return or unwind, clears the flag and
/// resets the phase to idle.
struct BusyGuard<'a> {
    state: &'a SharedState,
}

impl<'a> BusyGuard<'a> {
    fn acquire(state: &'a SharedState) -> Option<Self> {
        state
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { state })
    }

    fn enter(&self, phase: CyclePhase) {
        self.state.phase.store(phase as u8, Ordering::SeqCst);
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.phase.store(CyclePhase::Idle as u8, Ordering::SeqCst);
        self.state.busy.store(false, Ordering::SeqCst);
    }
}

/// GA-driven 2D nester.
pub struct Nester2D {
    config: NestConfig,
    tree: Arc<PolygonTree>,
    bin: Vec<Point>,
    bin_bounds: Bounds,
    ga: Option<GeneticAlgorithm>,
    nfp_cache: NfpCache,
    best: Option<PlacementResult>,
    pool: rayon::ThreadPool,
    rng: StdRng,
    state: Arc<SharedState>,
    progress_callback: Option<ProgressCallback>,
    display_callback: Option<DisplayCallback>,
    cycles: u64,
}

impl Nester2D {
    /// Prepares a run: validates `config`, cleans and offsets the bin and every part loop.
    ///
    /// The bin is moved so its bounding box starts at the origin. Fails with
    /// [`Error::InvalidBoundary`] when the bin degenerates, and with
    /// [`Error::InvalidGeometry`] when no part survives cleanup.
    pub fn new(config: NestConfig, tree: PolygonTree, bin: Vec<Point>) -> Result<Self> {
        config.validate()?;

        let bin = prepare_bin(&bin, &config)?;
        let bin_bounds = polygon_bounds(&bin)
            .ok_or_else(|| Error::InvalidBoundary("bin has no extent".into()))?;
        let tree = prepare_tree(&tree, &config)?;
        if tree.part_count() == 0 {
            return Err(Error::InvalidGeometry(
                "no part survived cleanup".into(),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("polynest-worker-{}", i))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build worker pool: {}", e)))?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        log::debug!(
            "nester ready: bin {}x{}, {} parts, {} workers",
            bin_bounds.width,
            bin_bounds.height,
            tree.part_count(),
            pool.current_num_threads()
        );

        Ok(Self {
            config,
            tree: Arc::new(tree),
            bin,
            bin_bounds,
            ga: None,
            nfp_cache: NfpCache::new(),
            best: None,
            pool,
            rng,
            state: Arc::new(SharedState::default()),
            progress_callback: None,
            display_callback: None,
            cycles: 0,
        })
    }

    /// Seeds a fresh population and marks the nester running.
    ///
    /// Any previous population, cache content and best layout are dropped.
    pub fn start(
        &mut self,
        progress_callback: Option<ProgressCallback>,
        display_callback: Option<DisplayCallback>,
    ) -> Result<()> {
        let parts = self
            .tree
            .roots()
            .map(|node| (node.id, node.outline.clone()))
            .collect();
        let ga = GeneticAlgorithm::new(
            parts,
            self.bin_bounds,
            GaConfig::from(&self.config),
            &mut self.rng,
        )?;

        self.ga = Some(ga);
        self.nfp_cache.clear();
        self.best = None;
        self.cycles = 0;
        self.progress_callback = progress_callback;
        self.display_callback = display_callback;
        self.state.completed.store(0, Ordering::SeqCst);
        self.state.total.store(0, Ordering::SeqCst);
        self.state.running.store(true, Ordering::SeqCst);
        log::info!("nesting started with {} parts", self.tree.part_count());
        Ok(())
    }

    /// Halts further cycling.
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::SeqCst);
        log::info!("nesting stopped after {} cycles", self.cycles);
    }

    /// Runs one optimization cycle.
    pub fn tick(&mut self) -> Result<CycleOutcome> {
        self.tick_with(compute_job)
    }

    /// [`Nester2D::tick`] with a custom per-job NFP function.
    fn tick_with<F>(&mut self, compute: F) -> Result<CycleOutcome>
    where
        F: Fn(&NfpJob) -> Result<Option<Nfp>> + Send + Sync,
    {
        if self.ga.is_none() {
            return Err(Error::NotStarted);
        }
        if !self.state.running.load(Ordering::SeqCst) {
            return Ok(CycleOutcome::Stopped);
        }
        let state = Arc::clone(&self.state);
        let Some(guard) = BusyGuard::acquire(&state) else {
            return Ok(CycleOutcome::Skipped);
        };
        self.run_cycle(&guard, compute)
    }

    /// Ticks up to `cycles` times, returning early once stopped.
    pub fn run_for(&mut self, cycles: usize) -> Result<Option<&PlacementResult>> {
        for _ in 0..cycles {
            if self.tick()? == CycleOutcome::Stopped {
                break;
            }
        }
        Ok(self.best.as_ref())
    }

    fn run_cycle<F>(&mut self, guard: &BusyGuard<'_>, compute: F) -> Result<CycleOutcome>
    where
        F: Fn(&NfpJob) -> Result<Option<Nfp>> + Send + Sync,
    {
        guard.enter(CyclePhase::SelectIndividual);
        let ga = self.ga.as_mut().ok_or(Error::NotStarted)?;
        let index = match ga.next_unevaluated() {
            Some(index) => index,
            None => {
                ga.generation(&mut self.rng);
                1
            }
        };
        let individual = ga
            .population()
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("no individual at index {}", index)))?;

        guard.enter(CyclePhase::ComputeNfpBatch);
        let keys = required_keys(&individual.placement, &individual.rotation);
        let batch = self.nfp_cache.begin_cycle(&keys);
        let jobs: Vec<NfpJob> = batch
            .pending()
            .iter()
            .filter_map(|key| self.job_for(key))
            .collect();

        let state = Arc::clone(&self.state);
        state.completed.store(0, Ordering::SeqCst);
        state.total.store(jobs.len(), Ordering::SeqCst);
        let computed = self
            .pool
            .install(|| compute_batch(jobs, &state.completed, compute));

        if !state.running.load(Ordering::SeqCst) {
            log::debug!("stopped during NFP batch, discarding {} results", computed.len());
            return Ok(CycleOutcome::Stopped);
        }
        self.nfp_cache.finish_cycle(batch, computed);
        if let Some(callback) = self.progress_callback.as_mut() {
            callback(batch_fraction(&state));
        }

        guard.enter(CyclePhase::EvaluatePlacement);
        let evaluator = PlacementEvaluator::new(&self.tree, &self.bin);
        let cache = &self.nfp_cache;
        let result = self.pool.install(|| {
            evaluator.evaluate(&individual.placement, &individual.rotation, cache)
        });

        guard.enter(CyclePhase::RecordFitness);
        if let Some(ga) = self.ga.as_mut() {
            ga.set_fitness(index, result.fitness);
        }
        self.cycles += 1;
        log::debug!(
            "cycle {}: individual {} fitness {:.4} ({})",
            self.cycles,
            index,
            result.fitness,
            result.placed_ratio()
        );

        guard.enter(CyclePhase::PublishIfImproved);
        let improved = self
            .best
            .as_ref()
            .map_or(true, |best| result.fitness < best.fitness);
        if !improved {
            if let Some(callback) = self.display_callback.as_mut() {
                callback(None, None, None);
            }
            return Ok(CycleOutcome::Evaluated);
        }

        log::info!(
            "new best layout: {} sheets, {} placed, utilization {}",
            result.sheet_count(),
            result.placed_ratio(),
            result.utilization_percent()
        );
        let utilization = result.utilization;
        let ratio = result.placed_ratio();
        self.best = Some(result);
        if let Some(callback) = self.display_callback.as_mut() {
            callback(self.best.as_ref(), Some(utilization), Some(ratio.as_str()));
        }
        Ok(CycleOutcome::Improved)
    }

    fn job_for(&self, key: &NfpKey) -> Option<NfpJob> {
        let Some(b) = self.tree.get(key.b) else {
            log::error!("NFP key {:?} names unknown part {}", key, key.b);
            return None;
        };
        let (a, a_holes) = match key.a {
            NfpOperand::Bin => (self.bin.clone(), Vec::new()),
            NfpOperand::Part(id) => {
                let node = self.tree.get(id)?;
                let holes = if self.config.use_holes {
                    self.tree.holes(id).into_iter().map(<[Point]>::to_vec).collect()
                } else {
                    Vec::new()
                };
                (node.outline.clone(), holes)
            }
        };
        Some(NfpJob {
            key: *key,
            a,
            a_holes,
            b: b.outline.clone(),
            explore_concave: self.config.explore_concave,
            use_holes: self.config.use_holes,
        })
    }

    /// Best layout found so far.
    pub fn best(&self) -> Option<&PlacementResult> {
        self.best.as_ref()
    }

    /// Number of completed GA generations.
    pub fn generation_count(&self) -> u32 {
        self.ga.as_ref().map_or(0, GeneticAlgorithm::generation_count)
    }

    /// Number of scored cycles since `start`.
    pub fn cycle_count(&self) -> u64 {
        self.cycles
    }

    /// A handle usable from other threads.
    pub fn handle(&self) -> NestHandle {
        NestHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Cache counters of the last completed cycle.
    pub fn last_cycle_stats(&self) -> CacheStats {
        self.nfp_cache.last_cycle()
    }

    /// The prepared bin: cleaned, shrunk by half the spacing and moved to the origin.
    pub fn bin(&self) -> &[Point] {
        &self.bin
    }

    /// The prepared parts.
    pub fn tree(&self) -> &PolygonTree {
        &self.tree
    }

    /// Configuration in use.
    pub fn config(&self) -> &NestConfig {
        &self.config
    }
}

fn largest_loop(loops: Vec<Vec<Point>>) -> Option<Vec<Point>> {
    loops
        .into_iter()
        .max_by(|a, b| polygon_area(a).abs().total_cmp(&polygon_area(b).abs()))
}

fn prepare_bin(bin: &[Point], config: &NestConfig) -> Result<Vec<Point>> {
    let cleaned = clean_polygon(bin, config.curve_tolerance, config.clipper_scale).ok_or_else(
        || Error::InvalidBoundary(format!("bin with {} points degenerates on cleanup", bin.len())),
    )?;
    let shrunk = largest_loop(offset_polygon(
        &cleaned,
        -config.spacing / 2.0,
        config.curve_tolerance,
    ))
    .filter(|l| l.len() >= 3)
    .ok_or_else(|| Error::InvalidBoundary("bin vanishes after spacing offset".into()))?;

    let bounds = polygon_bounds(&shrunk)
        .ok_or_else(|| Error::InvalidBoundary("bin has no extent".into()))?;
    Ok(with_outer_winding(translate_polygon(
        &shrunk,
        Point::new(-bounds.x, -bounds.y),
    )))
}

/// Cleans every loop, grows outlines and shrinks holes by half the spacing. Loops that
/// degenerate are dropped with their subtree.
fn prepare_tree(tree: &PolygonTree, config: &NestConfig) -> Result<PolygonTree> {
    let half = config.spacing / 2.0;
    tree.map_outlines(|depth, outline| {
        let cleaned = clean_polygon(outline, config.curve_tolerance, config.clipper_scale)?;
        let is_hole = depth % 2 == 1;
        let delta = if is_hole { -half } else { half };
        let offset = largest_loop(offset_polygon(&cleaned, delta, config.curve_tolerance))?;
        if offset.len() < 3 {
            return None;
        }
        Some(if is_hole {
            with_hole_winding(offset)
        } else {
            with_outer_winding(offset)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use polynest_core::geometry::rectangle;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Mutex;

    fn halves() -> PolygonTree {
        PolygonTree::from_loops(vec![rectangle(5.0, 10.0), rectangle(5.0, 10.0)]).unwrap()
    }

    fn seeded() -> NestConfig {
        NestConfig::new().with_rotations(1).with_seed(7).with_threads(2)
    }

    #[test]
    fn test_degenerate_bin_rejected() {
        let bin = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let err = Nester2D::new(seeded(), halves(), bin).err().unwrap();
        assert!(matches!(err, Error::InvalidBoundary(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = seeded().with_population_size(2);
        let err = Nester2D::new(config, halves(), rectangle(10.0, 10.0))
            .err()
            .unwrap();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_tick_before_start() {
        let mut nester = Nester2D::new(seeded(), halves(), rectangle(10.0, 10.0)).unwrap();
        assert!(matches!(nester.tick(), Err(Error::NotStarted)));
    }

    #[test]
    fn test_bin_moved_to_origin() {
        let bin = translate_polygon(&rectangle(10.0, 10.0), Point::new(50.0, -20.0));
        let nester = Nester2D::new(seeded(), halves(), bin).unwrap();
        let bounds = polygon_bounds(nester.bin()).unwrap();
        assert_relative_eq!(bounds.x, 0.0);
        assert_relative_eq!(bounds.y, 0.0);
        assert!(polygon_area(nester.bin()) < 0.0);
    }

    #[test]
    fn test_spacing_offsets() {
        let config = seeded().with_spacing(2.0);
        let tree = PolygonTree::from_loops(vec![rectangle(2.0, 2.0)]).unwrap();
        let nester = Nester2D::new(config, tree, rectangle(10.0, 10.0)).unwrap();

        assert_relative_eq!(polygon_area(nester.bin()).abs(), 64.0, epsilon = 1e-9);
        let part = nester.tree().roots().next().unwrap();
        assert_relative_eq!(polygon_area(&part.outline).abs(), 16.0, epsilon = 1e-9);
    }

    #[test]
    fn test_first_cycle_publishes_layout() {
        let published: Arc<Mutex<Vec<(bool, Option<String>)>>> = Arc::default();
        let progress: Arc<Mutex<Vec<f64>>> = Arc::default();
        let sink = Arc::clone(&published);
        let progress_sink = Arc::clone(&progress);

        let mut nester = Nester2D::new(seeded(), halves(), rectangle(10.0, 10.0)).unwrap();
        nester
            .start(
                Some(Box::new(move |p: f64| progress_sink.lock().unwrap().push(p))),
                Some(Box::new(
                    move |layout: Option<&PlacementResult>, _: Option<f64>, ratio: Option<&str>| {
                        sink.lock()
                            .unwrap()
                            .push((layout.is_some(), ratio.map(str::to_string)));
                    },
                )),
            )
            .unwrap();

        assert_eq!(nester.tick().unwrap(), CycleOutcome::Improved);
        let best = nester.best().unwrap();
        assert_eq!(best.sheet_count(), 1);
        assert_relative_eq!(best.utilization, 1.0, epsilon = 1e-9);
        assert_eq!(published.lock().unwrap()[0], (true, Some("2/2".to_string())));
        assert_eq!(progress.lock().unwrap().as_slice(), &[1.0]);
        assert_eq!(nester.last_cycle_stats().requested, 3);

        // the optimum is already known, later cycles cannot improve on it
        assert_eq!(nester.tick().unwrap(), CycleOutcome::Evaluated);
        assert_eq!(published.lock().unwrap()[1], (false, None));
    }

    #[test]
    fn test_generation_advances_after_population_scored() {
        let mut nester = Nester2D::new(seeded(), halves(), rectangle(10.0, 10.0)).unwrap();
        nester.start(None, None).unwrap();
        nester.run_for(10).unwrap();
        assert_eq!(nester.generation_count(), 0);
        nester.run_for(1).unwrap();
        assert_eq!(nester.generation_count(), 1);
        assert_eq!(nester.cycle_count(), 11);
    }

    #[test]
    fn test_stop_halts_cycling() {
        let mut nester = Nester2D::new(seeded(), halves(), rectangle(10.0, 10.0)).unwrap();
        nester.start(None, None).unwrap();
        let handle = nester.handle();
        assert!(handle.is_running());

        handle.stop();
        assert!(!handle.is_running());
        assert_eq!(nester.tick().unwrap(), CycleOutcome::Stopped);
        assert!(nester.best().is_none());
    }

    #[test]
    fn test_stop_during_nfp_batch_discards_results() {
        let mut nester = Nester2D::new(seeded(), halves(), rectangle(10.0, 10.0)).unwrap();
        let progress: Arc<Mutex<Vec<f64>>> = Arc::default();
        let progress_sink = Arc::clone(&progress);
        nester
            .start(
                Some(Box::new(move |p: f64| progress_sink.lock().unwrap().push(p))),
                None,
            )
            .unwrap();
        let handle = nester.handle();
        let seen = Mutex::new(Vec::new());

        let outcome = nester
            .tick_with(|job| {
                seen.lock().unwrap().push(handle.phase());
                handle.stop();
                compute_job(job)
            })
            .unwrap();

        assert_eq!(outcome, CycleOutcome::Stopped);
        let seen = seen.into_inner().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|&phase| phase == CyclePhase::ComputeNfpBatch));
        assert_eq!(nester.cycle_count(), 0);
        assert!(nester.best().is_none());
        assert!(nester.nfp_cache.is_empty());
        assert_eq!(nester.last_cycle_stats(), CacheStats::default());
        assert!(progress.lock().unwrap().is_empty());
        assert!(!handle.is_busy());
        assert_eq!(handle.phase(), CyclePhase::Idle);
        assert_eq!(nester.tick().unwrap(), CycleOutcome::Stopped);
    }

    #[test]
    fn test_busy_flag_cleared_after_panic() {
        let mut nester = Nester2D::new(seeded(), halves(), rectangle(10.0, 10.0)).unwrap();
        nester
            .start(
                None,
                Some(Box::new(
                    |_: Option<&PlacementResult>, _: Option<f64>, _: Option<&str>| {
                        panic!("display failed")
                    },
                )),
            )
            .unwrap();
        let handle = nester.handle();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| nester.tick()));
        assert!(outcome.is_err());
        assert!(!handle.is_busy());
        assert_eq!(handle.phase(), CyclePhase::Idle);
    }

    #[test]
    fn test_busy_guard_is_exclusive() {
        let state = SharedState::default();
        let guard = BusyGuard::acquire(&state).unwrap();
        guard.enter(CyclePhase::EvaluatePlacement);
        assert!(BusyGuard::acquire(&state).is_none());
        assert_eq!(
            CyclePhase::from_u8(state.phase.load(Ordering::SeqCst)),
            CyclePhase::EvaluatePlacement
        );
        drop(guard);
        assert!(!state.busy.load(Ordering::SeqCst));
        assert!(BusyGuard::acquire(&state).is_some());
    }
}
