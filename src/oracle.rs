//! Feasibility Oracle
//!
//! Labels batches of samples feasible or infeasible. A mapping is feasible
//! when its execution time stays within the configured threshold. Results are
//! memoized per canonical mapping key for the lifetime of the oracle, and the
//! uncached part of a batch can be evaluated on a worker pool.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, error};
use parking_lot::RwLock;
use rayon::prelude::*;

use crate::config::OracleConfig;
use crate::error::{DseError, DseResult};
use crate::kpn::Application;
use crate::mapping::{Mapping, MappingKey};
use crate::platform::Platform;
use crate::sample::{Sample, SimResult};
use crate::simulation::Simulator;
use crate::trace::TraceGenerator;

/// Execution time reported for points outside a fixed test region
pub const INFEASIBLE_TIME_PS: u64 = u64::MAX;

/// Closed axis-aligned box
#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub lo: Vec<f64>,
    pub hi: Vec<f64>,
}

impl Rect {
    pub fn new(lo: Vec<f64>, hi: Vec<f64>) -> Self {
        Rect { lo, hi }
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.lo.len()
            && point.iter()
                .zip(self.lo.iter().zip(&self.hi))
                .all(|(v, (lo, hi))| *lo <= *v && *v <= *hi)
    }
}

/// Known feasible region: union of `include` minus union of `exclude`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TestRegion {
    pub include: Vec<Rect>,
    pub exclude: Vec<Rect>,
}

impl TestRegion {
    pub fn new(include: Vec<Rect>, exclude: Vec<Rect>) -> Self {
        TestRegion { include, exclude }
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        self.include.iter().any(|r| r.contains(point))
            && !self.exclude.iter().any(|r| r.contains(point))
    }
}

/// Everything a simulation-backed oracle needs besides the mapping
pub struct SimulationBackend {
    pub app: Arc<Application>,
    pub platform: Arc<Platform>,
    /// Template trace; every simulation gets its own reset clone
    pub trace: Box<dyn TraceGenerator>,
    pub simulator: Arc<dyn Simulator>,
}

/// Source of execution times
pub enum FeasibilityBackend {
    /// Closed-form region test over the process placement; no simulation
    FixedTest(TestRegion),
    /// Execution time from a simulator
    Simulation(SimulationBackend),
}

impl FeasibilityBackend {
    fn evaluate(&self, mapping: &Mapping) -> DseResult<u64> {
        match self {
            FeasibilityBackend::FixedTest(region) => {
                let point: Vec<f64> = mapping.process_to_pe.iter().map(|&pe| pe as f64).collect();
                Ok(if region.contains(&point) { 0 } else { INFEASIBLE_TIME_PS })
            }
            FeasibilityBackend::Simulation(backend) => {
                let mut trace = backend.trace.box_clone();
                trace.reset();
                backend.simulator.simulate(&backend.app, &backend.platform, mapping, trace.as_mut())
            }
        }
    }
}

/// Memoizing feasibility oracle
pub struct Oracle {
    backend: FeasibilityBackend,
    threshold_ps: u64,
    /// Canonical key -> execution time; append-only
    cache: RwLock<HashMap<MappingKey, u64>>,
    pool: Option<rayon::ThreadPool>,
    simulations: AtomicUsize,
}

impl Oracle {
    pub fn new(backend: FeasibilityBackend, config: &OracleConfig) -> DseResult<Self> {
        let threshold_ps = config.threshold_ps()?;
        let pool = if config.parallel {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.jobs)
                .thread_name(|i| format!("oracle-{}", i))
                .build()
                .map_err(|e| DseError::config(format!("cannot start oracle workers: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        Ok(Oracle {
            backend,
            threshold_ps,
            cache: RwLock::new(HashMap::new()),
            pool,
            simulations: AtomicUsize::new(0),
        })
    }

    pub fn threshold_ps(&self) -> u64 {
        self.threshold_ps
    }

    /// Number of backend evaluations so far
    pub fn simulation_count(&self) -> usize {
        self.simulations.load(Ordering::SeqCst)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn cached(&self, key: &MappingKey) -> Option<u64> {
        self.cache.read().get(key).copied()
    }

    /// Record a known result, e.g. from an earlier run
    pub fn seed_cache(&self, key: MappingKey, exec_time_ps: u64) {
        self.cache.write().insert(key, exec_time_ps);
    }

    /// Attach cached results without simulating
    pub fn prepare(&self, samples: &mut [Sample]) {
        let cache = self.cache.read();
        for sample in samples.iter_mut() {
            if let Some(&exec_time_ps) = cache.get(&sample.key()) {
                sample.set_sim_result(Some(SimResult { exec_time_ps }));
            }
        }
    }

    /// Label every sample of the batch, simulating only uncached mappings
    ///
    /// Samples keep their positions. A sample whose simulation fails is logged
    /// and left infeasible without a result; structural errors abort the batch.
    pub fn validate_set(&self, samples: &mut [Sample]) -> DseResult<()> {
        self.prepare(samples);

        let mut seen = HashSet::new();
        let todo: Vec<(MappingKey, Mapping)> = samples.iter()
            .filter(|s| s.sim_result().is_none())
            .filter_map(|s| {
                let key = s.key();
                seen.insert(key.clone()).then(|| (key, s.mapping().clone()))
            })
            .collect();

        let results: Vec<DseResult<u64>> = match &self.pool {
            Some(pool) if todo.len() > 1 => pool.install(|| {
                todo.par_iter()
                    .map(|(_, mapping)| self.evaluate(mapping))
                    .collect()
            }),
            _ => todo.iter().map(|(_, mapping)| self.evaluate(mapping)).collect(),
        };
        debug!("validated batch of {} ({} simulated)", samples.len(), todo.len());

        let mut fresh = HashMap::with_capacity(todo.len());
        for ((key, mapping), result) in todo.into_iter().zip(results) {
            match result {
                Ok(exec_time_ps) => {
                    fresh.insert(key, exec_time_ps);
                }
                Err(err @ DseError::Structural { .. }) => return Err(err),
                Err(err) => {
                    error!("simulation of mapping {} failed: {}", mapping, err);
                }
            }
        }
        self.cache.write().extend(fresh.iter().map(|(k, v)| (k.clone(), *v)));

        for sample in samples.iter_mut() {
            if sample.sim_result().is_none() {
                if let Some(&exec_time_ps) = fresh.get(&sample.key()) {
                    sample.set_sim_result(Some(SimResult { exec_time_ps }));
                }
            }
            let feasible = sample.exec_time_ps()
                .map(|t| t <= self.threshold_ps)
                .unwrap_or(false);
            sample.set_feasible(feasible);
        }
        Ok(())
    }

    /// Validate a single sample
    pub fn validate(&self, sample: &mut Sample) -> DseResult<()> {
        self.validate_set(std::slice::from_mut(sample))
    }

    fn evaluate(&self, mapping: &Mapping) -> DseResult<u64> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        self.backend.evaluate(mapping)
    }
}
