//! Perturbation stability analysis
//!
//! Post-hoc robustness check for a mapping: move single processes to other
//! processors and count how many of the perturbed mappings stay feasible.
//! The score is only meaningful relative to the scores of random reference
//! mappings, which [`PerturbationManager::compare`] computes alongside.

use std::collections::HashSet;
use std::sync::Arc;

use log::{info, warn};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::PerturbationConfig;
use crate::error::DseResult;
use crate::kpn::Application;
use crate::mapping::{CommunicationMapper, Mapping, RandomPartialMapper};
use crate::oracle::Oracle;
use crate::platform::Platform;
use crate::representation::{DcRng, Representation};
use crate::sample::Sample;

/// One perturbed mapping and its verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerturbationStep {
    pub mapping: Mapping,
    /// Execution time in picoseconds, `None` if the simulation failed
    pub runtime: Option<u64>,
    pub feasible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerturbationOutcome {
    /// Percentage of feasible perturbations
    pub score_percent: f64,
    pub steps: Vec<PerturbationStep>,
}

/// Center score against random reference mappings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessComparison {
    pub center: PerturbationOutcome,
    pub reference_scores: Vec<f64>,
    /// Fraction of references the center beats or ties
    pub beaten_fraction: f64,
}

impl RobustnessComparison {
    pub fn mean_reference_score(&self) -> f64 {
        if self.reference_scores.is_empty() {
            return 0.0;
        }
        self.reference_scores.iter().sum::<f64>() / self.reference_scores.len() as f64
    }

    /// Generate comparison report
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("╔══════════════════════════════════════════════╗\n");
        report.push_str("║          PERTURBATION ROBUSTNESS             ║\n");
        report.push_str("╠══════════════════════════════════════════════╣\n");
        report.push_str(&format!("║ Center score:          {:>8.1}%             ║\n", self.center.score_percent));
        report.push_str(&format!("║ Reference mappings:    {:>8}              ║\n", self.reference_scores.len()));
        report.push_str(&format!("║ Mean reference score:  {:>8.1}%             ║\n", self.mean_reference_score()));
        report.push_str(&format!("║ References beaten:     {:>8.1}%             ║\n", self.beaten_fraction * 100.0));
        report.push_str("╚══════════════════════════════════════════════╝\n");

        report
    }
}

/// Runs perturbation experiments against a shared oracle
pub struct PerturbationManager {
    app: Arc<Application>,
    platform: Arc<Platform>,
    representation: Arc<dyn Representation>,
    oracle: Arc<Oracle>,
    num_mappings: usize,
    num_perturbations: usize,
    max_retries: usize,
    rng: DcRng,
}

impl PerturbationManager {
    pub fn new(
        config: &PerturbationConfig,
        app: Arc<Application>,
        platform: Arc<Platform>,
        representation: Arc<dyn Representation>,
        oracle: Arc<Oracle>,
    ) -> Self {
        PerturbationManager {
            app,
            platform,
            representation,
            oracle,
            num_mappings: config.num_mappings,
            num_perturbations: config.num_perturbations,
            max_retries: config.max_retries.max(1),
            rng: DcRng::seed_from_u64(config.seed),
        }
    }

    /// Draw up to `n` random mappings with pairwise distinct keys
    ///
    /// Returns fewer when the mapping space runs out before `n`.
    pub fn create_random_mappings(&mut self, n: usize) -> DseResult<Vec<Mapping>> {
        let mapper = RandomPartialMapper::new(&self.app, &self.platform);
        let mut seen = HashSet::new();
        let mut mappings = Vec::with_capacity(n);

        let mut attempts = 0;
        while mappings.len() < n && attempts < n * self.max_retries {
            attempts += 1;
            let mapping = mapper.generate(&mut self.rng)?;
            if seen.insert(mapping.key()) {
                mappings.push(mapping);
            }
        }
        if mappings.len() < n {
            warn!("only {} distinct random mappings after {} attempts", mappings.len(), attempts);
        }
        Ok(mappings)
    }

    /// Move one random process of `mapping` to a random processor
    ///
    /// The result differs from `mapping` and from everything in `history`
    /// unless `max_retries` attempts fail, in which case the last candidate
    /// is returned anyway.
    pub fn apply_single_perturbation(&mut self, mapping: &Mapping, history: &[Mapping]) -> DseResult<Mapping> {
        let n_proc = mapping.process_to_pe.len();
        let n_pe = self.platform.num_processors();
        if n_proc == 0 || n_pe < 2 {
            warn!("mapping {} cannot be perturbed", mapping);
            return Ok(mapping.clone());
        }

        let mut candidate = mapping.clone();
        for _ in 0..self.max_retries {
            let mut placement = mapping.process_to_pe.clone();
            let process = self.rng.random_range(0..n_proc);
            placement[process] = self.rng.random_range(0..n_pe);
            candidate = CommunicationMapper::complete(&self.app, &self.platform, placement)?;

            if candidate != *mapping && !history.contains(&candidate) {
                return Ok(candidate);
            }
        }
        warn!(
            "no fresh perturbation of {} after {} retries; accepting {}",
            mapping, self.max_retries, candidate
        );
        Ok(candidate)
    }

    /// Apply `perturb` `num_perturbations` times to `mapping` and score the results
    ///
    /// Each call sees the mappings produced so far. All perturbed mappings are
    /// validated in one oracle batch.
    pub fn run_perturbation<F>(&mut self, mapping: &Mapping, mut perturb: F) -> DseResult<PerturbationOutcome>
    where
        F: FnMut(&mut Self, &Mapping, &[Mapping]) -> DseResult<Mapping>,
    {
        let mut history: Vec<Mapping> = Vec::with_capacity(self.num_perturbations);
        for _ in 0..self.num_perturbations {
            let perturbed = perturb(&mut *self, mapping, &history)?;
            history.push(perturbed);
        }

        let mut samples: Vec<Sample> = history.into_iter()
            .map(|m| Sample::from_mapping(m, self.representation.as_ref()))
            .collect();
        self.oracle.validate_set(&mut samples)?;

        let feasible = samples.iter().filter(|s| s.feasible()).count();
        let score_percent = if samples.is_empty() {
            0.0
        } else {
            100.0 * feasible as f64 / samples.len() as f64
        };
        let steps = samples.iter()
            .map(|s| PerturbationStep {
                mapping: s.mapping().clone(),
                runtime: s.exec_time_ps(),
                feasible: s.feasible(),
            })
            .collect();

        Ok(PerturbationOutcome { score_percent, steps })
    }

    /// [`Self::run_perturbation`] with single-process reassignments
    pub fn perturb_mapping(&mut self, mapping: &Mapping) -> DseResult<PerturbationOutcome> {
        self.run_perturbation(mapping, Self::apply_single_perturbation)
    }

    /// Score `center` and `num_mappings` random references the same way
    pub fn compare(&mut self, center: &Mapping) -> DseResult<RobustnessComparison> {
        let center_outcome = self.perturb_mapping(center)?;

        let references = self.create_random_mappings(self.num_mappings)?;
        let mut reference_scores = Vec::with_capacity(references.len());
        for reference in &references {
            reference_scores.push(self.perturb_mapping(reference)?.score_percent);
        }

        let beaten = reference_scores.iter()
            .filter(|&&s| center_outcome.score_percent >= s)
            .count();
        let beaten_fraction = if reference_scores.is_empty() {
            0.0
        } else {
            beaten as f64 / reference_scores.len() as f64
        };
        info!(
            "center perturbation score {:.1}% beats {:.0}% of {} references",
            center_outcome.score_percent,
            beaten_fraction * 100.0,
            reference_scores.len()
        );

        Ok(RobustnessComparison {
            center: center_outcome,
            reference_scores,
            beaten_fraction,
        })
    }
}
