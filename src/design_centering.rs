//! Design Centering
//!
//! Searches for a mapping that stays feasible under small perturbations.
//! Instead of a single feasible point, the search adapts a ball in
//! representation space until a target fraction of the mappings sampled
//! from it is feasible, and keeps the center of the largest such ball.
//!
//! Each iteration samples the current ball, labels the samples through the
//! [`Oracle`], moves the center toward the feasible samples and resizes the
//! radius against a per-iteration target probability. Iterations are strictly
//! sequential; only the oracle evaluates in parallel.

use std::sync::Arc;

use log::{debug, error, info, warn};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::DcConfig;
use crate::error::{DseError, DseResult};
use crate::oracle::Oracle;
use crate::representation::{DcRng, Point, Representation};
use crate::sample::{count_duplicates, Sample, SampleSet};
use crate::schedule::fit_schedule;
use crate::volume::{Volume, MAX_STEP};

/// Per-iteration record of a search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DcHistory {
    /// Sample groups, only filled with `record_samples`
    pub samples: Vec<Vec<Sample>>,
    /// Adapted center after each iteration
    pub centers: Vec<Point>,
    /// Adapted radius after each iteration
    pub radii: Vec<f64>,
    /// Empirical hitting probability of each group
    pub hitting_probabilities: Vec<f64>,
    /// Best robust area known after each iteration
    pub best_areas: Vec<f64>,
}

/// Result of [`DesignCentering::ds_explore`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcOutcome {
    /// Validated best center
    pub center: Sample,
    pub radius: f64,
    pub hitting_probability: f64,
    pub area: f64,
    /// False when no center ever reached the probability threshold and the
    /// last computed center was returned instead
    pub robust: bool,
    pub history: DcHistory,
}

/// Best robust center seen so far
#[derive(Debug, Clone)]
struct BestCenter {
    center: Point,
    radius: f64,
    hitting_probability: f64,
    area: f64,
}

/// Design-centering controller
pub struct DesignCentering {
    volume: Volume,
    oracle: Arc<Oracle>,
    representation: Arc<dyn Representation>,
    config: DcConfig,
    rng: DcRng,
    p_schedule: Vec<f64>,
    step_schedule: Vec<f64>,
    sample_set: SampleSet,
}

impl DesignCentering {
    /// Validates `config` and precomputes the probability and step schedules
    pub fn new(
        volume: Volume,
        oracle: Arc<Oracle>,
        representation: Arc<dyn Representation>,
        config: DcConfig,
    ) -> DseResult<Self> {
        config.validate()?;

        let p_schedule = fit_schedule(
            &config.hitting_probability,
            config.deg_p_polynomial,
            config.max_samples,
            0.0,
            1.0,
        ).ok_or_else(|| DseError::config("cannot fit hitting probability schedule"))?;
        let step_schedule = fit_schedule(
            &config.step_width,
            config.deg_s_polynomial,
            config.max_samples,
            0.0,
            MAX_STEP,
        ).ok_or_else(|| DseError::config("cannot fit step width schedule"))?;

        Ok(DesignCentering {
            volume,
            oracle,
            representation,
            rng: DcRng::seed_from_u64(config.seed),
            config,
            p_schedule,
            step_schedule,
            sample_set: SampleSet::new(),
        })
    }

    pub fn p_schedule(&self) -> &[f64] {
        &self.p_schedule
    }

    pub fn step_schedule(&self) -> &[f64] {
        &self.step_schedule
    }

    pub fn sample_set(&self) -> &SampleSet {
        &self.sample_set
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    /// Run the full sample budget and return the most robust center found
    pub fn ds_explore(&mut self) -> DseResult<DcOutcome> {
        let threshold = self.config.hitting_probability_threshold;
        let mut history = DcHistory::default();
        let mut center = self.volume.center.clone();
        let mut last_p = 0.0;
        let mut best: Option<BestCenter> = None;

        let mut i = 0;
        while i < self.config.max_samples {
            // Sample
            let points = self.representation.sample_in_ball(
                &self.volume.center,
                self.volume.radius,
                self.config.adapt_samples,
                self.config.distr,
                &mut self.rng,
            );
            let mut samples = points.into_iter()
                .map(|p| Sample::new(p, self.representation.as_ref()))
                .collect::<DseResult<Vec<_>>>()?;
            let duplicates = count_duplicates(&samples);
            if duplicates > 0 {
                warn!("{} of {} samples at iteration {} are duplicates", duplicates, samples.len(), i);
            }

            // Validate
            self.oracle.validate_set(&mut samples)?;
            self.sample_set.add_sample_group(&samples);
            self.sample_set.add_sample_list(&samples);

            // Adapt center
            center = self.volume.adapt_center(&self.sample_set);
            let mut candidate = Sample::new(center.clone(), self.representation.as_ref())?;
            self.oracle.validate(&mut candidate)?;
            if !candidate.feasible() {
                warn!("adapted center {} is infeasible", candidate.mapping());
            }

            // Adapt radius
            let p_emp = self.volume.adapt_volume(&self.sample_set, self.p_schedule[i], self.step_schedule[i]);
            let area = self.volume.area(p_emp);
            let best_area = best.as_ref().map(|b| b.area).unwrap_or(0.0);
            if p_emp >= threshold && area >= best_area && candidate.feasible() {
                best = Some(BestCenter {
                    center: center.clone(),
                    radius: self.volume.radius,
                    hitting_probability: p_emp,
                    area,
                });
            }
            last_p = p_emp;

            debug!(
                "iteration {}: p_emp={:.3} target={:.3} radius={:.3} center={:?}",
                i, p_emp, self.p_schedule[i], self.volume.radius, center
            );
            history.centers.push(center.clone());
            history.radii.push(self.volume.radius);
            history.hitting_probabilities.push(p_emp);
            history.best_areas.push(best.as_ref().map(|b| b.area).unwrap_or(0.0));
            if self.config.record_samples {
                history.samples.push(samples);
            }

            i += self.config.adapt_samples;
        }

        self.finalize(best, center, last_p, history)
    }

    fn finalize(
        &self,
        best: Option<BestCenter>,
        last_center: Point,
        last_p: f64,
        history: DcHistory,
    ) -> DseResult<DcOutcome> {
        let robust = best.is_some();
        let best = match best {
            Some(best) => best,
            None => {
                error!(
                    "no center reached hitting probability {:.3}; returning last center",
                    self.config.hitting_probability_threshold
                );
                BestCenter {
                    area: self.volume.area(last_p),
                    center: last_center,
                    radius: self.volume.radius,
                    hitting_probability: last_p,
                }
            }
        };

        let mut center = Sample::new(best.center, self.representation.as_ref())?;
        self.oracle.validate(&mut center)?;
        if robust && !center.feasible() {
            warn!("best center {} failed revalidation", center.mapping());
        }
        info!(
            "center {} (feasible: {}) radius {:.3} p={:.3} after {} samples",
            center.mapping(),
            center.feasible(),
            best.radius,
            best.hitting_probability,
            self.sample_set.samples().len()
        );

        Ok(DcOutcome {
            center,
            radius: best.radius,
            hitting_probability: best.hitting_probability,
            area: best.area,
            robust,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OracleConfig;
    use crate::kpn::Application;
    use crate::oracle::{FeasibilityBackend, Rect, SimulationBackend, TestRegion};
    use crate::platform::Platform;
    use crate::representation::{SampleDistribution, SimpleVectorRepresentation};
    use crate::simulation::KpnSimulator;
    use crate::trace::{SyntheticTrace, WorkloadConfig};

    /// Two processes on fifteen processors: the placement is a point of the plane
    fn plane_representation() -> Arc<dyn Representation> {
        let mut app = Application::new("plane");
        app.add_process("x");
        app.add_process("y");
        Arc::new(SimpleVectorRepresentation::new(
            Arc::new(app),
            Arc::new(Platform::homogeneous(15, 1_000_000_000)),
            f64::INFINITY,
        ))
    }

    fn three_islands() -> TestRegion {
        TestRegion::new(
            vec![
                Rect::new(vec![1.0, 1.0], vec![2.0, 2.0]),
                Rect::new(vec![1.0, 13.0], vec![3.0, 14.0]),
                Rect::new(vec![7.0, 7.0], vec![12.0, 12.0]),
            ],
            vec![Rect::new(vec![9.0, 9.0], vec![10.0, 10.0])],
        )
    }

    fn constant_config() -> DcConfig {
        DcConfig {
            max_samples: 1000,
            adapt_samples: 50,
            hitting_probability: vec![0.5],
            deg_p_polynomial: 0,
            step_width: vec![0.1],
            deg_s_polynomial: 0,
            hitting_probability_threshold: 0.5,
            distr: SampleDistribution::Uniform,
            record_samples: true,
            radius: 2.0,
            seed: 1,
        }
    }

    fn region_search(region: TestRegion, config: DcConfig) -> DesignCentering {
        let repr = plane_representation();
        let oracle = Oracle::new(
            FeasibilityBackend::FixedTest(region),
            &OracleConfig { parallel: false, ..Default::default() },
        ).unwrap();
        let volume = Volume::new(vec![5.0, 5.0], config.radius, repr.clone());
        DesignCentering::new(volume, Arc::new(oracle), repr, config).unwrap()
    }

    #[test]
    fn test_converges_into_large_island() {
        let mut dc = region_search(three_islands(), constant_config());
        let outcome = dc.ds_explore().unwrap();

        let center = outcome.center.point();
        println!("center {:?} radius {:.3} p {:.3}", center, outcome.radius, outcome.hitting_probability);
        assert!(outcome.robust);
        assert!(center.iter().all(|&c| (7.0..=12.0).contains(&c)));
        assert!(outcome.center.feasible());
        assert!(outcome.hitting_probability >= 0.5);
    }

    #[test]
    fn test_budget_and_history() {
        let mut dc = region_search(three_islands(), constant_config());
        let outcome = dc.ds_explore().unwrap();

        assert_eq!(dc.sample_set().grouped_len(), 1000);
        assert_eq!(dc.sample_set().groups().len(), 20);
        assert_eq!(outcome.history.samples.len(), 20);
        assert_eq!(outcome.history.centers.len(), 20);
        assert_eq!(outcome.history.radii.len(), 20);
        assert!(outcome.history.radii.iter().all(|&r| r > 0.0));
        assert!(outcome.history.hitting_probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_best_area_monotone() {
        let mut dc = region_search(three_islands(), constant_config());
        let outcome = dc.ds_explore().unwrap();

        let areas = &outcome.history.best_areas;
        assert!(areas.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(areas.last().copied(), Some(outcome.area));
    }

    #[test]
    fn test_degenerate_search_returns_last_center() {
        let config = DcConfig {
            max_samples: 200,
            record_samples: false,
            ..constant_config()
        };
        let mut dc = region_search(TestRegion::default(), config);
        let outcome = dc.ds_explore().unwrap();

        assert!(!outcome.robust);
        assert!(!outcome.center.feasible());
        assert_eq!(outcome.center.point(), &vec![5.0, 5.0]);
        assert_eq!(outcome.hitting_probability, 0.0);
        assert!(outcome.history.samples.is_empty());
        assert_eq!(outcome.history.centers.len(), 4);
    }

    #[test]
    fn test_binomial_search_on_open_space_keeps_radius_bounded() {
        let everywhere = TestRegion::new(vec![Rect::new(vec![0.0, 0.0], vec![14.0, 14.0])], vec![]);
        let config = DcConfig {
            max_samples: 1000,
            adapt_samples: 10,
            step_width: vec![0.9],
            distr: SampleDistribution::Binomial,
            record_samples: false,
            ..constant_config()
        };
        let mut dc = region_search(everywhere, config);
        let outcome = dc.ds_explore().unwrap();

        let max = dc.volume().max_radius();
        assert!(outcome.robust);
        assert_eq!(outcome.hitting_probability, 1.0);
        assert!(outcome.history.radii.iter().all(|r| r.is_finite() && *r <= max));
        assert_eq!(outcome.radius, max);
        assert_eq!(dc.sample_set().grouped_len(), 1000);
    }

    #[test]
    fn test_invalid_threshold_fails_fast() {
        let repr = plane_representation();
        let oracle = Oracle::new(
            FeasibilityBackend::FixedTest(three_islands()),
            &OracleConfig::default(),
        ).unwrap();
        let volume = Volume::new(vec![5.0, 5.0], 2.0, repr.clone());
        let config = DcConfig {
            hitting_probability_threshold: 1.5,
            ..constant_config()
        };
        let result = DesignCentering::new(volume, Arc::new(oracle), repr, config);
        assert!(matches!(result, Err(DseError::Configuration(_))));
    }

    #[test]
    fn test_schedules_follow_support_points() {
        let config = DcConfig {
            max_samples: 100,
            adapt_samples: 10,
            hitting_probability: vec![0.2, 0.8],
            deg_p_polynomial: 1,
            step_width: vec![0.4, 0.1],
            deg_s_polynomial: 1,
            ..constant_config()
        };
        let dc = region_search(three_islands(), config);
        assert_eq!(dc.p_schedule().len(), 100);
        assert!((dc.p_schedule()[0] - 0.2).abs() < 1e-9);
        assert!((dc.p_schedule()[50] - 0.5).abs() < 1e-9);
        assert!(dc.step_schedule().windows(2).all(|w| w[0] >= w[1]));
    }

    fn simulated_search(seed: u64) -> DcOutcome {
        let app = Arc::new(Application::fork_join(3));
        let platform = Arc::new(Platform::big_little(2, 2));
        let repr: Arc<dyn Representation> = Arc::new(SimpleVectorRepresentation::new(app.clone(), platform.clone(), 2.0));
        let workload = WorkloadConfig { iterations: 5, ..Default::default() };
        let backend = FeasibilityBackend::Simulation(SimulationBackend {
            app: app.clone(),
            platform,
            trace: Box::new(SyntheticTrace::new(&app, &workload)),
            simulator: Arc::new(KpnSimulator::new()),
        });
        let oracle = Oracle::new(backend, &OracleConfig {
            threshold: "1 ms".to_string(),
            parallel: true,
            jobs: 4,
        }).unwrap();
        let config = DcConfig {
            max_samples: 80,
            adapt_samples: 20,
            seed,
            ..constant_config()
        };
        let volume = Volume::new(vec![0.0, 1.0, 2.0, 3.0, 0.0], config.radius, repr.clone());
        let mut dc = DesignCentering::new(volume, Arc::new(oracle), repr, config).unwrap();
        dc.ds_explore().unwrap()
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let first = simulated_search(9);
        let second = simulated_search(9);
        assert_eq!(first.center, second.center);
        assert_eq!(first.history, second.history);
        assert!(first.center.exec_time_ps().is_some());
    }
}
