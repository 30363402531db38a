//! Exploration report
//!
//! Everything one exploration run produced, keyed the way downstream tooling
//! reads it: the configuration, the final center with its perturbation
//! results, and every sampled group indexed by iteration and mapping key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ExplorationConfig;
use crate::design_centering::DcOutcome;
use crate::error::DseResult;
use crate::mapping::Mapping;
use crate::perturbation::{PerturbationStep, RobustnessComparison};
use crate::sample::{Sample, SampleSet};

/// Verdict for one mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub mapping: Mapping,
    pub feasible: bool,
    /// Execution time in picoseconds
    pub runtime: Option<u64>,
}

impl From<&Sample> for MappingRecord {
    fn from(sample: &Sample) -> Self {
        MappingRecord {
            mapping: sample.mapping().clone(),
            feasible: sample.feasible(),
            runtime: sample.exec_time_ps(),
        }
    }
}

impl From<&PerturbationStep> for MappingRecord {
    fn from(step: &PerturbationStep) -> Self {
        MappingRecord {
            mapping: step.mapping.clone(),
            feasible: step.feasible,
            runtime: step.runtime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenterRecord {
    pub mapping: Mapping,
    pub feasible: bool,
    pub runtime: Option<u64>,
    pub radius: f64,
    pub hitting_probability: f64,
    pub robust: bool,
    /// Perturbed mappings by key
    pub pert: BTreeMap<String, MappingRecord>,
}

/// Complete result of one exploration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationReport {
    pub config: ExplorationConfig,
    pub center: CenterRecord,
    /// One map per iteration, keyed by mapping key
    pub samples: Vec<BTreeMap<String, MappingRecord>>,
    pub comparison: Option<RobustnessComparison>,
}

impl ExplorationReport {
    pub fn new(
        config: &ExplorationConfig,
        outcome: &DcOutcome,
        sample_set: &SampleSet,
        comparison: Option<RobustnessComparison>,
    ) -> Self {
        let pert = comparison.iter()
            .flat_map(|c| c.center.steps.iter())
            .map(|step| (step.mapping.key().to_string(), MappingRecord::from(step)))
            .collect();

        let samples = sample_set.groups()
            .iter()
            .map(|group| {
                group.iter()
                    .map(|s| (s.key().to_string(), MappingRecord::from(s)))
                    .collect()
            })
            .collect();

        ExplorationReport {
            config: config.clone(),
            center: CenterRecord {
                mapping: outcome.center.mapping().clone(),
                feasible: outcome.center.feasible(),
                runtime: outcome.center.exec_time_ps(),
                radius: outcome.radius,
                hitting_probability: outcome.hitting_probability,
                robust: outcome.robust,
                pert,
            },
            samples,
            comparison,
        }
    }

    pub fn to_json(&self) -> DseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_json(&self, path: &str) -> DseResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl fmt::Display for ExplorationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runtime = match self.center.runtime {
            Some(ps) => format!("{:.3} ms", ps as f64 / 1e9),
            None => "n/a".to_string(),
        };
        writeln!(f, "╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║                    DESIGN CENTERING RESULT                   ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Center:              {:<40}║", self.center.mapping.to_string())?;
        writeln!(f, "║ Feasible:            {:<40}║", self.center.feasible)?;
        writeln!(f, "║ Runtime:             {:<40}║", runtime)?;
        writeln!(f, "║ Radius:              {:<40.3}║", self.center.radius)?;
        writeln!(f, "║ Hitting probability: {:<40.3}║", self.center.hitting_probability)?;
        writeln!(f, "║ Iterations:          {:<40}║", self.samples.len())?;
        writeln!(f, "╚══════════════════════════════════════════════════════════════╝")?;
        if let Some(ref comparison) = self.comparison {
            write!(f, "{}", comparison.report())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::config::{DcConfig, OracleConfig, PerturbationConfig, RepresentationConfig};
    use crate::design_centering::DesignCentering;
    use crate::kpn::Application;
    use crate::oracle::{FeasibilityBackend, Oracle, Rect, TestRegion};
    use crate::perturbation::PerturbationManager;
    use crate::platform::Platform;
    use crate::representation::{Representation, SimpleVectorRepresentation};
    use crate::volume::Volume;

    fn run_with_norm(norm_p: f64) -> ExplorationReport {
        let app = Arc::new(Application::pipeline(3));
        let platform = Arc::new(Platform::homogeneous(4, 1_000_000_000));
        let repr: Arc<dyn Representation> = Arc::new(SimpleVectorRepresentation::new(app.clone(), platform.clone(), norm_p));
        let region = TestRegion::new(vec![Rect::new(vec![0.0, 0.0, 0.0], vec![1.0, 3.0, 3.0])], vec![]);
        let oracle = Arc::new(Oracle::new(FeasibilityBackend::FixedTest(region), &OracleConfig::default()).unwrap());

        let config = ExplorationConfig {
            dc: DcConfig { max_samples: 40, adapt_samples: 20, ..Default::default() },
            perturbation: PerturbationConfig { num_mappings: 3, num_perturbations: 4, ..Default::default() },
            representation: RepresentationConfig { norm_p },
            ..Default::default()
        };
        let volume = Volume::new(vec![1.0, 1.0, 1.0], config.dc.radius, repr.clone());
        let mut dc = DesignCentering::new(volume, oracle.clone(), repr.clone(), config.dc.clone()).unwrap();
        let outcome = dc.ds_explore().unwrap();

        let mut pm = PerturbationManager::new(&config.perturbation, app, platform, repr, oracle);
        let comparison = pm.compare(outcome.center.mapping()).unwrap();
        ExplorationReport::new(&config, &outcome, dc.sample_set(), Some(comparison))
    }

    fn run() -> ExplorationReport {
        run_with_norm(2.0)
    }

    #[test]
    fn test_report_layout() {
        let report = run();
        assert_eq!(report.samples.len(), 2);
        assert!(report.samples.iter().all(|group| !group.is_empty() && group.len() <= 20));
        assert_eq!(report.center.pert.len(), 4);
        for (key, record) in &report.samples[0] {
            assert_eq!(*key, record.mapping.key().to_string());
        }
    }

    #[test]
    fn test_report_json_roundtrip() {
        let report = run();
        let json = report.to_json().unwrap();
        let parsed: ExplorationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.config.dc.max_samples, 40);
        assert_eq!(parsed.center.mapping, report.center.mapping);
        assert_eq!(parsed.center.pert, report.center.pert);
        assert_eq!(parsed.samples, report.samples);
        assert!(parsed.comparison.is_some());
    }

    #[test]
    fn test_chebyshev_report_json_roundtrip() {
        let report = run_with_norm(f64::INFINITY);
        let json = report.to_json().unwrap();
        let parsed: ExplorationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.config.representation.norm_p, f64::INFINITY);
        assert_eq!(parsed.config, report.config);
        assert_eq!(parsed.samples, report.samples);
    }

    #[test]
    fn test_report_display() {
        let text = run().to_string();
        assert!(text.contains("DESIGN CENTERING RESULT"));
        assert!(text.contains("PERTURBATION ROBUSTNESS"));
    }
}
