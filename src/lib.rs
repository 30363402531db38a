//! KPN Design Centering
//!
//! Searches for robust mappings of Kahn process network (KPN) applications
//! onto multiprocessor platforms. A robust mapping is one that keeps meeting
//! its execution-time threshold when processes are moved around a little,
//! which is what matters once the real system deviates from the model.
//!
//! # Overview
//!
//! - **Design centering** adapts a ball (center + radius) in mapping space
//!   until a target fraction of the mappings sampled from it is feasible,
//!   and returns the center of the largest such ball
//! - **Feasibility oracle** with per-mapping memoization and parallel batch
//!   evaluation on a worker pool
//! - **Discrete-event KPN simulator** as the execution-time backend
//! - **Perturbation analysis** comparing the found center against random
//!   mappings
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use kpn_design_centering::prelude::*;
//!
//! let config = ExplorationConfig::default();
//! let report = kpn_design_centering::explore(&config).unwrap();
//! println!("{}", report);
//! ```
//!
//! # Custom searches
//!
//! The pieces can be assembled by hand, e.g. to search a known test region
//! without simulating:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kpn_design_centering::prelude::*;
//!
//! let mut app = Application::new("plane");
//! app.add_process("x");
//! app.add_process("y");
//! let repr: Arc<dyn Representation> = Arc::new(SimpleVectorRepresentation::new(
//!     Arc::new(app),
//!     Arc::new(Platform::homogeneous(15, 1_000_000_000)),
//!     f64::INFINITY,
//! ));
//!
//! let region = TestRegion::new(vec![Rect::new(vec![7.0, 7.0], vec![12.0, 12.0])], vec![]);
//! let oracle = Oracle::new(FeasibilityBackend::FixedTest(region), &OracleConfig::default()).unwrap();
//!
//! let config = DcConfig::default();
//! let volume = Volume::new(vec![5.0, 5.0], config.radius, repr.clone());
//! let mut dc = DesignCentering::new(volume, Arc::new(oracle), repr, config).unwrap();
//! let outcome = dc.ds_explore().unwrap();
//! println!("center {}", outcome.center.mapping());
//! ```

use std::sync::Arc;

use rand::SeedableRng;

pub mod error;
pub mod config;
pub mod kpn;
pub mod platform;
pub mod mapping;
pub mod representation;
pub mod trace;
pub mod simulation;
pub mod sample;
pub mod oracle;
pub mod schedule;
pub mod volume;
pub mod design_centering;
pub mod perturbation;
pub mod report;

use crate::config::ExplorationConfig;
use crate::design_centering::DesignCentering;
use crate::error::DseResult;
use crate::oracle::{FeasibilityBackend, Oracle, SimulationBackend};
use crate::perturbation::PerturbationManager;
use crate::report::ExplorationReport;
use crate::representation::{DcRng, Representation, SimpleVectorRepresentation};
use crate::simulation::KpnSimulator;
use crate::trace::SyntheticTrace;
use crate::volume::Volume;

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::config::{ExplorationConfig, DcConfig, OracleConfig, PerturbationConfig,
                           RepresentationConfig, ApplicationSpec, PlatformSpec, parse_time_ps};
    pub use crate::error::{DseError, DseResult};
    pub use crate::kpn::{Application, Channel};
    pub use crate::platform::{Platform, Processor, Primitive, Reach};
    pub use crate::mapping::{Mapping, MappingKey, CommunicationMapper, RandomPartialMapper};
    pub use crate::representation::{Representation, SimpleVectorRepresentation, SampleDistribution,
                                   Point, DcRng};
    pub use crate::trace::{TraceGenerator, SyntheticTrace, Segment, WorkloadConfig};
    pub use crate::simulation::{Simulator, KpnSimulator, SimulationReport};
    pub use crate::sample::{Sample, SampleSet, SimResult};
    pub use crate::oracle::{Oracle, FeasibilityBackend, SimulationBackend, TestRegion, Rect};
    pub use crate::volume::Volume;
    pub use crate::design_centering::{DesignCentering, DcOutcome, DcHistory};
    pub use crate::perturbation::{PerturbationManager, PerturbationOutcome, PerturbationStep,
                                 RobustnessComparison};
    pub use crate::report::ExplorationReport;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run design centering on the configured application and platform, then
/// compare the center's perturbation score against random mappings
///
/// The search starts from a uniformly random mapping drawn with the search seed.
pub fn explore(config: &ExplorationConfig) -> DseResult<ExplorationReport> {
    config.validate()?;

    let app = Arc::new(config.application.build());
    let platform = Arc::new(config.platform.build());
    let representation: Arc<dyn Representation> = Arc::new(SimpleVectorRepresentation::new(
        app.clone(),
        platform.clone(),
        config.representation.norm_p,
    ));

    let backend = FeasibilityBackend::Simulation(SimulationBackend {
        app: app.clone(),
        platform: platform.clone(),
        trace: Box::new(SyntheticTrace::new(&app, &config.workload)),
        simulator: Arc::new(KpnSimulator::new()),
    });
    let oracle = Arc::new(Oracle::new(backend, &config.oracle)?);

    let start = representation.uniform(&mut DcRng::seed_from_u64(config.dc.seed));
    let volume = Volume::new(start, config.dc.radius, representation.clone());
    let mut dc = DesignCentering::new(volume, oracle.clone(), representation.clone(), config.dc.clone())?;
    let outcome = dc.ds_explore()?;

    let mut perturbation = PerturbationManager::new(&config.perturbation, app, platform, representation, oracle);
    let comparison = perturbation.compare(outcome.center.mapping())?;

    Ok(ExplorationReport::new(config, &outcome, dc.sample_set(), Some(comparison)))
}
