//! Exploration Configuration Module
//!
//! Every tunable of a design-centering run, grouped per component.
//! Configurations are plain serde structs with defaults and can be stored
//! as TOML. Validation happens once, before any search state is built.

use serde::{Deserialize, Serialize};

use crate::error::{DseError, DseResult};
use crate::kpn::Application;
use crate::platform::Platform;
use crate::representation::SampleDistribution;
use crate::trace::WorkloadConfig;

/// Complete exploration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationConfig {
    /// Design-centering controller parameters
    pub dc: DcConfig,
    /// Feasibility oracle parameters
    pub oracle: OracleConfig,
    /// Robustness check parameters
    pub perturbation: PerturbationConfig,
    /// Mapping representation parameters
    pub representation: RepresentationConfig,
    /// Application to map
    pub application: ApplicationSpec,
    /// Target platform
    pub platform: PlatformSpec,
    /// Synthetic trace parameters
    pub workload: WorkloadConfig,
}

/// Design-centering controller parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcConfig {
    /// Total number of sampled points (the budget)
    pub max_samples: usize,
    /// Points drawn per iteration
    pub adapt_samples: usize,
    /// Support points of the target hitting-probability schedule
    pub hitting_probability: Vec<f64>,
    /// Degree of the polynomial fitted through `hitting_probability`
    pub deg_p_polynomial: usize,
    /// Support points of the radius step schedule
    pub step_width: Vec<f64>,
    /// Degree of the polynomial fitted through `step_width`
    pub deg_s_polynomial: usize,
    /// Minimum hitting probability for a center to count as robust
    pub hitting_probability_threshold: f64,
    /// Offset distribution used inside the ball
    pub distr: SampleDistribution,
    /// Keep every sample group in the returned history
    pub record_samples: bool,
    /// Initial radius
    pub radius: f64,
    /// Seed for all sampling decisions
    pub seed: u64,
}

/// Feasibility oracle parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Execution time bound with unit, e.g. "500 ms"
    pub threshold: String,
    /// Simulate uncached samples of one batch in parallel
    pub parallel: bool,
    /// Worker threads (0 = one per core)
    pub jobs: usize,
}

/// Robustness check parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerturbationConfig {
    /// Random reference mappings to compare against
    pub num_mappings: usize,
    /// Perturbations applied per mapping
    pub num_perturbations: usize,
    /// Attempts to find a perturbation not seen before
    pub max_retries: usize,
    pub seed: u64,
}

/// Mapping representation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationConfig {
    /// p of the ball norm (`inf` for the Chebyshev box)
    #[serde(with = "norm_serde")]
    pub norm_p: f64,
}

/// Infinite p is written as `"inf"`; JSON has no infinity literal
mod norm_serde {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(p: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if *p == f64::INFINITY {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_f64(*p)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Norm {
        Value(f64),
        Name(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Norm::deserialize(deserializer)? {
            Norm::Value(p) => Ok(p),
            Norm::Name(name) => match name.as_str() {
                "inf" | "infinity" | "chebyshev" => Ok(f64::INFINITY),
                other => Err(de::Error::custom(format!("unknown norm '{}'", other))),
            },
        }
    }
}

/// Synthetic application shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplicationSpec {
    Pipeline { stages: usize },
    ForkJoin { width: usize },
}

/// Platform presets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlatformSpec {
    Homogeneous { processors: usize, frequency_hz: u64 },
    BigLittle { big: usize, little: usize },
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        ExplorationConfig {
            dc: DcConfig::default(),
            oracle: OracleConfig::default(),
            perturbation: PerturbationConfig::default(),
            representation: RepresentationConfig::default(),
            application: ApplicationSpec::ForkJoin { width: 4 },
            platform: PlatformSpec::BigLittle { big: 2, little: 4 },
            workload: WorkloadConfig::default(),
        }
    }
}

impl Default for DcConfig {
    fn default() -> Self {
        DcConfig {
            max_samples: 400,
            adapt_samples: 20,
            hitting_probability: vec![0.4, 0.5, 0.5, 0.6, 0.7],
            deg_p_polynomial: 2,
            step_width: vec![0.3, 0.2, 0.15, 0.1, 0.05],
            deg_s_polynomial: 2,
            hitting_probability_threshold: 0.5,
            distr: SampleDistribution::Uniform,
            record_samples: true,
            radius: 2.0,
            seed: 42,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            threshold: "6 ms".to_string(),
            parallel: true,
            jobs: 0,
        }
    }
}

impl Default for PerturbationConfig {
    fn default() -> Self {
        PerturbationConfig {
            num_mappings: 10,
            num_perturbations: 10,
            max_retries: 100,
            seed: 7,
        }
    }
}

impl Default for RepresentationConfig {
    fn default() -> Self {
        RepresentationConfig { norm_p: 2.0 }
    }
}

impl DcConfig {
    /// Reject parameter combinations the controller cannot run with
    pub fn validate(&self) -> DseResult<()> {
        if !(0.0..=1.0).contains(&self.hitting_probability_threshold) {
            return Err(DseError::config(format!(
                "hitting_probability_threshold must be within [0, 1], got {}",
                self.hitting_probability_threshold
            )));
        }
        if self.adapt_samples == 0 {
            return Err(DseError::config("adapt_samples must be positive"));
        }
        if self.max_samples < self.adapt_samples {
            return Err(DseError::config(format!(
                "max_samples ({}) is smaller than adapt_samples ({})",
                self.max_samples, self.adapt_samples
            )));
        }
        if self.hitting_probability.is_empty() {
            return Err(DseError::config("hitting_probability needs at least one support point"));
        }
        if self.hitting_probability.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(DseError::config("hitting_probability values must be within [0, 1]"));
        }
        if self.deg_p_polynomial >= self.hitting_probability.len() {
            return Err(DseError::config(format!(
                "deg_p_polynomial {} needs more than {} support points",
                self.deg_p_polynomial,
                self.hitting_probability.len()
            )));
        }
        if self.step_width.is_empty() {
            return Err(DseError::config("step_width needs at least one support point"));
        }
        if self.step_width.iter().any(|s| !(0.0..1.0).contains(s)) {
            return Err(DseError::config("step_width values must be within [0, 1)"));
        }
        if self.deg_s_polynomial >= self.step_width.len() {
            return Err(DseError::config(format!(
                "deg_s_polynomial {} needs more than {} support points",
                self.deg_s_polynomial,
                self.step_width.len()
            )));
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(DseError::config(format!("radius must be positive, got {}", self.radius)));
        }
        Ok(())
    }

    /// Number of iterations the budget allows
    pub fn iterations(&self) -> usize {
        self.max_samples.div_ceil(self.adapt_samples.max(1))
    }
}

impl OracleConfig {
    /// Threshold in picoseconds
    pub fn threshold_ps(&self) -> DseResult<u64> {
        parse_time_ps(&self.threshold)
    }
}

impl RepresentationConfig {
    pub fn validate(&self) -> DseResult<()> {
        if self.norm_p.is_nan() || self.norm_p < 1.0 {
            return Err(DseError::config(format!("norm_p must be >= 1, got {}", self.norm_p)));
        }
        Ok(())
    }
}

impl ApplicationSpec {
    pub fn build(&self) -> Application {
        match *self {
            ApplicationSpec::Pipeline { stages } => Application::pipeline(stages),
            ApplicationSpec::ForkJoin { width } => Application::fork_join(width),
        }
    }
}

impl PlatformSpec {
    pub fn build(&self) -> Platform {
        match *self {
            PlatformSpec::Homogeneous { processors, frequency_hz } => Platform::homogeneous(processors, frequency_hz),
            PlatformSpec::BigLittle { big, little } => Platform::big_little(big, little),
        }
    }
}

impl ExplorationConfig {
    pub fn validate(&self) -> DseResult<()> {
        self.dc.validate()?;
        self.oracle.threshold_ps()?;
        self.representation.validate()?;
        if self.perturbation.max_retries == 0 {
            return Err(DseError::config("perturbation.max_retries must be positive"));
        }
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &str) -> DseResult<()> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| DseError::config(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Load and validate configuration from TOML file
    pub fn load(path: &str) -> DseResult<Self> {
        let toml_str = std::fs::read_to_string(path)?;
        let config: ExplorationConfig = toml::from_str(&toml_str)?;
        config.validate()?;
        Ok(config)
    }
}

/// Parse a time such as "500 ms", "1.5us", "1e3 ns" or "200" (picoseconds) into picoseconds
pub fn parse_time_ps(text: &str) -> DseResult<u64> {
    let text = text.trim();
    let (number, unit) = text.split_at(number_len(text));

    let value: f64 = number.parse()
        .map_err(|_| DseError::config(format!("invalid time value '{}'", text)))?;
    let scale = match unit.trim() {
        "" | "ps" => 1.0,
        "ns" => 1e3,
        "us" | "µs" => 1e6,
        "ms" => 1e9,
        "s" => 1e12,
        other => return Err(DseError::config(format!("unknown time unit '{}' in '{}'", other, text))),
    };

    let ps = (value * scale).round();
    if !ps.is_finite() || ps > u64::MAX as f64 {
        return Err(DseError::config(format!("time value '{}' out of range", text)));
    }
    Ok(ps as u64)
}

/// Length of the leading decimal number, with optional fraction and exponent
fn number_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let digits = |from: usize| bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count();

    let mut end = digits(0);
    if bytes.get(end) == Some(&b'.') {
        end += 1 + digits(end + 1);
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let n = digits(exp);
        if n > 0 {
            end = exp + n;
        }
    }
    end
}
