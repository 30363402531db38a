//! Samples and sample history
//!
//! A [`Sample`] is one point of representation space together with the
//! mapping it denotes and, once the oracle has seen it, its feasibility.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DseResult;
use crate::mapping::{Mapping, MappingKey};
use crate::representation::{Point, Representation};

/// Oracle verdict attached to a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimResult {
    pub exec_time_ps: u64,
}

/// A sampled point of the search space
///
/// Feasibility is assigned by the [`Oracle`](crate::oracle::Oracle) only:
///
/// ```compile_fail
/// use kpn_design_centering::prelude::*;
///
/// fn relabel(sample: &mut Sample) {
///     sample.set_feasible(true);
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    point: Point,
    mapping: Mapping,
    feasible: bool,
    sim_result: Option<SimResult>,
}

impl Sample {
    /// Wrap a point; the mapping is derived through the representation
    pub fn new(point: Point, representation: &dyn Representation) -> DseResult<Self> {
        let mapping = representation.from_representation(&point)?;
        Ok(Sample {
            point,
            mapping,
            feasible: false,
            sim_result: None,
        })
    }

    /// Wrap a concrete mapping
    pub fn from_mapping(mapping: Mapping, representation: &dyn Representation) -> Self {
        Sample {
            point: representation.to_representation(&mapping),
            mapping,
            feasible: false,
            sim_result: None,
        }
    }

    /// Raw point
    pub fn point(&self) -> &Point {
        &self.point
    }

    /// Canonical comparison key
    pub fn key(&self) -> MappingKey {
        self.mapping.key()
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn feasible(&self) -> bool {
        self.feasible
    }

    pub(crate) fn set_feasible(&mut self, feasible: bool) {
        self.feasible = feasible;
    }

    pub fn sim_result(&self) -> Option<SimResult> {
        self.sim_result
    }

    pub fn exec_time_ps(&self) -> Option<u64> {
        self.sim_result.map(|r| r.exec_time_ps)
    }

    pub(crate) fn set_sim_result(&mut self, result: Option<SimResult>) {
        self.sim_result = result;
    }
}

/// Append-only history of every sample of one search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    samples: Vec<Sample>,
    groups: Vec<Vec<Sample>>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the flat history
    pub fn add_sample_list(&mut self, samples: &[Sample]) {
        self.samples.extend_from_slice(samples);
    }

    /// Append one iteration's group
    pub fn add_sample_group(&mut self, samples: &[Sample]) {
        self.groups.push(samples.to_vec());
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn groups(&self) -> &[Vec<Sample>] {
        &self.groups
    }

    /// Most recent group, empty before the first iteration
    pub fn last_group(&self) -> &[Sample] {
        self.groups.last().map(|g| g.as_slice()).unwrap_or(&[])
    }

    pub fn get_feasible(&self) -> Vec<&Sample> {
        self.samples.iter().filter(|s| s.feasible()).collect()
    }

    pub fn get_infeasible(&self) -> Vec<&Sample> {
        self.samples.iter().filter(|s| !s.feasible()).collect()
    }

    /// Number of samples across all groups
    pub fn grouped_len(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }
}

/// Number of samples whose key already occurred earlier in `samples`
pub fn count_duplicates(samples: &[Sample]) -> usize {
    let mut counts: HashMap<MappingKey, usize> = HashMap::new();
    for sample in samples {
        *counts.entry(sample.key()).or_insert(0) += 1;
    }
    counts.values().map(|&c| c - 1).sum()
}
