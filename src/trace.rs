//! Trace Generators
//!
//! A trace is the per-process sequence of compute and communication
//! segments the simulator replays. Every simulation takes its own clone of
//! the generator, so concurrent simulations never share cursor state.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::kpn::Application;
use crate::representation::DcRng;

/// One step of a process trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Busy the processor for `cycles` cycles
    Compute { cycles: u64 },
    /// Consume `tokens` tokens, blocking until they are available
    Read { channel: usize, tokens: u64 },
    /// Produce `tokens` tokens
    Write { channel: usize, tokens: u64 },
}

/// Source of process traces
pub trait TraceGenerator: Send + Sync {
    /// Next segment of `process`, `None` once the process terminated
    fn next_segment(&mut self, process: usize) -> Option<Segment>;

    /// Rewind every process to the start of its trace
    fn reset(&mut self);

    /// Independent copy with its own cursors
    fn box_clone(&self) -> Box<dyn TraceGenerator>;
}

/// Workload parameters for synthetic traces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Firings of every process
    pub iterations: usize,
    /// Mean compute cycles per firing
    pub base_cycles: u64,
    /// Relative spread of per-process compute cost (0.0 = identical processes)
    pub jitter: f64,
    /// Seed for the per-process costs
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            iterations: 20,
            base_cycles: 100_000,
            jitter: 0.5,
            seed: 1,
        }
    }
}

/// Synthetic dataflow traces
///
/// Each firing reads one token from every input channel, computes, then
/// writes one token to every output channel. Segment lists are built once
/// and shared between clones; only the cursors are per clone.
#[derive(Debug, Clone)]
pub struct SyntheticTrace {
    segments: Arc<Vec<Vec<Segment>>>,
    cursors: Vec<usize>,
}

impl SyntheticTrace {
    pub fn new(app: &Application, config: &WorkloadConfig) -> Self {
        let mut rng = DcRng::seed_from_u64(config.seed);
        let jitter = config.jitter.clamp(0.0, 1.0);

        let segments = (0..app.num_processes())
            .map(|process| {
                let scale = 1.0 + jitter * (2.0 * rng.random::<f64>() - 1.0);
                let cycles = ((config.base_cycles as f64) * scale).round().max(1.0) as u64;
                let inputs = app.inputs(process);
                let outputs = app.outputs(process);

                let mut trace = Vec::with_capacity(config.iterations * (inputs.len() + outputs.len() + 1));
                for _ in 0..config.iterations {
                    for &channel in &inputs {
                        trace.push(Segment::Read { channel, tokens: 1 });
                    }
                    trace.push(Segment::Compute { cycles });
                    for &channel in &outputs {
                        trace.push(Segment::Write { channel, tokens: 1 });
                    }
                }
                trace
            })
            .collect::<Vec<_>>();

        let n = segments.len();
        SyntheticTrace {
            segments: Arc::new(segments),
            cursors: vec![0; n],
        }
    }

    /// Explicit per-process segment lists
    pub fn from_segments(segments: Vec<Vec<Segment>>) -> Self {
        let n = segments.len();
        SyntheticTrace {
            segments: Arc::new(segments),
            cursors: vec![0; n],
        }
    }

    /// Total compute cycles of `process`
    pub fn total_cycles(&self, process: usize) -> u64 {
        self.segments.get(process)
            .map(|trace| {
                trace.iter()
                    .map(|s| match s {
                        Segment::Compute { cycles } => *cycles,
                        _ => 0,
                    })
                    .sum()
            })
            .unwrap_or(0)
    }
}

impl TraceGenerator for SyntheticTrace {
    fn next_segment(&mut self, process: usize) -> Option<Segment> {
        let cursor = self.cursors.get_mut(process)?;
        let segment = self.segments.get(process)?.get(*cursor).copied();
        if segment.is_some() {
            *cursor += 1;
        }
        segment
    }

    fn reset(&mut self) {
        self.cursors.iter_mut().for_each(|c| *c = 0);
    }

    fn box_clone(&self) -> Box<dyn TraceGenerator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_trace_structure() {
        let app = Application::pipeline(3);
        let config = WorkloadConfig { iterations: 2, jitter: 0.0, ..Default::default() };
        let mut trace = SyntheticTrace::new(&app, &config);

        // middle stage: read, compute, write per firing
        let middle: Vec<Segment> = std::iter::from_fn(|| trace.next_segment(1)).collect();
        assert_eq!(middle.len(), 6);
        assert_eq!(middle[0], Segment::Read { channel: 0, tokens: 1 });
        assert_eq!(middle[1], Segment::Compute { cycles: 100_000 });
        assert_eq!(middle[2], Segment::Write { channel: 1, tokens: 1 });
        assert_eq!(trace.next_segment(1), None);
    }

    #[test]
    fn test_clones_have_independent_cursors() {
        let app = Application::pipeline(2);
        let mut original = SyntheticTrace::new(&app, &WorkloadConfig::default());
        let first = original.next_segment(0);

        let mut copy = original.box_clone();
        copy.reset();
        assert_eq!(copy.next_segment(0), first);
        assert_ne!(original.next_segment(0), first);
    }

    #[test]
    fn test_same_seed_same_costs() {
        let app = Application::fork_join(4);
        let config = WorkloadConfig::default();
        let a = SyntheticTrace::new(&app, &config);
        let b = SyntheticTrace::new(&app, &config);
        for p in 0..app.num_processes() {
            assert_eq!(a.total_cycles(p), b.total_cycles(p));
        }
    }
}
