//! Discrete-Event KPN Simulation
//!
//! This is the execution-time oracle behind simulation-backed feasibility.
//! It models:
//! - One non-preemptive FIFO scheduler per processor
//! - Blocking reads on empty channels
//! - Token transfer delays from the mapped communication primitive
//! - Compute time from cycles and processor frequency

use std::collections::{BinaryHeap, VecDeque};

use crate::error::{DseError, DseResult};
use crate::kpn::Application;
use crate::mapping::Mapping;
use crate::platform::Platform;
use crate::trace::{Segment, TraceGenerator};

/// Turns (application, platform, mapping, trace) into an execution time
pub trait Simulator: Send + Sync {
    /// Execution time in picoseconds. `trace` must be a fresh, reset clone.
    fn simulate(
        &self,
        app: &Application,
        platform: &Platform,
        mapping: &Mapping,
        trace: &mut dyn TraceGenerator,
    ) -> DseResult<u64>;
}

/// Events that can occur in the simulation
#[derive(Debug, Clone)]
enum Event {
    /// Processor looks for a ready process
    Dispatch { pe: usize },
    /// Compute segment of `process` finished on `pe`
    SegmentDone { pe: usize, process: usize },
    /// Tokens written earlier reach the channel FIFO
    TokensArrive { channel: usize, tokens: u64 },
}

/// Scheduled event with timestamp
#[derive(Debug, Clone)]
struct ScheduledEvent {
    time_ps: u64,
    /// Insertion order, keeps simultaneous events deterministic
    seq: u64,
    event: Event,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time_ps == other.time_ps && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse for min-heap behavior
        other.time_ps.cmp(&self.time_ps)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessStatus {
    Ready,
    Running,
    Blocked { channel: usize, tokens: u64 },
    Done,
}

/// Summary of one simulation run
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimulationReport {
    /// Completion time of the last process
    pub exec_time_ps: u64,
    pub events_processed: u64,
    pub tokens_transferred: u64,
    /// Busy time per processor
    pub busy_ps: Vec<u64>,
}

impl SimulationReport {
    /// Busy fraction of processor `pe`
    pub fn utilization(&self, pe: usize) -> f64 {
        if self.exec_time_ps == 0 {
            return 0.0;
        }
        self.busy_ps.get(pe).copied().unwrap_or(0) as f64 / self.exec_time_ps as f64
    }
}

impl std::fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║                    KPN Mapping Simulation                    ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Execution Time:          {:>14.3} ms                   ║", self.exec_time_ps as f64 / 1e9)?;
        writeln!(f, "║ Events Processed:        {:>14}                      ║", self.events_processed)?;
        writeln!(f, "║ Tokens Transferred:      {:>14}                      ║", self.tokens_transferred)?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        for pe in 0..self.busy_ps.len() {
            writeln!(f, "║ PE {:>3} Utilization:       {:>12.2}%                      ║", pe, self.utilization(pe) * 100.0)?;
        }
        writeln!(f, "╚══════════════════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

/// Discrete-event simulator for KPN mappings
#[derive(Debug, Clone, Default)]
pub struct KpnSimulator;

impl KpnSimulator {
    pub fn new() -> Self {
        KpnSimulator
    }

    /// Simulate and return the full report
    pub fn run(
        &self,
        app: &Application,
        platform: &Platform,
        mapping: &Mapping,
        trace: &mut dyn TraceGenerator,
    ) -> DseResult<SimulationReport> {
        mapping.check(app, platform)?;
        let mut engine = SimulationEngine::new(app, platform, mapping, trace);
        engine.run()?;
        Ok(engine.report())
    }
}

impl Simulator for KpnSimulator {
    fn simulate(
        &self,
        app: &Application,
        platform: &Platform,
        mapping: &Mapping,
        trace: &mut dyn TraceGenerator,
    ) -> DseResult<u64> {
        self.run(app, platform, mapping, trace).map(|r| r.exec_time_ps)
    }
}

/// State of a single simulation run
struct SimulationEngine<'a> {
    app: &'a Application,
    platform: &'a Platform,
    mapping: &'a Mapping,
    trace: &'a mut dyn TraceGenerator,

    now: u64,
    next_seq: u64,
    event_queue: BinaryHeap<ScheduledEvent>,

    status: Vec<ProcessStatus>,
    /// Segment that could not complete yet (a blocked read)
    pending: Vec<Option<Segment>>,
    /// Tokens available per channel
    fifo: Vec<u64>,
    /// Process currently occupying each processor
    running: Vec<Option<usize>>,
    ready: Vec<VecDeque<usize>>,

    // Statistics
    finish_time: u64,
    events_processed: u64,
    tokens_transferred: u64,
    busy_ps: Vec<u64>,
}

impl<'a> SimulationEngine<'a> {
    fn new(
        app: &'a Application,
        platform: &'a Platform,
        mapping: &'a Mapping,
        trace: &'a mut dyn TraceGenerator,
    ) -> Self {
        let n_proc = app.num_processes();
        let n_pe = platform.num_processors();

        let mut ready = vec![VecDeque::new(); n_pe];
        for (process, &pe) in mapping.process_to_pe.iter().enumerate() {
            ready[pe].push_back(process);
        }

        SimulationEngine {
            app,
            platform,
            mapping,
            trace,
            now: 0,
            next_seq: 0,
            event_queue: BinaryHeap::new(),
            status: vec![ProcessStatus::Ready; n_proc],
            pending: vec![None; n_proc],
            fifo: vec![0; app.num_channels()],
            running: vec![None; n_pe],
            ready,
            finish_time: 0,
            events_processed: 0,
            tokens_transferred: 0,
            busy_ps: vec![0; n_pe],
        }
    }

    fn schedule(&mut self, delay: u64, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent {
            time_ps: self.now.saturating_add(delay),
            seq,
            event,
        });
    }

    fn run(&mut self) -> DseResult<()> {
        for pe in 0..self.running.len() {
            self.schedule(0, Event::Dispatch { pe });
        }

        while let Some(scheduled) = self.event_queue.pop() {
            self.now = scheduled.time_ps;
            self.events_processed += 1;
            self.process_event(scheduled.event)?;
        }

        let blocked = self.status.iter()
            .filter(|s| **s != ProcessStatus::Done)
            .count();
        if blocked > 0 {
            return Err(DseError::Deadlock { time_ps: self.now, blocked });
        }
        Ok(())
    }

    fn process_event(&mut self, event: Event) -> DseResult<()> {
        match event {
            Event::Dispatch { pe } => self.dispatch(pe),
            Event::SegmentDone { pe, process } => {
                self.run_process(pe, process)?;
                self.dispatch(pe)
            }
            Event::TokensArrive { channel, tokens } => {
                self.fifo[channel] += tokens;
                let sink = self.app.channels[channel].sink;
                if let ProcessStatus::Blocked { channel: waiting_on, tokens: needed } = self.status[sink] {
                    if waiting_on == channel && self.fifo[channel] >= needed {
                        self.status[sink] = ProcessStatus::Ready;
                        let pe = self.mapping.process_to_pe[sink];
                        self.ready[pe].push_back(sink);
                        self.dispatch(pe)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Hand an idle processor its next ready process
    fn dispatch(&mut self, pe: usize) -> DseResult<()> {
        while self.running[pe].is_none() {
            let Some(process) = self.ready[pe].pop_front() else {
                break;
            };
            self.running[pe] = Some(process);
            self.run_process(pe, process)?;
        }
        Ok(())
    }

    /// Execute segments of `process` until it computes, blocks or ends
    fn run_process(&mut self, pe: usize, process: usize) -> DseResult<()> {
        loop {
            let segment = match self.pending[process].take() {
                Some(segment) => Some(segment),
                None => self.trace.next_segment(process),
            };

            match segment {
                None => {
                    self.status[process] = ProcessStatus::Done;
                    self.finish_time = self.finish_time.max(self.now);
                    self.running[pe] = None;
                    return Ok(());
                }
                Some(Segment::Compute { cycles }) => {
                    let duration = self.platform.compute_ps(pe, cycles);
                    self.busy_ps[pe] += duration;
                    self.status[process] = ProcessStatus::Running;
                    self.schedule(duration, Event::SegmentDone { pe, process });
                    return Ok(());
                }
                Some(Segment::Write { channel, tokens }) => {
                    let token_size = self.channel_of(process, channel, true)?;
                    let prim = self.mapping.channel_to_primitive[channel];
                    let delay = self.platform.primitives[prim].cost_ps(tokens * token_size);
                    self.tokens_transferred += tokens;
                    self.schedule(delay, Event::TokensArrive { channel, tokens });
                }
                Some(Segment::Read { channel, tokens }) => {
                    self.channel_of(process, channel, false)?;
                    if self.fifo[channel] >= tokens {
                        self.fifo[channel] -= tokens;
                    } else {
                        self.pending[process] = segment;
                        self.status[process] = ProcessStatus::Blocked { channel, tokens };
                        self.running[pe] = None;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Validates that `process` is the writer (or reader) of `channel`; returns the token size
    fn channel_of(&self, process: usize, channel: usize, writer: bool) -> DseResult<u64> {
        let ch = self.app.channels.get(channel)
            .ok_or(DseError::Structural { kind: "channel", index: channel })?;
        let endpoint = if writer { ch.source } else { ch.sink };
        if endpoint != process {
            return Err(DseError::Structural { kind: "channel", index: channel });
        }
        Ok(ch.token_size)
    }

    fn report(&self) -> SimulationReport {
        SimulationReport {
            exec_time_ps: self.finish_time,
            events_processed: self.events_processed,
            tokens_transferred: self.tokens_transferred,
            busy_ps: self.busy_ps.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::CommunicationMapper;
    use crate::trace::{SyntheticTrace, WorkloadConfig};

    fn flat_workload(iterations: usize) -> WorkloadConfig {
        WorkloadConfig {
            iterations,
            base_cycles: 1_000,
            jitter: 0.0,
            seed: 0,
        }
    }

    #[test]
    fn test_single_process() {
        let app = Application::pipeline(1);
        let platform = Platform::homogeneous(1, 1_000_000_000);
        let mapping = CommunicationMapper::complete(&app, &platform, vec![0]).unwrap();
        let mut trace = SyntheticTrace::new(&app, &flat_workload(3));

        let report = KpnSimulator::new().run(&app, &platform, &mapping, &mut trace).unwrap();
        // 3 firings of 1000 cycles at 1 GHz
        assert_eq!(report.exec_time_ps, 3_000_000);
        assert!((report.utilization(0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pipeline_overlaps_on_two_processors() {
        let app = Application::pipeline(2);
        let platform = Platform::homogeneous(2, 1_000_000_000);
        let workload = flat_workload(10);
        let sim = KpnSimulator::new();

        let shared = CommunicationMapper::complete(&app, &platform, vec![0, 0]).unwrap();
        let split = CommunicationMapper::complete(&app, &platform, vec![0, 1]).unwrap();

        let mut trace = SyntheticTrace::new(&app, &workload);
        let t_shared = sim.simulate(&app, &platform, &shared, &mut trace).unwrap();
        let mut trace = SyntheticTrace::new(&app, &workload);
        let t_split = sim.simulate(&app, &platform, &split, &mut trace).unwrap();

        // both stages serialized on one processor: 20 firings of 1 us
        assert_eq!(t_shared, 20_000_000);
        assert!(t_split < t_shared);
    }

    #[test]
    fn test_deterministic_with_fresh_trace() {
        let app = Application::fork_join(3);
        let platform = Platform::big_little(2, 2);
        let mapping = CommunicationMapper::complete(&app, &platform, vec![0, 1, 2, 3, 0]).unwrap();
        let base = SyntheticTrace::new(&app, &WorkloadConfig::default());
        let sim = KpnSimulator::new();

        let mut first = base.box_clone();
        first.reset();
        let mut second = base.box_clone();
        second.reset();
        assert_eq!(
            sim.simulate(&app, &platform, &mapping, first.as_mut()).unwrap(),
            sim.simulate(&app, &platform, &mapping, second.as_mut()).unwrap(),
        );
    }

    #[test]
    fn test_deadlock_detected() {
        let app = Application::pipeline(2);
        let platform = Platform::homogeneous(1, 1_000_000_000);
        let mapping = CommunicationMapper::complete(&app, &platform, vec![0, 0]).unwrap();
        // reader wants two tokens, writer only ever produces one
        let mut trace = SyntheticTrace::from_segments(vec![
            vec![Segment::Write { channel: 0, tokens: 1 }],
            vec![Segment::Read { channel: 0, tokens: 2 }],
        ]);
        let err = KpnSimulator::new().simulate(&app, &platform, &mapping, &mut trace).unwrap_err();
        assert!(matches!(err, DseError::Deadlock { blocked: 1, .. }));
    }

    #[test]
    fn test_invalid_mapping_is_structural() {
        let app = Application::pipeline(2);
        let platform = Platform::homogeneous(2, 1_000_000_000);
        let mapping = Mapping { process_to_pe: vec![0, 7], channel_to_primitive: vec![2] };
        let mut trace = SyntheticTrace::new(&app, &flat_workload(1));
        let err = KpnSimulator::new().simulate(&app, &platform, &mapping, &mut trace).unwrap_err();
        assert!(matches!(err, DseError::Structural { kind: "processor", index: 7 }));
    }
}
