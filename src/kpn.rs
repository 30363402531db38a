//! Kahn Process Network Application Model
//!
//! Processes communicate exclusively through point-to-point FIFO channels.
//! Indices into `processes` and `channels` are what mappings and traces refer to.

use serde::{Deserialize, Serialize};

/// A dataflow application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub processes: Vec<String>,
    pub channels: Vec<Channel>,
}

/// A FIFO channel from one writer process to one reader process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    /// Index of the writing process
    pub source: usize,
    /// Index of the reading process
    pub sink: usize,
    /// Bytes per token
    pub token_size: u64,
}

impl Application {
    pub fn new(name: &str) -> Self {
        Application {
            name: name.to_string(),
            processes: Vec::new(),
            channels: Vec::new(),
        }
    }

    /// Add a process and return its index
    pub fn add_process(&mut self, name: &str) -> usize {
        self.processes.push(name.to_string());
        self.processes.len() - 1
    }

    /// Add a channel and return its index
    pub fn add_channel(&mut self, name: &str, source: usize, sink: usize, token_size: u64) -> usize {
        self.channels.push(Channel {
            name: name.to_string(),
            source,
            sink,
            token_size,
        });
        self.channels.len() - 1
    }

    pub fn num_processes(&self) -> usize {
        self.processes.len()
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Channels read by `process`, in channel order
    pub fn inputs(&self, process: usize) -> Vec<usize> {
        self.channels.iter()
            .enumerate()
            .filter(|(_, c)| c.sink == process)
            .map(|(i, _)| i)
            .collect()
    }

    /// Channels written by `process`, in channel order
    pub fn outputs(&self, process: usize) -> Vec<usize> {
        self.channels.iter()
            .enumerate()
            .filter(|(_, c)| c.source == process)
            .map(|(i, _)| i)
            .collect()
    }

    /// Linear chain `src -> stage_1 -> ... -> sink` with `n` processes
    pub fn pipeline(n: usize) -> Self {
        let mut app = Application::new(&format!("pipeline_{}", n));
        for i in 0..n {
            app.add_process(&format!("stage_{}", i));
        }
        for i in 1..n {
            app.add_channel(&format!("c_{}_{}", i - 1, i), i - 1, i, 64);
        }
        app
    }

    /// One splitter feeding `width` workers that a joiner collects
    pub fn fork_join(width: usize) -> Self {
        let mut app = Application::new(&format!("fork_join_{}", width));
        let fork = app.add_process("fork");
        let workers: Vec<usize> = (0..width)
            .map(|i| app.add_process(&format!("worker_{}", i)))
            .collect();
        let join = app.add_process("join");
        for (i, &w) in workers.iter().enumerate() {
            app.add_channel(&format!("scatter_{}", i), fork, w, 256);
            app.add_channel(&format!("gather_{}", i), w, join, 32);
        }
        app
    }
}
