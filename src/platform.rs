//! Hardware Platform Model
//!
//! Processors grouped into clusters plus the communication primitives
//! that move tokens between them.

use serde::{Deserialize, Serialize};

/// Target platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub name: String,
    pub processors: Vec<Processor>,
    pub primitives: Vec<Primitive>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processor {
    pub name: String,
    /// Clock frequency in Hz
    pub frequency_hz: u64,
    /// Cluster id; processors in one cluster share a local interconnect
    pub cluster: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    pub name: String,
    pub reach: Reach,
    /// Fixed cost per transfer
    pub latency_ps: u64,
    /// Size-dependent cost
    pub ps_per_byte: u64,
}

/// Which processor pairs a primitive can connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reach {
    /// Writer and reader on the same processor
    SameProcessor,
    /// Writer and reader in the same cluster
    SameCluster,
    /// Any pair
    Global,
}

impl Primitive {
    /// Transfer time for `bytes` bytes
    pub fn cost_ps(&self, bytes: u64) -> u64 {
        self.latency_ps + self.ps_per_byte * bytes
    }
}

impl Platform {
    pub fn num_processors(&self) -> usize {
        self.processors.len()
    }

    /// True if primitive `prim` can carry tokens from `src` to `dst`
    pub fn connects(&self, prim: usize, src: usize, dst: usize) -> bool {
        match self.primitives[prim].reach {
            Reach::SameProcessor => src == dst,
            Reach::SameCluster => self.processors[src].cluster == self.processors[dst].cluster,
            Reach::Global => true,
        }
    }

    /// Cheapest primitive (for one 64-byte token) connecting `src` to `dst`
    pub fn primitive_for(&self, src: usize, dst: usize) -> Option<usize> {
        (0..self.primitives.len())
            .filter(|&p| self.connects(p, src, dst))
            .min_by_key(|&p| (self.primitives[p].cost_ps(64), p))
    }

    /// Compute time of `cycles` on processor `pe`
    pub fn compute_ps(&self, pe: usize, cycles: u64) -> u64 {
        let freq = self.processors[pe].frequency_hz.max(1) as u128;
        ((cycles as u128 * 1_000_000_000_000u128) / freq) as u64
    }

    /// `n` identical processors in one cluster
    pub fn homogeneous(n: usize, frequency_hz: u64) -> Self {
        Platform {
            name: format!("homogeneous_{}", n),
            processors: (0..n)
                .map(|i| Processor {
                    name: format!("pe_{}", i),
                    frequency_hz,
                    cluster: 0,
                })
                .collect(),
            primitives: Self::default_primitives(),
        }
    }

    /// Two clusters: fast `big` cores and slow `little` cores
    pub fn big_little(big: usize, little: usize) -> Self {
        let mut processors = Vec::with_capacity(big + little);
        for i in 0..big {
            processors.push(Processor {
                name: format!("big_{}", i),
                frequency_hz: 2_000_000_000,
                cluster: 0,
            });
        }
        for i in 0..little {
            processors.push(Processor {
                name: format!("little_{}", i),
                frequency_hz: 1_000_000_000,
                cluster: 1,
            });
        }
        Platform {
            name: format!("big_little_{}_{}", big, little),
            processors,
            primitives: Self::default_primitives(),
        }
    }

    fn default_primitives() -> Vec<Primitive> {
        vec![
            Primitive {
                name: "local_memory".to_string(),
                reach: Reach::SameProcessor,
                latency_ps: 5_000,
                ps_per_byte: 10,
            },
            Primitive {
                name: "cluster_l2".to_string(),
                reach: Reach::SameCluster,
                latency_ps: 40_000,
                ps_per_byte: 100,
            },
            Primitive {
                name: "shared_dram".to_string(),
                reach: Reach::Global,
                latency_ps: 200_000,
                ps_per_byte: 500,
            },
        ]
    }
}
