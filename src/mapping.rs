//! Mappings of KPN applications onto platforms
//!
//! A mapping places every process on a processor and picks a communication
//! primitive for every channel. Channel primitives are derived from the process
//! placement by [`CommunicationMapper`], so the process placement alone is what
//! the search explores.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DseError, DseResult};
use crate::kpn::Application;
use crate::platform::Platform;
use crate::representation::DcRng;

/// Concrete process->processor and channel->primitive assignment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mapping {
    pub process_to_pe: Vec<usize>,
    pub channel_to_primitive: Vec<usize>,
}

/// Canonical, hashable identity of a mapping (cache key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingKey(pub Vec<usize>);

impl Mapping {
    pub fn key(&self) -> MappingKey {
        let mut key = Vec::with_capacity(self.process_to_pe.len() + self.channel_to_primitive.len());
        key.extend_from_slice(&self.process_to_pe);
        key.extend_from_slice(&self.channel_to_primitive);
        MappingKey(key)
    }

    /// Structural validation against the application and platform
    pub fn check(&self, app: &Application, platform: &Platform) -> DseResult<()> {
        if self.process_to_pe.len() != app.num_processes() {
            return Err(DseError::Structural {
                kind: "process",
                index: self.process_to_pe.len(),
            });
        }
        if self.channel_to_primitive.len() != app.num_channels() {
            return Err(DseError::Structural {
                kind: "channel",
                index: self.channel_to_primitive.len(),
            });
        }
        if let Some(&pe) = self.process_to_pe.iter().find(|&&pe| pe >= platform.num_processors()) {
            return Err(DseError::Structural { kind: "processor", index: pe });
        }
        for (ch, &prim) in self.channel_to_primitive.iter().enumerate() {
            if prim >= platform.primitives.len() {
                return Err(DseError::Structural { kind: "primitive", index: prim });
            }
            let channel = &app.channels[ch];
            if channel.source >= app.num_processes() || channel.sink >= app.num_processes() {
                return Err(DseError::Structural { kind: "process", index: channel.source.max(channel.sink) });
            }
            let src = self.process_to_pe[channel.source];
            let dst = self.process_to_pe[channel.sink];
            if !platform.connects(prim, src, dst) {
                return Err(DseError::Structural { kind: "channel route", index: ch });
            }
        }
        Ok(())
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "({})", parts.join(","))
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Picks channel primitives for a given process placement
pub struct CommunicationMapper;

impl CommunicationMapper {
    /// Complete a process placement into a full mapping
    pub fn complete(app: &Application, platform: &Platform, process_to_pe: Vec<usize>) -> DseResult<Mapping> {
        if process_to_pe.len() != app.num_processes() {
            return Err(DseError::Structural { kind: "process", index: process_to_pe.len() });
        }
        if let Some(&pe) = process_to_pe.iter().find(|&&pe| pe >= platform.num_processors()) {
            return Err(DseError::Structural { kind: "processor", index: pe });
        }

        let mut channel_to_primitive = Vec::with_capacity(app.num_channels());
        for (ch, channel) in app.channels.iter().enumerate() {
            let src = *process_to_pe.get(channel.source)
                .ok_or(DseError::Structural { kind: "process", index: channel.source })?;
            let dst = *process_to_pe.get(channel.sink)
                .ok_or(DseError::Structural { kind: "process", index: channel.sink })?;
            let prim = platform.primitive_for(src, dst)
                .ok_or(DseError::Structural { kind: "channel route", index: ch })?;
            channel_to_primitive.push(prim);
        }

        Ok(Mapping {
            process_to_pe,
            channel_to_primitive,
        })
    }
}

/// Uniformly random process placement
pub struct RandomPartialMapper<'a> {
    app: &'a Application,
    platform: &'a Platform,
}

impl<'a> RandomPartialMapper<'a> {
    pub fn new(app: &'a Application, platform: &'a Platform) -> Self {
        RandomPartialMapper { app, platform }
    }

    pub fn generate(&self, rng: &mut DcRng) -> DseResult<Mapping> {
        let n_pe = self.platform.num_processors();
        if n_pe == 0 {
            return Err(DseError::config("platform has no processors"));
        }
        let placement = (0..self.app.num_processes())
            .map(|_| rng.random_range(0..n_pe))
            .collect();
        CommunicationMapper::complete(self.app, self.platform, placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_complete_picks_cheapest_primitive() {
        let app = Application::pipeline(3);
        let platform = Platform::big_little(2, 2);
        let mapping = CommunicationMapper::complete(&app, &platform, vec![0, 0, 3]).unwrap();
        assert_eq!(mapping.channel_to_primitive, vec![0, 2]);
        assert!(mapping.check(&app, &platform).is_ok());
    }

    #[test]
    fn test_structural_errors() {
        let app = Application::pipeline(3);
        let platform = Platform::homogeneous(2, 1_000_000_000);
        let err = CommunicationMapper::complete(&app, &platform, vec![0, 5, 1]).unwrap_err();
        assert!(matches!(err, DseError::Structural { kind: "processor", index: 5 }));

        let bad = Mapping { process_to_pe: vec![0, 1], channel_to_primitive: vec![2, 2] };
        assert!(matches!(bad.check(&app, &platform), Err(DseError::Structural { kind: "process", .. })));

        // local primitive cannot bridge two processors
        let bad_route = Mapping { process_to_pe: vec![0, 1, 1], channel_to_primitive: vec![0, 0] };
        assert!(matches!(bad_route.check(&app, &platform), Err(DseError::Structural { kind: "channel route", index: 0 })));
    }

    #[test]
    fn test_key_is_deterministic() {
        let app = Application::fork_join(2);
        let platform = Platform::homogeneous(4, 1_000_000_000);
        let a = CommunicationMapper::complete(&app, &platform, vec![0, 1, 2, 3]).unwrap();
        let b = CommunicationMapper::complete(&app, &platform, vec![0, 1, 2, 3]).unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "(0,1,2,3,1,1,1,1)");
    }

    #[test]
    fn test_random_mapper_in_range() {
        let app = Application::pipeline(6);
        let platform = Platform::homogeneous(3, 1_000_000_000);
        let mapper = RandomPartialMapper::new(&app, &platform);
        let mut rng = DcRng::seed_from_u64(7);
        for _ in 0..20 {
            let m = mapper.generate(&mut rng).unwrap();
            assert!(m.check(&app, &platform).is_ok());
        }
    }
}
