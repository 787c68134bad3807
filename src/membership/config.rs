//! Tunable parameters, constructible via [`Default`] or overridden by
//! the node binary's CLI flags.

use std::time::Duration;

/// Probe period, suspicion multiplier, indirect fan-out, and gossip sample
/// bound — the only knobs the protocol exposes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// `T`: period between direct probes.
    pub probe_period: Duration,
    /// `S`: a suspicion timeout is `probe_period * suspicion_multiplier`.
    pub suspicion_multiplier: u32,
    /// `K`: number of indirect retransmitters, and the number of redundant
    /// bootstrap PINGs sent to a seed on JOIN.
    pub indirect_fanout: usize,
    /// Maximum number of entries drawn per register per gossip sample.
    pub sample_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_period: Duration::from_secs_f64(5.0),
            suspicion_multiplier: 3,
            indirect_fanout: 2,
            sample_size: super::sample::SAMPLE_SIZE,
        }
    }
}

impl Config {
    pub fn suspicion_timeout(&self) -> Duration {
        self.probe_period.mul_f64(self.suspicion_multiplier as f64)
    }
}
