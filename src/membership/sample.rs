//! Bounded random sampling of a register for the gossip payload.

use std::collections::BTreeMap;

use rand::{seq::SliceRandom, Rng};

use super::{
    register::{SampleMap, Tag},
    ProcessId,
};

pub const SAMPLE_SIZE: usize = 20;

/// Draws a uniformly chosen subset of at most `sample_size` entries from
/// `register`, without replacement. Returns the full register if it holds
/// `sample_size` entries or fewer.
pub fn sample<R: Rng + ?Sized>(
    register: &BTreeMap<ProcessId, Tag>,
    sample_size: usize,
    rng: &mut R,
) -> SampleMap {
    if register.len() <= sample_size {
        return register.iter().map(|(p, t)| (p.clone(), *t)).collect();
    }
    register
        .iter()
        .map(|(p, t)| (p.clone(), *t))
        .collect::<Vec<_>>()
        .choose_multiple(rng, sample_size)
        .cloned()
        .collect()
}
