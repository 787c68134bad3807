//! The two add/remove registers, their monotonic generation counter, and the
//! CRDT merge rule.
//!
//! The two dominance rules are deliberately asymmetric: a local mark resolves
//! a conflict with the opposite register by comparing audit *timestamps*,
//! while a merge resolves the same conflict by comparing *generations*. This
//! mirrors the observed reference behavior and is preserved rather than
//! normalized; see DESIGN.md.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::ProcessId;

/// Audit-only sentinel timestamp for a process's own `added` entry when it
/// joins via bootstrap (through a seed) rather than creating the group: the
/// true wall-clock moment of admission is unknown to anyone but the seed.
pub const BOOTSTRAP_TIMESTAMP: f64 = -1.0;

/// `(timestamp, generation)`. `timestamp` is audit-only; `generation` is the
/// only field ever used for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub timestamp: f64,
    pub generation: u64,
}

/// The bounded gossip payload shape: a mapping from process to tag, carried
/// in PING/PING_ANSWER.
pub type SampleMap = HashMap<ProcessId, Tag>;

/// The two CRDT registers plus the generation counter and time watermark.
#[derive(Debug, Default)]
pub struct Registers {
    added: BTreeMap<ProcessId, Tag>,
    removed: BTreeMap<ProcessId, Tag>,
    generation: u64,
    watermark: u64,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn added(&self) -> &BTreeMap<ProcessId, Tag> {
        &self.added
    }

    pub fn removed(&self) -> &BTreeMap<ProcessId, Tag> {
        &self.removed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The highest generation ever observed, locally created or merged in.
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.watermark = self.watermark.max(self.generation);
        self.generation
    }

    /// Records a local observation that `p` is a member. Dominance over an
    /// existing `removed` entry is decided by comparing audit timestamps.
    pub fn mark_added(&mut self, p: ProcessId, timestamp: f64) -> Tag {
        let generation = self.next_generation();
        let tag = Tag {
            timestamp,
            generation,
        };
        if let Some(removed) = self.removed.get(&p) {
            if timestamp > removed.timestamp {
                self.removed.remove(&p);
            }
        }
        trace!(%p, generation, timestamp, "marked added");
        self.added.insert(p, tag);
        tag
    }

    /// Records a local observation that `p` has left. Dominance over an
    /// existing `added` entry is decided by comparing generations.
    pub fn mark_removed(&mut self, p: ProcessId, timestamp: f64) -> Tag {
        let generation = self.next_generation();
        let tag = Tag {
            timestamp,
            generation,
        };
        if let Some(added) = self.added.get(&p) {
            if generation > added.generation {
                self.added.remove(&p);
            }
        }
        trace!(%p, generation, timestamp, "marked removed");
        self.removed.insert(p, tag);
        tag
    }

    /// The CRDT merge: every entry in either sample that carries a higher
    /// generation than what is locally known overwrites the local entry, and
    /// deletes the opposite register's entry if it is now dominated. Both
    /// directions compare on generation, unlike the local-mark dominance
    /// rules above.
    pub fn merge(&mut self, added_sample: &SampleMap, removed_sample: &SampleMap, remote_time: u64) {
        trace!(
            added_entries = added_sample.len(),
            removed_entries = removed_sample.len(),
            remote_time,
            "merging sample"
        );
        self.watermark = self.watermark.max(remote_time);
        for (p, tag) in added_sample {
            let current = self.added.get(p).map(|t| t.generation);
            if current.map_or(true, |g| tag.generation > g) {
                self.added.insert(p.clone(), *tag);
                trace!(%p, generation = tag.generation, "merged into added");
                if let Some(removed) = self.removed.get(p) {
                    if removed.generation < tag.generation {
                        self.removed.remove(p);
                    }
                }
            }
        }
        for (p, tag) in removed_sample {
            let current = self.removed.get(p).map(|t| t.generation);
            if current.map_or(true, |g| tag.generation > g) {
                self.removed.insert(p.clone(), *tag);
                trace!(%p, generation = tag.generation, "merged into removed");
                if let Some(added) = self.added.get(p) {
                    if added.generation < tag.generation {
                        self.added.remove(p);
                    }
                }
            }
        }
        self.watermark = self.watermark.max(self.generation);
    }
}
