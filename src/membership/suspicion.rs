//! The per-target suspicion lifecycle: absent / awaiting-direct /
//! awaiting-indirect, with indirect retransmission through K helpers.
//!
//! The map only ever holds entries keyed by `TimerId` returned by the host
//! runtime for the in-flight `ping_<target>` timer, so clearing a target
//! always cancels exactly the timer that was armed for it — the typed
//! rewrite of the reference protocol's `"ping_" + target_id` string timer
//! name.

use std::collections::HashMap;

use crate::event::TimerId;

use super::ProcessId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspicionState {
    AwaitingDirect,
    AwaitingIndirect,
}

#[derive(Debug, Default)]
pub struct SuspicionMap(HashMap<ProcessId, (SuspicionState, TimerId)>);

impl SuspicionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: &ProcessId) -> Option<(SuspicionState, TimerId)> {
        self.0.get(target).copied()
    }

    pub fn insert(&mut self, target: ProcessId, state: SuspicionState, timer_id: TimerId) {
        self.0.insert(target, (state, timer_id));
    }

    /// Removes and returns the entry, if any — used both when a PING_ANSWER
    /// clears suspicion and when the indirect timeout finally escalates to
    /// removal.
    pub fn remove(&mut self, target: &ProcessId) -> Option<(SuspicionState, TimerId)> {
        self.0.remove(target)
    }

    pub fn contains(&self, target: &ProcessId) -> bool {
        self.0.contains_key(target)
    }
}
