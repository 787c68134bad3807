//! The derived "currently alive" projection.
//!
//! Computed on demand from the two registers rather than maintained as a
//! separately-mutated cache: recomputing from scratch is O(members) — cheap
//! next to a network round trip — and sidesteps an entire class of
//! cache/register divergence bugs the reference implementation's incrementally
//! maintained `_active` set is prone to (its `_active.add(sender)` calls after
//! a merge are redundant once the set is always derived fresh).

use std::collections::BTreeSet;

use super::{register::Registers, ProcessId};

/// `{ p : p ∈ keys(added) and (p ∉ keys(removed) or added[p].generation >
/// removed[p].generation) }`.
pub fn active_members(registers: &Registers) -> BTreeSet<ProcessId> {
    registers
        .added()
        .iter()
        .filter(|(p, added)| match registers.removed().get(*p) {
            None => true,
            Some(removed) => added.generation > removed.generation,
        })
        .map(|(p, _)| p.clone())
        .collect()
}
