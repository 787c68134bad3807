//! SWIM-style gossip failure detector over a CRDT add/remove membership
//! register.
//!
//! Deliberately out of scope of this module: the concrete message transport,
//! the timer service, the randomness source, and the local control surface
//! that injects commands and answers queries. [`engine::GroupMember`] is
//! generic over those as injected capabilities; see `crate::net` and
//! `crate::event` for the concrete instances this crate wires up outside of
//! tests.

pub mod active;
pub mod config;
pub mod engine;
pub mod register;
pub mod sample;
pub mod suspicion;
pub mod wire;

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque identifier, globally unique per process instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProcessId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ProcessId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

pub use config::Config;
pub use engine::{Event, GroupMember, MemberNet, MemberUpcall};
pub use register::{Registers, Tag, BOOTSTRAP_TIMESTAMP};
pub use wire::{Members, Ping, PingAnswer};
