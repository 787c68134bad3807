//! Wire messages and local-command/reply types.
//!
//! Malformed payloads tolerate missing `added`, `removed`, or `time` fields by
//! substituting empty samples / zero, expressed with `#[serde(default)]`
//! rather than a runtime try/except: a decoder that can't find an optional
//! key simply produces the default value for that field's type.

use serde::{Deserialize, Serialize};

use super::{register::SampleMap, ProcessId};

/// A direct or (when `target` is set) indirect liveness probe, carrying a
/// gossip sample of both registers.
///
/// `from` identifies the logical sender: unlike the reference protocol, where
/// the transport address *is* the process identity, this protocol's
/// `ProcessId` is a separate namespace from the transport's socket address,
/// so the sender must self-report its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping {
    pub from: ProcessId,
    #[serde(default)]
    pub added: SampleMap,
    #[serde(default)]
    pub removed: SampleMap,
    #[serde(default)]
    pub time: u64,
    pub target: Option<ProcessId>,
}

/// The reply to a direct [`Ping`], also carrying a fresh gossip sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingAnswer {
    pub from: ProcessId,
    #[serde(default)]
    pub added: SampleMap,
    #[serde(default)]
    pub removed: SampleMap,
    #[serde(default)]
    pub time: u64,
}

/// Reply to `GET_MEMBERS` on the local outbox; member order is unspecified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Members {
    pub members: Vec<ProcessId>,
}
