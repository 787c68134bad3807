//! `census`: a SWIM-style gossip failure detector over a CRDT add/remove
//! membership register.
//!
//! The protocol engine lives in [`membership`]; [`event`] is the host
//! runtime abstraction (`OnEvent`/`SendEvent`/`Timer`) it is driven through,
//! and [`net`] is the concrete transport the node binary wires it to. The
//! engine itself never depends on either concrete implementation — it is
//! generic over them, so tests can substitute an in-process simulated
//! transport and a manually-stepped timer instead.

pub mod event;
pub mod membership;
pub mod net;

pub use membership::{Config, Event, GroupMember, Members, Ping, PingAnswer, ProcessId};
pub use net::Envelope;
