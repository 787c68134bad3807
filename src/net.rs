//! The concrete wire transport: a UDP sender carrying
//! `bincode`-encoded frames, plus a small directory resolving opaque
//! [`ProcessId`](crate::membership::ProcessId)s to `SocketAddr`s so the core
//! engine never depends on the transport's address type.
//!
//! Grounded directly in this codebase's `Udp` sender: fire-and-forget,
//! best-effort `send_to` in a spawned task, with the same one-way-no-error-
//! propagation shape — `SendMessage` is, by definition, an unreliable net
//! interface.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

use crate::membership::{Ping, PingAnswer, ProcessId};

pub trait SendMessage<A, M> {
    fn send(&mut self, dest: A, message: M) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct Udp(pub Arc<tokio::net::UdpSocket>);

impl Udp {
    pub async fn recv_session(
        &self,
        mut on_buf: impl FnMut(&[u8]) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        let mut buf = vec![0; 1 << 16];
        loop {
            let (len, _) = self.0.recv_from(&mut buf).await?;
            on_buf(&buf[..len])?
        }
    }
}

impl<M: Serialize> SendMessage<SocketAddr, M> for Udp {
    fn send(&mut self, dest: SocketAddr, message: M) -> anyhow::Result<()> {
        let buf = bincode::serialize(&message)?;
        let socket = self.0.clone();
        // fire-and-forget: by definition `SendMessage` is a one-way,
        // unreliable net interface, so a failed `send_to` is just a dropped
        // message, not an error worth propagating.
        tokio::spawn(async move {
            if let Err(err) = socket.send_to(&buf, dest).await {
                warn!(%dest, %err, "udp send failed");
            }
        });
        Ok(())
    }
}

pub fn decode<M: DeserializeOwned>(buf: &[u8]) -> anyhow::Result<M> {
    Ok(bincode::deserialize(buf)?)
}

/// Resolves a [`ProcessId`] to the `SocketAddr` it is currently reachable at.
/// The core engine addresses peers by `ProcessId`; this directory is the
/// binary-only glue that turns that into an actual UDP destination.
#[derive(Debug, Clone, Default)]
pub struct Directory(HashMap<ProcessId, SocketAddr>);

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ProcessId, addr: SocketAddr) {
        self.0.insert(id, addr);
    }

    pub fn get(&self, id: &ProcessId) -> Option<SocketAddr> {
        self.0.get(id).copied()
    }
}

/// A [`Udp`] transport addressed by [`ProcessId`] through a [`Directory`].
/// Destinations missing from the directory are silently dropped, consistent
/// with the rest of this protocol's tolerance of best-effort delivery.
#[derive(Debug, Clone)]
pub struct DirectedUdp {
    pub udp: Udp,
    pub directory: Directory,
}

/// The framing wrapper [`DirectedUdp`] sends over the wire: since both
/// `Ping` and `PingAnswer` share one socket, the receiver needs a tag to know
/// which one it decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Envelope {
    Ping(Ping),
    PingAnswer(PingAnswer),
}

impl DirectedUdp {
    fn send_envelope(&mut self, dest: ProcessId, envelope: Envelope) -> anyhow::Result<()> {
        match self.directory.get(&dest) {
            Some(addr) => self.udp.send(addr, envelope),
            None => {
                warn!(%dest, "no known address for destination, dropping message");
                Ok(())
            }
        }
    }
}

impl SendMessage<ProcessId, Ping> for DirectedUdp {
    fn send(&mut self, dest: ProcessId, message: Ping) -> anyhow::Result<()> {
        self.send_envelope(dest, Envelope::Ping(message))
    }
}

impl SendMessage<ProcessId, PingAnswer> for DirectedUdp {
    fn send(&mut self, dest: ProcessId, message: PingAnswer) -> anyhow::Result<()> {
        self.send_envelope(dest, Envelope::PingAnswer(message))
    }
}
