//! The per-process membership engine: probe scheduling, suspicion escalation,
//! and event dispatch.
//!
//! [`GroupMember`] is generic over its collaborators — network, local-reply
//! upcall, and randomness source — exactly as this codebase's other
//! protocol state machines stay generic over `net`/`upcall` rather than
//! hardcoding a transport (compare `crate::net`'s `Udp` sender, swapped in
//! only at the binary). Nothing here raises an observable error to the host;
//! `on_event` still returns `anyhow::Result<()>` for uniformity with the rest
//! of the event-driven modules in this crate, but the only failures it can
//! actually produce are host-runtime plumbing failures (an already-cancelled
//! timer, a closed channel), never a consequence of protocol input.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{seq::SliceRandom, Rng};
use tracing::{debug, info, trace, warn};

use crate::event::{OnEvent, SendEvent, Timer, TimerId};

use super::{
    active, config::Config, register::BOOTSTRAP_TIMESTAMP, register::Registers, sample,
    suspicion::{SuspicionMap, SuspicionState},
    wire::{Members, Ping, PingAnswer},
    ProcessId,
};

/// A transport capable of carrying both wire message types to a logical
/// `ProcessId` destination.
pub trait MemberNet: crate::net::SendMessage<ProcessId, Ping> + crate::net::SendMessage<ProcessId, PingAnswer> {}
impl<T> MemberNet for T where
    T: crate::net::SendMessage<ProcessId, Ping> + crate::net::SendMessage<ProcessId, PingAnswer>
{
}

/// The local reply outbox: delivers `MEMBERS` replies to the host.
pub trait MemberUpcall: SendEvent<Members> {}
impl<T: SendEvent<Members>> MemberUpcall for T {}

/// Tagged union of the engine's input streams: local commands, wire
/// messages, and timer fires, all dispatched through one `on_event`.
#[derive(Debug, Clone)]
pub enum Event {
    Join { seed: ProcessId },
    Leave,
    GetMembers,
    Ping { from: ProcessId, ping: Ping },
    PingAnswer { from: ProcessId, answer: PingAnswer },
    PeriodicTimer,
    SuspicionTimer { target: ProcessId },
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub struct GroupMember<N, U, R> {
    id: ProcessId,
    config: Config,
    joined: bool,
    registers: Registers,
    suspicion: SuspicionMap,
    periodic_timer: Option<TimerId>,
    net: N,
    upcall: U,
    rng: R,
}

impl<N, U, R> GroupMember<N, U, R> {
    pub fn new(id: ProcessId, config: Config, net: N, upcall: U, rng: R) -> Self {
        Self {
            id,
            config,
            joined: false,
            registers: Registers::new(),
            suspicion: SuspicionMap::new(),
            periodic_timer: None,
            net,
            upcall,
            rng,
        }
    }

    pub fn id(&self) -> &ProcessId {
        &self.id
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// The only authoritative answer to `GET_MEMBERS`.
    pub fn active_members(&self) -> std::collections::BTreeSet<ProcessId> {
        active::active_members(&self.registers)
    }
}

impl<N: MemberNet, U: MemberUpcall, R: Rng> GroupMember<N, U, R> {
    fn send_ping(&mut self, dest: ProcessId, target: Option<ProcessId>) -> anyhow::Result<()> {
        let ping = Ping {
            from: self.id.clone(),
            added: sample::sample(self.registers.added(), self.config.sample_size, &mut self.rng),
            removed: sample::sample(self.registers.removed(), self.config.sample_size, &mut self.rng),
            time: self.registers.watermark(),
            target: target.clone(),
        };
        trace!(id = %self.id, %dest, target = ?target, "sending ping");
        self.net.send(dest, ping)
    }

    fn send_ping_answer(&mut self, dest: ProcessId) -> anyhow::Result<()> {
        let answer = PingAnswer {
            from: self.id.clone(),
            added: sample::sample(self.registers.added(), self.config.sample_size, &mut self.rng),
            removed: sample::sample(self.registers.removed(), self.config.sample_size, &mut self.rng),
            time: self.registers.watermark(),
        };
        trace!(id = %self.id, %dest, "sending ping answer");
        self.net.send(dest, answer)
    }

    fn arm_periodic_timer(&mut self, timer: &mut dyn Timer<Event>) -> anyhow::Result<()> {
        self.periodic_timer = Some(timer.set(self.config.probe_period, Event::PeriodicTimer)?);
        Ok(())
    }

    fn on_join(&mut self, seed: ProcessId, timer: &mut dyn Timer<Event>) -> anyhow::Result<()> {
        if seed == self.id {
            self.joined = true;
            self.registers.mark_added(self.id.clone(), now());
            self.arm_periodic_timer(timer)?;
            info!(id = %self.id, "created group as seed");
            return Ok(());
        }
        if self.joined {
            return Ok(());
        }
        self.joined = true;
        self.registers
            .mark_added(self.id.clone(), BOOTSTRAP_TIMESTAMP);
        for _ in 0..self.config.indirect_fanout {
            self.send_ping(seed.clone(), None)?;
        }
        self.arm_periodic_timer(timer)?;
        info!(id = %self.id, %seed, "joined via bootstrap");
        Ok(())
    }

    fn on_leave(&mut self, timer: &mut dyn Timer<Event>) -> anyhow::Result<()> {
        if !self.joined {
            return Ok(());
        }
        self.joined = false;
        self.registers.mark_removed(self.id.clone(), now());
        if let Some(timer_id) = self.periodic_timer.take() {
            timer.unset(timer_id)?;
        }
        info!(id = %self.id, "left group");
        Ok(())
    }

    fn on_get_members(&mut self) -> anyhow::Result<()> {
        let members = self.active_members().into_iter().collect();
        self.upcall.send(Members { members })
    }

    fn on_periodic_timer(&mut self, timer: &mut dyn Timer<Event>) -> anyhow::Result<()> {
        self.periodic_timer = None;
        if !self.joined {
            self.arm_periodic_timer(timer)?;
            return Ok(());
        }
        let active = self.active_members();
        let candidates: Vec<_> = active.into_iter().filter(|p| *p != self.id).collect();
        let Some(target) = candidates.choose(&mut self.rng).cloned() else {
            self.arm_periodic_timer(timer)?;
            return Ok(());
        };
        self.send_ping(target.clone(), None)?;
        let suspicion_timer = timer.set(
            self.config.suspicion_timeout(),
            Event::SuspicionTimer {
                target: target.clone(),
            },
        )?;
        self.suspicion
            .insert(target.clone(), SuspicionState::AwaitingDirect, suspicion_timer);
        debug!(id = %self.id, %target, "probing");
        self.arm_periodic_timer(timer)?;
        Ok(())
    }

    fn on_suspicion_timer(
        &mut self,
        target: ProcessId,
        timer: &mut dyn Timer<Event>,
    ) -> anyhow::Result<()> {
        let Some((state, _)) = self.suspicion.get(&target) else {
            return Ok(());
        };
        match state {
            SuspicionState::AwaitingDirect => {
                let active = self.active_members();
                let retransmitters: Vec<_> = active
                    .into_iter()
                    .filter(|p| *p != self.id && *p != target)
                    .take(self.config.indirect_fanout)
                    .collect();
                for retransmitter in retransmitters {
                    self.send_ping(retransmitter, Some(target.clone()))?;
                }
                let suspicion_timer = timer.set(
                    self.config.suspicion_timeout(),
                    Event::SuspicionTimer {
                        target: target.clone(),
                    },
                )?;
                self.suspicion
                    .insert(target.clone(), SuspicionState::AwaitingIndirect, suspicion_timer);
                debug!(id = %self.id, %target, "escalating to indirect probe");
            }
            SuspicionState::AwaitingIndirect => {
                self.suspicion.remove(&target);
                self.registers.mark_removed(target.clone(), now());
                warn!(id = %self.id, %target, "marked removed after indirect probe timeout");
            }
        }
        Ok(())
    }

    /// Liveness-refresh: re-admits `sender` if it is unknown, or if
    /// its `removed` entry no longer dominates its `added` entry.
    fn refresh_liveness(&mut self, sender: &ProcessId) {
        let added_generation = self.registers.added().get(sender).map(|tag| tag.generation);
        let removed_generation = self
            .registers
            .removed()
            .get(sender)
            .map(|tag| tag.generation);
        let should_refresh = match (added_generation, removed_generation) {
            (None, _) => true,
            (Some(added), Some(removed)) => removed >= added,
            (Some(_), None) => false,
        };
        trace!(id = %self.id, %sender, should_refresh, "liveness refresh");
        if should_refresh {
            self.registers.mark_added(sender.clone(), now());
        }
    }

    fn on_ping(&mut self, from: ProcessId, ping: Ping) -> anyhow::Result<()> {
        debug!(id = %self.id, %from, target = ?ping.target, "received ping");
        self.registers.merge(&ping.added, &ping.removed, ping.time);
        if let Some(target) = &ping.target {
            if *target != self.id {
                debug!(id = %self.id, %from, %target, "relaying indirect ping");
                return self.net.send(target.clone(), ping);
            }
        }
        self.refresh_liveness(&from);
        self.send_ping_answer(from)
    }

    fn on_ping_answer(
        &mut self,
        from: ProcessId,
        answer: PingAnswer,
        timer: &mut dyn Timer<Event>,
    ) -> anyhow::Result<()> {
        debug!(id = %self.id, %from, "received ping answer");
        self.registers
            .merge(&answer.added, &answer.removed, answer.time);
        if let Some((_, timer_id)) = self.suspicion.remove(&from) {
            timer.unset(timer_id)?;
            debug!(id = %self.id, from = %from, "suspicion cleared");
        }
        if !self.registers.added().contains_key(&from) {
            self.registers.mark_added(from, now());
        }
        Ok(())
    }
}

impl<N: MemberNet, U: MemberUpcall, R: Rng> OnEvent<Event> for GroupMember<N, U, R> {
    fn on_event(&mut self, event: Event, timer: &mut dyn Timer<Event>) -> anyhow::Result<()> {
        match event {
            Event::Join { seed } => self.on_join(seed, timer),
            Event::Leave => self.on_leave(timer),
            Event::GetMembers => self.on_get_members(),
            Event::Ping { from, ping } => self.on_ping(from, ping),
            Event::PingAnswer { from, answer } => self.on_ping_answer(from, answer, timer),
            Event::PeriodicTimer => self.on_periodic_timer(timer),
            Event::SuspicionTimer { target } => self.on_suspicion_timer(target, timer),
        }
    }
}
