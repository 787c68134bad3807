//! End-to-end scenarios (seed/join/leave/crash/convergence/relay, plus a
//! handful of boundary behaviors), driving [`GroupMember`] instances through
//! a deterministic in-process simulated transport and a manually-stepped
//! timer wheel instead of real sockets or wall-clock sleeps, per this
//! crate's ambient test-tooling convention.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
    time::Duration,
};

use census::{
    event::{OnEvent, SendEvent, Timer, TimerId},
    membership::wire::{Ping, PingAnswer},
    net::SendMessage,
    Config, Event, GroupMember, Members, ProcessId,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(Debug, Clone)]
enum WireMsg {
    Ping(Ping),
    PingAnswer(PingAnswer),
}

type Mailbox = Rc<RefCell<HashMap<ProcessId, VecDeque<WireMsg>>>>;

/// A shared in-memory mailbox keyed by destination, standing in for a real
/// socket; optionally drops messages at a fixed rate to model loss (S5).
struct SimNet {
    mailbox: Mailbox,
    loss: Option<(Rc<RefCell<StdRng>>, f64)>,
}

impl SimNet {
    fn new(mailbox: Mailbox) -> Self {
        Self { mailbox, loss: None }
    }

    fn lossy(mailbox: Mailbox, rng: Rc<RefCell<StdRng>>, drop_rate: f64) -> Self {
        Self {
            mailbox,
            loss: Some((rng, drop_rate)),
        }
    }

    fn deliver(&mut self, dest: ProcessId, message: WireMsg) -> anyhow::Result<()> {
        if let Some((rng, drop_rate)) = &self.loss {
            if rng.borrow_mut().gen::<f64>() < *drop_rate {
                return Ok(());
            }
        }
        self.mailbox.borrow_mut().entry(dest).or_default().push_back(message);
        Ok(())
    }
}

impl SendMessage<ProcessId, Ping> for SimNet {
    fn send(&mut self, dest: ProcessId, message: Ping) -> anyhow::Result<()> {
        self.deliver(dest, WireMsg::Ping(message))
    }
}

impl SendMessage<ProcessId, PingAnswer> for SimNet {
    fn send(&mut self, dest: ProcessId, message: PingAnswer) -> anyhow::Result<()> {
        self.deliver(dest, WireMsg::PingAnswer(message))
    }
}

/// Records the last `MEMBERS` reply delivered to the local outbox.
#[derive(Clone, Default)]
struct MembersRecorder(Rc<RefCell<Option<Members>>>);

impl SendEvent<Members> for MembersRecorder {
    fn send(&mut self, event: Members) -> anyhow::Result<()> {
        *self.0.borrow_mut() = Some(event);
        Ok(())
    }
}

impl MembersRecorder {
    fn take(&self) -> Members {
        self.0.borrow_mut().take().expect("GET_MEMBERS was not answered")
    }
}

/// A manually-stepped stand-in for [`census::event::Session`]'s real timer:
/// `set_internal` just records the event under a fresh id, and tests choose
/// when (and whether) to fire it, instead of waiting out a real `Duration`.
#[derive(Default)]
struct ManualTimer {
    next_id: TimerId,
    pending: HashMap<TimerId, Event>,
}

impl ManualTimer {
    fn fire(&mut self, timer_id: TimerId) -> Event {
        self.pending.remove(&timer_id).expect("timer already fired or cancelled")
    }

    fn find_periodic(&self) -> Option<TimerId> {
        self.pending
            .iter()
            .find(|(_, event)| matches!(event, Event::PeriodicTimer))
            .map(|(id, _)| *id)
    }

    fn find_suspicion(&self, target: &ProcessId) -> Option<TimerId> {
        self.pending
            .iter()
            .find(|(_, event)| matches!(event, Event::SuspicionTimer { target: t } if t == target))
            .map(|(id, _)| *id)
    }
}

impl Timer<Event> for ManualTimer {
    fn set_internal(&mut self, _duration: Duration, event: Event) -> anyhow::Result<TimerId> {
        self.next_id += 1;
        self.pending.insert(self.next_id, event);
        Ok(self.next_id)
    }

    fn unset(&mut self, timer_id: TimerId) -> anyhow::Result<()> {
        self.pending
            .remove(&timer_id)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("timer not exists"))
    }
}

struct Node {
    id: ProcessId,
    member: GroupMember<SimNet, MembersRecorder, StdRng>,
    timer: ManualTimer,
    mailbox: Mailbox,
    upcall: MembersRecorder,
}

impl Node {
    fn new(id: &str, mailbox: Mailbox, rng_seed: u64) -> Self {
        let upcall = MembersRecorder::default();
        let member = GroupMember::new(
            ProcessId::new(id),
            Config::default(),
            SimNet::new(mailbox.clone()),
            upcall.clone(),
            StdRng::seed_from_u64(rng_seed),
        );
        Self {
            id: ProcessId::new(id),
            member,
            timer: ManualTimer::default(),
            mailbox,
            upcall,
        }
    }

    fn lossy(id: &str, mailbox: Mailbox, rng_seed: u64, drop_rate: f64) -> Self {
        let upcall = MembersRecorder::default();
        let drop_rng = Rc::new(RefCell::new(StdRng::seed_from_u64(rng_seed.wrapping_add(1))));
        let member = GroupMember::new(
            ProcessId::new(id),
            Config::default(),
            SimNet::lossy(mailbox.clone(), drop_rng, drop_rate),
            upcall.clone(),
            StdRng::seed_from_u64(rng_seed),
        );
        Self {
            id: ProcessId::new(id),
            member,
            timer: ManualTimer::default(),
            mailbox,
            upcall,
        }
    }

    fn join(&mut self, seed: &str) {
        self.member
            .on_event(Event::Join { seed: ProcessId::new(seed) }, &mut self.timer)
            .unwrap();
    }

    fn leave(&mut self) {
        self.member.on_event(Event::Leave, &mut self.timer).unwrap();
    }

    fn get_members(&mut self) -> Vec<ProcessId> {
        self.member.on_event(Event::GetMembers, &mut self.timer).unwrap();
        self.upcall.take().members
    }

    fn fire_periodic(&mut self) {
        let timer_id = self.timer.find_periodic().expect("no periodic timer armed");
        let event = self.timer.fire(timer_id);
        self.member.on_event(event, &mut self.timer).unwrap();
    }

    fn fire_suspicion(&mut self, target: &ProcessId) {
        let timer_id = self
            .timer
            .find_suspicion(target)
            .unwrap_or_else(|| panic!("no suspicion timer armed for {target}"));
        let event = self.timer.fire(timer_id);
        self.member.on_event(event, &mut self.timer).unwrap();
    }

    fn inbox_is_empty(&self) -> bool {
        self.mailbox.borrow().get(&self.id).is_none_or_empty()
    }

    fn deliver_inbox(&mut self) {
        let messages: Vec<_> = self
            .mailbox
            .borrow_mut()
            .get_mut(&self.id)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default();
        for message in messages {
            let event = match message {
                WireMsg::Ping(ping) => Event::Ping { from: ping.from.clone(), ping },
                WireMsg::PingAnswer(answer) => Event::PingAnswer { from: answer.from.clone(), answer },
            };
            self.member.on_event(event, &mut self.timer).unwrap();
        }
    }
}

trait IsNoneOrEmpty {
    fn is_none_or_empty(&self) -> bool;
}

impl IsNoneOrEmpty for Option<&VecDeque<WireMsg>> {
    fn is_none_or_empty(&self) -> bool {
        self.map_or(true, VecDeque::is_empty)
    }
}

fn drain_until_quiescent(nodes: &mut [Node]) {
    loop {
        let mut delivered_any = false;
        for node in nodes.iter_mut() {
            if !node.inbox_is_empty() {
                node.deliver_inbox();
                delivered_any = true;
            }
        }
        if !delivered_any {
            break;
        }
    }
}

fn new_mailbox() -> Mailbox {
    Rc::new(RefCell::new(HashMap::new()))
}

/// A lone seed becomes its own group after one probe tick.
#[test]
fn s1_seed_solo() {
    let mut a = Node::new("a", new_mailbox(), 1);
    a.join("a");
    a.fire_periodic();

    assert_eq!(a.get_members(), vec![ProcessId::new("a")]);
}

/// A seed plus one joiner converge on `{a, b}` with no loss. The
/// bootstrap PINGs a joiner fires on JOIN already suffice without any
/// periodic tick, since each carries a full register sample.
#[test]
fn s2_join() {
    let mailbox = new_mailbox();
    let mut nodes = vec![Node::new("a", mailbox.clone(), 1), Node::new("b", mailbox.clone(), 2)];
    nodes[0].join("a");
    nodes[1].join("a");

    drain_until_quiescent(&mut nodes);

    let expected = std::collections::BTreeSet::from([ProcessId::new("a"), ProcessId::new("b")]);
    assert_eq!(nodes[0].member.active_members(), expected);
    assert_eq!(nodes[1].member.active_members(), expected);
}

/// A graceful leave is learned by whichever peer next probes the leaver.
/// Two processes are enough to exercise the mechanism deterministically:
/// with one other active peer, the prober's periodic tick has a single
/// possible destination, no randomness involved.
#[test]
fn s3_graceful_leave() {
    let mailbox = new_mailbox();
    let mut nodes = vec![Node::new("a", mailbox.clone(), 10), Node::new("c", mailbox.clone(), 20)];
    nodes[0].join("a");
    nodes[1].join("a");
    drain_until_quiescent(&mut nodes);

    nodes[1].leave();
    nodes[0].fire_periodic();
    drain_until_quiescent(&mut nodes);

    assert_eq!(
        nodes[0].member.active_members(),
        std::collections::BTreeSet::from([ProcessId::new("a")])
    );
}

/// Crash detection escalates direct -> indirect -> removed.
#[test]
fn s4_crash_detection() {
    let mailbox = new_mailbox();
    let mut nodes = vec![Node::new("a", mailbox.clone(), 30), Node::new("b", mailbox.clone(), 40)];
    nodes[0].join("a");
    nodes[1].join("a");
    drain_until_quiescent(&mut nodes);
    assert_eq!(nodes[0].member.active_members().len(), 2);

    let b_id = nodes[1].id.clone();

    // b's transport is silenced from here on: its inbox is never drained,
    // so it neither answers directly nor relays on a's behalf.
    nodes[0].fire_periodic();
    drain_until_quiescent(&mut nodes[..1]);
    assert!(
        !mailbox.borrow().get(&b_id).is_none_or_empty(),
        "direct ping should have been sent"
    );

    nodes[0].fire_suspicion(&b_id);
    drain_until_quiescent(&mut nodes[..1]);
    nodes[0].fire_suspicion(&b_id);

    assert!(!nodes[0].member.active_members().contains(&b_id));
}

/// Five processes converge to an identical view under 30% loss.
#[test]
fn s5_convergence_under_loss() {
    let mailbox = new_mailbox();
    let ids = ["a", "b", "c", "d", "e"];
    let mut nodes: Vec<Node> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| Node::lossy(id, mailbox.clone(), 100 + i as u64, 0.3))
        .collect();

    nodes[0].join("a");
    for node in nodes.iter_mut().skip(1) {
        node.join("a");
    }

    for _ in 0..100 {
        for node in nodes.iter_mut() {
            if node.member.is_joined() {
                node.fire_periodic();
            }
        }
        drain_until_quiescent(&mut nodes);
    }

    let first = nodes[0].member.active_members();
    for node in &nodes[1..] {
        assert_eq!(node.member.active_members(), first);
    }
}

/// An indirect ping is merged and relayed verbatim, with no answer sent
/// by the relayer.
#[test]
fn s6_indirect_relay() {
    let mailbox = new_mailbox();
    let mut b = Node::new("b", mailbox.clone(), 50);
    b.join("b");

    let ping = Ping {
        from: ProcessId::new("a"),
        added: Default::default(),
        removed: Default::default(),
        time: 0,
        target: Some(ProcessId::new("c")),
    };
    b.member
        .on_event(
            Event::Ping {
                from: ping.from.clone(),
                ping: ping.clone(),
            },
            &mut b.timer,
        )
        .unwrap();

    let relayed = mailbox.borrow_mut().remove(&ProcessId::new("c")).unwrap_or_default();
    assert_eq!(relayed.len(), 1);
    match &relayed[0] {
        WireMsg::Ping(relayed_ping) => {
            assert_eq!(relayed_ping.from, ProcessId::new("a"));
            assert_eq!(relayed_ping.target, Some(ProcessId::new("c")));
        }
        WireMsg::PingAnswer(_) => panic!("relay must not answer on the target's behalf"),
    }
    assert!(mailbox.borrow().get(&ProcessId::new("a")).is_none_or_empty());
}

/// An indirect ping addressed to oneself is treated as direct.
#[test]
fn boundary_indirect_ping_to_self_is_direct() {
    let mailbox = new_mailbox();
    let mut b = Node::new("b", mailbox.clone(), 60);
    b.join("b");

    let ping = Ping {
        from: ProcessId::new("a"),
        added: Default::default(),
        removed: Default::default(),
        time: 0,
        target: Some(ProcessId::new("b")),
    };
    b.member
        .on_event(Event::Ping { from: ping.from.clone(), ping }, &mut b.timer)
        .unwrap();

    let to_a = mailbox.borrow_mut().remove(&ProcessId::new("a")).unwrap_or_default();
    assert_eq!(to_a.len(), 1);
    assert!(matches!(to_a[0], WireMsg::PingAnswer(_)));
}

/// A PING_ANSWER from a peer with no suspicion entry is accepted and just
/// refreshes liveness.
#[test]
fn boundary_ping_answer_without_suspicion_entry() {
    let mailbox = new_mailbox();
    let mut b = Node::new("b", mailbox.clone(), 70);
    b.join("b");

    let answer = PingAnswer {
        from: ProcessId::new("stranger"),
        added: Default::default(),
        removed: Default::default(),
        time: 0,
    };
    b.member
        .on_event(Event::PingAnswer { from: answer.from.clone(), answer }, &mut b.timer)
        .unwrap();

    assert!(b.member.active_members().contains(&ProcessId::new("stranger")));
}

/// With the active set equal to `{self}`, the periodic timer re-arms
/// without sending any message.
#[test]
fn boundary_periodic_timer_alone_sends_nothing() {
    let mailbox = new_mailbox();
    let mut a = Node::new("a", mailbox.clone(), 80);
    a.join("a");

    a.fire_periodic();

    assert!(mailbox.borrow().values().all(VecDeque::is_empty));
    assert!(a.timer.find_periodic().is_some(), "periodic timer must re-arm");
}
