//! The demo node binary: wires [`GroupMember`] to a real UDP transport and a
//! small local HTTP control surface.
//!
//! Grounded in this codebase's `boson_mutex` binary for the overall shape —
//! spawn the transport's recv loop, run the engine's `Session`, `select!`
//! over both — and in `privstack-relay`'s binary for the `clap` CLI and
//! `axum::serve` control-surface task.

use std::{fs, net::SocketAddr, path::PathBuf};

use anyhow::Context;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use census::{
    event::{SendEvent, Session},
    net::{decode, DirectedUdp, Directory, Envelope, Udp},
    Config, Event, GroupMember, Members, ProcessId,
};
use clap::Parser;
use tokio::{net::UdpSocket, sync::watch};
use tracing::info;

/// Run a `census` group-membership node.
#[derive(Parser, Debug)]
#[command(name = "census-node")]
struct Args {
    /// this process's id
    #[arg(long)]
    id: String,

    /// address to bind the gossip UDP socket to
    #[arg(long)]
    bind: SocketAddr,

    /// address to bind the local HTTP control surface to
    #[arg(long, default_value = "127.0.0.1:0")]
    control_bind: SocketAddr,

    /// file of "id=host:port" lines resolving peer ids to socket addresses
    #[arg(long)]
    peers: Option<PathBuf>,

    /// id to join through on startup; pass this process's own id to create
    /// a new group instead of joining one
    #[arg(long)]
    seed: Option<String>,
}

fn load_directory(path: Option<&PathBuf>, self_id: &ProcessId, self_addr: SocketAddr) -> anyhow::Result<Directory> {
    let mut directory = Directory::new();
    directory.insert(self_id.clone(), self_addr);
    let Some(path) = path else {
        return Ok(directory);
    };
    let contents = fs::read_to_string(path).with_context(|| format!("reading peer file {path:?}"))?;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (id, addr) = line
            .split_once('=')
            .with_context(|| format!("malformed peer line (want id=host:port): {line}"))?;
        directory.insert(ProcessId::new(id), addr.parse()?);
    }
    Ok(directory)
}

/// Delivers `MEMBERS` replies to a watch cell the HTTP control surface reads
/// from, since `GET /members` has no other way to correlate a reply to its
/// request in this fire-and-forget event model.
struct MembersUpcall(watch::Sender<Members>);

impl SendEvent<Members> for MembersUpcall {
    fn send(&mut self, event: Members) -> anyhow::Result<()> {
        self.0.send(event).map_err(|_| anyhow::anyhow!("members watcher dropped"))
    }
}

#[derive(Clone)]
struct ControlState {
    sender: census::event::SessionSender<Event>,
    members: watch::Receiver<Members>,
}

async fn join(
    State(state): State<ControlState>,
    Json(request): Json<census_control_messages::JoinRequest>,
) -> Json<census_control_messages::ActionReply> {
    let mut sender = state.sender.clone();
    let ok = sender
        .send(Event::Join {
            seed: ProcessId::new(request.seed),
        })
        .is_ok();
    Json(census_control_messages::ActionReply { ok })
}

async fn leave(State(state): State<ControlState>) -> Json<census_control_messages::ActionReply> {
    let mut sender = state.sender.clone();
    let ok = sender.send(Event::Leave).is_ok();
    Json(census_control_messages::ActionReply { ok })
}

async fn members(State(mut state): State<ControlState>) -> Json<census_control_messages::MembersReply> {
    let mut sender = state.sender.clone();
    // best-effort: if the send fails the watch cell still holds the last
    // known value, which is a reasonable answer to return.
    let _ = sender.send(Event::GetMembers);
    let _ = state.members.changed().await;
    let members = state.members.borrow().members.iter().map(ToString::to_string).collect();
    Json(census_control_messages::MembersReply { members })
}

fn control_router(state: ControlState) -> Router {
    Router::new()
        .route("/join", post(join))
        .route("/leave", post(leave))
        .route("/members", get(members))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let id = ProcessId::new(args.id.clone());
    let directory = load_directory(args.peers.as_ref(), &id, args.bind)?;

    let socket = UdpSocket::bind(args.bind).await?;
    let udp = Udp(std::sync::Arc::new(socket));
    let net = DirectedUdp {
        udp: udp.clone(),
        directory,
    };

    let (members_tx, members_rx) = watch::channel(Members { members: Vec::new() });
    let upcall = MembersUpcall(members_tx);

    let config = Config::default();
    let rng = rand::thread_rng();
    let mut member = GroupMember::new(id.clone(), config, net, upcall, rng);

    let mut session = Session::<Event>::new();
    let sender = session.sender();

    if let Some(seed) = &args.seed {
        let mut join_sender = sender.clone();
        join_sender.send(Event::Join {
            seed: ProcessId::new(seed.clone()),
        })?;
    }

    let recv_session = {
        let udp = udp.clone();
        let mut sender = sender.clone();
        async move {
            udp.recv_session(move |buf| {
                let envelope = decode::<Envelope>(buf)?;
                let event = match envelope {
                    Envelope::Ping(ping) => Event::Ping {
                        from: ping.from.clone(),
                        ping,
                    },
                    Envelope::PingAnswer(answer) => Event::PingAnswer {
                        from: answer.from.clone(),
                        answer,
                    },
                };
                sender.send(event)
            })
            .await
        }
    };

    let control_state = ControlState {
        sender: sender.clone(),
        members: members_rx,
    };
    let control_listener = tokio::net::TcpListener::bind(args.control_bind).await?;
    info!(addr = %control_listener.local_addr()?, "control surface listening");
    let control_session = axum::serve(control_listener, control_router(control_state));

    let engine_session = session.run(&mut member);

    info!(id = %id, bind = %args.bind, "census node starting");
    tokio::select! {
        result = recv_session => result.context("udp recv loop exited"),
        result = control_session => result.context("control surface exited"),
        result = engine_session => result.context("engine session exited"),
    }
}

// cSpell:words census
