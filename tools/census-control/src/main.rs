//! A small CLI that drives a running `census-node`'s local HTTP control
//! surface, in the same spirit as this codebase's `boson-control` tool
//! driving a `boson` node over JSON.

use anyhow::Context;
use census_control_messages::{ActionReply, JoinRequest, MembersReply};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "census-control")]
struct Args {
    /// base URL of the target node's control surface, e.g. http://127.0.0.1:8080
    #[arg(long)]
    node: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// ask the node to join through the given seed id (pass the node's own
    /// id to have it create a new group instead)
    Join { seed: String },
    /// ask the node to leave its group
    Leave,
    /// print the node's current view of the active membership set
    Members,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = reqwest::Client::new();

    match args.command {
        Command::Join { seed } => {
            let reply: ActionReply = client
                .post(format!("{}/join", args.node))
                .json(&JoinRequest { seed })
                .send()
                .await
                .context("sending join request")?
                .json()
                .await
                .context("decoding join reply")?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        Command::Leave => {
            let reply: ActionReply = client
                .post(format!("{}/leave", args.node))
                .send()
                .await
                .context("sending leave request")?
                .json()
                .await
                .context("decoding leave reply")?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        Command::Members => {
            let reply: MembersReply = client
                .get(format!("{}/members", args.node))
                .send()
                .await
                .context("sending members request")?
                .json()
                .await
                .context("decoding members reply")?;
            for member in reply.members {
                println!("{member}");
            }
        }
    }
    Ok(())
}
