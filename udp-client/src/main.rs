use std::net::SocketAddr;

use anyhow::{bail, Context};
use clap::Parser;
use dotenvy::dotenv;
use missive::config::DEFAULT_RELAY_ADDR;
use missive::{Relay, Submission, UdpRelay};

/// Sends one message straight to the persistence server, bypassing the form.
#[derive(Parser)]
#[command(name = "udp-client", version)]
struct Cli {
    #[arg(long)]
    username: String,

    #[arg(long)]
    message: String,

    /// Datagram address of the persistence server
    #[arg(long, env = "MISSIVE_RELAY_ADDR", default_value = DEFAULT_RELAY_ADDR)]
    relay_addr: SocketAddr,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    missive::init_logging();

    let cli = Cli::parse();
    let submission = Submission::new(cli.username, cli.message);
    if !submission.is_complete() {
        bail!("username and message must both be non-empty");
    }

    UdpRelay::new(cli.relay_addr)
        .relay(&submission)
        .with_context(|| format!("relay message to {}", cli.relay_addr))?;
    log::info!("sent message from {:?} to {}", submission.username, cli.relay_addr);

    Ok(())
}
