use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use missive::config::Settings;
use missive::Shutdown;
use udp_server::{LogStore, PersistenceServer};

/// Appends relayed messages to the JSON log.
#[derive(Parser)]
#[command(name = "udp-server", version)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    missive::init_logging();

    let settings = Cli::parse().settings;
    let shutdown = Shutdown::on_interrupt().context("install interrupt handler")?;

    let store = LogStore::new(&settings.storage);
    let server = PersistenceServer::bind(settings.relay_addr, store, settings.datagram_buffer)
        .with_context(|| format!("bind persistence server on {}", settings.relay_addr))?;

    server.run(&shutdown);
    Ok(())
}
