use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use missive::config::Settings;
use missive::{Shutdown, UdpRelay};
use tcp_server::{RequestServer, Router};

/// Serves the message form and relays submissions to the persistence server.
#[derive(Parser)]
#[command(name = "tcp-server", version)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    missive::init_logging();

    let settings = Cli::parse().settings;
    let shutdown = Shutdown::on_interrupt().context("install interrupt handler")?;

    let router = Router::new(
        &settings.public_dir,
        &settings.assets,
        UdpRelay::new(settings.relay_addr),
    );
    let server = RequestServer::bind(settings.http_addr, router)
        .with_context(|| format!("bind request server on {}", settings.http_addr))?;

    server.run(&shutdown);
    Ok(())
}
