use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use missive::config::Settings;
use missive::Shutdown;
use missived::Services;

/// Runs the message form server and the persistence server side by side.
#[derive(Parser)]
#[command(name = "missived", version)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    missive::init_logging();

    let settings = Cli::parse().settings;
    let shutdown = Shutdown::on_interrupt().context("install interrupt handler")?;

    Services::bind(&settings)?.run(&shutdown)
}
