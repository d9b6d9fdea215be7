//! Wikirace - replay a recorded wiki race through the engine and layout
//!
//! Usage:
//!   wikirace race.jsonl
//!   wikirace race.jsonl --live --frames
//!   wikirace --dump-config > wikirace.toml

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wikirace::{parse_replay, run_live, run_replay, WikiraceConfig};

#[derive(Parser)]
#[command(name = "wikirace", about = "Replay a multi-agent wiki race and lay out its navigation graph")]
struct Cli {
    /// Replay file (.jsonl): task header line, then agent events
    #[arg(required_unless_present = "dump_config")]
    file: Option<PathBuf>,

    /// Path to config file (TOML). Default: ./wikirace.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dump default config as TOML and exit.
    #[arg(long)]
    dump_config: bool,

    /// Drive the layout from the background tick runner
    #[arg(long, default_value_t = false)]
    live: bool,

    /// Overlay each agent's latest optimal path
    #[arg(long, default_value_t = false)]
    path_hints: bool,

    /// Include a position frame per applied event in the output
    #[arg(long, default_value_t = false)]
    frames: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dump_config {
        println!("{}", WikiraceConfig::default().to_toml());
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wikirace=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("wikirace.toml"));
    let mut config = WikiraceConfig::load(&config_path);
    if cli.path_hints {
        config.graph.path_hints = true;
    }

    let file = cli.file.context("no replay file given")?;
    let replay = parse_replay(&file).with_context(|| format!("failed to read replay {}", file.display()))?;
    tracing::info!(
        events = replay.events.len(),
        skipped = replay.errors.len(),
        agents = replay.header.agents.len(),
        "Loaded replay {}",
        file.display()
    );

    let summary = if cli.live {
        run_live(&replay, &config, cli.frames).await
    } else {
        run_replay(&replay, &config, cli.frames)
    }
    .context("replay failed")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
