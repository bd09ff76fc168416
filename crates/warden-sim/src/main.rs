//! # Warden Sim
//!
//! Headless simulation runner for the Warden NPC AI core.
//!
//! Loads `warden.toml` (or the path given as the first argument), populates
//! an arena with guards, patrolling NPCs, civilians and a scripted player,
//! drives them at a fixed step and prints a JSON summary. Nothing is
//! rendered.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod config;
mod scenario;
mod timing;

use anyhow::{Context, Result};
use config::{SimConfig, CONFIG_FILE};
use scenario::Scenario;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use warden_ai::{default_guard_graph, StateGraphAsset};

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("warden=info".parse()?))
        .init();

    info!("Warden simulation starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
    let config = SimConfig::load_from(&path);

    let graph = match &config.scenario.guard_graph {
        Some(graph_path) => StateGraphAsset::load(graph_path)
            .with_context(|| format!("loading guard graph {}", graph_path.display()))?,
        None => default_guard_graph(),
    };

    let mut scenario = Scenario::build(&config, &graph).context("building scenario")?;
    let summary = scenario.run();

    info!(summary = %serde_json::to_string(summary)?, "Simulation finished");
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
