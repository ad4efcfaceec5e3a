mod app;
mod config;
mod db;
mod error;
mod extractor;
mod feed;
mod forecast;
mod ingest;
mod logger;
mod models;
mod schedule;
mod sequence;
mod snatcher;
mod utils;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "surfsnatch")]
#[command(about = "Surf report and forecast harvester")]
struct Cli {
    /// Read this config file instead of the one in the XDG config dir
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Keep reports and forecasts in sync, forever (default)
    Run,
    /// Process the first page of the feed once
    Sync,
    /// Walk every page of the feed until it runs out
    SyncAll,
    /// Fetch one forecast snapshot per configured spot
    Forecast,
    /// Print the latest stored report as JSON
    Latest,
    /// List stored reports, newest first
    Reports,
    /// Print one stored report as JSON
    Show {
        /// Database id of the report
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    app::run(cli.command.unwrap_or(Command::Run), cli.config).await
}
