// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! `hub`: a thin operator CLI against a running `hubd`, over the same
//! WebSocket protocol interactive clients use (spec §6). Not a UI — just
//! `status`/`ping`/`ls` for operators and scripts.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod color;
mod commands;
mod output;

use clap::Parser;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "hub", version, styles = color::styles())]
struct Cli {
    /// Address of the running hubd, host:port.
    #[arg(long, global = true, env = "HUB_ADDR", default_value = "127.0.0.1:7420")]
    addr: String,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Summarize the daemon's project counts by status.
    Status,
    /// Measure round-trip latency to the daemon.
    Ping,
    /// List every project the daemon knows about.
    Ls,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Status => commands::status::handle(&cli.addr, cli.output).await,
        Command::Ping => commands::ping::handle(&cli.addr, cli.output).await,
        Command::Ls => commands::ls::handle(&cli.addr, cli.output).await,
    }
}
