//! UDP reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌────────────────────────────────────────────────────┐
//!                     │                    UDP PROXY                       │
//!                     │                                                    │
//!   Client datagram   │  ┌──────────┐   ┌────────────┐   ┌──────────────┐  │
//!   ──────────────────┼─▶│ listener │──▶│ forwarder  │──▶│  middleware  │  │
//!                     │  │ (per EP) │   │ flow table │   │    chain     │  │
//!                     │  └──────────┘   └─────┬──────┘   └──────┬───────┘  │
//!                     │                       │                 ▼          │
//!                     │                       │          ┌──────────────┐  │
//!                     │                       │          │ weighted RR  │  │
//!                     │                       │          │  (nested)    │  │
//!                     │                       │          └──────┬───────┘  │
//!   Reply             │                       ▼                 ▼          │
//!   ◀─────────────────┼──────────────── flow worker ◀──── backend socket ◀─┼── Backend
//!                     │                                                    │
//!                     │  config + watcher → routing manager → slot swap    │
//!                     └────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "udp-proxy", version, about = "UDP reverse proxy with weighted load balancing")]
struct Cli {
    /// Path to the configuration file (TOML, or JSON with a .json extension).
    #[arg(short, long, default_value = "udp-proxy.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match udp_proxy::lifecycle::startup::run(&cli.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("udp-proxy: {err}");
            ExitCode::FAILURE
        }
    }
}
