use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use globe_nmea_server::{CliOverrides, Config};
use tracing::{error, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "globe-nmea-server")]
#[command(version, about = "Relay a boat's NMEA 0183 sentence from the Globe API to TCP clients")]
struct Cli {
    /// UUID of the boat whose sentence is relayed
    boat_uuid: String,

    /// Host URL of the API [default: https://api.marineverse.com]
    #[arg(long)]
    host: Option<String>,

    /// Port number to listen on [default: 3006]
    #[arg(long)]
    port: Option<u16>,

    /// TOML file with additional settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Give up on an upstream request after this many seconds (default: never)
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            host: self.host.clone(),
            port: self.port,
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug {
        "globe_nmea_server=debug,nmea_feed=debug,info"
    } else {
        "globe_nmea_server=info,nmea_feed=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    init_logging(cli.debug);

    let overrides = cli.overrides();
    let config = match Config::load(cli.config.as_deref(), &overrides, cli.boat_uuid.clone()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to parse config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = globe_nmea_server::run(config) => {
            if let Err(e) = result {
                error!("Server error: {:#}", e);
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, exiting");
        }
    }

    ExitCode::SUCCESS
}
