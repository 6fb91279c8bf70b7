//! Command-line surface shared by every source binary:
//! `spec`, `check --config`, `discover --config`,
//! `read --config --catalog [--state]`.
//!
//! Protocol messages go to stdout, one JSON object per line. Logs go to
//! stderr so they never interleave with the protocol stream.

use crate::{
    config::{load_json, validate_against_spec},
    connector::{ConnectionCheck, Source},
    error::Result,
    protocol::{write_message, AirbyteMessage, ConfiguredAirbyteCatalog, LogLevel},
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Source connector entrypoint", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum Command {
    /// Print the connector specification
    Spec,
    /// Validate credentials and reachability
    Check {
        #[arg(long)]
        config: PathBuf,
    },
    /// Print the catalog of available streams
    Discover {
        #[arg(long)]
        config: PathBuf,
    },
    /// Read the configured streams
    Read {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parses `args` (program name first) and runs the command against stdout.
pub async fn launch<I, T>(source: &dyn Source, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let mut stdout = std::io::stdout();
    run(source, cli.command, &mut stdout).await
}

pub async fn run(
    source: &dyn Source,
    command: Command,
    out: &mut (dyn Write + Send),
) -> Result<()> {
    match command {
        Command::Spec => {
            let spec = source.spec()?;
            write_message(out, &AirbyteMessage::Spec { spec })
        }
        Command::Check { config } => {
            let check = match load_config(source, &config) {
                Ok(config) => source.check_connection(&config).await,
                Err(e) => ConnectionCheck::failed(e.to_string()),
            };
            match check.message() {
                None => info!(source = source.name(), "Check succeeded"),
                Some(message) => error!(source = source.name(), message, "Check failed"),
            }
            write_message(
                out,
                &AirbyteMessage::ConnectionStatus {
                    connection_status: check.into(),
                },
            )
        }
        Command::Discover { config } => {
            let config = load_config(source, &config)?;
            let catalog = source.discover(&config)?;
            info!(source = source.name(), streams = catalog.streams.len(), "Discovered streams");
            write_message(out, &AirbyteMessage::Catalog { catalog })
        }
        Command::Read {
            config,
            catalog,
            state,
        } => {
            let config = load_config(source, &config)?;
            let catalog: ConfiguredAirbyteCatalog = serde_json::from_value(load_json(&catalog)?)?;
            let state = state.map(|path| load_json(&path)).transpose()?;

            if let Err(e) = source.read(&config, &catalog, state, out).await {
                error!(source = source.name(), error = %e, "Read failed");
                write_message(out, &AirbyteMessage::log(LogLevel::Fatal, e.to_string()))?;
                return Err(e);
            }
            Ok(())
        }
    }
}

fn load_config(source: &dyn Source, path: &Path) -> Result<Value> {
    let config = load_json(path)?;
    let spec = source.spec()?;
    validate_against_spec(&config, &spec.connection_specification)?;
    Ok(config)
}
