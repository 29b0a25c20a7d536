//! Bout CLI
//!
//! Hosts scoring matches over a JSON-lines stdin/stdout transport.

use anyhow::Result;
use bout_cli::{default_settings_yaml, load_settings, run_session, LineBroadcaster, Settings};
use bout_core::{Envelope, MatchRegistry, PeriodicDriver, SystemClock};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bout")]
#[command(about = "Authoritative scoring host for combat-sport bouts", long_about = None)]
#[command(version = bout_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host matches: envelopes on stdin, deliveries on stdout
    Run {
        /// YAML settings file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Match code to open (repeatable); overrides the settings file
        #[arg(long)]
        code: Vec<String>,
    },

    /// Print the JSON schema of inbound envelopes
    Schema {
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the default settings as YAML
    Config,
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the transport
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, code } => {
            let mut settings = match config {
                Some(path) => load_settings(&path)?,
                None => Settings::default(),
            };
            if !code.is_empty() {
                settings.codes = code;
            }
            run(settings)?;
        }

        Commands::Schema { out } => {
            let schema = schemars::schema_for!(Envelope);
            let json = serde_json::to_string_pretty(&schema)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    info!(path = %path.display(), "schema written");
                }
                None => println!("{json}"),
            }
        }

        Commands::Config => {
            print!("{}", default_settings_yaml()?);
        }
    }

    Ok(())
}

fn run(settings: Settings) -> Result<()> {
    let lines = Arc::new(LineBroadcaster::new(std::io::stdout()));
    let registry = Arc::new(MatchRegistry::new(
        settings.engine,
        Arc::new(SystemClock),
        lines.clone(),
    ));

    if settings.codes.is_empty() {
        let code = registry.create(settings.match_config.clone());
        lines.announce(&code);
    } else {
        for code in &settings.codes {
            registry.create_with_code(code, settings.match_config.clone())?;
            lines.announce(code.trim());
        }
    }
    info!(matches = registry.len(), "bout host ready");

    let mut driver = PeriodicDriver::spawn(registry.clone())?;
    let stats = run_session(&registry, std::io::stdin().lock());
    driver.shutdown();

    let stats = stats?;
    info!(
        handled = stats.handled,
        failed = stats.failed,
        "input closed, shutting down"
    );
    Ok(())
}
