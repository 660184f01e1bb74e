use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sizedb::config::Config;
use sizedb::RunOptions;

#[derive(Parser)]
#[command(
    name = "sizedb",
    about = "Report PostgreSQL database size and free disk space to a Google Sheets dashboard",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure the database and update the server's sheet
    Run {
        /// Path to the TOML configuration file
        #[arg(long, env = "SIZEDB_CONFIG", default_value = "sizedb.toml")]
        config: PathBuf,

        /// Print the changes instead of making them. Reads the existing
        /// sheet when credentials are available, else assumes a fresh one
        #[arg(long)]
        dry_run: bool,

        /// Print the run summary as JSON instead of progress lines
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration with secrets masked
    ShowConfig {
        /// Path to the TOML configuration file
        #[arg(long, env = "SIZEDB_CONFIG", default_value = "sizedb.toml")]
        config: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries progress lines and JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            dry_run,
            json,
        } => {
            let cfg = Config::load(&config)?;
            tracing::info!(
                server = %cfg.spreadsheet.server_name,
                database = %cfg.database.name,
                dry_run,
                "Starting report run"
            );
            let summary = sizedb::run(
                &cfg,
                RunOptions {
                    dry_run,
                    quiet: json,
                },
            )
            .await
            .context("report run failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
        Commands::ShowConfig { config } => {
            let cfg = Config::load(&config)?;
            print!("{}", toml::to_string_pretty(&cfg.redacted())?);
        }
    }

    Ok(())
}
