//! In-Situ Ingest - observation file ingestion tool

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use insitu_common::logging::init_logging;
use insitu_ingest::config::load_log_config;
use insitu_ingest::{IngestApp, IngestConfig, IngestRequest};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "insitu-ingest")]
#[command(author, version, about = "In-situ observation ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Environment file to load instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one source object into the lake
    Ingest {
        /// Source locator (s3://bucket/key, a local path or a file:// URL)
        locator: String,

        /// Side-car digest locator (defaults to <locator>.sha512)
        #[arg(long)]
        sidecar: Option<String>,

        /// Replace an already ingested object
        #[arg(long)]
        replace: bool,

        /// Keep malformed observations instead of dropping them
        #[arg(long)]
        no_sanitize: bool,

        /// Return as soon as the object is verified
        #[arg(long)]
        background: bool,
    },

    /// Create the metadata table and its job id index
    CreateTable,

    /// Print every metadata record as JSON
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = load_log_config(cli.verbose, cli.env_file.as_deref())?;
    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::load()?;
    let app = IngestApp::build(&config).await?;

    match cli.command {
        Command::Ingest {
            locator,
            sidecar,
            replace,
            no_sanitize,
            background,
        } => {
            app.metadata.ensure_table().await?;

            let mut request = IngestRequest::new(locator)
                .replacing(replace)
                .sanitizing(!no_sanitize)
                .wait_till_complete(!background);
            if let Some(sidecar) = sidecar {
                request = request.with_sidecar(sidecar);
            }

            let response = app.controller.execute(request).await;
            println!("{}", serde_json::to_string_pretty(&response.to_json())?);

            if background {
                app.controller.drain().await;
            }
            if !response.is_success() {
                error!(status = response.status.as_u16(), message = %response.body.message, "Ingestion failed");
                bail!("ingestion failed: {}", response.body.message);
            }
        },
        Command::CreateTable => {
            if app.metadata.ensure_table().await? {
                info!(table = %config.metadata.table_name, "Metadata table created");
            } else {
                info!(table = %config.metadata.table_name, "Metadata table already exists");
            }
        },
        Command::List => {
            for record in app.metadata.list().await? {
                println!("{}", serde_json::to_string(&record)?);
            }
        },
    }

    Ok(())
}
