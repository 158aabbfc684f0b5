/// Sonar - music library ingestion
use anyhow::bail;
use clap::{Parser, Subcommand};
use sonar_cli::{scan, CliConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sonar")]
#[command(about = "Scan music libraries into a library store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory tree and insert what it contains
    Scan {
        /// Root directory of the library
        root: PathBuf,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Store base URL (overrides the config file)
        #[arg(long)]
        store_url: Option<String>,

        /// Keep results in memory instead of calling the store
        #[arg(long)]
        dry_run: bool,

        /// Files per discovery batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration
    CheckConfig {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sonar=info,sonar_pipeline=info,sonar_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            root,
            config,
            store_url,
            dry_run,
            batch_size,
            json,
        } => {
            let mut config = CliConfig::load(config.as_deref())?;
            if let Some(url) = store_url {
                config.store.url = url;
            }
            if let Some(batch_size) = batch_size {
                config.pipeline.discovery.batch_size = batch_size;
            }
            config.validate(dry_run)?;

            tracing::info!(root = %root.display(), dry_run, "Starting scan");
            let report = scan::execute(&config, &root, dry_run).await?;
            println!("{}", scan::render(&report, json)?);

            if !report.is_success() {
                bail!("scan {} finished in state {}", report.run_id, report.state);
            }
        }
        Commands::CheckConfig { config } => {
            let config = CliConfig::load(config.as_deref())?;
            config.validate(true)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
