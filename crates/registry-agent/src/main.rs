//! Command-line front end for the registry client

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "registry-agent")]
#[command(about = "Keep an instance registered with a service registry")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "registry-client.yaml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register an instance and keep its lease alive until interrupted
    Run {
        /// Application name
        #[arg(long)]
        app: String,

        /// Instance id (defaults to host name plus a random suffix)
        #[arg(long)]
        instance_id: Option<String>,

        /// Host name to advertise
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Port to advertise
        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        duration: Option<u64>,

        /// Seconds between supervisor stats reports
        #[arg(long, default_value_t = 30)]
        report_interval: u64,
    },

    /// Fetch the registry once and list its applications
    Apps {
        /// Output format (table or json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            app,
            instance_id,
            host,
            port,
            duration,
            report_interval,
        } => {
            let options = commands::run::RunOptions {
                app,
                instance_id,
                host,
                port,
                duration,
                report_interval,
            };
            commands::run::run(&cli.config, options).await
        }
        Commands::Apps { format } => commands::apps::run(&cli.config, format).await,
        Commands::Validate => commands::validate::run(&cli.config).await,
    }
}
