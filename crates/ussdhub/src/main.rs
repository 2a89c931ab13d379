mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Types
// ============================================================================

/// Ussdhub - a session reconciliation and lifecycle engine for USSD gateways
#[derive(Parser, Debug)]
#[command(version = ussdhub::build_info::VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a scripted USSD dialog through the reconciler
    Simulate {
        /// Path to configuration file
        #[arg(short, long, default_value = ussdhub::config::DEFAULT_CONFIG_PATH)]
        config: String,

        /// Service code to dial (overrides config)
        #[arg(short, long)]
        dial: Option<String>,

        /// Comma-separated subscriber inputs sent after the opening menu
        #[arg(short, long)]
        inputs: Option<String>,

        /// Subscriber address dialing in (overrides config)
        #[arg(short, long)]
        subscriber: Option<String>,

        /// Gateway session id for the dialog
        #[arg(long, default_value = "sim-1")]
        external_id: String,
    },

    /// List stored sessions
    Sessions {
        /// Path to configuration file
        #[arg(short, long, default_value = ussdhub::config::DEFAULT_CONFIG_PATH)]
        config: String,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    debug!("ussdhub {}", ussdhub::build_info::version_string());

    match cli.command {
        Commands::Simulate {
            config,
            dial,
            inputs,
            subscriber,
            external_id,
        } => {
            commands::simulate::run(
                &config,
                dial.as_deref(),
                inputs.as_deref(),
                subscriber.as_deref(),
                &external_id,
            )
            .await
        }
        Commands::Sessions { config } => commands::sessions::run(&config).await,
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
