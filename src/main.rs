//! llmlens - Analytics and observability proxy for AI-model API calls
//!
//! A local proxy that forwards OpenAI-style chat completion requests to
//! the configured model provider while logging every request, response,
//! and per-request token cost.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llmlens::config::Config;
use llmlens::proxy::run_server;
use llmlens::storage;

#[derive(Parser)]
#[command(name = "llmlens")]
#[command(about = "Analytics and observability proxy for AI-model API calls")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },

    /// Mask sensitive header values in previously stored logs
    SanitizeLogs {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "llmlens=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            tracing::info!(config = %config, "Loading configuration");
            let mut config = Config::from_file(&config)?;

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            run_server(config).await
        }

        Commands::Check { config } => {
            let parsed = Config::from_file(&config)?;
            tracing::info!(config = %config, "Configuration is valid");
            if let Some(default) = &parsed.default_configuration {
                tracing::info!(
                    provider = %default.provider,
                    model = %default.model,
                    "Default configuration"
                );
            } else {
                tracing::warn!(
                    "No [default_configuration] block; requests will fail until a \
                     default configuration exists in the database"
                );
            }
            Ok(())
        }

        Commands::SanitizeLogs { config } => {
            let parsed = Config::from_file(&config)?;
            let pool = storage::init_pool(&parsed.database().path).await?;
            let changed = storage::logging::sanitize_logs(&pool).await?;
            tracing::info!(rows = changed, "Sanitized stored request logs");
            Ok(())
        }
    }
}
