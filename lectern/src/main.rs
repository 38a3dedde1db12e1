use std::path::PathBuf;
use clap::{Parser, Subcommand};
use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lectern::{ApiServer, ServiceConfig};

#[derive(Parser)]
#[command(name = "lectern")]
#[command(about = "Question answering over a shared context", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind (overrides LECTERN_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides LECTERN_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Context file (overrides LECTERN_CONTEXT_PATH)
        #[arg(short, long)]
        context: Option<PathBuf>,
    },

    /// Print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lectern=info,lectern_state=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = ServiceConfig::from_env()?;

    match cli.command {
        Commands::Serve { host, port, context } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(context) = context {
                config.context_path = context;
            }
            config.validate()?;

            let server = ApiServer::build(config).await?;
            server.start().await?;
        }

        Commands::CheckConfig => {
            println!("{:#?}", config);
        }
    }

    Ok(())
}
