//! Mockpit CLI
//!
//! `serve` runs a mock in the foreground (this is what the container image
//! runs); the other commands drive mock containers from the host.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mockpit::{forward_os_signals, ContainerManager, MockServer, MockpitConfig, ServerState, VERSION};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mockpit")]
#[command(version)]
#[command(about = "Expectation-driven HTTP contract mocks", long_about = None)]
struct Cli {
    /// Configuration file (defaults apply when it doesn't exist)
    #[arg(long, short = 'c', global = true, default_value = "mockpit.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the examples directory until SIGINT/SIGTERM; SIGHUP reloads
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
        /// Examples directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Start a mock container for an examples directory
    Start {
        dir: PathBuf,
        /// Host port to publish the mock on (runtime-assigned if omitted)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Remove the mock container of an examples directory
    Stop {
        dir: PathBuf,
        /// Succeed when no container exists
        #[arg(long)]
        ignore_missing: bool,
    },
    /// Arm an expectation on a running mock
    Expect {
        case: String,
        #[arg(long)]
        port: u16,
    },
    /// Print and reset the invocation count of a case
    Recordings {
        case: String,
        #[arg(long)]
        port: u16,
    },
    /// Ask a running mock to reload its examples
    Reload {
        #[arg(long)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = MockpitConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.apply_env();

    match cli.command {
        Commands::Serve { bind, dir } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(dir) = dir {
                config.server.examples_dir = dir;
            }
            serve(config).await
        }
        Commands::Start { dir, port } => {
            let manager = ContainerManager::connect(config.manager)?;
            let instance = manager.start(&dir, port).await?;
            println!("{}", instance.endpoint);
            Ok(())
        }
        Commands::Stop { dir, ignore_missing } => {
            let manager = ContainerManager::connect(config.manager)?;
            match manager.stop(&dir).await {
                Err(err) if ignore_missing && err.is_not_found() => {
                    warn!("{}", err);
                    Ok(())
                }
                result => Ok(result?),
            }
        }
        Commands::Expect { case, port } => {
            let manager = ContainerManager::connect(config.manager)?;
            manager.arm_expectation(&case, port).await?;
            Ok(())
        }
        Commands::Recordings { case, port } => {
            let manager = ContainerManager::connect(config.manager)?;
            let recording = manager.recordings(&case, port).await?;
            println!("{}", serde_json::to_string(&recording)?);
            Ok(())
        }
        Commands::Reload { port } => {
            let manager = ContainerManager::connect(config.manager)?;
            manager.control(port)?.reload().await?;
            Ok(())
        }
    }
}

async fn serve(config: MockpitConfig) -> Result<()> {
    let mut server = MockServer::bind(config.server).await?;
    let addr = server.local_addr()?;
    let handle = server.handle();

    forward_os_signals(handle.clone())?;

    if let Some(mut errors) = server.take_errors() {
        tokio::spawn(async move {
            while let Some(err) = errors.recv().await {
                error!("{}", err);
            }
        });
    }

    // Container readiness is detected from this line
    tokio::spawn(async move {
        if let Ok(ServerState::Serving) = handle.wait_for(ServerState::Serving).await {
            info!("Mockpit {} serving on ({})...", VERSION, addr);
        }
    });

    server.serve().await?;
    Ok(())
}
