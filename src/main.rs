use std::sync::Arc;

use challenge_operator::{controller, Error};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Challenge Operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run => run_operator().await,
    }
}

async fn run_operator() -> Result<(), Error> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();

    info!(
        "Starting Challenge Operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let state = Arc::new(controller::ControllerState { client });
    controller::run_controller(state).await
}
