use anyhow::Result;
use clap::Parser;
use tokio::signal;

use clinvec::cli::commands::{
    handle_config, handle_init, handle_search, handle_status, handle_vectorize,
};
use clinvec::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let verbose = cli.verbose;

    tokio::select! {
        result = run_command(cli.command, verbose) => {
            result?;
        }
        _ = shutdown_signal() => {
            // Checkpoints already written stay durable; the run itself is
            // reported as interrupted.
            eprintln!("\nInterrupted. Re-run with --resume to continue.");
            anyhow::bail!("interrupted");
        }
    }

    Ok(())
}

async fn run_command(command: Commands, verbose: bool) -> Result<()> {
    match command {
        Commands::Vectorize(args) => {
            handle_vectorize(args, verbose).await?;
        }
        Commands::Search(args) => {
            handle_search(args, verbose).await?;
        }
        Commands::Status(args) => {
            handle_status(args, verbose).await?;
        }
        Commands::Init(args) => {
            handle_init(args, verbose).await?;
        }
        Commands::Config(cmd) => {
            handle_config(cmd, verbose).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
