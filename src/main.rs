use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod backend;
mod command_runner;
mod config;
mod error;
mod http_backend;
mod job_file;
mod round;
mod session;
mod size;
mod slug;
mod types;

use config::{Cli, Command};
use round::RoundRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stable_diffusion_file_queue=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.cmd.unwrap_or(Command::Run) {
        Command::Check => check(&cli.runner.job_file),
        Command::Once => once(build_runner(cli)?).await,
        Command::Run => interactive(build_runner(cli)?).await,
    }
}

fn build_runner(cli: Cli) -> anyhow::Result<RoundRunner> {
    let backend = cli.backend.build().context("Couldn't set up the backend")?;
    Ok(RoundRunner::new(cli.runner, backend))
}

async fn interactive(runner: RoundRunner) -> anyhow::Result<()> {
    session::print_usage(&runner);
    let stdin = BufReader::new(tokio::io::stdin());
    let rounds = session::run_session(&runner, stdin, tokio::io::stdout()).await?;
    info!("Ran {rounds} rounds");
    Ok(())
}

async fn once(runner: RoundRunner) -> anyhow::Result<()> {
    let summary = runner.run_round().await?;
    session::report(&summary);
    anyhow::ensure!(
        summary.failures.is_empty(),
        "{} of {} jobs failed",
        summary.failures.len(),
        summary.requests
    );
    Ok(())
}

fn check(job_file: &std::path::Path) -> anyhow::Result<()> {
    let requests = job_file::load_requests(job_file)?;
    info!("{} jobs in {}", requests.len(), job_file.display());
    for (i, request) in requests.iter().enumerate() {
        info!(
            "[{}] {}x{} {}",
            i + 1,
            request.width,
            request.height,
            request.prompt
        );
    }
    Ok(())
}
