use std::process::ExitCode;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use mcp_sql_fuzz::{
    AbortReason, Args, FuzzConfig, Reporter, StdoutReporter, TracingReporter, run_session,
};

const EXIT_INTERRUPTED: u8 = 130;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves.
async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl-C"),
        Err(e) => {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let mut config = FuzzConfig::from(Args::parse());
    let seed = config.seed.unwrap_or_else(rand::random);
    config.seed = Some(seed);
    tracing::info!(seed, iterations = config.iterations, "starting fuzz session");

    let reporter: Box<dyn Reporter> = if config.log_transcript {
        Box::new(TracingReporter)
    } else {
        Box::new(StdoutReporter)
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let report = match run_session(&config, reporter, &mut rng, interrupted()).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "could not start session");
            return ExitCode::FAILURE;
        }
    };

    match report.abort {
        None => ExitCode::SUCCESS,
        Some(AbortReason::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Some(_) => ExitCode::FAILURE,
    }
}
