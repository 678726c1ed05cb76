//! Kiln - task cache and staging tooling

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use cli::Cli;

fn main() -> anyhow::Result<()> {
    let _guard = init_tracing();

    let cli = Cli::parse();
    cli.execute()
}

/// Console layer filtered by RUST_LOG (default: warn), plus debug-level
/// JSON written daily to ~/.kiln/logs/
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let Some(log_dir) = log_directory() else {
        tracing_subscriber::registry().with(console).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::daily(&log_dir, "kiln.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(console)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_target(true)
                .with_filter(EnvFilter::new("debug")),
        )
        .init();

    Some(guard)
}

fn log_directory() -> Option<std::path::PathBuf> {
    let log_dir = dirs::home_dir()?.join(".kiln").join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir)
}
