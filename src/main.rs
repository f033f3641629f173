use anyhow::Result;
use bankbook::cli::Cli;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    cli.run().await
}

/// Logs go to stderr so that report and export output on stdout stays clean.
/// `RUST_LOG` overrides the default level.
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "bankbook=debug" } else { "bankbook=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
