use clap::Parser;
use tracing_subscriber::EnvFilter;

use uncertainty_nn::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("uncertainty_nn=info")))
        .with_target(false)
        .init();

    run(Cli::parse())?;
    Ok(())
}
