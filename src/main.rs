use clap::Parser;
use tracing_subscriber::EnvFilter;

use pokespider::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "pokespider=debug"
    } else {
        "pokespider=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    cli::run(cli).await
}
