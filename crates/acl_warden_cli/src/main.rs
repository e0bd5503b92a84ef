use acl_warden_cli::args::Cli;
use acl_warden_cli::run::run;
use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().pretty())
        .with(
            EnvFilter::try_from_env("ACL_WARDEN_LOG")
                .unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .init();

    if let Err(e) = run(&cli).await {
        error!("Error: {e}");
        std::process::exit(1);
    }
}
