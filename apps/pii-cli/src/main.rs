//! pii-sync binary
//!
//! JSON documents go to stdout (or `--out`); logs always go to stderr.

use clap::Parser;
use pii_cli::cli::Cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = pii_cli::run(cli) {
        eprintln!("{}: {}", err.kind(), err);
        std::process::exit(err.exit_code());
    }
}
