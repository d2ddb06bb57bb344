use clap::Parser;
use keysmith::cli::Cli;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    keysmith::cli::run(Cli::parse()).await
}

/// `KEYSMITH_LOG=<file>` logs to that file at debug level; otherwise `RUST_LOG` drives stderr.
fn init_logging() {
    if let Ok(path) = std::env::var("KEYSMITH_LOG")
        && !path.is_empty()
    {
        use std::fs::File;
        use tracing_subscriber::prelude::*;
        match File::create(&path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false);
                let filter = tracing_subscriber::EnvFilter::new("keysmith=debug");
                let _ = tracing_subscriber::registry()
                    .with(file_layer.with_filter(filter))
                    .try_init();
            }
            Err(err) => {
                eprintln!("Failed to create log file {path}: {err}");
            }
        }
    } else if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    }
}
