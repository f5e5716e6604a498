use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use drawbridge::config::load_config;
use drawbridge::observability::logging;
use drawbridge::{App, Shutdown};

/// Layer-7 HTTP reverse proxy and load balancer.
#[derive(Parser)]
#[command(name = "drawbridge", version)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "configs/config.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Configuration problems abort before logging is even configured.
    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("drawbridge: {error}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.monitoring.logging);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "drawbridge starting"
    );

    let app = match App::build(config) {
        Ok(app) => app,
        Err(error) => {
            tracing::error!(error = %error, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    match app.run(Shutdown::new()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "Fatal runtime error");
            ExitCode::FAILURE
        }
    }
}
