use anyhow::{Context, Result};
use clap::Parser;
use netprobe::client::{self, Reporter};
use netprobe::config::{Cli, Mode};
use netprobe::logging::init_logging_with_config;
use netprobe::server;
use netprobe::shutdown::{install_signal_handlers, ShutdownFlag};
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    init_logging_with_config(&cli.log_level, cli.is_json_format());

    let mode = match cli.resolve() {
        Ok(mode) => mode,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    install_signal_handlers();
    let shutdown = ShutdownFlag::new();

    if let Err(e) = run(mode, &shutdown) {
        error!(error = %e, "Netprobe failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(mode: Mode, shutdown: &ShutdownFlag) -> Result<()> {
    match mode {
        Mode::Server(config) => {
            server::run(&config, shutdown)
                .with_context(|| format!("{} server on {}", config.transport, config.bind))?;
            info!("Server stopped");
        }
        Mode::Client(config) => {
            let report = client::run(&config, shutdown)
                .with_context(|| format!("{} client to {}", config.transport, config.target))?;
            Reporter.print_results(&report)?;
            if report.measurement.interrupted {
                info!("Measurement interrupted by signal");
            }
        }
    }
    Ok(())
}
