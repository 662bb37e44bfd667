//! Microgrid simulator entry point: CLI, config loading and device startup.

use std::process;
use std::sync::Arc;

use tracing::{error, info};

use microgrid_sim::bus::LocalBus;
use microgrid_sim::cli::{self, Command};
use microgrid_sim::config::SimulatorConfig;
use microgrid_sim::runner;
use microgrid_sim::sim::clock::SystemClock;
use microgrid_sim::telemetry;

#[tokio::main]
async fn main() {
    let opts = match cli::parse_args() {
        Ok(Command::Run(opts)) => opts,
        Ok(Command::Help) => {
            cli::print_usage();
            return;
        }
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(2);
        }
    };

    let mut config = match SimulatorConfig::from_toml_file(&opts.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    if let Some(seed) = opts.seed {
        config.simulation.seed = seed;
    }
    let filter = opts.log.as_deref().unwrap_or(&config.simulation.log_filter);
    telemetry::init_tracing(filter);

    let bus = Arc::new(LocalBus::new());
    let sim = match runner::start(&config, bus, Arc::new(SystemClock)) {
        Ok(sim) => sim,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("{e}");
            process::exit(1);
        }
    };

    info!(config = %opts.config.display(), seed = config.simulation.seed, "running; Ctrl-C to stop");
    telemetry::shutdown_signal().await;
    info!("shutting down");
    sim.abort();
}
