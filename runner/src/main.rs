use clap::{ArgAction, Parser};
use sdnsim_runner::{
    collector::Collector,
    config::RunnerConfig,
    observer::Fanout,
    serialize::{ConfigSerializer, JsonSerializer},
    CollectingObserver, ProcessEngine, ProcessRunner, RunRequest, Scheduler, TracingObserver,
};
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Run simulation experiments against an external engine
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// runner configuration file
    #[arg(short, long, default_value = "sdnsim.yaml")]
    config: PathBuf,
    /// maximum number of concurrently running engines, overrides executor.capacity
    #[arg(long)]
    capacity: Option<usize>,
    /// output root, overrides output
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// only generate the simulation configs, do not run the engine
    #[arg(long)]
    dry_run: bool,
    /// increase log verbosity, ignored if RUST_LOG is set
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let mut config = match RunnerConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load {}: {e}", cli.config.to_string_lossy());
            return ExitCode::FAILURE;
        }
    };

    if let Some(capacity) = cli.capacity {
        config.executor.capacity = capacity;
    }
    if let Some(output) = cli.output {
        config.output = output;
    }

    if config.preflight_checks() {
        error!("Preflight checks failed, see above");
        return ExitCode::FAILURE;
    }

    let (experiments, failed_loads) = match Collector::load(&config.experiments) {
        Ok(collector) => collector.experiments(),
        Err(e) => {
            error!("Failed to collect experiments: {e}");
            return ExitCode::FAILURE;
        }
    };

    if failed_loads > 0 {
        error!("{failed_loads} experiment descriptors failed to load");
        return ExitCode::FAILURE;
    }
    if experiments.is_empty() {
        warn!("No experiments found, nothing to do");
        return ExitCode::SUCCESS;
    }

    let serializer = Arc::new(JsonSerializer::new(&config.configs));

    if cli.dry_run {
        let mut contains_error = false;

        for experiment in experiments.iter() {
            match serializer.materialize(experiment) {
                Ok(path) => info!(experiment = %experiment.name, "Generated {}", path.to_string_lossy()),
                Err(e) => {
                    error!(experiment = %experiment.name, "Failed to generate config: {e}");
                    contains_error = true;
                }
            }
        }

        return if contains_error {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    let engine = ProcessEngine::new(&config.engine.exec).with_params(config.engine.params.iter());
    let collected = Arc::new(CollectingObserver::new());
    let observer = Fanout::new()
        .with(Arc::new(TracingObserver))
        .with(collected.clone());

    let scheduler = match Scheduler::new(
        config.executor.capacity,
        ProcessRunner::new(serializer, Arc::new(engine)),
    ) {
        Ok(scheduler) => scheduler.with_observer(Arc::new(observer)),
        Err(e) => {
            error!("Failed to create scheduler: {e}");
            return ExitCode::FAILURE;
        }
    };

    let total = experiments.len();

    for experiment in experiments {
        if let Err(e) = scheduler.submit(RunRequest::new(experiment, &config.output)) {
            error!("Failed to submit experiment: {e}");
            return ExitCode::FAILURE;
        }
    }

    if let Err(e) = scheduler.start().and_then(|_| scheduler.stop()) {
        error!("Scheduler failed: {e}");
        return ExitCode::FAILURE;
    }

    let (succeeded, failed) = collected.summary();

    info!(
        "Done with {total} experiments: {} succeeded, {} failed",
        succeeded.len(),
        failed.len()
    );

    if failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        error!("Failed experiments: {}", collected.failed_names());
        ExitCode::FAILURE
    }
}
