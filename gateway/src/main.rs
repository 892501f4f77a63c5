mod config;
mod telemetry;

use clap::{Args, Parser};
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gateway", about = "Aggregates users and entries from a downstream API")]
enum CliCommand {
    /// Serve the gateway
    Run(ConfigArgs),
    /// Load and validate the config file, then exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let (args, serve) = match cli {
        CliCommand::Run(args) => (args, true),
        CliCommand::CheckConfig(args) => (args, false),
    };

    let config = match Config::load(&args.config_file_path, |key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", args.config_file_path.display());
            return ExitCode::FAILURE;
        }
    };

    if !serve {
        println!("{}: ok", args.config_file_path.display());
        return ExitCode::SUCCESS;
    }

    let _sentry_guard = match telemetry::init_logging(config.common.logging.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("could not initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(metrics) = &config.common.metrics
        && let Err(e) = telemetry::init_metrics(metrics)
    {
        tracing::error!(error = %e, "Could not initialize metrics");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Could not start runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(aggregator::run(config.gateway)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Gateway stopped");
            ExitCode::FAILURE
        }
    }
}
