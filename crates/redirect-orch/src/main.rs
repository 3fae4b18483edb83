//! redirectctl entry point.
//!
//! Opens a redirection controller on the configured backend, programs a
//! redirection plan and prints the resulting inspection chains as JSON.

use clap::Parser;
use redirect_orch::audit::{init_logging, init_logging_pretty};
use redirect_orch::config::{ControllerConfig, LogFormat, RedirectionPlan, DEFAULT_CONFIG_PATH};
use redirect_orch::RedirectionController;
use redirect_types::{ElementId, InspectionHookElement};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Traffic redirection control
#[derive(Parser, Debug)]
#[command(name = "redirectctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Controller configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Redirection plan to apply
    #[arg(short = 'p', long)]
    plan: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match ControllerConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("redirectctl: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Err(e) = config.validate() {
        eprintln!("redirectctl: {}", e);
        return ExitCode::FAILURE;
    }

    match config.log_format {
        LogFormat::Json => init_logging(&config.log_level),
        LogFormat::Pretty => init_logging_pretty(&config.log_level),
    }

    info!(
        backend = ?config.backend,
        controller = %config.controller_name,
        endpoint = %config.endpoint,
        "Starting redirectctl"
    );

    match run(&config, args.plan) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "redirectctl failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &ControllerConfig, plan: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let plan = match plan {
        Some(path) => RedirectionPlan::load(path)?,
        None => RedirectionPlan::default(),
    };
    plan.validate()?;

    let controller = RedirectionController::open(config.build_driver()?, config.controller_config())?;
    let applied = plan.apply(&controller)?;

    // Chains of everything the plan inspects.
    let mut chains: BTreeMap<ElementId, Vec<InspectionHookElement>> = BTreeMap::new();
    for hook in controller.inspection_hooks() {
        for element in hook.inspected.iter() {
            chains
                .entry(element.clone())
                .or_insert_with(|| controller.inspection_chain(element));
        }
    }

    let report = json!({
        "controller": controller.name(),
        "driver": controller.driver_name(),
        "applied": applied,
        "chains": chains,
        "stats": controller.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    controller.close()?;
    Ok(())
}
