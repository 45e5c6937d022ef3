use std::process::ExitCode;

use anyhow::Result;
use cdp_adapter::metrics;
use clap::Parser;
use chatflow_verify::{verify, ChromiumLauncher};
use tracing::{debug, error, info};

use super::env::CliArgs;
use super::runtime::{init_logging, load_config, LoadedConfig};

pub async fn run() -> Result<ExitCode> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.log_format)?;

    info!(
        "Starting chatflow-verify v{} ({} built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_DATE")
    );

    let LoadedConfig { config, path } = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(err) => {
            error!("Configuration rejected: {}", err);
            eprintln!("error: {err}");
            return Ok(ExitCode::from(err.exit_code()));
        }
    };

    if cli.print_config {
        let yaml = serde_yaml::to_string(&config)?;
        print!("{yaml}");
        return Ok(ExitCode::SUCCESS);
    }

    info!(
        url = %config.url,
        artifact_dir = %config.artifact_dir.display(),
        config_file = ?path,
        "Verifying chat flow"
    );
    let launcher = ChromiumLauncher::new(config.cdp_config());
    let outcome = verify(&config, &launcher).await;

    let cdp = metrics::snapshot();
    info!(
        commands = cdp.commands,
        failures = cdp.command_failures,
        latency_total_us = cdp.command_latency_total_us,
        heartbeat_failures = cdp.heartbeat_failures,
        "CDP command metrics"
    );
    if tracing::enabled!(tracing::Level::DEBUG) {
        debug!(exposition = %metrics::encode_text(), "CDP metrics exposition");
    }

    match outcome {
        Ok(report) => {
            info!(
                page_state = %report.page_state,
                evidence = ?report.streaming.evidence,
                elapsed_ms = report.elapsed_ms,
                "Verification passed"
            );
            if let Ok(json) = serde_json::to_string(&report) {
                debug!(report = %json, "Flow report");
            }
            for artifact in &report.artifacts {
                println!("{}", artifact.path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!("Verification failed: {}", err);
            eprintln!("error: {err}");
            Ok(ExitCode::from(err.exit_code()))
        }
    }
}
