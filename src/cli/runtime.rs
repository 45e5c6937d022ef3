use std::path::PathBuf;

use anyhow::{Context, Result};
use chatflow_verify::{HarnessConfig, VerifyResult};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::env::{CliArgs, LogFormat};

pub fn init_logging(level: &str, debug: bool, format: LogFormat) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout stays clean for --print-config
    match format {
        LogFormat::Human => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    Ok(())
}

pub struct LoadedConfig {
    pub config: HarnessConfig,
    pub path: Option<PathBuf>,
}

/// Priority: --config > ./config/chatflow.yaml > <config_dir>/chatflow-verify/config.yaml.
/// Only an explicitly named file has to exist.
fn resolve_config_path(explicit: Option<&PathBuf>) -> (Option<PathBuf>, bool) {
    if let Some(path) = explicit {
        return (Some(path.clone()), true);
    }
    let local = PathBuf::from("config/chatflow.yaml");
    if local.exists() {
        return (Some(local), false);
    }
    let user = dirs::config_dir().map(|mut path| {
        path.push("chatflow-verify");
        path.push("config.yaml");
        path
    });
    (user.filter(|path| path.exists()), false)
}

pub fn load_config(cli: &CliArgs) -> VerifyResult<LoadedConfig> {
    let (path, required) = resolve_config_path(cli.config.as_ref());
    let mut config = HarnessConfig::load(path.as_deref(), required)?;
    match &path {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    apply_cli_overrides(&mut config, cli);
    config.validate()?;
    Ok(LoadedConfig { config, path })
}

fn apply_cli_overrides(config: &mut HarnessConfig, cli: &CliArgs) {
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(dir) = &cli.artifact_dir {
        config.artifact_dir = dir.clone();
    }
    if let Some(chrome) = &cli.chrome {
        config.browser.chrome = Some(chrome.clone());
    }
    if let Some(ws_url) = &cli.ws_url {
        config.browser.ws_url = Some(ws_url.clone());
    }
    if cli.headful {
        config.browser.headless = Some(false);
    }
}
