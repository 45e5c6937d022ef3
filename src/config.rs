//! Configuration management module
//!
//! Every field defaults to the fixed chat scenario, so running with no file and no
//! environment performs exactly that scenario. Layers, lowest first: built-in
//! defaults, an optional YAML file, `CHATFLOW_*` environment variables (`__` between
//! nested keys, e.g. `CHATFLOW_TIMEOUTS__READY_MS`), then command-line flags.

use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::contract::ChatContract;
use crate::errors::{VerifyError, VerifyResult};
use crate::verification::streaming::AssistantSelection;

pub const ENV_PREFIX: &str = "CHATFLOW";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Entry page of the chat application.
    pub url: String,
    /// Directory receiving the screenshots, relative to the working directory.
    pub artifact_dir: PathBuf,
    /// Message sent once the chat is ready.
    pub message: String,
    /// Placeholder credential typed into the setup screen.
    pub api_key: String,
    pub timeouts: Timeouts,
    pub contract: ChatContract,
    pub streaming: StreamingSettings,
    pub browser: BrowserSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/".to_string(),
            artifact_dir: PathBuf::from("jules-scratch/verification"),
            message: "Hello, world!".to_string(),
            api_key: "dummy-google-api-key".to_string(),
            timeouts: Timeouts::default(),
            contract: ChatContract::default(),
            streaming: StreamingSettings::default(),
            browser: BrowserSettings::default(),
        }
    }
}

/// Bounds of every wait in the flow, in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub navigation_ms: u64,
    /// Short look for either the setup heading or the chat input.
    pub setup_probe_ms: u64,
    pub ready_ms: u64,
    pub echo_visible_ms: u64,
    pub reply_visible_ms: u64,
    pub stream_settle_ms: u64,
    pub stream_change_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            setup_probe_ms: 2_000,
            ready_ms: 10_000,
            echo_visible_ms: 5_000,
            reply_visible_ms: 10_000,
            stream_settle_ms: 1_000,
            stream_change_ms: 10_000,
            poll_interval_ms: 100,
        }
    }
}

impl Timeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn setup_probe(&self) -> Duration {
        Duration::from_millis(self.setup_probe_ms)
    }

    pub fn ready(&self) -> Duration {
        Duration::from_millis(self.ready_ms)
    }

    pub fn echo_visible(&self) -> Duration {
        Duration::from_millis(self.echo_visible_ms)
    }

    pub fn reply_visible(&self) -> Duration {
        Duration::from_millis(self.reply_visible_ms)
    }

    pub fn stream_settle(&self) -> Duration {
        Duration::from_millis(self.stream_settle_ms)
    }

    pub fn stream_change(&self) -> Duration {
        Duration::from_millis(self.stream_change_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    pub assistant: AssistantSelection,
    /// Attribute the reply element sets while (or once) streaming, e.g. `aria-busy`.
    /// When unset only the text diff is used.
    pub signal_attribute: Option<String>,
    pub signal_value: String,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            assistant: AssistantSelection::default(),
            signal_attribute: None,
            signal_value: "true".to_string(),
        }
    }
}

/// Browser overrides. Unset fields keep the adapter's own detection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub chrome: Option<PathBuf>,
    /// DevTools websocket of an already running browser.
    pub ws_url: Option<String>,
    pub headless: Option<bool>,
    pub no_sandbox: Option<bool>,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    pub launch_timeout_ms: Option<u64>,
}

impl HarnessConfig {
    /// Build the layered configuration. A missing `file` is an error only when the
    /// caller named it explicitly (`required`).
    pub fn load(file: Option<&Path>, required: bool) -> VerifyResult<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(::config::File::from(path).required(required));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: HarnessConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> VerifyResult<()> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|err| VerifyError::Config(format!("url '{}': {err}", self.url)))?;
        if !matches!(parsed.scheme(), "http" | "https" | "file") {
            return Err(VerifyError::Config(format!(
                "url '{}': unsupported scheme '{}'",
                self.url,
                parsed.scheme()
            )));
        }
        if self.message.trim().is_empty() {
            return Err(VerifyError::Config("message must not be empty".to_string()));
        }
        if self.api_key.is_empty() {
            return Err(VerifyError::Config("api_key must not be empty".to_string()));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(VerifyError::Config(
                "timeouts.poll_interval_ms must be positive".to_string(),
            ));
        }
        if let AssistantSelection::Authorship { attribute, .. } = &self.streaming.assistant {
            if attribute.is_empty() {
                return Err(VerifyError::Config(
                    "streaming.assistant.attribute must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Adapter configuration for one isolated session.
    pub fn cdp_config(&self) -> CdpConfig {
        let mut cfg = CdpConfig::default();
        let browser = &self.browser;
        if let Some(chrome) = &browser.chrome {
            cfg.executable = chrome.clone();
        }
        if let Some(headless) = browser.headless {
            cfg.headless = headless;
        }
        if let Some(no_sandbox) = browser.no_sandbox {
            cfg.no_sandbox = no_sandbox;
        }
        if let Some(width) = browser.window_width {
            cfg.window_width = width;
        }
        if let Some(height) = browser.window_height {
            cfg.window_height = height;
        }
        if let Some(launch) = browser.launch_timeout_ms {
            cfg.launch_timeout_ms = launch;
        }
        cfg.websocket_url = browser.ws_url.clone();
        cfg.default_deadline_ms = self.timeouts.navigation_ms;
        cfg
    }
}
