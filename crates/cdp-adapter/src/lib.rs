//! Chromium DevTools Protocol adapter for chatflow-verify.
//!
//! The adapter owns exactly one browser process, one isolated browser context and one page.
//! Higher layers talk to it through the [`Cdp`] trait; the wire is abstracted behind
//! [`CdpTransport`] so the adapter can be exercised without a real browser.

use std::{env, path::PathBuf};
use which::which;

pub mod ids {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// Unique identifier for the browser instance managed by the adapter.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct BrowserId(pub Uuid);

    /// Unique identifier for a page/tab.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct PageId(pub Uuid);

    impl BrowserId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }

    impl PageId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }
}

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        #[error("browser launch failed")]
        LaunchFailed,
        #[error("navigation failed")]
        NavFailed,
        #[error("navigation timed out")]
        NavTimeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("session closed")]
        SessionClosed,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                data: None,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }
    }
}

pub mod config {
    use crate::detect_chrome_executable;
    use serde::{Deserialize, Serialize};
    use std::{env, path::PathBuf};

    /// Configuration for launching and tuning the adapter.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct CdpConfig {
        pub executable: PathBuf,
        /// Profile directory; `None` launches with a throwaway profile per session.
        pub user_data_dir: Option<PathBuf>,
        pub headless: bool,
        pub no_sandbox: bool,
        pub window_width: u32,
        pub window_height: u32,
        pub default_deadline_ms: u64,
        pub launch_timeout_ms: u64,
        pub heartbeat_interval_ms: u64,
        /// Attach to an already running browser instead of launching one.
        pub websocket_url: Option<String>,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                executable: detect_chrome_executable().unwrap_or_default(),
                user_data_dir: None,
                headless: resolve_headless_default(),
                no_sandbox: env_flag("CHATFLOW_DISABLE_SANDBOX"),
                window_width: 1280,
                window_height: 800,
                default_deadline_ms: 30_000,
                launch_timeout_ms: 20_000,
                heartbeat_interval_ms: 15_000,
                websocket_url: None,
            }
        }
    }

    fn resolve_headless_default() -> bool {
        // "0", "false", "no", "off" means headful
        match env::var("CHATFLOW_HEADLESS") {
            Ok(value) => {
                let lower = value.to_ascii_lowercase();
                !matches!(lower.as_str(), "0" | "false" | "no" | "off")
            }
            Err(_) => true,
        }
    }

    fn env_flag(key: &str) -> bool {
        env::var(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false)
    }
}

/// Locate a Chrome/Chromium binary: `CHATFLOW_CHROME`, then `PATH`, then well-known locations.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("CHATFLOW_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    let skip_defaults = env::var("CHATFLOW_SKIP_OS_PATHS")
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);
    if skip_defaults {
        return None;
    }

    os_specific_chrome_paths()
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let mut paths = Vec::new();
        for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
            if let Ok(value) = env::var(key) {
                let root = PathBuf::from(value.trim());
                paths.push(root.join("Google/Chrome/Application/chrome.exe"));
                paths.push(root.join("Chromium/Application/chrome.exe"));
            }
        }
        paths
    }

    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/snap/bin/chromium"),
        ]
    }
}

pub mod adapter;
pub mod commands;
pub mod metrics;
pub mod transport;
pub mod util;

pub use adapter::{Cdp, CdpAdapter};
pub use commands::*;
pub use config::CdpConfig;
pub use error::{AdapterError, AdapterErrorKind};
pub use ids::{BrowserId, PageId};
pub use metrics::AdapterMetricsSnapshot;
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget};

#[cfg(test)]
mod tests {
    use super::{chrome_executable_names, detect_chrome_executable};
    use serial_test::serial;
    use std::{env, fs};
    use tempfile::tempdir;

    fn restore(key: &str, value: Option<String>) {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    #[test]
    #[serial]
    fn detects_from_env_var() {
        let dir = tempdir().unwrap();
        let exe_path = dir.path().join("my-chrome");
        fs::write(&exe_path, b"").unwrap();
        let original = env::var("CHATFLOW_CHROME").ok();
        env::set_var("CHATFLOW_CHROME", exe_path.to_string_lossy().to_string());
        let detected = detect_chrome_executable();
        restore("CHATFLOW_CHROME", original);
        assert_eq!(detected, Some(exe_path));
    }

    #[test]
    #[serial]
    fn detects_from_path_entries() {
        let dir = tempdir().unwrap();
        let name = chrome_executable_names()[0];
        let exe_path = dir.path().join(name);
        fs::write(&exe_path, b"").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&exe_path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let original_path = env::var("PATH").ok();
        let original_env = env::var("CHATFLOW_CHROME").ok();
        let skip_flag = env::var("CHATFLOW_SKIP_OS_PATHS").ok();
        env::set_var("CHATFLOW_CHROME", "");
        env::set_var("CHATFLOW_SKIP_OS_PATHS", "1");
        env::set_var("PATH", dir.path());
        let detected = detect_chrome_executable();
        restore("PATH", original_path);
        restore("CHATFLOW_CHROME", original_env);
        restore("CHATFLOW_SKIP_OS_PATHS", skip_flag);
        assert_eq!(detected, Some(exe_path));
    }

    #[test]
    #[serial]
    fn missing_env_path_falls_through() {
        let original_path = env::var("PATH").ok();
        let original_env = env::var("CHATFLOW_CHROME").ok();
        let skip_flag = env::var("CHATFLOW_SKIP_OS_PATHS").ok();
        let empty = tempdir().unwrap();
        env::set_var("CHATFLOW_CHROME", "/definitely/not/a/chrome");
        env::set_var("CHATFLOW_SKIP_OS_PATHS", "1");
        env::set_var("PATH", empty.path());
        let detected = detect_chrome_executable();
        restore("PATH", original_path);
        restore("CHATFLOW_CHROME", original_env);
        restore("CHATFLOW_SKIP_OS_PATHS", skip_flag);
        assert_eq!(detected, None);
    }
}
