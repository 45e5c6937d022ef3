//! Artifact recorder
//!
//! Full-page PNG snapshots written to fixed paths. Each run overwrites the previous
//! files. A failed capture is returned to the caller, which decides its precedence.

use action_primitives::ActionPrimitives;
use cdp_adapter::ScreenshotOptions;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use crate::errors::{VerifyError, VerifyResult};
use crate::session::Session;

/// Captured right after the setup step, before the chat input is awaited.
pub const DEBUG_ARTIFACT: &str = "debug_before_chat_input.png";
/// Captured once the streamed reply has been observed.
pub const FINAL_ARTIFACT: &str = "verification.png";

#[derive(Clone, Debug, Serialize)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub bytes: usize,
    pub captured_at: DateTime<Utc>,
}

/// Write a full-page snapshot of the session's page to `path`.
pub async fn capture(session: &Session, path: &Path, bound: Duration) -> VerifyResult<ArtifactRecord> {
    let write_error = |reason: String| VerifyError::ArtifactWrite {
        path: path.to_path_buf(),
        reason,
    };

    let ctx = session.ctx(bound);
    let image = session
        .screenshot(&ctx, &ScreenshotOptions::default())
        .await
        .map_err(|err| write_error(err.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| write_error(err.to_string()))?;
    }
    fs::write(path, &image)
        .await
        .map_err(|err| write_error(err.to_string()))?;

    Ok(ArtifactRecord {
        path: path.to_path_buf(),
        bytes: image.len(),
        captured_at: Utc::now(),
    })
}

#[derive(Clone, Debug)]
pub struct ArtifactRecorder {
    dir: PathBuf,
    bound: Duration,
}

impl ArtifactRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            bound: Duration::from_secs(30),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub async fn record(&self, session: &Session, name: &str) -> VerifyResult<ArtifactRecord> {
        let path = self.path_of(name);
        match capture(session, &path, self.bound).await {
            Ok(record) => {
                info!(path = %record.path.display(), bytes = record.bytes, "artifact written");
                Ok(record)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "artifact capture failed");
                Err(err)
            }
        }
    }
}
