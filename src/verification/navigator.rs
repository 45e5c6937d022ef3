//! Navigator: loads the entry page.

use action_primitives::{ActionPrimitives, ActionReport};
use std::time::Duration;
use tracing::info;

use crate::errors::{FlowStage, VerifyError, VerifyResult};
use crate::session::Session;

/// Load `url` and wait for an interactive document within `bound`. A refused
/// connection or a slow load is a navigation failure; nothing is retried.
pub async fn open(session: &Session, url: &str, bound: Duration) -> VerifyResult<ActionReport> {
    let ctx = session.ctx(bound);
    let report = session
        .navigate(&ctx, url)
        .await
        .map_err(|err| VerifyError::from_action(FlowStage::Navigate, err))?;
    info!(stage = %FlowStage::Navigate, url, latency_ms = report.latency_ms, "entry page loaded");
    Ok(report)
}
