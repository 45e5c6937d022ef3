//! Navigate primitive - load a URL and wait for the document

use crate::{
    errors::ActionError,
    primitives::DefaultActionPrimitives,
    types::{ActionReport, ExecCtx},
};
use cdp_adapter::Cdp;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info};

const ALLOWED_SCHEMES: &[&str] = &["http://", "https://", "file://", "data:", "about:"];

pub(crate) fn validate_url(url: &str) -> Result<(), ActionError> {
    if url.trim().is_empty() {
        return Err(ActionError::Internal("URL cannot be empty".to_string()));
    }
    if !ALLOWED_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
        return Err(ActionError::Internal(format!("Invalid URL scheme: {url}")));
    }
    Ok(())
}

/// Execute navigate primitive
///
/// Issues `Page.navigate` and waits until the document is interactive, bounded by the
/// remaining time on `ctx`. There is no retry: a refused connection or a load that
/// outlives the deadline surfaces as `NavFailed` / `NavTimeout`.
pub async fn execute_navigate(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    url: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(action_id = %ctx.action_id, url = %url, "Executing navigate primitive");

    validate_url(url)?;
    DefaultActionPrimitives::check_ctx(ctx)?;
    if ctx.is_timeout() {
        return Err(ActionError::NavTimeout(
            "Context deadline exceeded".to_string(),
        ));
    }

    debug!("Issuing CDP Page.navigate command");
    primitives
        .adapter()
        .navigate(primitives.page(), url, ctx.remaining_time())
        .await?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(action_id = %ctx.action_id, latency_ms, "Navigate completed");

    Ok(ActionReport::success(started_at, latency_ms).with_target(url))
}
