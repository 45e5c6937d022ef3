//! Fill primitive - replace the content of an editable element

use crate::{
    errors::ActionError,
    locator::{check_status, resolver_script, ScriptOp},
    primitives::DefaultActionPrimitives,
    types::{ActionReport, ExecCtx, Locator},
};
use cdp_adapter::Cdp;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Execute fill primitive
///
/// Focuses the element and selects its content, then inserts `text` over the selection
/// so the previous value is fully replaced. An empty `text` clears the element in-page.
pub async fn execute_fill(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    locator: &Locator,
    text: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        locator = %locator,
        text_len = text.len(),
        "Executing fill primitive"
    );

    DefaultActionPrimitives::check_ctx(ctx)?;

    let clear = text.is_empty();
    let script = resolver_script(locator, ScriptOp::Focus { clear });
    let value = primitives
        .adapter()
        .evaluate_script(primitives.page(), &script)
        .await?;
    check_status(&value, locator)?;

    if !clear {
        debug!("Inserting text over selection");
        primitives
            .adapter()
            .insert_text(primitives.page(), text)
            .await?;
    }

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(action_id = %ctx.action_id, latency_ms, "Fill completed");

    Ok(ActionReport::success(started_at, latency_ms).with_target(locator.descriptor()))
}
