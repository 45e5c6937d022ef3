//! Click primitive - click the resolved element at its centre

use crate::{
    errors::ActionError,
    locator::{check_status, resolver_script, ScriptOp},
    primitives::DefaultActionPrimitives,
    types::{ActionReport, ExecCtx, Locator},
};
use cdp_adapter::{Cdp, Point};
use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};

/// Execute click primitive
///
/// Steps:
/// 1. Resolve the locator in the page, scroll the match into view
/// 2. Refuse hidden or disabled targets
/// 3. Dispatch a left-button press/release at the element centre
pub async fn execute_click(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    locator: &Locator,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        locator = %locator,
        "Executing click primitive"
    );

    DefaultActionPrimitives::check_ctx(ctx)?;

    let script = resolver_script(locator, ScriptOp::Target);
    let value = primitives
        .adapter()
        .evaluate_script(primitives.page(), &script)
        .await?;
    check_status(&value, locator)?;
    let point = center_point(&value).ok_or_else(|| {
        ActionError::Internal(format!("resolver returned no coordinates for {locator}"))
    })?;

    debug!(x = point.x, y = point.y, "Dispatching mouse click");
    primitives
        .adapter()
        .dispatch_click(primitives.page(), point)
        .await?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(action_id = %ctx.action_id, latency_ms, "Click completed");

    Ok(ActionReport::success(started_at, latency_ms).with_target(locator.descriptor()))
}

fn center_point(value: &Value) -> Option<Point> {
    let x = value.get("x").and_then(Value::as_f64)?;
    let y = value.get("y").and_then(Value::as_f64)?;
    Some(Point { x, y })
}
