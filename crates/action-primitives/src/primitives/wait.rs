//! Wait primitive - bounded polling over page conditions
//!
//! Every wait re-resolves its locator on each iteration, sleeps cooperatively between
//! iterations and is bounded by `tokio::time::timeout`. The helpers are generic over
//! [`ActionPrimitives`] so they work against any session implementation.

use crate::{
    errors::ActionError,
    primitives::ActionPrimitives,
    types::{ActionReport, ElementState, ExecCtx, Locator, WaitCondition},
};
use chrono::Utc;
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Default pause between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Execute wait primitive
///
/// Polls `condition` every `interval` until it holds or `bound` elapses. Transient
/// protocol errors count as "not yet"; cancellation and a closed session abort at once.
pub async fn wait_for(
    primitives: &dyn ActionPrimitives,
    ctx: &ExecCtx,
    condition: &WaitCondition,
    bound: Duration,
    interval: Duration,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    debug!(
        action_id = %ctx.action_id,
        condition = %condition,
        bound_ms = bound.as_millis() as u64,
        "Executing wait primitive"
    );

    if ctx.is_cancelled() {
        return Err(ActionError::Interrupted("Context cancelled".to_string()));
    }

    match timeout(bound, poll_until(primitives, ctx, condition, interval)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(condition = %condition, error = %err, "Wait aborted");
            return Err(err);
        }
        Err(_) => {
            warn!(condition = %condition, bound_ms = bound.as_millis() as u64, "Wait timed out");
            return Err(ActionError::WaitTimeout {
                condition: condition.to_string(),
                bound,
            });
        }
    }

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(
        action_id = %ctx.action_id,
        condition = %condition,
        latency_ms,
        "Wait condition met"
    );
    Ok(ActionReport::success(started_at, latency_ms).with_target(condition.to_string()))
}

async fn poll_until(
    primitives: &dyn ActionPrimitives,
    ctx: &ExecCtx,
    condition: &WaitCondition,
    interval: Duration,
) -> Result<(), ActionError> {
    loop {
        if ctx.is_cancelled() {
            return Err(ActionError::Interrupted("Context cancelled".to_string()));
        }
        match condition_met(primitives, ctx, condition).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(err) if err.is_transient() => {
                debug!(condition = %condition, error = %err, "Poll failed, retrying");
            }
            Err(err) => return Err(err),
        }
        sleep(interval).await;
    }
}

fn condition_met<'a>(
    primitives: &'a dyn ActionPrimitives,
    ctx: &'a ExecCtx,
    condition: &'a WaitCondition,
) -> BoxFuture<'a, Result<bool, ActionError>> {
    Box::pin(async move {
        Ok(match condition {
            WaitCondition::Visible(locator) => primitives.inspect(ctx, locator).await?.visible,
            WaitCondition::TextPresent(text) => {
                primitives
                    .inspect(ctx, &Locator::text(text.clone()))
                    .await?
                    .visible
            }
            WaitCondition::TextDiffers { locator, baseline } => {
                let state = primitives.inspect(ctx, locator).await?;
                matches!(state.text, Some(ref current) if current != baseline)
            }
            WaitCondition::AttributeEquals {
                locator,
                name,
                value,
            } => {
                let state = primitives.inspect(ctx, locator).await?;
                state.attributes.get(name) == Some(value)
            }
            WaitCondition::AnyOf(inner) => {
                for cond in inner {
                    if condition_met(primitives, ctx, cond).await? {
                        return Ok(true);
                    }
                }
                false
            }
        })
    })
}

/// Wait until `locator` is visible.
pub async fn expect_visible(
    primitives: &dyn ActionPrimitives,
    ctx: &ExecCtx,
    locator: &Locator,
    bound: Duration,
    interval: Duration,
) -> Result<ActionReport, ActionError> {
    wait_for(
        primitives,
        ctx,
        &WaitCondition::Visible(locator.clone()),
        bound,
        interval,
    )
    .await
}

/// Wait until an innermost element containing `text` (case-sensitive) is visible.
pub async fn expect_text_present(
    primitives: &dyn ActionPrimitives,
    ctx: &ExecCtx,
    text: &str,
    bound: Duration,
    interval: Duration,
) -> Result<ActionReport, ActionError> {
    wait_for(
        primitives,
        ctx,
        &WaitCondition::TextPresent(text.to_string()),
        bound,
        interval,
    )
    .await
}

/// Wait until the text of `locator` differs from `baseline`.
pub async fn expect_text_changes(
    primitives: &dyn ActionPrimitives,
    ctx: &ExecCtx,
    locator: &Locator,
    baseline: &str,
    bound: Duration,
    interval: Duration,
) -> Result<ActionReport, ActionError> {
    wait_for(
        primitives,
        ctx,
        &WaitCondition::TextDiffers {
            locator: locator.clone(),
            baseline: baseline.to_string(),
        },
        bound,
        interval,
    )
    .await
}

/// Single non-blocking visibility check.
pub async fn probe_visible(
    primitives: &dyn ActionPrimitives,
    ctx: &ExecCtx,
    locator: &Locator,
) -> Result<bool, ActionError> {
    Ok(primitives.inspect(ctx, locator).await?.visible)
}

/// Poll several locators and return the index of the first one seen visible, or
/// `None` once `bound` elapses. Never fails on absence or on a transient protocol error.
pub async fn first_visible(
    primitives: &dyn ActionPrimitives,
    ctx: &ExecCtx,
    locators: &[Locator],
    bound: Duration,
    interval: Duration,
) -> Result<Option<usize>, ActionError> {
    let poll = async move {
        loop {
            for (index, locator) in locators.iter().enumerate() {
                match probe_visible(primitives, ctx, locator).await {
                    Ok(true) => return Ok::<usize, ActionError>(index),
                    Ok(false) => {}
                    Err(err) if err.is_transient() => {
                        debug!(locator = %locator.descriptor(), error = %err, "Probe failed, retrying");
                    }
                    Err(err) => return Err(err),
                }
            }
            sleep(interval).await;
        }
    };

    match timeout(bound, poll).await {
        Ok(Ok(index)) => Ok(Some(index)),
        Ok(Err(err)) => Err(err),
        Err(_) => Ok(None),
    }
}

/// Capture the current state of `locator`, failing if nothing matches.
pub async fn snapshot(
    primitives: &dyn ActionPrimitives,
    ctx: &ExecCtx,
    locator: &Locator,
) -> Result<ElementState, ActionError> {
    let state = primitives.inspect(ctx, locator).await?;
    if !state.attached() {
        return Err(ActionError::AnchorNotFound(locator.descriptor()));
    }
    Ok(state)
}
