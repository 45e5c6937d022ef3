//! Inspect primitive - one non-blocking resolution of a locator

use crate::{
    errors::ActionError,
    locator::{parse_element_state, resolver_script, ScriptOp},
    primitives::DefaultActionPrimitives,
    types::{ElementState, ExecCtx, Locator},
};
use cdp_adapter::Cdp;
use tracing::trace;

pub async fn execute_inspect(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    locator: &Locator,
) -> Result<ElementState, ActionError> {
    DefaultActionPrimitives::check_ctx(ctx)?;
    let script = resolver_script(locator, ScriptOp::Inspect);
    let value = primitives
        .adapter()
        .evaluate_script(primitives.page(), &script)
        .await?;
    let state = parse_element_state(value)?;
    trace!(
        action_id = %ctx.action_id,
        locator = %locator,
        count = state.count,
        visible = state.visible,
        "inspected"
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use crate::primitives::test_support::{evaluated, primitives, ScriptedTransport};
    use crate::{ActionPrimitives, Locator};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn reports_state_of_nth_match() {
        let transport = Arc::new(ScriptedTransport::new(|method, _| match method {
            "Runtime.evaluate" => evaluated(json!({
                "count": 2,
                "visible": true,
                "enabled": true,
                "text": "Hello there",
                "attributes": { "role": "article" }
            })),
            _ => json!({}),
        }));
        let (prims, ctx) = primitives(transport.clone()).await;

        let state = prims
            .inspect(&ctx, &Locator::css("div[role=article]").nth(1))
            .await
            .unwrap();
        assert_eq!(state.count, 2);
        assert_eq!(state.text.as_deref(), Some("Hello there"));

        let expression = transport.params_of("Runtime.evaluate")[0]["expression"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(expression.contains("const nth = 1;"));
        assert!(expression.contains("div[role=article]"));
    }
}
