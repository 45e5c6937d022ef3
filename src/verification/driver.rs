//! Interaction driver: types the message and presses send.

use action_primitives::ActionPrimitives;
use std::time::Duration;
use tracing::info;

use crate::contract::ChatContract;
use crate::errors::{FlowStage, VerifyError, VerifyResult};
use crate::session::Session;

/// Replace the chat input's content with `text` and invoke the send control.
///
/// Both elements are resolved once, at call time. A missing or disabled element
/// fails with the descriptor that did not match.
pub async fn send(
    session: &Session,
    contract: &ChatContract,
    text: &str,
    bound: Duration,
) -> VerifyResult<()> {
    let ctx = session.ctx(bound);
    session
        .fill(&ctx, &contract.message_input(), text)
        .await
        .map_err(|err| VerifyError::from_action(FlowStage::SendMessage, err))?;
    session
        .click(&ctx, &contract.send_control())
        .await
        .map_err(|err| VerifyError::from_action(FlowStage::SendMessage, err))?;
    info!(stage = %FlowStage::SendMessage, text_len = text.len(), "message sent");
    Ok(())
}
