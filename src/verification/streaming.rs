//! Streaming detector
//!
//! Tells apart three outcomes for the assistant reply:
//! - never appears: fails at the visibility wait (`reply_visible`)
//! - appears but stays static: fails at the change wait (`reply_streaming`)
//! - appears and keeps changing: passes
//!
//! The check is two-phase on purpose. The reply is located and snapshotted first, then
//! after a settle interval its text must diverge from that snapshot within a second
//! bound. When the application exposes a streaming attribute, seeing it with the
//! configured value also counts as evidence.

use action_primitives::{
    expect_text_changes, expect_visible, snapshot, wait_for, ActionPrimitives, Locator,
    WaitCondition,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::contract::ChatContract;
use crate::errors::{FlowStage, VerifyError, VerifyResult};
use crate::session::Session;

/// How the assistant's reply element is picked among the rendered messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AssistantSelection {
    /// N-th message in DOM order. Index 1 is the first reply, index 0 being the
    /// user's own echoed message. Breaks as soon as the layout adds or reorders
    /// messages.
    Positional { index: usize },
    /// First message whose authorship attribute names the assistant.
    Authorship { attribute: String, value: String },
}

impl Default for AssistantSelection {
    fn default() -> Self {
        AssistantSelection::Positional { index: 1 }
    }
}

impl AssistantSelection {
    /// Authorship selection on the conventional `data-message-role="assistant"`.
    pub fn by_authorship() -> Self {
        AssistantSelection::Authorship {
            attribute: "data-message-role".to_string(),
            value: "assistant".to_string(),
        }
    }

    pub fn locator(&self, contract: &ChatContract) -> Locator {
        match self {
            AssistantSelection::Positional { index } => contract.messages().nth(*index),
            AssistantSelection::Authorship { attribute, value } => {
                contract.messages_where(attribute, value)
            }
        }
    }
}

/// Text of the reply at one instant. Superseded, never updated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextSnapshot {
    text: String,
    taken_at: DateTime<Utc>,
}

impl TextSnapshot {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            taken_at: Utc::now(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEvidence {
    TextChanged,
    CompletionSignal,
}

/// What the detector saw on a passing run.
#[derive(Clone, Debug, Serialize)]
pub struct StreamObservation {
    pub locator: String,
    pub baseline: TextSnapshot,
    pub evidence: StreamEvidence,
    pub appeared_after_ms: u64,
    pub changed_after_ms: u64,
}

#[derive(Clone, Debug)]
pub struct StreamingDetector {
    locator: Locator,
    appear_bound: Duration,
    settle: Duration,
    change_bound: Duration,
    interval: Duration,
    signal: Option<(String, String)>,
}

impl StreamingDetector {
    pub fn new(
        locator: Locator,
        appear_bound: Duration,
        settle: Duration,
        change_bound: Duration,
    ) -> Self {
        Self {
            locator,
            appear_bound,
            settle,
            change_bound,
            interval: action_primitives::DEFAULT_POLL_INTERVAL,
            signal: None,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        let timeouts = &config.timeouts;
        let detector = Self::new(
            config.streaming.assistant.locator(&config.contract),
            timeouts.reply_visible(),
            timeouts.stream_settle(),
            timeouts.stream_change(),
        )
        .with_poll_interval(timeouts.poll_interval());
        match &config.streaming.signal_attribute {
            Some(name) => detector.with_completion_signal(name, &config.streaming.signal_value),
            None => detector,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Also accept `name="value"` on the reply element as proof of streaming.
    pub fn with_completion_signal(mut self, name: &str, value: &str) -> Self {
        self.signal = Some((name.to_string(), value.to_string()));
        self
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub async fn detect(&self, session: &Session) -> VerifyResult<StreamObservation> {
        let started = Instant::now();

        let ctx = session.ctx(self.appear_bound);
        expect_visible(session, &ctx, &self.locator, self.appear_bound, self.interval)
            .await
            .map_err(|err| VerifyError::from_action(FlowStage::ReplyVisible, err))?;
        let appeared_after_ms = started.elapsed().as_millis() as u64;

        let state = snapshot(session, &ctx, &self.locator)
            .await
            .map_err(|err| VerifyError::from_action(FlowStage::ReplyVisible, err))?;
        let baseline = TextSnapshot::new(state.text.unwrap_or_default());
        debug!(
            locator = %self.locator,
            baseline_len = baseline.text().len(),
            "reply visible, baseline taken"
        );

        sleep(self.settle).await;

        let ctx = session.ctx(self.change_bound);
        let changed = match self.signal_condition(&baseline) {
            Some(condition) => {
                wait_for(session, &ctx, &condition, self.change_bound, self.interval).await
            }
            None => {
                expect_text_changes(
                    session,
                    &ctx,
                    &self.locator,
                    baseline.text(),
                    self.change_bound,
                    self.interval,
                )
                .await
            }
        };
        changed.map_err(|err| VerifyError::from_action(FlowStage::ReplyStreaming, err))?;

        let evidence = self.evidence(session, &baseline).await?;
        let changed_after_ms = started.elapsed().as_millis() as u64;
        info!(
            stage = %FlowStage::ReplyStreaming,
            locator = %self.locator,
            ?evidence,
            appeared_after_ms,
            changed_after_ms,
            "assistant reply is streaming"
        );

        Ok(StreamObservation {
            locator: self.locator.descriptor(),
            baseline,
            evidence,
            appeared_after_ms,
            changed_after_ms,
        })
    }

    /// Text change or completion attribute, when a signal is configured.
    fn signal_condition(&self, baseline: &TextSnapshot) -> Option<WaitCondition> {
        let (name, value) = self.signal.as_ref()?;
        Some(WaitCondition::AnyOf(vec![
            WaitCondition::TextDiffers {
                locator: self.locator.clone(),
                baseline: baseline.text().to_string(),
            },
            WaitCondition::AttributeEquals {
                locator: self.locator.clone(),
                name: name.clone(),
                value: value.clone(),
            },
        ]))
    }

    async fn evidence(
        &self,
        session: &Session,
        baseline: &TextSnapshot,
    ) -> VerifyResult<StreamEvidence> {
        let ctx = session.ctx(self.interval);
        let state = session
            .inspect(&ctx, &self.locator)
            .await
            .map_err(|err| VerifyError::from_action(FlowStage::ReplyStreaming, err))?;
        if state.text.as_deref().is_some_and(|text| text != baseline.text()) {
            return Ok(StreamEvidence::TextChanged);
        }
        match &self.signal {
            Some((name, value)) if state.attributes.get(name) == Some(value) => {
                Ok(StreamEvidence::CompletionSignal)
            }
            _ => Ok(StreamEvidence::TextChanged),
        }
    }
}
