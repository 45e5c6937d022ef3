//! Conditional setup resolver
//!
//! The application starts either on its API-key screen or directly on the chat.
//! Which one is only visible through the rendered markers, so the resolver probes
//! briefly for both, performs the minimal setup when needed and then requires the
//! chat input to show up.

use action_primitives::{expect_visible, first_visible, ActionPrimitives};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::contract::ChatContract;
use crate::errors::{FlowStage, VerifyError, VerifyResult};
use crate::session::Session;

/// Observable phase of the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    NeedsSetup,
    Ready,
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageState::NeedsSetup => f.write_str("needs_setup"),
            PageState::Ready => f.write_str("ready"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SetupResolver {
    contract: ChatContract,
    api_key: String,
    probe: Duration,
    ready: Duration,
    interval: Duration,
}

impl SetupResolver {
    pub fn new(contract: ChatContract, api_key: impl Into<String>) -> Self {
        Self {
            contract,
            api_key: api_key.into(),
            probe: Duration::from_secs(2),
            ready: Duration::from_secs(10),
            interval: action_primitives::DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            contract: config.contract.clone(),
            api_key: config.api_key.clone(),
            probe: config.timeouts.setup_probe(),
            ready: config.timeouts.ready(),
            interval: config.timeouts.poll_interval(),
        }
    }

    pub fn with_bounds(mut self, probe: Duration, ready: Duration, interval: Duration) -> Self {
        self.probe = probe;
        self.ready = ready;
        self.interval = interval;
        self
    }

    /// Probe and, for `NeedsSetup`, fill the key and save. Never waits for the
    /// outcome; see [`SetupResolver::await_ready`].
    pub async fn resolve(&self, session: &Session) -> VerifyResult<PageState> {
        let state = self.probe(session).await?;
        info!(stage = %FlowStage::SetupProbe, page_state = %state, "page state observed");

        if state == PageState::NeedsSetup {
            let ctx = session.ctx(self.ready);
            session
                .fill(&ctx, &self.contract.api_key_field(), &self.api_key)
                .await
                .map_err(|err| VerifyError::from_action(FlowStage::Setup, err))?;
            session
                .click(&ctx, &self.contract.save_control())
                .await
                .map_err(|err| VerifyError::from_action(FlowStage::Setup, err))?;
            info!(stage = %FlowStage::Setup, "placeholder API key saved");
        }
        Ok(state)
    }

    /// The chat input must become visible, whichever path was taken.
    pub async fn await_ready(&self, session: &Session) -> VerifyResult<()> {
        let input = self.contract.message_input();
        let ctx = session.ctx(self.ready);
        expect_visible(session, &ctx, &input, self.ready, self.interval)
            .await
            .map_err(|err| VerifyError::from_action(FlowStage::AwaitReady, err))?;
        debug!(locator = %input, "chat input visible");
        Ok(())
    }

    pub async fn ensure_ready(&self, session: &Session) -> VerifyResult<PageState> {
        let state = self.resolve(session).await?;
        self.await_ready(session).await?;
        Ok(state)
    }

    /// Short look for the setup heading or the chat input, whichever shows first. An
    /// absent heading is not an error: an undecided page is treated as `Ready` and
    /// left to the readiness wait.
    async fn probe(&self, session: &Session) -> VerifyResult<PageState> {
        let markers = [self.contract.setup_marker(), self.contract.message_input()];
        let ctx = session.ctx(self.probe);
        let seen = first_visible(session, &ctx, &markers, self.probe, self.interval)
            .await
            .map_err(|err| VerifyError::from_action(FlowStage::SetupProbe, err))?;
        Ok(match seen {
            Some(0) => PageState::NeedsSetup,
            Some(_) => PageState::Ready,
            None => {
                debug!(
                    bound_ms = self.probe.as_millis() as u64,
                    "no marker visible within probe bound"
                );
                PageState::Ready
            }
        })
    }
}
