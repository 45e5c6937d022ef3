//! Session controller
//!
//! A [`Session`] is the run's single browser page (inside its own isolated browser
//! context). It is acquired from a [`SessionLauncher`] and released exactly once by
//! [`run_scoped`], whatever the scenario does: succeed, fail, or panic.

use action_primitives::{
    ActionError, ActionPrimitives, ActionReport, DefaultActionPrimitives, ElementState, ExecCtx,
    Locator,
};
use async_trait::async_trait;
use cdp_adapter::{CdpConfig, ScreenshotOptions};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{FlowStage, VerifyError, VerifyResult};

/// Opens one page in a fresh, isolated browser context.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn ActionPrimitives>, ActionError>;
}

/// Launches (or attaches to) Chromium through the CDP adapter.
pub struct ChromiumLauncher {
    cfg: CdpConfig,
}

impl ChromiumLauncher {
    pub fn new(cfg: CdpConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn ActionPrimitives>, ActionError> {
        let primitives = DefaultActionPrimitives::launch(self.cfg.clone()).await?;
        Ok(Arc::new(primitives) as Arc<dyn ActionPrimitives>)
    }
}

/// Work performed against an acquired session.
#[async_trait]
pub trait Scenario: Send + Sync {
    type Output: Send;

    async fn run(&self, session: &Session) -> VerifyResult<Self::Output>;
}

pub struct Session {
    id: Uuid,
    page: Arc<dyn ActionPrimitives>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Session {
    pub fn new(page: Arc<dyn ActionPrimitives>) -> Self {
        Self {
            id: Uuid::new_v4(),
            page,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Execution context for one step, bounded by `budget`.
    pub fn ctx(&self, budget: Duration) -> ExecCtx {
        ExecCtx::with_budget(budget, self.cancel.child_token())
    }

    fn live(&self) -> Result<&dyn ActionPrimitives, ActionError> {
        if self.is_closed() {
            return Err(ActionError::Interrupted(format!(
                "session {} is already closed",
                self.id
            )));
        }
        Ok(self.page.as_ref())
    }
}

#[async_trait]
impl ActionPrimitives for Session {
    async fn navigate(&self, ctx: &ExecCtx, url: &str) -> Result<ActionReport, ActionError> {
        self.live()?.navigate(ctx, url).await
    }

    async fn inspect(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
    ) -> Result<ElementState, ActionError> {
        self.live()?.inspect(ctx, locator).await
    }

    async fn click(&self, ctx: &ExecCtx, locator: &Locator) -> Result<ActionReport, ActionError> {
        self.live()?.click(ctx, locator).await
    }

    async fn fill(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        text: &str,
    ) -> Result<ActionReport, ActionError> {
        self.live()?.fill(ctx, locator, text).await
    }

    async fn screenshot(
        &self,
        ctx: &ExecCtx,
        opts: &ScreenshotOptions,
    ) -> Result<Vec<u8>, ActionError> {
        self.live()?.screenshot(ctx, opts).await
    }

    /// Closes the page and browser on the first call; later calls are no-ops.
    async fn close(&self) -> Result<(), ActionError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!(session = %self.id, "session already released");
            return Ok(());
        }
        self.cancel.cancel();
        self.page.close().await
    }
}

/// Acquire the run's session. Launch failure is fatal and not retried.
pub async fn acquire(launcher: &dyn SessionLauncher) -> VerifyResult<Session> {
    let page = launcher
        .launch()
        .await
        .map_err(|err| VerifyError::from_action(FlowStage::Launch, err))?;
    let session = Session::new(page);
    info!(session = %session.id(), "session acquired");
    Ok(session)
}

/// Run `scenario` against a freshly acquired session and release it on every exit
/// path. A teardown failure is logged and never replaces the scenario's result; a
/// panic is re-raised after teardown.
pub async fn run_scoped<S: Scenario>(
    launcher: &dyn SessionLauncher,
    scenario: &S,
) -> VerifyResult<S::Output> {
    let session = acquire(launcher).await?;

    let outcome = AssertUnwindSafe(scenario.run(&session))
        .catch_unwind()
        .await;

    match session.close().await {
        Ok(()) => info!(session = %session.id(), "session released"),
        Err(err) => warn!(
            session = %session.id(),
            stage = %FlowStage::Teardown,
            error = %err,
            "teardown failed"
        ),
    }

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
