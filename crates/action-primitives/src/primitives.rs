//! Action primitives implementation
//!
//! Page-level primitives for browser automation:
//! 1. navigate - load a URL and wait for the document
//! 2. inspect - resolve a locator once and report what it sees
//! 3. click - click the resolved element at its centre
//! 4. fill - replace the content of an editable element
//! 5. screenshot - capture the page as an image
//! 6. wait - bounded polling over any of the above

mod click;
mod fill;
mod inspect;
mod navigate;
mod wait;

pub use wait::*;

use async_trait::async_trait;
use cdp_adapter::{Cdp, CdpAdapter, CdpConfig, PageId, ScreenshotOptions};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    errors::ActionError,
    types::{ActionReport, ElementState, ExecCtx, Locator},
};

/// Action primitives trait
///
/// Every call resolves its locator against the live document; implementations never
/// cache element handles between calls.
#[async_trait]
pub trait ActionPrimitives: Send + Sync {
    /// Navigate to a URL and wait for an interactive document
    async fn navigate(&self, ctx: &ExecCtx, url: &str) -> Result<ActionReport, ActionError>;

    /// Resolve a locator once, without waiting
    async fn inspect(&self, ctx: &ExecCtx, locator: &Locator)
        -> Result<ElementState, ActionError>;

    /// Click an element
    async fn click(&self, ctx: &ExecCtx, locator: &Locator) -> Result<ActionReport, ActionError>;

    /// Replace the content of an input; an empty string clears it
    async fn fill(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        text: &str,
    ) -> Result<ActionReport, ActionError>;

    /// Capture the page
    async fn screenshot(
        &self,
        ctx: &ExecCtx,
        opts: &ScreenshotOptions,
    ) -> Result<Vec<u8>, ActionError>;

    /// Release the page and the browser behind it
    async fn close(&self) -> Result<(), ActionError>;
}

/// Default implementation backed by a started [`CdpAdapter`]
pub struct DefaultActionPrimitives {
    adapter: Arc<CdpAdapter>,
    page: PageId,
}

impl DefaultActionPrimitives {
    pub fn new(adapter: Arc<CdpAdapter>, page: PageId) -> Self {
        Self { adapter, page }
    }

    /// Launch (or attach to) a browser and open one page in a fresh context.
    pub async fn launch(cfg: CdpConfig) -> Result<Self, ActionError> {
        Self::start(Arc::new(CdpAdapter::new(cfg))).await
    }

    /// Start `adapter` and open its page. A failed start is cleaned up before the
    /// launch error is returned.
    pub async fn start(adapter: Arc<CdpAdapter>) -> Result<Self, ActionError> {
        let page = match adapter.start().await {
            Ok(page) => page,
            Err(err) => {
                // a half-started browser must not outlive the failed launch
                if let Err(cleanup) = adapter.shutdown().await {
                    warn!(error = %cleanup, "cleanup after failed launch did not complete");
                }
                return Err(ActionError::LaunchFailed(err.to_string()));
            }
        };
        info!(browser = ?adapter.browser_id(), page = ?page, "browser session ready");
        Ok(Self::new(adapter, page))
    }

    pub fn adapter(&self) -> &Arc<CdpAdapter> {
        &self.adapter
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub(crate) fn check_ctx(ctx: &ExecCtx) -> Result<(), ActionError> {
        if ctx.is_cancelled() {
            return Err(ActionError::Interrupted("Context cancelled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ActionPrimitives for DefaultActionPrimitives {
    async fn navigate(&self, ctx: &ExecCtx, url: &str) -> Result<ActionReport, ActionError> {
        navigate::execute_navigate(self, ctx, url).await
    }

    async fn inspect(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
    ) -> Result<ElementState, ActionError> {
        inspect::execute_inspect(self, ctx, locator).await
    }

    async fn click(&self, ctx: &ExecCtx, locator: &Locator) -> Result<ActionReport, ActionError> {
        click::execute_click(self, ctx, locator).await
    }

    async fn fill(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        text: &str,
    ) -> Result<ActionReport, ActionError> {
        fill::execute_fill(self, ctx, locator, text).await
    }

    async fn screenshot(
        &self,
        ctx: &ExecCtx,
        opts: &ScreenshotOptions,
    ) -> Result<Vec<u8>, ActionError> {
        Self::check_ctx(ctx)?;
        Ok(self.adapter.screenshot(self.page, opts).await?)
    }

    async fn close(&self) -> Result<(), ActionError> {
        Ok(self.adapter.shutdown().await?)
    }
}
