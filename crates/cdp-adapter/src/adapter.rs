use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::commands::{Point, ScreenshotOptions};
use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::ids::{BrowserId, PageId};
use crate::metrics;
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget};

const READY_POLL: Duration = Duration::from_millis(100);

/// Page-level operations the automation layer relies on.
#[async_trait]
pub trait Cdp: Send + Sync {
    /// Navigate and wait until the document is at least `interactive`.
    async fn navigate(&self, page: PageId, url: &str, deadline: Duration)
        -> Result<(), AdapterError>;
    /// Evaluate an expression in the page's main world and return its JSON value.
    async fn evaluate_script(&self, page: PageId, expression: &str) -> Result<Value, AdapterError>;
    async fn dispatch_click(&self, page: PageId, point: Point) -> Result<(), AdapterError>;
    /// Insert text at the current focus, as if typed by an IME.
    async fn insert_text(&self, page: PageId, text: &str) -> Result<(), AdapterError>;
    async fn screenshot(
        &self,
        page: PageId,
        opts: &ScreenshotOptions,
    ) -> Result<Vec<u8>, AdapterError>;
}

#[derive(Clone, Debug)]
struct PageHandle {
    page: PageId,
    target_id: String,
    session_id: String,
    browser_context_id: String,
}

pub struct CdpAdapter {
    browser_id: BrowserId,
    cfg: CdpConfig,
    transport: Arc<dyn CdpTransport>,
    page: Mutex<Option<PageHandle>>,
}

impl CdpAdapter {
    pub fn new(cfg: CdpConfig) -> Self {
        let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cfg.clone()));
        Self::with_transport(cfg, transport)
    }

    pub fn with_transport(cfg: CdpConfig, transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            browser_id: BrowserId::new(),
            cfg,
            transport,
            page: Mutex::new(None),
        }
    }

    pub fn browser_id(&self) -> BrowserId {
        self.browser_id
    }

    pub fn config(&self) -> &CdpConfig {
        &self.cfg
    }

    pub fn page(&self) -> Option<PageId> {
        self.page.lock().as_ref().map(|handle| handle.page)
    }

    /// Bring up the browser, an isolated context and one attached page.
    pub async fn start(&self) -> Result<PageId, AdapterError> {
        if let Some(page) = self.page() {
            return Ok(page);
        }

        self.transport.start().await?;

        let context = self
            .send_browser_command(
                "Target.createBrowserContext",
                json!({ "disposeOnDetach": true }),
            )
            .await?;
        let browser_context_id = string_field(&context, "browserContextId")?;

        let target = self
            .send_browser_command(
                "Target.createTarget",
                json!({
                    "url": "about:blank",
                    "browserContextId": browser_context_id,
                }),
            )
            .await?;
        let target_id = string_field(&target, "targetId")?;

        let attached = self
            .send_browser_command(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = string_field(&attached, "sessionId")?;

        let handle = PageHandle {
            page: PageId::new(),
            target_id,
            session_id,
            browser_context_id,
        };
        self.send_session_command(&handle.session_id, "Page.enable", json!({}))
            .await?;

        info!(
            target: "cdp-adapter",
            browser = ?self.browser_id,
            target_id = %handle.target_id,
            "page attached"
        );
        let page = handle.page;
        *self.page.lock() = Some(handle);
        Ok(page)
    }

    /// Dispose the browser context, close the browser and stop the transport.
    ///
    /// Every step runs even when an earlier one fails; the first failure is returned.
    pub async fn shutdown(&self) -> Result<(), AdapterError> {
        let handle = self.page.lock().take();
        let mut first_error: Option<AdapterError> = None;

        if let Some(handle) = handle {
            if let Err(err) = self
                .send_browser_command(
                    "Target.disposeBrowserContext",
                    json!({ "browserContextId": handle.browser_context_id }),
                )
                .await
            {
                warn!(target: "cdp-adapter", %err, "failed to dispose browser context");
                first_error.get_or_insert(err);
            }

            // attached browsers belong to someone else
            if self.cfg.websocket_url.is_none() {
                if let Err(err) = self.send_browser_command("Browser.close", json!({})).await {
                    debug!(target: "cdp-adapter", %err, "Browser.close did not acknowledge");
                }
            }
        }

        if let Err(err) = self.transport.shutdown().await {
            warn!(target: "cdp-adapter", %err, "transport shutdown failed");
            first_error.get_or_insert(err);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn session_for(&self, page: PageId) -> Result<String, AdapterError> {
        match self.page.lock().as_ref() {
            Some(handle) if handle.page == page => Ok(handle.session_id.clone()),
            Some(_) => Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("unknown page {page:?}"))),
            None => Err(AdapterError::new(AdapterErrorKind::SessionClosed)
                .with_hint("no page attached")),
        }
    }

    async fn send_browser_command(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.send_with_metrics(CommandTarget::Browser, method, params)
            .await
    }

    async fn send_session_command(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.send_with_metrics(CommandTarget::Session(session_id.to_string()), method, params)
            .await
    }

    async fn send_page_command(
        &self,
        page: PageId,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let session = self.session_for(page)?;
        self.send_session_command(&session, method, params).await
    }

    async fn send_with_metrics(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let start = Instant::now();
        metrics::record_command(method);
        match self.transport.send_command(target, method, params).await {
            Ok(value) => {
                metrics::record_command_success(method, start.elapsed());
                Ok(value)
            }
            Err(err) => {
                metrics::record_command_failure(method);
                Err(err)
            }
        }
    }

    async fn wait_for_load(&self, page: PageId, deadline: Instant) -> Result<(), AdapterError> {
        loop {
            let response = self
                .send_page_command(
                    page,
                    "Runtime.evaluate",
                    json!({
                        "expression": "document.readyState",
                        "returnByValue": true,
                    }),
                )
                .await?;

            let state = response
                .get("result")
                .and_then(|v| v.get("value"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if matches!(state, "interactive" | "complete") {
                return Ok(());
            }

            if Instant::now() + READY_POLL > deadline {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint(format!("document stuck in readyState '{state}'")));
            }
            sleep(READY_POLL).await;
        }
    }

    async fn full_page_clip(&self, page: PageId) -> Result<Value, AdapterError> {
        let layout = self
            .send_page_command(page, "Page.getLayoutMetrics", json!({}))
            .await?;
        let size = layout
            .get("cssContentSize")
            .or_else(|| layout.get("contentSize"))
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("layout metrics missing content size")
            })?;
        let width = size.get("width").and_then(Value::as_f64).unwrap_or_default();
        let height = size.get("height").and_then(Value::as_f64).unwrap_or_default();
        if width <= 0.0 || height <= 0.0 {
            return Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("degenerate content size {width}x{height}")));
        }

        Ok(json!({
            "x": 0,
            "y": 0,
            "width": width.ceil(),
            "height": height.ceil(),
            "scale": 1,
        }))
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, AdapterError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("cdp response missing '{field}'"))
                .with_data(value.clone())
        })
}

#[async_trait]
impl Cdp for CdpAdapter {
    async fn navigate(
        &self,
        page: PageId,
        url: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let deadline_at = Instant::now() + deadline;
        let response = tokio::time::timeout(
            deadline,
            self.send_page_command(page, "Page.navigate", json!({ "url": url })),
        )
        .await
        .map_err(|_| {
            AdapterError::new(AdapterErrorKind::NavTimeout)
                .with_hint(format!("Page.navigate to {url} exceeded {deadline:?}"))
        })??;

        if let Some(error_text) = response
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            return Err(AdapterError::new(AdapterErrorKind::NavFailed)
                .with_hint(format!("{url}: {error_text}")));
        }

        self.wait_for_load(page, deadline_at).await?;
        debug!(target: "cdp-adapter", %url, "navigation complete");
        Ok(())
    }

    async fn evaluate_script(&self, page: PageId, expression: &str) -> Result<Value, AdapterError> {
        let response = self
            .send_page_command(
                page,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            return Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint("evaluate_script raised exception")
                .with_data(details.clone()));
        }

        Ok(response
            .get("result")
            .and_then(|res| res.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn dispatch_click(&self, page: PageId, point: Point) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Input.dispatchMouseEvent",
            json!({ "type": "mouseMoved", "x": point.x, "y": point.y }),
        )
        .await?;
        for phase in ["mousePressed", "mouseReleased"] {
            self.send_page_command(
                page,
                "Input.dispatchMouseEvent",
                json!({
                    "type": phase,
                    "x": point.x,
                    "y": point.y,
                    "button": "left",
                    "buttons": 1,
                    "clickCount": 1,
                }),
            )
            .await?;
        }
        Ok(())
    }

    async fn insert_text(&self, page: PageId, text: &str) -> Result<(), AdapterError> {
        self.send_page_command(page, "Input.insertText", json!({ "text": text }))
            .await
            .map(|_| ())
    }

    async fn screenshot(
        &self,
        page: PageId,
        opts: &ScreenshotOptions,
    ) -> Result<Vec<u8>, AdapterError> {
        let mut params = json!({ "format": "png" });
        if opts.full_page {
            params["captureBeyondViewport"] = json!(true);
            params["clip"] = self.full_page_clip(page).await?;
        }

        let response = self
            .send_page_command(page, "Page.captureScreenshot", params)
            .await?;
        let data = response
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("missing screenshot data")
            })?;
        STANDARD
            .decode(data)
            .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
    }
}
