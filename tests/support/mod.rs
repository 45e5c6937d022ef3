//! Scripted in-memory chat application for driving the flow without a browser.
//!
//! Element states are derived from the app's state and the (paused) tokio clock, so
//! tests can describe replies that appear late, stay static, or keep changing.
#![allow(dead_code)]

use action_primitives::{
    ActionError, ActionPrimitives, ActionReport, ElementState, ExecCtx, Locator, Selector,
};
use async_trait::async_trait;
use cdp_adapter::ScreenshotOptions;
use chatflow_verify::{ChatContract, HarnessConfig, SessionLauncher};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// How the assistant reply behaves once it appears.
#[derive(Clone, Debug)]
pub enum Reply {
    Never,
    Static(String),
    /// Text from each offset (relative to the reply appearing) onwards.
    Script(Vec<(Duration, String)>),
}

impl Reply {
    /// Text that changes `after` the reply first renders.
    pub fn mutating(first: &str, later: &str, after: Duration) -> Self {
        Reply::Script(vec![
            (Duration::ZERO, first.to_string()),
            (after, later.to_string()),
        ])
    }

    fn text_at(&self, elapsed: Duration) -> Option<String> {
        match self {
            Reply::Never => None,
            Reply::Static(text) => Some(text.clone()),
            Reply::Script(steps) => steps
                .iter()
                .filter(|(offset, _)| *offset <= elapsed)
                .last()
                .map(|(_, text)| text.clone()),
        }
    }
}

#[derive(Default)]
struct AppState {
    configured: bool,
    key: String,
    input: String,
    sent: Option<(String, Instant)>,
}

pub struct FakeChatApp {
    contract: ChatContract,
    reply: Reply,
    reply_delay: Duration,
    reachable: bool,
    authorship: Option<String>,
    signal: Option<(String, String, Duration)>,
    echoes: bool,
    send_control: bool,
    state: Mutex<AppState>,
    calls: Mutex<Vec<String>>,
    inspected: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl FakeChatApp {
    fn with_state(configured: bool) -> Self {
        Self {
            contract: ChatContract::default(),
            reply: Reply::mutating(
                "Hello",
                "Hello! How can I help you today?",
                Duration::from_millis(500),
            ),
            reply_delay: Duration::from_millis(300),
            reachable: true,
            authorship: None,
            signal: None,
            echoes: true,
            send_control: true,
            state: Mutex::new(AppState {
                configured,
                ..Default::default()
            }),
            calls: Mutex::new(Vec::new()),
            inspected: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    /// App with a stored key: the chat shows immediately.
    pub fn ready() -> Self {
        Self::with_state(true)
    }

    /// App on its API-key screen.
    pub fn needs_setup() -> Self {
        Self::with_state(false)
    }

    pub fn with_reply(mut self, reply: Reply) -> Self {
        self.reply = reply;
        self
    }

    pub fn with_authorship(mut self, attribute: &str) -> Self {
        self.authorship = Some(attribute.to_string());
        self
    }

    /// Reply element carries `name="value"` from `after` onwards.
    pub fn with_signal(mut self, name: &str, value: &str, after: Duration) -> Self {
        self.signal = Some((name.to_string(), value.to_string(), after));
        self
    }

    /// Sent messages never render in the conversation.
    pub fn without_echo(mut self) -> Self {
        self.echoes = false;
        self
    }

    /// Chat screen lacks the send control.
    pub fn without_send_control(mut self) -> Self {
        self.send_control = false;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Fills and clicks aimed at the setup screen.
    pub fn setup_actions(&self) -> usize {
        let field = format!("fill:{}", self.contract.api_key_field());
        let save = format!("click:{}", self.contract.save_control());
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == field || **call == save)
            .count()
    }

    /// Descriptors of every locator inspected so far.
    pub fn inspected(&self) -> Vec<String> {
        self.inspected.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_configured(&self) -> bool {
        self.state.lock().configured
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn user_message(&self, state: &AppState) -> ElementState {
        match &state.sent {
            Some((text, _)) if self.echoes => {
                let mut attributes = self.base_attributes();
                if let Some(attr) = &self.authorship {
                    attributes.insert(attr.clone(), "user".to_string());
                }
                shown(text, attributes)
            }
            _ => ElementState::default(),
        }
    }

    fn assistant_message(&self, state: &AppState) -> ElementState {
        let Some((_, sent_at)) = &state.sent else {
            return ElementState::default();
        };
        let appears_at = *sent_at + self.reply_delay;
        let now = Instant::now();
        if now < appears_at {
            return ElementState::default();
        }
        let elapsed = now - appears_at;
        let Some(text) = self.reply.text_at(elapsed) else {
            return ElementState::default();
        };

        let mut attributes = self.base_attributes();
        if let Some(attr) = &self.authorship {
            attributes.insert(attr.clone(), "assistant".to_string());
        }
        if let Some((name, value, after)) = &self.signal {
            if elapsed >= *after {
                attributes.insert(name.clone(), value.clone());
            }
        }
        shown(&text, attributes)
    }

    fn base_attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        attributes.insert("role".to_string(), self.contract.message_role.clone());
        attributes
    }

    fn message_count(&self, state: &AppState) -> usize {
        usize::from(self.user_message(state).visible) + usize::from(self.assistant_message(state).visible)
    }

    fn resolve(&self, locator: &Locator) -> ElementState {
        let state = self.state.lock();
        let contract = &self.contract;
        let setup_screen = !state.configured;

        if *locator == contract.setup_marker() {
            return toggle(setup_screen, &contract.setup_heading);
        }
        if *locator == contract.api_key_field() {
            return toggle(setup_screen, &state.key);
        }
        if *locator == contract.save_control() {
            return toggle(setup_screen, &contract.save_button);
        }
        if *locator == contract.message_input() {
            return toggle(state.configured, &state.input);
        }
        if *locator == contract.send_control() {
            return toggle(state.configured && self.send_control, "");
        }

        let messages = contract.messages();
        if locator.selector == messages.selector {
            let mut element = match locator.nth.unwrap_or(0) {
                0 => self.user_message(&state),
                1 => self.assistant_message(&state),
                _ => ElementState::default(),
            };
            element.count = self.message_count(&state);
            return element;
        }

        if let Selector::Attribute { name, value, .. } = &locator.selector {
            if self.authorship.as_ref() == Some(name) {
                let element = match value.as_str() {
                    "user" => self.user_message(&state),
                    "assistant" => self.assistant_message(&state),
                    _ => ElementState::default(),
                };
                return element;
            }
        }

        if let Selector::Text { content, .. } = &locator.selector {
            let echoed = self.user_message(&state);
            if echoed.text.as_deref().is_some_and(|t| t.contains(content.as_str())) {
                return echoed;
            }
        }

        ElementState::default()
    }
}

fn shown(text: &str, attributes: BTreeMap<String, String>) -> ElementState {
    ElementState {
        count: 1,
        visible: true,
        enabled: true,
        text: Some(text.to_string()),
        attributes,
    }
}

fn toggle(visible: bool, text: &str) -> ElementState {
    if visible {
        shown(text, BTreeMap::new())
    } else {
        ElementState::default()
    }
}

#[async_trait]
impl ActionPrimitives for FakeChatApp {
    async fn navigate(&self, _ctx: &ExecCtx, url: &str) -> Result<ActionReport, ActionError> {
        self.record(format!("navigate:{url}"));
        if !self.reachable {
            return Err(ActionError::NavFailed(format!(
                "net::ERR_CONNECTION_REFUSED at {url}"
            )));
        }
        Ok(ActionReport::success(chrono::Utc::now(), 5).with_target(url))
    }

    async fn inspect(&self, _ctx: &ExecCtx, locator: &Locator) -> Result<ElementState, ActionError> {
        self.inspected.lock().push(locator.descriptor());
        Ok(self.resolve(locator))
    }

    async fn click(&self, _ctx: &ExecCtx, locator: &Locator) -> Result<ActionReport, ActionError> {
        {
            let mut state = self.state.lock();
            if !state.configured && *locator == self.contract.save_control() {
                // the app refuses to save an empty key
                if !state.key.is_empty() {
                    state.configured = true;
                }
            } else if state.configured
                && self.send_control
                && *locator == self.contract.send_control()
            {
                let text = std::mem::take(&mut state.input);
                state.sent = Some((text, Instant::now()));
            } else {
                return Err(ActionError::AnchorNotFound(locator.descriptor()));
            }
        }
        self.record(format!("click:{locator}"));
        Ok(ActionReport::success(chrono::Utc::now(), 1).with_target(locator.descriptor()))
    }

    async fn fill(
        &self,
        _ctx: &ExecCtx,
        locator: &Locator,
        text: &str,
    ) -> Result<ActionReport, ActionError> {
        {
            let mut state = self.state.lock();
            if !state.configured && *locator == self.contract.api_key_field() {
                state.key = text.to_string();
            } else if state.configured && *locator == self.contract.message_input() {
                state.input = text.to_string();
            } else {
                return Err(ActionError::AnchorNotFound(locator.descriptor()));
            }
        }
        self.record(format!("fill:{locator}"));
        Ok(ActionReport::success(chrono::Utc::now(), 1).with_target(locator.descriptor()))
    }

    async fn screenshot(
        &self,
        _ctx: &ExecCtx,
        _opts: &ScreenshotOptions,
    ) -> Result<Vec<u8>, ActionError> {
        self.record("screenshot".to_string());
        Ok(PNG.to_vec())
    }

    async fn close(&self) -> Result<(), ActionError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    pub app: Arc<FakeChatApp>,
}

impl FakeLauncher {
    pub fn new(app: FakeChatApp) -> Self {
        Self { app: Arc::new(app) }
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn ActionPrimitives>, ActionError> {
        Ok(self.app.clone() as Arc<dyn ActionPrimitives>)
    }
}

/// Launcher whose browser never comes up.
pub struct BrokenLauncher;

#[async_trait]
impl SessionLauncher for BrokenLauncher {
    async fn launch(&self) -> Result<Arc<dyn ActionPrimitives>, ActionError> {
        Err(ActionError::LaunchFailed(
            "chrome executable not found".to_string(),
        ))
    }
}

/// Default scenario writing its artifacts under `dir`.
pub fn config_in(dir: &Path) -> HarnessConfig {
    HarnessConfig {
        artifact_dir: dir.to_path_buf(),
        ..HarnessConfig::default()
    }
}
