use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, Message, MethodId, Response};
use futures::{future::BoxFuture, StreamExt};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::metrics;
use crate::util::extract_ws_url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

/// Wire-level access to a DevTools endpoint.
#[async_trait]
pub trait CdpTransport: Send + Sync {
    /// Launch or connect. Calling it again on a live transport is a no-op.
    async fn start(&self) -> Result<(), AdapterError>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
    /// Tear the connection down and reap the browser process, if one was launched.
    async fn shutdown(&self) -> Result<(), AdapterError>;
}

type RuntimeFactory = Arc<
    dyn Fn(CdpConfig) -> BoxFuture<'static, Result<Arc<RuntimeState>, AdapterError>> + Send + Sync,
>;

/// Transport that launches (or attaches to) Chromium and speaks CDP over its websocket.
pub struct ChromiumTransport {
    cfg: CdpConfig,
    state: Mutex<TransportState>,
    factory: RuntimeFactory,
}

enum TransportState {
    Idle,
    Running(Arc<RuntimeState>),
    Closed,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        let factory: RuntimeFactory = Arc::new(|cfg: CdpConfig| {
            Box::pin(async move {
                let state = RuntimeState::start(cfg).await?;
                Ok(Arc::new(state))
            })
        });

        Self {
            cfg,
            state: Mutex::new(TransportState::Idle),
            factory,
        }
    }

    async fn runtime(&self) -> Result<Arc<RuntimeState>, AdapterError> {
        let guard = self.state.lock().await;
        match &*guard {
            TransportState::Running(rt) if rt.is_alive() => Ok(rt.clone()),
            TransportState::Running(_) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint("browser connection lost")),
            TransportState::Idle => Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint("transport used before start")),
            TransportState::Closed => Err(AdapterError::new(AdapterErrorKind::SessionClosed)
                .with_hint("transport already shut down")),
        }
    }

    #[cfg(test)]
    fn with_factory(cfg: CdpConfig, factory: RuntimeFactory) -> Self {
        Self {
            cfg,
            state: Mutex::new(TransportState::Idle),
            factory,
        }
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        let mut guard = self.state.lock().await;
        match &*guard {
            TransportState::Running(rt) if rt.is_alive() => return Ok(()),
            TransportState::Running(_) => {
                return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint("browser connection lost"))
            }
            TransportState::Closed => {
                return Err(AdapterError::new(AdapterErrorKind::SessionClosed)
                    .with_hint("transport already shut down"))
            }
            TransportState::Idle => {}
        }

        let runtime = (self.factory)(self.cfg.clone()).await?;
        *guard = TransportState::Running(runtime);
        Ok(())
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let runtime = self.runtime().await?;
        runtime
            .send_internal(
                target,
                method,
                params,
                Duration::from_millis(self.cfg.default_deadline_ms),
            )
            .await
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        let previous = {
            let mut guard = self.state.lock().await;
            std::mem::replace(&mut *guard, TransportState::Closed)
        };

        match previous {
            TransportState::Running(runtime) => runtime.shutdown().await,
            TransportState::Idle | TransportState::Closed => Ok(()),
        }
    }
}

struct ControlMessage {
    target: CommandTarget,
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, AdapterError>>,
}

struct RuntimeState {
    command_tx: mpsc::Sender<ControlMessage>,
    loop_task: JoinHandle<()>,
    heartbeat_task: Option<JoinHandle<()>>,
    child: Mutex<Option<Child>>,
    profile: Mutex<Option<TempDir>>,
    alive: Arc<AtomicBool>,
}

impl RuntimeState {
    async fn start(cfg: CdpConfig) -> Result<Self, AdapterError> {
        let (child, profile, ws_url) = match cfg.websocket_url.clone() {
            Some(url) => (None, None, url),
            None => {
                let profile = match &cfg.user_data_dir {
                    Some(_) => None,
                    None => Some(
                        tempfile::Builder::new()
                            .prefix("chatflow-profile-")
                            .tempdir()
                            .map_err(|err| {
                                AdapterError::new(AdapterErrorKind::LaunchFailed)
                                    .with_hint(format!("failed to create profile dir: {err}"))
                            })?,
                    ),
                };
                let browser_cfg = Self::browser_config(&cfg, profile.as_ref())?;
                let (child, url) = Self::launch_browser(
                    browser_cfg,
                    Duration::from_millis(cfg.launch_timeout_ms),
                )
                .await?;
                (Some(child), profile, url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::LaunchFailed)
                    .with_hint(format!("devtools connect to {ws_url} failed: {err}"))
            })?;

        let (command_tx, command_rx) = mpsc::channel(128);
        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = alive.clone();

        let loop_task = tokio::spawn(async move {
            let result = Self::run_loop(conn, command_rx).await;
            loop_alive.store(false, Ordering::Relaxed);
            if let Err(err) = result {
                error!(target: "cdp-transport", ?err, "transport loop terminated with error");
            }
        });

        let heartbeat_task = Self::spawn_heartbeat(
            command_tx.clone(),
            alive.clone(),
            Duration::from_millis(cfg.heartbeat_interval_ms),
        );

        info!(target: "cdp-transport", url = %ws_url, "chromium connection established");

        Ok(Self {
            command_tx,
            loop_task,
            heartbeat_task,
            child: Mutex::new(child),
            profile: Mutex::new(profile),
            alive,
        })
    }

    #[cfg(test)]
    fn test_stub() -> (Arc<Self>, Arc<AtomicBool>) {
        let (command_tx, mut command_rx) = mpsc::channel::<ControlMessage>(8);
        let alive = Arc::new(AtomicBool::new(true));
        let loop_task = tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                let _ = cmd
                    .responder
                    .send(Ok(serde_json::json!({ "echo": cmd.method })));
            }
        });

        (
            Arc::new(Self {
                command_tx,
                loop_task,
                heartbeat_task: None,
                child: Mutex::new(None),
                profile: Mutex::new(None),
                alive: alive.clone(),
            }),
            alive,
        )
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn send_internal(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        let message = ControlMessage {
            target,
            method: method.to_string(),
            params,
            responder: resp_tx,
        };

        self.command_tx
            .send(message)
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;

        match tokio::time::timeout(deadline, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint("command response channel closed")),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{method} timed out after {deadline:?}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        self.alive.store(false, Ordering::Relaxed);
        if let Some(handle) = &self.heartbeat_task {
            handle.abort();
        }
        self.loop_task.abort();

        let mut outcome = Ok(());
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                warn!(target: "cdp-transport", ?err, "failed to kill chromium child");
                outcome = Err(AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("failed to kill chromium: {err}")));
            } else {
                debug!(target: "cdp-transport", "chromium child terminated");
            }
        }

        if let Some(profile) = self.profile.lock().await.take() {
            let path = profile.path().to_path_buf();
            if let Err(err) = profile.close() {
                warn!(target: "cdp-transport", ?err, path = %path.display(), "failed to remove profile dir");
            }
        }

        outcome
    }

    fn spawn_heartbeat(
        sender: mpsc::Sender<ControlMessage>,
        alive: Arc<AtomicBool>,
        interval_duration: Duration,
    ) -> Option<JoinHandle<()>> {
        if interval_duration.is_zero() {
            return None;
        }
        let response_deadline = interval_duration.min(Duration::from_secs(5));

        Some(tokio::spawn(async move {
            let mut ticker = interval(interval_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;

            while alive.load(Ordering::Relaxed) {
                ticker.tick().await;

                let (resp_tx, resp_rx) = oneshot::channel();
                let message = ControlMessage {
                    target: CommandTarget::Browser,
                    method: "Browser.getVersion".to_string(),
                    params: Value::Object(Default::default()),
                    responder: resp_tx,
                };

                if sender.send(message).await.is_err() {
                    debug!(target: "cdp-transport", "heartbeat send failed (channel closed)");
                    break;
                }

                match tokio::time::timeout(response_deadline, resp_rx).await {
                    Ok(Ok(Ok(_))) => {}
                    Ok(Ok(Err(err))) => {
                        metrics::record_heartbeat_failure();
                        warn!(target: "cdp-transport", ?err, "heartbeat command error");
                        break;
                    }
                    Ok(Err(_)) => break,
                    Err(_) => {
                        metrics::record_heartbeat_failure();
                        warn!(target: "cdp-transport", "heartbeat timed out");
                        break;
                    }
                }
            }
        }))
    }

    fn browser_config(
        cfg: &CdpConfig,
        profile: Option<&TempDir>,
    ) -> Result<BrowserConfig, AdapterError> {
        if cfg.executable.as_os_str().is_empty() || !cfg.executable.exists() {
            return Err(AdapterError::new(AdapterErrorKind::LaunchFailed)
                .with_hint(format!(
                    "chrome executable not found at '{}'",
                    cfg.executable.display()
                ))
                .with_data(serde_json::json!({
                    "expected": cfg.executable,
                    "hint": "Set CHATFLOW_CHROME or pass --chrome with the full path of chrome/chromium."
                })));
        }

        let profile_dir = match (&cfg.user_data_dir, profile) {
            (Some(dir), _) => dir.clone(),
            (None, Some(temp)) => temp.path().to_path_buf(),
            (None, None) => {
                return Err(AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("no profile directory available"))
            }
        };

        let mut builder = BrowserConfig::builder()
            .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
            .launch_timeout(Duration::from_millis(cfg.launch_timeout_ms))
            .window_size(cfg.window_width, cfg.window_height);

        if !cfg.headless {
            builder = builder.with_head();
        }
        if cfg.no_sandbox {
            builder = builder.no_sandbox();
        }

        let mut args = vec![
            "--disable-background-networking",
            "--disable-background-timer-throttling",
            "--disable-breakpad",
            "--disable-component-update",
            "--disable-default-apps",
            "--disable-dev-shm-usage",
            "--disable-extensions",
            "--disable-popup-blocking",
            "--disable-sync",
            "--no-first-run",
            "--no-default-browser-check",
            "--password-store=basic",
            "--remote-allow-origins=*",
            "--use-mock-keychain",
        ];
        if cfg.headless {
            args.push("--headless=new");
            args.push("--hide-scrollbars");
            args.push("--mute-audio");
        }

        builder
            .args(args)
            .chrome_executable(cfg.executable.clone())
            .user_data_dir(profile_dir)
            .build()
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::LaunchFailed)
                    .with_hint(format!("browser config error: {err}"))
            })
    }

    async fn launch_browser(
        config: BrowserConfig,
        wait: Duration,
    ) -> Result<(Child, String), AdapterError> {
        let mut child = config.launch().map_err(|err| {
            AdapterError::new(AdapterErrorKind::LaunchFailed)
                .with_hint(format!("failed to launch chromium: {err}"))
        })?;

        match extract_ws_url(&mut child, wait).await {
            Ok(ws_url) => Ok((child, ws_url)),
            Err(err) => {
                if let Err(kill_err) = child.kill().await {
                    debug!(target: "cdp-transport", ?kill_err, "chromium already gone after failed launch");
                }
                Err(AdapterError::new(AdapterErrorKind::LaunchFailed).with_hint(err.to_string()))
            }
        }
    }

    async fn run_loop(
        mut conn: Connection<CdpEventMessage>,
        mut command_rx: mpsc::Receiver<ControlMessage>,
    ) -> Result<(), AdapterError> {
        let mut inflight: HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>> =
            HashMap::new();

        loop {
            tokio::select! {
                Some(cmd) = command_rx.recv() => {
                    Self::handle_command(&mut conn, cmd, &mut inflight)?;
                }
                message = conn.next() => {
                    match message {
                        Some(Ok(Message::Response(resp))) => {
                            Self::handle_response(resp, &mut inflight);
                        }
                        Some(Ok(Message::Event(_))) => {
                            trace!(target: "cdp-transport", "cdp event dropped");
                        }
                        Some(Err(err)) => {
                            let adapter_err = Self::map_cdp_error(err);
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(adapter_err.clone()));
                            }
                            return Err(adapter_err);
                        }
                        None => {
                            let err = AdapterError::new(AdapterErrorKind::CdpIo)
                                .with_hint("cdp connection closed");
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(err.clone()));
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn handle_command(
        conn: &mut Connection<CdpEventMessage>,
        cmd: ControlMessage,
        inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>>,
    ) -> Result<(), AdapterError> {
        let session = match cmd.target {
            CommandTarget::Browser => None,
            CommandTarget::Session(session_id) => Some(CdpSessionId::from(session_id)),
        };

        let method_id: MethodId = cmd.method.clone().into();
        match conn.submit_command(method_id, session, cmd.params) {
            Ok(call_id) => {
                inflight.insert(call_id, cmd.responder);
                Ok(())
            }
            Err(err) => {
                let adapter_err =
                    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string());
                let _ = cmd.responder.send(Err(adapter_err.clone()));
                Err(adapter_err)
            }
        }
    }

    fn handle_response(
        resp: Response,
        inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>>,
    ) {
        if let Some(sender) = inflight.remove(&resp.id) {
            let _ = sender.send(Self::extract_payload(resp));
        }
    }

    fn extract_payload(resp: Response) -> Result<Value, AdapterError> {
        if let Some(result) = resp.result {
            Ok(result)
        } else if let Some(error) = resp.error {
            Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("cdp error {}: {}", error.code, error.message)))
        } else {
            Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("empty cdp response"))
        }
    }

    fn map_cdp_error(err: CdpError) -> AdapterError {
        let hint = err.to_string();
        match err {
            CdpError::Serde(_) | CdpError::JavascriptException(_) => {
                AdapterError::new(AdapterErrorKind::Internal).with_hint(hint)
            }
            _ => AdapterError::new(AdapterErrorKind::CdpIo).with_hint(hint),
        }
    }
}

impl Drop for RuntimeState {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();
        if let Some(handle) = &self.heartbeat_task {
            handle.abort();
        }

        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(mut child) = guard.take() {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(err) = child.kill().await {
                            warn!(target: "cdp-transport", ?err, "failed to kill chromium child");
                        }
                    });
                } else {
                    debug!(target: "cdp-transport", "no tokio runtime available to kill chromium child");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn stub_transport() -> (ChromiumTransport, Arc<AtomicUsize>, Arc<Mutex<Vec<Arc<AtomicBool>>>>) {
        let spawn_count = Arc::new(AtomicUsize::new(0));
        let alive_flags = Arc::new(Mutex::new(Vec::<Arc<AtomicBool>>::new()));

        let factory: RuntimeFactory = {
            let spawn_count = spawn_count.clone();
            let alive_flags = alive_flags.clone();
            Arc::new(move |_cfg: CdpConfig| {
                let spawn_count = spawn_count.clone();
                let alive_flags = alive_flags.clone();
                Box::pin(async move {
                    spawn_count.fetch_add(1, Ordering::SeqCst);
                    let (runtime, alive) = RuntimeState::test_stub();
                    alive_flags.lock().await.push(alive);
                    Ok(runtime)
                })
            })
        };

        (
            ChromiumTransport::with_factory(CdpConfig::default(), factory),
            spawn_count,
            alive_flags,
        )
    }

    #[tokio::test]
    async fn start_is_idempotent_while_alive() {
        let (transport, spawn_count, _) = stub_transport();
        transport.start().await.expect("first start");
        transport.start().await.expect("second start");
        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);

        let value = transport
            .send_command(CommandTarget::Browser, "Browser.getVersion", Value::Null)
            .await
            .expect("command routed through runtime");
        assert_eq!(value["echo"], "Browser.getVersion");
    }

    #[tokio::test]
    async fn dead_runtime_is_not_silently_relaunched() {
        let (transport, spawn_count, alive_flags) = stub_transport();
        transport.start().await.expect("start");
        alive_flags.lock().await[0].store(false, Ordering::SeqCst);

        let err = transport
            .send_command(CommandTarget::Browser, "Browser.getVersion", Value::Null)
            .await
            .expect_err("dead connection must surface");
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);

        let err = transport.start().await.expect_err("restart refused");
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn commands_after_shutdown_report_closed_session() {
        let (transport, _, _) = stub_transport();
        transport.start().await.expect("start");
        transport.shutdown().await.expect("shutdown");
        transport.shutdown().await.expect("second shutdown is a no-op");

        let err = transport
            .send_command(CommandTarget::Browser, "Browser.getVersion", Value::Null)
            .await
            .expect_err("closed transport");
        assert_eq!(err.kind, AdapterErrorKind::SessionClosed);
    }

    #[test]
    fn missing_executable_is_a_launch_failure() {
        let mut cfg = CdpConfig::default();
        cfg.executable = "/nonexistent/chromium".into();
        let err = RuntimeState::browser_config(&cfg, None).expect_err("must fail");
        assert_eq!(err.kind, AdapterErrorKind::LaunchFailed);
        assert!(err.hint.unwrap_or_default().contains("/nonexistent/chromium"));
    }
}
