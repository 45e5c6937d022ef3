mod support;

use action_primitives::ActionPrimitives;
use chatflow_verify::verification::{
    driver, AssistantSelection, SetupResolver, StreamEvidence, DEBUG_ARTIFACT, FINAL_ARTIFACT,
};
use chatflow_verify::ChatContract;
use chatflow_verify::{
    run_scoped, verify, FlowStage, PageState, Scenario, Session, VerifyError, VerifyResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use support::{config_in, BrokenLauncher, FakeChatApp, FakeLauncher, Reply, PNG};

#[tokio::test(start_paused = true)]
async fn hello_world_scenario_passes_and_writes_both_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(FakeChatApp::ready());

    let report = tokio_test::assert_ok!(verify(&config_in(dir.path()), &launcher).await);

    assert_eq!(report.page_state, PageState::Ready);
    assert_eq!(report.streaming.evidence, StreamEvidence::TextChanged);
    assert_eq!(report.streaming.baseline.text(), "Hello");
    assert_eq!(report.artifacts.len(), 2);
    assert_eq!(std::fs::read(dir.path().join(DEBUG_ARTIFACT)).unwrap(), PNG);
    assert_eq!(std::fs::read(dir.path().join(FINAL_ARTIFACT)).unwrap(), PNG);

    let calls = launcher.app.calls();
    assert!(calls.contains(&"fill:placeholder:'What can I do for you?'".to_string()));
    assert!(calls.contains(&"click:label:'Send message'".to_string()));
    assert_eq!(launcher.app.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn ready_start_performs_no_setup_actions() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(FakeChatApp::ready());

    let report = verify(&config_in(dir.path()), &launcher).await.unwrap();

    assert_eq!(report.page_state, PageState::Ready);
    assert_eq!(launcher.app.setup_actions(), 0);
}

#[tokio::test(start_paused = true)]
async fn ready_start_resolves_without_waiting_out_the_setup_bound() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());
    let session = Session::new(Arc::new(FakeChatApp::ready()));

    let started = Instant::now();
    let state = SetupResolver::from_config(&cfg)
        .ensure_ready(&session)
        .await
        .unwrap();

    assert_eq!(state, PageState::Ready);
    assert!(started.elapsed() < cfg.timeouts.setup_probe() / 10);
}

#[tokio::test(start_paused = true)]
async fn needs_setup_start_fills_key_and_saves_once() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(FakeChatApp::needs_setup());

    let report = tokio_test::assert_ok!(verify(&config_in(dir.path()), &launcher).await);

    assert_eq!(report.page_state, PageState::NeedsSetup);
    assert_eq!(launcher.app.setup_actions(), 2);
    let calls = launcher.app.calls();
    let fill = calls
        .iter()
        .position(|c| c == "fill:label:'Google API Key'")
        .unwrap();
    let save = calls
        .iter()
        .position(|c| c == "click:role:button[name='Save API Keys']")
        .unwrap();
    assert!(fill < save);
}

#[tokio::test(start_paused = true)]
async fn saving_without_a_key_never_reaches_ready() {
    let app = Arc::new(FakeChatApp::needs_setup());
    let session = Session::new(app.clone());
    let resolver = SetupResolver::new(Default::default(), "dummy-google-api-key").with_bounds(
        Duration::from_secs(2),
        Duration::from_secs(10),
        Duration::from_millis(100),
    );
    let contract = chatflow_verify::ChatContract::default();

    let ctx = session.ctx(Duration::from_secs(1));
    session.click(&ctx, &contract.save_control()).await.unwrap();

    let err = resolver.await_ready(&session).await.unwrap_err();
    assert!(matches!(
        err,
        VerifyError::Timeout { stage: FlowStage::AwaitReady, bound, .. } if bound == Duration::from_secs(10)
    ));
    assert!(!app.is_configured());
}

#[tokio::test(start_paused = true)]
async fn ensure_ready_reports_page_state() {
    let app = Arc::new(FakeChatApp::needs_setup());
    let session = Session::new(app.clone());
    let resolver = SetupResolver::new(Default::default(), "dummy-google-api-key");

    assert_eq!(
        resolver.ensure_ready(&session).await.unwrap(),
        PageState::NeedsSetup
    );
    assert!(app.is_configured());
    assert_eq!(
        resolver.ensure_ready(&session).await.unwrap(),
        PageState::Ready
    );
    assert_eq!(app.setup_actions(), 2);
}

#[tokio::test(start_paused = true)]
async fn static_reply_fails_at_streaming_check_and_keeps_debug_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(
        FakeChatApp::ready().with_reply(Reply::Static("Hello! How can I help?".to_string())),
    );

    let err = verify(&config_in(dir.path()), &launcher).await.unwrap_err();

    match &err {
        VerifyError::Timeout {
            stage, condition, ..
        } => {
            assert_eq!(*stage, FlowStage::ReplyStreaming);
            assert!(condition.contains("text to change"));
        }
        other => panic!("expected streaming timeout, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 1);
    assert!(dir.path().join(DEBUG_ARTIFACT).exists());
    assert!(!dir.path().join(FINAL_ARTIFACT).exists());
    assert_eq!(launcher.app.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_echo_fails_before_the_reply_is_inspected() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());
    let launcher = FakeLauncher::new(FakeChatApp::ready().without_echo());

    let err = verify(&cfg, &launcher).await.unwrap_err();

    match &err {
        VerifyError::Timeout {
            stage, condition, bound,
        } => {
            assert_eq!(*stage, FlowStage::EchoVisible);
            assert!(condition.contains("Hello, world!"), "{condition}");
            assert_eq!(*bound, cfg.timeouts.echo_visible());
        }
        other => panic!("expected echo timeout, got {other:?}"),
    }
    let reply = cfg.streaming.assistant.locator(&cfg.contract).descriptor();
    assert!(!launcher.app.inspected().contains(&reply));
    assert!(!dir.path().join(FINAL_ARTIFACT).exists());
    assert_eq!(launcher.app.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_send_control_is_a_resolution_error() {
    let session = Session::new(Arc::new(FakeChatApp::ready().without_send_control()));
    let contract = ChatContract::default();

    let err = driver::send(&session, &contract, "Hello, world!", Duration::from_secs(10))
        .await
        .unwrap_err();

    match &err {
        VerifyError::Resolution {
            stage, descriptor, ..
        } => {
            assert_eq!(*stage, FlowStage::SendMessage);
            assert_eq!(descriptor, "label:'Send message'");
        }
        other => panic!("expected resolution error, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn absent_reply_fails_at_visibility_check() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(FakeChatApp::ready().with_reply(Reply::Never));

    let err = verify(&config_in(dir.path()), &launcher).await.unwrap_err();

    assert_eq!(err.stage(), Some(FlowStage::ReplyVisible));
    assert!(matches!(err, VerifyError::Timeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn reply_mutating_after_500ms_passes() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(FakeChatApp::ready().with_reply(Reply::mutating(
        "",
        "Hi",
        Duration::from_millis(500),
    )));

    let report = verify(&config_in(dir.path()), &launcher).await.unwrap();
    assert_eq!(report.streaming.baseline.text(), "");
    assert_eq!(report.streaming.evidence, StreamEvidence::TextChanged);
}

#[tokio::test(start_paused = true)]
async fn consecutive_runs_produce_same_paths_and_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());

    let first = verify(&cfg, &FakeLauncher::new(FakeChatApp::needs_setup()))
        .await
        .unwrap();
    let second = verify(&cfg, &FakeLauncher::new(FakeChatApp::needs_setup()))
        .await
        .unwrap();

    let paths = |report: &chatflow_verify::FlowReport| {
        report
            .artifacts
            .iter()
            .map(|a| a.path.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(paths(&first), paths(&second));
    assert_eq!(first.page_state, second.page_state);
}

#[tokio::test(start_paused = true)]
async fn launch_failure_is_fatal_before_any_step() {
    let dir = tempfile::tempdir().unwrap();
    let err = verify(&config_in(dir.path()), &BrokenLauncher)
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Launch(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(!dir.path().join(DEBUG_ARTIFACT).exists());
}

#[tokio::test(start_paused = true)]
async fn unreachable_app_is_a_navigation_error_and_still_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(FakeChatApp::ready().unreachable());

    let err = verify(&config_in(dir.path()), &launcher).await.unwrap_err();

    assert!(matches!(err, VerifyError::Navigation(ref msg) if msg.contains("REFUSED")));
    assert_eq!(launcher.app.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn artifact_failure_fails_an_otherwise_passing_run() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let launcher = FakeLauncher::new(FakeChatApp::ready());

    let err = verify(&config_in(&blocker.join("shots")), &launcher)
        .await
        .unwrap_err();

    match &err {
        VerifyError::ArtifactWrite { path, .. } => assert!(path.ends_with(DEBUG_ARTIFACT)),
        other => panic!("expected artifact error, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 3);
    // the flow kept going after the failed capture
    assert!(launcher
        .app
        .calls()
        .contains(&"click:label:'Send message'".to_string()));
}

#[tokio::test(start_paused = true)]
async fn artifact_failure_never_masks_an_assertion_failure() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let launcher = FakeLauncher::new(
        FakeChatApp::ready().with_reply(Reply::Static("stuck".to_string())),
    );

    let err = verify(&config_in(&blocker.join("shots")), &launcher)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(FlowStage::ReplyStreaming));
}

#[tokio::test(start_paused = true)]
async fn authorship_selection_finds_the_reply_by_attribute() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(FakeChatApp::ready().with_authorship("data-message-role"));
    let mut cfg = config_in(dir.path());
    cfg.streaming.assistant = AssistantSelection::by_authorship();

    let report = verify(&cfg, &launcher).await.unwrap();

    assert_eq!(
        report.streaming.locator,
        "css:[role=\"article\"][data-message-role='assistant']"
    );
}

#[tokio::test(start_paused = true)]
async fn completion_signal_is_accepted_without_text_change() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(
        FakeChatApp::ready()
            .with_reply(Reply::Static("Thinking".to_string()))
            .with_signal("aria-busy", "true", Duration::from_millis(300)),
    );
    let mut cfg = config_in(dir.path());
    cfg.streaming.signal_attribute = Some("aria-busy".to_string());

    let report = verify(&cfg, &launcher).await.unwrap();

    assert_eq!(report.streaming.evidence, StreamEvidence::CompletionSignal);
}

struct Explodes;

#[async_trait::async_trait]
impl Scenario for Explodes {
    type Output = ();

    async fn run(&self, _session: &Session) -> VerifyResult<()> {
        panic!("scenario bug");
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_scenario_still_releases_the_session() {
    let launcher = Arc::new(FakeLauncher::new(FakeChatApp::ready()));
    let app = launcher.app.clone();

    let handle = tokio::spawn({
        let launcher = launcher.clone();
        async move { run_scoped(launcher.as_ref(), &Explodes).await }
    });

    let joined = handle.await;
    assert!(joined.unwrap_err().is_panic());
    assert_eq!(app.closes(), 1);
}
