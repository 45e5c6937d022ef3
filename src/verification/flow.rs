//! The chat verification scenario.
//!
//! Strictly sequential: navigate, resolve setup, debug snapshot, await the chat input,
//! send the message, see it echoed, see the reply stream, final snapshot. The first
//! fatal error ends the run. Snapshot failures are held back and only reported when
//! nothing fatal happened.

use action_primitives::expect_text_present;
use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::errors::{FlowStage, VerifyError, VerifyResult};
use crate::session::{run_scoped, Scenario, Session, SessionLauncher};
use crate::verification::artifacts::{ArtifactRecord, ArtifactRecorder, DEBUG_ARTIFACT, FINAL_ARTIFACT};
use crate::verification::setup::{PageState, SetupResolver};
use crate::verification::streaming::{StreamObservation, StreamingDetector};
use crate::verification::{driver, navigator};

/// Summary of a passing run.
#[derive(Clone, Debug, Serialize)]
pub struct FlowReport {
    pub url: String,
    pub page_state: PageState,
    pub artifacts: Vec<ArtifactRecord>,
    pub streaming: StreamObservation,
    pub elapsed_ms: u64,
}

pub struct ChatFlow {
    config: HarnessConfig,
    recorder: ArtifactRecorder,
}

impl ChatFlow {
    pub fn new(config: HarnessConfig) -> Self {
        let recorder = ArtifactRecorder::new(config.artifact_dir.clone());
        Self { config, recorder }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    async fn snapshot(
        &self,
        session: &Session,
        name: &str,
        stage: FlowStage,
        artifacts: &mut Vec<ArtifactRecord>,
        deferred: &mut Option<VerifyError>,
    ) {
        match self.recorder.record(session, name).await {
            Ok(record) => artifacts.push(record),
            Err(err) => {
                warn!(stage = %stage, error = %err, "continuing without artifact");
                deferred.get_or_insert(err);
            }
        }
    }
}

#[async_trait]
impl Scenario for ChatFlow {
    type Output = FlowReport;

    async fn run(&self, session: &Session) -> VerifyResult<FlowReport> {
        let started = Instant::now();
        let cfg = &self.config;
        let timeouts = &cfg.timeouts;
        let mut artifacts = Vec::with_capacity(2);
        let mut deferred = None;

        navigator::open(session, &cfg.url, timeouts.navigation()).await?;

        let resolver = SetupResolver::from_config(cfg);
        let page_state = resolver.resolve(session).await?;

        self.snapshot(
            session,
            DEBUG_ARTIFACT,
            FlowStage::DebugArtifact,
            &mut artifacts,
            &mut deferred,
        )
        .await;

        resolver.await_ready(session).await?;

        driver::send(session, &cfg.contract, &cfg.message, timeouts.ready()).await?;

        let ctx = session.ctx(timeouts.echo_visible());
        expect_text_present(
            session,
            &ctx,
            &cfg.message,
            timeouts.echo_visible(),
            timeouts.poll_interval(),
        )
        .await
        .map_err(|err| VerifyError::from_action(FlowStage::EchoVisible, err))?;
        info!(stage = %FlowStage::EchoVisible, "user message echoed");

        let streaming = StreamingDetector::from_config(cfg).detect(session).await?;

        self.snapshot(
            session,
            FINAL_ARTIFACT,
            FlowStage::FinalArtifact,
            &mut artifacts,
            &mut deferred,
        )
        .await;

        if let Some(err) = deferred {
            return Err(err);
        }

        Ok(FlowReport {
            url: cfg.url.clone(),
            page_state,
            artifacts,
            streaming,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Run the chat scenario once in a scoped session.
pub async fn verify(config: &HarnessConfig, launcher: &dyn SessionLauncher) -> VerifyResult<FlowReport> {
    let flow = ChatFlow::new(config.clone());
    let started = Instant::now();
    let outcome = run_scoped(launcher, &flow).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        Ok(_) => info!(elapsed_ms, "chat flow verified"),
        Err(err) => warn!(
            elapsed_ms,
            stage = err.stage().map(|s| s.as_str()).unwrap_or("-"),
            error = %err,
            "chat flow failed"
        ),
    }
    outcome
}

