//! Error handling module
//!
//! One taxonomy for the whole run. Lower layers report [`ActionError`]; the flow tags
//! each failure with the [`FlowStage`] it happened in so the operator sees which
//! semantic contract was violated.

use action_primitives::ActionError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Named step of the verification flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    Launch,
    Navigate,
    SetupProbe,
    Setup,
    DebugArtifact,
    AwaitReady,
    SendMessage,
    EchoVisible,
    ReplyVisible,
    ReplyStreaming,
    FinalArtifact,
    Teardown,
}

impl FlowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStage::Launch => "launch",
            FlowStage::Navigate => "navigate",
            FlowStage::SetupProbe => "setup_probe",
            FlowStage::Setup => "setup",
            FlowStage::DebugArtifact => "debug_artifact",
            FlowStage::AwaitReady => "await_ready",
            FlowStage::SendMessage => "send_message",
            FlowStage::EchoVisible => "echo_visible",
            FlowStage::ReplyVisible => "reply_visible",
            FlowStage::ReplyStreaming => "reply_streaming",
            FlowStage::FinalArtifact => "final_artifact",
            FlowStage::Teardown => "teardown",
        }
    }
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a verification run
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Browser process or isolated context could not be created
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// The entry page did not load
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// A required element never matched, or matched but could not take the action
    #[error("[{stage}] {descriptor}: {reason}")]
    Resolution {
        stage: FlowStage,
        descriptor: String,
        reason: String,
    },

    /// A bounded wait elapsed
    #[error("[{stage}] timed out after {}ms waiting for {condition}", bound.as_millis())]
    Timeout {
        stage: FlowStage,
        condition: String,
        bound: Duration,
    },

    #[error("failed to write artifact {}: {reason}", path.display())]
    ArtifactWrite { path: PathBuf, reason: String },

    /// Browser plumbing failed mid-run (lost connection, closed session, bad reply)
    #[error("[{stage}] browser protocol error: {reason}")]
    Protocol { stage: FlowStage, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type VerifyResult<T> = Result<T, VerifyError>;

impl VerifyError {
    /// Attribute a primitive failure to the stage it happened in.
    pub fn from_action(stage: FlowStage, err: ActionError) -> Self {
        match err {
            ActionError::LaunchFailed(msg) => VerifyError::Launch(msg),
            ActionError::NavFailed(msg) | ActionError::NavTimeout(msg) => {
                VerifyError::Navigation(msg)
            }
            ActionError::WaitTimeout { condition, bound } => VerifyError::Timeout {
                stage,
                condition,
                bound,
            },
            ActionError::AnchorNotFound(descriptor) => VerifyError::Resolution {
                stage,
                descriptor,
                reason: "no element matched".to_string(),
            },
            ActionError::NotEnabled(descriptor) => VerifyError::Resolution {
                stage,
                descriptor,
                reason: "element is disabled".to_string(),
            },
            ActionError::NotClickable(msg) => VerifyError::Resolution {
                stage,
                descriptor: msg.trim_end_matches(" is not visible").to_string(),
                reason: "element is not visible".to_string(),
            },
            ActionError::Interrupted(msg) | ActionError::CdpIo(msg) | ActionError::Internal(msg) => {
                VerifyError::Protocol { stage, reason: msg }
            }
        }
    }

    pub fn stage(&self) -> Option<FlowStage> {
        match self {
            VerifyError::Launch(_) => Some(FlowStage::Launch),
            VerifyError::Navigation(_) => Some(FlowStage::Navigate),
            VerifyError::Resolution { stage, .. }
            | VerifyError::Timeout { stage, .. }
            | VerifyError::Protocol { stage, .. } => Some(*stage),
            VerifyError::ArtifactWrite { .. } | VerifyError::Config(_) => None,
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            VerifyError::Resolution { .. } | VerifyError::Timeout { .. } => 1,
            VerifyError::Launch(_) | VerifyError::Navigation(_) | VerifyError::Protocol { .. } => 2,
            VerifyError::ArtifactWrite { .. } => 3,
            VerifyError::Config(_) => 64,
        }
    }
}

impl From<::config::ConfigError> for VerifyError {
    fn from(err: ::config::ConfigError) -> Self {
        VerifyError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_timeout_keeps_condition_and_bound() {
        let err = VerifyError::from_action(
            FlowStage::ReplyStreaming,
            ActionError::WaitTimeout {
                condition: "css:[role=\"article\"] >> nth=1 text to change".to_string(),
                bound: Duration::from_secs(10),
            },
        );
        assert_eq!(err.stage(), Some(FlowStage::ReplyStreaming));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(
            err.to_string(),
            "[reply_streaming] timed out after 10000ms waiting for css:[role=\"article\"] >> nth=1 text to change"
        );
    }

    #[test]
    fn hidden_control_names_bare_descriptor() {
        let err = VerifyError::from_action(
            FlowStage::SendMessage,
            ActionError::NotClickable("label:'Send message' is not visible".to_string()),
        );
        match err {
            VerifyError::Resolution { descriptor, .. } => {
                assert_eq!(descriptor, "label:'Send message'")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exit_codes_by_class() {
        assert_eq!(VerifyError::Launch("x".into()).exit_code(), 2);
        assert_eq!(
            VerifyError::from_action(FlowStage::Navigate, ActionError::NavTimeout("slow".into()))
                .exit_code(),
            2
        );
        assert_eq!(
            VerifyError::ArtifactWrite {
                path: PathBuf::from("a.png"),
                reason: "denied".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(VerifyError::Config("bad".into()).exit_code(), 64);
    }

    #[test]
    fn closed_session_is_protocol_failure() {
        let err = VerifyError::from_action(
            FlowStage::EchoVisible,
            ActionError::Interrupted("session closed".into()),
        );
        assert!(matches!(err, VerifyError::Protocol { stage: FlowStage::EchoVisible, .. }));
    }
}
