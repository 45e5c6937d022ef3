//! The chat verification flow and its components.

pub mod artifacts;
pub mod driver;
pub mod flow;
pub mod navigator;
pub mod setup;
pub mod streaming;

pub use artifacts::{ArtifactRecord, ArtifactRecorder, DEBUG_ARTIFACT, FINAL_ARTIFACT};
pub use flow::{verify, ChatFlow, FlowReport};
pub use setup::{PageState, SetupResolver};
pub use streaming::{
    AssistantSelection, StreamEvidence, StreamObservation, StreamingDetector, TextSnapshot,
};
