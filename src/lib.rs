//! chatflow-verify library
//!
//! Drives a real Chromium page through the chat application's first-run setup,
//! sends a message and confirms that the assistant reply streams in, recording
//! screenshots along the way.

pub mod config;
pub mod contract;
pub mod errors;
pub mod session;
pub mod verification;

pub use crate::config::HarnessConfig;
pub use crate::contract::ChatContract;
pub use crate::errors::{FlowStage, VerifyError, VerifyResult};
pub use crate::session::{acquire, run_scoped, ChromiumLauncher, Scenario, Session, SessionLauncher};
pub use crate::verification::{verify, ChatFlow, FlowReport, PageState};
