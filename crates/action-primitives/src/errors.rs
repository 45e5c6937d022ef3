//! Error types for action primitives

use cdp_adapter::{AdapterError, AdapterErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Error types for action primitive operations
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// Browser could not be launched or connected
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    /// Navigation was rejected by the browser (DNS, refused connection, ...)
    #[error("Navigation failed: {0}")]
    NavFailed(String),

    /// Navigation timed out waiting for the document
    #[error("Navigation timeout: {0}")]
    NavTimeout(String),

    /// A bounded wait elapsed before its condition held
    #[error("Timed out after {}ms waiting for {condition}", bound.as_millis())]
    WaitTimeout { condition: String, bound: Duration },

    /// Operation was cancelled, or the session is already closed
    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    /// Element matched but cannot receive input (hidden or zero-sized)
    #[error("Element not clickable: {0}")]
    NotClickable(String),

    /// Element is disabled
    #[error("Element not enabled: {0}")]
    NotEnabled(String),

    /// No element matched the locator
    #[error("Anchor not found: {0}")]
    AnchorNotFound(String),

    /// CDP communication or protocol error
    #[error("CDP I/O error: {0}")]
    CdpIo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// True for failures that describe the page rather than the browser plumbing.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            ActionError::AnchorNotFound(_)
                | ActionError::NotEnabled(_)
                | ActionError::NotClickable(_)
        )
    }

    /// True for protocol hiccups a poll may retry, e.g. an execution context destroyed
    /// by a reload. Cancellation and a closed session are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, ActionError::CdpIo(_) | ActionError::Internal(_))
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        let message = err.to_string();
        match err.kind {
            AdapterErrorKind::LaunchFailed => ActionError::LaunchFailed(message),
            AdapterErrorKind::NavFailed => ActionError::NavFailed(message),
            AdapterErrorKind::NavTimeout => ActionError::NavTimeout(message),
            AdapterErrorKind::SessionClosed => ActionError::Interrupted(message),
            AdapterErrorKind::CdpIo => ActionError::CdpIo(message),
            AdapterErrorKind::Internal => ActionError::Internal(message),
        }
    }
}
