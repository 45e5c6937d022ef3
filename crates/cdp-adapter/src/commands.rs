//! Command parameter types exposed by the CDP adapter interface.

use serde::{Deserialize, Serialize};

/// Viewport coordinate (CSS pixels) used for synthesized input events.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Options for capturing screenshots. Captures are always PNG.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScreenshotOptions {
    /// Capture the whole scrollable document rather than the viewport.
    pub full_page: bool,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self { full_page: true }
    }
}
