//! Core data types for action primitives

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Execution context for action primitives
///
/// Carries the deadline and cancellation token of one action, plus an id used to
/// correlate log lines.
#[derive(Clone)]
pub struct ExecCtx {
    /// Deadline for this operation
    pub deadline: Instant,

    /// Cancellation token for cooperative cancellation
    pub cancel_token: CancellationToken,

    /// Unique identifier for this action
    pub action_id: String,
}

impl ExecCtx {
    pub fn new(deadline: Instant, cancel_token: CancellationToken) -> Self {
        Self {
            deadline,
            cancel_token,
            action_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Context whose deadline is `budget` from now.
    pub fn with_budget(budget: Duration, cancel_token: CancellationToken) -> Self {
        Self::new(Instant::now() + budget, cancel_token)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn is_timeout(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// How an element is found: by what a user perceives, or by CSS as a last resort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// ARIA role (explicit or implicit) with an optional accessible name.
    Role {
        role: String,
        name: Option<String>,
        exact: bool,
    },
    /// Form control associated with a label (`<label>`, `aria-label`, `aria-labelledby`).
    Label(String),
    /// Input or textarea carrying the placeholder text.
    Placeholder(String),
    /// Innermost elements whose text contains (or, if exact, equals) `content`.
    Text { content: String, exact: bool },
    /// Elements matching an attribute value inside a CSS scope.
    Attribute {
        scope: String,
        name: String,
        value: String,
    },
    Css(String),
}

/// A live reference to the elements matching a selector.
///
/// Nothing is cached: every use re-resolves against the current document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub selector: Selector,
    /// Zero-based index among the matches; `None` takes the first.
    pub nth: Option<usize>,
}

impl Locator {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            nth: None,
        }
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Selector::Role {
            role: role.into(),
            name: Some(name.into()),
            exact: false,
        })
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self::new(Selector::Label(text.into()))
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::new(Selector::Placeholder(text.into()))
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(Selector::Text {
            content: content.into(),
            exact: false,
        })
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Selector::Css(selector.into()))
    }

    /// Require an exact accessible-name or text match.
    pub fn exact(mut self) -> Self {
        match &mut self.selector {
            Selector::Role { exact, .. } | Selector::Text { exact, .. } => *exact = true,
            _ => {}
        }
        self
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self
    }

    /// Human-readable descriptor used in logs and error messages.
    pub fn descriptor(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Selector::Role { role, name, exact } => {
                write!(f, "role:{role}")?;
                if let Some(name) = name {
                    let mode = if *exact { "exact" } else { "name" };
                    write!(f, "[{mode}='{name}']")?;
                }
            }
            Selector::Label(text) => write!(f, "label:'{text}'")?,
            Selector::Placeholder(text) => write!(f, "placeholder:'{text}'")?,
            Selector::Text { content, exact } => {
                if *exact {
                    write!(f, "text:exact:'{content}'")?
                } else {
                    write!(f, "text:'{content}'")?
                }
            }
            Selector::Attribute { scope, name, value } => {
                write!(f, "css:{scope}[{name}='{value}']")?
            }
            Selector::Css(css) => write!(f, "css:{css}")?,
        }
        if let Some(index) = self.nth {
            write!(f, " >> nth={index}")?;
        }
        Ok(())
    }
}

/// What a single resolution of a locator observed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    /// Total number of matches, regardless of `nth`.
    pub count: usize,
    /// Whether the selected match exists and is rendered.
    pub visible: bool,
    pub enabled: bool,
    /// `innerText` of the selected match.
    pub text: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ElementState {
    pub fn attached(&self) -> bool {
        self.text.is_some()
    }
}

/// Condition for a bounded wait
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WaitCondition {
    /// Element is rendered
    Visible(Locator),

    /// Some innermost element containing this text is rendered
    TextPresent(String),

    /// Element's text no longer equals the baseline
    TextDiffers { locator: Locator, baseline: String },

    /// Element exposes an attribute with the given value
    AttributeEquals {
        locator: Locator,
        name: String,
        value: String,
    },

    /// Satisfied as soon as any inner condition holds
    AnyOf(Vec<WaitCondition>),
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::Visible(locator) => write!(f, "{locator} visible"),
            WaitCondition::TextPresent(text) => write!(f, "text '{text}' visible"),
            WaitCondition::TextDiffers { locator, .. } => {
                write!(f, "{locator} text to change")
            }
            WaitCondition::AttributeEquals {
                locator,
                name,
                value,
            } => write!(f, "{locator} [{name}='{value}']"),
            WaitCondition::AnyOf(inner) => {
                let parts: Vec<String> = inner.iter().map(ToString::to_string).collect();
                write!(f, "any of ({})", parts.join(" | "))
            }
        }
    }
}

/// Action execution report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub ok: bool,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finished_at: DateTime<Utc>,

    pub latency_ms: u64,

    /// Locator or condition the action targeted
    pub target: Option<String>,
}

impl ActionReport {
    pub fn success(started_at: DateTime<Utc>, latency_ms: u64) -> Self {
        Self {
            ok: true,
            started_at,
            finished_at: Utc::now(),
            latency_ms,
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}
