//! Semantic contract the chat application must honour.
//!
//! Every element the flow touches is described here by accessible role, label or
//! placeholder. The strings default to the application's current UI and can be
//! overridden from configuration when the copy changes.

use action_primitives::{Locator, Selector};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatContract {
    /// Heading shown only while no API key is stored (matched exactly).
    pub setup_heading: String,
    pub api_key_label: String,
    pub save_button: String,
    /// Placeholder of the primary chat input.
    pub input_placeholder: String,
    pub send_label: String,
    /// Role carried by every rendered message, in DOM order.
    pub message_role: String,
}

impl Default for ChatContract {
    fn default() -> Self {
        Self {
            setup_heading: "Add Your API Keys To Start Chatting".to_string(),
            api_key_label: "Google API Key".to_string(),
            save_button: "Save API Keys".to_string(),
            input_placeholder: "What can I do for you?".to_string(),
            send_label: "Send message".to_string(),
            message_role: "article".to_string(),
        }
    }
}

impl ChatContract {
    pub fn setup_marker(&self) -> Locator {
        Locator::role("heading", self.setup_heading.clone()).exact()
    }

    pub fn api_key_field(&self) -> Locator {
        Locator::label(self.api_key_label.clone())
    }

    pub fn save_control(&self) -> Locator {
        Locator::role("button", self.save_button.clone())
    }

    pub fn message_input(&self) -> Locator {
        Locator::placeholder(self.input_placeholder.clone())
    }

    pub fn send_control(&self) -> Locator {
        Locator::label(self.send_label.clone())
    }

    /// CSS scope matching every message element.
    pub fn message_scope(&self) -> String {
        format!("[role=\"{}\"]", self.message_role)
    }

    /// All message elements; pick one with [`Locator::nth`].
    pub fn messages(&self) -> Locator {
        Locator::css(self.message_scope())
    }

    /// Messages whose `attribute` equals `value`, e.g. `data-message-role="assistant"`.
    pub fn messages_where(&self, attribute: &str, value: &str) -> Locator {
        Locator::new(Selector::Attribute {
            scope: self.message_scope(),
            name: attribute.to_string(),
            value: value.to_string(),
        })
    }
}
