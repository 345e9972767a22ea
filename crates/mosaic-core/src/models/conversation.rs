use serde::{Deserialize, Serialize};

use super::message::Message;

/// Title used until one can be synthesized from content
pub const PLACEHOLDER_TITLE: &str = "New Conversation";

/// Current time as Unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn default_needs_title_generation() -> bool {
    true
}

/// A persisted, titled message log plus listing metadata.
///
/// This is also the durable record: stores serialize it as-is, with image
/// payloads embedded as base64 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    /// Unix milliseconds
    pub created: i64,
    /// Unix milliseconds
    pub last_updated: i64,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default = "default_needs_title_generation")]
    pub needs_title_generation: bool,
}

impl Conversation {
    pub fn new(id: impl Into<String>, messages: Vec<Message>) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            title: PLACEHOLDER_TITLE.to_string(),
            messages,
            created: now,
            last_updated: now,
            favorite: false,
            pinned: false,
            needs_title_generation: true,
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Case-insensitive match against the title and every text part.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        if self.title.to_lowercase().contains(&needle) {
            return true;
        }
        self.messages.iter().any(|m| {
            m.parts
                .iter()
                .filter_map(|p| p.as_text())
                .any(|text| text.to_lowercase().contains(&needle))
        })
    }
}
