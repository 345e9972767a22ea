use tracing::warn;

use crate::models::Conversation;

const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Byte length of the conversation's serialized record, image payloads included.
pub fn size_of(conversation: &Conversation) -> u64 {
    match serde_json::to_vec(conversation) {
        Ok(bytes) => bytes.len() as u64,
        Err(e) => {
            warn!(conv_id = %conversation.id, error = ?e, "Failed to measure conversation size");
            0
        }
    }
}

pub fn total_size(conversations: &[Conversation]) -> u64 {
    conversations.iter().map(size_of).sum()
}

/// Human-readable size with up to `decimals` fractional digits, e.g. `1.5 KB`.
pub fn format_bytes(bytes: u64, decimals: usize) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    // floor(log_1024(bytes)), computed exactly
    let mut unit_index = 0;
    while unit_index < UNITS.len() - 1 && bytes >= 1024_u64.pow(unit_index as u32 + 1) {
        unit_index += 1;
    }

    let factor = 10_f64.powi(decimals as i32);
    let value = (bytes as f64 / 1024_f64.powi(unit_index as i32) * factor).round() / factor;

    format!("{} {}", value, UNITS[unit_index])
}

/// Storage consumed by one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationUsage {
    pub id: String,
    pub title: String,
    pub bytes: u64,
}

/// Storage consumed by all conversations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageReport {
    pub conversations: Vec<ConversationUsage>,
    pub total_bytes: u64,
}

impl StorageReport {
    /// Largest conversations first
    pub fn build(conversations: &[Conversation]) -> Self {
        let mut usage: Vec<ConversationUsage> = conversations
            .iter()
            .map(|c| ConversationUsage {
                id: c.id.clone(),
                title: c.title.clone(),
                bytes: size_of(c),
            })
            .collect();
        usage.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.id.cmp(&b.id)));

        let total_bytes = usage.iter().map(|u| u.bytes).sum();
        Self {
            conversations: usage,
            total_bytes,
        }
    }

    pub fn count(&self) -> usize {
        self.conversations.len()
    }

    pub fn formatted_total(&self) -> String {
        format_bytes(self.total_bytes, 2)
    }
}
