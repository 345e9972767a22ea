use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::models::{Message, PLACEHOLDER_TITLE, Role};

/// Title for conversations opened with images only
pub const IMAGE_TITLE: &str = "Image Conversation";

/// Model sentences at or above this many characters are not used as titles
const MAX_SENTENCE_CHARS: usize = 60;
const MODEL_TITLE_WORDS: usize = 4;
const USER_TITLE_WORDS: usize = 5;
const MAX_TITLE_CHARS: usize = 100;

lazy_static! {
    /// `[System] ... [/System]` or `[Instructions] ... [/Instructions]` blocks
    static ref BRACKETED_PREAMBLE: Regex = Regex::new(
        r"(?is)^\s*\[(system|instructions?)\].*?\[/(system|instructions?)\]\s*"
    )
    .unwrap();
    /// `System: ...` / `Instructions: ...` paragraphs ending at the first blank line
    static ref LABELLED_PREAMBLE: Regex = Regex::new(
        r"(?is)^\s*(system|instructions?)\s*:.*?(\n\s*\n|\z)"
    )
    .unwrap();
    /// Leading `User:` / `**User:**` style role labels
    static ref ROLE_PREFIX: Regex = Regex::new(
        r"(?i)^\s*(\*\*|__)?(user|you|me)(\*\*|__)?\s*:\s*(\*\*|__)?\s*"
    )
    .unwrap();
}

/// Result of title synthesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedTitle {
    pub title: String,
    /// A model turn existed, so later turns cannot change the result
    pub has_model_reply: bool,
}

/// Derive a display title from conversation content.
///
/// Rules, first match wins:
/// 1. first sentence of the first model text, if shorter than 60 chars → first 4 words
/// 2. first user text, minus instruction preamble and role label → first 5 words
/// 3. first user message holds only images → "Image Conversation"
/// 4. "New Conversation"
pub fn synthesize_title(messages: &[Message]) -> SynthesizedTitle {
    if let Some(title) = title_from_model_reply(messages) {
        debug!(title = %title, "Title synthesized from model reply");
        return SynthesizedTitle {
            title,
            has_model_reply: true,
        };
    }

    let has_model_reply = messages.iter().any(|m| m.role == Role::Model);
    let first_user = messages.iter().find(|m| m.role == Role::User);

    let title = match first_user {
        Some(message) => match message.first_text().map(strip_preamble) {
            Some(text) if !text.is_empty() => first_words(&text, USER_TITLE_WORDS),
            _ if message.has_images() => IMAGE_TITLE.to_string(),
            _ => PLACEHOLDER_TITLE.to_string(),
        },
        None => PLACEHOLDER_TITLE.to_string(),
    };

    debug!(title = %title, "Title synthesized from user message");
    SynthesizedTitle {
        title,
        has_model_reply,
    }
}

fn title_from_model_reply(messages: &[Message]) -> Option<String> {
    let text = messages
        .iter()
        .filter(|m| m.role == Role::Model)
        .find_map(Message::first_text)?;

    let sentence = first_sentence(text);
    if sentence.is_empty() || sentence.chars().count() >= MAX_SENTENCE_CHARS {
        return None;
    }
    Some(first_words(sentence, MODEL_TITLE_WORDS))
}

fn first_sentence(text: &str) -> &str {
    text.split(['.', '!', '?']).next().unwrap_or("").trim()
}

fn first_words(text: &str, count: usize) -> String {
    text.split_whitespace()
        .take(count)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove an instruction preamble and a leading role label.
fn strip_preamble(text: &str) -> String {
    let text = BRACKETED_PREAMBLE.replace(text, "");
    let text = LABELLED_PREAMBLE.replace(&text, "");
    let text = ROLE_PREFIX.replace(&text, "");
    text.trim().to_string()
}

/// Normalize a user-supplied title: first line, trimmed, capped at 100 chars.
/// Returns `None` when nothing is left.
pub fn clean_title(raw_title: &str) -> Option<String> {
    let cleaned = raw_title
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_string();

    if cleaned.is_empty() {
        None
    } else if cleaned.chars().count() > MAX_TITLE_CHARS {
        let head: String = cleaned.chars().take(MAX_TITLE_CHARS - 3).collect();
        Some(format!("{}...", head))
    } else {
        Some(cleaned)
    }
}
