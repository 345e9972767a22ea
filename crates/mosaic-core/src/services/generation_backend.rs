use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Message, Part};
use crate::repositories::BoxFuture;

/// Failure modes of a generation request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("blocked by content policy: {0}")]
    ContentPolicy(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Per-request knobs passed through to the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub system_instruction: Option<String>,
}

/// Content returned for one model turn
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    pub parts: Vec<Part>,
}

impl GeneratedContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
        }
    }
}

/// The multimodal generative backend, consumed as a black box.
///
/// `history` always ends with the user turn being answered.
pub trait GenerationBackend: Send + Sync + 'static {
    fn generate(
        &self,
        history: Vec<Message>,
        options: GenerationOptions,
    ) -> BoxFuture<'static, Result<GeneratedContent, BackendError>>;

    /// Short name for logs
    fn name(&self) -> &str;
}
