use std::time::Duration;

use reqwest::{StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::generation_backend::{
    BackendError, GeneratedContent, GenerationBackend, GenerationOptions,
};
use crate::models::{Message, Part, Role};
use crate::repositories::BoxFuture;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<WireBlob>,
    #[serde(default, skip_serializing)]
    thought: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<WireContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl From<&Part> for WirePart {
    fn from(part: &Part) -> Self {
        match part {
            Part::Text(text) => WirePart {
                text: Some(text.clone()),
                ..Default::default()
            },
            Part::InlineImage { mime_type, data } => WirePart {
                inline_data: Some(WireBlob {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                }),
                ..Default::default()
            },
        }
    }
}

impl From<&Message> for WireContent {
    fn from(message: &Message) -> Self {
        WireContent {
            role: Some(message.role),
            parts: message.parts.iter().map(WirePart::from).collect(),
        }
    }
}

fn build_request(history: &[Message], options: &GenerationOptions) -> GenerateContentRequest {
    let generation_config = (options.temperature.is_some() || options.max_output_tokens.is_some())
        .then(|| GenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
        });

    let system_instruction = options
        .system_instruction
        .as_ref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| WireContent {
            role: None,
            parts: vec![WirePart {
                text: Some(s.clone()),
                ..Default::default()
            }],
        });

    GenerateContentRequest {
        contents: history.iter().map(WireContent::from).collect(),
        system_instruction,
        generation_config,
    }
}

fn parse_response(body: &str) -> Result<GeneratedContent, BackendError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::MalformedResponse(format!("invalid response body: {}", e)))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(BackendError::ContentPolicy(format!("prompt blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::MalformedResponse("response has no candidates".into()))?;

    let parts: Vec<Part> = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| p.thought != Some(true))
        .filter_map(|p| match (p.text, p.inline_data) {
            (Some(text), _) => Some(Part::Text(text)),
            (None, Some(blob)) => Some(Part::InlineImage {
                mime_type: blob.mime_type,
                data: blob.data,
            }),
            (None, None) => None,
        })
        .collect();

    if parts.is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII")) => {
                Err(BackendError::ContentPolicy(format!("reply blocked: {}", reason)))
            }
            _ => Err(BackendError::MalformedResponse("candidate has no content".into())),
        };
    }

    Ok(GeneratedContent { parts })
}

fn map_status(status: StatusCode, body: &str) -> BackendError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| status.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => BackendError::Network(format!("rate limited: {}", detail)),
        s if s.is_server_error() => BackendError::Network(detail),
        // an invalid key is reported as 400 INVALID_ARGUMENT
        StatusCode::BAD_REQUEST if detail.to_lowercase().contains("api key") => {
            BackendError::Auth(detail)
        }
        _ => BackendError::MalformedResponse(format!("request rejected ({}): {}", status, detail)),
    }
}

/// `generateContent` client for the Gemini REST API
#[derive(Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, BackendError> {
        let mut headers = header::HeaderMap::new();
        let key = header::HeaderValue::from_str(api_key)
            .map_err(|_| BackendError::Auth("API key contains invalid characters".into()))?;
        headers.insert("x-goog-api-key", key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl GenerationBackend for GeminiBackend {
    fn generate(
        &self,
        history: Vec<Message>,
        options: GenerationOptions,
    ) -> BoxFuture<'static, Result<GeneratedContent, BackendError>> {
        let client = self.client.clone();
        let url = self.endpoint();
        let model = self.model.clone();

        Box::pin(async move {
            let request = build_request(&history, &options);
            debug!(
                model = %model,
                turns = request.contents.len(),
                "Sending generateContent request"
            );

            let response = client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| BackendError::Network(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| BackendError::Network(e.to_string()))?;

            if !status.is_success() {
                let err = map_status(status, &body);
                warn!(model = %model, status = %status, error = %err, "Gemini request failed");
                return Err(err);
            }

            parse_response(&body)
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
