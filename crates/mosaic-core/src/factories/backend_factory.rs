use std::sync::Arc;

use tracing::{info, warn};

use crate::models::Message;
use crate::repositories::BoxFuture;
use crate::services::{
    BackendError, EditTruncationEngine, GeminiBackend, GeneratedContent, GenerationBackend,
    GenerationOptions,
};
use crate::settings::EngineSettings;

/// Build the generation backend from settings.
///
/// Without an API key the returned backend fails every request with
/// `BackendError::Auth`, so commands that never generate still work.
pub fn create_backend(settings: &EngineSettings) -> Arc<dyn GenerationBackend> {
    let Some(api_key) = settings.resolved_api_key() else {
        warn!("No API key configured; generation requests will fail");
        return Arc::new(UnconfiguredBackend);
    };

    match GeminiBackend::new(&settings.api_base_url, &api_key, &settings.model) {
        Ok(backend) => {
            info!(model = %settings.model, "Gemini backend configured");
            Arc::new(backend)
        }
        Err(e) => {
            warn!(error = %e, "Failed to configure Gemini backend");
            Arc::new(UnconfiguredBackend)
        }
    }
}

/// Engine over `backend` with the generation options and history window from settings
pub fn create_engine(
    settings: &EngineSettings,
    backend: Arc<dyn GenerationBackend>,
) -> EditTruncationEngine {
    EditTruncationEngine::new(backend)
        .with_options(settings.generation_options())
        .with_history_window(settings.history_window)
}

struct UnconfiguredBackend;

impl GenerationBackend for UnconfiguredBackend {
    fn generate(
        &self,
        _history: Vec<Message>,
        _options: GenerationOptions,
    ) -> BoxFuture<'static, Result<GeneratedContent, BackendError>> {
        Box::pin(async {
            Err(BackendError::Auth(
                "no API key configured (set MOSAIC_API_KEY or GEMINI_API_KEY)".into(),
            ))
        })
    }

    fn name(&self) -> &str {
        "unconfigured"
    }
}
