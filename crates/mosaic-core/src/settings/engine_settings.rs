use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::services::GenerationOptions;
use crate::services::gemini_backend::DEFAULT_BASE_URL;

/// Environment variables checked, in order, for the backend API key
pub const API_KEY_ENV_VARS: [&str; 2] = ["MOSAIC_API_KEY", "GEMINI_API_KEY"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Sqlite,
    Json,
    Memory,
}

/// How much history accompanies a generation request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryWindow {
    /// Resend the entire log
    #[default]
    Full,
    /// Resend only the most recent messages, starting on a user turn
    LastMessages(usize),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub storage: StorageKind,
    pub data_dir: Option<PathBuf>,
    pub model: String,
    pub api_base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub system_instruction: Option<String>,
    pub history_window: HistoryWindow,
    pub notification_capacity: usize,
    pub log_level: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            storage: StorageKind::default(),
            data_dir: None,
            model: "gemini-2.0-flash".to_string(),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            temperature: None,
            max_output_tokens: None,
            system_instruction: None,
            history_window: HistoryWindow::default(),
            notification_capacity: 100,
            log_level: "info".to_string(),
        }
    }
}

impl EngineSettings {
    /// Configured data directory, or `<config_dir>/mosaic`
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::config_dir().map(|p| p.join("mosaic")))
    }

    /// API key from the environment, falling back to the settings file
    pub fn resolved_api_key(&self) -> Option<String> {
        API_KEY_ENV_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
            .or_else(|| self.api_key.clone())
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            system_instruction: self.system_instruction.clone(),
        }
    }
}
