pub mod engine_settings;
pub mod settings_repository;

pub use engine_settings::{API_KEY_ENV_VARS, EngineSettings, HistoryWindow, StorageKind};
pub use settings_repository::{SettingsJsonRepository, SettingsRepository};
