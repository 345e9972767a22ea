use std::path::PathBuf;

use super::engine_settings::EngineSettings;
use crate::repositories::{BoxFuture, RepositoryError, RepositoryResult};

pub trait SettingsRepository: Send + Sync + 'static {
    /// Load settings from storage, or defaults on first run
    fn load(&self) -> BoxFuture<'static, RepositoryResult<EngineSettings>>;

    /// Save settings to storage
    fn save(&self, settings: EngineSettings) -> BoxFuture<'static, RepositoryResult<()>>;

    fn storage_path(&self) -> String;
}

pub struct SettingsJsonRepository {
    file_path: PathBuf,
}

impl SettingsJsonRepository {
    /// Create repository with XDG-compliant path
    pub fn new() -> RepositoryResult<Self> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepositoryError::InitializationError {
            message: "Cannot determine config directory".into(),
        })?;

        Ok(Self {
            file_path: config_dir.join("mosaic").join("settings.json"),
        })
    }

    /// Create repository with custom path (for testing)
    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl SettingsRepository for SettingsJsonRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<EngineSettings>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(EngineSettings::default());
                }
                Err(e) => return Err(e.into()),
            };

            Ok(serde_json::from_str(&contents)?)
        })
    }

    fn save(&self, settings: EngineSettings) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let json = serde_json::to_string_pretty(&settings)?;

            // Write atomically using temp file + rename
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, json).await?;
            tokio::fs::rename(&temp_path, &path).await?;

            Ok(())
        })
    }

    fn storage_path(&self) -> String {
        self.file_path.to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{HistoryWindow, StorageKind};

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = SettingsJsonRepository::with_path(tmp.path().join("settings.json"));

        assert_eq!(repo.load().await.unwrap(), EngineSettings::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("settings.json");
        let repo = SettingsJsonRepository::with_path(path);

        let settings = EngineSettings {
            storage: StorageKind::Memory,
            history_window: HistoryWindow::LastMessages(10),
            temperature: Some(0.5),
            ..EngineSettings::default()
        };
        repo.save(settings.clone()).await.unwrap();

        assert_eq!(repo.load().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let repo = SettingsJsonRepository::with_path(path);
        assert!(matches!(
            repo.load().await,
            Err(RepositoryError::SerializationError(_))
        ));
    }
}
