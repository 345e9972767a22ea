use std::sync::Arc;

use tracing::{error, info};

use crate::models::Conversation;
use crate::repositories::{
    BoxFuture, ConversationJsonRepository, ConversationRepository, ConversationSqliteRepository,
    InMemoryConversationRepository, RepositoryError, RepositoryResult,
};
use crate::settings::{EngineSettings, StorageKind};

const SQLITE_FILE: &str = "conversations.db";
const JSON_DIR: &str = "conversations";

/// Build the conversation repository selected in settings.
///
/// A store that cannot be opened is returned as a repository whose
/// `initialize` reports it unavailable, so the controller degrades to memory
/// and tells the user instead of refusing to start.
pub async fn open_conversation_repository(
    settings: &EngineSettings,
) -> Arc<dyn ConversationRepository> {
    match try_open(settings).await {
        Ok(repository) => {
            info!(
                storage = ?settings.storage,
                path = %repository.storage_path(),
                "Conversation repository ready"
            );
            repository
        }
        Err(e) => {
            error!(
                storage = ?settings.storage,
                error = ?e,
                "Failed to open conversation repository"
            );
            Arc::new(UnopenedRepository {
                reason: e.to_string(),
            })
        }
    }
}

async fn try_open(settings: &EngineSettings) -> RepositoryResult<Arc<dyn ConversationRepository>> {
    if settings.storage == StorageKind::Memory {
        return Ok(Arc::new(InMemoryConversationRepository::new()));
    }

    let data_dir = settings
        .resolved_data_dir()
        .ok_or_else(|| RepositoryError::InitializationError {
            message: "Cannot determine data directory".into(),
        })?;

    match settings.storage {
        StorageKind::Sqlite => {
            let repository = ConversationSqliteRepository::open(&data_dir.join(SQLITE_FILE)).await?;
            Ok(Arc::new(repository))
        }
        StorageKind::Json => Ok(Arc::new(ConversationJsonRepository::new(data_dir.join(JSON_DIR)))),
        StorageKind::Memory => Ok(Arc::new(InMemoryConversationRepository::new())),
    }
}

/// Stand-in for a store that failed to open. Every operation is unavailable.
struct UnopenedRepository {
    reason: String,
}

impl UnopenedRepository {
    fn unavailable(&self) -> RepositoryError {
        RepositoryError::Unavailable {
            message: self.reason.clone(),
        }
    }
}

impl ConversationRepository for UnopenedRepository {
    fn initialize(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let err = self.unavailable();
        Box::pin(async move { Err(err) })
    }

    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<Conversation>>> {
        let err = self.unavailable();
        Box::pin(async move { Err(err) })
    }

    fn load_one(&self, _id: &str) -> BoxFuture<'static, RepositoryResult<Option<Conversation>>> {
        let err = self.unavailable();
        Box::pin(async move { Err(err) })
    }

    fn upsert(&self, _conversation: Conversation) -> BoxFuture<'static, RepositoryResult<()>> {
        let err = self.unavailable();
        Box::pin(async move { Err(err) })
    }

    fn delete(&self, _id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let err = self.unavailable();
        Box::pin(async move { Err(err) })
    }

    fn clear(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let err = self.unavailable();
        Box::pin(async move { Err(err) })
    }

    fn storage_path(&self) -> String {
        "unavailable".to_string()
    }
}
