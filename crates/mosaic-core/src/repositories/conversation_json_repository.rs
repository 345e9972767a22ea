use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::conversation_repository::{BoxFuture, ConversationRepository};
use super::error::{RepositoryError, RepositoryResult};
use crate::models::Conversation;

/// JSON file-based repository for conversations.
/// Stores each conversation as `<id>.json` inside one directory.
pub struct ConversationJsonRepository {
    conversations_dir: PathBuf,
}

impl ConversationJsonRepository {
    pub fn new(conversations_dir: PathBuf) -> Self {
        Self { conversations_dir }
    }

    fn conversation_path(dir: &Path, id: &str) -> RepositoryResult<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(RepositoryError::InvalidData {
                message: format!("conversation id {:?} is not a valid file name", id),
            });
        }
        Ok(dir.join(format!("{}.json", id)))
    }
}

impl ConversationRepository for ConversationJsonRepository {
    fn initialize(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations_dir = self.conversations_dir.clone();

        Box::pin(async move {
            tokio::fs::create_dir_all(&conversations_dir).await?;
            Ok(())
        })
    }

    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<Conversation>>> {
        let conversations_dir = self.conversations_dir.clone();

        Box::pin(async move {
            tokio::fs::create_dir_all(&conversations_dir).await?;

            let mut conversations = Vec::new();
            let mut entries = tokio::fs::read_dir(&conversations_dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("json") {
                    continue;
                }

                let bytes = match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = ?e,
                            "Skipping unreadable conversation file"
                        );
                        continue;
                    }
                };
                match serde_json::from_slice::<Conversation>(&bytes) {
                    Ok(conversation) => conversations.push(conversation),
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = ?e,
                            "Skipping undecodable conversation file"
                        );
                    }
                }
            }

            Ok(conversations)
        })
    }

    fn load_one(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<Conversation>>> {
        let path = Self::conversation_path(&self.conversations_dir, id);

        Box::pin(async move {
            let path = path?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn upsert(&self, conversation: Conversation) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = Self::conversation_path(&self.conversations_dir, &conversation.id);
        let conversations_dir = self.conversations_dir.clone();

        Box::pin(async move {
            let path = path?;
            tokio::fs::create_dir_all(&conversations_dir).await?;

            let json = serde_json::to_string_pretty(&conversation)?;

            // Write atomically: temp file, then rename over the record
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, json).await?;
            if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e.into());
            }

            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = Self::conversation_path(&self.conversations_dir, id);

        Box::pin(async move {
            let path = path?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn clear(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations_dir = self.conversations_dir.clone();

        Box::pin(async move {
            if !tokio::fs::try_exists(&conversations_dir).await? {
                return Ok(());
            }

            // Swap the whole directory out in one rename, then discard it
            let file_name = conversations_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("conversations");
            let discarded = conversations_dir.with_file_name(format!(
                "{}.cleared-{}",
                file_name,
                uuid::Uuid::new_v4()
            ));

            tokio::fs::rename(&conversations_dir, &discarded).await?;
            tokio::fs::create_dir_all(&conversations_dir).await?;
            if let Err(e) = tokio::fs::remove_dir_all(&discarded).await {
                warn!(
                    path = %discarded.display(),
                    error = ?e,
                    "Failed to remove cleared conversations"
                );
            }

            debug!(path = %conversations_dir.display(), "Cleared conversation directory");
            Ok(())
        })
    }

    fn storage_path(&self) -> String {
        self.conversations_dir.to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, Part};

    fn repo() -> (tempfile::TempDir, ConversationJsonRepository) {
        let tmp = tempfile::tempdir().unwrap();
        let repo = ConversationJsonRepository::new(tmp.path().join("conversations"));
        (tmp, repo)
    }

    #[tokio::test]
    async fn test_round_trip_with_image() {
        let (_tmp, repo) = repo();
        repo.initialize().await.unwrap();

        let conversation = Conversation::new(
            "conv-1",
            vec![
                Message::user(vec![Part::text("look"), Part::image("image/png", "iVBORw0KGgo=")]),
                Message::model_text("A small image."),
            ],
        );
        repo.upsert(conversation.clone()).await.unwrap();

        let all = repo.load_all().await.unwrap();
        assert_eq!(all, vec![conversation.clone()]);
        assert_eq!(repo.load_one("conv-1").await.unwrap(), Some(conversation));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (tmp, repo) = repo();
        repo.upsert(Conversation::new("conv-1", vec![Message::user_text("a")]))
            .await
            .unwrap();
        repo.upsert(Conversation::new("conv-1", vec![Message::user_text("b")]))
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path().join("conversations"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["conv-1.json".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok_and_clear_empties() {
        let (_tmp, repo) = repo();
        repo.delete("never-saved").await.unwrap();

        repo.upsert(Conversation::new("a", vec![Message::user_text("a")]))
            .await
            .unwrap();
        repo.upsert(Conversation::new("b", vec![Message::user_text("b")]))
            .await
            .unwrap();
        repo.clear().await.unwrap();

        assert!(repo.load_all().await.unwrap().is_empty());
        assert_eq!(repo.load_one("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_all_skips_bad_files() {
        let (tmp, repo) = repo();
        let good = Conversation::new("good", vec![Message::user_text("kept")]);
        repo.upsert(good.clone()).await.unwrap();

        let dir = tmp.path().join("conversations");
        std::fs::write(dir.join("binary.json"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(dir.join("truncated.json"), b"{\"id\": \"t\"").unwrap();
        std::fs::create_dir(dir.join("nested.json")).unwrap();

        assert_eq!(repo.load_all().await.unwrap(), vec![good]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let (_tmp, repo) = repo();
        let result = repo
            .upsert(Conversation::new("../escape", vec![Message::user_text("x")]))
            .await;
        assert!(matches!(result, Err(RepositoryError::InvalidData { .. })));
    }
}
