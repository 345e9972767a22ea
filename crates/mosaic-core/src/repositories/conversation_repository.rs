use std::future::Future;
use std::pin::Pin;

use super::error::RepositoryResult;
use crate::models::Conversation;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable key/value store of conversations keyed by id.
///
/// Every write touches exactly one record (or, for `clear`, all records in one
/// step); implementations must never expose a half-written or emptied store
/// while a write is in progress.
pub trait ConversationRepository: Send + Sync + 'static {
    /// Create the backing table/directory if absent. Idempotent.
    fn initialize(&self) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Load every conversation. Order is unspecified; callers sort.
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<Conversation>>>;

    /// Load a single conversation by id
    fn load_one(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<Conversation>>>;

    /// Insert or fully replace the record with the same id
    fn upsert(&self, conversation: Conversation) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Delete a conversation; deleting a missing id is not an error
    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Delete every conversation
    fn clear(&self) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Human-readable location, for logs and diagnostics
    fn storage_path(&self) -> String;
}
