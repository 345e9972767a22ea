use std::path::Path;

use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use tracing::{info, warn};

use super::conversation_repository::{BoxFuture, ConversationRepository};
use super::error::RepositoryResult;
use crate::models::Conversation;

/// Migrations applied in order. Each entry is (version, sql).
/// To add a new migration: append a tuple with the next version number and its SQL.
/// Never edit or remove existing entries; existing databases depend on them.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS conversations (
        id                     TEXT    PRIMARY KEY,
        title                  TEXT    NOT NULL DEFAULT '',
        messages               TEXT    NOT NULL DEFAULT '[]',
        created                INTEGER NOT NULL DEFAULT 0,
        last_updated           INTEGER NOT NULL DEFAULT 0,
        favorite               INTEGER NOT NULL DEFAULT 0,
        pinned                 INTEGER NOT NULL DEFAULT 0,
        needs_title_generation INTEGER NOT NULL DEFAULT 1
    );
    CREATE INDEX IF NOT EXISTS idx_conversations_last_updated
        ON conversations (last_updated DESC);",
)];

const SELECT_ALL: &str = "SELECT id, title, messages, created, last_updated, favorite, pinned,
        needs_title_generation
 FROM conversations";

const SELECT_ONE: &str = "SELECT id, title, messages, created, last_updated, favorite, pinned,
        needs_title_generation
 FROM conversations
 WHERE id = ?";

/// SQLite-backed repository for conversations.
///
/// One table keyed by conversation id; messages (with base64 image payloads)
/// are stored as a JSON column. `SqlitePool` is internally reference-counted
/// and cheap to clone.
#[derive(Clone)]
pub struct ConversationSqliteRepository {
    pool: SqlitePool,
    location: String,
}

impl ConversationSqliteRepository {
    /// Open (or create) the database file. Call `initialize` before use.
    pub async fn open(db_path: &Path) -> RepositoryResult<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!(path = %db_path.display(), "Opened SQLite conversation database");

        Ok(Self {
            pool,
            location: db_path.display().to_string(),
        })
    }

    /// Create the schema_version table if absent, then apply any pending migrations.
    async fn run_migrations(pool: &SqlitePool) -> RepositoryResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        // Seed version 0 if the table is empty (fresh database).
        sqlx::query(
            "INSERT INTO schema_version (version) \
             SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version)",
        )
        .execute(pool)
        .await?;

        let current: i64 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                info!(version, "Applying schema migration");
                let mut tx = pool.begin().await?;
                // sqlx doesn't support multiple statements in a single query call,
                // so split on ';' and execute each statement individually.
                for statement in sql.split(';') {
                    let trimmed = statement.trim();
                    if !trimmed.is_empty() {
                        sqlx::query(trimmed).execute(&mut *tx).await?;
                    }
                }
                sqlx::query("UPDATE schema_version SET version = ?")
                    .bind(version)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
        }

        Ok(())
    }

    fn row_to_conversation(row: &SqliteRow) -> RepositoryResult<Conversation> {
        let messages: String = row.try_get("messages")?;
        Ok(Conversation {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            messages: serde_json::from_str(&messages)?,
            created: row.try_get("created")?,
            last_updated: row.try_get("last_updated")?,
            favorite: row.try_get("favorite")?,
            pinned: row.try_get("pinned")?,
            needs_title_generation: row.try_get("needs_title_generation")?,
        })
    }
}

impl ConversationRepository for ConversationSqliteRepository {
    fn initialize(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move { Self::run_migrations(&pool).await })
    }

    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<Conversation>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let rows = sqlx::query(SELECT_ALL).fetch_all(&pool).await?;

            let mut conversations = Vec::with_capacity(rows.len());
            for row in &rows {
                match Self::row_to_conversation(row) {
                    Ok(conversation) => conversations.push(conversation),
                    Err(e) => {
                        let id: Option<String> = row.try_get("id").ok();
                        warn!(conv_id = ?id, error = ?e, "Skipping unreadable conversation row");
                    }
                }
            }

            Ok(conversations)
        })
    }

    fn load_one(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<Conversation>>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        Box::pin(async move {
            let row = sqlx::query(SELECT_ONE)
                .bind(&id)
                .fetch_optional(&pool)
                .await?;

            row.as_ref().map(Self::row_to_conversation).transpose()
        })
    }

    fn upsert(&self, conversation: Conversation) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let messages = serde_json::to_string(&conversation.messages)?;

            let mut tx = pool.begin().await?;
            sqlx::query(
                "INSERT INTO conversations
                    (id, title, messages, created, last_updated, favorite, pinned,
                     needs_title_generation)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    title                  = excluded.title,
                    messages               = excluded.messages,
                    created                = excluded.created,
                    last_updated           = excluded.last_updated,
                    favorite               = excluded.favorite,
                    pinned                 = excluded.pinned,
                    needs_title_generation = excluded.needs_title_generation",
            )
            .bind(&conversation.id)
            .bind(&conversation.title)
            .bind(&messages)
            .bind(conversation.created)
            .bind(conversation.last_updated)
            .bind(conversation.favorite)
            .bind(conversation.pinned)
            .bind(conversation.needs_title_generation)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        Box::pin(async move {
            sqlx::query("DELETE FROM conversations WHERE id = ?")
                .bind(&id)
                .execute(&pool)
                .await?;
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let mut tx = pool.begin().await?;
            sqlx::query("DELETE FROM conversations")
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        })
    }

    fn storage_path(&self) -> String {
        self.location.clone()
    }
}
