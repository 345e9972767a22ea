use std::io::ErrorKind;

use thiserror::Error;

#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum RepositoryError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Repository initialization failed: {message}")]
    InitializationError { message: String },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    #[error("Storage unavailable: {message}")]
    Unavailable { message: String },
}

/// SQLITE_READONLY, SQLITE_IOERR, SQLITE_FULL, SQLITE_CANTOPEN
const UNAVAILABLE_SQLITE_CODES: &[i32] = &[8, 10, 13, 14];

/// Classify a SQLite result code. Extended codes (e.g. 778 SQLITE_IOERR_WRITE)
/// carry the primary code in their low byte.
fn is_unavailable_sqlite_code(code: &str) -> bool {
    code.parse::<i32>()
        .is_ok_and(|code| UNAVAILABLE_SQLITE_CODES.contains(&(code & 0xff)))
}

impl RepositoryError {
    /// The store cannot take writes at all (full, read-only, gone), as
    /// opposed to one bad record.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::InitializationError { .. } => true,
            Self::IoError(e) => matches!(
                e.kind(),
                ErrorKind::StorageFull
                    | ErrorKind::ReadOnlyFilesystem
                    | ErrorKind::PermissionDenied
                    | ErrorKind::QuotaExceeded
            ),
            Self::DatabaseError(e) => match e {
                sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => true,
                sqlx::Error::Database(db) => {
                    db.code().is_some_and(|code| is_unavailable_sqlite_code(&code))
                }
                _ => false,
            },
            Self::SerializationError(_) | Self::InvalidData { .. } => false,
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
