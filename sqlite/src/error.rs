//! Error types for the SQLite structured store.
//!
//! Provides a unified error type covering database access, record
//! encoding, and naming validation failures.

use catalog_cache_core::StoreError;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur during structured store operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// A stored record or metadata row could not be encoded or decoded.
    #[error("record encoding error: {0}")]
    EncodingError(#[from] serde_json::Error),

    /// Table prefix contains invalid characters.
    #[error("invalid prefix '{0}': must contain only alphanumeric characters and underscores")]
    InvalidPrefix(String),

    /// Table name contains invalid characters.
    #[error("invalid table name '{0}': must contain only alphanumeric characters and underscores")]
    InvalidTableName(String),

    /// Every batch of a table write failed.
    #[error("write of table '{table}' failed: {reason}")]
    WriteFailed { table: String, reason: String },
}

impl SqliteError {
    /// `true` when the database reported that it ran out of space.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(
            self,
            SqliteError::DatabaseError(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::DiskFull
        )
    }

    /// `true` when the database was locked past the busy timeout.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SqliteError::DatabaseError(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }
}

impl From<SqliteError> for StoreError {
    fn from(err: SqliteError) -> Self {
        if err.is_quota_exceeded() {
            return StoreError::QuotaExceeded(err.to_string());
        }
        match err {
            SqliteError::EncodingError(e) => StoreError::Corrupt(e.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: std::ffi::c_int) -> SqliteError {
        SqliteError::DatabaseError(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn test_disk_full_maps_to_quota() {
        let err = failure(rusqlite::ffi::SQLITE_FULL);
        assert!(err.is_quota_exceeded());
        assert!(matches!(StoreError::from(err), StoreError::QuotaExceeded(_)));
    }

    #[test]
    fn test_busy_maps_to_unavailable() {
        let err = failure(rusqlite::ffi::SQLITE_BUSY);
        assert!(err.is_busy());
        assert!(matches!(StoreError::from(err), StoreError::Unavailable(_)));
    }

    #[test]
    fn test_encoding_maps_to_corrupt() {
        let json_err = serde_json::from_str::<u32>("x").unwrap_err();
        let err = SqliteError::from(json_err);
        assert!(matches!(StoreError::from(err), StoreError::Corrupt(_)));
    }
}
