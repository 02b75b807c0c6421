//! Typed error hierarchy for the roadmap board.
//!
//! `BoardError` is the single taxonomy every board operation reports. The
//! API layer maps each variant onto an HTTP status; the database handle uses
//! [`BoardError::is_transient`] to decide whether a failed transaction is
//! worth retrying.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result alias used throughout the board subsystem.
pub type BoardResult<T> = std::result::Result<T, BoardError>;

/// Errors from board, sync and merge operations.
#[derive(Debug, Error)]
pub enum BoardError {
    /// Malformed input, invalid enum value, out-of-range position, self-merge,
    /// re-merging a duplicate source.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The operation would create a second representation of a request.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// SQLite reported lock contention (SQLITE_BUSY / SQLITE_LOCKED).
    #[error("Database is busy: {0}")]
    Busy(#[source] rusqlite::Error),

    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BoardError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Lock contention maps to `Busy`, everything else to `Database`.
/// Not a blanket `#[from]` so the classification stays in one place.
impl From<rusqlite::Error> for BoardError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Self::Busy(err),
            _ => Self::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn busy_and_locked_are_transient() {
        let busy: BoardError = sqlite_failure(rusqlite::ffi::SQLITE_BUSY).into();
        assert!(matches!(busy, BoardError::Busy(_)));
        assert!(busy.is_transient());

        let locked: BoardError = sqlite_failure(rusqlite::ffi::SQLITE_LOCKED).into();
        assert!(locked.is_transient());
    }

    #[test]
    fn other_sqlite_errors_are_not_transient() {
        let err: BoardError = sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).into();
        assert!(matches!(err, BoardError::Database(_)));
        assert!(!err.is_transient());

        let err: BoardError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, BoardError::Database(_)));
    }

    #[test]
    fn not_found_carries_entity_and_id() {
        let err = BoardError::not_found("Roadmap item", 7);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Roadmap item 7 not found");
    }

    #[test]
    fn business_errors_are_never_transient() {
        assert!(!BoardError::validation("bad").is_transient());
        assert!(!BoardError::Conflict("linked".into()).is_transient());
        assert!(!BoardError::Forbidden("member".into()).is_transient());
    }
}
