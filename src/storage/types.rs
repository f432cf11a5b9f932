use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the state database
    #[error("Another newsdeck process appears to be using the state database. Close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Whether an error message describes SQLite lock contention.
    pub(crate) fn is_lock_message(message: &str) -> bool {
        let message = message.to_lowercase();
        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        message.contains("database is locked")
            || message.contains("database table is locked")
            || message.contains("sqlite_busy")
            || message.contains("sqlite_locked")
            || message.contains("unable to open database file")
    }

    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if Self::is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_messages_detected() {
        assert!(DatabaseError::is_lock_message("error returned from database: database is locked"));
        assert!(DatabaseError::is_lock_message("SQLITE_BUSY"));
        assert!(!DatabaseError::is_lock_message("no such table: user_preferences"));
    }

    #[test]
    fn test_from_sqlx_maps_other_errors() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(matches!(err, DatabaseError::Other(_)));
    }
}
