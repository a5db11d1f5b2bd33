use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has the database locked
    #[error("Another instance of newsdesk appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Schema bootstrap failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// No cached headline carries the given title
    #[error("No cached headline titled {0:?}")]
    NotFound(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// "another instance" to the user.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Data Structures
// ============================================================================

/// A headline fresh from the network, before bookmark flags are carried over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeadline {
    pub title: String,
    pub published_at: String,
    pub image_url: Option<String>,
    pub url: Option<String>,
}

/// A headline as stored in the local cache.
///
/// `title` is the natural key: the table holds exactly one row per title.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CachedArticle {
    pub title: String,
    /// ISO-8601 timestamp as delivered by the API (empty when unknown)
    pub published_at: String,
    pub image_url: Option<String>,
    pub url: Option<String>,
    pub bookmarked: bool,
}

/// Which slice of the cache a query or watch stream covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeadlineScope {
    All,
    Bookmarked,
}
