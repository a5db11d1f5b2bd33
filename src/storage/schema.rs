use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use super::types::{is_lock_message, DatabaseError};

// ============================================================================
// Database
// ============================================================================

/// Handle to the headline cache.
///
/// Cloning is cheap: every clone shares the pool, the writer lock and the
/// change counter, so a write through one clone wakes watchers on all of them.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
    /// SQLite is single-writer; every mutation of `headlines` holds this.
    pub(crate) write_lock: Arc<Mutex<()>>,
    /// Bumped after each committed write.
    pub(crate) changes: Arc<watch::Sender<u64>>,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory store shared by the pool.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database lock (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Migration` if the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Pre-create the file owner-only so cached bookmarks are never world-readable
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if db_path.parent().is_some_and(|p| p.as_os_str().is_empty() || p.exists()) {
                // If creation fails, SQLite reports the error at connect time.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let (changes, _) = watch::channel(0u64);
        let db = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            changes: Arc::new(changes),
        };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        tracing::debug!(path = %path, "Headline cache opened");
        Ok(db)
    }

    /// Create the schema inside one transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running against an
    /// existing database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS headlines (
                title TEXT PRIMARY KEY NOT NULL,
                published_at TEXT NOT NULL DEFAULT '',
                image_url TEXT,
                url TEXT,
                bookmarked INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Bookmarked list is filtered on the flag and sorted like the full list
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_headlines_bookmarked_published ON headlines(bookmarked, published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Wake every watch stream after a committed write.
    pub(crate) fn notify_changed(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }
}
