use std::collections::HashSet;

use futures::stream::{self, Stream};
use sqlx::{QueryBuilder, SqliteConnection};

use super::schema::Database;
use super::types::{CachedArticle, DatabaseError, HeadlineScope, ParsedHeadline};

/// 5 columns * 50 rows = 250 bound parameters, well under SQLite's 999 limit.
const BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Headline Queries
    // ========================================================================

    /// Every cached headline, newest first.
    pub async fn get_headlines(&self) -> Result<Vec<CachedArticle>, DatabaseError> {
        self.query_scope(HeadlineScope::All).await
    }

    /// Bookmarked headlines only, newest first.
    pub async fn get_bookmarked_headlines(&self) -> Result<Vec<CachedArticle>, DatabaseError> {
        self.query_scope(HeadlineScope::Bookmarked).await
    }

    /// One-shot read of `scope`, in display order.
    pub(crate) async fn query_scope(
        &self,
        scope: HeadlineScope,
    ) -> Result<Vec<CachedArticle>, DatabaseError> {
        let sql = match scope {
            HeadlineScope::All => {
                r#"
                SELECT title, published_at, image_url, url, bookmarked
                FROM headlines
                ORDER BY published_at DESC, title
            "#
            }
            HeadlineScope::Bookmarked => {
                r#"
                SELECT title, published_at, image_url, url, bookmarked
                FROM headlines
                WHERE bookmarked = 1
                ORDER BY published_at DESC, title
            "#
            }
        };

        let rows = sqlx::query_as::<_, CachedArticle>(sql)
            .fetch_all(&self.pool)
            .await?;
        tracing::trace!(?scope, rows = rows.len(), "Queried headlines");
        Ok(rows)
    }

    /// Whether a row with this title is cached.
    pub async fn headline_exists(&self, title: &str) -> Result<bool, DatabaseError> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM headlines WHERE title = ?)")
            .bind(title)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Whether a row with this title is cached and bookmarked.
    ///
    /// Unknown titles read as not bookmarked.
    pub async fn is_bookmarked(&self, title: &str) -> Result<bool, DatabaseError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM headlines WHERE title = ? AND bookmarked = 1)",
        )
        .bind(title)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    // ========================================================================
    // Watch Streams
    // ========================================================================

    /// Stream of the full headline list: the current rows, then the rows
    /// again after every committed write.
    ///
    /// The stream never ends on its own; drop it to unsubscribe.
    pub fn watch_headlines(
        &self,
    ) -> impl Stream<Item = Result<Vec<CachedArticle>, DatabaseError>> + Send + 'static {
        self.watch_scope(HeadlineScope::All)
    }

    /// Same as [`Database::watch_headlines`], restricted to bookmarked rows.
    pub fn watch_bookmarked_headlines(
        &self,
    ) -> impl Stream<Item = Result<Vec<CachedArticle>, DatabaseError>> + Send + 'static {
        self.watch_scope(HeadlineScope::Bookmarked)
    }

    fn watch_scope(
        &self,
        scope: HeadlineScope,
    ) -> impl Stream<Item = Result<Vec<CachedArticle>, DatabaseError>> + Send + 'static {
        // A fresh receiver has already seen the current version, so the first
        // emission comes from the initial query and later ones from changed().
        let rx = self.changes.subscribe();
        let db = self.clone();

        stream::unfold((db, rx, true), move |(db, mut rx, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let rows = db.query_scope(scope).await;
            Some((rows, (db, rx, false)))
        })
    }

    // ========================================================================
    // Headline Mutations
    // ========================================================================

    /// Insert rows as given. Titles already cached are left untouched.
    ///
    /// Returns the number of rows actually inserted.
    pub async fn insert_headlines(&self, rows: &[CachedArticle]) -> Result<u64, DatabaseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let inserted = {
            let _guard = self.write_lock.lock().await;
            let mut conn = self.pool.acquire().await?;
            insert_rows(&mut conn, rows).await?
        };
        if inserted > 0 {
            self.notify_changed();
        }
        Ok(inserted)
    }

    /// Remove every cached headline, bookmarks included.
    pub async fn delete_all_headlines(&self) -> Result<u64, DatabaseError> {
        let removed = {
            let _guard = self.write_lock.lock().await;
            let mut conn = self.pool.acquire().await?;
            delete_rows(&mut conn).await?
        };
        if removed > 0 {
            self.notify_changed();
        }
        Ok(removed)
    }

    /// Set the bookmark flag on the row with this title.
    ///
    /// # Errors
    ///
    /// `DatabaseError::NotFound` when no row carries the title; nothing is
    /// written in that case.
    pub async fn set_bookmarked(&self, title: &str, bookmarked: bool) -> Result<(), DatabaseError> {
        let result = {
            let _guard = self.write_lock.lock().await;
            sqlx::query("UPDATE headlines SET bookmarked = ? WHERE title = ?")
                .bind(bookmarked)
                .bind(title)
                .execute(&self.pool)
                .await?
        };

        // SQLite counts matched rows, so an unchanged flag still reports 1
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(title.to_string()));
        }

        tracing::debug!(title = %title, bookmarked, "Bookmark flag updated");
        self.notify_changed();
        Ok(())
    }

    /// Replace the whole cache with `fetched`, keeping bookmark flags.
    ///
    /// Bookmark lookup, delete-all and insert-all run in one transaction under
    /// the writer lock. A concurrent [`Database::set_bookmarked`] therefore
    /// lands either before the lookup (and is carried forward) or after the
    /// commit. Readers never observe the table empty mid-replace.
    ///
    /// Returns the number of rows now cached.
    pub async fn replace_headlines(
        &self,
        fetched: Vec<ParsedHeadline>,
    ) -> Result<usize, DatabaseError> {
        let count = {
            let _guard = self.write_lock.lock().await;
            let mut tx = self.pool.begin().await?;

            let bookmarked = bookmarked_titles(&mut tx).await?;
            let rows = carry_bookmarks(fetched, &bookmarked);

            let removed = delete_rows(&mut tx).await?;
            let inserted = insert_rows(&mut tx, &rows).await?;
            tx.commit().await?;

            tracing::debug!(
                removed,
                inserted,
                carried = rows.iter().filter(|r| r.bookmarked).count(),
                "Headline cache replaced"
            );
            rows.len()
        };

        self.notify_changed();
        Ok(count)
    }
}

// ============================================================================
// Connection-level helpers (shared by the pool methods and the transaction)
// ============================================================================

async fn bookmarked_titles(conn: &mut SqliteConnection) -> Result<HashSet<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT title FROM headlines WHERE bookmarked = 1")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(|(title,)| title).collect())
}

async fn delete_rows(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM headlines")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn insert_rows(conn: &mut SqliteConnection, rows: &[CachedArticle]) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;

    for chunk in rows.chunks(BATCH_SIZE) {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "INSERT INTO headlines (title, published_at, image_url, url, bookmarked) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.title)
                .push_bind(&row.published_at)
                .push_bind(&row.image_url)
                .push_bind(&row.url)
                .push_bind(row.bookmarked);
        });
        builder.push(" ON CONFLICT(title) DO NOTHING");

        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }

    Ok(inserted)
}

/// Attach the cached bookmark flag to each fetched headline.
///
/// The first occurrence of a title wins; later duplicates are dropped so the
/// one-row-per-title invariant holds.
pub(crate) fn carry_bookmarks(
    fetched: Vec<ParsedHeadline>,
    bookmarked: &HashSet<String>,
) -> Vec<CachedArticle> {
    let mut seen = HashSet::with_capacity(fetched.len());

    fetched
        .into_iter()
        .filter_map(|headline| {
            if !seen.insert(headline.title.clone()) {
                tracing::debug!(title = %headline.title, "Dropping duplicate headline");
                return None;
            }
            let is_bookmarked = bookmarked.contains(&headline.title);
            Some(CachedArticle {
                title: headline.title,
                published_at: headline.published_at,
                image_url: headline.image_url,
                url: headline.url,
                bookmarked: is_bookmarked,
            })
        })
        .collect()
}
