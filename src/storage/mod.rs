//! Local headline cache backed by SQLite.
//!
//! One table, `headlines`, keyed by title and carrying the user's bookmark
//! flag. Every write bumps a shared change counter so that
//! [`Database::watch_headlines`] and [`Database::watch_bookmarked_headlines`]
//! can push fresh rows to their subscribers.

mod headlines;
mod schema;
mod types;

pub use schema::Database;
pub use types::{CachedArticle, DatabaseError, ParsedHeadline};
