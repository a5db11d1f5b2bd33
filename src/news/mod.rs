//! Remote headline source.
//!
//! Wraps the News API `top-headlines` endpoint: one GET per refresh, the API
//! key in the `X-Api-Key` header, and a JSON body of articles that is turned
//! into [`ParsedHeadline`](crate::storage::ParsedHeadline) values for the
//! cache.

mod client;

pub use client::{FetchError, NewsApi, RemoteArticle};
