//! Headline reader: fetches top headlines from a news API, caches them in
//! SQLite, and keeps per-article bookmarks across refreshes.
//!
//! - [`news`] - HTTP client for the `top-headlines` endpoint
//! - [`storage`] - SQLite cache with live watch streams
//! - [`repository`] - refresh orchestration and bookmark toggling
//! - [`viewmodel`] - thin adapter used by front ends
//! - [`config`] - optional TOML configuration

pub mod config;
pub mod news;
pub mod repository;
pub mod storage;
pub mod util;
pub mod viewmodel;

pub use repository::{HeadlineRepository, RefreshStatus};
pub use viewmodel::NewsViewModel;
