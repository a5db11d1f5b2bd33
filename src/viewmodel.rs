//! Presentation adapter over [`HeadlineRepository`].
//!
//! Holds no state of its own; every call is forwarded unchanged so a front
//! end (the CLI here) never touches storage or the network directly.

use futures::Stream;

use crate::repository::{HeadlineRepository, RefreshStatus};
use crate::storage::{CachedArticle, DatabaseError};

#[derive(Clone)]
pub struct NewsViewModel {
    repository: HeadlineRepository,
}

impl NewsViewModel {
    pub fn new(repository: HeadlineRepository) -> Self {
        Self { repository }
    }

    /// Refresh headlines; see [`HeadlineRepository::headlines`].
    pub fn headline_news(&self) -> impl Stream<Item = RefreshStatus> + Send + 'static {
        self.repository.headlines()
    }

    pub fn cached_news(
        &self,
    ) -> impl Stream<Item = Result<Vec<CachedArticle>, DatabaseError>> + Send + 'static {
        self.repository.cached_headlines()
    }

    pub fn bookmarked_news(
        &self,
    ) -> impl Stream<Item = Result<Vec<CachedArticle>, DatabaseError>> + Send + 'static {
        self.repository.bookmarked_headlines()
    }

    /// Bookmark `news`.
    pub async fn save_news(&self, news: &CachedArticle) -> Result<(), DatabaseError> {
        self.repository.set_bookmark(news, true).await
    }

    /// Remove the bookmark from `news`.
    pub async fn delete_news(&self, news: &CachedArticle) -> Result<(), DatabaseError> {
        self.repository.set_bookmark(news, false).await
    }
}
