//! Headline repository: network fetch merged into the local cache.
//!
//! A refresh fetches the top headlines, replaces the cache with them while
//! keeping each title's bookmark flag, then reads the cache back. Callers see
//! this as a [`RefreshStatus`] stream: `Loading` first, then exactly one of
//! `Success` or `Error`.

use std::sync::Arc;

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::Mutex;

use crate::news::NewsApi;
use crate::storage::{CachedArticle, Database, DatabaseError, ParsedHeadline};

/// Progress of one headline refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    Loading,
    /// Full cache contents read back after the write
    Success(Vec<CachedArticle>),
    /// Human-readable failure message
    Error(String),
}

impl RefreshStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RefreshStatus::Loading)
    }
}

/// Handle shared by every consumer of the headline cache.
///
/// Construct one per database and clone it into callers; clones share the
/// refresh lock, so refreshes through any clone never interleave.
#[derive(Clone)]
pub struct HeadlineRepository {
    db: Database,
    api: Arc<NewsApi>,
    refresh_lock: Arc<Mutex<()>>,
}

impl HeadlineRepository {
    pub fn new(db: Database, api: NewsApi) -> Self {
        Self {
            db,
            api: Arc::new(api),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Refresh as a stream: `Loading`, then the terminal status, then end.
    ///
    /// Nothing happens until the stream is polled.
    pub fn headlines(&self) -> impl Stream<Item = RefreshStatus> + Send + 'static {
        let repo = self.clone();
        stream::once(future::ready(RefreshStatus::Loading))
            .chain(stream::once(async move { repo.refresh().await }))
    }

    /// Run one refresh and return its terminal status.
    ///
    /// On fetch failure the cache is not touched. A storage failure after a
    /// successful fetch is reported the same way, with the database error's
    /// message.
    pub async fn refresh(&self) -> RefreshStatus {
        let _guard = self.refresh_lock.lock().await;

        let fetched = match self.api.fetch_headlines().await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(error = %e, "Headline refresh failed, cache left untouched");
                return RefreshStatus::Error(e.to_string());
            }
        };

        match self.store(fetched).await {
            Ok(rows) => RefreshStatus::Success(rows),
            Err(e) => {
                tracing::error!(error = %e, "Failed to store fetched headlines");
                RefreshStatus::Error(e.to_string())
            }
        }
    }

    async fn store(
        &self,
        fetched: Vec<ParsedHeadline>,
    ) -> Result<Vec<CachedArticle>, DatabaseError> {
        let cached = self.db.replace_headlines(fetched).await?;
        // Read back rather than returning what was written: a toggle that
        // commits after the replace must show up here.
        let rows = self.db.get_headlines().await?;
        tracing::info!(
            cached,
            bookmarked = rows.iter().filter(|r| r.bookmarked).count(),
            "Headline refresh complete"
        );
        Ok(rows)
    }

    /// Live view of every cached headline.
    pub fn cached_headlines(
        &self,
    ) -> impl Stream<Item = Result<Vec<CachedArticle>, DatabaseError>> + Send + 'static {
        self.db.watch_headlines()
    }

    /// Live view of the bookmarked headlines.
    pub fn bookmarked_headlines(
        &self,
    ) -> impl Stream<Item = Result<Vec<CachedArticle>, DatabaseError>> + Send + 'static {
        self.db.watch_bookmarked_headlines()
    }

    /// Set or clear the bookmark on `article`'s cached row.
    ///
    /// # Errors
    ///
    /// `DatabaseError::NotFound` if the title is no longer cached (for
    /// example, a refresh dropped it).
    pub async fn set_bookmark(
        &self,
        article: &CachedArticle,
        bookmarked: bool,
    ) -> Result<(), DatabaseError> {
        self.db.set_bookmarked(&article.title, bookmarked).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body(titles: &[&str]) -> String {
        let articles: Vec<_> = titles
            .iter()
            .enumerate()
            .map(|(i, title)| {
                serde_json::json!({
                    "title": title,
                    "publishedAt": format!("2024-03-{:02}T00:00:00Z", i + 1),
                    "urlToImage": null,
                    "url": format!("https://example.com/{}", i),
                })
            })
            .collect();
        serde_json::json!({
            "status": "ok",
            "totalResults": articles.len(),
            "articles": articles,
        })
        .to_string()
    }

    fn parsed(title: &str) -> ParsedHeadline {
        ParsedHeadline {
            title: title.to_string(),
            published_at: "2024-01-01T00:00:00Z".to_string(),
            image_url: None,
            url: None,
        }
    }

    async fn repo_with(server: &MockServer, db: Database) -> HeadlineRepository {
        let api = NewsApi::new(
            reqwest::Client::new(),
            &server.uri(),
            SecretString::from("test-key".to_string()),
        )
        .unwrap();
        HeadlineRepository::new(db, api)
    }

    /// File-backed store, so concurrent connections see real SQLite locking.
    async fn file_db(name: &str) -> (Database, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "newsdesk_repo_{}_{}.db",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        (db, path)
    }

    fn titles(rows: &[CachedArticle]) -> Vec<&str> {
        let mut titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
        titles.sort_unstable();
        titles
    }

    #[tokio::test]
    async fn test_stream_is_loading_then_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body(&["A", "B"])))
            .mount(&mock_server)
            .await;

        let repo = repo_with(&mock_server, Database::open(":memory:").await.unwrap()).await;
        let statuses: Vec<RefreshStatus> = repo.headlines().collect().await;

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], RefreshStatus::Loading);
        match &statuses[1] {
            RefreshStatus::Success(rows) => assert_eq!(titles(rows), vec!["A", "B"]),
            other => panic!("Expected Success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body(&["A"])))
            .expect(0)
            .mount(&mock_server)
            .await;

        let repo = repo_with(&mock_server, Database::open(":memory:").await.unwrap()).await;
        let stream = repo.headlines();
        drop(stream);
    }

    #[tokio::test]
    async fn test_stream_is_loading_then_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string(
                r#"{"status":"error","code":"rateLimited","message":"You have made too many requests."}"#,
            ))
            .mount(&mock_server)
            .await;

        let repo = repo_with(&mock_server, Database::open(":memory:").await.unwrap()).await;
        let statuses: Vec<RefreshStatus> = repo.headlines().collect().await;

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], RefreshStatus::Loading);
        match &statuses[1] {
            RefreshStatus::Error(message) => {
                assert!(message.contains("You have made too many requests."))
            }
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_reads_back_from_storage() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body(&["A", "A", "B"])))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let repo = repo_with(&mock_server, db.clone()).await;

        match repo.refresh().await {
            RefreshStatus::Success(rows) => {
                assert_eq!(rows, db.get_headlines().await.unwrap());
                assert_eq!(titles(&rows), vec!["A", "B"]);
            }
            other => panic!("Expected Success, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_toggle_during_fetch_is_reflected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body(&["A", "B"]))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&mock_server)
            .await;

        let (db, path) = file_db("toggle").await;
        db.replace_headlines(vec![parsed("A")]).await.unwrap();
        let repo = repo_with(&mock_server, db.clone()).await;

        let refresh = tokio::spawn({
            let repo = repo.clone();
            async move { repo.refresh().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let a = db.get_headlines().await.unwrap().remove(0);
        repo.set_bookmark(&a, true).await.unwrap();

        match refresh.await.unwrap() {
            RefreshStatus::Success(rows) => {
                let a = rows.iter().find(|r| r.title == "A").unwrap();
                let b = rows.iter().find(|r| r.title == "B").unwrap();
                assert!(a.bookmarked, "toggle made during the fetch must survive");
                assert!(!b.bookmarked);
            }
            other => panic!("Expected Success, got {:?}", other),
        }

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_refreshes_never_expose_empty_table() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body(&["A", "B", "C"]))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(2)
            .mount(&mock_server)
            .await;

        let (db, path) = file_db("concurrent").await;
        db.replace_headlines(vec![parsed("Old")]).await.unwrap();
        let repo = repo_with(&mock_server, db.clone()).await;

        let first = tokio::spawn({
            let repo = repo.clone();
            async move { repo.refresh().await }
        });
        let second = tokio::spawn({
            let repo = repo.clone();
            async move { repo.refresh().await }
        });

        while !(first.is_finished() && second.is_finished()) {
            let rows = db.get_headlines().await.unwrap();
            assert!(!rows.is_empty(), "readers must never see an empty cache");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        for handle in [first, second] {
            match handle.await.unwrap() {
                RefreshStatus::Success(rows) => assert_eq!(titles(&rows), vec!["A", "B", "C"]),
                other => panic!("Expected Success, got {:?}", other),
            }
        }

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_bookmarked_stream_follows_toggles() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body(&["A", "B"])))
            .mount(&mock_server)
            .await;

        let repo = repo_with(&mock_server, Database::open(":memory:").await.unwrap()).await;
        let mut bookmarked = Box::pin(repo.bookmarked_headlines());
        assert!(bookmarked.next().await.unwrap().unwrap().is_empty());

        let rows = match repo.refresh().await {
            RefreshStatus::Success(rows) => rows,
            other => panic!("Expected Success, got {:?}", other),
        };
        // The refresh itself is a write; nothing is bookmarked yet
        assert!(bookmarked.next().await.unwrap().unwrap().is_empty());

        let b = rows.iter().find(|r| r.title == "B").unwrap();
        repo.set_bookmark(b, true).await.unwrap();
        let current = bookmarked.next().await.unwrap().unwrap();
        assert_eq!(titles(&current), vec!["B"]);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RefreshStatus::Loading.is_terminal());
        assert!(RefreshStatus::Success(Vec::new()).is_terminal());
        assert!(RefreshStatus::Error("boom".into()).is_terminal());
    }
}
