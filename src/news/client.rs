use crate::config::Config;
use crate::storage::ParsedHeadline;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from a headline fetch.
///
/// The `Display` text is the message the refresh stream hands to the user.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Non-2xx response without a readable error body
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The API answered with `"status": "error"`
    #[error("News API error ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    /// Body was not the expected JSON shape
    #[error("Invalid response: {0}")]
    Decode(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("No API key configured (set NEWS_API_KEY or api_key in config.toml)")]
    MissingApiKey,
}

// ============================================================================
// Wire Types
// ============================================================================

/// One article as returned by the News API.
///
/// Every field is nullable on the wire. Only a null title is rejected, since
/// the title is the cache key; any non-null title is kept verbatim.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteArticle {
    pub title: Option<String>,
    pub published_at: Option<String>,
    #[serde(rename = "urlToImage")]
    pub image_url: Option<String>,
    pub url: Option<String>,
}

impl RemoteArticle {
    fn into_parsed(self) -> Option<ParsedHeadline> {
        let title = self.title?;
        Some(ParsedHeadline {
            title,
            published_at: self.published_at.unwrap_or_default(),
            image_url: self.image_url,
            url: self.url,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeadlinesResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    total_results: u64,
    #[serde(default)]
    articles: Vec<RemoteArticle>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Client for the `top-headlines` endpoint.
pub struct NewsApi {
    client: reqwest::Client,
    base_url: Url,
    /// Checked at fetch time so offline commands work without a key
    api_key: Option<SecretString>,
    country: String,
    category: String,
    timeout: Duration,
}

impl std::fmt::Debug for NewsApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsApi")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("country", &self.country)
            .field("category", &self.category)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl NewsApi {
    /// Build a client against `base_url` (e.g. `https://newsapi.org/v2`).
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidBaseUrl`] if `base_url` does not parse
    /// - [`FetchError::InsecureBaseUrl`] for plain HTTP anywhere but localhost
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: SecretString,
    ) -> Result<Self, FetchError> {
        let base_url = validate_base_url(base_url)?;
        Ok(Self {
            client,
            base_url,
            api_key: Some(api_key),
            country: "id".to_string(),
            category: "science".to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Build a client from the loaded configuration.
    ///
    /// A missing API key is not an error here; [`NewsApi::fetch_headlines`]
    /// reports [`FetchError::MissingApiKey`] instead.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Result<Self, FetchError> {
        Self::from_parts(client, config, config.api_key())
    }

    fn from_parts(
        client: reqwest::Client,
        config: &Config,
        api_key: Option<SecretString>,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            client,
            base_url: validate_base_url(&config.base_url)?,
            api_key,
            country: config.country.clone(),
            category: config.category.clone(),
            timeout: config.request_timeout(),
        })
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = country.to_string();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> Url {
        let mut url = self.base_url.clone();
        // validate_base_url rejects cannot-be-a-base URLs, so this always succeeds
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("top-headlines");
        }
        url.query_pairs_mut()
            .append_pair("country", &self.country)
            .append_pair("category", &self.category);
        url
    }

    /// Fetch the current top headlines.
    ///
    /// One request, no retries. Articles whose title is null are skipped.
    ///
    /// # Errors
    ///
    /// - [`FetchError::MissingApiKey`] - No key configured; nothing is sent
    /// - [`FetchError::Network`] - Connection or TLS errors
    /// - [`FetchError::Timeout`] - Request plus body read exceeded the timeout
    /// - [`FetchError::Api`] - The API reported an error (bad key, rate limit, ...)
    /// - [`FetchError::HttpStatus`] - Non-2xx response without an error body
    /// - [`FetchError::Decode`] - Body was not the expected JSON
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded 10MB
    pub async fn fetch_headlines(&self) -> Result<Vec<ParsedHeadline>, FetchError> {
        let api_key = self.api_key.as_ref().ok_or(FetchError::MissingApiKey)?;
        tracing::debug!(
            country = %self.country,
            category = %self.category,
            "Fetching top headlines"
        );

        let (status, bytes) = tokio::time::timeout(self.timeout, self.send(api_key))
            .await
            .map_err(|_| FetchError::Timeout)??;

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &bytes));
        }

        let body: HeadlinesResponse =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;

        if body.status == "error" {
            return Err(FetchError::Api {
                status: status.as_u16(),
                code: body.code.unwrap_or_default(),
                message: body.message.unwrap_or_default(),
            });
        }

        let received = body.articles.len();
        let headlines: Vec<ParsedHeadline> = body
            .articles
            .into_iter()
            .filter_map(RemoteArticle::into_parsed)
            .collect();

        let skipped = received - headlines.len();
        if skipped > 0 {
            tracing::warn!(skipped, "Articles with a null title skipped");
        }
        tracing::info!(
            received,
            total_results = body.total_results,
            "Fetched top headlines"
        );

        Ok(headlines)
    }

    async fn send(
        &self,
        api_key: &SecretString,
    ) -> Result<(reqwest::StatusCode, Vec<u8>), FetchError> {
        let response = self
            .client
            .get(self.endpoint())
            .header("X-Api-Key", api_key.expose_secret())
            .send()
            .await?;
        let status = response.status();
        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        Ok((status, bytes))
    }
}

fn validate_base_url(base_url: &str) -> Result<Url, FetchError> {
    let url = Url::parse(base_url).map_err(|e| FetchError::InvalidBaseUrl(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(FetchError::InvalidBaseUrl(base_url.to_string()));
    }

    match url.scheme() {
        "https" => {}
        "http" => {
            // Allow HTTP only for localhost/127.0.0.1 so the key never crosses the network in clear
            let is_localhost = matches!(url.host_str(), Some("127.0.0.1") | Some("localhost"));
            if !is_localhost {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS base URL");
                return Err(FetchError::InsecureBaseUrl);
            }
            tracing::warn!(base_url = %base_url, "Using non-HTTPS news base URL (localhost only)");
        }
        other => return Err(FetchError::InvalidBaseUrl(format!("unsupported scheme {other}"))),
    }

    Ok(url)
}

fn error_from_body(status: u16, bytes: &[u8]) -> FetchError {
    match serde_json::from_slice::<ApiErrorBody>(bytes) {
        Ok(ApiErrorBody {
            code,
            message: Some(message),
        }) => FetchError::Api {
            status,
            code: code.unwrap_or_else(|| status.to_string()),
            message,
        },
        _ => FetchError::HttpStatus(status),
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
