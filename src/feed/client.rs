use std::time::Duration;
use tokio::time::Instant;

use super::model::{NewsArticle, NewsArticleInformation, NewsItem, NewsList};
use super::transport::{get_xml, RetryPolicy, TransportError, DEFAULT_BACKOFF, DEFAULT_REQUEST_TIMEOUT};

/// Retry budget for the list feed. Detail fetches are never retried.
pub const LIST_RETRIES: u32 = 3;

/// Reader for the two club news endpoints.
///
/// Cheap to clone: `reqwest::Client` is reference counted internally.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    base_url: String,
    backoff: Duration,
    request_timeout: Duration,
}

impl FeedClient {
    /// Build a client with its own connection pool.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Wrap an existing client (tests pass a plain `reqwest::Client::new()`).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            backoff: DEFAULT_BACKOFF,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn list_url(&self, count: u32) -> String {
        format!("{}/getnewlistinformation?count={}", self.base_url, count)
    }

    pub fn detail_url(&self, external_id: i64) -> String {
        format!("{}/getnewsarticleinformation?id={}", self.base_url, external_id)
    }

    fn policy(&self, retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            backoff: self.backoff,
            request_timeout: self.request_timeout,
        }
    }

    /// Fetch the newest `count` article summaries.
    pub async fn fetch_list(
        &self,
        count: u32,
        deadline: Instant,
    ) -> Result<Vec<NewsItem>, TransportError> {
        let url = self.list_url(count);
        let list: NewsList = get_xml(&self.client, &url, self.policy(LIST_RETRIES), deadline).await?;

        let (items, malformed): (Vec<NewsItem>, Vec<NewsItem>) = list
            .items
            .entries
            .into_iter()
            .partition(NewsItem::has_valid_id);
        if !malformed.is_empty() {
            tracing::warn!(
                url = %url,
                skipped = malformed.len(),
                "Skipping list entries without a usable NewsArticleID"
            );
        }
        tracing::debug!(
            url = %url,
            club = %list.club_name,
            items = items.len(),
            "Fetched news list"
        );
        Ok(items)
    }

    /// Fetch the full article for one external id, single attempt.
    pub async fn fetch_detail(
        &self,
        external_id: i64,
        deadline: Instant,
    ) -> Result<NewsArticle, TransportError> {
        let url = self.detail_url(external_id);
        let info: NewsArticleInformation =
            get_xml(&self.client, &url, self.policy(0), deadline).await?;
        Ok(info.article)
    }
}
