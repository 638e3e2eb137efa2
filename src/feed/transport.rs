use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Per-request timeout applied to every attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Fixed delay after a 5xx response before the next attempt.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Retry budget and timing for a single logical GET.
///
/// `retries` counts extra attempts: a budget of 3 allows up to 4 requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
    pub request_timeout: Duration,
}

impl RetryPolicy {
    pub const fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            backoff: DEFAULT_BACKOFF,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub const fn no_retry() -> Self {
        Self::with_retries(0)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

/// Why one attempt did not produce a usable body.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Network-level error (DNS, connection, TLS, per-request timeout)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// 5xx response, body kept for diagnosis
    #[error("Server error: status {status}: {body}")]
    ServerError { status: u16, body: String },
    /// Neither success nor an error class we handle explicitly
    #[error("Unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Every failed attempt of one call, in order.
#[derive(Debug, Default)]
pub struct AttemptLog(Vec<AttemptError>);

impl AttemptLog {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttemptError> {
        self.0.iter()
    }

    fn push(&mut self, err: AttemptError) {
        self.0.push(err);
    }
}

impl fmt::Display for AttemptLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed attempt(s)", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            write!(f, "; [{}] {}", i + 1, err)?;
        }
        Ok(())
    }
}

/// Errors returned by [`get_xml`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// 4xx response. Never retried; `attempts` holds the failures before it.
    #[error("Request to {url} rejected with status {status}: {body} (after {attempts})")]
    Rejected {
        url: String,
        status: u16,
        body: String,
        attempts: AttemptLog,
    },
    /// Retry budget spent without a usable response
    #[error("Giving up on {url}: {attempts}")]
    Exhausted { url: String, attempts: AttemptLog },
    /// Body arrived but is not the expected document
    #[error("Failed to decode response from {url}: {source}; body: {body}")]
    Decode {
        url: String,
        body: String,
        #[source]
        source: quick_xml::DeError,
        attempts: AttemptLog,
    },
    /// Run deadline passed before a usable response arrived
    #[error("Deadline exceeded fetching {url}: {attempts}")]
    DeadlineExceeded { url: String, attempts: AttemptLog },
}

impl TransportError {
    /// Number of requests that were actually sent before the call failed.
    pub fn attempts(&self) -> usize {
        match self {
            // The final request succeeded at the HTTP level on top of the logged failures
            TransportError::Rejected { attempts, .. } | TransportError::Decode { attempts, .. } => {
                attempts.len() + 1
            }
            TransportError::Exhausted { attempts, .. }
            | TransportError::DeadlineExceeded { attempts, .. } => attempts.len(),
        }
    }
}

/// Headers that make challenge-protected endpoints treat us like a browser.
pub(crate) fn bypass_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

/// GET `url` and decode the XML body into `T`.
///
/// Status handling per attempt:
/// - 5xx: sleep `policy.backoff`, then retry
/// - 4xx: fail immediately with [`TransportError::Rejected`]
/// - 2xx: decode, a decode failure is final and carries the raw body
/// - anything else, or a network error: retry without delay
///
/// No attempt is started after `deadline`, and each attempt's timeout is
/// capped by the time left until it.
pub async fn get_xml<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    policy: RetryPolicy,
    deadline: Instant,
) -> Result<T, TransportError> {
    let max_attempts = policy.retries as usize + 1;
    let mut attempts = AttemptLog::default();

    let bytes = loop {
        if attempts.len() >= max_attempts {
            return Err(TransportError::Exhausted {
                url: url.to_string(),
                attempts,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(TransportError::DeadlineExceeded {
                url: url.to_string(),
                attempts,
            });
        }
        let timeout = policy.request_timeout.min(deadline - now);

        let response = match client
            .get(url)
            .headers(bypass_headers())
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %url, attempt = attempts.len() + 1, error = %e, "Request failed");
                attempts.push(AttemptError::Network(e));
                continue;
            }
        };

        let status = response.status();

        if status.is_server_error() {
            let body = read_body_lossy(response).await;
            attempts.push(AttemptError::ServerError {
                status: status.as_u16(),
                body,
            });
            if attempts.len() < max_attempts {
                tracing::warn!(
                    url = %url,
                    status = %status,
                    retry = attempts.len(),
                    delay_ms = policy.backoff.as_millis() as u64,
                    "Server error, retrying after delay"
                );
                let left = deadline.saturating_duration_since(Instant::now());
                tokio::time::sleep(policy.backoff.min(left)).await;
            }
            continue;
        }

        if status.is_client_error() {
            let body = read_body_lossy(response).await;
            return Err(TransportError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
                body,
                attempts,
            });
        }

        if !status.is_success() {
            tracing::debug!(url = %url, status = %status, "Unexpected status, retrying");
            attempts.push(AttemptError::UnexpectedStatus(status.as_u16()));
            continue;
        }

        match read_limited_bytes(response, MAX_RESPONSE_SIZE).await {
            Ok(bytes) => break bytes,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Failed to read response body");
                attempts.push(e);
            }
        }
    };

    let body = String::from_utf8_lossy(&bytes);
    quick_xml::de::from_str(&body).map_err(|source| TransportError::Decode {
        url: url.to_string(),
        body: body.into_owned(),
        source,
        attempts,
    })
}

async fn read_body_lossy(response: reqwest::Response) -> String {
    match read_limited_bytes(response, MAX_RESPONSE_SIZE).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => format!("<unreadable body: {}>", e),
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, AttemptError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(AttemptError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(AttemptError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
