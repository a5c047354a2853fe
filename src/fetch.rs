//! HTTP access to one target site.
//!
//! A [`Fetcher`] owns a cookie-retaining client bound to a single origin, so a
//! world selection made by one request persists for the next. Every request is
//! paced: a random gap drawn from the configured range must elapse since the
//! previous request to the same origin before the next one is sent.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};
use reqwest::{redirect, Client, StatusCode, Url};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::FetchConfig;

/// Uniform transport failure surfaced to tasks.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("too many redirects from {url}")]
    Redirect { url: String },
    #[error("invalid url '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },
}

impl FetchError {
    /// Everything except a malformed URL may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidUrl { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FetchError::Status {
                status: 404,
                ..
            }
        )
    }

    fn from_reqwest(url: &Url, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if err.is_redirect() {
            FetchError::Redirect { url }
        } else {
            FetchError::Network { url, source: err }
        }
    }
}

/// A fetched document.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: Url,
    pub body: String,
}

pub struct Fetcher {
    client: Client,
    base: Url,
    delay_min: Duration,
    delay_max: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| anyhow::anyhow!("Invalid base_url '{}': {}", config.base_url, e))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .redirect(redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base,
            delay_min: Duration::from_millis(config.delay_min_ms),
            delay_max: Duration::from_millis(config.delay_max_ms.max(config.delay_min_ms)),
            last_request: Mutex::new(None),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve a path, absolute URL or relative href against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base.join(path).map_err(|e| FetchError::InvalidUrl {
            input: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Like [`endpoint`](Self::endpoint), appending `query` pairs URL-encoded.
    pub fn endpoint_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, FetchError> {
        let mut url = self.endpoint(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    pub async fn get(&self, url: Url) -> Result<Page, FetchError> {
        self.pace().await;
        debug!(method = "GET", url = %url, "Fetching");
        let result = self.client.get(url.clone()).send().await;
        Self::read(url, result).await
    }

    /// POST an `application/x-www-form-urlencoded` body.
    pub async fn post_form(&self, url: Url, form: &[(String, String)]) -> Result<Page, FetchError> {
        self.pace().await;
        debug!(method = "POST", url = %url, fields = form.len(), "Fetching");
        let result = self.client.post(url.clone()).form(form).send().await;
        Self::read(url, result).await
    }

    async fn read(
        url: Url,
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<Page, FetchError> {
        let resp = result.map_err(|e| FetchError::from_reqwest(&url, e))?;
        let status = resp.status();
        if !is_accepted(status) {
            return Err(FetchError::Status {
                url: resp.url().to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = resp.url().clone();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))?;
        debug!(url = %final_url, status = status.as_u16(), bytes = body.len(), "Fetched");
        Ok(Page {
            url: final_url,
            body,
        })
    }

    /// Wait until a freshly drawn random gap has passed since the previous
    /// request, then stamp this request's start.
    pub(crate) async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let gap = jitter(self.delay_min, self.delay_max);
            let elapsed = prev.elapsed();
            if elapsed < gap {
                tokio::time::sleep(gap - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn is_accepted(status: StatusCode) -> bool {
    status.is_success() || status.is_redirection()
}

/// Uniform random duration in `[min, max]` at millisecond granularity.
fn jitter(min: Duration, max: Duration) -> Duration {
    let lo = min.as_millis() as u64;
    let hi = max.as_millis() as u64;
    if hi <= lo {
        return min;
    }
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}
