//! Subscription download over HTTP(S).

use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Proxy, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

/// Fetches the raw payload behind one subscription URL.
#[async_trait]
pub trait Fetch: Send + Sync {
  async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub fn default_user_agent() -> &'static str {
  "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
  pub timeout: Duration,
  /// Extra attempts after the first one.
  pub retries: u32,
  pub user_agent: String,
  /// Optional upstream HTTP proxy for all requests.
  pub proxy: Option<String>,
  pub backoff_base: Duration,
}

impl Default for FetchOptions {
  fn default() -> Self {
    FetchOptions {
      timeout: Duration::from_secs(30),
      retries: 3,
      user_agent: default_user_agent().to_string(),
      proxy: None,
      backoff_base: Duration::from_millis(500),
    }
  }
}

pub struct HttpFetcher {
  client: Client,
  opts: FetchOptions,
}

impl HttpFetcher {
  pub fn new(opts: FetchOptions) -> Result<Self, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(
      ACCEPT,
      HeaderValue::from_static("application/x-yaml, application/yaml, text/yaml, */*"),
    );
    let mut builder = Client::builder()
      .user_agent(opts.user_agent.as_str())
      .default_headers(headers)
      .redirect(reqwest::redirect::Policy::limited(10))
      .timeout(opts.timeout.max(Duration::from_secs(1)));
    if let Some(p) = &opts.proxy {
      builder = builder.proxy(Proxy::all(p.as_str())?);
    }
    Ok(HttpFetcher {
      client: builder.build()?,
      opts,
    })
  }

  async fn attempt(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
    let resp = self.client.get(url.clone()).send().await?;
    let status = resp.status();
    if !status.is_success() {
      return Err(FetchError::Status(status.as_u16()));
    }
    Ok(resp.bytes().await?.to_vec())
  }

  fn backoff(&self, attempt: u32) -> Duration {
    let base = self.opts.backoff_base.as_millis() as u64;
    let exp = base.saturating_mul(1u64 << attempt.min(6));
    Duration::from_millis(exp + rand_jitter_ms(base))
  }
}

fn rand_jitter_ms(max_jitter: u64) -> u64 {
  if max_jitter == 0 {
    0
  } else {
    fastrand::u64(0..max_jitter)
  }
}

/// Only absolute `http`/`https` URLs with a host are fetched.
pub fn validate_url(raw: &str) -> Result<Url, FetchError> {
  let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
  if !matches!(url.scheme(), "http" | "https") || url.host_str().map_or(true, str::is_empty) {
    return Err(FetchError::InvalidUrl(raw.to_string()));
  }
  Ok(url)
}

fn is_retryable(err: &FetchError) -> bool {
  match err {
    FetchError::Status(code) => matches!(
      StatusCode::from_u16(*code),
      Ok(StatusCode::TOO_MANY_REQUESTS
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT)
    ),
    FetchError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
    FetchError::InvalidUrl(_) | FetchError::Timeout(_) => false,
  }
}

#[async_trait]
impl Fetch for HttpFetcher {
  async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    let url = validate_url(url)?;
    let mut attempt = 0;
    loop {
      match self.attempt(&url).await {
        Ok(body) => {
          debug!(url = %url, bytes = body.len(), attempt, "fetched");
          return Ok(body);
        }
        Err(e) if attempt < self.opts.retries && is_retryable(&e) => {
          let wait = self.backoff(attempt);
          warn!(url = %url, error = %e, retry_in_ms = wait.as_millis() as u64, "fetch failed, retrying");
          sleep(wait).await;
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }
}
