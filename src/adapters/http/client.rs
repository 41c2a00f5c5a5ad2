//! Provider HTTP Client - Paced reqwest Transport
//!
//! Wraps reqwest with a request timeout, a concurrency cap and per-host
//! request pacing for every off-chain provider (GraphQL and REST). It
//! performs exactly one exchange per call: retries belong to the
//! orchestrator, status interpretation to the adapters.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Url};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::domain::observation::FetchError;
use crate::ports::http_transport::{HttpMethod, HttpReply, HttpRequest, HttpTransport};

/// Configuration for the provider HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
  /// Per-request timeout enforced by reqwest.
  pub timeout: Duration,
  /// Maximum concurrent in-flight requests.
  pub max_concurrent: usize,
  /// Requests per second allowed against any single host.
  pub requests_per_second: u32,
  /// User-Agent header value.
  pub user_agent: String,
}

impl Default for HttpClientConfig {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(10),
      max_concurrent: 8,
      requests_per_second: 5,
      user_agent: concat!("lvlusd-monitor/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

/// reqwest-backed `HttpTransport`.
pub struct ReqwestTransport {
  /// Underlying HTTP client.
  http: Client,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
  /// Pacing keyed by host.
  pacer: DefaultKeyedRateLimiter<String>,
}

impl ReqwestTransport {
  /// Create a new transport.
  pub fn new(config: &HttpClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(5)
      .user_agent(config.user_agent.clone())
      .build()
      .context("Failed to build HTTP client")?;

    let per_second = NonZeroU32::new(config.requests_per_second)
      .context("requests_per_second must be positive")?;

    Ok(Self {
      http,
      semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
      pacer: RateLimiter::keyed(Quota::per_second(per_second)),
    })
  }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpReply, FetchError> {
    let url = Url::parse(&request.url)
      .map_err(|e| FetchError::Provider(format!("invalid URL {}: {e}", request.url)))?;
    let host = url.host_str().unwrap_or_default().to_string();

    self.pacer.until_key_ready(&host).await;
    let _permit = self
      .semaphore
      .acquire()
      .await
      .map_err(|_| FetchError::Transport("HTTP client shut down".into()))?;

    let mut builder = match request.method {
      HttpMethod::Get => self.http.get(url),
      HttpMethod::Post => self.http.post(url),
    };
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await.map_err(|e| {
      warn!(host = %host, error = %e, "Request failed");
      if e.is_builder() {
        FetchError::Provider(e.to_string())
      } else {
        FetchError::Transport(e.to_string())
      }
    })?;

    let status = response.status().as_u16();
    let body = response
      .text()
      .await
      .map_err(|e| FetchError::Transport(format!("reading body: {e}")))?;

    debug!(host = %host, status, bytes = body.len(), "Response received");
    Ok(HttpReply { status, body })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zero_rate_rejected() {
    let config = HttpClientConfig {
      requests_per_second: 0,
      ..HttpClientConfig::default()
    };
    assert!(ReqwestTransport::new(&config).is_err());
  }

  #[tokio::test]
  async fn test_invalid_url_is_provider_error() {
    let transport = ReqwestTransport::new(&HttpClientConfig::default()).unwrap();
    let err = transport.send(HttpRequest::get("not a url")).await.unwrap_err();
    assert!(matches!(err, FetchError::Provider(_)));
  }
}
