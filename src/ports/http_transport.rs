//! HTTP Transport Port - Request/Reply Exchange
//!
//! GraphQL and REST adapters build requests as plain data and hand them to
//! a transport. Status interpretation stays with the adapters, so a
//! transport only reports failures that prevented any reply at all.

use async_trait::async_trait;

use crate::domain::observation::FetchError;

/// HTTP method subset the adapters need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
  Get,
  Post,
}

/// Outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
  pub method: HttpMethod,
  pub url: String,
  /// Extra headers (name, value). Secret values are never logged.
  pub headers: Vec<(String, String)>,
  /// JSON body for POST requests.
  pub body: Option<serde_json::Value>,
}

impl HttpRequest {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: HttpMethod::Get,
      url: url.into(),
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
    Self {
      method: HttpMethod::Post,
      url: url.into(),
      headers: Vec::new(),
      body: Some(body),
    }
  }

  #[must_use]
  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
  pub status: u16,
  pub body: String,
}

/// Sends HTTP requests.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
  /// Perform one exchange. Connection failures and client-side timeouts
  /// are `FetchError::Transport`; any received status is a reply.
  async fn send(&self, request: HttpRequest) -> Result<HttpReply, FetchError>;
}
