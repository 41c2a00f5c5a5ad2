//! GraphQL Source Adapter
//!
//! Serves both GraphQL source kinds (lending markets and portfolios). One
//! POST per fetch, bounded by a fixed timeout. API keys are resolved from
//! the environment at fetch time and sent in the configured header.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::domain::observation::{FetchError, Observation};
use crate::domain::source::{GraphQlQuery, ResponseShape, SourceQuery, SourceSpec};
use crate::ports::http_transport::{HttpRequest, HttpTransport};
use crate::ports::source_adapter::SourceAdapter;

use super::envelope::parse_envelope;

/// `SourceAdapter` for `GraphQlMarket` and `GraphQlPortfolio` sources.
pub struct GraphQlAdapter<T: HttpTransport> {
  transport: Arc<T>,
  timeout: Duration,
}

impl<T: HttpTransport> GraphQlAdapter<T> {
  pub const fn new(transport: Arc<T>, timeout: Duration) -> Self {
    Self { transport, timeout }
  }

  fn build_request(spec: &SourceSpec, query: &GraphQlQuery) -> Result<HttpRequest, FetchError> {
    let body = json!({
      "query": query.document,
      "variables": Value::Object(query.variables.clone()),
    });
    let mut request = HttpRequest::post_json(spec.endpoint.clone(), body);

    if let Some(auth) = &query.auth {
      let key = std::env::var(&auth.env)
        .map_err(|_| FetchError::Provider(format!("API key variable {} is not set", auth.env)))?;
      request = request.header(auth.header.clone(), key);
    }
    Ok(request)
  }

  async fn query(&self, spec: &SourceSpec) -> Result<Value, FetchError> {
    let SourceQuery::GraphQl(query) = &spec.query else {
      return Err(FetchError::Provider(format!("source {} is not a GraphQL query", spec.id)));
    };

    let request = Self::build_request(spec, query)?;
    let reply = tokio::time::timeout(self.timeout, self.transport.send(request))
      .await
      .map_err(|_| FetchError::Transport(format!("timed out after {:?}", self.timeout)))??;

    let data = parse_envelope(&reply)?;
    require_root(query.shape, &data)?;
    Ok(data)
  }
}

/// A lookup that resolved to `null` means the entity does not exist.
fn require_root(shape: ResponseShape, data: &Value) -> Result<(), FetchError> {
  let (field, what) = match shape {
    ResponseShape::MarketByKey => ("marketByUniqueKey", "market"),
    ResponseShape::VaultAllocation => ("vaultByAddress", "vault"),
    ResponseShape::Portfolio => ("portfolioV2", "portfolio"),
    ResponseShape::EulerVault => return Ok(()),
  };
  match data.get(field) {
    Some(Value::Null) | None => Err(FetchError::Provider(format!("{what} not found"))),
    Some(_) => Ok(()),
  }
}

#[async_trait]
impl<T: HttpTransport> SourceAdapter for GraphQlAdapter<T> {
  #[instrument(skip(self, spec), fields(source = %spec.id, kind = %spec.kind))]
  async fn fetch(&self, spec: &SourceSpec) -> Observation {
    match self.query(spec).await {
      Ok(data) => {
        debug!("GraphQL query succeeded");
        Observation::ok(spec.id.clone(), data)
      }
      Err(reason) => {
        warn!(error = %reason, "GraphQL query failed");
        Observation::failed(spec.id.clone(), reason)
      }
    }
    .at(Utc::now())
  }
}
