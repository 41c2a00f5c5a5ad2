//! Configuration Module - TOML-based Monitor Configuration
//!
//! Loads and validates configuration from `config.toml`. Every source the
//! monitor queries is declared here as data: contract addresses, market
//! keys, GraphQL variables and decimal scaling. Credentials are never
//! stored; a source names the environment variable holding its key.

pub mod loader;

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::graphql::queries;
use crate::adapters::http::HttpClientConfig;
use crate::domain::report::SectionName;
use crate::domain::source::{
  ApiKeyRef, ContractCall, GraphQlQuery, OutputBinding, ResponseShape, RestQuery, ReturnKind, SourceKind,
  SourceQuery, SourceSpec,
};
use crate::usecases::orchestrator::RetryPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Identity and logging.
  pub app: AppSection,
  /// Fan-out timing and retry policy.
  #[serde(default)]
  pub orchestrator: OrchestratorConfig,
  /// Shared provider HTTP client.
  #[serde(default)]
  pub http: HttpConfig,
  /// Default JSON-RPC endpoint.
  pub chain: ChainConfig,
  /// Report-level parameters.
  pub report: ReportConfig,
  /// Long-running HTTP mode.
  #[serde(default)]
  pub serve: ServeConfig,
  /// Every queried source.
  #[serde(default)]
  pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
  /// Human-readable instance name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Orchestrator timing.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
  /// Timeout applied by each adapter to a single fetch.
  #[serde(default = "default_source_timeout_ms")]
  pub source_timeout_ms: u64,
  /// Wall-clock bound for the whole fan-out, retries included.
  #[serde(default = "default_global_deadline_ms")]
  pub global_deadline_ms: u64,
  /// Retries after the first attempt, transport failures only.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_retry_base_delay_ms")]
  pub retry_base_delay_ms: u64,
  #[serde(default = "default_retry_multiplier")]
  pub retry_multiplier: u32,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      source_timeout_ms: default_source_timeout_ms(),
      global_deadline_ms: default_global_deadline_ms(),
      max_retries: default_max_retries(),
      retry_base_delay_ms: default_retry_base_delay_ms(),
      retry_multiplier: default_retry_multiplier(),
    }
  }
}

impl OrchestratorConfig {
  pub const fn source_timeout(&self) -> Duration {
    Duration::from_millis(self.source_timeout_ms)
  }

  pub const fn global_deadline(&self) -> Duration {
    Duration::from_millis(self.global_deadline_ms)
  }

  pub const fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.max_retries,
      base_delay: Duration::from_millis(self.retry_base_delay_ms),
      multiplier: self.retry_multiplier,
    }
  }
}

/// Provider HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
  #[serde(default = "default_http_timeout_ms")]
  pub timeout_ms: u64,
  #[serde(default = "default_max_concurrent")]
  pub max_concurrent: usize,
  /// Per-host request rate.
  #[serde(default = "default_requests_per_second")]
  pub requests_per_second: u32,
  #[serde(default)]
  pub user_agent: Option<String>,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_ms: default_http_timeout_ms(),
      max_concurrent: default_max_concurrent(),
      requests_per_second: default_requests_per_second(),
      user_agent: None,
    }
  }
}

impl HttpConfig {
  pub fn client_config(&self) -> HttpClientConfig {
    let defaults = HttpClientConfig::default();
    HttpClientConfig {
      timeout: Duration::from_millis(self.timeout_ms),
      max_concurrent: self.max_concurrent,
      requests_per_second: self.requests_per_second,
      user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
  /// Default endpoint for on-chain sources.
  pub rpc_url: String,
  #[serde(default = "default_chain_id")]
  pub chain_id: u64,
  /// Check `eth_chainId` against `chain_id` at startup.
  #[serde(default)]
  pub verify_chain_id: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
  /// Entity whose supply is the ratio denominator (lvlUSD).
  pub base_token: String,
  /// Entity whose supply is the ratio numerator (slvlUSD).
  pub staked_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServeConfig {
  #[serde(default)]
  pub enabled: bool,
  #[serde(default = "default_bind_address")]
  pub bind_address: String,
  /// Seconds between cycles.
  #[serde(default = "default_refresh_interval")]
  pub refresh_interval_seconds: u64,
}

impl Default for ServeConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      bind_address: default_bind_address(),
      refresh_interval_seconds: default_refresh_interval(),
    }
  }
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
  pub id: String,
  pub kind: SourceKind,
  pub section: SectionName,
  pub entity: String,
  #[serde(default)]
  pub label: Option<String>,
  /// Defaults to `chain.rpc_url` for contract sources.
  #[serde(default)]
  pub endpoint: Option<String>,
  /// Environment variable holding the API key.
  #[serde(default)]
  pub api_key_env: Option<String>,
  /// Header the key is sent in.
  #[serde(default)]
  pub api_key_header: Option<String>,
  pub query: QueryConfig,
}

/// Tagged query table.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryConfig {
  Contract {
    address: String,
    signature: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default = "default_returns")]
    returns: ReturnKind,
    outputs: Vec<OutputBinding>,
  },
  #[serde(rename = "graphql")]
  GraphQl {
    shape: ResponseShape,
    /// Overrides the catalogue document for `shape`.
    #[serde(default)]
    document: Option<String>,
    #[serde(default)]
    variables: serde_json::Map<String, serde_json::Value>,
  },
  Rest {
    shape: ResponseShape,
    #[serde(default = "default_rest_decimals")]
    decimals: u32,
  },
}

impl SourceConfig {
  /// Build the immutable spec, resolving endpoint, document and key reference.
  pub fn to_spec(&self, chain: &ChainConfig) -> Result<SourceSpec> {
    let endpoint = match (&self.endpoint, &self.query) {
      (Some(endpoint), _) => endpoint.clone(),
      (None, QueryConfig::Contract { .. }) => chain.rpc_url.clone(),
      (None, _) => anyhow::bail!("source '{}' needs an endpoint", self.id),
    };

    let query = match &self.query {
      QueryConfig::Contract {
        address,
        signature,
        args,
        returns,
        outputs,
      } => SourceQuery::Contract(ContractCall {
        address: address.clone(),
        signature: signature.clone(),
        args: args.clone(),
        returns: *returns,
        outputs: outputs.clone(),
      }),
      QueryConfig::GraphQl {
        shape,
        document,
        variables,
      } => {
        let document = match document {
          Some(document) => document.clone(),
          None => queries::document_for(*shape)
            .with_context(|| format!("source '{}': no catalogue document for {shape:?}", self.id))?
            .to_string(),
        };
        SourceQuery::GraphQl(GraphQlQuery {
          shape: *shape,
          page_limits: queries::page_limits(&document),
          document,
          variables: variables.clone(),
          auth: self.api_key_env.as_ref().map(|env| ApiKeyRef {
            header: self.api_key_header.clone().unwrap_or_else(|| "x-api-key".to_string()),
            env: env.clone(),
          }),
        })
      }
      QueryConfig::Rest { shape, decimals } => SourceQuery::Rest(RestQuery {
        shape: *shape,
        decimals: *decimals,
      }),
    };

    // Hex keys are compared case-insensitively across providers.
    let entity = if self.entity.starts_with("0x") {
      self.entity.to_ascii_lowercase()
    } else {
      self.entity.clone()
    };

    Ok(SourceSpec {
      id: self.id.clone(),
      kind: self.kind,
      section: self.section,
      entity,
      label: self.label.clone(),
      endpoint,
      query,
    })
  }
}

impl AppConfig {
  /// Immutable source specs, in configuration order.
  pub fn source_specs(&self) -> Result<Vec<SourceSpec>> {
    self.sources.iter().map(|s| s.to_spec(&self.chain)).collect()
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

const fn default_source_timeout_ms() -> u64 {
  10_000
}

const fn default_global_deadline_ms() -> u64 {
  30_000
}

const fn default_max_retries() -> u32 {
  2
}

const fn default_retry_base_delay_ms() -> u64 {
  200
}

const fn default_retry_multiplier() -> u32 {
  4
}

const fn default_http_timeout_ms() -> u64 {
  10_000
}

const fn default_max_concurrent() -> usize {
  8
}

const fn default_requests_per_second() -> u32 {
  5
}

const fn default_chain_id() -> u64 {
  1
}

fn default_bind_address() -> String {
  "0.0.0.0:9090".to_string()
}

const fn default_refresh_interval() -> u64 {
  60
}

const fn default_returns() -> ReturnKind {
  ReturnKind::Uint256
}

const fn default_rest_decimals() -> u32 {
  18
}
