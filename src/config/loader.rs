//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::scaling::MAX_DECIMALS;
use crate::domain::source::{ReturnKind, SourceQuery};

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
  let path = path.as_ref();

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content).with_context(|| format!("Invalid config: {}", path.display()))?;

  info!(
    name = %config.app.name,
    sources = config.sources.len(),
    deadline_ms = config.orchestrator.global_deadline_ms,
    serve = config.serve.enabled,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Positive timeouts, deadline no shorter than a single fetch
/// - Usable HTTP pacing
/// - Unique, non-empty source ids
/// - Source kind agreeing with its query type
/// - Decimal counts within `Decimal` precision
pub fn validate_config(config: &AppConfig) -> Result<()> {
  let orchestrator = &config.orchestrator;
  anyhow::ensure!(
    orchestrator.source_timeout_ms > 0,
    "source_timeout_ms must be positive"
  );
  anyhow::ensure!(
    orchestrator.global_deadline_ms >= orchestrator.source_timeout_ms,
    "global_deadline_ms ({}) must be >= source_timeout_ms ({})",
    orchestrator.global_deadline_ms,
    orchestrator.source_timeout_ms
  );
  anyhow::ensure!(
    orchestrator.retry_multiplier >= 1,
    "retry_multiplier must be at least 1"
  );

  anyhow::ensure!(config.http.timeout_ms > 0, "http.timeout_ms must be positive");
  anyhow::ensure!(
    config.http.max_concurrent > 0,
    "http.max_concurrent must be positive"
  );
  anyhow::ensure!(
    config.http.requests_per_second > 0,
    "http.requests_per_second must be positive"
  );

  anyhow::ensure!(!config.chain.rpc_url.is_empty(), "chain.rpc_url must not be empty");
  anyhow::ensure!(
    !config.report.base_token.is_empty() && !config.report.staked_token.is_empty(),
    "report.base_token and report.staked_token must be set"
  );
  if config.serve.enabled {
    anyhow::ensure!(
      config.serve.refresh_interval_seconds > 0,
      "serve.refresh_interval_seconds must be positive"
    );
  }

  let mut ids = HashSet::new();
  for source in &config.sources {
    anyhow::ensure!(!source.id.trim().is_empty(), "Source ids must not be empty");
    anyhow::ensure!(ids.insert(source.id.as_str()), "Duplicate source id '{}'", source.id);
    anyhow::ensure!(
      !source.entity.is_empty(),
      "Source '{}' has an empty entity",
      source.id
    );

    let spec = source.to_spec(&config.chain)?;
    anyhow::ensure!(
      spec.kind == spec.query.kind(),
      "Source '{}' is declared {} but its query is served by {}",
      spec.id,
      spec.kind,
      spec.query.kind()
    );

    match &spec.query {
      SourceQuery::Contract(call) => {
        anyhow::ensure!(
          !call.outputs.is_empty(),
          "Source '{}' binds no outputs",
          spec.id
        );
        anyhow::ensure!(
          call.returns == ReturnKind::Uint256Array || call.outputs.len() == 1,
          "Source '{}' returns one uint256 but binds {} outputs",
          spec.id,
          call.outputs.len()
        );
        for output in &call.outputs {
          anyhow::ensure!(
            output.decimals <= MAX_DECIMALS,
            "Source '{}' output '{}' has {} decimals (max {MAX_DECIMALS})",
            spec.id,
            output.metric,
            output.decimals
          );
        }
      }
      SourceQuery::Rest(query) => {
        anyhow::ensure!(
          query.decimals <= MAX_DECIMALS,
          "Source '{}' has {} decimals (max {MAX_DECIMALS})",
          spec.id,
          query.decimals
        );
      }
      SourceQuery::GraphQl(_) => {}
    }
  }

  Ok(())
}
