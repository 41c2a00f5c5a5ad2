//! Report Server - Liveness, Readiness, Report and Metrics
//!
//! Exposes the latest `EcosystemReport` over axum 0.7 in serve mode.
//! Readiness flips once the first report has been published; `/report`
//! returns it as JSON and `/metrics` the Prometheus exposition.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, instrument};

use crate::domain::report::EcosystemReport;

use super::prometheus::MetricsRegistry;

/// Latest published report, `None` until the first cycle completes.
pub type ReportFeed = watch::Receiver<Option<Arc<EcosystemReport>>>;

/// State shared by all handlers.
#[derive(Clone)]
pub struct ServerState {
    /// Latest report.
    pub reports: ReportFeed,
    /// Prometheus registry for `/metrics`.
    pub metrics: Arc<MetricsRegistry>,
}

impl ServerState {
    pub fn is_ready(&self) -> bool {
        self.reports.borrow().is_some()
    }
}

/// Axum-based report server.
pub struct ReportServer {
    state: ServerState,
    bind_address: String,
}

impl ReportServer {
    pub const fn new(state: ServerState, bind_address: String) -> Self {
        Self {
            state,
            bind_address,
        }
    }

    /// Route table, exposed for in-process tests.
    pub fn router(state: ServerState) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/report", get(Self::report))
            .route("/metrics", get(Self::metrics))
            .with_state(state)
    }

    /// Serve until the shutdown signal fires.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Self::router(self.state);
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;

        info!(address = %self.bind_address, "Report server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 once a report exists.
    async fn readiness(State(state): State<ServerState>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }

    async fn report(State(state): State<ServerState>) -> Response {
        let latest = state.reports.borrow().clone();
        match latest {
            Some(report) => Json(report.as_ref().clone()).into_response(),
            None => (StatusCode::SERVICE_UNAVAILABLE, "no report yet").into_response(),
        }
    }

    async fn metrics(State(state): State<ServerState>) -> Response {
        match state.metrics.render() {
            Ok(text) => text.into_response(),
            Err(e) => {
                error!(error = %e, "Failed to encode metrics");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::domain::report::{SectionResult, SourceTally};

    fn empty_report() -> EcosystemReport {
        fn failed<T>() -> SectionResult<T> {
            SectionResult::Failed {
                reason: "no sources configured".into(),
            }
        }
        EcosystemReport {
            cycle_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            sources: SourceTally::default(),
            supply_info: failed(),
            collateral_composition: failed(),
            lending_situation: failed(),
            pool_balances: failed(),
            market_snapshots: failed(),
        }
    }

    #[tokio::test]
    async fn test_ready_after_first_report() {
        let (tx, rx) = watch::channel(None);
        let state = ServerState {
            reports: rx,
            metrics: Arc::new(MetricsRegistry::new().unwrap()),
        };

        let before = ReportServer::readiness(State(state.clone())).await.into_response();
        assert_eq!(before.status(), StatusCode::SERVICE_UNAVAILABLE);
        let report = ReportServer::report(State(state.clone())).await;
        assert_eq!(report.status(), StatusCode::SERVICE_UNAVAILABLE);

        tx.send(Some(Arc::new(empty_report()))).unwrap();

        let after = ReportServer::readiness(State(state.clone())).await.into_response();
        assert_eq!(after.status(), StatusCode::OK);
        let report = ReportServer::report(State(state)).await;
        assert_eq!(report.status(), StatusCode::OK);
    }
}
