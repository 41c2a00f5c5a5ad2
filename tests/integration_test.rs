//! Integration Tests - End-to-end Aggregation Testing
//!
//! Drives the orchestrator, normalizer and assembler through the public
//! API with mocked transports and hand-written fake adapters. Timing
//! scenarios run on a paused tokio clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::*;
use rust_decimal_macros::dec;
use serde_json::{Value, json};

use lvlusd_monitor::adapters::chain::OnChainAdapter;
use lvlusd_monitor::adapters::graphql::GraphQlAdapter;
use lvlusd_monitor::adapters::registry::AdapterRegistry;
use lvlusd_monitor::domain::metric::Figure;
use lvlusd_monitor::domain::observation::{FetchError, Observation};
use lvlusd_monitor::domain::report::SectionName;
use lvlusd_monitor::domain::source::{
    ContractCall, GraphQlQuery, OutputBinding, ResponseShape, RestQuery, ReturnKind, SourceKind, SourceQuery,
    SourceSpec, Unit,
};
use lvlusd_monitor::ports::{ChainReader, HttpReply, HttpRequest, HttpTransport, NoopTelemetry, SourceAdapter};
use lvlusd_monitor::usecases::{Aggregator, Orchestrator, ReportLayout, RetryPolicy};

// ---- Mock Definitions ----

mock! {
    pub Transport {}

    #[async_trait]
    impl HttpTransport for Transport {
        async fn send(&self, request: HttpRequest) -> Result<HttpReply, FetchError>;
    }
}

mock! {
    pub Reader {}

    #[async_trait]
    impl ChainReader for Reader {
        async fn call(&self, endpoint: &str, to: &str, calldata: Vec<u8>) -> Result<Vec<u8>, FetchError>;
    }
}

// ---- Fake Adapters ----

/// Serves market payloads by entity; entities listed in `stalled` never answer.
struct FakeMarkets {
    stalled: Vec<String>,
}

#[async_trait]
impl SourceAdapter for FakeMarkets {
    async fn fetch(&self, spec: &SourceSpec) -> Observation {
        if self.stalled.contains(&spec.entity) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Observation::ok(spec.id.clone(), market_payload(&spec.entity))
    }
}

/// Fails with a transport error until the configured attempt.
struct Flaky {
    calls: AtomicU32,
    succeed_on: u32,
}

#[async_trait]
impl SourceAdapter for Flaky {
    async fn fetch(&self, spec: &SourceSpec) -> Observation {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call < self.succeed_on {
            Observation::failed(spec.id.clone(), FetchError::Transport("connection reset".into()))
        } else {
            Observation::ok(spec.id.clone(), market_payload(&spec.entity))
        }
    }
}

/// Panics for one source id, answers for every other.
struct Explosive {
    victim: String,
}

#[async_trait]
impl SourceAdapter for Explosive {
    async fn fetch(&self, spec: &SourceSpec) -> Observation {
        assert_ne!(spec.id, self.victim, "adapter blew up");
        Observation::ok(spec.id.clone(), market_payload(&spec.entity))
    }
}

/// HTTP transport that never answers within any sane timeout.
#[derive(Default)]
struct StalledTransport {
    sends: AtomicU32,
}

#[async_trait]
impl HttpTransport for StalledTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpReply, FetchError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(FetchError::Transport("unreachable".into()))
    }
}

/// Chain reader that never answers within any sane timeout.
#[derive(Default)]
struct StalledReader {
    calls: AtomicU32,
}

#[async_trait]
impl ChainReader for StalledReader {
    async fn call(&self, _endpoint: &str, _to: &str, _calldata: Vec<u8>) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(FetchError::Transport("unreachable".into()))
    }
}

// ---- Helpers ----

fn market_spec(id: &str, key: &str) -> SourceSpec {
    SourceSpec {
        id: id.into(),
        kind: SourceKind::GraphQlMarket,
        section: SectionName::LendingSituation,
        entity: key.into(),
        label: None,
        endpoint: "https://api.example.invalid/graphql".into(),
        query: SourceQuery::GraphQl(GraphQlQuery {
            shape: ResponseShape::MarketByKey,
            document: "query { marketByUniqueKey { uniqueKey } }".into(),
            variables: serde_json::Map::new(),
            auth: None,
            page_limits: vec![],
        }),
    }
}

fn supply_spec(id: &str, token: &str, address: &str) -> SourceSpec {
    SourceSpec {
        id: id.into(),
        kind: SourceKind::OnChainContract,
        section: SectionName::SupplyInfo,
        entity: token.into(),
        label: Some(token.into()),
        endpoint: "http://localhost:8545".into(),
        query: SourceQuery::Contract(ContractCall {
            address: address.into(),
            signature: "totalSupply()".into(),
            args: vec![],
            returns: ReturnKind::Uint256,
            outputs: vec![OutputBinding {
                metric: "total_supply".into(),
                decimals: 18,
                unit: Unit::Token,
            }],
        }),
    }
}

fn vault_rest_spec(id: &str, vault: &str) -> SourceSpec {
    SourceSpec {
        id: id.into(),
        kind: SourceKind::RestVault,
        section: SectionName::LendingSituation,
        entity: vault.into(),
        label: None,
        endpoint: "https://app.example.invalid/api/vaults".into(),
        query: SourceQuery::Rest(RestQuery {
            shape: ResponseShape::EulerVault,
            decimals: 6,
        }),
    }
}

fn assert_timed_out(observation: &Observation) {
    match observation.error() {
        Some(FetchError::Transport(detail)) => assert!(detail.starts_with("timed out"), "{detail}"),
        other => panic!("expected a timeout, got {other:?}"),
    }
}

fn market_payload(key: &str) -> Value {
    json!({
        "marketByUniqueKey": {
            "uniqueKey": key,
            "lltv": "860000000000000000",
            "loanAsset": { "symbol": "USDC", "decimals": 6 },
            "collateralAsset": { "symbol": "cbBTC", "decimals": 8 },
            "state": {
                "supplyAssets": 1_000_000_000_000u64,
                "supplyAssetsUsd": 1_000_000.0,
                "borrowAssets": 400_000_000_000u64,
                "borrowAssetsUsd": 400_000.0,
                "supplyApy": 0.05,
                "borrowApy": 0.07,
                "utilization": 0.4
            },
            "warnings": []
        }
    })
}

fn uint_word(whole_tokens: u64) -> Vec<u8> {
    let raw = U256::from(whole_tokens) * U256::from(10u64).pow(U256::from(18u64));
    raw.to_be_bytes::<32>().to_vec()
}

fn orchestrator(registry: AdapterRegistry, deadline: Duration) -> Orchestrator {
    Orchestrator::new(registry, RetryPolicy::default(), deadline, Arc::new(NoopTelemetry))
}

fn aggregator(specs: Vec<SourceSpec>, registry: AdapterRegistry, deadline: Duration) -> Aggregator {
    let layout = ReportLayout::from_specs(&specs, "lvlUSD", "slvlUSD");
    Aggregator::new(
        specs,
        registry,
        RetryPolicy::default(),
        deadline,
        layout,
        Arc::new(NoopTelemetry),
    )
}

// ---- Integration Tests ----

#[tokio::test]
async fn test_one_observation_per_source_in_input_order() {
    let registry = AdapterRegistry::new().with(
        SourceKind::GraphQlMarket,
        Arc::new(FakeMarkets { stalled: vec![] }),
    );
    let specs = vec![
        market_spec("m1", "0xaaa"),
        supply_spec("no-adapter", "lvlUSD", "0x01"),
        market_spec("m2", "0xbbb"),
    ];

    let observations = orchestrator(registry, Duration::from_secs(5)).run(&specs).await;

    assert_eq!(observations.len(), specs.len());
    for (observation, spec) in observations.iter().zip(&specs) {
        assert_eq!(observation.source_id, spec.id);
    }
    assert!(observations[0].is_ok());
    assert!(matches!(observations[1].error(), Some(FetchError::Provider(_))));
    assert!(observations[2].is_ok());
}

#[tokio::test]
async fn test_panicking_adapter_does_not_affect_others() {
    let registry = AdapterRegistry::new().with(
        SourceKind::GraphQlMarket,
        Arc::new(Explosive { victim: "m2".into() }),
    );
    let specs = vec![
        market_spec("m1", "0xaaa"),
        market_spec("m2", "0xbbb"),
        market_spec("m3", "0xccc"),
    ];

    let observations = orchestrator(registry, Duration::from_secs(5)).run(&specs).await;

    assert!(observations[0].is_ok());
    assert!(!observations[1].is_ok());
    assert!(observations[2].is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_retried_until_success() {
    let flaky = Arc::new(Flaky {
        calls: AtomicU32::new(0),
        succeed_on: 2,
    });
    let registry = AdapterRegistry::new().with(SourceKind::GraphQlMarket, flaky.clone());

    let observations = orchestrator(registry, Duration::from_secs(30))
        .run(&[market_spec("m1", "0xaaa")])
        .await;

    assert!(observations[0].is_ok());
    assert_eq!(observations[0].attempts, 2);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_5xx_exhausts_retries() {
    let mut transport = MockTransport::new();
    transport.expect_send().times(3).returning(|_| {
        Ok(HttpReply {
            status: 503,
            body: "upstream unavailable".into(),
        })
    });
    let adapter = GraphQlAdapter::new(Arc::new(transport), Duration::from_secs(10));
    let registry = AdapterRegistry::new().with(SourceKind::GraphQlMarket, Arc::new(adapter));

    let observations = orchestrator(registry, Duration::from_secs(30))
        .run(&[market_spec("m1", "0xaaa")])
        .await;

    assert_eq!(observations[0].attempts, 3);
    assert!(matches!(observations[0].error(), Some(FetchError::Transport(_))));
}

#[tokio::test]
async fn test_graphql_errors_with_data_is_failed() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|request| request.url == "https://api.example.invalid/graphql" && request.body.is_some())
        .times(1)
        .returning(|_| {
            let body = json!({
                "data": market_payload("0xaaa"),
                "errors": [{ "message": "complexity limit exceeded" }]
            });
            Ok(HttpReply {
                status: 200,
                body: body.to_string(),
            })
        });
    let adapter = GraphQlAdapter::new(Arc::new(transport), Duration::from_secs(10));

    let observation = adapter.fetch(&market_spec("m1", "0xaaa")).await;

    match observation.error() {
        Some(FetchError::Provider(detail)) => assert!(detail.contains("complexity limit exceeded")),
        other => panic!("expected a provider error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_deadline_keeps_completed_markets() {
    let registry = AdapterRegistry::new().with(
        SourceKind::GraphQlMarket,
        Arc::new(FakeMarkets {
            stalled: vec!["0xccc".into()],
        }),
    );
    let specs = vec![
        market_spec("m1", "0xaaa"),
        market_spec("m2", "0xbbb"),
        market_spec("m3", "0xccc"),
    ];

    let report = aggregator(specs, registry, Duration::from_secs(2))
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(report.sources.total, 3);
    assert_eq!(report.sources.ok, 2);
    assert_eq!(report.sources.failed, 1);

    let keys: Vec<&str> = report.snapshots().iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["0xaaa", "0xbbb"]);
    assert!(report.lending_situation.is_ok());

    let json = serde_json::to_string(&report).unwrap();
    assert!(!json.contains("0xccc"));
}

#[tokio::test]
async fn test_supply_ratio_from_contract_reads() {
    let supplies = HashMap::from([("0x1111", 1_000_000u64), ("0x2222", 250_000u64)]);
    let mut reader = MockReader::new();
    reader
        .expect_call()
        .with(eq("http://localhost:8545"), always(), eq(vec![0x18u8, 0x16, 0x0d, 0xdd]))
        .times(2)
        .returning(move |_, to, _| Ok(uint_word(supplies[to])));

    let registry = AdapterRegistry::new().with(
        SourceKind::OnChainContract,
        Arc::new(OnChainAdapter::new(reader, Duration::from_secs(10))),
    );
    let specs = vec![
        supply_spec("lvlusd-supply", "lvlUSD", "0x1111"),
        supply_spec("slvlusd-supply", "slvlUSD", "0x2222"),
    ];

    let report = aggregator(specs, registry, Duration::from_secs(30))
        .run_cycle()
        .await
        .unwrap();

    let supply = report.supply_info.data().expect("supply section populated");
    assert_eq!(supply.staked_share_pct.value(), Some(dec!(25)));
    assert_eq!(
        supply.staked_share_pct.provenance(),
        ["lvlusd-supply".to_string(), "slvlusd-supply".to_string()]
    );
    assert_eq!(supply.tokens[0].total_supply.value(), Some(dec!(1000000)));
}

#[tokio::test]
async fn test_supply_ratio_absent_when_staked_read_fails() {
    let mut reader = MockReader::new();
    reader.expect_call().returning(|_, to, _| {
        if to == "0x2222" {
            Err(FetchError::Provider("execution reverted".into()))
        } else {
            Ok(uint_word(1_000_000))
        }
    });

    let registry = AdapterRegistry::new().with(
        SourceKind::OnChainContract,
        Arc::new(OnChainAdapter::new(reader, Duration::from_secs(10))),
    );
    let specs = vec![
        supply_spec("lvlusd-supply", "lvlUSD", "0x1111"),
        supply_spec("slvlusd-supply", "slvlUSD", "0x2222"),
    ];

    let report = aggregator(specs, registry, Duration::from_secs(30))
        .run_cycle()
        .await
        .unwrap();

    let supply = report.supply_info.data().expect("base supply alone keeps the section");
    assert!(matches!(supply.staked_share_pct, Figure::Absent { .. }));
    assert!(!supply.tokens[1].total_supply.is_known());
    assert_eq!(report.sources.failed, 1);
}

#[tokio::test]
async fn test_every_source_failing_still_yields_report() {
    let mut transport = MockTransport::new();
    transport.expect_send().returning(|_| {
        Ok(HttpReply {
            status: 401,
            body: "unauthorized".into(),
        })
    });
    let adapter = GraphQlAdapter::new(Arc::new(transport), Duration::from_secs(10));
    let registry = AdapterRegistry::new().with(SourceKind::GraphQlMarket, Arc::new(adapter));

    let report = aggregator(vec![market_spec("m1", "0xaaa")], registry, Duration::from_secs(30))
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(report.sources.failed, 1);
    assert!(!report.lending_situation.is_ok());
    assert!(!report.market_snapshots.is_ok());
    assert!(report.failed_sections().contains(&SectionName::SupplyInfo));
}

#[tokio::test(start_paused = true)]
async fn test_adapter_timeout_fails_fetch() {
    let transport = Arc::new(StalledTransport::default());
    let graphql = GraphQlAdapter::new(Arc::clone(&transport), Duration::from_secs(1));
    let reader = Arc::new(StalledReader::default());
    let chain = OnChainAdapter::new(Arc::clone(&reader), Duration::from_secs(1));

    assert_timed_out(&graphql.fetch(&market_spec("m1", "0xaaa")).await);
    assert_timed_out(&chain.fetch(&supply_spec("lvlusd-supply", "lvlUSD", "0x1111")).await);
    assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_adapter_timeouts_are_retried_within_deadline() {
    let transport = Arc::new(StalledTransport::default());
    let reader = Arc::new(StalledReader::default());
    let registry = AdapterRegistry::standard(Arc::clone(&reader), Arc::clone(&transport), Duration::from_secs(1));
    let specs = vec![
        market_spec("m1", "0xaaa"),
        supply_spec("lvlusd-supply", "lvlUSD", "0x1111"),
        vault_rest_spec("euler", "0xvault"),
    ];

    let started = tokio::time::Instant::now();
    let observations = orchestrator(registry, Duration::from_secs(30)).run(&specs).await;

    // Three one-second attempts plus 200ms and 800ms of backoff.
    assert!(started.elapsed() >= Duration::from_secs(4));
    assert!(started.elapsed() < Duration::from_secs(5));
    for observation in &observations {
        assert_timed_out(observation);
        assert_eq!(observation.attempts, 3);
    }
    assert_eq!(transport.sends.load(Ordering::SeqCst), 6);
    assert_eq!(reader.calls.load(Ordering::SeqCst), 3);
}
