//! End-to-end behavior of the execution gate with an in-process connector

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use query_guard_core::{QueryValidator, RejectionCode, ValidatorConfig};
use query_guard_gateway::security::{ManualClock, RateLimiter, RateLimiterConfig};
use query_guard_gateway::warehouse::{Column, QueryResult, WarehouseConnector};
use query_guard_gateway::{GateOptions, GatewayError, QueryGate, Result};

/// Connector that records every statement it receives
#[derive(Debug, Default)]
struct RecordingConnector {
    statements: Mutex<Vec<String>>,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl RecordingConnector {
    fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

fn canned_result() -> QueryResult {
    QueryResult::new(
        vec![Column::new("O_ORDERKEY", "fixed")],
        vec![vec![json!(1)], vec![json!(2)]],
    )
}

#[async_trait]
impl WarehouseConnector for RecordingConnector {
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.statements.lock().unwrap().push(sql.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(message) => Err(GatewayError::Upstream(message.clone())),
            None => Ok(canned_result()),
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

struct Harness {
    gate: QueryGate,
    connector: Arc<RecordingConnector>,
    clock: ManualClock,
}

fn harness_with(
    connector: RecordingConnector,
    max_requests: u32,
    query_timeout: Duration,
) -> Harness {
    let clock = ManualClock::new(Instant::now());
    let connector = Arc::new(connector);
    let limiter = RateLimiter::with_clock(
        RateLimiterConfig {
            max_requests,
            window_secs: 60,
            ..Default::default()
        },
        Arc::new(clock.clone()),
    )
    .unwrap();
    let validator = QueryValidator::new(ValidatorConfig::default()).unwrap();
    let gate = QueryGate::new(
        Arc::new(validator),
        Arc::new(limiter),
        connector.clone(),
        GateOptions {
            max_rows: 1_000,
            query_timeout,
        },
    );
    Harness {
        gate,
        connector,
        clock,
    }
}

fn harness(max_requests: u32) -> Harness {
    harness_with(RecordingConnector::default(), max_requests, Duration::from_secs(5))
}

const VALID: &str = "SELECT o_orderkey FROM orders";

#[tokio::test]
async fn test_thirty_first_query_is_rate_limited() {
    let h = harness(30);
    for i in 0..30 {
        assert!(
            h.gate.execute(VALID, "alice").await.is_ok(),
            "query {} should pass",
            i + 1
        );
    }

    let err = h.gate.execute(VALID, "alice").await.unwrap_err();
    assert_eq!(err.code(), Some(RejectionCode::RateLimited));
    assert!(err.user_message().contains("60 seconds"));
    assert_eq!(h.connector.statements().len(), 30);
}

#[tokio::test]
async fn test_invalid_queries_do_not_consume_slots() {
    let h = harness(30);
    for _ in 0..30 {
        let err = h.gate.execute("DROP TABLE orders", "alice").await.unwrap_err();
        assert_eq!(err.code(), Some(RejectionCode::ForbiddenKeyword));
    }
    assert!(h.gate.execute(VALID, "alice").await.is_ok());
    assert_eq!(h.gate.limiter().remaining("alice"), 29);
}

#[tokio::test]
async fn test_window_eviction_restores_access() {
    let h = harness(2);
    assert!(h.gate.execute(VALID, "alice").await.is_ok());
    assert!(h.gate.execute(VALID, "alice").await.is_ok());
    assert!(h.gate.execute(VALID, "alice").await.is_err());

    h.clock.advance(Duration::from_secs(60));
    assert!(h.gate.execute(VALID, "alice").await.is_ok());
}

#[tokio::test]
async fn test_identities_do_not_share_windows() {
    let h = harness(1);
    assert!(h.gate.execute(VALID, "alice").await.is_ok());
    assert!(h.gate.execute(VALID, "alice").await.is_err());
    assert!(h.gate.execute(VALID, "bob").await.is_ok());
}

#[tokio::test]
async fn test_only_accepted_queries_reach_connector() {
    let h = harness(30);
    let rejected = [
        "DROP TABLE customers",
        "SELECT * FROM orders; DROP TABLE orders",
        "SELECT * FROM users WHERE 1=1",
        "SELECT * FROM production.users",
    ];
    for query in rejected {
        assert!(h.gate.execute(query, "alice").await.is_err(), "{}", query);
    }
    assert!(h.connector.statements().is_empty());

    h.gate
        .execute("SELECT o_orderkey FROM orders LIMIT 50000;", "alice")
        .await
        .unwrap();
    assert_eq!(
        h.connector.statements(),
        vec!["SELECT o_orderkey FROM orders LIMIT 1000".to_string()]
    );
}

#[tokio::test]
async fn test_result_is_returned_unmodified() {
    let h = harness(30);
    let result = h.gate.execute(VALID, "alice").await.unwrap();
    assert_eq!(result, canned_result());
}

#[tokio::test]
async fn test_timeout_is_upstream_error() {
    let connector = RecordingConnector {
        delay: Some(Duration::from_secs(10)),
        ..Default::default()
    };
    let h = harness_with(connector, 30, Duration::from_millis(50));

    let err = h.gate.execute(VALID, "alice").await.unwrap_err();
    assert!(matches!(err, GatewayError::UpstreamTimeout(_)));
    assert_eq!(err.code(), Some(RejectionCode::UpstreamError));
}

#[tokio::test]
async fn test_upstream_failure_passes_through() {
    let connector = RecordingConnector {
        failure: Some("Warehouse 'COMPUTE_WH' is suspended.".to_string()),
        ..Default::default()
    };
    let h = harness_with(connector, 30, Duration::from_secs(5));

    let err = h.gate.execute(VALID, "alice").await.unwrap_err();
    assert_eq!(err.code(), Some(RejectionCode::UpstreamError));
    assert_eq!(err.user_message(), "Warehouse 'COMPUTE_WH' is suspended.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_respect_ceiling() {
    let h = harness(30);
    let gate = Arc::new(h.gate);

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let gate = gate.clone();
            tokio::spawn(async move { gate.execute(VALID, "shared").await.is_ok() })
        })
        .collect();

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 30);
    assert_eq!(h.connector.statements().len(), 30);
}
