//! Query execution gate
//!
//! The single entry point for running a user-supplied query. Checks run in a
//! fixed order: validation, then the rate limit, then the warehouse call. A query
//! that fails validation never consumes a rate-limit slot, and nothing rejected
//! here ever reaches the connector.

use log::{error, info, warn};
use metrics::increment_counter;
use std::sync::Arc;
use std::time::Duration;

use query_guard_core::utils::query_preview;
use query_guard_core::{QueryValidator, ValidationResult, HARD_MAX_ROWS};

use crate::error::{GatewayError, Result};
use crate::interception::rewrite::{enforce_row_limit, LimitAction};
use crate::security::{RateDecision, RateLimiter};
use crate::warehouse::{execute_with_timeout, QueryResult, WarehouseConnector};

/// Default warehouse call timeout
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Execution options for the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOptions {
    /// Row cap enforced on every query
    pub max_rows: usize,

    /// Timeout for one warehouse call
    pub query_timeout: Duration,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            max_rows: HARD_MAX_ROWS,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Validates, rate-limits and dispatches queries
#[derive(Clone)]
pub struct QueryGate {
    validator: Arc<QueryValidator>,
    limiter: Arc<RateLimiter>,
    connector: Arc<dyn WarehouseConnector>,
    options: GateOptions,
}

impl QueryGate {
    /// Create a gate. The row cap never exceeds the validator's effective cap.
    pub fn new(
        validator: Arc<QueryValidator>,
        limiter: Arc<RateLimiter>,
        connector: Arc<dyn WarehouseConnector>,
        options: GateOptions,
    ) -> Self {
        let max_rows = options
            .max_rows
            .clamp(1, validator.config().effective_max_rows());
        Self {
            validator,
            limiter,
            connector,
            options: GateOptions { max_rows, ..options },
        }
    }

    /// Shared validator
    pub fn validator(&self) -> &Arc<QueryValidator> {
        &self.validator
    }

    /// Shared rate limiter
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Connector queries are dispatched to
    pub fn connector(&self) -> &Arc<dyn WarehouseConnector> {
        &self.connector
    }

    /// Effective options
    pub fn options(&self) -> &GateOptions {
        &self.options
    }

    /// Validate without rate limiting or executing
    pub fn check(&self, query: &str) -> ValidationResult {
        self.validator.validate(query)
    }

    /// Run `query` on behalf of `identity`
    pub async fn execute(&self, query: &str, identity: &str) -> Result<QueryResult> {
        if let Err(rejection) = self.validator.validate(query).into_result() {
            return Err(self.reject(identity, GatewayError::Rejected(rejection)));
        }

        if let RateDecision::Limited { retry_after } = self.limiter.check(identity) {
            return Err(self.reject(identity, GatewayError::RateLimited { retry_after }));
        }

        let rewritten = enforce_row_limit(&self.validator.normalize(query), self.options.max_rows);
        if rewritten.action != LimitAction::Kept {
            info!("Row cap for {}: {}", identity, rewritten.action);
        }
        info!(
            "Executing query for {}: {}",
            identity,
            query_preview(&rewritten.sql)
        );
        increment_counter!("query_guard_accepted_total");

        let outcome = execute_with_timeout(
            self.connector.as_ref(),
            &rewritten.sql,
            self.options.query_timeout,
        )
        .await;
        match outcome {
            Ok(result) => {
                info!(
                    "Query for {} returned {} rows",
                    identity,
                    result.row_count()
                );
                Ok(result)
            }
            Err(err) => {
                error!("Warehouse call failed for {}: {}", identity, err);
                Err(self.reject(identity, err))
            }
        }
    }

    fn reject(&self, identity: &str, err: GatewayError) -> GatewayError {
        let code = err.code_str();
        warn!("Query rejected for {}: {}", identity, code);
        increment_counter!("query_guard_rejections_total", "code" => code);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{ManualClock, RateLimiterConfig};
    use crate::warehouse::MockWarehouseConnector;
    use query_guard_core::{RejectionCode, ValidatorConfig};

    fn gate(connector: MockWarehouseConnector, max_requests: u32) -> QueryGate {
        let validator = QueryValidator::new(ValidatorConfig::default()).unwrap();
        let limiter = RateLimiter::with_clock(
            RateLimiterConfig {
                max_requests,
                ..Default::default()
            },
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        QueryGate::new(
            Arc::new(validator),
            Arc::new(limiter),
            Arc::new(connector),
            GateOptions {
                max_rows: 100,
                query_timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn test_rejected_query_never_reaches_connector() {
        let mut connector = MockWarehouseConnector::new();
        connector.expect_execute().never();

        let err = gate(connector, 30)
            .execute("DROP TABLE customers", "alice")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(RejectionCode::ForbiddenKeyword));
    }

    #[tokio::test]
    async fn test_accepted_query_is_capped_and_forwarded() {
        let mut connector = MockWarehouseConnector::new();
        connector
            .expect_execute()
            .withf(|sql: &str| sql == "SELECT created_date FROM orders LIMIT 100")
            .times(1)
            .returning(|_| Ok(QueryResult::default()));
        connector.expect_name().return_const("mock");

        let result = gate(connector, 30)
            .execute("SELECT created_date FROM orders;", "alice")
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_query_never_reaches_connector() {
        let mut connector = MockWarehouseConnector::new();
        connector
            .expect_execute()
            .times(1)
            .returning(|_| Ok(QueryResult::default()));
        connector.expect_name().return_const("mock");

        let gate = gate(connector, 1);
        gate.execute("SELECT 1", "alice").await.unwrap();
        let err = gate.execute("SELECT 1", "alice").await.unwrap_err();
        assert_eq!(err.code(), Some(RejectionCode::RateLimited));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_row_cap_is_clamped_to_validator() {
        let gate = gate(MockWarehouseConnector::new(), 30);
        assert_eq!(gate.options().max_rows, 100);

        let validator = QueryValidator::new(ValidatorConfig::for_testing()).unwrap();
        let gate = QueryGate::new(
            Arc::new(validator),
            gate.limiter().clone(),
            gate.connector().clone(),
            GateOptions::default(),
        );
        assert_eq!(gate.options().max_rows, ValidatorConfig::for_testing().max_rows);
    }
}
