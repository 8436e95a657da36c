//! Warehouse Query Guard gateway
//!
//! This crate puts the query validator, a per-identity rate limiter and a
//! warehouse connector behind a single execution gate, and exposes it over
//! HTTP and a command line.

// Error types and result
pub mod error;
pub use error::{GatewayError, Result};

// Configuration
pub mod config;
pub use config::GatewayConfig;

// Rate limiting
pub mod security;
pub use security::{RateLimiter, RateLimiterConfig};

// Warehouse connectivity
pub mod warehouse;
pub use warehouse::{QueryResult, WarehouseConnector};

// Gate, rewriting and catalog
pub mod interception;
pub use interception::{Catalog, GateOptions, QueryGate};

// HTTP surface
pub mod api;

use std::sync::Arc;

use query_guard_core::QueryValidator;

/// Build the gate and catalog described by `config` on top of `connector`
pub fn build_services(
    config: &GatewayConfig,
    connector: Arc<dyn WarehouseConnector>,
) -> Result<(QueryGate, Catalog)> {
    config.validate()?;
    let validator = Arc::new(QueryValidator::new(config.validator.clone())?);
    let limiter = Arc::new(RateLimiter::new(config.rate_limiter.clone())?);
    let options = config.gate_options();
    let catalog = Catalog::new(connector.clone(), options.max_rows, options.query_timeout)?;
    let gate = QueryGate::new(validator, limiter, connector, options);
    Ok((gate, catalog))
}
