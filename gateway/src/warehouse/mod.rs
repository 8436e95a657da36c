//! Warehouse connectivity
//!
//! The gate only knows the [`WarehouseConnector`] trait. The SQL API connector
//! in [`sql_api`] is the production implementation; tests provide their own.

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;

use query_guard_core::utils::Timer;

use crate::error::{GatewayError, Result};

pub mod environment;
pub mod sql_api;

pub use environment::{ConnectionParameters, Credentials, Environment, EnvironmentKind};
pub use sql_api::SqlApiConnector;

/// Result sets above this size are reported in the log
pub const LARGE_RESULT_ROWS: usize = 5_000;

/// A result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as reported by the warehouse
    pub name: String,

    /// Warehouse type name (lower case, e.g. `fixed`, `text`)
    pub data_type: String,

    /// Whether the column may contain NULL
    pub nullable: bool,
}

impl Column {
    /// Create a nullable column
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
        }
    }
}

/// Tabular result returned by the warehouse
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Result columns in order
    pub columns: Vec<Column>,

    /// Rows, one value per column
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Create a result from columns and rows
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, compared case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Value of `column` in `row`, if both exist
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }
}

/// Something that can run SQL against the warehouse
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    /// Run one statement and return its rows
    async fn execute(&self, sql: &str) -> Result<QueryResult>;

    /// Short name for logs
    fn name(&self) -> &'static str {
        "warehouse"
    }
}

/// Run `sql` on `connector`, failing with [`GatewayError::UpstreamTimeout`]
/// when it takes longer than `limit`.
pub async fn execute_with_timeout(
    connector: &dyn WarehouseConnector,
    sql: &str,
    limit: Duration,
) -> Result<QueryResult> {
    let timer = Timer::for_query(connector.name()).without_auto_log();
    let result = match timeout(limit, connector.execute(sql)).await {
        Ok(result) => result?,
        Err(_) => return Err(GatewayError::UpstreamTimeout(limit)),
    };
    let elapsed = timer.finish(format!("returned {} rows", result.row_count()));
    if result.row_count() > LARGE_RESULT_ROWS {
        info!(
            "Large result set: {} rows in {:.2}s",
            result.row_count(),
            elapsed.as_secs_f64()
        );
    }
    Ok(result)
}
