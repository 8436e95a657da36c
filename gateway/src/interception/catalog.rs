//! Table listing and table preview
//!
//! These statements are built by the gateway itself from fixed templates, so
//! they skip the validator; the only user input (the table name) is checked
//! against a strict identifier pattern first.

use log::{info, warn};
use metrics::increment_counter;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use query_guard_core::utils::query_preview;
use query_guard_core::{Rejection, RejectionCode};

use crate::error::{GatewayError, Result};
use crate::warehouse::{execute_with_timeout, QueryResult, WarehouseConnector};

/// Database browsed by the catalog
pub const SAMPLE_DATABASE: &str = "SNOWFLAKE_SAMPLE_DATA";

/// Schema browsed by the catalog
pub const SAMPLE_SCHEMA: &str = "TPCH_SF10";

/// Default preview size
pub const DEFAULT_PREVIEW_ROWS: usize = 1_000;

const INVALID_TABLE_NAME: &str =
    "Invalid table name. Table names may contain only letters, digits, underscores and $.";

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_$]*$";

/// One row of the table listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    /// Table name
    pub name: String,

    /// `BASE TABLE` or `VIEW`
    pub table_type: String,

    /// Row count reported by the catalog
    pub row_count: Option<i64>,

    /// Storage size in bytes
    pub bytes: Option<i64>,

    /// Creation timestamp as reported
    pub created: Option<String>,
}

fn as_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Browses the sample schema
#[derive(Clone)]
pub struct Catalog {
    connector: Arc<dyn WarehouseConnector>,
    identifier: Regex,
    max_rows: usize,
    query_timeout: Duration,
}

impl Catalog {
    /// Create a catalog on top of a connector
    pub fn new(
        connector: Arc<dyn WarehouseConnector>,
        max_rows: usize,
        query_timeout: Duration,
    ) -> Result<Self> {
        if max_rows == 0 {
            return Err(GatewayError::Config(
                "catalog max_rows must be positive".to_string(),
            ));
        }
        let identifier = Regex::new(IDENTIFIER_PATTERN)
            .map_err(|e| GatewayError::Config(format!("invalid identifier pattern: {}", e)))?;
        Ok(Self {
            connector,
            identifier,
            max_rows,
            query_timeout,
        })
    }

    /// Whether `name` is a plain, unquoted identifier
    pub fn is_valid_identifier(&self, name: &str) -> bool {
        name.len() <= 255 && self.identifier.is_match(name)
    }

    /// Statement listing the tables and views of the sample schema
    pub fn list_tables_sql() -> String {
        format!(
            "SELECT table_name, table_type, row_count, bytes, created \
             FROM {db}.information_schema.tables \
             WHERE table_schema = '{schema}' AND table_catalog = '{db}' \
             ORDER BY table_name",
            db = SAMPLE_DATABASE,
            schema = SAMPLE_SCHEMA
        )
    }

    /// Statement previewing a table, or a rejection for a bad name
    pub fn preview_sql(&self, table: &str, limit: usize) -> Result<String> {
        if !self.is_valid_identifier(table) {
            return Err(reject(table));
        }
        let limit = limit.clamp(1, self.max_rows);
        Ok(format!(
            "SELECT * FROM {}.{}.{} LIMIT {}",
            SAMPLE_DATABASE, SAMPLE_SCHEMA, table, limit
        ))
    }

    /// Tables and views of the sample schema
    pub async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let result = execute_with_timeout(
            self.connector.as_ref(),
            &Self::list_tables_sql(),
            self.query_timeout,
        )
        .await?;

        let tables: Vec<TableInfo> = (0..result.row_count())
            .filter_map(|row| {
                Some(TableInfo {
                    name: as_string(result.value(row, "TABLE_NAME"))?,
                    table_type: as_string(result.value(row, "TABLE_TYPE")).unwrap_or_default(),
                    row_count: as_i64(result.value(row, "ROW_COUNT")),
                    bytes: as_i64(result.value(row, "BYTES")),
                    created: as_string(result.value(row, "CREATED")),
                })
            })
            .collect();

        info!("Retrieved {} tables/views from {}.{}", tables.len(), SAMPLE_DATABASE, SAMPLE_SCHEMA);
        Ok(tables)
    }

    /// First `limit` rows of `table` (capped at the row limit)
    pub async fn preview_table(&self, table: &str, limit: usize) -> Result<QueryResult> {
        let sql = self.preview_sql(table, limit)?;
        let result = execute_with_timeout(self.connector.as_ref(), &sql, self.query_timeout).await?;
        info!("Retrieved {} rows from {}", result.row_count(), table);
        Ok(result)
    }
}

/// Log and count a refused table name
fn reject(table: &str) -> GatewayError {
    let err = GatewayError::Rejected(Rejection::new(
        RejectionCode::ForbiddenPattern,
        INVALID_TABLE_NAME,
    ));
    let code = err.code_str();
    warn!("Table preview rejected for {:?}: {}", query_preview(table), code);
    increment_counter!("query_guard_rejections_total", "code" => code);
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{Column, MockWarehouseConnector};
    use serde_json::json;

    fn catalog(connector: MockWarehouseConnector) -> Catalog {
        Catalog::new(Arc::new(connector), 100, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_identifier_validation() {
        let catalog = catalog(MockWarehouseConnector::new());
        assert!(catalog.is_valid_identifier("LINEITEM"));
        assert!(catalog.is_valid_identifier("my_table$1"));
        assert!(!catalog.is_valid_identifier("1table"));
        assert!(!catalog.is_valid_identifier("orders; DROP TABLE x"));
        assert!(!catalog.is_valid_identifier("a.b"));
        assert!(!catalog.is_valid_identifier(""));
    }

    #[test]
    fn test_preview_sql_caps_limit() {
        let catalog = catalog(MockWarehouseConnector::new());
        assert_eq!(
            catalog.preview_sql("orders", 5_000).unwrap(),
            "SELECT * FROM SNOWFLAKE_SAMPLE_DATA.TPCH_SF10.orders LIMIT 100"
        );
        assert!(catalog.preview_sql("orders", 0).unwrap().ends_with("LIMIT 1"));

        let err = catalog.preview_sql("orders--", 10).unwrap_err();
        assert_eq!(err.code(), Some(RejectionCode::ForbiddenPattern));
    }

    #[test]
    fn test_zero_max_rows_is_config_error() {
        let result = Catalog::new(
            Arc::new(MockWarehouseConnector::new()),
            0,
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(GatewayError::Config(_))));

        let catalog = Catalog::new(
            Arc::new(MockWarehouseConnector::new()),
            1,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(catalog.preview_sql("orders", 0).unwrap().ends_with("LIMIT 1"));
    }

    #[test]
    fn test_rejection_carries_code_and_safe_message() {
        let err = reject("x'; DROP TABLE orders; --");
        assert_eq!(err.code_str(), "FORBIDDEN_PATTERN");
        assert_eq!(err.user_message(), INVALID_TABLE_NAME);
        assert!(!err.user_message().contains("DROP"));
    }

    #[tokio::test]
    async fn test_list_tables_maps_rows() {
        let mut connector = MockWarehouseConnector::new();
        connector
            .expect_execute()
            .withf(|sql: &str| sql.contains("information_schema.tables"))
            .returning(|_| {
                Ok(QueryResult::new(
                    vec![
                        Column::new("TABLE_NAME", "text"),
                        Column::new("TABLE_TYPE", "text"),
                        Column::new("ROW_COUNT", "fixed"),
                        Column::new("BYTES", "fixed"),
                        Column::new("CREATED", "text"),
                    ],
                    vec![
                        vec![
                            json!("CUSTOMER"),
                            json!("BASE TABLE"),
                            json!(1500000),
                            json!(1024),
                            json!("2024-01-01"),
                        ],
                        vec![
                            json!("NATION"),
                            json!("BASE TABLE"),
                            json!("25"),
                            Value::Null,
                            Value::Null,
                        ],
                    ],
                ))
            });
        connector.expect_name().return_const("mock");

        let tables = catalog(connector).list_tables().await.unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "CUSTOMER");
        assert_eq!(tables[0].row_count, Some(1_500_000));
        assert_eq!(tables[1].row_count, Some(25));
        assert_eq!(tables[1].bytes, None);
    }

    #[tokio::test]
    async fn test_preview_rejects_bad_name_without_calling_warehouse() {
        let connector = MockWarehouseConnector::new();
        let err = catalog(connector)
            .preview_table("x; DROP TABLE y", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }
}
