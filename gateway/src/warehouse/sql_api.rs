//! Warehouse connector over the SQL REST API
//!
//! Statements are submitted with `POST /api/v2/statements`. A `202` answer
//! means the statement is still running; its handle is polled until the result
//! is ready. Large results arrive in partitions, fetched one by one.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::warehouse::environment::ConnectionParameters;
use crate::warehouse::{Column, QueryResult, WarehouseConnector};

const STATEMENTS_PATH: &str = "/api/v2/statements";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Answer to a statement submission or status request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default = "default_nullable")]
    nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// Partition fetched after the first one
#[derive(Debug, Deserialize)]
struct PartitionResponse {
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

/// Convert one cell from its wire form (always a string) to JSON
fn convert_cell(data_type: &str, raw: Option<String>) -> Value {
    let raw = match raw {
        Some(raw) => raw,
        None => return Value::Null,
    };
    match data_type {
        "fixed" => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<f64>().map(Value::from))
            .unwrap_or(Value::String(raw)),
        "real" => raw
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or(Value::String(raw)),
        "boolean" => match raw.as_str() {
            "true" | "TRUE" | "1" => Value::Bool(true),
            "false" | "FALSE" | "0" => Value::Bool(false),
            _ => Value::String(raw),
        },
        _ => Value::String(raw),
    }
}

/// SQL API connector
#[derive(Debug, Clone)]
pub struct SqlApiConnector {
    /// HTTP client
    client: Client,

    /// API base URL, without trailing slash
    base_url: String,

    /// Connection parameters
    params: ConnectionParameters,

    /// Server-side statement timeout
    statement_timeout: Duration,
}

impl SqlApiConnector {
    /// Create a connector for the given connection parameters
    pub fn new(params: ConnectionParameters, statement_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("query-guard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: params.base_url(),
            params,
            statement_timeout,
        })
    }

    /// Point the connector at a different API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Connection parameters in use
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.params.credentials.token())
            .header(
                "X-Snowflake-Authorization-Token-Type",
                self.params.credentials.token_type(),
            )
            .header("Accept", "application/json")
    }

    fn statement_body(&self, sql: &str) -> Value {
        let mut body = json!({
            "statement": sql,
            "timeout": self.statement_timeout.as_secs(),
            "warehouse": self.params.warehouse,
            "schema": self.params.schema,
        });
        if let Some(database) = &self.params.database {
            body["database"] = json!(database);
        }
        body
    }

    async fn read_response(
        &self,
        response: reqwest::Response,
    ) -> Result<(StatusCode, StatementResponse)> {
        let status = response.status();
        if status.is_success() {
            let parsed = response.json::<StatementResponse>().await?;
            return Ok((status, parsed));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StatementResponse>(&body)
            .ok()
            .and_then(|r| r.message)
            .unwrap_or_else(|| format!("warehouse returned HTTP {}", status));
        warn!("Statement failed with HTTP {}", status);
        Err(GatewayError::Upstream(message))
    }

    async fn fetch_partition(
        &self,
        handle: &str,
        partition: usize,
    ) -> Result<Vec<Vec<Option<String>>>> {
        let url = format!("{}{}/{}", self.base_url, STATEMENTS_PATH, handle);
        let response = self
            .authorized(self.client.get(&url))
            .query(&[("partition", partition)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::Upstream(format!(
                "failed to fetch result partition {}: HTTP {}",
                partition,
                response.status()
            )));
        }
        Ok(response.json::<PartitionResponse>().await?.data)
    }

    async fn into_result(&self, response: StatementResponse) -> Result<QueryResult> {
        let meta = response.result_set_meta_data.ok_or_else(|| {
            GatewayError::Upstream("warehouse response has no result metadata".to_string())
        })?;

        let mut data = response.data;
        if let Some(handle) = &response.statement_handle {
            for partition in 1..meta.partition_info.len() {
                debug!("Fetching result partition {}", partition);
                data.extend(self.fetch_partition(handle, partition).await?);
            }
        }

        let columns: Vec<Column> = meta
            .row_type
            .into_iter()
            .map(|rt| Column {
                name: rt.name,
                data_type: rt.data_type.to_lowercase(),
                nullable: rt.nullable,
            })
            .collect();

        let rows = data
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        let data_type = columns.get(i).map_or("text", |c| c.data_type.as_str());
                        convert_cell(data_type, cell)
                    })
                    .collect()
            })
            .collect();

        Ok(QueryResult::new(columns, rows))
    }
}

#[async_trait]
impl WarehouseConnector for SqlApiConnector {
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let url = format!("{}{}", self.base_url, STATEMENTS_PATH);
        let response = self
            .authorized(self.client.post(&url))
            .json(&self.statement_body(sql))
            .send()
            .await?;
        let (mut status, mut body) = self.read_response(response).await?;

        while status == StatusCode::ACCEPTED {
            let handle = body.statement_handle.clone().ok_or_else(|| {
                GatewayError::Upstream("running statement has no handle".to_string())
            })?;
            debug!("Statement {} still running", handle);
            tokio::time::sleep(POLL_INTERVAL).await;

            let status_url = format!("{}{}/{}", self.base_url, STATEMENTS_PATH, handle);
            let response = self.authorized(self.client.get(&status_url)).send().await?;
            (status, body) = self.read_response(response).await?;
        }

        self.into_result(body).await
    }

    fn name(&self) -> &'static str {
        "sql_api"
    }
}
