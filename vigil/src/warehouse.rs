//! Data warehouse access: query contract, builder, and the warehouse tool.
//!
//! The warehouse itself is an external collaborator behind [`QueryExecutor`].
//! What is owned here is the query contract of the mandatory analysis phase:
//! the fixed column set, entity filter, descending time order, and result
//! cap. Dialect translation happens on the other side of the trait.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ToolError, WarehouseError};
use crate::state::EntityType;
use crate::tool::{Tool, ToolCategory, ToolContext, ToolOutput};

/// Registry name of the warehouse tool. The router watches for its result
/// message to progress out of the warehouse phase.
pub const WAREHOUSE_TOOL_NAME: &str = "warehouse_query";

/// Columns every transaction query must select.
///
/// The fraud label and model score must always be present; downstream agents
/// key on these names.
pub const MANDATORY_COLUMNS: [&str; 15] = [
    "TX_ID_KEY",
    "EMAIL",
    "MODEL_SCORE",
    "IS_FRAUD_TX",
    "NSURE_LAST_DECISION",
    "DISPUTES",
    "FRAUD_ALERTS",
    "PAID_AMOUNT_VALUE",
    "IP",
    "IP_COUNTRY_CODE",
    "DEVICE_ID",
    "DEVICE_FINGERPRINT",
    "USER_AGENT",
    "DEVICE_TYPE",
    "TX_DATETIME",
];

/// Result of one warehouse query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Result rows as JSON objects keyed by column name.
    pub rows: Vec<Value>,
    /// Total row count.
    pub row_count: usize,
}

impl QueryOutcome {
    /// Render the outcome as the JSON payload stored in investigation state.
    #[must_use]
    pub fn into_value(self) -> Value {
        json!({
            "rows": self.rows,
            "row_count": self.row_count,
        })
    }
}

/// The warehouse side of the contract.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute a query with positional parameters.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`] on connection or execution failure; the
    /// caller treats it like a tool execution failure.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryOutcome, WarehouseError>;
}

/// Location of the transactions table.
#[derive(Debug, Clone)]
pub struct TableRef {
    /// Database name.
    pub database: String,
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
}

impl TableRef {
    /// Default transactions table.
    #[must_use]
    pub fn transactions_default() -> Self {
        Self {
            database: "FRAUD_ANALYTICS".to_owned(),
            schema: "PUBLIC".to_owned(),
            table: "TRANSACTIONS_ENRICHED".to_owned(),
        }
    }

    /// Fully qualified name.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// Builder for the mandatory transaction query.
#[derive(Debug, Clone)]
pub struct TransactionQuery {
    table: TableRef,
    entity_type: EntityType,
    entity_id: String,
    date_range_days: u32,
    limit: usize,
}

impl TransactionQuery {
    /// Build a query for the given entity over the configured table.
    #[must_use]
    pub fn new(
        table: TableRef,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        date_range_days: u32,
        limit: usize,
    ) -> Self {
        Self {
            table,
            entity_type,
            entity_id: entity_id.into(),
            date_range_days: date_range_days.max(1),
            limit,
        }
    }

    /// Render the SQL with the entity id bound as the single parameter.
    #[must_use]
    pub fn render(&self) -> (String, Vec<Value>) {
        let columns = MANDATORY_COLUMNS.join(",\n    ");
        let sql = format!(
            "SELECT\n    {columns}\nFROM {table}\nWHERE {entity_column} = ?\n  AND TX_DATETIME >= DATEADD(day, -{days}, CURRENT_TIMESTAMP())\nORDER BY TX_DATETIME DESC\nLIMIT {limit}",
            table = self.table.qualified(),
            entity_column = self.entity_type.warehouse_column(),
            days = self.date_range_days,
            limit = self.limit,
        );
        (sql, vec![Value::String(self.entity_id.clone())])
    }
}

/// Aggregate statistics over executed warehouse queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Number of queries executed.
    pub executed: u64,
    /// Total rows returned.
    pub total_rows: u64,
    /// Queries that exceeded the slow threshold.
    pub slow: u64,
}

/// Dependency-injected monitor recording per-query durations and volumes.
#[derive(Debug)]
pub struct QueryMonitor {
    slow_threshold: Duration,
    stats: Mutex<QueryStats>,
}

impl QueryMonitor {
    /// Create a monitor with the given slow-query threshold.
    #[must_use]
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            slow_threshold,
            stats: Mutex::new(QueryStats::default()),
        }
    }

    /// Record one executed query.
    pub fn record(&self, duration: Duration, row_count: usize) {
        let slow = duration >= self.slow_threshold;
        if slow {
            warn!(
                duration_ms = duration.as_millis() as u64,
                threshold_ms = self.slow_threshold.as_millis() as u64,
                row_count,
                "Slow warehouse query",
            );
        }
        let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        stats.executed += 1;
        stats.total_rows += row_count as u64;
        if slow {
            stats.slow += 1;
        }
    }

    /// Current aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> QueryStats {
        *self
            .stats
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for QueryMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// Arguments accepted by the warehouse tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WarehouseQueryArgs {
    /// The SQL statement to execute.
    pub query: String,
    /// Optional result cap.
    #[serde(default)]
    pub limit: Option<u64>,
}

/// The warehouse exposed as a registry tool.
#[derive(Clone)]
pub struct WarehouseTool {
    executor: Arc<dyn QueryExecutor>,
    monitor: Arc<QueryMonitor>,
    default_limit: usize,
}

impl WarehouseTool {
    /// Wrap a query executor for registry use.
    #[must_use]
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        monitor: Arc<QueryMonitor>,
        default_limit: usize,
    ) -> Self {
        Self {
            executor,
            monitor,
            default_limit,
        }
    }
}

impl std::fmt::Debug for WarehouseTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseTool")
            .field("default_limit", &self.default_limit)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for WarehouseTool {
    fn name(&self) -> &str {
        WAREHOUSE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Run a read-only SQL query against the transactions warehouse. \
         The query must select the mandatory transaction columns."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Warehouse
    }

    fn input_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(WarehouseQueryArgs))
            .unwrap_or_else(|_| json!({"type": "object"}))
    }

    async fn invoke(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let args: WarehouseQueryArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::invalid_arguments(WAREHOUSE_TOOL_NAME, e.to_string()))?;
        let limit = args
            .limit
            .map_or(self.default_limit, |l| l as usize);

        debug!(limit, "Executing warehouse query");
        let started = std::time::Instant::now();
        let mut outcome = self
            .executor
            .execute(&args.query, &[])
            .await
            .map_err(|e| ToolError::execution(WAREHOUSE_TOOL_NAME, e.to_string()))?;
        outcome.rows.truncate(limit);
        outcome.row_count = outcome.rows.len();
        self.monitor.record(started.elapsed(), outcome.row_count);

        Ok(ToolOutput::json(outcome.into_value()))
    }
}

/// A canned warehouse returning the same rows for every query. For tests and
/// offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticWarehouse {
    rows: Vec<Value>,
}

impl StaticWarehouse {
    /// A warehouse that answers every query with the given rows.
    #[must_use]
    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self { rows }
    }

    /// A warehouse that answers every query with no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueryExecutor for StaticWarehouse {
    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<QueryOutcome, WarehouseError> {
        Ok(QueryOutcome {
            rows: self.rows.clone(),
            row_count: self.rows.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_query_selects_every_mandatory_column() {
        let query = TransactionQuery::new(
            TableRef::transactions_default(),
            EntityType::IpAddress,
            "203.0.113.5",
            7,
            100,
        );
        let (sql, params) = query.render();
        for column in MANDATORY_COLUMNS {
            assert!(sql.contains(column), "missing column {column}");
        }
        assert!(sql.contains("WHERE IP = ?"));
        assert!(sql.contains("ORDER BY TX_DATETIME DESC"));
        assert!(sql.contains("LIMIT 100"));
        assert_eq!(params, vec![Value::String("203.0.113.5".into())]);
    }

    #[test]
    fn entity_type_picks_the_filter_column() {
        let query = TransactionQuery::new(
            TableRef::transactions_default(),
            EntityType::Email,
            "a@b.c",
            30,
            50,
        );
        let (sql, _) = query.render();
        assert!(sql.contains("WHERE EMAIL = ?"));
        assert!(sql.contains("-30"));
    }

    #[tokio::test]
    async fn warehouse_tool_caps_rows_at_limit() {
        let rows: Vec<Value> = (0..20).map(|i| json!({"TX_ID_KEY": i})).collect();
        let tool = WarehouseTool::new(
            Arc::new(StaticWarehouse::with_rows(rows)),
            Arc::new(QueryMonitor::default()),
            100,
        );
        let output = tool
            .invoke(
                json!({"query": "SELECT 1", "limit": 5}),
                &ToolContext::unbounded(),
            )
            .await
            .unwrap();
        let ToolOutput::Json(value) = output else {
            panic!("expected json output");
        };
        assert_eq!(value["row_count"], 5);
        assert_eq!(value["rows"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn monitor_counts_slow_queries() {
        let monitor = QueryMonitor::new(Duration::from_millis(10));
        monitor.record(Duration::from_millis(1), 3);
        monitor.record(Duration::from_millis(50), 7);
        let stats = monitor.stats();
        assert_eq!(stats.executed, 2);
        assert_eq!(stats.total_rows, 10);
        assert_eq!(stats.slow, 1);
    }
}
