//! Migration orchestrator - main workflow coordinator.
//!
//! Walks the configured sources and their tables in order. Each table is its
//! own unit of work: a failure is recorded against that table and the run
//! moves on to the next one.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{Config, SourceConnectionConfig, SourceTableConfig};
use crate::error::Result;
use crate::ident::sanitize;
use crate::query::build_select;
use crate::resolve::{ensure_unique, resolve_columns, ColumnDescriptor};
use crate::source::{MssqlConnector, SourceConnection, SourceConnector};
use crate::target::{Destination, DestinationConnector, PgConnector};
use crate::transfer::TransferEngine;

/// Final state of one configured table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableStatus {
    /// Every row was copied and committed.
    Completed,
    /// The source reported no columns for the table.
    SkippedEmpty,
    /// The table or its source is disabled.
    SkippedDisabled,
    /// The table failed; the destination keeps no partial data.
    Failed { cause: String },
}

/// Outcome of one configured table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub source: String,
    pub schema: String,
    pub table: String,
    pub target_table: String,
    pub rows: u64,
    #[serde(flatten)]
    pub status: TableStatus,
}

impl TransferResult {
    fn new(source: &SourceConnectionConfig, table: &SourceTableConfig, status: TableStatus) -> Self {
        Self {
            source: source.name.clone(),
            schema: table.schema.clone(),
            table: table.name.clone(),
            target_table: sanitize(&table.name),
            rows: 0,
            status,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, TableStatus::Failed { .. })
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables copied successfully.
    pub tables_completed: usize,

    /// Tables skipped (disabled or without columns).
    pub tables_skipped: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Total rows transferred.
    pub rows_transferred: u64,

    /// Per-table outcomes in configuration order.
    pub results: Vec<TransferResult>,
}

impl RunReport {
    fn new(run_id: String, started_at: DateTime<Utc>, results: Vec<TransferResult>) -> Self {
        let completed_at = Utc::now();
        let count = |pred: fn(&TableStatus) -> bool| results.iter().filter(|r| pred(&r.status)).count();
        Self {
            run_id,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tables_completed: count(|s| matches!(s, TableStatus::Completed)),
            tables_skipped: count(|s| {
                matches!(s, TableStatus::SkippedEmpty | TableStatus::SkippedDisabled)
            }),
            tables_failed: count(|s| matches!(s, TableStatus::Failed { .. })),
            rows_transferred: results.iter().map(|r| r.rows).sum(),
            results,
        }
    }

    /// Whether any table failed.
    pub fn has_failures(&self) -> bool {
        self.tables_failed > 0
    }

    /// Source-qualified names of the failed tables.
    pub fn failed_tables(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.is_failed())
            .map(|r| format!("{}:{}.{}", r.source, r.schema, r.table))
            .collect()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// What a dry run would do for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanStatus {
    Ready,
    SkippedEmpty,
    SkippedDisabled,
    Failed { cause: String },
}

/// Dry-run plan entry for one configured table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePlan {
    pub source: String,
    pub schema: String,
    pub table: String,
    pub target_table: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(flatten)]
    pub status: PlanStatus,
}

/// Reachability of one configured endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub name: String,
    pub address: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`Orchestrator::health_check`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub destination: EndpointHealth,
    pub sources: Vec<EndpointHealth>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.destination.connected && self.sources.iter().all(|s| s.connected)
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    sources: Box<dyn SourceConnector>,
    destination: Box<dyn DestinationConnector>,
    engine: TransferEngine,
}

impl Orchestrator {
    /// Create an orchestrator over SQL Server sources and a PostgreSQL destination.
    pub fn new(config: Config) -> Self {
        Self::with_connectors(config, Box::new(MssqlConnector::new()), Box::new(PgConnector::new()))
    }

    /// Create an orchestrator with explicit connectors.
    pub fn with_connectors(
        config: Config,
        sources: Box<dyn SourceConnector>,
        destination: Box<dyn DestinationConnector>,
    ) -> Self {
        let engine = TransferEngine::new(config.transfer);
        Self {
            config,
            sources,
            destination,
            engine,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every configured table.
    ///
    /// Only a destination that cannot be opened fails the run as a whole;
    /// every other problem is recorded on the affected tables.
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        let mut destination = self.destination.connect(&self.config.destination).await?;

        let mut results = Vec::new();
        for source in &self.config.sources {
            self.run_source(source, destination.as_mut(), &mut results).await;
        }

        if let Err(e) = destination.close().await {
            warn!("Failed to close destination connection: {}", e);
        }

        let report = RunReport::new(run_id, started_at, results);
        info!(
            "Run {} finished: {} completed, {} skipped, {} failed, {} rows in {:.1}s",
            report.run_id,
            report.tables_completed,
            report.tables_skipped,
            report.tables_failed,
            report.rows_transferred,
            report.duration_seconds
        );
        Ok(report)
    }

    async fn run_source(
        &self,
        source: &SourceConnectionConfig,
        destination: &mut dyn Destination,
        results: &mut Vec<TransferResult>,
    ) {
        if !source.enabled {
            info!("[{}] source disabled, skipping {} tables", source.name, source.tables.len());
            results.extend(
                source
                    .tables
                    .iter()
                    .map(|t| TransferResult::new(source, t, TableStatus::SkippedDisabled)),
            );
            return;
        }

        let mut conn = match self.sources.connect(source).await {
            Ok(conn) => conn,
            Err(e) => {
                error!("[{}] connection failed: {}", source.name, e);
                let cause = e.to_string();
                results.extend(source.tables.iter().map(|t| {
                    let status = if t.enabled {
                        TableStatus::Failed { cause: cause.clone() }
                    } else {
                        TableStatus::SkippedDisabled
                    };
                    TransferResult::new(source, t, status)
                }));
                return;
            }
        };

        for table in &source.tables {
            let result = self
                .migrate_table(source, table, conn.as_mut(), destination)
                .await;
            results.push(result);
        }

        if let Err(e) = conn.close().await {
            warn!("[{}] failed to close source connection: {}", source.name, e);
        }
    }

    async fn migrate_table(
        &self,
        source: &SourceConnectionConfig,
        table: &SourceTableConfig,
        conn: &mut dyn SourceConnection,
        destination: &mut dyn Destination,
    ) -> TransferResult {
        let label = format!("{}:{}", source.name, table.full_name());
        let mut result = TransferResult::new(source, table, TableStatus::Completed);

        if !table.enabled {
            info!("[{}] disabled, skipping", label);
            result.status = TableStatus::SkippedDisabled;
            return result;
        }

        match self.copy_table(table, &label, &result.target_table, conn, destination).await {
            Ok(Some(rows)) => result.rows = rows,
            Ok(None) => result.status = TableStatus::SkippedEmpty,
            Err(e) => {
                error!("[{}] failed: {}", label, e);
                result.status = TableStatus::Failed {
                    cause: e.to_string(),
                };
            }
        }
        result
    }

    /// Returns `None` when the source has no columns for the table.
    async fn copy_table(
        &self,
        table: &SourceTableConfig,
        label: &str,
        target: &str,
        conn: &mut dyn SourceConnection,
        destination: &mut dyn Destination,
    ) -> Result<Option<u64>> {
        table.validate()?;

        let metadata = conn.column_metadata(&table.schema, &table.name).await?;
        let resolution = resolve_columns(label, metadata);
        if resolution.is_empty() {
            warn!("[{}] no columns found, skipping", label);
            return Ok(None);
        }
        let columns = resolution.into_columns();
        ensure_unique(&columns)?;

        let sql = build_select(table, &columns, Local::now().naive_local())?;

        destination.drop_table(target).await?;

        info!("[{}] query issued: {}", label, sql);
        let mut cursor = conn.query(&sql).await?;
        let rows = self
            .engine
            .transfer(cursor.as_mut(), destination, target, &columns)
            .await?;
        Ok(Some(rows))
    }

    /// Resolve columns and build queries without touching the destination.
    pub async fn plan(&self) -> Result<Vec<TablePlan>> {
        let now = Local::now().naive_local();
        let mut plans = Vec::new();

        for source in &self.config.sources {
            let entry = |table: &SourceTableConfig, status: PlanStatus| TablePlan {
                source: source.name.clone(),
                schema: table.schema.clone(),
                table: table.name.clone(),
                target_table: sanitize(&table.name),
                columns: Vec::new(),
                query: None,
                status,
            };

            if !source.enabled {
                plans.extend(
                    source
                        .tables
                        .iter()
                        .map(|t| entry(t, PlanStatus::SkippedDisabled)),
                );
                continue;
            }

            let mut conn = match self.sources.connect(source).await {
                Ok(conn) => conn,
                Err(e) => {
                    let cause = e.to_string();
                    plans.extend(source.tables.iter().map(|t| {
                        let status = if t.enabled {
                            PlanStatus::Failed { cause: cause.clone() }
                        } else {
                            PlanStatus::SkippedDisabled
                        };
                        entry(t, status)
                    }));
                    continue;
                }
            };

            for table in &source.tables {
                if !table.enabled {
                    plans.push(entry(table, PlanStatus::SkippedDisabled));
                    continue;
                }
                let label = format!("{}:{}", source.name, table.full_name());
                let plan = match plan_table(table, &label, conn.as_mut(), now).await {
                    Ok(Some((columns, query))) => TablePlan {
                        columns,
                        query: Some(query),
                        ..entry(table, PlanStatus::Ready)
                    },
                    Ok(None) => entry(table, PlanStatus::SkippedEmpty),
                    Err(e) => entry(table, PlanStatus::Failed { cause: e.to_string() }),
                };
                plans.push(plan);
            }

            if let Err(e) = conn.close().await {
                warn!("[{}] failed to close source connection: {}", source.name, e);
            }
        }

        Ok(plans)
    }

    /// Open and close every enabled source and the destination.
    pub async fn health_check(&self) -> HealthReport {
        let destination = match self.destination.connect(&self.config.destination).await {
            Ok(dest) => {
                if let Err(e) = dest.close().await {
                    warn!("Failed to close destination connection: {}", e);
                }
                endpoint("destination", self.config.destination.address(), None)
            }
            Err(e) => endpoint("destination", self.config.destination.address(), Some(e.to_string())),
        };

        let mut sources = Vec::new();
        for source in self.config.sources.iter().filter(|s| s.enabled) {
            let error = match self.sources.connect(source).await {
                Ok(conn) => conn.close().await.err().map(|e| e.to_string()),
                Err(e) => Some(e.to_string()),
            };
            sources.push(endpoint(&source.name, source.address(), error));
        }

        HealthReport {
            destination,
            sources,
        }
    }
}

async fn plan_table(
    table: &SourceTableConfig,
    label: &str,
    conn: &mut dyn SourceConnection,
    now: chrono::NaiveDateTime,
) -> Result<Option<(Vec<ColumnDescriptor>, String)>> {
    table.validate()?;
    let metadata = conn.column_metadata(&table.schema, &table.name).await?;
    let resolution = resolve_columns(label, metadata);
    if resolution.is_empty() {
        return Ok(None);
    }
    let columns = resolution.into_columns();
    ensure_unique(&columns)?;
    let query = build_select(table, &columns, now)?;
    Ok(Some((columns, query)))
}

fn endpoint(name: &str, address: String, error: Option<String>) -> EndpointHealth {
    EndpointHealth {
        name: name.to_string(),
        address,
        connected: error.is_none(),
        error,
    }
}
