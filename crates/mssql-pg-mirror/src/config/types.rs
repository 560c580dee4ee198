//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rows fetched from the source and appended to the target per batch.
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Destination database (PostgreSQL). Also accepted as `postgres:`.
    #[serde(alias = "postgres")]
    pub destination: DestinationConfig,

    /// Source connections, processed in order.
    #[serde(default)]
    pub sources: Vec<SourceConnectionConfig>,

    /// Engine-level transfer settings.
    #[serde(default)]
    pub transfer: TransferSettings,
}

/// Engine-level transfer settings shared by every table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Rows per fetch/append batch (default: 50,000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Source database (SQL Server) connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConnectionConfig {
    /// Name used in logs and results.
    pub name: String,

    /// Skip every table of this source when false (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database host.
    pub host: String,

    /// Named instance, resolved through the SQL Browser service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Use integrated (Windows) authentication instead of a SQL login.
    #[serde(default)]
    pub trusted_connection: bool,

    /// SQL login name.
    #[serde(default, alias = "user")]
    pub username: String,

    /// SQL login password.
    #[serde(default)]
    pub password: String,

    /// Encrypt the connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust the server certificate without validation (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Tables to copy, in order.
    #[serde(default)]
    pub tables: Vec<SourceTableConfig>,
}

impl fmt::Debug for SourceConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConnectionConfig")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("instance", &self.instance)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("trusted_connection", &self.trusted_connection)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("tables", &self.tables)
            .finish()
    }
}

/// Destination database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Per-table copy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTableConfig {
    /// Source schema (default: "dbo").
    #[serde(default = "default_dbo_schema")]
    pub schema: String,

    /// Source table name. Left empty when missing so the table fails on its own.
    #[serde(default)]
    pub name: String,

    /// Skip this table when false (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cap on the total number of rows read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    /// Row filter: one predicate, or a list ANDed together.
    #[serde(rename = "where", default, skip_serializing_if = "Clause::is_absent")]
    pub filter: Clause,

    /// Ordering: one clause, or a list of column expressions.
    #[serde(default, skip_serializing_if = "Clause::is_absent")]
    pub order_by: Clause,

    /// Date/time column used for the recency cutoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_column: Option<String>,

    /// Only copy rows whose `date_column` is within this many days of now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_days: Option<u32>,
}

impl SourceTableConfig {
    /// Create a table config with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: default_dbo_schema(),
            name: name.into(),
            enabled: true,
            limit: None,
            filter: Clause::Absent,
            order_by: Clause::Absent,
            date_column: None,
            lookback_days: None,
        }
    }

    /// Get the fully qualified source table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// The recency cutoff column and window, when both are configured.
    pub fn recency(&self) -> Option<(&str, u32)> {
        match (&self.date_column, self.lookback_days) {
            (Some(column), Some(days)) => Some((column.as_str(), days)),
            _ => None,
        }
    }
}

/// A `where`/`order_by` value: absent, a single verbatim string, or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<ClauseValue>", into = "Option<ClauseValue>")]
pub enum Clause {
    #[default]
    Absent,
    Single(String),
    List(Vec<String>),
}

impl Clause {
    pub fn is_absent(&self) -> bool {
        matches!(self, Clause::Absent)
    }
}

/// YAML shape of a [`Clause`]: a string or a list of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClauseValue {
    Single(String),
    List(Vec<String>),
}

impl From<Option<ClauseValue>> for Clause {
    fn from(value: Option<ClauseValue>) -> Self {
        match value {
            None => Clause::Absent,
            Some(ClauseValue::Single(s)) => Clause::Single(s),
            Some(ClauseValue::List(items)) => Clause::List(items),
        }
    }
}

impl From<Clause> for Option<ClauseValue> {
    fn from(clause: Clause) -> Self {
        match clause {
            Clause::Absent => None,
            Clause::Single(s) => Some(ClauseValue::Single(s)),
            Clause::List(items) => Some(ClauseValue::List(items)),
        }
    }
}

// Default value functions for serde
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_pg_port() -> u16 {
    5432
}

fn default_dbo_schema() -> String {
    "dbo".to_string()
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_true() -> bool {
    true
}
