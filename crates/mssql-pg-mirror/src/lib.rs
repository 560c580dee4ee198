//! # mssql-pg-mirror
//!
//! Mirrors configured SQL Server tables into PostgreSQL.
//!
//! Every run replaces the destination tables it touches:
//!
//! - **Column resolution** from the source catalog, skipping binary columns
//! - **Per-table filters** (`where`, `order_by`, `limit`, recency window)
//! - **Chunked streaming** from a source cursor into PostgreSQL COPY
//! - **Drop and reload** so a re-run after a failure is always safe
//!
//! Each table is its own unit of work; one failing table does not stop the
//! others.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_pg_mirror::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mssql_pg_mirror::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let report = Orchestrator::new(config).run().await?;
//!     println!("Mirrored {} rows", report.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ident;
pub mod orchestrator;
pub mod query;
pub mod resolve;
pub mod source;
pub mod target;
pub mod transfer;
pub mod value;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Config, DestinationConfig, SourceConnectionConfig, SourceTableConfig, TransferSettings};
pub use error::{MigrateError, Result};
pub use orchestrator::{HealthReport, Orchestrator, RunReport, TablePlan, TableStatus, TransferResult};
pub use resolve::{ColumnDescriptor, Resolution};
pub use source::{MssqlConnector, RowCursor, SourceConnection, SourceConnector};
pub use target::{Destination, DestinationConnector, LoadTransaction, PgConnector, PgDestination};
pub use transfer::TransferEngine;
pub use value::{Batch, SqlNullType, SqlValue};
