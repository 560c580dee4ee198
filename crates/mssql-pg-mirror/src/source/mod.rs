//! Source database access.
//!
//! The orchestrator only sees these traits; [`MssqlConnector`] is the
//! production implementation over tiberius.

mod mssql;

pub use mssql::{MssqlConnection, MssqlConnector};

use async_trait::async_trait;

use crate::config::SourceConnectionConfig;
use crate::error::Result;
use crate::resolve::ColumnMeta;
use crate::value::SqlValue;

/// Opens connections to a source server.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Open one connection for the given source.
    async fn connect(&self, config: &SourceConnectionConfig) -> Result<Box<dyn SourceConnection>>;
}

/// One open source connection, reused for every table of a source.
#[async_trait]
pub trait SourceConnection: Send {
    /// Catalog columns of a table as `(name, data_type)` in ordinal order.
    ///
    /// An empty result means the table does not exist or is not visible.
    async fn column_metadata(&mut self, schema: &str, table: &str) -> Result<Vec<ColumnMeta>>;

    /// Run a projection query and return a cursor over its rows.
    ///
    /// The cursor borrows the connection until it is dropped.
    async fn query<'a>(&'a mut self, sql: &str) -> Result<Box<dyn RowCursor + 'a>>;

    /// Close the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Batch-fetching cursor over a query result.
#[async_trait]
pub trait RowCursor: Send {
    /// Fetch up to `max_rows` rows. An empty batch means the cursor is exhausted.
    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Vec<SqlValue>>>;
}
