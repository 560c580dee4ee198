//! Destination database access.
//!
//! A run opens one [`Destination`] through a [`DestinationConnector`]. Each
//! table is dropped in its own committed unit, then loaded inside a single
//! [`LoadTransaction`].

mod postgres;

pub use postgres::{PgConnector, PgDestination};

use async_trait::async_trait;

use crate::config::DestinationConfig;
use crate::error::Result;
use crate::value::{Batch, SqlNullType};

/// Opens the destination connection for a run.
#[async_trait]
pub trait DestinationConnector: Send + Sync {
    async fn connect(&self, config: &DestinationConfig) -> Result<Box<dyn Destination>>;
}

/// An open destination connection.
#[async_trait]
pub trait Destination: Send {
    /// Drop `table` if it exists and commit immediately.
    ///
    /// Dropping a table that does not exist is not an error.
    async fn drop_table(&mut self, table: &str) -> Result<()>;

    /// Start the transaction a table is loaded in.
    async fn begin<'a>(&'a mut self) -> Result<Box<dyn LoadTransaction + 'a>>;

    /// Release the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// The transaction one table's batches are appended in.
#[async_trait]
pub trait LoadTransaction: Send {
    /// Append a batch, creating the table from the batch's column types on
    /// the first call. Returns the number of rows written.
    async fn append(&mut self, table: &str, batch: &Batch) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// PostgreSQL column type for a value type.
pub fn pg_type(ty: SqlNullType) -> &'static str {
    match ty {
        SqlNullType::Bool => "boolean",
        SqlNullType::I16 => "smallint",
        SqlNullType::I32 => "integer",
        SqlNullType::I64 => "bigint",
        SqlNullType::F32 => "real",
        SqlNullType::F64 => "double precision",
        SqlNullType::String => "text",
        SqlNullType::Bytes => "bytea",
        SqlNullType::Uuid => "uuid",
        SqlNullType::Decimal => "numeric",
        SqlNullType::DateTime => "timestamp",
        SqlNullType::DateTimeOffset => "timestamptz",
        SqlNullType::Date => "date",
        SqlNullType::Time => "time",
    }
}
