//! PostgreSQL destination: drop, create from the first batch, COPY in.

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio_postgres::{Config as PgConfig, NoTls, Transaction};
use tracing::{debug, info};

use super::{pg_type, Destination, DestinationConnector, LoadTransaction};
use crate::config::DestinationConfig;
use crate::error::{MigrateError, Result};
use crate::ident::{qualify_pg, quote_pg};
use crate::value::{Batch, SqlValue};

/// Rows buffered before a COPY chunk is sent.
const COPY_FLUSH_ROWS: usize = 10_000;

/// Opens a [`PgDestination`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl PgConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DestinationConnector for PgConnector {
    async fn connect(&self, config: &DestinationConfig) -> Result<Box<dyn Destination>> {
        Ok(Box::new(PgDestination::connect(config).await?))
    }
}

/// PostgreSQL destination holding a single connection for the whole run.
pub struct PgDestination {
    pool: Pool,
    client: Object,
    schema: String,
    schema_ready: bool,
}

impl PgDestination {
    /// Connect and check the connection with a trivial query.
    pub async fn connect(config: &DestinationConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(1)
            .build()
            .map_err(|e| MigrateError::pool(e.to_string(), "building PostgreSQL pool"))?;

        let client = pool.get().await.map_err(|e| {
            MigrateError::pool(e.to_string(), format!("connecting to {}", config.address()))
        })?;
        client.simple_query("SELECT 1").await?;

        info!("Connected to PostgreSQL: {}", config.address());

        Ok(Self {
            pool,
            client,
            schema: config.schema.clone(),
            schema_ready: false,
        })
    }

    async fn ensure_schema(&mut self) -> Result<()> {
        if !self.schema_ready {
            let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_pg(&self.schema)?);
            self.client.batch_execute(&sql).await?;
            self.schema_ready = true;
        }
        Ok(())
    }
}

#[async_trait]
impl Destination for PgDestination {
    async fn drop_table(&mut self, table: &str) -> Result<()> {
        self.ensure_schema().await?;
        let sql = drop_table_sql(&self.schema, table)?;
        self.client.batch_execute(&sql).await?;
        debug!("dropped {}.{} if present", self.schema, table);
        Ok(())
    }

    async fn begin<'a>(&'a mut self) -> Result<Box<dyn LoadTransaction + 'a>> {
        let schema = self.schema.clone();
        let client: &mut tokio_postgres::Client = &mut self.client;
        let txn = client.transaction().await?;
        Ok(Box::new(PgTransaction {
            txn,
            schema,
            created: HashSet::new(),
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let PgDestination { pool, client, .. } = *self;
        drop(client);
        pool.close();
        debug!("PostgreSQL connection closed");
        Ok(())
    }
}

/// One table load. Dropping it without commit rolls back.
struct PgTransaction<'a> {
    txn: Transaction<'a>,
    schema: String,
    created: HashSet<String>,
}

#[async_trait]
impl LoadTransaction for PgTransaction<'_> {
    async fn append(&mut self, table: &str, batch: &Batch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let qualified = qualify_pg(&self.schema, table)?;
        if !self.created.contains(table) {
            let ddl = create_table_ddl(&qualified, batch)?;
            self.txn.batch_execute(&ddl).await?;
            debug!("created {}", qualified);
            self.created.insert(table.to_string());
        }

        let col_list = batch
            .columns
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let copy_stmt = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
            qualified, col_list
        );

        let sink = self.txn.copy_in(&copy_stmt).await?;
        futures::pin_mut!(sink);

        let mut buf = BytesMut::with_capacity(1024 * 1024);
        let row_count = batch.len();
        for (i, row) in batch.rows.iter().enumerate() {
            write_copy_row(&mut buf, row);
            if (i + 1) % COPY_FLUSH_ROWS == 0 || i + 1 == row_count {
                sink.send(buf.split().freeze()).await?;
            }
        }

        let copied = sink.finish().await?;
        Ok(copied)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}

/// Drop statement for a destination table; a missing table is not an error.
fn drop_table_sql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("DROP TABLE IF EXISTS {}", qualify_pg(schema, table)?))
}

/// `CREATE TABLE` for a batch, typed from its first non-NULL values.
fn create_table_ddl(qualified: &str, batch: &Batch) -> Result<String> {
    let cols = batch
        .columns
        .iter()
        .zip(batch.column_types())
        .map(|(name, ty)| Ok(format!("{} {}", quote_pg(name)?, pg_type(ty))))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified,
        cols.join(", ")
    ))
}

fn write_copy_row(buf: &mut BytesMut, row: &[SqlValue]) {
    for (j, value) in row.iter().enumerate() {
        if j > 0 {
            buf.put_u8(b'\t');
        }
        buf.extend_from_slice(copy_text(value).as_bytes());
    }
    buf.put_u8(b'\n');
}

/// Render a value in COPY text format.
fn copy_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Null(_) => "\\N".to_string(),
        SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        SqlValue::I16(n) => n.to_string(),
        SqlValue::I32(n) => n.to_string(),
        SqlValue::I64(n) => n.to_string(),
        SqlValue::F32(n) => float_text(f64::from(*n), n.to_string()),
        SqlValue::F64(n) => float_text(*n, n.to_string()),
        SqlValue::String(s) => escape_copy_text(s),
        SqlValue::Bytes(b) => format!("\\\\x{}", hex::encode(b)),
        SqlValue::Uuid(u) => u.to_string(),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        SqlValue::DateTimeOffset(dt) => dt.to_rfc3339(),
        SqlValue::Date(d) => d.to_string(),
        SqlValue::Time(t) => t.to_string(),
    }
}

fn float_text(value: f64, finite: String) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        finite
    }
}

/// Escape backslash, tab, newline and carriage return for COPY text.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}
