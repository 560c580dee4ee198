//! SQL Server source over tiberius.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Query, Row, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use super::{RowCursor, SourceConnection, SourceConnector};
use crate::config::SourceConnectionConfig;
use crate::error::{MigrateError, Result};
use crate::resolve::ColumnMeta;
use crate::value::{SqlNullType, SqlValue};

const COLUMNS_QUERY: &str = r#"
    SELECT COLUMN_NAME, DATA_TYPE
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
    ORDER BY ORDINAL_POSITION
"#;

/// Connects to SQL Server with tiberius, one TCP connection per source.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlConnector;

impl MssqlConnector {
    pub fn new() -> Self {
        Self
    }

    fn build_config(source: &SourceConnectionConfig) -> Result<Config> {
        let mut config = Config::new();
        config.host(&source.host);
        config.port(source.port);
        config.database(&source.database);
        if let Some(instance) = &source.instance {
            config.instance_name(instance);
        }
        config.authentication(authentication(source)?);

        if source.encrypt {
            if source.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        Ok(config)
    }
}

#[cfg(windows)]
fn authentication(source: &SourceConnectionConfig) -> Result<AuthMethod> {
    if source.trusted_connection {
        return Ok(AuthMethod::Integrated);
    }
    Ok(AuthMethod::sql_server(&source.username, &source.password))
}

#[cfg(not(windows))]
fn authentication(source: &SourceConnectionConfig) -> Result<AuthMethod> {
    if source.trusted_connection {
        return Err(MigrateError::Config(format!(
            "source '{}': trusted_connection is only supported on Windows",
            source.name
        )));
    }
    Ok(AuthMethod::sql_server(&source.username, &source.password))
}

#[async_trait]
impl SourceConnector for MssqlConnector {
    async fn connect(&self, source: &SourceConnectionConfig) -> Result<Box<dyn SourceConnection>> {
        let config = Self::build_config(source)?;

        // Named instances resolve their port through the SQL Browser service.
        let tcp = if source.instance.is_some() {
            TcpStream::connect_named(&config).await?
        } else {
            TcpStream::connect(config.get_addr()).await.map_err(|e| {
                tiberius::error::Error::Io {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            })?
        };
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write()).await?;
        info!("[{}] connected to MSSQL: {}", source.name, source.address());

        Ok(Box::new(MssqlConnection {
            name: source.name.clone(),
            client,
        }))
    }
}

/// An open SQL Server connection.
pub struct MssqlConnection {
    name: String,
    client: Client<Compat<TcpStream>>,
}

#[async_trait]
impl SourceConnection for MssqlConnection {
    async fn column_metadata(&mut self, schema: &str, table: &str) -> Result<Vec<ColumnMeta>> {
        let mut query = Query::new(COLUMNS_QUERY);
        query.bind(schema.to_string());
        query.bind(table.to_string());

        let rows = query
            .query(&mut self.client)
            .await?
            .into_first_result()
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: Option<&str> = row.try_get(0)?;
            let data_type: Option<&str> = row.try_get(1)?;
            columns.push(ColumnMeta::new(
                name.unwrap_or_default(),
                data_type.unwrap_or_default(),
            ));
        }

        debug!("[{}] loaded {} columns for {}.{}", self.name, columns.len(), schema, table);
        Ok(columns)
    }

    async fn query<'a>(&'a mut self, sql: &str) -> Result<Box<dyn RowCursor + 'a>> {
        let stream = self.client.simple_query(sql).await?.into_row_stream();
        Ok(Box::new(MssqlCursor { stream }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let MssqlConnection { name, client } = *self;
        client.close().await?;
        debug!("[{}] connection closed", name);
        Ok(())
    }
}

/// Streams rows off a running query, a batch at a time.
struct MssqlCursor<'a> {
    stream: BoxStream<'a, tiberius::Result<Row>>,
}

#[async_trait]
impl RowCursor for MssqlCursor<'_> {
    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Vec<SqlValue>>> {
        let mut rows = Vec::with_capacity(max_rows.min(4096));
        while rows.len() < max_rows {
            match self.stream.try_next().await? {
                Some(row) => rows.push(convert_row(row)?),
                None => break,
            }
        }
        Ok(rows)
    }
}

fn convert_row(row: Row) -> Result<Vec<SqlValue>> {
    row.into_iter().map(|data| convert_value(&data)).collect()
}

/// Map a wire value to [`SqlValue`], keeping the type on NULLs.
fn convert_value(data: &ColumnData<'static>) -> Result<SqlValue> {
    let value = match data {
        ColumnData::Bit(v) => v.map(SqlValue::Bool).unwrap_or(SqlValue::Null(SqlNullType::Bool)),
        ColumnData::U8(v) => v
            .map(|v| SqlValue::I16(i16::from(v)))
            .unwrap_or(SqlValue::Null(SqlNullType::I16)),
        ColumnData::I16(v) => v.map(SqlValue::I16).unwrap_or(SqlValue::Null(SqlNullType::I16)),
        ColumnData::I32(v) => v.map(SqlValue::I32).unwrap_or(SqlValue::Null(SqlNullType::I32)),
        ColumnData::I64(v) => v.map(SqlValue::I64).unwrap_or(SqlValue::Null(SqlNullType::I64)),
        ColumnData::F32(v) => v.map(SqlValue::F32).unwrap_or(SqlValue::Null(SqlNullType::F32)),
        ColumnData::F64(v) => v.map(SqlValue::F64).unwrap_or(SqlValue::Null(SqlNullType::F64)),
        ColumnData::Guid(v) => v.map(SqlValue::Uuid).unwrap_or(SqlValue::Null(SqlNullType::Uuid)),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| SqlValue::String(s.to_string()))
            .unwrap_or(SqlValue::Null(SqlNullType::String)),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| SqlValue::String(x.clone().into_owned().into_string()))
            .unwrap_or(SqlValue::Null(SqlNullType::String)),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| SqlValue::Bytes(b.to_vec()))
            .unwrap_or(SqlValue::Null(SqlNullType::Bytes)),
        ColumnData::Numeric(v) => match v {
            Some(n) => match Decimal::try_from_i128_with_scale(n.value(), u32::from(n.scale())) {
                Ok(d) => SqlValue::Decimal(d),
                // Wider than 28 digits: go straight to float.
                Err(_) => SqlValue::F64(f64::from(*n)),
            },
            None => SqlValue::Null(SqlNullType::Decimal),
        },
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?
                .map(SqlValue::DateTime)
                .unwrap_or(SqlValue::Null(SqlNullType::DateTime))
        }
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)?
            .map(SqlValue::DateTimeOffset)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTimeOffset)),
        ColumnData::Date(_) => NaiveDate::from_sql(data)?
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null(SqlNullType::Date)),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null(SqlNullType::Time)),
    };
    Ok(value)
}
