//! In-memory source and destination doubles for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::{DestinationConfig, SourceConnectionConfig};
use crate::error::{MigrateError, Result};
use crate::resolve::ColumnMeta;
use crate::source::{RowCursor, SourceConnection, SourceConnector};
use crate::target::{Destination, DestinationConnector, LoadTransaction};
use crate::value::{Batch, SqlValue};

/// Cursor over a fixed row set.
pub struct VecCursor {
    rows: std::vec::IntoIter<Vec<SqlValue>>,
    pub fetches: usize,
    pub fail_on_fetch: Option<usize>,
}

impl VecCursor {
    pub fn new(rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            rows: rows.into_iter(),
            fetches: 0,
            fail_on_fetch: None,
        }
    }
}

#[async_trait]
impl RowCursor for VecCursor {
    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Vec<SqlValue>>> {
        self.fetches += 1;
        if self.fail_on_fetch == Some(self.fetches) {
            return Err(MigrateError::Config("cursor failed mid-read".into()));
        }
        Ok(self.rows.by_ref().take(max_rows).collect())
    }
}

/// A table served by [`MockSource`]: catalog columns and full rows.
#[derive(Debug, Clone, Default)]
pub struct MockTable {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<SqlValue>>,
    pub fail_query: bool,
}

impl MockTable {
    pub fn new(columns: &[(&str, &str)], rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: columns.iter().map(|(n, t)| ColumnMeta::new(*n, *t)).collect(),
            rows,
            fail_query: false,
        }
    }
}

/// Record of calls made against the mock source.
#[derive(Debug, Default)]
pub struct SourceLog {
    pub connects: Vec<String>,
    pub queries: Vec<String>,
    pub closes: usize,
}

/// Source connector serving [`MockTable`]s keyed by `(source, "schema.table")`.
#[derive(Clone, Default)]
pub struct MockSource {
    tables: Arc<Mutex<HashMap<(String, String), MockTable>>>,
    unreachable: Arc<Mutex<HashSet<String>>>,
    pub log: Arc<Mutex<SourceLog>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, source: &str, full_name: &str, table: MockTable) -> Self {
        self.tables
            .lock()
            .unwrap()
            .insert((source.to_string(), full_name.to_string()), table);
        self
    }

    pub fn unreachable(self, source: &str) -> Self {
        self.unreachable.lock().unwrap().insert(source.to_string());
        self
    }

    pub fn connects(&self) -> Vec<String> {
        self.log.lock().unwrap().connects.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.log.lock().unwrap().queries.clone()
    }
}

#[async_trait]
impl SourceConnector for MockSource {
    async fn connect(&self, config: &SourceConnectionConfig) -> Result<Box<dyn SourceConnection>> {
        self.log.lock().unwrap().connects.push(config.name.clone());
        if self.unreachable.lock().unwrap().contains(&config.name) {
            return Err(MigrateError::pool("connection refused", config.address()));
        }
        let tables = self
            .tables
            .lock()
            .unwrap()
            .iter()
            .filter(|((source, _), _)| source == &config.name)
            .map(|((_, name), table)| (name.clone(), table.clone()))
            .collect();
        Ok(Box::new(MockConnection {
            tables,
            log: Arc::clone(&self.log),
        }))
    }
}

struct MockConnection {
    tables: HashMap<String, MockTable>,
    log: Arc<Mutex<SourceLog>>,
}

#[async_trait]
impl SourceConnection for MockConnection {
    async fn column_metadata(&mut self, schema: &str, table: &str) -> Result<Vec<ColumnMeta>> {
        Ok(self
            .tables
            .get(&format!("{}.{}", schema, table))
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn query<'a>(&'a mut self, sql: &str) -> Result<Box<dyn RowCursor + 'a>> {
        self.log.lock().unwrap().queries.push(sql.to_string());
        let (top, selected, from) = parse_select(sql);
        let table = self
            .tables
            .get(&from)
            .ok_or_else(|| MigrateError::Config(format!("Invalid object name '{}'", from)))?;
        if table.fail_query {
            return Err(MigrateError::Config(format!("query failed on {}", from)));
        }

        let positions: Vec<usize> = selected
            .iter()
            .map(|name| {
                table
                    .columns
                    .iter()
                    .position(|c| &c.name == name)
                    .ok_or_else(|| MigrateError::Config(format!("Invalid column name '{}'", name)))
            })
            .collect::<Result<_>>()?;

        let rows: Vec<Vec<SqlValue>> = table
            .rows
            .iter()
            .take(top.unwrap_or(usize::MAX))
            .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Box::new(VecCursor::new(rows)))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Split `SELECT [TOP n ]cols FROM [schema].[table]...` into its parts.
fn parse_select(sql: &str) -> (Option<usize>, Vec<String>, String) {
    let rest = sql.strip_prefix("SELECT ").unwrap_or(sql);
    let (top, rest) = match rest.strip_prefix("TOP ") {
        Some(after) => {
            let (n, tail) = after.split_once(' ').unwrap();
            (Some(n.parse().unwrap()), tail)
        }
        None => (None, rest),
    };
    let (cols, tail) = rest.split_once(" FROM ").unwrap();
    let unquote = |s: &str| s.trim_start_matches('[').trim_end_matches(']').replace("]]", "]");
    let columns = cols.split("], [").map(unquote).collect();
    let table_ref = tail.split(" WHERE ").next().unwrap();
    let table_ref = table_ref.split(" ORDER BY ").next().unwrap();
    let (schema, name) = table_ref.split_once("].[").unwrap();
    (top, columns, format!("{}.{}", unquote(schema), unquote(name)))
}

/// Shared state of [`MockDestination`].
#[derive(Debug, Default)]
pub struct DestinationState {
    /// Committed tables: destination name to (columns, rows).
    pub tables: HashMap<String, (Vec<String>, Vec<Vec<SqlValue>>)>,
    /// Ordered call log, e.g. `drop t`, `begin`, `append t 3`, `commit`.
    pub events: Vec<String>,
    pub connects: usize,
    pub closes: usize,
    /// Fail `append` for these destination tables.
    pub fail_append: HashSet<String>,
}

/// Destination that keeps committed tables in memory.
#[derive(Clone, Default)]
pub struct MockDestination {
    pub state: Arc<Mutex<DestinationState>>,
}

impl MockDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(self, table: &str) -> Self {
        self.state.lock().unwrap().fail_append.insert(table.to_string());
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn table(&self, name: &str) -> Option<(Vec<String>, Vec<Vec<SqlValue>>)> {
        self.state.lock().unwrap().tables.get(name).cloned()
    }

    pub fn appends(&self) -> usize {
        self.events().iter().filter(|e| e.starts_with("append ")).count()
    }
}

#[async_trait]
impl DestinationConnector for MockDestination {
    async fn connect(&self, _config: &DestinationConfig) -> Result<Box<dyn Destination>> {
        self.state.lock().unwrap().connects += 1;
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl Destination for MockDestination {
    async fn drop_table(&mut self, table: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("drop {}", table));
        state.tables.remove(table);
        Ok(())
    }

    async fn begin<'a>(&'a mut self) -> Result<Box<dyn LoadTransaction + 'a>> {
        self.state.lock().unwrap().events.push("begin".to_string());
        Ok(Box::new(MockTransaction {
            state: Arc::clone(&self.state),
            pending: HashMap::new(),
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push("close".to_string());
        state.closes += 1;
        Ok(())
    }
}

struct MockTransaction {
    state: Arc<Mutex<DestinationState>>,
    pending: HashMap<String, (Vec<String>, Vec<Vec<SqlValue>>)>,
}

#[async_trait]
impl LoadTransaction for MockTransaction {
    async fn append(&mut self, table: &str, batch: &Batch) -> Result<u64> {
        {
            let mut state = self.state.lock().unwrap();
            state.events.push(format!("append {} {}", table, batch.len()));
            if state.fail_append.contains(table) {
                return Err(MigrateError::Config(format!("relation \"{}\" rejected the batch", table)));
            }
        }
        let entry = self
            .pending
            .entry(table.to_string())
            .or_insert_with(|| (batch.columns.clone(), Vec::new()));
        entry.1.extend(batch.rows.iter().cloned());
        Ok(batch.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MockTransaction { state, pending } = *self;
        let mut state = state.lock().unwrap();
        state.events.push("commit".to_string());
        state.tables.extend(pending);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().events.push("rollback".to_string());
        Ok(())
    }
}
