//! Source SELECT construction.
//!
//! Filter and ordering clauses are operator-supplied SQL fragments and are
//! inserted verbatim; only identifiers are quoted here.

use chrono::{Duration, NaiveDateTime};

use crate::config::{Clause, SourceTableConfig};
use crate::error::{MigrateError, Result};
use crate::ident::{qualify_mssql, quote_mssql};
use crate::resolve::ColumnDescriptor;

/// Timestamp layout of the recency cutoff literal.
const CUTOFF_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Build the projection query for one table.
///
/// `now` anchors the recency cutoff; it is evaluated once here, never per row.
pub fn build_select(
    table: &SourceTableConfig,
    columns: &[ColumnDescriptor],
    now: NaiveDateTime,
) -> Result<String> {
    let cols = columns
        .iter()
        .map(|c| quote_mssql(&c.name))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let mut sql = format!(
        "SELECT {} FROM {}",
        cols,
        qualify_mssql(&table.schema, &table.name)?
    );

    if let Some(predicate) = where_clause(table, now)? {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate);
    }

    match &table.order_by {
        Clause::Absent => {}
        Clause::Single(clause) => {
            sql.push_str(" ORDER BY ");
            sql.push_str(clause);
        }
        Clause::List(items) if items.is_empty() => {}
        Clause::List(items) => {
            sql.push_str(" ORDER BY ");
            sql.push_str(&items.join(", "));
        }
    }

    // TOP caps the whole result, not a single fetch
    if let Some(limit) = table.limit {
        sql = sql.replacen("SELECT ", &format!("SELECT TOP {} ", limit), 1);
    }

    Ok(sql)
}

fn where_clause(table: &SourceTableConfig, now: NaiveDateTime) -> Result<Option<String>> {
    let recency = match table.recency() {
        Some((column, days)) => {
            let cutoff = Duration::try_days(i64::from(days))
                .and_then(|window| now.checked_sub_signed(window))
                .ok_or_else(|| {
                    MigrateError::Config(format!(
                        "{}: lookback_days {} is out of range",
                        table.full_name(),
                        days
                    ))
                })?;
            Some(format!(
                "{} >= '{}'",
                quote_mssql(column)?,
                cutoff.format(CUTOFF_FORMAT)
            ))
        }
        None => None,
    };

    let mut conditions: Vec<String> = match &table.filter {
        Clause::Absent => Vec::new(),
        Clause::Single(predicate) => {
            if recency.is_none() {
                return Ok(Some(predicate.clone()));
            }
            vec![format!("({})", predicate)]
        }
        Clause::List(items) => items.iter().map(|p| format!("({})", p)).collect(),
    };

    if let Some(cutoff) = recency {
        if conditions.is_empty() {
            return Ok(Some(cutoff));
        }
        conditions.push(format!("({})", cutoff));
    }

    if conditions.is_empty() {
        Ok(None)
    } else {
        Ok(Some(conditions.join(" AND ")))
    }
}
