//! Column resolution: which source columns a table transfers.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::ident::{check_unique, sanitize};

/// A column as reported by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name as declared in the source.
    pub name: String,

    /// Declared data type (e.g., "int", "nvarchar", "varbinary").
    pub data_type: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// Whether the declared type is a binary/blob type.
    pub fn is_binary(&self) -> bool {
        self.data_type.to_lowercase().contains("binary")
    }
}

/// A resolved column with its destination name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name in the source.
    pub name: String,

    /// Declared source data type.
    pub data_type: String,

    /// Column name in the destination.
    pub sanitized: String,
}

impl From<ColumnMeta> for ColumnDescriptor {
    fn from(meta: ColumnMeta) -> Self {
        let sanitized = sanitize(&meta.name);
        Self {
            name: meta.name,
            data_type: meta.data_type,
            sanitized,
        }
    }
}

/// Outcome of resolving a table's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Non-binary columns only.
    Filtered(Vec<ColumnDescriptor>),

    /// Every column was binary; all of them are transferred.
    Fallback(Vec<ColumnDescriptor>),

    /// The catalog reports no columns (table missing or not visible).
    Empty,
}

impl Resolution {
    /// Columns to transfer, empty for [`Resolution::Empty`].
    pub fn columns(&self) -> &[ColumnDescriptor] {
        match self {
            Resolution::Filtered(cols) | Resolution::Fallback(cols) => cols,
            Resolution::Empty => &[],
        }
    }

    pub fn into_columns(self) -> Vec<ColumnDescriptor> {
        match self {
            Resolution::Filtered(cols) | Resolution::Fallback(cols) => cols,
            Resolution::Empty => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Resolution::Empty)
    }
}

/// Pick the columns to transfer from catalog metadata, keeping catalog order.
///
/// Binary-typed columns are excluded unless that would leave nothing, in
/// which case every column is kept.
pub fn resolve_columns(table: &str, metadata: Vec<ColumnMeta>) -> Resolution {
    if metadata.is_empty() {
        return Resolution::Empty;
    }

    let filtered: Vec<ColumnDescriptor> = metadata
        .iter()
        .filter(|c| !c.is_binary())
        .cloned()
        .map(ColumnDescriptor::from)
        .collect();

    if !filtered.is_empty() {
        return Resolution::Filtered(filtered);
    }

    warn!(
        "[{}] no non-binary columns found, falling back to all {} columns",
        table,
        metadata.len()
    );
    Resolution::Fallback(metadata.into_iter().map(ColumnDescriptor::from).collect())
}

/// Reject column sets whose destination names collide.
pub fn ensure_unique(columns: &[ColumnDescriptor]) -> Result<()> {
    check_unique(columns.iter().map(|c| c.name.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(cols: &[(&str, &str)]) -> Vec<ColumnMeta> {
        cols.iter().map(|(n, t)| ColumnMeta::new(*n, *t)).collect()
    }

    #[test]
    fn test_all_non_binary_returned_in_order() {
        let input = meta(&[("Id", "int"), ("Order Date", "datetime2"), ("Total", "decimal")]);
        let resolution = resolve_columns("dbo.orders", input);
        let cols = match resolution {
            Resolution::Filtered(cols) => cols,
            other => panic!("expected Filtered, got {other:?}"),
        };
        let names: Vec<_> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Id", "Order Date", "Total"]);
        assert_eq!(cols[1].sanitized, "order_date");
        assert_eq!(cols[2].data_type, "decimal");
    }

    #[test]
    fn test_binary_columns_excluded() {
        let input = meta(&[
            ("Id", "int"),
            ("Photo", "varbinary"),
            ("Hash", "BINARY"),
            ("Name", "nvarchar"),
        ]);
        let resolution = resolve_columns("dbo.people", input);
        let names: Vec<_> = resolution.columns().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["Id", "Name"]);
        assert!(matches!(resolution, Resolution::Filtered(_)));
    }

    #[test]
    fn test_all_binary_falls_back_to_everything() {
        let input = meta(&[("Blob", "varbinary"), ("Stamp", "binary")]);
        let resolution = resolve_columns("dbo.blobs", input);
        match resolution {
            Resolution::Fallback(cols) => {
                assert_eq!(cols.len(), 2);
                assert_eq!(cols[0].name, "Blob");
                assert_eq!(cols[1].name, "Stamp");
            }
            other => panic!("expected Fallback, got {other:?}"),
        }
    }

    #[test]
    fn test_no_columns_is_empty() {
        let resolution = resolve_columns("dbo.gone", Vec::new());
        assert!(resolution.is_empty());
        assert!(resolution.columns().is_empty());
    }

    #[test]
    fn test_image_type_is_not_binary_marker() {
        // Only types spelled with "binary" are excluded.
        let input = meta(&[("Pic", "image")]);
        assert!(matches!(
            resolve_columns("dbo.pics", input),
            Resolution::Filtered(_)
        ));
    }

    #[test]
    fn test_ensure_unique() {
        let ok: Vec<ColumnDescriptor> =
            meta(&[("Id", "int"), ("Name", "nvarchar")]).into_iter().map(Into::into).collect();
        assert!(ensure_unique(&ok).is_ok());

        let clash: Vec<ColumnDescriptor> = meta(&[("Unit Price", "money"), ("unit  price", "money")])
            .into_iter()
            .map(Into::into)
            .collect();
        assert!(ensure_unique(&clash).is_err());
    }
}
