//! Identifier sanitizing, validation and quoting.
//!
//! Source identifiers (SQL Server table and column names) are arbitrary: they
//! may carry spaces, mixed case, or stray padding. Every identifier that
//! crosses into PostgreSQL goes through [`sanitize`], so the same source
//! name always lands on the same destination name within a run.
//!
//! Identifiers cannot be bound as statement parameters, so the quoting
//! helpers here are the only place dynamic SQL gets its names from.

use std::collections::HashMap;

use crate::error::{MigrateError, Result};

/// Maximum identifier length in characters.
///
/// SQL Server allows 128 characters regardless of encoding. PostgreSQL
/// truncates past 63 bytes rather than rejecting.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Normalize a source identifier into a destination identifier.
///
/// Trims surrounding whitespace, collapses each internal whitespace run into
/// a single `_`, and lower-cases the result. Never fails.
///
/// ```
/// use mssql_pg_mirror::ident::sanitize;
///
/// assert_eq!(sanitize("  Order   Lines "), "order_lines");
/// assert_eq!(sanitize(&sanitize("Order\tLines")), "order_lines");
/// ```
pub fn sanitize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Ensure no two source names sanitize to the same destination name.
///
/// Returns a `Config` error naming the first colliding pair.
pub fn check_unique<'a, I>(names: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashMap<String, &str> = HashMap::new();
    for name in names {
        let sanitized = sanitize(name);
        if let Some(previous) = seen.get(&sanitized) {
            return Err(MigrateError::Config(format!(
                "columns {:?} and {:?} both map to {:?}",
                previous, name, sanitized
            )));
        }
        seen.insert(sanitized, name);
    }
    Ok(())
}

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    let length = name.chars().count();
    if length > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, length, name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a SQL Server identifier using brackets.
///
/// Escapes closing brackets by doubling them and wraps in brackets.
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Qualify a SQL Server table name with schema.
pub fn qualify_mssql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mssql(schema)?, quote_mssql(table)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Sanitize tests
    // =========================================================================

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize("Customers"), "customers");
        assert_eq!(sanitize("Order Lines"), "order_lines");
        assert_eq!(sanitize("already_clean"), "already_clean");
    }

    #[test]
    fn test_sanitize_trims_and_collapses() {
        assert_eq!(sanitize("   Padded Name   "), "padded_name");
        assert_eq!(sanitize("Many    Spaces"), "many_spaces");
        assert_eq!(sanitize("Tab\tAnd\nNewline"), "tab_and_newline");
        assert_eq!(sanitize(" \t mixed \r\n  runs \t"), "mixed_runs");
    }

    #[test]
    fn test_sanitize_keeps_existing_underscores() {
        assert_eq!(sanitize("Unit_Price"), "unit_price");
        assert_eq!(sanitize("a_ b"), "a__b");
    }

    #[test]
    fn test_sanitize_blank() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   "), "");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "Order Lines",
            "  X  Y  Z ",
            "ÄBC Déf",
            "CamelCase\tColumn",
            "a_ b",
            "\u{00A0}nbsp\u{2003}em space",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", input);
            assert_eq!(once, once.to_lowercase());
            assert!(!once.chars().any(char::is_whitespace));
        }
    }

    #[test]
    fn test_check_unique_accepts_distinct() {
        assert!(check_unique(["Id", "Order Date", "Total"]).is_ok());
    }

    #[test]
    fn test_check_unique_reports_collision() {
        let err = check_unique(["Id", "Order Date", "order  date"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Order Date"));
        assert!(msg.contains("order_date"));
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("column with spaces").is_ok());
        assert!(validate_identifier("日本語").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let long_name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let result = validate_identifier(&long_name);
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_validate_identifier_counts_characters() {
        let cjk = "表".repeat(60);
        assert_eq!(cjk.len(), 180);
        assert!(validate_identifier(&cjk).is_ok());
        assert_eq!(quote_mssql(&cjk).unwrap(), format!("[{}]", cjk));

        let at_limit = "é".repeat(MAX_IDENTIFIER_LENGTH);
        assert!(validate_identifier(&at_limit).is_ok());
        assert!(validate_identifier(&format!("{}é", at_limit)).is_err());
    }

    // =========================================================================
    // Quoting tests
    // =========================================================================

    #[test]
    fn test_quote_pg() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
    }

    #[test]
    fn test_quote_mssql() {
        assert_eq!(quote_mssql("Order Lines").unwrap(), "[Order Lines]");
        assert_eq!(quote_mssql("table]name").unwrap(), "[table]]name]");
    }

    #[test]
    fn test_quote_mssql_sql_injection_safely_quoted() {
        let result = quote_mssql("Robert]; DROP TABLE Students;--").unwrap();
        assert_eq!(result, "[Robert]]; DROP TABLE Students;--]");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify_pg("public", "orders").unwrap(), "\"public\".\"orders\"");
        assert_eq!(qualify_mssql("dbo", "Orders").unwrap(), "[dbo].[Orders]");
        assert!(qualify_pg("", "orders").is_err());
        assert!(qualify_mssql("dbo", "").is_err());
    }
}
