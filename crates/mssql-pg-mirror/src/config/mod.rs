//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the run-level configuration.
    ///
    /// Per-table problems are not reported here; they fail the affected
    /// table during the run so the remaining tables still migrate.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Problems with individual enabled tables, one message per table.
    ///
    /// Unlike [`Config::validate`] these do not stop a run; the affected
    /// tables fail and the rest migrate.
    pub fn table_problems(&self) -> Vec<String> {
        validation::table_problems(self)
    }
}

impl SourceConnectionConfig {
    /// Human-readable server address for logs.
    pub fn address(&self) -> String {
        match &self.instance {
            Some(instance) => format!(
                "{}\\{}:{}/{}",
                self.host, instance, self.port, self.database
            ),
            None => format!("{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

impl DestinationConfig {
    /// Human-readable server address for logs.
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl SourceTableConfig {
    /// Check the invariants of a single table entry.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MigrateError::Config(format!(
                "table name is required (schema '{}')",
                self.schema
            )));
        }
        if let Some(limit) = self.limit {
            if limit <= 0 {
                return Err(MigrateError::Config(format!(
                    "{}: limit must be a positive integer, got {}",
                    self.full_name(),
                    limit
                )));
            }
        }
        if self.lookback_days.is_some() && self.date_column.is_none() {
            return Err(MigrateError::Config(format!(
                "{}: lookback_days requires date_column",
                self.full_name()
            )));
        }
        Ok(())
    }
}
