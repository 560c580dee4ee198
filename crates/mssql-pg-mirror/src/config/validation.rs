//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};
use crate::ident::sanitize;
use std::collections::{HashMap, HashSet};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Destination validation
    if config.destination.host.is_empty() {
        return Err(MigrateError::Config("destination.host is required".into()));
    }
    if config.destination.database.is_empty() {
        return Err(MigrateError::Config(
            "destination.database is required".into(),
        ));
    }
    if config.destination.user.is_empty() {
        return Err(MigrateError::Config("destination.user is required".into()));
    }

    // Source validation
    let mut names = HashSet::new();
    for (idx, source) in config.sources.iter().enumerate() {
        if source.name.is_empty() {
            return Err(MigrateError::Config(format!(
                "sources[{}].name is required",
                idx
            )));
        }
        if !names.insert(source.name.as_str()) {
            return Err(MigrateError::Config(format!(
                "duplicate source name '{}'",
                source.name
            )));
        }
        if source.host.is_empty() {
            return Err(MigrateError::Config(format!(
                "source '{}': host is required",
                source.name
            )));
        }
        if source.database.is_empty() {
            return Err(MigrateError::Config(format!(
                "source '{}': database is required",
                source.name
            )));
        }
        if !source.trusted_connection && source.username.is_empty() {
            return Err(MigrateError::Config(format!(
                "source '{}': username is required unless trusted_connection is set",
                source.name
            )));
        }
    }

    if config.transfer.chunk_size == 0 {
        return Err(MigrateError::Config(
            "transfer.chunk_size must be at least 1".into(),
        ));
    }

    Ok(())
}

/// Per-table problems that would fail those tables at run time.
///
/// Covers each enabled table's own checks and enabled tables, across all
/// sources, that sanitize to the same destination table.
pub fn table_problems(config: &Config) -> Vec<String> {
    let mut problems = Vec::new();
    let mut targets: HashMap<String, String> = HashMap::new();

    for source in &config.sources {
        for table in source.tables.iter().filter(|t| t.enabled) {
            let label = format!("{}:{}", source.name, table.full_name());
            if let Err(e) = table.validate() {
                problems.push(format!("{}: {}", label, e));
                continue;
            }
            let target = sanitize(&table.name);
            if let Some(previous) = targets.insert(target.clone(), label.clone()) {
                problems.push(format!(
                    "{}: destination table {:?} is also written by {}",
                    label, target, previous
                ));
            }
        }
    }

    problems
}
