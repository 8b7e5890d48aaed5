//! Loading of the shipped (read-only) dataset.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::model::{Origin, Record};

/// Reads the shipped dataset. A missing or unreadable file leaves the
/// listing with local records only, so the failure is logged and an empty
/// dataset returned.
pub fn load_shipped(path: &Path) -> Vec<Record> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "shipped dataset not found, continuing without it");
        return Vec::new();
    }
    match fs::read_to_string(path)
        .with_context(|| format!("reading dataset {}", path.display()))
        .and_then(|raw| parse_shipped(&raw))
    {
        Ok(records) => {
            tracing::debug!(path = %path.display(), count = records.len(), "shipped dataset loaded");
            records
        }
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = ?err,
                "shipped dataset unusable, continuing without it"
            );
            Vec::new()
        }
    }
}

/// Parses a dataset array. Entries without an id and repeated ids are
/// skipped; the first occurrence of an id wins.
pub fn parse_shipped(raw: &str) -> Result<Vec<Record>> {
    let entries: Vec<Value> = serde_json::from_str(raw).context("dataset is not a JSON array")?;
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let mut record: Record = match serde_json::from_value(entry) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(index, %err, "skipping malformed dataset entry");
                continue;
            }
        };
        record.id = record.id.trim().to_string();
        if record.id.is_empty() {
            tracing::warn!(index, "skipping dataset entry without an id");
            continue;
        }
        if !seen.insert(record.id.clone()) {
            tracing::warn!(index, id = %record.id, "skipping duplicate dataset id");
            continue;
        }
        record.origin = Origin::Shipped;
        records.push(record);
    }
    Ok(records)
}
