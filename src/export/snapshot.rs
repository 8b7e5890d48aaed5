//! JSON backup of the local layers and parsing of importable payloads.

use anyhow::{bail, Context, Result};
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use serde_json::Value;

use crate::model::{Record, RecordPatch};
use crate::storage::LocalState;

/// A parsed import file.
#[derive(Debug)]
pub enum ImportPayload {
    /// Bare array of records: replaces the additions layer only.
    Additions(Vec<Record>),
    /// Snapshot object: each present layer replaces the stored one.
    Layers(SnapshotLayers),
}

/// Snapshot layers; older backups used `userItems` and `userBodies`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotLayers {
    #[serde(default, alias = "userItems")]
    pub additions: Option<Vec<Record>>,
    #[serde(default)]
    pub overrides: Option<IndexMap<String, RecordPatch>>,
    #[serde(default)]
    pub deletions: Option<IndexSet<String>>,
    #[serde(default, alias = "userBodies")]
    pub custom_bodies: Option<IndexSet<String>>,
}

impl SnapshotLayers {
    fn is_empty(&self) -> bool {
        self.additions.is_none()
            && self.overrides.is_none()
            && self.deletions.is_none()
            && self.custom_bodies.is_none()
    }
}

pub fn render(state: &LocalState) -> Result<String> {
    serde_json::to_string_pretty(state).context("serialising local state snapshot")
}

pub fn parse_import(raw: &str) -> Result<ImportPayload> {
    let value: Value = serde_json::from_str(raw).context("import file is not valid JSON")?;
    match value {
        Value::Array(_) => {
            let records: Vec<Record> =
                serde_json::from_value(value).context("import array must hold records")?;
            Ok(ImportPayload::Additions(records))
        }
        Value::Object(_) => {
            let layers: SnapshotLayers =
                serde_json::from_value(value).context("snapshot layers have the wrong shape")?;
            if layers.is_empty() {
                bail!("snapshot has no additions, overrides, deletions or custom bodies");
            }
            Ok(ImportPayload::Layers(layers))
        }
        _ => bail!("import file must be a JSON array or object"),
    }
}
