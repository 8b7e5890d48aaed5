//! The persisted local-state document.
//!
//! All local layers (additions, overrides, deletions, custom bodies) live in
//! one versioned JSON document. Loading never fails on bad content: each
//! layer is decoded on its own and a malformed layer falls back to empty.

use indexmap::{IndexMap, IndexSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Record, RecordPatch};

pub const SCHEMA_VERSION: u32 = 2;

/// Browser-era layout: `userItems`, `userBodies`, `overrides`, `deletions`.
const LEGACY_VERSION: u32 = 1;

const LEGACY_RENAMES: &[(&str, &str)] = &[("userItems", "additions"), ("userBodies", "customBodies")];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalState {
    pub version: u32,
    pub additions: Vec<Record>,
    pub overrides: IndexMap<String, RecordPatch>,
    pub deletions: IndexSet<String>,
    pub custom_bodies: IndexSet<String>,
}

impl Default for LocalState {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            additions: Vec::new(),
            overrides: IndexMap::new(),
            deletions: IndexSet::new(),
            custom_bodies: IndexSet::new(),
        }
    }
}

impl LocalState {
    /// Decodes a stored document, migrating older layouts and filling
    /// defaults for missing or corrupt layers.
    pub fn decode(raw: &str) -> Self {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%err, "local state is not valid JSON, starting empty");
                return Self::default();
            }
        };
        let Value::Object(mut map) = value else {
            tracing::warn!("local state is not a JSON object, starting empty");
            return Self::default();
        };

        let version = detect_version(&map);
        if version < SCHEMA_VERSION {
            migrate(&mut map, version);
        } else if version > SCHEMA_VERSION {
            tracing::warn!(
                version,
                supported = SCHEMA_VERSION,
                "local state written by a newer version, reading best-effort"
            );
        }

        Self {
            version: SCHEMA_VERSION,
            additions: decode_layer(&map, "additions"),
            overrides: decode_layer(&map, "overrides"),
            deletions: decode_layer(&map, "deletions"),
            custom_bodies: decode_layer(&map, "customBodies"),
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty()
            && self.overrides.is_empty()
            && self.deletions.is_empty()
            && self.custom_bodies.is_empty()
    }
}

fn detect_version(map: &Map<String, Value>) -> u32 {
    if let Some(version) = map.get("version").and_then(Value::as_u64) {
        return u32::try_from(version).unwrap_or(u32::MAX);
    }
    let legacy = LEGACY_RENAMES
        .iter()
        .any(|(legacy, _)| map.contains_key(*legacy));
    if legacy {
        LEGACY_VERSION
    } else {
        SCHEMA_VERSION
    }
}

fn migrate(map: &mut Map<String, Value>, from: u32) {
    tracing::info!(from, to = SCHEMA_VERSION, "migrating local state document");
    for (legacy, current) in LEGACY_RENAMES {
        if let Some(value) = map.remove(*legacy) {
            map.entry(current.to_string()).or_insert(value);
        }
    }
}

fn decode_layer<T>(map: &Map<String, Value>, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let Some(value) = map.get(key) else {
        return T::default();
    };
    if value.is_null() {
        return T::default();
    }
    match serde_json::from_value(value.clone()) {
        Ok(layer) => layer,
        Err(err) => {
            tracing::warn!(layer = key, %err, "discarding corrupt local state layer");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn garbage_decodes_to_empty() {
        assert!(LocalState::decode("{not json").is_empty());
        assert!(LocalState::decode("[1, 2]").is_empty());
        assert!(LocalState::decode("").is_empty());
    }

    #[test]
    fn corrupt_layer_does_not_poison_the_others() {
        let raw = json!({
            "version": 2,
            "additions": "oops",
            "overrides": {"s1": {"cycle": "2025"}},
            "deletions": ["s2"],
            "customBodies": 42
        })
        .to_string();
        let state = LocalState::decode(&raw);
        assert!(state.additions.is_empty());
        assert!(state.custom_bodies.is_empty());
        assert_eq!(state.overrides["s1"].cycle.as_deref(), Some("2025"));
        assert!(state.deletions.contains("s2"));
    }

    #[test]
    fn numeric_override_values_keep_the_layer() {
        let raw = json!({
            "version": 2,
            "overrides": {"s1": {"cycle": 2025, "history": [2019]}}
        })
        .to_string();
        let state = LocalState::decode(&raw);
        assert_eq!(state.overrides["s1"].cycle.as_deref(), Some("2025"));
        assert_eq!(state.overrides["s1"].history, Some(vec!["2019".to_string()]));
    }

    #[test]
    fn newer_version_is_read_best_effort() {
        let raw = json!({
            "version": 99,
            "additions": [{"id": "user-a", "body": "BMC", "exam": "Clerk", "official": "https://portal.mcgm.gov.in"}],
            "overrides": {"s2": {"exam": "CGL Tier II"}},
            "deletions": ["s1"],
            "customBodies": ["BMC"],
            "futureLayer": {"anything": true}
        })
        .to_string();
        let state = LocalState::decode(&raw);
        assert_eq!(state.version, SCHEMA_VERSION);
        assert_eq!(state.additions.len(), 1);
        assert_eq!(state.additions[0].id, "user-a");
        assert_eq!(state.overrides["s2"].exam.as_deref(), Some("CGL Tier II"));
        assert!(state.deletions.contains("s1"));
        assert!(state.custom_bodies.contains("BMC"));
    }

    #[test]
    fn legacy_layout_is_migrated() {
        let raw = json!({
            "userItems": [{"id": "user-a", "body": "BMC", "exam": "Clerk", "official": "https://portal.mcgm.gov.in"}],
            "userBodies": ["Pune Zilla Parishad"],
            "overrides": {},
            "deletions": ["s3"]
        })
        .to_string();
        let state = LocalState::decode(&raw);
        assert_eq!(state.version, SCHEMA_VERSION);
        assert_eq!(state.additions.len(), 1);
        assert_eq!(state.additions[0].id, "user-a");
        assert!(state.custom_bodies.contains("Pune Zilla Parishad"));
        assert!(state.deletions.contains("s3"));
    }

    #[test]
    fn encode_then_decode_preserves_layers() {
        let mut state = LocalState::default();
        state.deletions.insert("s1".into());
        state.custom_bodies.insert("BMC".into());
        state.overrides.insert(
            "s2".into(),
            RecordPatch {
                exam: Some("CGL Tier II".into()),
                ..RecordPatch::default()
            },
        );
        let raw = state.encode().expect("encode state");
        assert_eq!(LocalState::decode(&raw), state);
    }
}
