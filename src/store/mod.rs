//! Merge layer over the shipped dataset and the local edit layers.
//!
//! # Invariants
//! - Shipped records are never mutated; edits land in the local document.
//! - Merged order: surviving shipped records (dataset order) then additions
//!   (insertion order).
//! - A deleted shipped id is hidden even when it also has an override.
//! - Editing a shipped record removes its id from the deletions layer.
//! - Every mutation is one transaction; a failed mutation writes nothing.

use std::collections::HashSet;

use indexmap::IndexSet;
use uuid::Uuid;

use crate::allowlist::OfficialAllowlist;
use crate::config::AppConfig;
use crate::export::snapshot::{self, ImportPayload};
use crate::model::{Level, Origin, Record, RecordPatch, USER_ID_PREFIX};
use crate::search::compare_names;
use crate::storage::{LocalState, StorageHandle};

mod error;

pub use error::{StoreError, StoreResult};

/// How a saved record relates to the existing collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    /// Brand-new record appended to the additions layer.
    New,
    /// Replacement of an existing addition, matched by id.
    EditAddition,
    /// Override of a shipped record, matched by id.
    EditShipped,
}

impl UpsertKind {
    /// Edit kind for an existing record of the given origin.
    pub fn for_origin(origin: Origin) -> Self {
        match origin {
            Origin::Shipped => UpsertKind::EditShipped,
            Origin::User => UpsertKind::EditAddition,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: String,
    /// Whether the official link passed the allowlist. Advisory only.
    pub official: bool,
    /// A soft-deleted shipped record became visible again.
    pub undeleted: bool,
    /// The body was unknown and got registered as a custom body.
    pub registered_body: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub additions: usize,
    pub overrides: usize,
    pub deletions: usize,
    pub custom_bodies: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub additions: usize,
    pub overrides: usize,
    pub deletions: usize,
    pub custom_bodies: usize,
}

pub struct RecordStore {
    shipped: Vec<Record>,
    storage: StorageHandle,
    allowlist: OfficialAllowlist,
    clear_custom_bodies_on_reset: bool,
}

impl RecordStore {
    pub fn new(shipped: Vec<Record>, storage: StorageHandle) -> Self {
        let shipped = shipped
            .into_iter()
            .map(|mut record| {
                record.origin = Origin::Shipped;
                record
            })
            .collect();
        Self {
            shipped,
            storage,
            allowlist: OfficialAllowlist::default(),
            clear_custom_bodies_on_reset: false,
        }
    }

    pub fn from_config(shipped: Vec<Record>, storage: StorageHandle, config: &AppConfig) -> Self {
        Self::new(shipped, storage)
            .with_allowlist(OfficialAllowlist::from_options(&config.allowlist))
            .clear_custom_bodies_on_reset(config.reset.clear_custom_bodies)
    }

    pub fn with_allowlist(mut self, allowlist: OfficialAllowlist) -> Self {
        self.allowlist = allowlist;
        self
    }

    pub fn clear_custom_bodies_on_reset(mut self, clear: bool) -> Self {
        self.clear_custom_bodies_on_reset = clear;
        self
    }

    pub fn shipped(&self) -> &[Record] {
        &self.shipped
    }

    pub fn allowlist(&self) -> &OfficialAllowlist {
        &self.allowlist
    }

    pub fn local_state(&self) -> StoreResult<LocalState> {
        Ok(self.storage.load_state()?)
    }

    pub fn list_all(&self) -> StoreResult<Vec<Record>> {
        let state = self.storage.load_state()?;
        Ok(merge(&self.shipped, &state))
    }

    pub fn list_bodies(&self) -> StoreResult<Vec<String>> {
        let state = self.storage.load_state()?;
        Ok(body_names(&merge(&self.shipped, &state), &state.custom_bodies))
    }

    /// Distinct effective regions of the state and local records in `items`.
    pub fn list_regions(items: &[Record]) -> Vec<String> {
        let mut regions: Vec<String> = items
            .iter()
            .filter(|record| record.effective_level() != Level::Central)
            .filter_map(Record::effective_region)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        regions.sort_by(|a, b| compare_names(a, b));
        regions
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<Record>> {
        Ok(self.list_all()?.into_iter().find(|record| record.id == id))
    }

    /// Record as an editor would see it. Unlike [`RecordStore::get`] this
    /// also reaches soft-deleted shipped records, since editing one is how
    /// it gets restored.
    pub fn get_for_edit(&self, id: &str) -> StoreResult<Record> {
        let state = self.storage.load_state()?;
        if let Some(addition) = state.additions.iter().find(|record| record.id == id) {
            let mut record = addition.clone();
            record.origin = Origin::User;
            return Ok(record);
        }
        let shipped = self
            .find_shipped(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut record = shipped.clone();
        if let Some(patch) = state.overrides.get(id) {
            patch.apply_to(&mut record);
        }
        Ok(record)
    }

    pub fn is_overridden(&self, id: &str) -> StoreResult<bool> {
        Ok(self.storage.load_state()?.overrides.contains_key(id))
    }

    pub fn is_deleted(&self, id: &str) -> StoreResult<bool> {
        Ok(self.storage.load_state()?.deletions.contains(id))
    }

    pub fn upsert(&self, record: Record, kind: UpsertKind) -> StoreResult<UpsertOutcome> {
        let mut record = record.normalized();
        validate(&record)?;
        let official = self.allowlist.is_official(&record.official);
        if !official {
            tracing::warn!(link = %record.official, "official link is not on the allowlist");
        }

        let outcome = self.storage.transact(|state| match kind {
            UpsertKind::New => {
                let known = body_names(&merge(&self.shipped, state), &state.custom_bodies);
                let registered_body = !known.contains(&record.body);
                record.id = fresh_id(&self.shipped, state.additions.iter());
                record.origin = Origin::User;
                if registered_body {
                    state.custom_bodies.insert(record.body.clone());
                }
                let id = record.id.clone();
                state.additions.push(record);
                Ok(UpsertOutcome {
                    id,
                    official,
                    undeleted: false,
                    registered_body,
                })
            }
            UpsertKind::EditAddition => {
                let slot = state
                    .additions
                    .iter_mut()
                    .find(|addition| addition.id == record.id)
                    .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;
                record.origin = Origin::User;
                let id = record.id.clone();
                *slot = record;
                Ok(UpsertOutcome {
                    id,
                    official,
                    undeleted: false,
                    registered_body: false,
                })
            }
            UpsertKind::EditShipped => {
                if self.find_shipped(&record.id).is_none() {
                    return Err(StoreError::NotFound(record.id.clone()));
                }
                state
                    .overrides
                    .insert(record.id.clone(), RecordPatch::from_record(&record));
                let undeleted = state.deletions.shift_remove(&record.id);
                Ok(UpsertOutcome {
                    id: record.id,
                    official,
                    undeleted,
                    registered_body: false,
                })
            }
        })?;

        tracing::info!(
            id = %outcome.id,
            ?kind,
            undeleted = outcome.undeleted,
            registered_body = outcome.registered_body,
            "record saved"
        );
        Ok(outcome)
    }

    /// Additions are dropped outright; shipped records are soft-deleted and
    /// keep any override for a later restore.
    pub fn remove(&self, id: &str, origin: Origin) -> StoreResult<()> {
        self.storage.transact(|state| match origin {
            Origin::User => {
                let index = state
                    .additions
                    .iter()
                    .position(|record| record.id == id)
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                state.additions.remove(index);
                Ok(())
            }
            Origin::Shipped => {
                if self.find_shipped(id).is_none() {
                    return Err(StoreError::NotFound(id.to_string()));
                }
                state.deletions.insert(id.to_string());
                Ok(())
            }
        })?;
        tracing::info!(id, %origin, "record removed");
        Ok(())
    }

    /// Clears additions, overrides and deletions in one write. Custom bodies
    /// go too only when the store was configured to clear them.
    pub fn reset_local(&self) -> StoreResult<ResetSummary> {
        let clear_bodies = self.clear_custom_bodies_on_reset;
        let summary = self.storage.transact(|state| {
            let summary = ResetSummary {
                additions: state.additions.len(),
                overrides: state.overrides.len(),
                deletions: state.deletions.len(),
                custom_bodies: if clear_bodies {
                    state.custom_bodies.len()
                } else {
                    0
                },
            };
            state.additions.clear();
            state.overrides.clear();
            state.deletions.clear();
            if clear_bodies {
                state.custom_bodies.clear();
            }
            Ok::<_, StoreError>(summary)
        })?;
        tracing::info!(?summary, "local customisations reset");
        Ok(summary)
    }

    pub fn add_custom_body(&self, name: &str) -> StoreResult<()> {
        let body = name.trim();
        if body.is_empty() {
            return Err(StoreError::Validation("body name cannot be empty".into()));
        }
        self.storage.transact(|state| {
            let known = body_names(&merge(&self.shipped, state), &state.custom_bodies);
            if known.iter().any(|existing| existing == body) {
                return Err(StoreError::AlreadyExists(body.to_string()));
            }
            state.custom_bodies.insert(body.to_string());
            Ok(())
        })
    }

    /// Forgets a custom body. Records under that body are untouched.
    pub fn remove_custom_body(&self, name: &str) -> StoreResult<()> {
        let body = name.trim();
        self.storage.transact(|state| {
            if state.custom_bodies.shift_remove(body) {
                Ok(())
            } else {
                Err(StoreError::NotFound(body.to_string()))
            }
        })
    }

    pub fn export_snapshot(&self) -> StoreResult<String> {
        let state = self.storage.load_state()?;
        Ok(snapshot::render(&state)?)
    }

    /// Applies a legacy additions array or a snapshot object. Nothing is
    /// written unless the whole payload parses.
    pub fn import_snapshot(&self, raw: &str) -> StoreResult<ImportSummary> {
        let payload =
            snapshot::parse_import(raw).map_err(|err| StoreError::ImportFormat(format!("{err:#}")))?;
        let summary = self.storage.transact(|state| {
            match payload {
                ImportPayload::Additions(records) => {
                    state.additions = with_ids(&self.shipped, records);
                }
                ImportPayload::Layers(layers) => {
                    if let Some(additions) = layers.additions {
                        state.additions = with_ids(&self.shipped, additions);
                    }
                    if let Some(overrides) = layers.overrides {
                        state.overrides = overrides;
                    }
                    if let Some(deletions) = layers.deletions {
                        state.deletions = deletions;
                    }
                    if let Some(custom_bodies) = layers.custom_bodies {
                        state.custom_bodies = custom_bodies;
                    }
                }
            }
            Ok::<_, StoreError>(ImportSummary {
                additions: state.additions.len(),
                overrides: state.overrides.len(),
                deletions: state.deletions.len(),
                custom_bodies: state.custom_bodies.len(),
            })
        })?;
        tracing::info!(?summary, "local state imported");
        Ok(summary)
    }

    fn find_shipped(&self, id: &str) -> Option<&Record> {
        self.shipped.iter().find(|record| record.id == id)
    }
}

/// Shipped records minus deletions with overrides applied, then additions.
pub fn merge(shipped: &[Record], state: &LocalState) -> Vec<Record> {
    let mut merged: Vec<Record> = shipped
        .iter()
        .filter(|record| !state.deletions.contains(&record.id))
        .map(|record| {
            let mut record = record.clone();
            record.origin = Origin::Shipped;
            if let Some(patch) = state.overrides.get(&record.id) {
                patch.apply_to(&mut record);
            }
            record
        })
        .collect();
    merged.extend(state.additions.iter().map(|addition| {
        let mut record = addition.clone();
        record.origin = Origin::User;
        record
    }));
    merged
}

/// Bodies of `records` plus custom bodies, deduplicated and sorted.
pub fn body_names(records: &[Record], custom_bodies: &IndexSet<String>) -> Vec<String> {
    let mut bodies: Vec<String> = records
        .iter()
        .map(|record| record.body.clone())
        .chain(custom_bodies.iter().cloned())
        .filter(|body| !body.trim().is_empty())
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect();
    bodies.sort_by(|a, b| compare_names(a, b));
    bodies
}

fn validate(record: &Record) -> StoreResult<()> {
    let missing: Vec<&str> = [
        ("body", record.body.as_str()),
        ("exam", record.exam.as_str()),
        ("official link", record.official.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| field)
    .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "body, exam and official link are required (missing: {})",
            missing.join(", ")
        )))
    }
}

/// Imported additions with usable ids. A blank id, an id naming a shipped
/// record, or an id repeated within the import gets a fresh one.
fn with_ids(shipped: &[Record], records: Vec<Record>) -> Vec<Record> {
    let mut additions: Vec<Record> = Vec::with_capacity(records.len());
    for mut record in records {
        let imported = record.id.trim().to_string();
        let clashes = imported.is_empty()
            || shipped.iter().any(|existing| existing.id == imported)
            || additions.iter().any(|existing| existing.id == imported);
        record.id = if clashes {
            let fresh = fresh_id(shipped, additions.iter());
            if !imported.is_empty() {
                tracing::warn!(imported = %imported, assigned = %fresh, "imported id already taken, assigning a fresh one");
            }
            fresh
        } else {
            imported
        };
        record.origin = Origin::User;
        additions.push(record);
    }
    additions
}

fn fresh_id<'a>(shipped: &'a [Record], additions: impl Iterator<Item = &'a Record>) -> String {
    let taken: HashSet<&str> = shipped
        .iter()
        .chain(additions)
        .map(|record| record.id.as_str())
        .collect();
    loop {
        let candidate = format!("{USER_ID_PREFIX}{}", Uuid::new_v4().simple());
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
    }
}
