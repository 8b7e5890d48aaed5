//! Exam notification records and the body lookup table.
//!
//! # Invariants
//! - `id` is never rewritten once a record exists.
//! - `origin` is assigned by the store at merge time and is not persisted.
//! - Level and region fall back to the body lookup table when absent.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use strum::{Display, EnumString};

use super::window::Window;

/// Prefix for ids minted by this tool. Only used for readability; origin is
/// tracked through [`Origin`].
pub const USER_ID_PREFIX: &str = "user-";

const CENTRAL_BODIES: &[&str] = &["SSC", "UPSC", "IBPS", "RRB"];

const STATE_BODIES: &[(&str, &str)] = &[
    ("MPSC", "Maharashtra"),
    ("BPSC", "Bihar"),
    ("TNPSC", "Tamil Nadu"),
    ("RPSC", "Rajasthan"),
    ("GPSC", "Gujarat"),
    ("KPSC", "Karnataka"),
    ("WBPSC", "West Bengal"),
    ("OPSC", "Odisha"),
    ("JKPSC", "Jammu & Kashmir"),
    ("HPSC", "Haryana"),
    ("PPSC", "Punjab"),
    ("JPSC", "Jharkhand"),
    ("TSPSC", "Telangana"),
    ("UPPSC", "Uttar Pradesh"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Level {
    Central,
    State,
    Local,
}

/// Where a merged record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Origin {
    /// Entry of the read-only dataset, possibly carrying a local override.
    #[default]
    Shipped,
    /// Entry created locally and held in the additions layer.
    User,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub id: String,
    #[serde(skip)]
    pub origin: Origin,
    #[serde(default, deserialize_with = "loose_string")]
    pub body: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub exam: String,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub cycle: Option<String>,
    #[serde(default)]
    pub window: Window,
    #[serde(default, deserialize_with = "loose_string")]
    pub official: String,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_level")]
    pub level: Option<Level>,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub orgtype: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "loose_history"
    )]
    pub history: Vec<String>,
}

impl Record {
    pub fn new(
        body: impl Into<String>,
        exam: impl Into<String>,
        official: impl Into<String>,
        window: Window,
    ) -> Self {
        Self {
            id: String::new(),
            origin: Origin::User,
            body: body.into(),
            exam: exam.into(),
            cycle: None,
            window,
            official: official.into(),
            notes: None,
            level: None,
            region: None,
            orgtype: None,
            history: Vec::new(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.origin == Origin::User
    }

    pub fn effective_level(&self) -> Level {
        self.level.unwrap_or_else(|| infer_level(&self.body))
    }

    /// Explicit region when set, otherwise the lookup-table region for
    /// state/local bodies.
    pub fn effective_region(&self) -> Option<String> {
        if let Some(region) = non_blank(self.region.as_deref()) {
            return Some(region.to_string());
        }
        if self.effective_level() == Level::Central {
            return None;
        }
        infer_region(&self.body).map(str::to_string)
    }

    /// Local-body type used by the `orgtype:` filter; untyped records count
    /// as `other`.
    pub fn effective_orgtype(&self) -> &str {
        non_blank(self.orgtype.as_deref()).unwrap_or("other")
    }

    /// Human label such as `State - Maharashtra` or
    /// `Local - Municipal Corporation - Maharashtra`.
    pub fn level_badge(&self) -> String {
        let region = self.effective_region();
        match self.effective_level() {
            Level::Central => "Central".to_string(),
            Level::State => match region {
                Some(region) => format!("State - {region}"),
                None => "State".to_string(),
            },
            Level::Local => {
                let mut badge = "Local".to_string();
                if let Some(orgtype) = non_blank(self.orgtype.as_deref()) {
                    badge.push_str(" - ");
                    badge.push_str(&title_case(orgtype));
                }
                if let Some(region) = region {
                    badge.push_str(" - ");
                    badge.push_str(&region);
                }
                badge
            }
        }
    }

    /// Lowercased text matched by free-text queries.
    pub fn search_haystack(&self) -> String {
        format!(
            "{} {} {} {}",
            self.body,
            self.exam,
            self.cycle.as_deref().unwrap_or_default(),
            self.notes.as_deref().unwrap_or_default()
        )
        .to_lowercase()
    }

    /// Trims text fields and drops blank optional ones.
    pub fn normalized(mut self) -> Self {
        self.body = self.body.trim().to_string();
        self.exam = self.exam.trim().to_string();
        self.official = self.official.trim().to_string();
        self.cycle = trimmed_option(self.cycle);
        self.notes = trimmed_option(self.notes);
        self.region = trimmed_option(self.region);
        self.orgtype = trimmed_option(self.orgtype);
        self.history = self
            .history
            .into_iter()
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect();
        self
    }
}

/// Partial record stored as an override on a shipped id. `id` is absent by
/// construction so an override can never rename a record.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub exam: Option<String>,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub cycle: Option<String>,
    pub window: Option<Window>,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub official: Option<String>,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_level")]
    pub level: Option<Level>,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub orgtype: Option<String>,
    #[serde(default, deserialize_with = "loose_optional_history")]
    pub history: Option<Vec<String>>,
}

impl RecordPatch {
    /// Override carrying every editable field of `record`. Cleared optional
    /// text is kept as an empty string so it still masks the shipped value.
    pub fn from_record(record: &Record) -> Self {
        Self {
            body: Some(record.body.clone()),
            exam: Some(record.exam.clone()),
            cycle: Some(record.cycle.clone().unwrap_or_default()),
            window: Some(record.window),
            official: Some(record.official.clone()),
            notes: Some(record.notes.clone().unwrap_or_default()),
            level: record.level,
            region: Some(record.region.clone().unwrap_or_default()),
            orgtype: record.orgtype.clone(),
            history: Some(record.history.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == RecordPatch::default()
    }

    /// Shallow merge: every field present in the patch wins.
    pub fn apply_to(&self, record: &mut Record) {
        if let Some(body) = &self.body {
            record.body = body.clone();
        }
        if let Some(exam) = &self.exam {
            record.exam = exam.clone();
        }
        if let Some(cycle) = &self.cycle {
            record.cycle = Some(cycle.clone());
        }
        if let Some(window) = self.window {
            record.window = window;
        }
        if let Some(official) = &self.official {
            record.official = official.clone();
        }
        if let Some(notes) = &self.notes {
            record.notes = Some(notes.clone());
        }
        if let Some(level) = self.level {
            record.level = Some(level);
        }
        if let Some(region) = &self.region {
            record.region = Some(region.clone());
        }
        if let Some(orgtype) = &self.orgtype {
            record.orgtype = Some(orgtype.clone());
        }
        if let Some(history) = &self.history {
            record.history = history.clone();
        }
    }
}

pub fn infer_level(body: &str) -> Level {
    let key = body.trim().to_uppercase();
    if key.is_empty() || CENTRAL_BODIES.contains(&key.as_str()) {
        return Level::Central;
    }
    if STATE_BODIES.iter().any(|(name, _)| *name == key) {
        return Level::State;
    }
    Level::Local
}

pub fn infer_region(body: &str) -> Option<&'static str> {
    let key = body.trim().to_uppercase();
    STATE_BODIES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, region)| *region)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn trimmed_option(value: Option<String>) -> Option<String> {
    non_blank(value.as_deref()).map(str::to_string)
}

fn title_case(raw: &str) -> String {
    raw.replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

// Hand-edited datasets carry numbers where strings are expected
// (`"cycle": 2025`, `"history": [2019, "2023-05"]`).
fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(scalar_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn loose_optional_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(scalar_to_string(Value::deserialize(deserializer)?))
}

fn history_entries(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(other).into_iter().collect(),
    }
}

fn loose_history<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(history_entries(Value::deserialize(deserializer)?))
}

fn loose_optional_history<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        other => Ok(Some(history_entries(other))),
    }
}

fn lenient_level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Level>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(|raw| raw.trim().parse::<Level>().ok()))
}
