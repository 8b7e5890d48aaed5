//! Tentative notification windows.
//!
//! A window is one of four calendar shapes (exact day, month, quarter,
//! half-year) or `Tbd`. Anything that cannot be read as one of the four
//! shapes collapses to `Tbd` instead of failing the surrounding record.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use strum::{Display, EnumString};
use thiserror::Error;
use time::macros::{format_description, time};
use time::{Date, Month, OffsetDateTime};

/// Sort key used for `Tbd`; larger than the key of any real calendar day.
pub const UNSCHEDULED_SORT_KEY: i64 = i64::MAX;

static ISO_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("valid day pattern"));
static ISO_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("valid month pattern"));
static PERIOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(q[1-4]|h[12])[\s\-/]+(\d{4})$").expect("valid period pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WindowKind {
    Date,
    Month,
    Quarter,
    Half,
    Tbd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub fn start_month(self) -> Month {
        match self {
            Quarter::Q1 => Month::January,
            Quarter::Q2 => Month::April,
            Quarter::Q3 => Month::July,
            Quarter::Q4 => Month::October,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Half {
    H1,
    H2,
}

impl Half {
    pub fn start_month(self) -> Month {
        match self {
            Half::H1 => Month::January,
            Half::H2 => Month::July,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Window {
    Date(Date),
    Month { year: i32, month: Month },
    Quarter { year: i32, quarter: Quarter },
    Half { year: i32, half: Half },
    #[default]
    Tbd,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised window `{0}`; expected YYYY-MM-DD, YYYY-MM, Q1-YYYY, H1-YYYY or tbd")]
pub struct WindowParseError(pub String);

impl Window {
    pub fn kind(&self) -> WindowKind {
        match self {
            Window::Date(_) => WindowKind::Date,
            Window::Month { .. } => WindowKind::Month,
            Window::Quarter { .. } => WindowKind::Quarter,
            Window::Half { .. } => WindowKind::Half,
            Window::Tbd => WindowKind::Tbd,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        !matches!(self, Window::Tbd)
    }

    /// First calendar day covered by the window, `None` for `Tbd`.
    pub fn start_date(&self) -> Option<Date> {
        match *self {
            Window::Date(date) => Some(date),
            Window::Month { year, month } => Date::from_calendar_date(year, month, 1).ok(),
            Window::Quarter { year, quarter } => {
                Date::from_calendar_date(year, quarter.start_month(), 1).ok()
            }
            Window::Half { year, half } => {
                Date::from_calendar_date(year, half.start_month(), 1).ok()
            }
            Window::Tbd => None,
        }
    }

    pub fn label(&self) -> String {
        match *self {
            Window::Date(date) => date
                .format(format_description!("[month repr:short] [day], [year]"))
                .unwrap_or_else(|_| date.to_string()),
            Window::Month { .. } => self
                .start_date()
                .and_then(|date| date.format(format_description!("[month repr:long] [year]")).ok())
                .unwrap_or_else(|| "TBD".to_string()),
            Window::Quarter { year, quarter } => format!("{quarter} {year}"),
            Window::Half { year, half } => format!("{half} {year}"),
            Window::Tbd => "TBD".to_string(),
        }
    }

    /// Milliseconds since the Unix epoch of the window start at 00:00 UTC.
    pub fn sort_key(&self) -> i64 {
        self.start_date()
            .map(|date| date.midnight().assume_utc().unix_timestamp() * 1000)
            .unwrap_or(UNSCHEDULED_SORT_KEY)
    }

    /// Window start pinned to 09:00 UTC, the instant history dates are
    /// compared against.
    pub fn approx_instant(&self) -> Option<OffsetDateTime> {
        self.start_date()
            .map(|date| date.with_time(time!(9:00)).assume_utc())
    }

    /// Reads the persisted JSON shape. Never fails: malformed input is `Tbd`.
    pub fn from_json(value: &Value) -> Self {
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Window::Tbd;
        };
        let parsed = match kind {
            "date" => value
                .get("date")
                .and_then(Value::as_str)
                .and_then(parse_iso_day)
                .map(Window::Date),
            "month" => value
                .get("month")
                .and_then(Value::as_str)
                .and_then(parse_iso_month),
            "quarter" => {
                let quarter = value
                    .get("q")
                    .and_then(Value::as_str)
                    .and_then(|raw| Quarter::from_str(raw.trim()).ok());
                let year = value.get("year").and_then(json_year);
                match (quarter, year) {
                    (Some(quarter), Some(year)) => Some(Window::Quarter { year, quarter }),
                    _ => None,
                }
            }
            "half" => {
                let half = value
                    .get("half")
                    .and_then(Value::as_str)
                    .and_then(|raw| Half::from_str(raw.trim()).ok());
                let year = value.get("year").and_then(json_year);
                match (half, year) {
                    (Some(half), Some(year)) => Some(Window::Half { year, half }),
                    _ => None,
                }
            }
            _ => None,
        };
        parsed
            .filter(|window| window.start_date().is_some())
            .unwrap_or(Window::Tbd)
    }

    fn to_json(self) -> Value {
        match self {
            Window::Date(date) => serde_json::json!({
                "type": "date",
                "date": format_iso_day(date),
            }),
            Window::Month { year, month } => serde_json::json!({
                "type": "month",
                "month": format!("{year:04}-{:02}", month as u8),
            }),
            Window::Quarter { year, quarter } => serde_json::json!({
                "type": "quarter",
                "q": quarter.to_string(),
                "year": year,
            }),
            Window::Half { year, half } => serde_json::json!({
                "type": "half",
                "half": half.to_string(),
                "year": year,
            }),
            Window::Tbd => serde_json::json!({ "type": "tbd" }),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Command-line syntax: `2025-03-01`, `2025-03`, `Q2-2025`, `H1 2026`, `tbd`.
impl FromStr for Window {
    type Err = WindowParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("tbd") {
            return Ok(Window::Tbd);
        }
        if let Some(date) = parse_iso_day(trimmed) {
            return Ok(Window::Date(date));
        }
        if let Some(window) = parse_iso_month(trimmed) {
            return Ok(window);
        }
        if let Some(caps) = PERIOD.captures(trimmed) {
            let label = &caps[1];
            let year: i32 = caps[2]
                .parse()
                .map_err(|_| WindowParseError(trimmed.to_string()))?;
            let window = if let Ok(quarter) = Quarter::from_str(label) {
                Window::Quarter { year, quarter }
            } else if let Ok(half) = Half::from_str(label) {
                Window::Half { year, half }
            } else {
                return Err(WindowParseError(trimmed.to_string()));
            };
            if window.start_date().is_some() {
                return Ok(window);
            }
        }
        Err(WindowParseError(trimmed.to_string()))
    }
}

impl Serialize for Window {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Window {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Window::from_json(&value))
    }
}

pub(crate) fn parse_iso_day(raw: &str) -> Option<Date> {
    let caps = ISO_DAY.captures(raw.trim())?;
    let year: i32 = caps[1].parse().ok()?;
    let month = Month::try_from(caps[2].parse::<u8>().ok()?).ok()?;
    let day: u8 = caps[3].parse().ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

fn parse_iso_month(raw: &str) -> Option<Window> {
    let caps = ISO_MONTH.captures(raw.trim())?;
    let year: i32 = caps[1].parse().ok()?;
    let month = Month::try_from(caps[2].parse::<u8>().ok()?).ok()?;
    Some(Window::Month { year, month })
}

fn json_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(number) => number.as_i64().and_then(|year| i32::try_from(year).ok()),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn format_iso_day(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}
