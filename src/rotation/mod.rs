//! Rotation estimate: how long since a body last notified an exam, and how
//! often it has done so historically. Display only; never feeds filtering.

use once_cell::sync::Lazy;
use regex::Regex;
use time::macros::time;
use time::{Date, Month, OffsetDateTime};

use crate::model::{Record, Window};

const MILLIS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0 * 1000.0;

static HISTORY_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})(?:-(\d{2})(?:-(\d{2}))?)?$").expect("valid history pattern")
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    /// Latest history entry not after `next` (or the latest overall when
    /// `next` predates every entry).
    pub last: OffsetDateTime,
    pub next: OffsetDateTime,
    pub gap_years: f64,
    /// Mean spacing of consecutive history entries; needs two or more.
    pub average_years: Option<f64>,
}

/// Returns `None` when the window is unscheduled or no history entry parses.
pub fn estimate(history: &[String], window: &Window) -> Option<Rotation> {
    let next = window.approx_instant()?;
    let instants = history_instants(history);
    let latest = *instants.last()?;
    let last = instants
        .iter()
        .rev()
        .find(|instant| **instant <= next)
        .copied()
        .unwrap_or(latest);

    let average_years = if instants.len() >= 2 {
        let total: f64 = instants
            .windows(2)
            .map(|pair| years_between(pair[0], pair[1]))
            .sum();
        Some(total / (instants.len() - 1) as f64)
    } else {
        None
    };

    Some(Rotation {
        last,
        next,
        gap_years: years_between(last, next),
        average_years,
    })
}

pub fn estimate_record(record: &Record) -> Option<Rotation> {
    estimate(&record.history, &record.window)
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM` and `YYYY`, pinned to 09:00 UTC.
pub fn parse_history_date(raw: &str) -> Option<OffsetDateTime> {
    let caps = HISTORY_DATE.captures(raw.trim())?;
    let year: i32 = caps[1].parse().ok()?;
    let month = match caps.get(2) {
        Some(m) => Month::try_from(m.as_str().parse::<u8>().ok()?).ok()?,
        None => Month::January,
    };
    let day = match caps.get(3) {
        Some(d) => d.as_str().parse::<u8>().ok()?,
        None => 1,
    };
    let date = Date::from_calendar_date(year, month, day).ok()?;
    Some(date.with_time(time!(9:00)).assume_utc())
}

/// Parsed history, unparseable entries dropped, oldest first.
pub fn history_instants(history: &[String]) -> Vec<OffsetDateTime> {
    let mut instants: Vec<OffsetDateTime> = history
        .iter()
        .filter_map(|entry| parse_history_date(entry))
        .collect();
    instants.sort();
    instants
}

pub fn years_between(a: OffsetDateTime, b: OffsetDateTime) -> f64 {
    let millis = (b - a).whole_milliseconds().unsigned_abs() as f64;
    millis / MILLIS_PER_YEAR
}

/// `< 1` year renders as whole months, otherwise one decimal of years.
pub fn format_years(years: f64) -> String {
    if !years.is_finite() {
        return "—".to_string();
    }
    if years < 1.0 {
        format!("{} mo", (years * 12.0).round() as i64)
    } else {
        format!("{:.1} y", (years * 10.0).round() / 10.0)
    }
}

pub fn format_optional_years(years: Option<f64>) -> String {
    years.map(format_years).unwrap_or_else(|| "—".to_string())
}

/// Compact cell text, e.g. `≈ 2.0 y (avg 3.2 y)`.
pub fn summary(rotation: Option<&Rotation>) -> String {
    match rotation {
        Some(rotation) if rotation.gap_years > 0.0 => {
            let mut text = format!("≈ {}", format_years(rotation.gap_years));
            if let Some(average) = rotation.average_years {
                text.push_str(&format!(" (avg {})", format_years(average)));
            }
            text
        }
        _ => "—".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn history(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|entry| entry.to_string()).collect()
    }

    #[test]
    fn parses_three_history_formats_at_nine() {
        let full = parse_history_date("2025-06-01").expect("full date");
        let month = parse_history_date(" 2023-05 ").expect("year-month");
        let year = parse_history_date("2019").expect("bare year");
        assert_eq!(full.date(), date!(2025 - 06 - 01));
        assert_eq!(month.date(), date!(2023 - 05 - 01));
        assert_eq!(year.date(), date!(2019 - 01 - 01));
        assert!([full, month, year].iter().all(|instant| instant.hour() == 9));
    }

    #[test]
    fn rejects_unparseable_history() {
        for raw in ["", "May 2023", "2023/05", "2023-13", "2023-02-30", "19"] {
            assert!(parse_history_date(raw).is_none(), "{raw}");
        }
    }

    #[test]
    fn average_and_gap_from_mixed_history() {
        let rotation = estimate(
            &history(&["2019", "2023-05", "2025-06-01"]),
            &Window::Date(date!(2027 - 06 - 01)),
        )
        .expect("rotation known");
        let average = rotation.average_years.expect("average known");
        assert!((average - 3.207).abs() < 0.01, "average was {average}");
        assert!((rotation.gap_years - 2.0).abs() < 0.01);
        assert_eq!(rotation.last.date(), date!(2025 - 06 - 01));
        assert_eq!(rotation.next.date(), date!(2027 - 06 - 01));
    }

    #[test]
    fn history_order_does_not_matter() {
        let window = Window::Date(date!(2027 - 06 - 01));
        let sorted = estimate(&history(&["2019", "2023-05", "2025-06-01"]), &window);
        let shuffled = estimate(&history(&["2025-06-01", "2019", "2023-05"]), &window);
        assert_eq!(sorted, shuffled);
    }

    #[test]
    fn last_falls_back_to_latest_when_next_predates_history() {
        let rotation = estimate(
            &history(&["2024-01-01", "2026-01-01"]),
            &Window::Date(date!(2020 - 01 - 01)),
        )
        .expect("rotation known");
        assert_eq!(rotation.last.date(), date!(2026 - 01 - 01));
        assert!(rotation.gap_years > 5.9);
    }

    #[test]
    fn unknown_without_window_or_history() {
        assert!(estimate(&history(&["2020"]), &Window::Tbd).is_none());
        assert!(estimate(&[], &Window::Date(date!(2025 - 01 - 01))).is_none());
        assert!(estimate(&history(&["soon"]), &Window::Date(date!(2025 - 01 - 01))).is_none());
    }

    #[test]
    fn single_entry_has_no_average() {
        let rotation = estimate(&history(&["2024"]), &Window::Date(date!(2025 - 01 - 01)))
            .expect("rotation known");
        assert!(rotation.average_years.is_none());
    }

    #[test]
    fn formats_months_below_a_year() {
        assert_eq!(format_years(0.5), "6 mo");
        assert_eq!(format_years(0.0), "0 mo");
        assert_eq!(format_years(1.0), "1.0 y");
        assert_eq!(format_years(3.207), "3.2 y");
        assert_eq!(format_years(f64::NAN), "—");
        assert_eq!(format_optional_years(None), "—");
    }
}
