//! iCalendar placeholders: each record becomes a one-hour event at 09:00
//! (floating time) on the first day of its window.

use time::macros::format_description;
use time::Date;

use crate::model::Record;

const PRODID: &str = "-//Recruit Bodywise//EN";
const UID_DOMAIN: &str = "recruit-bodywise.local";

/// One calendar holding a VEVENT per record. Unscheduled records are placed
/// on `today`.
pub fn calendar(records: &[Record], today: Date) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{PRODID}"),
    ];
    for record in records {
        lines.extend(event_lines(record, today));
    }
    lines.push("END:VCALENDAR".to_string());
    let mut body = lines.join("\r\n");
    body.push_str("\r\n");
    body
}

fn event_lines(record: &Record, today: Date) -> Vec<String> {
    let day = record.window.start_date().unwrap_or(today);
    let stamp = day
        .format(format_description!("[year][month][day]"))
        .unwrap_or_default();
    let start = format!("{stamp}T090000");
    let end = format!("{stamp}T100000");
    let summary = format!(
        "{}: {} ({}) - Tentative Notification",
        record.body,
        record.exam,
        record.cycle.as_deref().unwrap_or_default()
    );
    let description = format!(
        "Tentative notification window: {}. Verify on official site: {}",
        record.window.label(),
        record.official
    );
    vec![
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@{UID_DOMAIN}", record.id),
        format!("DTSTAMP:{start}"),
        format!("DTSTART:{start}"),
        format!("DTEND:{end}"),
        format!("SUMMARY:{}", escape_text(&summary)),
        format!("DESCRIPTION:{}", escape_text(&description)),
        "END:VEVENT".to_string(),
    ]
}

fn escape_text(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            other => escaped.push(other),
        }
    }
    escaped
}
