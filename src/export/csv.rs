use crate::model::Record;
use crate::rotation::{self, format_optional_years};

const HEADER: [&str; 10] = [
    "Body",
    "Level",
    "State/UT",
    "Exam",
    "Cycle",
    "Rotation (next gap)",
    "Avg rotation",
    "Window",
    "Official",
    "Notes",
];

/// Spreadsheet export of `records` in the given order. Every cell is quoted
/// and rows end with CRLF.
pub fn to_csv(records: &[Record]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(row(HEADER.iter().map(|cell| cell.to_string())));
    for record in records {
        let estimate = rotation::estimate_record(record);
        lines.push(row([
            record.body.clone(),
            record.effective_level().to_string(),
            record.effective_region().unwrap_or_default(),
            record.exam.clone(),
            record.cycle.clone().unwrap_or_default(),
            format_optional_years(estimate.map(|r| r.gap_years)),
            format_optional_years(estimate.and_then(|r| r.average_years)),
            record.window.label(),
            record.official.clone(),
            record.notes.clone().unwrap_or_default(),
        ]));
    }
    lines.join("\r\n")
}

fn row(cells: impl IntoIterator<Item = String>) -> String {
    cells
        .into_iter()
        .map(|cell| format!("\"{}\"", cell.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",")
}
