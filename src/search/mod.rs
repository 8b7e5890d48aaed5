use std::cmp::Ordering;

use anyhow::{anyhow, Context, Result};

use crate::model::{Level, Record, WindowKind};

#[derive(Debug, Clone, Copy)]
enum Field {
    Body,
    Level,
    Region,
    Type,
    Orgtype,
}

const PREFIXES: &[(&str, Field)] = &[
    ("body:", Field::Body),
    ("level:", Field::Level),
    ("region:", Field::Region),
    ("type:", Field::Type),
    ("orgtype:", Field::Orgtype),
];

/// Immutable filter selection applied to the merged collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Lowercased substring matched against body, exam, cycle and notes.
    pub text: Option<String>,
    pub window: Option<WindowKind>,
    /// Exact body name.
    pub body: Option<String>,
    pub level: Option<Level>,
    /// Case-insensitive effective region.
    pub region: Option<String>,
    /// Local-body type; only consulted when `level` is `Local`.
    pub orgtype: Option<String>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        *self == FilterCriteria::default()
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(kind) = self.window {
            if record.window.kind() != kind {
                return false;
            }
        }
        if let Some(body) = &self.body {
            if record.body != *body {
                return false;
            }
        }
        if let Some(level) = self.level {
            if record.effective_level() != level {
                return false;
            }
        }
        if let Some(region) = &self.region {
            match record.effective_region() {
                Some(effective) if effective.to_lowercase() == region.to_lowercase() => {}
                _ => return false,
            }
        }
        if self.level == Some(Level::Local) {
            if let Some(orgtype) = &self.orgtype {
                if record.effective_orgtype().to_lowercase() != *orgtype {
                    return false;
                }
            }
        }
        match &self.text {
            Some(text) => record.search_haystack().contains(text.as_str()),
            None => true,
        }
    }
}

/// Parses a whitespace separated query such as `level:state region:bihar cgl`.
pub fn parse_query(input: &str) -> Result<FilterCriteria> {
    parse_query_tokens(input.split_whitespace())
}

/// Parses pre-split query tokens. A token with a known prefix is taken
/// whole, so `body:Pune Zilla Parishad` passed as one shell argument keeps
/// its spaces; any other token is split into free-text words.
pub fn parse_query_tokens<I, S>(tokens: I) -> Result<FilterCriteria>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut criteria = FilterCriteria::default();
    let mut words: Vec<String> = Vec::new();
    for token in tokens {
        let token = token.as_ref().trim();
        if token.is_empty() {
            continue;
        }
        let Some((prefix, field)) = PREFIXES
            .iter()
            .find(|(prefix, _)| starts_with_ignore_case(token, prefix))
        else {
            words.extend(token.split_whitespace().map(str::to_lowercase));
            continue;
        };
        let value = token[prefix.len()..].trim();
        if value.is_empty() {
            continue;
        }
        match field {
            Field::Body => criteria.body = Some(value.to_string()),
            Field::Level => {
                let level = value
                    .parse::<Level>()
                    .map_err(|_| anyhow!("unknown level `{value}`"))
                    .context("expected central, state or local")?;
                criteria.level = Some(level);
            }
            Field::Region => criteria.region = Some(value.to_string()),
            Field::Type => {
                let kind = value
                    .parse::<WindowKind>()
                    .map_err(|_| anyhow!("unknown window type `{value}`"))
                    .context("expected date, month, quarter, half or tbd")?;
                criteria.window = Some(kind);
            }
            Field::Orgtype => criteria.orgtype = Some(value.to_lowercase()),
        }
    }
    if !words.is_empty() {
        criteria.text = Some(words.join(" "));
    }
    Ok(criteria)
}

pub fn apply_filters(records: Vec<Record>, criteria: &FilterCriteria) -> Vec<Record> {
    records
        .into_iter()
        .filter(|record| criteria.matches(record))
        .collect()
}

/// Orders by window start, then body, then exam (both case-insensitive).
/// The sort is stable, so full ties keep their merged order.
pub fn sort_records(records: &mut [Record]) {
    records.sort_by(|a, b| {
        a.window
            .sort_key()
            .cmp(&b.window.sort_key())
            .then_with(|| a.body.to_lowercase().cmp(&b.body.to_lowercase()))
            .then_with(|| a.exam.to_lowercase().cmp(&b.exam.to_lowercase()))
    });
}

/// Groups already-sorted records by body; groups come out in name order and
/// keep the record order within each group.
pub fn group_by_body(records: &[Record]) -> Vec<(String, Vec<&Record>)> {
    let mut groups: Vec<(String, Vec<&Record>)> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|(body, _)| *body == record.body) {
            Some((_, members)) => members.push(record),
            None => groups.push((record.body.clone(), vec![record])),
        }
    }
    groups.sort_by(|a, b| compare_names(&a.0, &b.0));
    groups
}

/// Case-insensitive name order with the raw string as tiebreak.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn starts_with_ignore_case(token: &str, prefix: &str) -> bool {
    token
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Window;
    use time::macros::date;

    fn record(body: &str, exam: &str, window: Window) -> Record {
        Record::new(body, exam, "https://example.gov.in", window)
    }

    #[test]
    fn parses_prefixed_tokens_and_free_text() -> anyhow::Result<()> {
        let criteria = parse_query("level:local Region:Maharashtra orgtype:Zilla_Parishad type:tbd Clerk 2025")?;
        assert_eq!(criteria.level, Some(Level::Local));
        assert_eq!(criteria.region.as_deref(), Some("Maharashtra"));
        assert_eq!(criteria.orgtype.as_deref(), Some("zilla_parishad"));
        assert_eq!(criteria.window, Some(WindowKind::Tbd));
        assert_eq!(criteria.text.as_deref(), Some("clerk 2025"));
        assert!(parse_query("")?.is_empty());
        Ok(())
    }

    #[test]
    fn prefixed_argument_keeps_its_spaces() -> anyhow::Result<()> {
        let criteria = parse_query_tokens(["body:Pune Zilla Parishad", "gramsevak exam"])?;
        assert_eq!(criteria.body.as_deref(), Some("Pune Zilla Parishad"));
        assert_eq!(criteria.text.as_deref(), Some("gramsevak exam"));
        Ok(())
    }

    #[test]
    fn unknown_level_or_window_type_is_rejected() {
        assert!(parse_query("level:district").is_err());
        assert!(parse_query("type:weekly").is_err());
    }

    #[test]
    fn orgtype_only_applies_to_local_level() -> anyhow::Result<()> {
        let mut bmc = record("BMC", "Clerk", Window::Tbd);
        bmc.orgtype = Some("municipal_corporation".into());
        let untyped = record("Pune Zilla Parishad", "Gramsevak", Window::Tbd);
        let mpsc = record("MPSC", "Rajyaseva", Window::Tbd);

        let criteria = parse_query("orgtype:other")?;
        assert!(criteria.matches(&bmc) && criteria.matches(&mpsc));

        let criteria = parse_query("level:local orgtype:other")?;
        assert!(!criteria.matches(&bmc));
        assert!(criteria.matches(&untyped));
        assert!(!criteria.matches(&mpsc));
        Ok(())
    }

    #[test]
    fn region_uses_inferred_value_case_insensitively() -> anyhow::Result<()> {
        let criteria = parse_query("region:tamil nadu")?;
        assert_eq!(criteria.region.as_deref(), Some("tamil"));
        let criteria = parse_query_tokens(["region:tamil nadu"])?;
        assert!(criteria.matches(&record("TNPSC", "Group 4", Window::Tbd)));
        assert!(!criteria.matches(&record("SSC", "CGL", Window::Tbd)));
        Ok(())
    }

    #[test]
    fn free_text_searches_cycle_and_notes() -> anyhow::Result<()> {
        let mut rec = record("SSC", "CGL", Window::Tbd);
        rec.notes = Some("Tier II in December".into());
        assert!(parse_query("tier ii")?.matches(&rec));
        assert!(parse_query("ssc cgl")?.matches(&rec));
        assert!(!parse_query("chsl")?.matches(&rec));
        Ok(())
    }

    #[test]
    fn sorting_is_by_window_then_body_then_exam() {
        let mut records = vec![
            record("UPSC", "CSE", Window::Tbd),
            record("ssc", "CHSL", Window::Date(date!(2025 - 04 - 01))),
            record("SSC", "cgl", Window::Date(date!(2025 - 04 - 01))),
            record("BPSC", "CCE", Window::Date(date!(2025 - 04 - 01))),
            record("MPSC", "Rajyaseva", Window::Date(date!(2025 - 01 - 10))),
        ];
        sort_records(&mut records);
        let order: Vec<&str> = records.iter().map(|r| r.exam.as_str()).collect();
        assert_eq!(order, vec!["Rajyaseva", "CCE", "cgl", "CHSL", "CSE"]);
    }

    #[test]
    fn full_ties_keep_input_order() {
        let mut first = record("SSC", "CGL", Window::Tbd);
        first.id = "a".into();
        let mut second = record("SSC", "CGL", Window::Tbd);
        second.id = "b".into();
        let mut records = vec![first, second];
        sort_records(&mut records);
        sort_records(&mut records);
        assert_eq!(records[0].id, "a");
        assert_eq!(records[1].id, "b");
    }

    #[test]
    fn groups_are_name_ordered() {
        let records = vec![
            record("SSC", "CGL", Window::Tbd),
            record("bmc", "Clerk", Window::Tbd),
            record("SSC", "CHSL", Window::Tbd),
        ];
        let groups = group_by_body(&records);
        let names: Vec<&str> = groups.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["bmc", "SSC"]);
        assert_eq!(groups[1].1.len(), 2);
        assert_eq!(groups[1].1[1].exam, "CHSL");
    }
}
