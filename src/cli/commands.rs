use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use time::OffsetDateTime;

use crate::allowlist::{host_of, OfficialAllowlist};
use crate::config::AppConfig;
use crate::export::{self, csv, ics};
use crate::model::{Level, Record, Window};
use crate::rotation;
use crate::search::{apply_filters, group_by_body, parse_query_tokens, sort_records};
use crate::storage::LocalState;
use crate::store::{RecordStore, UpsertKind};

#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Filter tokens: body:, level:, region:, type:, orgtype: and free text
    #[arg()]
    pub query: Vec<String>,
}

/// Editable record fields shared by `add` and `edit`.
#[derive(Args, Debug, Clone, Default)]
pub struct RecordFields {
    /// Issuing body, e.g. SSC or "Pune Zilla Parishad"
    #[arg(long)]
    pub body: Option<String>,
    #[arg(long)]
    pub exam: Option<String>,
    /// Official notification link
    #[arg(long)]
    pub official: Option<String>,
    #[arg(long)]
    pub cycle: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    /// central, state or local (inferred from the body when omitted)
    #[arg(long)]
    pub level: Option<Level>,
    /// State/UT for state and local bodies
    #[arg(long)]
    pub region: Option<String>,
    /// Local-body type, e.g. municipal_corporation
    #[arg(long)]
    pub orgtype: Option<String>,
    /// 2025-03-01, 2025-03, Q2-2025, H1-2026 or tbd
    #[arg(long)]
    pub window: Option<Window>,
    /// Past notification dates, comma separated (2019, 2023-05, 2025-06-01)
    #[arg(long, value_delimiter = ',')]
    pub history: Option<Vec<String>>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AddArgs {
    #[command(flatten)]
    pub fields: RecordFields,
    /// Save even when the official link is not on the allowlist
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    /// Record identifier
    pub id: String,
    #[command(flatten)]
    pub fields: RecordFields,
    /// Save even when the official link is not on the allowlist
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Record identifier
    pub id: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BodyCommand {
    /// Register a body that has no exams yet
    Add(BodyNameArgs),
    /// Forget a custom body (its exams are kept)
    Remove(BodyNameArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BodyNameArgs {
    pub name: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ResetArgs {
    /// Confirm discarding all local additions, edits and deletions
    #[arg(long)]
    pub yes: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Ics,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[arg(value_enum)]
    pub format: ExportFormat,
    /// Output file (defaults to the configured export directory)
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Filter tokens applied to CSV and ICS exports
    #[arg()]
    pub query: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Snapshot or legacy additions file
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CheckLinkArgs {
    pub url: String,
}

pub fn list_records(store: &RecordStore, args: QueryArgs) -> Result<()> {
    print!("{}", render_listing(store, &args)?);
    Ok(())
}

fn filtered_records(store: &RecordStore, query: &[String]) -> Result<Vec<Record>> {
    let criteria = parse_query_tokens(query).context("parsing filter query")?;
    let mut records = apply_filters(store.list_all()?, &criteria);
    sort_records(&mut records);
    Ok(records)
}

fn render_listing(store: &RecordStore, args: &QueryArgs) -> Result<String> {
    let records = filtered_records(store, &args.query)?;
    let state = store.local_state()?;
    Ok(format_listing(&records, &state, store.allowlist()))
}

fn format_listing(records: &[Record], state: &LocalState, allowlist: &OfficialAllowlist) -> String {
    if records.is_empty() {
        return "No results for the current filters.\n".to_string();
    }
    let mut out = String::new();
    for (body, members) in group_by_body(records) {
        let noun = if members.len() == 1 { "item" } else { "items" };
        let _ = writeln!(&mut out, "{body} ({} {noun})", members.len());
        for record in members {
            let mut headline = format!("  {}  {}", record.id, record.exam);
            if let Some(cycle) = record.cycle.as_deref().filter(|c| !c.is_empty()) {
                let _ = write!(&mut headline, " ({cycle})");
            }
            let _ = writeln!(
                &mut out,
                "{headline}  |  {}  |  {}  |  {}",
                record.level_badge(),
                rotation::summary(rotation::estimate_record(record).as_ref()),
                record.window.label()
            );
            let mut link = format!("      {}", record.official);
            if allowlist.is_official(&record.official) {
                link.push_str("  [official]");
            } else {
                link.push_str("  [unverified link]");
            }
            if state.overrides.contains_key(&record.id) {
                link.push_str("  [Edited]");
            }
            let _ = writeln!(&mut out, "{link}");
        }
        out.push('\n');
    }
    out
}

pub fn list_bodies(store: &RecordStore) -> Result<()> {
    let bodies = store.list_bodies()?;
    if bodies.is_empty() {
        println!("(no bodies)");
    }
    for body in bodies {
        println!("{body}");
    }
    Ok(())
}

pub fn list_regions(store: &RecordStore, args: QueryArgs) -> Result<()> {
    let records = filtered_records(store, &args.query)?;
    let regions = RecordStore::list_regions(&records);
    if regions.is_empty() {
        println!("(no regions)");
    }
    for region in regions {
        println!("{region}");
    }
    Ok(())
}

pub fn add_record(store: &RecordStore, args: AddArgs) -> Result<()> {
    println!("{}", run_add(store, args)?);
    Ok(())
}

fn run_add(store: &RecordStore, args: AddArgs) -> Result<String> {
    let mut record = Record::new(String::new(), String::new(), String::new(), Window::Tbd);
    apply_fields(&mut record, args.fields);
    ensure_official(store.allowlist(), &record.official, args.force)?;

    let outcome = store
        .upsert(record.clone(), UpsertKind::New)
        .context("saving new record")?;
    let mut message = format!("Added {} ({}: {})", outcome.id, record.body.trim(), record.exam.trim());
    if outcome.registered_body {
        let _ = write!(&mut message, "\nRegistered new body {}", record.body.trim());
    }
    Ok(message)
}

pub fn edit_record(store: &RecordStore, args: EditArgs) -> Result<()> {
    println!("{}", run_edit(store, args)?);
    Ok(())
}

fn run_edit(store: &RecordStore, args: EditArgs) -> Result<String> {
    let mut record = store.get_for_edit(&args.id)?;
    let kind = UpsertKind::for_origin(record.origin);
    apply_fields(&mut record, args.fields);
    ensure_official(store.allowlist(), &record.official, args.force)?;

    let outcome = store
        .upsert(record, kind)
        .with_context(|| format!("saving record {}", args.id))?;
    let mut message = format!("Updated {}", outcome.id);
    if outcome.undeleted {
        message.push_str(" (restored)");
    }
    Ok(message)
}

pub fn delete_record(store: &RecordStore, args: DeleteArgs) -> Result<()> {
    let record = store.get_for_edit(&args.id)?;
    store.remove(&record.id, record.origin)?;
    println!("Deleted {} ({}: {})", record.id, record.body, record.exam);
    Ok(())
}

pub fn handle_body_command(store: &RecordStore, command: BodyCommand) -> Result<()> {
    match command {
        BodyCommand::Add(args) => {
            store.add_custom_body(&args.name)?;
            println!("Added body {}", args.name.trim());
        }
        BodyCommand::Remove(args) => {
            store.remove_custom_body(&args.name)?;
            println!("Removed body {}", args.name.trim());
        }
    }
    Ok(())
}

pub fn reset_local(store: &RecordStore, args: ResetArgs) -> Result<()> {
    if !args.yes {
        bail!("reset discards all local additions, edits and deletions; re-run with --yes");
    }
    let summary = store.reset_local()?;
    println!(
        "Reset {} additions, {} edits, {} deletions, {} custom bodies",
        summary.additions, summary.overrides, summary.deletions, summary.custom_bodies
    );
    Ok(())
}

pub fn export_records(config: &AppConfig, store: &RecordStore, args: ExportArgs) -> Result<()> {
    let path = run_export(config, store, &args)?;
    println!("Exported to {}", path.display());
    Ok(())
}

fn run_export(config: &AppConfig, store: &RecordStore, args: &ExportArgs) -> Result<PathBuf> {
    let (contents, file_name) = match args.format {
        ExportFormat::Csv => {
            let records = filtered_records(store, &args.query)?;
            (csv::to_csv(&records), &config.export.csv_file_name)
        }
        ExportFormat::Ics => {
            let records = filtered_records(store, &args.query)?;
            let today = OffsetDateTime::now_utc().date();
            (ics::calendar(&records, today), &config.export.ics_file_name)
        }
        ExportFormat::Json => (store.export_snapshot()?, &config.export.snapshot_file_name),
    };
    let path = args
        .out
        .clone()
        .unwrap_or_else(|| config.export.dir.join(file_name));
    export::write_atomic(&path, contents.as_bytes())?;
    Ok(path)
}

pub fn import_state(store: &RecordStore, args: ImportArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.path)
        .with_context(|| format!("reading import file {}", args.path.display()))?;
    let summary = store.import_snapshot(&raw)?;
    println!(
        "Imported: {} additions, {} edits, {} deletions, {} custom bodies",
        summary.additions, summary.overrides, summary.deletions, summary.custom_bodies
    );
    Ok(())
}

pub fn check_link(store: &RecordStore, args: CheckLinkArgs) -> Result<()> {
    println!("{}", describe_link(store.allowlist(), &args.url));
    Ok(())
}

fn describe_link(allowlist: &OfficialAllowlist, url: &str) -> String {
    match host_of(url) {
        Some(host) if allowlist.is_official(url) => format!("official ({host})"),
        Some(host) => format!("not on the allowlist ({host})"),
        None => "not a valid URL".to_string(),
    }
}

fn apply_fields(record: &mut Record, fields: RecordFields) {
    if let Some(body) = fields.body {
        record.body = body;
    }
    if let Some(exam) = fields.exam {
        record.exam = exam;
    }
    if let Some(official) = fields.official {
        record.official = official;
    }
    if let Some(cycle) = fields.cycle {
        record.cycle = Some(cycle);
    }
    if let Some(notes) = fields.notes {
        record.notes = Some(notes);
    }
    if let Some(level) = fields.level {
        record.level = Some(level);
    }
    if let Some(region) = fields.region {
        record.region = Some(region);
    }
    if let Some(orgtype) = fields.orgtype {
        record.orgtype = Some(orgtype);
    }
    if let Some(window) = fields.window {
        record.window = window;
    }
    if let Some(history) = fields.history {
        record.history = history;
    }
}

fn ensure_official(allowlist: &OfficialAllowlist, official: &str, force: bool) -> Result<()> {
    let official = official.trim();
    if force || official.is_empty() || allowlist.is_official(official) {
        return Ok(());
    }
    bail!("`{official}` is not on the official-link allowlist; pass --force to save anyway")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Origin, RecordPatch};
    use crate::storage::test_support::init_storage;
    use crate::storage::StorageHandle;
    use serde_json::json;
    use tempfile::TempDir;

    type TestResult<T = ()> = Result<T>;

    fn shipped() -> Vec<Record> {
        serde_json::from_value(json!([
            {
                "id": "s1",
                "body": "SSC",
                "exam": "CGL",
                "window": {"type": "date", "date": "2025-03-01"},
                "official": "https://ssc.gov.in"
            },
            {
                "id": "s2",
                "body": "MPSC",
                "exam": "Rajyaseva",
                "window": {"type": "quarter", "q": "Q2", "year": 2025},
                "official": "https://mpsc.gov.in",
                "history": ["2019", "2023-05"]
            }
        ]))
        .expect("valid dataset")
    }

    fn setup_store() -> TestResult<(TempDir, StorageHandle, RecordStore)> {
        let (temp, storage) = init_storage()?;
        let store = RecordStore::new(shipped(), storage.clone());
        Ok((temp, storage, store))
    }

    fn local_addition(id: &str, exam: &str, official: &str) -> Record {
        let mut record = Record::new("BMC", exam, official, Window::Tbd);
        record.id = id.into();
        record.orgtype = Some("municipal_corporation".into());
        record.region = Some("Maharashtra".into());
        record
    }

    fn query(tokens: &[&str]) -> QueryArgs {
        QueryArgs {
            query: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn listing_groups_by_body_with_badges() -> TestResult {
        let (_temp, storage, store) = setup_store()?;
        let mut state = LocalState::default();
        state
            .additions
            .push(local_addition("user-b", "Driver", "https://example.com/bmc"));
        state
            .additions
            .push(local_addition("user-a", "Clerk", "https://portal.mcgm.gov.in"));
        state.overrides.insert(
            "s2".into(),
            RecordPatch {
                cycle: Some("2025".into()),
                ..RecordPatch::default()
            },
        );
        storage.save_state(&state)?;

        let output = render_listing(&store, &QueryArgs::default())?;
        insta::assert_snapshot!(output.trim_end(), @r###"
        BMC (2 items)
          user-a  Clerk  |  Local - Municipal Corporation - Maharashtra  |  —  |  TBD
              https://portal.mcgm.gov.in  [official]
          user-b  Driver  |  Local - Municipal Corporation - Maharashtra  |  —  |  TBD
              https://example.com/bmc  [unverified link]

        MPSC (1 item)
          s2  Rajyaseva (2025)  |  State - Maharashtra  |  ≈ 1.9 y (avg 4.3 y)  |  Q2 2025
              https://mpsc.gov.in  [official]  [Edited]

        SSC (1 item)
          s1  CGL  |  Central  |  —  |  Mar 01, 2025
              https://ssc.gov.in  [official]
        "###);
        Ok(())
    }

    #[test]
    fn listing_honours_filters() -> TestResult {
        let (_temp, _storage, store) = setup_store()?;
        let output = render_listing(&store, &query(&["level:state"]))?;
        assert!(output.contains("MPSC (1 item)"));
        assert!(!output.contains("SSC"));

        let output = render_listing(&store, &query(&["type:half"]))?;
        assert_eq!(output, "No results for the current filters.\n");
        Ok(())
    }

    #[test]
    fn add_refuses_unofficial_link_without_force() -> TestResult {
        let (_temp, _storage, store) = setup_store()?;
        let fields = RecordFields {
            body: Some("Pune Zilla Parishad".into()),
            exam: Some("Gramsevak".into()),
            official: Some("https://example.com/pune".into()),
            ..RecordFields::default()
        };
        let refused = run_add(
            &store,
            AddArgs {
                fields: fields.clone(),
                force: false,
            },
        );
        assert!(refused.is_err());
        assert_eq!(store.list_all()?.len(), 2);

        let message = run_add(&store, AddArgs { fields, force: true })?;
        assert!(message.contains("Registered new body Pune Zilla Parishad"));
        assert_eq!(store.list_all()?.len(), 3);
        Ok(())
    }

    #[test]
    fn add_reports_missing_fields() -> TestResult {
        let (_temp, _storage, store) = setup_store()?;
        let err = run_add(
            &store,
            AddArgs {
                fields: RecordFields {
                    body: Some("SSC".into()),
                    ..RecordFields::default()
                },
                force: false,
            },
        )
        .expect_err("exam and link are required");
        assert!(format!("{err:#}").contains("missing: exam, official link"));
        Ok(())
    }

    #[test]
    fn edit_of_shipped_record_writes_override() -> TestResult {
        let (_temp, _storage, store) = setup_store()?;
        let message = run_edit(
            &store,
            EditArgs {
                id: "s1".into(),
                fields: RecordFields {
                    cycle: Some("2026".into()),
                    window: Some("Q3-2026".parse()?),
                    ..RecordFields::default()
                },
                force: false,
            },
        )?;
        assert_eq!(message, "Updated s1");
        let record = store.get("s1")?.expect("still listed");
        assert_eq!(record.cycle.as_deref(), Some("2026"));
        assert_eq!(record.window.label(), "Q3 2026");
        assert_eq!(record.origin, Origin::Shipped);
        assert!(store.is_overridden("s1")?);
        Ok(())
    }

    #[test]
    fn delete_then_edit_restores_shipped_record() -> TestResult {
        let (_temp, _storage, store) = setup_store()?;
        delete_record(&store, DeleteArgs { id: "s2".into() })?;
        assert!(store.get("s2")?.is_none());

        let message = run_edit(
            &store,
            EditArgs {
                id: "s2".into(),
                ..EditArgs::default()
            },
        )?;
        assert_eq!(message, "Updated s2 (restored)");
        assert!(store.get("s2")?.is_some());
        Ok(())
    }

    #[test]
    fn reset_requires_confirmation() -> TestResult {
        let (_temp, _storage, store) = setup_store()?;
        delete_record(&store, DeleteArgs { id: "s1".into() })?;
        assert!(reset_local(&store, ResetArgs { yes: false }).is_err());
        assert!(store.is_deleted("s1")?);
        reset_local(&store, ResetArgs { yes: true })?;
        assert!(!store.is_deleted("s1")?);
        Ok(())
    }

    #[test]
    fn export_writes_filtered_csv_and_snapshot() -> TestResult {
        let (temp, _storage, store) = setup_store()?;
        let mut config = AppConfig::default();
        config.export.dir = temp.path().join("exports");

        let path = run_export(
            &config,
            &store,
            &ExportArgs {
                format: ExportFormat::Csv,
                out: None,
                query: vec!["body:SSC".into()],
            },
        )?;
        assert_eq!(path, config.export.dir.join(&config.export.csv_file_name));
        let csv = fs::read_to_string(&path)?;
        assert_eq!(csv.split("\r\n").count(), 2);
        assert!(csv.contains("\"CGL\""));
        assert!(!csv.contains("Rajyaseva"));

        let out = temp.path().join("backup.json");
        run_export(
            &config,
            &store,
            &ExportArgs {
                format: ExportFormat::Json,
                out: Some(out.clone()),
                query: Vec::new(),
            },
        )?;
        let snapshot = fs::read_to_string(&out)?;
        assert!(snapshot.contains("\"additions\""));
        Ok(())
    }

    #[test]
    fn import_round_trips_an_exported_snapshot() -> TestResult {
        let (temp, _storage, store) = setup_store()?;
        delete_record(&store, DeleteArgs { id: "s1".into() })?;
        let path = temp.path().join("state.json");
        fs::write(&path, store.export_snapshot()?)?;
        reset_local(&store, ResetArgs { yes: true })?;

        import_state(&store, ImportArgs { path })?;
        assert!(store.is_deleted("s1")?);
        Ok(())
    }

    #[test]
    fn link_descriptions_name_the_host() {
        let allowlist = OfficialAllowlist::default();
        assert_eq!(
            describe_link(&allowlist, "https://ssc.gov.in/page"),
            "official (ssc.gov.in)"
        );
        assert_eq!(
            describe_link(&allowlist, "https://example.com"),
            "not on the allowlist (example.com)"
        );
        assert_eq!(describe_link(&allowlist, "not-a-url"), "not a valid URL");
    }
}
