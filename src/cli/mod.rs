use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::dataset;
use crate::storage;
use crate::store::RecordStore;

pub mod commands;

use self::commands::{
    AddArgs, BodyCommand, CheckLinkArgs, DeleteArgs, EditArgs, ExportArgs, ImportArgs, QueryArgs,
    ResetArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "recruitboard",
    version,
    about = "Body-wise recruitment exam notification windows with local edits"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file location (takes precedence over RECRUITBOARD_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over RECRUITBOARD_DATA)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Shipped dataset to read instead of the configured one
    #[arg(long, global = true)]
    pub dataset: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the filtered listing grouped by body
    List(QueryArgs),
    /// Print every known body, including custom ones
    Bodies,
    /// Print the states/UTs of the filtered state and local records
    Regions(QueryArgs),
    /// Add a new record
    Add(AddArgs),
    /// Edit a record; editing a deleted shipped record restores it
    Edit(EditArgs),
    /// Delete a local record or hide a shipped one
    Delete(DeleteArgs),
    /// Manage custom bodies
    #[command(subcommand)]
    Body(BodyCommand),
    /// Discard local additions, edits and deletions
    Reset(ResetArgs),
    /// Write the filtered listing as CSV or ICS, or the local state as JSON
    Export(ExportArgs),
    /// Load a JSON snapshot or a legacy additions array
    Import(ImportArgs),
    /// Check a link against the official-site allowlist
    CheckLink(CheckLinkArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let mut config = loader.load_or_init()?;
    if let Some(path) = cli.dataset {
        config.dataset.path = path;
    }
    let storage = storage::init(&paths, &config.storage)?;
    let shipped = dataset::load_shipped(&config.dataset.path);
    let store = RecordStore::from_config(shipped, storage, &config);

    match cli.command {
        Commands::List(args) => commands::list_records(&store, args),
        Commands::Bodies => commands::list_bodies(&store),
        Commands::Regions(args) => commands::list_regions(&store, args),
        Commands::Add(args) => commands::add_record(&store, args),
        Commands::Edit(args) => commands::edit_record(&store, args),
        Commands::Delete(args) => commands::delete_record(&store, args),
        Commands::Body(command) => commands::handle_body_command(&store, command),
        Commands::Reset(args) => commands::reset_local(&store, args),
        Commands::Export(args) => commands::export_records(&config, &store, args),
        Commands::Import(args) => commands::import_state(&store, args),
        Commands::CheckLink(args) => commands::check_link(&store, args),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn prefixed_query_tokens_reach_the_list_command() {
        let cli = Cli::try_parse_from([
            "recruitboard",
            "list",
            "body:Pune Zilla Parishad",
            "gramsevak",
            "--log-level",
            "debug",
        ])
        .expect("valid arguments");
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::List(args) => {
                assert_eq!(args.query, vec!["body:Pune Zilla Parishad", "gramsevak"])
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn edit_flags_parse_window_and_history() {
        let cli = Cli::try_parse_from([
            "recruitboard",
            "edit",
            "s1",
            "--window",
            "H1-2026",
            "--history",
            "2019,2023-05",
            "--force",
        ])
        .expect("valid arguments");
        let Commands::Edit(args) = cli.command else {
            panic!("expected edit");
        };
        assert_eq!(args.id, "s1");
        assert!(args.force);
        assert_eq!(args.fields.window.map(|w| w.label()).as_deref(), Some("H1 2026"));
        assert_eq!(
            args.fields.history,
            Some(vec!["2019".to_string(), "2023-05".to_string()])
        );
    }
}
