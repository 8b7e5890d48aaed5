use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::config::DbConfig;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};

mod document;
mod schema;

pub use document::{LocalState, SCHEMA_VERSION};

const STATE_KEY: &str = "local_state";

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    /// Current local document; corrupt content degrades to empty layers.
    pub fn load_state(&self) -> Result<LocalState> {
        self.with_connection(read_state)
    }

    pub fn save_state(&self, state: &LocalState) -> Result<()> {
        self.with_connection(|conn| write_state(conn, state))
    }

    /// Read-modify-write of the local document in one transaction. The
    /// document is only written when `f` succeeds.
    pub fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut LocalState) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .context("starting local state transaction")?;
        let mut state = read_state(&tx)?;
        let output = f(&mut state)?;
        write_state(&tx, &state)?;
        tx.commit().context("committing local state")?;
        Ok(output)
    }
}

fn read_state(conn: &Connection) -> Result<LocalState> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM local_state WHERE key = ?1",
            params![STATE_KEY],
            |row| row.get(0),
        )
        .optional()
        .context("reading local state")?;
    Ok(match raw {
        Some(raw) => LocalState::decode(&raw),
        None => LocalState::default(),
    })
}

fn write_state(conn: &Connection, state: &LocalState) -> Result<()> {
    let raw = state.encode().context("serialising local state")?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO local_state (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![STATE_KEY, raw, now],
    )
    .context("writing local state")?;
    Ok(())
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = if storage.database_path.as_os_str().is_empty() {
        &paths.database_path
    } else {
        &storage.database_path
    };
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "local state database ready");
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)
        .context("enabling foreign keys")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    pub fn temp_paths(root: &TempDir) -> ConfigPaths {
        let base = root.path();
        ConfigPaths::rooted(
            base.join("config"),
            base.join("config/config.toml"),
            base.join("data"),
        )
    }

    pub fn init_storage() -> Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        let mut options = StorageOptions::default();
        options.database_path = paths.database_path.clone();
        let storage = init(&paths, &options)?;
        Ok((temp, storage))
    }
}
