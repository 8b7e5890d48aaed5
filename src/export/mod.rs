//! File exports (CSV, iCalendar, JSON snapshot) and snapshot import parsing.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod csv;
pub mod ics;
pub mod snapshot;

const TMP_EXTENSION: &str = "tmp";

/// Writes `contents` next to `path` first and renames it into place, so a
/// reader never sees a half-written export.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("ensuring export dir {}", parent.display()))?;
    }
    let tmp_path = match path.extension() {
        Some(ext) => path.with_extension(format!("{}.{TMP_EXTENSION}", ext.to_string_lossy())),
        None => path.with_extension(TMP_EXTENSION),
    };
    fs::write(&tmp_path, contents)
        .with_context(|| format!("writing temporary export {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("atomically persisting export {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = contents.len(), "export written");
    Ok(())
}
