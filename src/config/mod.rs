use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const APP_DOMAIN: &str = "in";
const APP_ORG: &str = "RecruitBoard";
const APP_NAME: &str = "recruitboard";

pub const CONFIG_ENV: &str = "RECRUITBOARD_CONFIG";
pub const DATA_ENV: &str = "RECRUITBOARD_DATA";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            self.write_default_config(&default_cfg)?;
            default_cfg.post_load(&self.paths)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub dataset_path: PathBuf,
    pub export_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        Ok(Self::rooted(config_dir, config_file, data_root))
    }

    /// Layout with every data file under `data_dir`.
    pub fn rooted(config_dir: PathBuf, config_file: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_dir,
            config_file,
            database_path: data_dir.join("state.db"),
            dataset_path: data_dir.join("exams.json"),
            export_dir: data_dir.join("exports"),
            data_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.export_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dataset: DatasetOptions,
    pub storage: StorageOptions,
    pub allowlist: AllowlistOptions,
    pub reset: ResetOptions,
    pub export: ExportOptions,
}

impl AppConfig {
    pub fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        self.dataset.resolve(paths);
        self.export.resolve(paths);
        if self.storage.wal_autocheckpoint == 0 {
            tracing::warn!("wal_autocheckpoint of 0 disables checkpoints, using 1000");
            self.storage.wal_autocheckpoint = StorageOptions::default().wal_autocheckpoint;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetOptions {
    /// Shipped dataset; empty means `<data_dir>/exams.json`.
    pub path: PathBuf,
}

impl DatasetOptions {
    fn resolve(&mut self, paths: &ConfigPaths) {
        if self.path.as_os_str().is_empty() {
            self.path = paths.dataset_path.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

/// Extra trusted link suffixes/hosts, added on top of the built-in list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowlistOptions {
    pub suffixes: Vec<String>,
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetOptions {
    /// Also forget custom bodies when local customisations are reset.
    pub clear_custom_bodies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    #[serde(skip)]
    pub dir: PathBuf,
    pub csv_file_name: String,
    pub ics_file_name: String,
    pub snapshot_file_name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::new(),
            csv_file_name: "recruitment_notifications_bodywise.csv".to_string(),
            ics_file_name: "recruitment_notifications.ics".to_string(),
            snapshot_file_name: "recruit-bodywise-appdata.json".to_string(),
        }
    }
}

impl ExportOptions {
    fn resolve(&mut self, paths: &ConfigPaths) {
        if self.dir.as_os_str().is_empty() {
            self.dir = paths.export_dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_paths(root: &TempDir) -> ConfigPaths {
        let base = root.path();
        ConfigPaths::rooted(
            base.join("config"),
            base.join("config/config.toml"),
            base.join("data"),
        )
    }

    #[test]
    fn first_run_writes_default_config() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::with_paths(temp_paths(&temp));
        let cfg = loader.load_or_init()?;

        assert!(loader.paths().config_file.exists());
        assert_eq!(cfg.dataset.path, loader.paths().dataset_path);
        assert_eq!(cfg.storage.database_path, loader.paths().database_path);
        assert!(!cfg.reset.clear_custom_bodies);

        let written = fs::read_to_string(&loader.paths().config_file)?;
        assert!(written.contains("wal_autocheckpoint"));
        assert!(!written.contains("database_path"));
        Ok(())
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_sections() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "[reset]\nclear_custom_bodies = true\n\n[allowlist]\nhosts = [\"jobs.example.org\"]\n",
        )?;

        let cfg = ConfigLoader::with_paths(paths.clone()).load()?;
        assert!(cfg.reset.clear_custom_bodies);
        assert_eq!(cfg.allowlist.hosts, vec!["jobs.example.org".to_string()]);
        assert_eq!(cfg.storage.wal_autocheckpoint, 1000);
        assert_eq!(cfg.export.dir, paths.export_dir);
        Ok(())
    }
}
