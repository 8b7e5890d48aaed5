pub mod allowlist;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod export;
pub mod model;
pub mod rotation;
pub mod search;
pub mod storage;
pub mod store;

pub use allowlist::OfficialAllowlist;
pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use model::{Level, Origin, Record, RecordPatch, Window, WindowKind};
pub use search::FilterCriteria;
pub use store::{RecordStore, StoreError, StoreResult, UpsertKind};
