//! Domain model for exam notification listings.
//!
//! # Responsibility
//! - Define the record shape shared by the shipped dataset and local edits.
//! - Normalise the four notification-window shapes behind one type.

pub mod record;
pub mod window;

pub use record::{infer_level, infer_region, Level, Origin, Record, RecordPatch, USER_ID_PREFIX};
pub use window::{Half, Quarter, Window, WindowKind, WindowParseError, UNSCHEDULED_SORT_KEY};
