//! # autostart-adapter-history-file
//!
//! Startup history persisted to a plain text file.
//!
//! ## File format
//!
//! ```text
//! # comment
//! survival:41250,39870,44010
//! lobby:8200
//! ```
//!
//! One line per server, durations in milliseconds, oldest first. Blank
//! lines and `#` comments are ignored; numbers that do not parse, and
//! non-positive ones, are skipped.
//!
//! ## Dependency rule
//!
//! Depends on `autostart-app` (port traits) and `autostart-domain` only.

mod error;
mod format;
mod store;

pub use error::HistoryFileError;
pub use format::{parse, render};
pub use store::FileHistoryStore;
