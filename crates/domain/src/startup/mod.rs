//! Startup model — per-attempt progress and historical duration estimates.
//!
//! A [`StartupContext`] describes one in-flight start of a managed server;
//! progress is derived from elapsed time against an expected duration.
//! [`StartupHistory`] keeps the most recent actual durations so the
//! expected duration can be learned instead of configured.

mod context;
mod history;

pub use context::{DEFAULT_EXPECTED_STARTUP, StartupContext};
pub use history::{MAX_HISTORY_ENTRIES, StartupHistory, weighted_average};
