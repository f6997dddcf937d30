//! Startup tracking — in-flight startups, their monitors and the history
//! of past startup durations used to estimate the next one.

pub mod history;
pub mod tracker;

pub use history::StartupHistoryTracker;
pub use tracker::StartupTracker;
