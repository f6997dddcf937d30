//! # autostart-app
//!
//! Application layer — the automation engine and its **port definitions**.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `ServerControl` — start, stop, ping and command a backend server
//!   - `ProxyView` — the proxy's servers, players and virtual hosts
//!   - `StartupHistoryStore` — persist startup durations
//! - Provide the rule runtime: execution contexts, `${...}` resolution,
//!   triggers, conditions and actions
//! - Track server startups and estimate their duration from history
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `autostart-domain` only (plus `tokio`, `cron` and `chrono-tz`).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod actions;
pub mod conditions;
pub mod context;
pub mod engine;
pub mod event_bus;
pub mod globals;
pub mod ports;
pub mod rules;
pub mod servers;
pub mod startup;
pub mod triggers;
pub mod variables;

#[cfg(test)]
pub(crate) mod testing;
