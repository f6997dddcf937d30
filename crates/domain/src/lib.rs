//! # autostart-domain
//!
//! Pure domain model for the autostart proxy automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps, durations
//! - Define **Values** held by execution contexts and the objects they can point at
//! - Define **Server state** and the **Startup** model (progress, history estimate)
//! - Define **Host events** (connection attempts, pings, occupancy changes)
//! - Define **Rules** (trigger → condition → action configuration)
//! - Contain all invariant enforcement and pure domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies** and no async runtime.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod duration;
pub mod error;
pub mod event;
pub mod filter;
pub mod id;
pub mod rule;
pub mod server;
pub mod startup;
pub mod time;
pub mod value;
