//! # autostart-adapter-virtual
//!
//! Virtual/demo platform that simulates a proxy and its backend servers
//! for demonstrations and end-to-end tests.
//!
//! ## Provided pieces
//!
//! | Type | Port | Behaviour |
//! |------|------|-----------|
//! | [`VirtualServer`] | `ServerControl` | Comes online a fixed time after `start`, takes commands while online |
//! | [`VirtualProxy`] | `ProxyView` | Tracks occupancy, routes joins and pings through the event bus |
//!
//! ## Dependency rule
//!
//! Depends on `autostart-app` (port traits) and `autostart-domain` only.

mod proxy;
mod server;

use autostart_app::ports::Platform;

pub use proxy::{JoinOutcome, PROTOCOL_VERSION, PingReply, VirtualProxy};
pub use server::{DEFAULT_STARTUP_TIME, SimulationSettings, VirtualServer};

/// Plugs the virtual adapters into the engine; history is kept by `H`.
pub struct VirtualPlatform<H> {
    _history: std::marker::PhantomData<fn() -> H>,
}

impl<H> Platform for VirtualPlatform<H>
where
    H: autostart_app::ports::StartupHistoryStore + 'static,
{
    type Control = VirtualServer;
    type Proxy = VirtualProxy;
    type History = H;
}
