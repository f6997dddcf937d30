//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the engine and the outside world:
//! backend process control, the proxy's view of servers and players, and
//! persistence of startup durations. Adapters depend on these traits,
//! never the reverse.

pub mod condition;
pub mod history;
pub mod proxy;
pub mod server_control;

pub use condition::ConditionEvaluator;
pub use history::StartupHistoryStore;
pub use proxy::ProxyView;
pub use server_control::ServerControl;

/// Bundles the adapter types one deployment plugs into the engine.
pub trait Platform: Send + Sync + 'static {
    type Control: ServerControl + 'static;
    type Proxy: ProxyView + 'static;
    type History: StartupHistoryStore + 'static;
}
