//! Startup history port — durable store for past startup durations.

use std::collections::HashMap;
use std::future::Future;

use autostart_domain::error::AutoStartError;

/// Per-server startup durations in milliseconds, oldest first.
pub type HistorySnapshot = HashMap<String, Vec<u64>>;

/// Loads and saves the startup history of every server at once.
pub trait StartupHistoryStore: Send + Sync {
    /// Read everything. A store that does not exist yet is empty, not an error.
    fn load(&self) -> impl Future<Output = Result<HistorySnapshot, AutoStartError>> + Send;

    /// Replace the stored history.
    fn save(
        &self,
        snapshot: HistorySnapshot,
    ) -> impl Future<Output = Result<(), AutoStartError>> + Send;
}

impl<T: StartupHistoryStore> StartupHistoryStore for std::sync::Arc<T> {
    fn load(&self) -> impl Future<Output = Result<HistorySnapshot, AutoStartError>> + Send {
        (**self).load()
    }

    fn save(
        &self,
        snapshot: HistorySnapshot,
    ) -> impl Future<Output = Result<(), AutoStartError>> + Send {
        (**self).save(snapshot)
    }
}
