//! Startup duration history, backed by a [`StartupHistoryStore`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use autostart_domain::startup::StartupHistory;

use crate::ports::StartupHistoryStore;
use crate::ports::history::HistorySnapshot;

/// Per-server startup durations, persisted after every change.
///
/// The map has its own lock, independent of the tracker's in-flight
/// startups.
pub struct StartupHistoryTracker<H> {
    store: Arc<H>,
    histories: Mutex<HashMap<String, StartupHistory>>,
}

impl<H: StartupHistoryStore + 'static> StartupHistoryTracker<H> {
    /// Load the stored history. A store that fails to load starts empty.
    pub async fn load(store: Arc<H>) -> Self {
        let histories = match store.load().await {
            Ok(snapshot) => snapshot
                .into_iter()
                .map(|(server, millis)| (server, StartupHistory::from_millis(millis)))
                .filter(|(_, history)| !history.is_empty())
                .collect(),
            Err(err) => {
                tracing::warn!(%err, "failed to load startup history, starting empty");
                HashMap::new()
            }
        };
        tracing::debug!(servers = histories.len(), "loaded startup history");
        Self {
            store,
            histories: Mutex::new(histories),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StartupHistory>> {
        self.histories.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an actual startup duration and persist in the background.
    pub fn record(&self, server: &str, duration: Duration) -> bool {
        let kept = self
            .lock()
            .entry(server.to_string())
            .or_default()
            .record(duration);
        if kept {
            tracing::debug!(server, ?duration, "recorded startup duration");
            self.save_in_background();
        }
        kept
    }

    /// Recency-weighted expected startup duration.
    #[must_use]
    pub fn expected(&self, server: &str) -> Option<Duration> {
        self.lock().get(server).and_then(StartupHistory::weighted_average)
    }

    #[must_use]
    pub fn has_data(&self, server: &str) -> bool {
        self.lock().get(server).is_some_and(|h| !h.is_empty())
    }

    #[must_use]
    pub fn record_count(&self, server: &str) -> usize {
        self.lock().get(server).map_or(0, StartupHistory::len)
    }

    pub fn clear(&self, server: &str) {
        if self.lock().remove(server).is_some() {
            self.save_in_background();
        }
    }

    pub fn clear_all(&self) {
        self.lock().clear();
        self.save_in_background();
    }

    #[must_use]
    pub fn snapshot(&self) -> HistorySnapshot {
        self.lock()
            .iter()
            .map(|(server, history)| (server.clone(), history.millis().collect()))
            .collect()
    }

    /// Persist now and wait for the store.
    pub async fn flush(&self) {
        if let Err(err) = self.store.save(self.snapshot()).await {
            tracing::warn!(%err, "failed to save startup history");
        }
    }

    fn save_in_background(&self) {
        let store = Arc::clone(&self.store);
        let snapshot = self.snapshot();
        tokio::spawn(async move {
            if let Err(err) = store.save(snapshot).await {
                tracing::warn!(%err, "failed to save startup history");
            }
        });
    }
}
