//! In-flight startups and their background monitors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};

use autostart_domain::server::ServerState;
use autostart_domain::startup::{DEFAULT_EXPECTED_STARTUP, StartupContext};

use super::history::StartupHistoryTracker;
use crate::ports::{Platform, ServerControl};
use crate::servers::ServerManager;

/// How often the monitor checks whether a starting server is up.
pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long a startup may take before it is marked failed.
pub const MONITOR_TIMEOUT: Duration = Duration::from_secs(10 * 60);

struct Tracked {
    context: Arc<StartupContext>,
    monitor: Option<AbortHandle>,
}

/// Tracks one startup per server.
///
/// [`begin_startup`](Self::begin_startup) spawns a monitor that polls the
/// server until it answers (success) or [`MONITOR_TIMEOUT`] passes
/// (failure). Successful durations feed the history when the server has
/// auto-calculation enabled.
pub struct StartupTracker<P: Platform> {
    servers: Arc<ServerManager<P>>,
    history: Arc<StartupHistoryTracker<P::History>>,
    active: Mutex<HashMap<String, Tracked>>,
    poll_interval: Duration,
    timeout: Duration,
}

impl<P: Platform> StartupTracker<P> {
    #[must_use]
    pub fn new(
        servers: Arc<ServerManager<P>>,
        history: Arc<StartupHistoryTracker<P::History>>,
    ) -> Self {
        Self::with_timing(servers, history, MONITOR_POLL_INTERVAL, MONITOR_TIMEOUT)
    }

    #[must_use]
    pub fn with_timing(
        servers: Arc<ServerManager<P>>,
        history: Arc<StartupHistoryTracker<P::History>>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            servers,
            history,
            active: Mutex::new(HashMap::new()),
            poll_interval,
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Tracked>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn history(&self) -> &Arc<StartupHistoryTracker<P::History>> {
        &self.history
    }

    /// Start tracking a startup, replacing any previous one for the server.
    #[tracing::instrument(skip(self))]
    pub fn begin_startup(self: &Arc<Self>, server: &str) -> Arc<StartupContext> {
        let expected = self.expected_startup(server);
        let context = Arc::new(StartupContext::new(server, expected));
        let monitor = tokio::spawn(Arc::clone(self).monitor(Arc::clone(&context)));
        let previous = self.lock().insert(
            server.to_string(),
            Tracked {
                context: Arc::clone(&context),
                monitor: Some(monitor.abort_handle()),
            },
        );
        if let Some(previous) = previous.and_then(|p| p.monitor) {
            previous.abort();
        }
        tracing::debug!(expected = ?expected, "began tracking startup");
        context
    }

    async fn monitor(self: Arc<Self>, context: Arc<StartupContext>) {
        let deadline = Instant::now() + self.timeout;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if context.is_completed() {
                return;
            }
            if Instant::now() >= deadline {
                tracing::warn!(server = %context.server(), timeout = ?self.timeout, "startup monitor timed out");
                self.finish(&context, false);
                return;
            }
            if self.servers.is_online(context.server()).await {
                tracing::debug!(server = %context.server(), "startup monitor saw server online");
                self.finish(&context, true);
                return;
            }
        }
    }

    fn finish(&self, context: &StartupContext, success: bool) {
        let state = if success {
            ServerState::Online
        } else {
            ServerState::Failed
        };
        if !context.mark_completed(state) {
            return;
        }
        let server = context.server();
        if success && self.auto_calculate(server) {
            if let Some(actual) = context.actual_duration() {
                self.history.record(server, actual);
            }
        }
        tracing::info!(
            server,
            success,
            elapsed = %context.formatted_elapsed(),
            "startup completed"
        );
    }

    /// Complete the in-flight startup of `server`, if any.
    pub fn complete_startup(&self, server: &str, success: bool) {
        let tracked = {
            let mut active = self.lock();
            active.get_mut(server).map(|t| (Arc::clone(&t.context), t.monitor.take()))
        };
        let Some((context, monitor)) = tracked else {
            tracing::debug!(server, "no active startup to complete");
            return;
        };
        if let Some(monitor) = monitor {
            monitor.abort();
        }
        self.finish(&context, success);
    }

    /// Forget the startup of `server`, stopping its monitor.
    pub fn clear_startup(&self, server: &str) {
        if let Some(Tracked {
            monitor: Some(monitor),
            ..
        }) = self.lock().remove(server)
        {
            monitor.abort();
        }
        tracing::debug!(server, "cleared startup tracking");
    }

    #[must_use]
    pub fn startup_context(&self, server: &str) -> Option<Arc<StartupContext>> {
        self.lock().get(server).map(|t| Arc::clone(&t.context))
    }

    /// A startup is in flight and not completed yet.
    #[must_use]
    pub fn is_starting(&self, server: &str) -> bool {
        self.lock()
            .get(server)
            .is_some_and(|t| !t.context.is_completed())
    }

    fn in_flight(&self, server: &str) -> Option<Arc<StartupContext>> {
        self.startup_context(server)
            .filter(|context| !context.is_completed())
    }

    /// Current state: the backend's report when it has one, `Starting`
    /// while a startup is in flight, otherwise online/offline.
    pub async fn server_state(&self, server: &str) -> ServerState {
        let Some(managed) = self.servers.get(server) else {
            return ServerState::Unknown;
        };
        if !managed.control().supports_state() && self.is_starting(server) {
            return ServerState::Starting;
        }
        managed.state().await
    }

    /// Non-blocking variant of [`server_state`](Self::server_state) based
    /// on the last observed state.
    #[must_use]
    pub fn cached_state(&self, server: &str) -> ServerState {
        let Some(managed) = self.servers.get(server) else {
            return ServerState::Unknown;
        };
        if !managed.control().supports_state() && self.is_starting(server) {
            return ServerState::Starting;
        }
        managed.last_state()
    }

    /// Formatted elapsed time of the in-flight startup.
    #[must_use]
    pub fn startup_timer(&self, server: &str) -> String {
        self.in_flight(server)
            .map_or_else(|| "0s".to_string(), |context| context.formatted_elapsed())
    }

    /// 0..=100; without a startup in flight, 100 when last seen online.
    #[must_use]
    pub fn progress_percentage(&self, server: &str) -> u8 {
        match self.in_flight(server) {
            Some(context) => context.progress_percentage(),
            None if self.servers.last_state(server) == ServerState::Online => 100,
            None => 0,
        }
    }

    /// 0.0..=1.0; without a startup in flight, 1.0 when last seen online.
    #[must_use]
    pub fn progress(&self, server: &str) -> f64 {
        match self.in_flight(server) {
            Some(context) => context.progress(),
            None if self.servers.last_state(server) == ServerState::Online => 1.0,
            None => 0.0,
        }
    }

    /// Estimate > configured `expected_startup_time` > 30 s.
    #[must_use]
    pub fn expected_startup(&self, server: &str) -> Duration {
        let Some(managed) = self.servers.get(server) else {
            return DEFAULT_EXPECTED_STARTUP;
        };
        let expected = match &managed.settings().startup_timer {
            None => self.history.expected(server),
            Some(timer) => timer
                .auto_calculate
                .then(|| self.history.expected(server))
                .flatten()
                .or(timer.expected),
        };
        expected.unwrap_or(DEFAULT_EXPECTED_STARTUP)
    }

    fn auto_calculate(&self, server: &str) -> bool {
        self.servers
            .get(server)
            .is_some_and(|managed| managed.settings().auto_calculate_startup())
    }

    /// Stop every monitor. Contexts stay readable.
    pub fn shutdown(&self) {
        for tracked in self.lock().values_mut() {
            if let Some(monitor) = tracked.monitor.take() {
                monitor.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servers::{ServerSettings, StartupTimerSettings};
    use crate::testing::{FakeControl, FakeHistory, FakeProxy, TestPlatform};

    async fn tracker_with(
        settings: ServerSettings,
        history: FakeHistory,
    ) -> (Arc<StartupTracker<TestPlatform>>, Arc<ServerManager<TestPlatform>>) {
        let mut servers = ServerManager::new(Arc::new(FakeProxy::default()));
        servers.register("lobby", Arc::new(FakeControl::default()), settings);
        let servers = Arc::new(servers);
        let history = Arc::new(StartupHistoryTracker::load(Arc::new(history)).await);
        let tracker = Arc::new(StartupTracker::new(Arc::clone(&servers), history));
        (tracker, servers)
    }

    fn auto_settings() -> ServerSettings {
        ServerSettings {
            startup_timer: Some(StartupTimerSettings {
                expected: Some(Duration::from_secs(45)),
                auto_calculate: true,
            }),
            ..ServerSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_complete_when_server_comes_online() {
        let (tracker, servers) = tracker_with(auto_settings(), FakeHistory::default()).await;
        let context = tracker.begin_startup("lobby");
        assert!(tracker.is_starting("lobby"));
        assert_eq!(tracker.cached_state("lobby"), ServerState::Starting);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        servers.proxy().set_online("lobby", true);
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        assert!(context.is_completed());
        assert_eq!(context.state(), ServerState::Online);
        assert_eq!(tracker.progress_percentage("lobby"), 100);
        assert!(!tracker.is_starting("lobby"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_fail_after_monitor_timeout() {
        let (base, servers) = tracker_with(auto_settings(), FakeHistory::default()).await;
        let tracker = Arc::new(StartupTracker::with_timing(
            servers,
            Arc::clone(base.history()),
            Duration::from_secs(1),
            Duration::from_secs(5),
        ));
        let context = tracker.begin_startup("lobby");
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(context.state(), ServerState::Failed);
        assert_eq!(tracker.history().record_count("lobby"), 0);
        assert_eq!(tracker.progress_percentage("lobby"), 0);
    }

    #[tokio::test]
    async fn should_prefer_history_estimate_when_auto_calculating() {
        let (tracker, _) =
            tracker_with(auto_settings(), FakeHistory::with("lobby", &[10_000, 20_000, 30_000]))
                .await;
        assert_eq!(tracker.expected_startup("lobby").as_millis(), 23_333);
    }

    #[tokio::test]
    async fn should_use_configured_expected_time_without_auto_calculation() {
        let settings = ServerSettings {
            startup_timer: Some(StartupTimerSettings {
                expected: Some(Duration::from_secs(45)),
                auto_calculate: false,
            }),
            ..ServerSettings::default()
        };
        let (tracker, _) = tracker_with(settings, FakeHistory::with("lobby", &[10_000])).await;
        assert_eq!(tracker.expected_startup("lobby"), Duration::from_secs(45));
    }

    #[tokio::test]
    async fn should_use_estimate_when_no_timer_configured() {
        let (tracker, _) =
            tracker_with(ServerSettings::default(), FakeHistory::with("lobby", &[12_000])).await;
        assert_eq!(tracker.expected_startup("lobby"), Duration::from_secs(12));
        assert_eq!(tracker.expected_startup("unknown"), DEFAULT_EXPECTED_STARTUP);
    }

    #[tokio::test(start_paused = true)]
    async fn should_replace_previous_startup_of_same_server() {
        let (tracker, _) = tracker_with(auto_settings(), FakeHistory::default()).await;
        let first = tracker.begin_startup("lobby");
        let second = tracker.begin_startup("lobby");
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&tracker.startup_context("lobby").unwrap(), &second));
    }

    #[tokio::test(start_paused = true)]
    async fn should_complete_only_once() {
        let (tracker, _) = tracker_with(auto_settings(), FakeHistory::default()).await;
        let context = tracker.begin_startup("lobby");
        tracker.complete_startup("lobby", false);
        tracker.complete_startup("lobby", true);
        assert_eq!(context.state(), ServerState::Failed);
        tracker.clear_startup("lobby");
        assert!(tracker.startup_context("lobby").is_none());
    }
}
