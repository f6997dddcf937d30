//! Managed servers — the backends the engine starts and stops.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use autostart_domain::server::ServerState;

use crate::ports::{Platform, ProxyView, ServerControl};

/// Default bound on a single reachability check.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(30);

/// How a server's reachability is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PingMethod {
    /// Ask the proxy to ping the server.
    #[default]
    Proxy,
    /// Ask the control backend; falls back to the proxy when unsupported.
    ControlApi,
}

/// The input did not name a known ping method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPingMethod(pub String);

impl fmt::Display for UnknownPingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown ping method '{}'", self.0)
    }
}

impl std::error::Error for UnknownPingMethod {}

impl FromStr for PingMethod {
    type Err = UnknownPingMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "proxy" | "velocity" => Ok(Self::Proxy),
            "control_api" => Ok(Self::ControlApi),
            _ => Err(UnknownPingMethod(s.to_string())),
        }
    }
}

/// Startup timer settings of one server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupTimerSettings {
    pub expected: Option<Duration>,
    pub auto_calculate: bool,
}

/// Per-server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub ping_timeout: Duration,
    pub ping_method: PingMethod,
    /// `None` when the server has no timer configuration at all.
    pub startup_timer: Option<StartupTimerSettings>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ping_timeout: DEFAULT_PING_TIMEOUT,
            ping_method: PingMethod::Proxy,
            startup_timer: None,
        }
    }
}

impl ServerSettings {
    #[must_use]
    pub fn auto_calculate_startup(&self) -> bool {
        self.startup_timer.as_ref().is_some_and(|t| t.auto_calculate)
    }
}

/// One backend together with its control handle.
pub struct ManagedServer<P: Platform> {
    name: String,
    settings: ServerSettings,
    control: P::Control,
    proxy: Arc<P::Proxy>,
    last_state: AtomicU8,
}

impl<P: Platform> ManagedServer<P> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    #[must_use]
    pub fn control(&self) -> &P::Control {
        &self.control
    }

    /// State seen by the most recent ping or state query.
    #[must_use]
    pub fn last_state(&self) -> ServerState {
        ServerState::from_u8(self.last_state.load(Ordering::Acquire))
    }

    fn record(&self, state: ServerState) {
        self.last_state.store(state as u8, Ordering::Release);
    }

    /// Send the start command unless the server already answers pings.
    #[tracing::instrument(skip(self), fields(server = %self.name))]
    pub async fn start(&self, force: bool) -> bool {
        if !force && self.is_online().await {
            tracing::info!("already online, skipping start");
            return true;
        }
        let ok = self.control.start().await;
        if ok {
            tracing::debug!("start command succeeded");
        } else {
            tracing::warn!("start command returned failure");
        }
        ok
    }

    /// Send the stop command. On success the server is seen as stopping
    /// until the next ping or state query.
    #[tracing::instrument(skip(self), fields(server = %self.name))]
    pub async fn stop(&self) -> bool {
        let ok = self.control.stop().await;
        if ok {
            self.record(ServerState::Stopping);
            tracing::debug!("stop command succeeded");
        } else {
            tracing::warn!("stop command returned failure");
        }
        ok
    }

    #[tracing::instrument(skip(self), fields(server = %self.name))]
    pub async fn restart(&self) -> bool {
        let ok = self.control.restart().await;
        if ok {
            tracing::debug!("restart command succeeded");
        } else {
            tracing::warn!("restart command returned failure");
        }
        ok
    }

    #[tracing::instrument(skip(self), fields(server = %self.name))]
    pub async fn send_command(&self, command: &str) -> bool {
        if !self.control.supports_command_sending() {
            tracing::warn!("control backend does not support sending commands");
            return false;
        }
        let ok = self.control.send_command(command).await;
        if !ok {
            tracing::warn!("command send returned failure");
        }
        ok
    }

    /// Reachability through the configured ping method, bounded by the ping timeout.
    pub async fn is_online(&self) -> bool {
        let timeout = self.settings.ping_timeout;
        let use_control =
            self.settings.ping_method == PingMethod::ControlApi && self.control.supports_ping();
        if self.settings.ping_method == PingMethod::ControlApi && !use_control {
            tracing::debug!(server = %self.name, "control api ping unsupported, using proxy ping");
        }
        let result = if use_control {
            tokio::time::timeout(timeout, self.control.ping()).await
        } else {
            tokio::time::timeout(timeout, self.proxy.ping(&self.name)).await
        };
        let online = result.unwrap_or_else(|_| {
            tracing::debug!(server = %self.name, ?timeout, "ping timed out");
            false
        });
        self.record(ServerState::from_online(online));
        online
    }

    /// Backend-reported state when supported, otherwise online/offline.
    pub async fn state(&self) -> ServerState {
        if self.control.supports_state() {
            let state = self.control.state().await;
            self.record(state);
            return state;
        }
        ServerState::from_online(self.is_online().await)
    }
}

/// Registry of every configured server.
pub struct ServerManager<P: Platform> {
    proxy: Arc<P::Proxy>,
    servers: HashMap<String, ManagedServer<P>>,
}

impl<P: Platform> ServerManager<P> {
    #[must_use]
    pub fn new(proxy: Arc<P::Proxy>) -> Self {
        Self {
            proxy,
            servers: HashMap::new(),
        }
    }

    /// Add (or replace) a server.
    pub fn register(&mut self, name: impl Into<String>, control: P::Control, settings: ServerSettings) {
        let name = name.into();
        tracing::debug!(server = %name, "registered managed server");
        self.servers.insert(
            name.clone(),
            ManagedServer {
                name,
                settings,
                control,
                proxy: Arc::clone(&self.proxy),
                last_state: AtomicU8::new(ServerState::Unknown as u8),
            },
        );
    }

    #[must_use]
    pub fn proxy(&self) -> &Arc<P::Proxy> {
        &self.proxy
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ManagedServer<P>> {
        self.servers.get(name)
    }

    #[must_use]
    pub fn has_server(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    /// Configured server names, sorted.
    #[must_use]
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }

    fn lookup(&self, name: &str) -> Option<&ManagedServer<P>> {
        let server = self.servers.get(name);
        if server.is_none() {
            tracing::warn!(server = %name, "unknown managed server");
        }
        server
    }

    pub async fn start(&self, name: &str, force: bool) -> bool {
        match self.lookup(name) {
            Some(server) => server.start(force).await,
            None => false,
        }
    }

    pub async fn stop(&self, name: &str) -> bool {
        match self.lookup(name) {
            Some(server) => server.stop().await,
            None => false,
        }
    }

    pub async fn restart(&self, name: &str) -> bool {
        match self.lookup(name) {
            Some(server) => server.restart().await,
            None => false,
        }
    }

    pub async fn send_command(&self, name: &str, command: &str) -> bool {
        match self.lookup(name) {
            Some(server) => server.send_command(command).await,
            None => false,
        }
    }

    pub async fn is_online(&self, name: &str) -> bool {
        match self.servers.get(name) {
            Some(server) => server.is_online().await,
            None => false,
        }
    }

    pub async fn state(&self, name: &str) -> ServerState {
        match self.servers.get(name) {
            Some(server) => server.state().await,
            None => ServerState::Unknown,
        }
    }

    #[must_use]
    pub fn last_state(&self, name: &str) -> ServerState {
        self.servers
            .get(name)
            .map_or(ServerState::Unknown, ManagedServer::last_state)
    }

    #[must_use]
    pub fn player_count(&self, name: &str) -> usize {
        self.proxy.player_count(name)
    }

    #[must_use]
    pub fn players(&self, name: &str) -> Vec<String> {
        self.proxy.players(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeControl, FakeProxy, TestPlatform};

    fn manager(control: FakeControl, settings: ServerSettings) -> ServerManager<TestPlatform> {
        let mut manager = ServerManager::new(Arc::new(FakeProxy::default()));
        manager.register("lobby", Arc::new(control), settings);
        manager
    }

    #[tokio::test]
    async fn should_skip_start_when_already_online() {
        let m = manager(FakeControl::default(), ServerSettings::default());
        m.proxy().set_online("lobby", true);
        assert!(m.start("lobby", false).await);
        assert_eq!(m.get("lobby").unwrap().control().calls("start"), 0);
    }

    #[tokio::test]
    async fn should_send_start_when_forced() {
        let m = manager(FakeControl::default(), ServerSettings::default());
        m.proxy().set_online("lobby", true);
        assert!(m.start("lobby", true).await);
        assert_eq!(m.get("lobby").unwrap().control().calls("start"), 1);
    }

    #[tokio::test]
    async fn should_return_false_for_unknown_server() {
        let m = manager(FakeControl::default(), ServerSettings::default());
        assert!(!m.start("nope", false).await);
        assert!(!m.stop("nope").await);
        assert_eq!(m.state("nope").await, ServerState::Unknown);
    }

    #[tokio::test]
    async fn should_refuse_commands_when_unsupported() {
        let m = manager(FakeControl::default(), ServerSettings::default());
        assert!(!m.send_command("lobby", "say hi").await);
        let supported = manager(
            FakeControl::default().with_commands(),
            ServerSettings::default(),
        );
        assert!(supported.send_command("lobby", "say hi").await);
    }

    #[tokio::test]
    async fn should_ping_through_control_api_when_configured() {
        let control = FakeControl::default().with_ping(true);
        let settings = ServerSettings {
            ping_method: PingMethod::ControlApi,
            ..ServerSettings::default()
        };
        let m = manager(control, settings);
        assert!(m.is_online("lobby").await);
        assert_eq!(m.last_state("lobby"), ServerState::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_offline_when_ping_times_out() {
        let settings = ServerSettings {
            ping_timeout: Duration::from_secs(2),
            ..ServerSettings::default()
        };
        let m = manager(FakeControl::default(), settings);
        m.proxy().set_ping_delay(Duration::from_secs(60));
        m.proxy().set_online("lobby", true);
        assert!(!m.is_online("lobby").await);
    }

    #[tokio::test]
    async fn should_see_server_as_stopping_after_stop() {
        let m = manager(FakeControl::default(), ServerSettings::default());
        m.proxy().set_online("lobby", true);
        assert!(m.is_online("lobby").await);
        assert!(m.stop("lobby").await);
        assert_eq!(m.last_state("lobby"), ServerState::Stopping);
    }

    #[tokio::test]
    async fn should_prefer_backend_state_when_supported() {
        let control = FakeControl::default().with_state(ServerState::Restarting);
        let m = manager(control, ServerSettings::default());
        assert_eq!(m.state("lobby").await, ServerState::Restarting);
        assert_eq!(m.last_state("lobby"), ServerState::Restarting);
    }

    #[test]
    fn should_parse_ping_methods() {
        assert_eq!("control-api".parse(), Ok(PingMethod::ControlApi));
        assert_eq!("velocity".parse(), Ok(PingMethod::Proxy));
        assert!("icmp".parse::<PingMethod>().is_err());
    }
}
