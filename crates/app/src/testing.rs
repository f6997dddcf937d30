//! In-memory collaborators shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autostart_domain::error::AutoStartError;
use autostart_domain::server::ServerState;
use autostart_domain::time::Timestamp;

use crate::ports::history::HistorySnapshot;
use crate::ports::{Platform, ProxyView, ServerControl, StartupHistoryStore};

pub struct TestPlatform;

impl Platform for TestPlatform {
    type Control = Arc<FakeControl>;
    type Proxy = FakeProxy;
    type History = FakeHistory;
}

// ── Control ────────────────────────────────────────────────────────

pub struct FakeControl {
    calls: Mutex<HashMap<&'static str, usize>>,
    commands: Mutex<Vec<String>>,
    ping: Option<bool>,
    state: Option<ServerState>,
    supports_commands: bool,
    succeed: bool,
    delay: Duration,
}

impl Default for FakeControl {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            ping: None,
            state: None,
            supports_commands: false,
            succeed: true,
            delay: Duration::ZERO,
        }
    }
}

impl FakeControl {
    pub fn with_ping(mut self, online: bool) -> Self {
        self.ping = Some(online);
        self
    }

    pub fn with_state(mut self, state: ServerState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_commands(mut self) -> Self {
        self.supports_commands = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.succeed = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn call(&self, op: &'static str) -> impl Future<Output = bool> + Send {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        let (delay, ok) = (self.delay, self.succeed);
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            ok
        }
    }
}

impl ServerControl for FakeControl {
    fn start(&self) -> impl Future<Output = bool> + Send {
        self.call("start")
    }

    fn stop(&self) -> impl Future<Output = bool> + Send {
        self.call("stop")
    }

    fn restart(&self) -> impl Future<Output = bool> + Send {
        self.call("restart")
    }

    fn send_command(&self, command: &str) -> impl Future<Output = bool> + Send {
        self.commands.lock().unwrap().push(command.to_string());
        self.call("send_command")
    }

    fn ping(&self) -> impl Future<Output = bool> + Send {
        let online = self.ping.unwrap_or(false);
        async move { online }
    }

    fn state(&self) -> impl Future<Output = ServerState> + Send {
        let state = self.state.unwrap_or_default();
        async move { state }
    }

    fn supports_ping(&self) -> bool {
        self.ping.is_some()
    }

    fn supports_state(&self) -> bool {
        self.state.is_some()
    }

    fn supports_command_sending(&self) -> bool {
        self.supports_commands
    }
}

// ── Proxy ──────────────────────────────────────────────────────────

#[derive(Default)]
struct ProxyState {
    online: HashSet<String>,
    known: HashSet<String>,
    players: HashMap<String, Vec<String>>,
    empty_since: HashMap<String, Timestamp>,
    hosts: HashMap<String, Vec<String>>,
    ping_delay: Duration,
}

#[derive(Default)]
pub struct FakeProxy {
    state: Mutex<ProxyState>,
}

impl FakeProxy {
    pub fn set_online(&self, server: &str, online: bool) {
        let mut state = self.state.lock().unwrap();
        state.known.insert(server.to_string());
        if online {
            state.online.insert(server.to_string());
        } else {
            state.online.remove(server);
        }
    }

    pub fn set_players(&self, server: &str, players: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.known.insert(server.to_string());
        state.players.insert(
            server.to_string(),
            players.iter().map(ToString::to_string).collect(),
        );
    }

    pub fn set_empty_since(&self, server: &str, since: Timestamp) {
        self.state
            .lock()
            .unwrap()
            .empty_since
            .insert(server.to_string(), since);
    }

    pub fn set_virtual_hosts(&self, server: &str, hosts: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.known.insert(server.to_string());
        state.hosts.insert(
            server.to_string(),
            hosts.iter().map(ToString::to_string).collect(),
        );
    }

    pub fn set_ping_delay(&self, delay: Duration) {
        self.state.lock().unwrap().ping_delay = delay;
    }
}

impl ProxyView for FakeProxy {
    fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().unwrap().known.iter().cloned().collect();
        names.sort();
        names
    }

    fn player_count(&self, server: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .players
            .get(server)
            .map_or(0, Vec::len)
    }

    fn players(&self, server: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .players
            .get(server)
            .cloned()
            .unwrap_or_default()
    }

    fn ping(&self, server: &str) -> impl Future<Output = bool> + Send {
        let (online, delay) = {
            let state = self.state.lock().unwrap();
            (state.online.contains(server), state.ping_delay)
        };
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            online
        }
    }

    fn empty_since(&self, server: &str) -> Option<Timestamp> {
        self.state.lock().unwrap().empty_since.get(server).copied()
    }

    fn virtual_hosts(&self, server: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .hosts
            .get(server)
            .cloned()
            .unwrap_or_default()
    }
}

// ── History store ──────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeHistory {
    pub stored: Mutex<HistorySnapshot>,
    pub saves: Mutex<usize>,
}

impl FakeHistory {
    pub fn with(server: &str, millis: &[u64]) -> Self {
        let history = Self::default();
        history
            .stored
            .lock()
            .unwrap()
            .insert(server.to_string(), millis.to_vec());
        history
    }
}

impl StartupHistoryStore for FakeHistory {
    fn load(&self) -> impl Future<Output = Result<HistorySnapshot, AutoStartError>> + Send {
        let snapshot = self.stored.lock().unwrap().clone();
        async move { Ok(snapshot) }
    }

    fn save(
        &self,
        snapshot: HistorySnapshot,
    ) -> impl Future<Output = Result<(), AutoStartError>> + Send {
        *self.stored.lock().unwrap() = snapshot;
        *self.saves.lock().unwrap() += 1;
        async { Ok(()) }
    }
}
