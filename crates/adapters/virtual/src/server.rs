//! Virtual backend — boots after a fixed delay, answers pings once online.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

use autostart_app::ports::ServerControl;
use autostart_domain::server::ServerState;

/// Default time a virtual server takes to come online.
pub const DEFAULT_STARTUP_TIME: Duration = Duration::from_secs(5);

/// Behaviour of one simulated backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationSettings {
    /// Delay between a start request and the server answering pings.
    pub startup_time: Duration,
    /// Report lifecycle state through [`ServerControl::state`].
    pub supports_state: bool,
    /// Accept console commands while online.
    pub supports_commands: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            startup_time: DEFAULT_STARTUP_TIME,
            supports_state: false,
            supports_commands: false,
        }
    }
}

struct Machine {
    state: ServerState,
    boot: Option<AbortHandle>,
}

struct Inner {
    name: String,
    settings: SimulationSettings,
    machine: Mutex<Machine>,
    commands: Mutex<Vec<String>>,
}

impl Inner {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A simulated backend server.
///
/// Clones share the same machine, so the proxy simulation and the
/// engine observe the same state.
#[derive(Clone)]
pub struct VirtualServer {
    inner: Arc<Inner>,
}

impl VirtualServer {
    #[must_use]
    pub fn new(name: impl Into<String>, settings: SimulationSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                settings,
                machine: Mutex::new(Machine {
                    state: ServerState::Offline,
                    boot: None,
                }),
                commands: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A server that is already running.
    #[must_use]
    pub fn online(name: impl Into<String>, settings: SimulationSettings) -> Self {
        let server = Self::new(name, settings);
        server.inner.machine().state = ServerState::Online;
        server
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn current_state(&self) -> ServerState {
        self.inner.machine().state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.current_state() == ServerState::Online
    }

    /// Commands received while online, oldest first.
    #[must_use]
    pub fn received_commands(&self) -> Vec<String> {
        self.inner
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn boot(&self) -> bool {
        let mut machine = self.inner.machine();
        match machine.state {
            ServerState::Online | ServerState::Starting => {
                tracing::debug!(server = %self.inner.name, state = %machine.state, "virtual server already up");
                return true;
            }
            _ => {}
        }
        machine.state = ServerState::Starting;
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(inner.settings.startup_time).await;
            let mut machine = inner.machine();
            if machine.state == ServerState::Starting {
                machine.state = ServerState::Online;
                machine.boot = None;
                tracing::info!(server = %inner.name, "virtual server online");
            }
        });
        machine.boot = Some(task.abort_handle());
        tracing::info!(
            server = %self.inner.name,
            startup_time_ms = self.inner.settings.startup_time.as_millis(),
            "virtual server starting"
        );
        true
    }

    fn halt(&self) -> bool {
        let mut machine = self.inner.machine();
        if let Some(boot) = machine.boot.take() {
            boot.abort();
        }
        let was = machine.state;
        machine.state = ServerState::Offline;
        tracing::info!(server = %self.inner.name, previous = %was, "virtual server stopped");
        was != ServerState::Offline
    }
}

impl ServerControl for VirtualServer {
    fn start(&self) -> impl Future<Output = bool> + Send {
        let started = self.boot();
        async move { started }
    }

    fn stop(&self) -> impl Future<Output = bool> + Send {
        let stopped = self.halt();
        async move { stopped }
    }

    fn restart(&self) -> impl Future<Output = bool> + Send {
        self.halt();
        let started = self.boot();
        async move { started }
    }

    fn send_command(&self, command: &str) -> impl Future<Output = bool> + Send {
        let accepted = self.inner.settings.supports_commands && self.is_running();
        if accepted {
            tracing::info!(server = %self.inner.name, command, "virtual server received command");
            self.inner
                .commands
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(command.to_string());
        }
        async move { accepted }
    }

    fn ping(&self) -> impl Future<Output = bool> + Send {
        let online = self.is_running();
        async move { online }
    }

    fn state(&self) -> impl Future<Output = ServerState> + Send {
        let state = if self.inner.settings.supports_state {
            self.current_state()
        } else {
            ServerState::from_online(self.is_running())
        };
        async move { state }
    }

    fn supports_ping(&self) -> bool {
        true
    }

    fn supports_state(&self) -> bool {
        self.inner.settings.supports_state
    }

    fn supports_command_sending(&self) -> bool {
        self.inner.settings.supports_commands
    }
}
