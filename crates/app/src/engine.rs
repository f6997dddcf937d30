//! Automation engine — wires servers, startup tracking, triggers and rules
//! together and drives their lifecycle.
//!
//! The host adapter publishes events on the engine's bus; rules react to
//! them through their triggers. `start` loads a rule set (replacing any
//! previous one), `shutdown` gives `proxy_shutdown` rules a bounded
//! window to run before tearing everything down.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;

use autostart_domain::event::ProxyEvent;
use autostart_domain::rule::RuleConfig;

use crate::actions::{ActionRegistry, ActionServices};
use crate::conditions::StandardConditionEvaluator;
use crate::event_bus::InProcessEventBus;
use crate::globals::ServerVariables;
use crate::ports::Platform;
use crate::rules::{LoadSummary, RuleManager};
use crate::servers::ServerManager;
use crate::startup::{StartupHistoryTracker, StartupTracker};
use crate::triggers::{DEFAULT_EMPTY_CHECK_INTERVAL, TriggerRegistry, TriggerServices};
use crate::variables::VariableResolver;

/// Default bound on how long `proxy_shutdown` rules may run.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Interval of the empty-server sweep; zero disables it.
    pub empty_check_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            empty_check_interval: DEFAULT_EMPTY_CHECK_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// The running automation system of one proxy.
pub struct AutomationEngine<P: Platform> {
    bus: Arc<InProcessEventBus>,
    servers: Arc<ServerManager<P>>,
    tracker: Arc<StartupTracker<P>>,
    actions: ActionRegistry<P>,
    settings: EngineSettings,
    rules: Mutex<Option<Arc<RuleManager<P>>>>,
}

impl<P: Platform> AutomationEngine<P> {
    /// Wire an engine over the given servers and loaded history.
    #[must_use]
    pub fn new(
        bus: Arc<InProcessEventBus>,
        servers: Arc<ServerManager<P>>,
        history: Arc<StartupHistoryTracker<P::History>>,
        settings: EngineSettings,
    ) -> Self {
        let tracker = Arc::new(StartupTracker::new(Arc::clone(&servers), history));
        let resolver = VariableResolver::with_globals(Arc::new(ServerVariables::new(
            Arc::clone(&servers),
            Arc::clone(&tracker),
        )));
        let actions = ActionRegistry::new(ActionServices {
            conditions: Arc::new(StandardConditionEvaluator::new(
                Arc::clone(&servers),
                resolver.clone(),
            )),
            servers: Arc::clone(&servers),
            tracker: Arc::clone(&tracker),
            resolver,
        });
        Self {
            bus,
            servers,
            tracker,
            actions,
            settings,
            rules: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<InProcessEventBus> {
        &self.bus
    }

    #[must_use]
    pub fn servers(&self) -> &Arc<ServerManager<P>> {
        &self.servers
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<StartupTracker<P>> {
        &self.tracker
    }

    fn current(&self) -> Option<Arc<RuleManager<P>>> {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Announce the proxy start and load `rules`, replacing any previous set.
    ///
    /// The announcement goes out before the rules are activated, so
    /// `proxy_start` rules fire once, from their own activation.
    #[tracing::instrument(skip(self, rules), fields(rules = rules.len()))]
    pub fn start(&self, rules: &[RuleConfig], reload: bool) -> LoadSummary {
        if let Some(previous) = self.current() {
            previous.clear();
        }
        self.bus.publish(ProxyEvent::ProxyStarted { reload });

        let triggers = TriggerRegistry::new(TriggerServices {
            bus: Arc::clone(&self.bus),
            servers: Arc::clone(&self.servers),
            tracker: Arc::clone(&self.tracker),
            empty_check_interval: self.settings.empty_check_interval,
            reload,
        });
        let manager = Arc::new(RuleManager::new(triggers, self.actions.clone()));
        let summary = manager.load(rules);
        *self.rules.lock().unwrap_or_else(PoisonError::into_inner) = Some(manager);
        tracing::info!(
            servers = self.servers.server_names().len(),
            loaded = summary.loaded,
            reload,
            "automation engine started"
        );
        summary
    }

    /// Fire every manual trigger with `id`. Returns how many fired.
    pub fn fire_manual(&self, id: &str, args: &[String]) -> usize {
        let fired = self
            .current()
            .map_or(0, |manager| manager.fire_manual(id, args));
        if fired == 0 {
            tracing::warn!(id, "no active manual trigger with this id");
        }
        fired
    }

    #[must_use]
    pub fn rule_names(&self) -> Vec<String> {
        self.current()
            .map(|manager| manager.rule_names())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn manual_trigger_ids(&self) -> Vec<String> {
        self.current()
            .map(|manager| manager.manual_trigger_ids())
            .unwrap_or_default()
    }

    /// Run `proxy_shutdown` rules for at most the shutdown timeout, then
    /// deactivate every rule, stop startup monitors and persist history.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.bus.publish(ProxyEvent::ProxyShutdown);
        let manager = self
            .rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(manager) = manager {
            let mut runs: JoinSet<()> = JoinSet::new();
            let mut aborts = Vec::new();
            for handle in manager.fire_shutdown() {
                aborts.push(handle.abort_handle());
                runs.spawn(async move {
                    if let Err(err) = handle.await {
                        tracing::error!(%err, "shutdown rule failed");
                    }
                });
            }
            let pending = runs.len();
            let finished = tokio::time::timeout(self.settings.shutdown_timeout, async {
                while runs.join_next().await.is_some() {}
            })
            .await;
            if finished.is_err() {
                tracing::warn!(
                    pending,
                    timeout = ?self.settings.shutdown_timeout,
                    "shutdown rules still running, abandoning them"
                );
                for abort in &aborts {
                    abort.abort();
                }
            }
            manager.clear();
        }

        self.tracker.shutdown();
        self.tracker.history().flush().await;
        tracing::info!("automation engine stopped");
    }
}
