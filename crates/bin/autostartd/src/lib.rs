//! # autostartd — autostart daemon
//!
//! Composition root that wires the adapters into the automation engine.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Build the virtual proxy and one virtual backend per configured server
//! - Load startup history through the file adapter
//! - Construct the automation engine and load the configured rules
//! - Offer a line console for manual triggers and simulated players
//! - Handle graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

pub mod config;
pub mod console;

use std::path::PathBuf;
use std::sync::Arc;

use autostart_adapter_history_file::FileHistoryStore;
use autostart_adapter_virtual::{VirtualPlatform, VirtualProxy, VirtualServer};
use autostart_app::engine::AutomationEngine;
use autostart_app::event_bus::InProcessEventBus;
use autostart_app::rules::LoadSummary;
use autostart_app::servers::ServerManager;
use autostart_app::startup::StartupHistoryTracker;

use crate::config::{Config, ConfigError};

/// The platform this daemon runs on.
pub type DaemonPlatform = VirtualPlatform<FileHistoryStore>;

/// A fully wired daemon.
pub struct Daemon {
    engine: AutomationEngine<DaemonPlatform>,
    proxy: Arc<VirtualProxy>,
    config: Config,
    config_path: Option<PathBuf>,
}

impl Daemon {
    /// Wire every adapter from `config`. Nothing runs until [`Daemon::start`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when a server section does not
    /// convert into settings.
    pub async fn build(config: Config) -> Result<Self, ConfigError> {
        let bus = Arc::new(InProcessEventBus::new(config.settings.event_bus_capacity));

        let mut proxy = VirtualProxy::new(Arc::clone(&bus));
        let mut backends = Vec::new();
        for (name, server) in &config.servers {
            let backend = if server.managed {
                let simulation = config.simulation_settings(name)?;
                let backend = if server.simulation.running {
                    VirtualServer::online(name.as_str(), simulation)
                } else {
                    VirtualServer::new(name.as_str(), simulation)
                };
                backends.push((name.clone(), backend.clone()));
                Some(backend)
            } else {
                None
            };
            proxy.register(name.as_str(), backend, server.virtual_hosts.clone());
        }
        let proxy = Arc::new(proxy);

        let mut servers = ServerManager::<DaemonPlatform>::new(Arc::clone(&proxy));
        for (name, backend) in backends {
            let settings = config.server_settings(&name)?;
            servers.register(name, backend, settings);
        }

        let store = Arc::new(FileHistoryStore::new(config.settings.history_file.clone()));
        let history = Arc::new(StartupHistoryTracker::load(store).await);

        let engine = AutomationEngine::new(
            bus,
            Arc::new(servers),
            history,
            config.engine_settings()?,
        );
        tracing::info!(
            servers = config.servers.len(),
            rules = config.rules.len(),
            history = %config.settings.history_file.display(),
            "daemon wired"
        );
        Ok(Self {
            engine,
            proxy,
            config,
            config_path: None,
        })
    }

    /// Remember where the configuration came from so it can be reloaded.
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn engine(&self) -> &AutomationEngine<DaemonPlatform> {
        &self.engine
    }

    #[must_use]
    pub fn proxy(&self) -> &Arc<VirtualProxy> {
        &self.proxy
    }

    /// Announce the proxy start and load the configured rules.
    pub fn start(&self) -> LoadSummary {
        let summary = self.engine.start(&self.config.rules(), false);
        log_summary(&summary);
        summary
    }

    /// Re-read the configuration file and replace the rule set.
    ///
    /// Servers are wired once; only rules change on reload.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] of the new file; the running rules are
    /// left untouched in that case.
    pub fn reload(&self) -> Result<LoadSummary, ConfigError> {
        let path = self.config_path.clone().unwrap_or_else(Config::path);
        let config = Config::load_from(&path)?;
        if config.servers.keys().ne(self.config.servers.keys()) {
            tracing::warn!("server sections changed, restart the daemon to apply them");
        }
        let summary = self.engine.start(&config.rules(), true);
        log_summary(&summary);
        Ok(summary)
    }

    /// Run the engine's shutdown sequence.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}

fn log_summary(summary: &LoadSummary) {
    tracing::info!(
        loaded = summary.loaded,
        disabled = summary.disabled,
        failed = summary.failed,
        "rules loaded"
    );
}
