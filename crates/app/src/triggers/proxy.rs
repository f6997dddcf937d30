//! `proxy_start` and `proxy_shutdown`.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::{AbortHandle, JoinHandle};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use autostart_domain::error::ConfigError;
use autostart_domain::event::ProxyEvent;

use super::{Trigger, TriggerCallback, firing_context, launch};
use crate::event_bus::InProcessEventBus;

/// Fires once when the proxy has started.
///
/// Activation itself counts as the start unless the engine is being
/// reloaded; later `ProxyStarted` events that are not reloads fire too.
pub struct ProxyStartTrigger {
    bus: Arc<InProcessEventBus>,
    reload: bool,
    listener: Mutex<Option<AbortHandle>>,
}

impl ProxyStartTrigger {
    #[must_use]
    pub fn new(bus: Arc<InProcessEventBus>, reload: bool) -> Self {
        Self {
            bus,
            reload,
            listener: Mutex::new(None),
        }
    }
}

fn fire_start(rule: &str, callback: &TriggerCallback) {
    tracing::debug!(rule, "proxy start trigger fired");
    launch(callback, firing_context("proxy_start"));
}

impl Trigger for ProxyStartTrigger {
    fn kind(&self) -> &'static str {
        "proxy_start"
    }

    fn activate(&self, rule: &str, callback: TriggerCallback) -> Result<(), ConfigError> {
        let mut events = BroadcastStream::new(self.bus.subscribe());
        if self.reload {
            tracing::debug!(rule, "skipping proxy start on reload");
        } else {
            fire_start(rule, &callback);
        }

        let rule = rule.to_string();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    Ok(ProxyEvent::ProxyStarted { reload: false }) => fire_start(&rule, &callback),
                    Ok(_) => {}
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(rule, skipped, "proxy start trigger lagged behind events");
                    }
                }
            }
        });
        if let Some(previous) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task.abort_handle())
        {
            previous.abort();
        }
        Ok(())
    }

    fn deactivate(&self) {
        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

struct Binding {
    rule: String,
    callback: TriggerCallback,
}

/// Fires when the proxy shuts down.
///
/// The engine's shutdown sequence fires these directly so it can wait for
/// the rules to finish before tearing everything down.
pub struct ProxyShutdownTrigger {
    binding: Mutex<Option<Binding>>,
}

impl ProxyShutdownTrigger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            binding: Mutex::new(None),
        }
    }

    /// Run the rule; `None` when inactive.
    pub fn fire(&self) -> Option<JoinHandle<()>> {
        let binding = self.binding.lock().unwrap_or_else(PoisonError::into_inner);
        let binding = binding.as_ref()?;
        tracing::debug!(rule = %binding.rule, "proxy shutdown trigger fired");
        Some(launch(&binding.callback, firing_context("proxy_shutdown")))
    }
}

impl Default for ProxyShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger for ProxyShutdownTrigger {
    fn kind(&self) -> &'static str {
        "proxy_shutdown"
    }

    fn activate(&self, rule: &str, callback: TriggerCallback) -> Result<(), ConfigError> {
        *self.binding.lock().unwrap_or_else(PoisonError::into_inner) = Some(Binding {
            rule: rule.to_string(),
            callback,
        });
        Ok(())
    }

    fn deactivate(&self) {
        self.binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_active(&self) -> bool {
        self.binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn as_shutdown(&self) -> Option<&ProxyShutdownTrigger> {
        Some(self)
    }
}
