//! Triggers — the event sources that fire rules.
//!
//! Every trigger goes `inactive -> activate -> active -> deactivate ->
//! inactive`. Activation registers whatever the variant needs (a bus
//! subscription, a timer task); deactivation cancels all of it and is a
//! no-op when already inactive.
//!
//! A firing builds a fresh [`ExecutionContext`] and hands it to the
//! rule's [`TriggerCallback`]. The callback's future runs on its own
//! task; only the interception triggers wait for it, and only when they
//! hold the host's event (see [`run_held`]).

pub mod connection;
pub mod cron;
pub mod empty_server;
pub mod manual;
pub mod ping;
pub mod proxy;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use autostart_domain::duration::parse_duration;
use autostart_domain::error::ConfigError;
use autostart_domain::rule::TriggerConfig;

use crate::context::{ExecutionContext, TRIGGER_TYPE};
use crate::event_bus::InProcessEventBus;
use crate::ports::Platform;
use crate::ports::condition::BoxFuture;
use crate::servers::ServerManager;
use crate::startup::StartupTracker;

pub use connection::ConnectionTrigger;
pub use cron::CronTrigger;
pub use empty_server::EmptyServerTrigger;
pub use manual::ManualTrigger;
pub use ping::PingTrigger;
pub use proxy::{ProxyShutdownTrigger, ProxyStartTrigger};

/// Default interval of the empty-server sweep.
pub const DEFAULT_EMPTY_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Runs a rule against the context of one firing.
pub type TriggerCallback = Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// A live trigger.
pub trait Trigger: Send + Sync {
    /// Configuration name of the trigger (`cron`, `ping`, ...).
    fn kind(&self) -> &'static str;

    /// Start delivering firings to `callback`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration cannot be used; the
    /// trigger then stays inactive.
    fn activate(&self, rule: &str, callback: TriggerCallback) -> Result<(), ConfigError>;

    /// Stop delivering firings and cancel every timer and subscription.
    fn deactivate(&self);

    fn is_active(&self) -> bool;

    /// Downcast for manual invocation.
    fn as_manual(&self) -> Option<&ManualTrigger> {
        None
    }

    /// Downcast for the engine's shutdown sequence.
    fn as_shutdown(&self) -> Option<&ProxyShutdownTrigger> {
        None
    }
}

/// Collaborators shared by every trigger.
pub struct TriggerServices<P: Platform> {
    pub bus: Arc<InProcessEventBus>,
    pub servers: Arc<ServerManager<P>>,
    pub tracker: Arc<StartupTracker<P>>,
    /// Interval of the empty-server sweep; zero disables it.
    pub empty_check_interval: Duration,
    /// The engine is starting because of a configuration reload.
    pub reload: bool,
}

/// Builds triggers from their configuration.
pub struct TriggerRegistry<P: Platform> {
    services: Arc<TriggerServices<P>>,
}

impl<P: Platform> TriggerRegistry<P> {
    #[must_use]
    pub fn new(services: TriggerServices<P>) -> Self {
        Self {
            services: Arc::new(services),
        }
    }

    #[must_use]
    pub fn services(&self) -> &Arc<TriggerServices<P>> {
        &self.services
    }

    /// Instantiate one trigger.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for a blank manual id or cron
    /// expression and [`ConfigError::InvalidDuration`] for an unparsable
    /// `empty_time`. Cron expressions are parsed on activation.
    pub fn create(&self, config: &TriggerConfig) -> Result<Arc<dyn Trigger>, ConfigError> {
        let trigger: Arc<dyn Trigger> = match config {
            TriggerConfig::Manual { id } => {
                if id.trim().is_empty() {
                    return Err(ConfigError::MissingField {
                        kind: "manual",
                        field: "id",
                    });
                }
                Arc::new(ManualTrigger::new(id.trim()))
            }
            TriggerConfig::Cron {
                expression,
                format,
                time_zone,
            } => {
                if expression.trim().is_empty() {
                    return Err(ConfigError::MissingField {
                        kind: "cron",
                        field: "expression",
                    });
                }
                Arc::new(CronTrigger::new(
                    expression.trim(),
                    format.as_deref(),
                    time_zone.as_deref(),
                ))
            }
            TriggerConfig::Connection {
                server_list,
                player_list,
                deny_connection,
            } => Arc::new(ConnectionTrigger::new(
                server_list.clone(),
                player_list.clone(),
                *deny_connection,
                Arc::clone(&self.services),
            )),
            TriggerConfig::Ping {
                server_list,
                virtual_host_list,
                hold_response,
            } => Arc::new(PingTrigger::new(
                server_list,
                virtual_host_list,
                *hold_response,
                Arc::clone(&self.services),
            )),
            TriggerConfig::EmptyServer {
                empty_time,
                server_list,
            } => {
                let empty_time =
                    parse_duration(empty_time).map_err(|source| ConfigError::InvalidDuration {
                        kind: "empty_server",
                        field: "empty_time",
                        source,
                    })?;
                Arc::new(EmptyServerTrigger::new(
                    empty_time,
                    server_list.clone(),
                    Arc::clone(&self.services),
                ))
            }
            TriggerConfig::ProxyStart => Arc::new(ProxyStartTrigger::new(
                Arc::clone(&self.services.bus),
                self.services.reload,
            )),
            TriggerConfig::ProxyShutdown => Arc::new(ProxyShutdownTrigger::new()),
        };
        Ok(trigger)
    }
}

/// Fresh context for one firing of a `kind` trigger.
pub(crate) fn firing_context(kind: &'static str) -> ExecutionContext {
    let ctx = ExecutionContext::new();
    ctx.set(TRIGGER_TYPE, kind);
    ctx
}

/// Run the callback on its own task without waiting for it.
pub(crate) fn launch(callback: &TriggerCallback, ctx: ExecutionContext) -> JoinHandle<()> {
    tokio::spawn(callback(ctx))
}

/// How a held firing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldOutcome {
    /// The action list finished first.
    Completed,
    /// An action released the event; the list keeps running.
    Released,
}

/// Run the callback and wait until it finishes or an action releases the
/// event, whichever comes first.
///
/// Release never cancels the action list.
pub(crate) async fn run_held(callback: &TriggerCallback, ctx: ExecutionContext) -> HoldOutcome {
    let signal = ctx.release_signal();
    let mut run = launch(callback, ctx);
    tokio::select! {
        result = &mut run => {
            if let Err(err) = result {
                tracing::error!(%err, "rule execution failed while holding event");
            }
            HoldOutcome::Completed
        }
        () = signal.released() => HoldOutcome::Released,
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn callback(body: impl Fn(ExecutionContext) -> BoxFuture<'static, ()> + Send + Sync + 'static) -> TriggerCallback {
        Arc::new(body)
    }

    #[tokio::test(start_paused = true)]
    async fn should_return_on_release_while_actions_keep_running() {
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let cb = callback(move |ctx| {
            let flag = Arc::clone(&flag);
            Box::pin(async move {
                ctx.release_event();
                tokio::time::sleep(Duration::from_secs(5)).await;
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
            })
        });

        let outcome = run_held(&cb, firing_context("connection")).await;
        assert_eq!(outcome, HoldOutcome::Released);
        assert!(!finished.load(std::sync::atomic::Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn should_wait_for_completion_without_release() {
        let cb = callback(|_ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(2)).await;
            })
        });
        let started = tokio::time::Instant::now();
        let outcome = run_held(&cb, firing_context("ping")).await;
        assert_eq!(outcome, HoldOutcome::Completed);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn should_tag_firing_context_with_trigger_type() {
        let ctx = firing_context("cron");
        assert_eq!(ctx.get_string(TRIGGER_TYPE).as_deref(), Some("cron"));
    }
}
