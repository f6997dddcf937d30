//! Actions — the side effects a rule runs once its condition passes.
//!
//! Configurations are turned into [`Action`] objects by the
//! [`ActionRegistry`]. Control-flow actions (`if`, `while`) keep their
//! nested configurations and instantiate them through the registry every
//! time they run, so one nested entry can run any number of times inside
//! a loop.
//!
//! Each action runs on its own task. A failing or panicking action is
//! logged and never aborts the rest of its list.

pub mod conditional;
pub mod interception;
pub mod lifecycle;
pub mod repeat;
pub mod utility;

use std::sync::Arc;

use tokio::task::JoinHandle;

use autostart_domain::error::ConfigError;
use autostart_domain::rule::{ActionConfig, ActionKind, Template};

use crate::context::{ExecutionContext, RULE_NAME};
use crate::ports::Platform;
use crate::ports::condition::{BoxFuture, ConditionEvaluator};
use crate::servers::ServerManager;
use crate::startup::StartupTracker;
use crate::variables::VariableResolver;

pub use conditional::IfAction;
pub use interception::{AllowConnectionAction, PingAction, RespondPingAction};
pub use lifecycle::{LifecycleAction, LifecycleOp, SendCommandAction};
pub use repeat::WhileAction;
pub use utility::{LogAction, SleepAction};

/// A runnable action.
pub trait Action: Send + Sync {
    /// Configuration name of the action (`start`, `while`, ...).
    fn kind(&self) -> &'static str;

    /// Run against `ctx`. The returned future owns everything it needs.
    fn execute(self: Arc<Self>, ctx: ExecutionContext) -> BoxFuture<'static, ()>;
}

/// Collaborators shared by every action.
pub struct ActionServices<P: Platform> {
    pub servers: Arc<ServerManager<P>>,
    pub tracker: Arc<StartupTracker<P>>,
    pub resolver: VariableResolver,
    pub conditions: Arc<dyn ConditionEvaluator>,
}

/// Builds actions from their configuration.
pub struct ActionRegistry<P: Platform> {
    services: Arc<ActionServices<P>>,
}

impl<P: Platform> Clone for ActionRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            services: Arc::clone(&self.services),
        }
    }
}

impl<P: Platform> ActionRegistry<P> {
    #[must_use]
    pub fn new(services: ActionServices<P>) -> Self {
        Self {
            services: Arc::new(services),
        }
    }

    #[must_use]
    pub fn services(&self) -> &Arc<ActionServices<P>> {
        &self.services
    }

    /// Instantiate one action.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for blank required fields and
    /// [`ConfigError::UnknownServer`] when a literal server name is not
    /// managed. Names containing `${...}` are only checked when the action
    /// runs.
    pub fn create(&self, config: &ActionConfig) -> Result<Arc<dyn Action>, ConfigError> {
        let kind = config.kind();
        let services = Arc::clone(&self.services);
        let action: Arc<dyn Action> = match &config.kind {
            ActionKind::Start { server } => {
                self.check_server(kind, server)?;
                Arc::new(LifecycleAction::new(LifecycleOp::Start, server.clone(), services))
            }
            ActionKind::Stop { server } => {
                self.check_server(kind, server)?;
                Arc::new(LifecycleAction::new(LifecycleOp::Stop, server.clone(), services))
            }
            ActionKind::Restart { server } => {
                self.check_server(kind, server)?;
                Arc::new(LifecycleAction::new(LifecycleOp::Restart, server.clone(), services))
            }
            ActionKind::SendCommand { server, command } => {
                self.check_server(kind, server)?;
                required(kind, "command", command)?;
                Arc::new(SendCommandAction::new(server.clone(), command.clone(), services))
            }
            ActionKind::Sleep { duration } => {
                required(kind, "duration", duration)?;
                Arc::new(SleepAction::new(duration.clone(), services))
            }
            ActionKind::Log { message, level } => {
                required(kind, "message", message)?;
                Arc::new(LogAction::new(message.clone(), level.clone(), services))
            }
            ActionKind::AllowConnection { connection, server } => {
                required(kind, "connection", connection)?;
                Arc::new(AllowConnectionAction::new(
                    connection.clone(),
                    server.clone(),
                    services,
                ))
            }
            ActionKind::AllowPing { ping } => {
                required(kind, "ping", ping)?;
                Arc::new(PingAction::allow(ping.clone(), services))
            }
            ActionKind::DenyPing { ping } => {
                required(kind, "ping", ping)?;
                Arc::new(PingAction::deny(ping.clone(), services))
            }
            ActionKind::RespondPing(respond) => {
                required(kind, "ping", &respond.ping)?;
                Arc::new(RespondPingAction::new(respond.clone(), services))
            }
            ActionKind::If(branches) => Arc::new(IfAction::new(branches.clone(), self.clone())),
            ActionKind::While(body) => Arc::new(WhileAction::new(body.clone(), self.clone())),
        };
        Ok(action)
    }

    /// Instantiate `configs` and every nested action once, to surface
    /// configuration errors before a rule is activated.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn check_all(&self, configs: &[ActionConfig]) -> Result<(), ConfigError> {
        for config in configs {
            self.create(config)?;
            match &config.kind {
                ActionKind::If(branches) => {
                    self.check_all(&branches.then)?;
                    for (_, then) in branches.branches() {
                        self.check_all(then)?;
                    }
                    self.check_all(&branches.otherwise)?;
                }
                ActionKind::While(body) => self.check_all(&body.body)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn check_server(&self, kind: &'static str, server: &Template) -> Result<(), ConfigError> {
        required(kind, "server", server)?;
        let name = server.as_str().trim();
        if !name.contains("${") && !self.services.servers.has_server(name) {
            return Err(ConfigError::UnknownServer(name.to_string()));
        }
        Ok(())
    }

    /// Instantiate and start one action on its own task.
    ///
    /// Returns `None` when the configuration cannot be instantiated.
    pub fn spawn(&self, config: &ActionConfig, ctx: &ExecutionContext) -> Option<JoinHandle<()>> {
        match self.create(config) {
            Ok(action) => Some(tokio::spawn(action.execute(ctx.clone()))),
            Err(err) => {
                tracing::error!(
                    rule = %rule_name(ctx),
                    action = config.kind(),
                    %err,
                    "failed to create action"
                );
                None
            }
        }
    }

    /// Run `configs` in order, awaiting those that wait for completion.
    pub async fn run_all(&self, configs: &[ActionConfig], ctx: &ExecutionContext) {
        for config in configs {
            let Some(handle) = self.spawn(config, ctx) else {
                continue;
            };
            if config.wait_for_completion {
                settle(config.kind(), handle, ctx).await;
            }
        }
    }
}

/// Await an action task, logging a panic instead of propagating it.
pub(crate) async fn settle(kind: &'static str, handle: JoinHandle<()>, ctx: &ExecutionContext) {
    if let Err(err) = handle.await {
        tracing::error!(rule = %rule_name(ctx), action = kind, %err, "action failed");
    }
}

/// Name of the rule running in `ctx`, for log prefixes.
pub(crate) fn rule_name(ctx: &ExecutionContext) -> String {
    ctx.get_string(RULE_NAME)
        .unwrap_or_else(|| "unknown".to_string())
}

fn required(kind: &'static str, field: &'static str, value: &Template) -> Result<(), ConfigError> {
    if value.is_blank() {
        Err(ConfigError::MissingField { kind, field })
    } else {
        Ok(())
    }
}
