//! `start`, `stop`, `restart` and `send_command`.

use std::sync::Arc;

use autostart_domain::rule::Template;

use super::{Action, ActionServices, rule_name};
use crate::context::ExecutionContext;
use crate::ports::Platform;
use crate::ports::condition::BoxFuture;

/// Which lifecycle command a [`LifecycleAction`] sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Start,
    Stop,
    Restart,
}

impl LifecycleOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

/// Sends a lifecycle command to a managed server.
///
/// A successful `start` or `restart` begins startup tracking only after
/// the command went out, so the monitor's first ping cannot race the
/// "already online" check of the start itself. A `stop` clears any
/// tracked startup.
pub struct LifecycleAction<P: Platform> {
    op: LifecycleOp,
    server: Template,
    services: Arc<ActionServices<P>>,
}

impl<P: Platform> LifecycleAction<P> {
    #[must_use]
    pub fn new(op: LifecycleOp, server: Template, services: Arc<ActionServices<P>>) -> Self {
        Self {
            op,
            server,
            services,
        }
    }

    async fn run(&self, ctx: &ExecutionContext) {
        let server = self.services.resolver.resolve(&self.server, ctx);
        let server = server.trim();
        let servers = &self.services.servers;
        let ok = match self.op {
            LifecycleOp::Start => servers.start(server, false).await,
            LifecycleOp::Stop => servers.stop(server).await,
            LifecycleOp::Restart => servers.restart(server).await,
        };
        if !ok {
            tracing::warn!(rule = %rule_name(ctx), server, op = self.op.as_str(), "server command failed");
            return;
        }
        tracing::info!(rule = %rule_name(ctx), server, op = self.op.as_str(), "server command sent");
        match self.op {
            LifecycleOp::Start | LifecycleOp::Restart => {
                self.services.tracker.begin_startup(server);
            }
            LifecycleOp::Stop => self.services.tracker.clear_startup(server),
        }
    }
}

impl<P: Platform> Action for LifecycleAction<P> {
    fn kind(&self) -> &'static str {
        self.op.as_str()
    }

    fn execute(self: Arc<Self>, ctx: ExecutionContext) -> BoxFuture<'static, ()> {
        Box::pin(async move { self.run(&ctx).await })
    }
}

/// Sends a console command to a managed server.
pub struct SendCommandAction<P: Platform> {
    server: Template,
    command: Template,
    services: Arc<ActionServices<P>>,
}

impl<P: Platform> SendCommandAction<P> {
    #[must_use]
    pub fn new(server: Template, command: Template, services: Arc<ActionServices<P>>) -> Self {
        Self {
            server,
            command,
            services,
        }
    }
}

impl<P: Platform> Action for SendCommandAction<P> {
    fn kind(&self) -> &'static str {
        "send_command"
    }

    fn execute(self: Arc<Self>, ctx: ExecutionContext) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let resolver = &self.services.resolver;
            let server = resolver.resolve(&self.server, &ctx);
            let command = resolver.resolve(&self.command, &ctx);
            if !self.services.servers.send_command(server.trim(), &command).await {
                tracing::warn!(rule = %rule_name(&ctx), server = %server.trim(), "command was not sent");
            }
        })
    }
}
