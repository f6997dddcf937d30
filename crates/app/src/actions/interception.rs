//! Actions that decide held interception events.
//!
//! Each one finds the event through a whole-string reference such as
//! `${connection}`, changes its outcome, then releases the triggering
//! hold so the host gets its answer while the rest of the list runs on.

use std::sync::Arc;

use autostart_domain::event::{ConnectionAttempt, PingRequest};
use autostart_domain::rule::{RespondPingConfig, Template};
use autostart_domain::value::VariableSource;

use super::{Action, ActionServices, rule_name};
use crate::context::ExecutionContext;
use crate::ports::condition::BoxFuture;
use crate::ports::{Platform, ProxyView};
use crate::variables::{VariableResolver, extract_variable_name, is_full_reference};

fn lookup<T: VariableSource>(
    resolver: &VariableResolver,
    reference: &Template,
    ctx: &ExecutionContext,
    action: &'static str,
) -> Option<Arc<T>> {
    let raw = reference.as_str().trim();
    if !is_full_reference(raw) {
        tracing::error!(rule = %rule_name(ctx), action, reference = raw, "expected a whole ${{...}} reference");
        return None;
    }
    let found = resolver
        .resolve_variable(extract_variable_name(raw), ctx)
        .and_then(|value| value.downcast::<T>());
    if found.is_none() {
        tracing::error!(rule = %rule_name(ctx), action, reference = raw, "no matching event in context");
    }
    found
}

/// Lets a held connection attempt through, to its target or another server.
pub struct AllowConnectionAction<P: Platform> {
    connection: Template,
    server: Template,
    services: Arc<ActionServices<P>>,
}

impl<P: Platform> AllowConnectionAction<P> {
    #[must_use]
    pub fn new(connection: Template, server: Template, services: Arc<ActionServices<P>>) -> Self {
        Self {
            connection,
            server,
            services,
        }
    }

    fn run(&self, ctx: &ExecutionContext) {
        let resolver = &self.services.resolver;
        let Some(attempt) =
            lookup::<ConnectionAttempt>(resolver, &self.connection, ctx, "allow_connection")
        else {
            return;
        };
        let resolved = resolver.resolve(&self.server, ctx);
        let server = match resolved.trim() {
            "" => attempt.target().to_string(),
            name => name.to_string(),
        };
        let known = self.services.servers.has_server(&server)
            || self
                .services
                .servers
                .proxy()
                .server_names()
                .iter()
                .any(|name| *name == server);
        if !known {
            tracing::error!(rule = %rule_name(ctx), server, "cannot allow connection to unknown server");
            return;
        }
        attempt.allow(server.as_str());
        tracing::debug!(
            rule = %rule_name(ctx),
            player = %attempt.player().name,
            server,
            "allowed connection"
        );
        ctx.release_event();
    }
}

impl<P: Platform> Action for AllowConnectionAction<P> {
    fn kind(&self) -> &'static str {
        "allow_connection"
    }

    fn execute(self: Arc<Self>, ctx: ExecutionContext) -> BoxFuture<'static, ()> {
        Box::pin(async move { self.run(&ctx) })
    }
}

/// Allows or denies a held ping.
pub struct PingAction<P: Platform> {
    allow: bool,
    ping: Template,
    services: Arc<ActionServices<P>>,
}

impl<P: Platform> PingAction<P> {
    #[must_use]
    pub fn allow(ping: Template, services: Arc<ActionServices<P>>) -> Self {
        Self {
            allow: true,
            ping,
            services,
        }
    }

    #[must_use]
    pub fn deny(ping: Template, services: Arc<ActionServices<P>>) -> Self {
        Self {
            allow: false,
            ping,
            services,
        }
    }
}

impl<P: Platform> Action for PingAction<P> {
    fn kind(&self) -> &'static str {
        if self.allow { "allow_ping" } else { "deny_ping" }
    }

    fn execute(self: Arc<Self>, ctx: ExecutionContext) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let Some(ping) =
                lookup::<PingRequest>(&self.services.resolver, &self.ping, &ctx, self.kind())
            else {
                return;
            };
            if self.allow {
                ping.allow();
            } else {
                ping.deny();
            }
            tracing::debug!(rule = %rule_name(&ctx), allowed = self.allow, "decided ping");
            ctx.release_event();
        })
    }
}

/// Rewrites the response of a held ping and allows it.
pub struct RespondPingAction<P: Platform> {
    config: RespondPingConfig,
    services: Arc<ActionServices<P>>,
}

impl<P: Platform> RespondPingAction<P> {
    #[must_use]
    pub fn new(config: RespondPingConfig, services: Arc<ActionServices<P>>) -> Self {
        Self { config, services }
    }

    fn run(&self, ctx: &ExecutionContext) {
        let resolver = &self.services.resolver;
        let Some(ping) = lookup::<PingRequest>(resolver, &self.config.ping, ctx, "respond_ping")
        else {
            return;
        };
        let config = &self.config;
        ping.update_response(|response| {
            if let Some(version) = &config.version_name {
                response.version_name = resolver.resolve(version, ctx);
            }
            if let Some(protocol) = &config.protocol_version {
                response.protocol_version =
                    resolver.resolve_int(protocol, ctx, response.protocol_version);
            }
            if let Some(motd) = &config.motd {
                response.motd = resolver.resolve(motd, ctx);
            }
            if let Some(count) = &config.player_count {
                response.online_players = non_negative(
                    resolver.resolve_i64(count, ctx, i64::from(response.online_players)),
                );
            }
            if let Some(max) = &config.max_players {
                response.max_players =
                    non_negative(resolver.resolve_i64(max, ctx, i64::from(response.max_players)));
            }
        });
        ping.allow();
        tracing::debug!(rule = %rule_name(ctx), "responded to ping");
        ctx.release_event();
    }
}

fn non_negative(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

impl<P: Platform> Action for RespondPingAction<P> {
    fn kind(&self) -> &'static str {
        "respond_ping"
    }

    fn execute(self: Arc<Self>, ctx: ExecutionContext) -> BoxFuture<'static, ()> {
        Box::pin(async move { self.run(&ctx) })
    }
}
