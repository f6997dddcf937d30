//! `connection` — fired when a player tries to join a backend server.

use std::sync::{Arc, Mutex, PoisonError};

use autostart_domain::error::ConfigError;
use autostart_domain::event::ConnectionAttempt;
use autostart_domain::filter::ListFilter;
use autostart_domain::id::SubscriptionId;
use autostart_domain::value::Value;

use super::{HoldOutcome, Trigger, TriggerCallback, TriggerServices, firing_context, launch, run_held};
use crate::context::ExecutionContext;
use crate::event_bus::ConnectionHandler;
use crate::ports::Platform;
use crate::ports::condition::BoxFuture;

/// Intercepts connection attempts that pass both filters.
///
/// With `deny_connection`, the attempt is denied up front and the host
/// waits until the rule releases it (typically through
/// `allow_connection` once the target is up) or finishes.
pub struct ConnectionTrigger<P: Platform> {
    server_list: ListFilter,
    player_list: ListFilter,
    deny: bool,
    services: Arc<TriggerServices<P>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl<P: Platform> ConnectionTrigger<P> {
    #[must_use]
    pub fn new(
        server_list: ListFilter,
        player_list: ListFilter,
        deny: bool,
        services: Arc<TriggerServices<P>>,
    ) -> Self {
        Self {
            server_list,
            player_list,
            deny,
            services,
            subscription: Mutex::new(None),
        }
    }
}

struct Interceptor<P: Platform> {
    rule: String,
    callback: TriggerCallback,
    server_list: ListFilter,
    player_list: ListFilter,
    deny: bool,
    services: Arc<TriggerServices<P>>,
}

impl<P: Platform> Interceptor<P> {
    fn context(&self, attempt: &Arc<ConnectionAttempt>) -> ExecutionContext {
        let ctx = firing_context("connection");
        let player = attempt.player();
        let target = attempt.target();
        let servers = &self.services.servers;
        ctx.set("connection", Value::object(Arc::clone(attempt)));
        ctx.set("connection.player", Value::object(Arc::clone(player)));
        ctx.set("connection.player.name", player.name.as_str());
        ctx.set("connection.player.uuid", player.uuid.to_string());
        ctx.set("connection.server", target);
        ctx.set("connection.server.name", target);
        ctx.set(
            "connection.server.status",
            self.services.tracker.cached_state(target).as_str(),
        );
        ctx.set("connection.server.player_count", servers.player_count(target));
        ctx.set(
            "connection.server.players",
            Value::List(servers.players(target).into_iter().map(Value::from).collect()),
        );
        if let Some(previous) = attempt.previous_server() {
            ctx.set("connection.previous_server", previous);
        }
        ctx
    }

    async fn handle(&self, attempt: Arc<ConnectionAttempt>) {
        let player = &attempt.player().name;
        if !self.server_list.matches(attempt.target()) || !self.player_list.matches(player) {
            return;
        }
        let ctx = self.context(&attempt);
        if !self.deny {
            tracing::debug!(rule = %self.rule, player, server = attempt.target(), "connection trigger fired");
            launch(&self.callback, ctx);
            return;
        }

        attempt.deny();
        tracing::debug!(rule = %self.rule, player, server = attempt.target(), "holding connection");
        let outcome = run_held(&self.callback, ctx).await;
        tracing::debug!(
            rule = %self.rule,
            player,
            released = outcome == HoldOutcome::Released,
            denied = attempt.is_denied(),
            "connection decided"
        );
    }
}

impl<P: Platform> Trigger for ConnectionTrigger<P> {
    fn kind(&self) -> &'static str {
        "connection"
    }

    fn activate(&self, rule: &str, callback: TriggerCallback) -> Result<(), ConfigError> {
        let interceptor = Arc::new(Interceptor {
            rule: rule.to_string(),
            callback,
            server_list: self.server_list.clone(),
            player_list: self.player_list.clone(),
            deny: self.deny,
            services: Arc::clone(&self.services),
        });
        let handler: ConnectionHandler = Arc::new(move |attempt| -> BoxFuture<'static, ()> {
            let interceptor = Arc::clone(&interceptor);
            Box::pin(async move { interceptor.handle(attempt).await })
        });
        let id = self.services.bus.subscribe_connection(handler);
        if let Some(previous) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(id)
        {
            self.services.bus.unsubscribe(previous);
        }
        tracing::debug!(rule, deny = self.deny, "connection trigger activated");
        Ok(())
    }

    fn deactivate(&self) {
        if let Some(id) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.services.bus.unsubscribe(id);
        }
    }

    fn is_active(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
