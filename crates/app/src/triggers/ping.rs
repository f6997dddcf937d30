//! `ping` — fired when a client pings the proxy.

use std::sync::{Arc, Mutex, PoisonError};

use autostart_domain::error::ConfigError;
use autostart_domain::event::{PingOutcome, PingRequest};
use autostart_domain::filter::{FilterMode, ListFilter};
use autostart_domain::id::SubscriptionId;
use autostart_domain::value::Value;

use super::{HoldOutcome, Trigger, TriggerCallback, TriggerServices, firing_context, launch, run_held};
use crate::context::ExecutionContext;
use crate::event_bus::PingHandler;
use crate::ports::condition::BoxFuture;
use crate::ports::{Platform, ProxyView};

/// Intercepts pings whose virtual host passes the merged host filter.
pub struct PingTrigger<P: Platform> {
    server_list: ListFilter,
    virtual_host_list: ListFilter,
    hold: bool,
    services: Arc<TriggerServices<P>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl<P: Platform> PingTrigger<P> {
    #[must_use]
    pub fn new(
        server_list: &ListFilter,
        virtual_host_list: &ListFilter,
        hold: bool,
        services: Arc<TriggerServices<P>>,
    ) -> Self {
        Self {
            server_list: server_list.clone(),
            virtual_host_list: virtual_host_list.clone(),
            hold,
            services,
            subscription: Mutex::new(None),
        }
    }

    /// Listed virtual hosts plus the hosts routing to every listed server.
    ///
    /// When both lists are set with different modes the result is a
    /// whitelist.
    fn host_filter(&self) -> ListFilter {
        let proxy = self.services.servers.proxy();
        let mut entries = self.virtual_host_list.entries.clone();
        for server in &self.server_list.entries {
            entries.extend(proxy.virtual_hosts(server));
        }
        entries.sort_unstable_by_key(|host| host.to_ascii_lowercase());
        entries.dedup_by(|a, b| a.eq_ignore_ascii_case(b));

        let mode = match (self.server_list.is_empty(), self.virtual_host_list.is_empty()) {
            (true, _) => self.virtual_host_list.mode,
            (false, true) => self.server_list.mode,
            (false, false) if self.server_list.mode == self.virtual_host_list.mode => {
                self.server_list.mode
            }
            (false, false) => FilterMode::Whitelist,
        };
        ListFilter { mode, entries }
    }
}

struct Interceptor {
    rule: String,
    callback: TriggerCallback,
    hosts: ListFilter,
    hold: bool,
}

impl Interceptor {
    fn accepts(&self, ping: &PingRequest) -> bool {
        match ping.virtual_host() {
            Some(host) => self.hosts.matches_ignore_case(host),
            None => self.hosts.is_empty() || self.hosts.mode != FilterMode::Whitelist,
        }
    }

    fn context(ping: &Arc<PingRequest>) -> ExecutionContext {
        let ctx = firing_context("ping");
        let response = ping.response();
        ctx.set("ping", Value::object(Arc::clone(ping)));
        ctx.set("ping.server.version_name", response.version_name);
        ctx.set("ping.server.protocol_version", response.protocol_version);
        ctx.set("ping.server.player_count", response.online_players);
        ctx.set("ping.server.max_players", response.max_players);
        ctx.set("ping.server.motd", response.motd);
        ctx.set(
            "ping.player.remote_address",
            ping.remote_address().map(str::to_string),
        );
        ctx.set("ping.player.virtual_host", ping.virtual_host().map(str::to_string));
        ctx.set("ping.player.protocol_version", ping.protocol_version());
        ctx
    }

    async fn handle(&self, ping: Arc<PingRequest>) {
        if !self.accepts(&ping) {
            return;
        }
        let ctx = Self::context(&ping);
        if !self.hold {
            tracing::trace!(rule = %self.rule, host = ?ping.virtual_host(), "ping trigger fired");
            launch(&self.callback, ctx);
            return;
        }

        // A held ping is dropped unless an action allows or answers it.
        ping.deny();
        let outcome = run_held(&self.callback, ctx).await;
        tracing::debug!(
            rule = %self.rule,
            host = ?ping.virtual_host(),
            released = outcome == HoldOutcome::Released,
            allowed = ping.outcome() == PingOutcome::Allowed,
            "ping decided"
        );
    }
}

impl<P: Platform> Trigger for PingTrigger<P> {
    fn kind(&self) -> &'static str {
        "ping"
    }

    fn activate(&self, rule: &str, callback: TriggerCallback) -> Result<(), ConfigError> {
        let hosts = self.host_filter();
        tracing::debug!(rule, mode = ?hosts.mode, hosts = ?hosts.entries, hold = self.hold, "ping trigger activated");
        let interceptor = Arc::new(Interceptor {
            rule: rule.to_string(),
            callback,
            hosts,
            hold: self.hold,
        });
        let handler: PingHandler = Arc::new(move |ping| -> BoxFuture<'static, ()> {
            let interceptor = Arc::clone(&interceptor);
            Box::pin(async move { interceptor.handle(ping).await })
        });
        let id = self.services.bus.subscribe_ping(handler);
        if let Some(previous) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(id)
        {
            self.services.bus.unsubscribe(previous);
        }
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

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use autostart_domain::event::PingResponse;

    use super::*;
    use crate::testing::{FakeProxy, TestPlatform};
    use crate::triggers::test_support::{recording, services};

    fn ping(host: Option<&str>) -> PingRequest {
        PingRequest::new(
            Some("10.0.0.7".to_string()),
            host.map(str::to_string),
            767,
            PingResponse {
                version_name: "1.21".to_string(),
                protocol_version: 767,
                online_players: 4,
                max_players: 50,
                motd: "welcome".to_string(),
            },
        )
    }

    async fn trigger(
        server_list: ListFilter,
        hosts: ListFilter,
        hold: bool,
    ) -> (PingTrigger<TestPlatform>, Arc<TriggerServices<TestPlatform>>) {
        let proxy = Arc::new(FakeProxy::default());
        proxy.set_virtual_hosts("survival", &["survival.example.net"]);
        let services = services(proxy, &["survival"], Duration::ZERO, false).await;
        (
            PingTrigger::new(&server_list, &hosts, hold, Arc::clone(&services)),
            services,
        )
    }

    #[tokio::test]
    async fn should_merge_server_hosts_into_filter() {
        let (trigger, _) = trigger(
            ListFilter::new(FilterMode::Whitelist, ["survival"]),
            ListFilter::new(FilterMode::Blacklist, ["lobby.example.net"]),
            false,
        )
        .await;
        let filter = trigger.host_filter();
        assert_eq!(filter.mode, FilterMode::Whitelist);
        assert_eq!(
            filter.entries,
            vec!["lobby.example.net".to_string(), "survival.example.net".to_string()]
        );
    }

    #[tokio::test]
    async fn should_expose_ping_variables() {
        let (trigger, services) = trigger(ListFilter::default(), ListFilter::default(), false).await;
        let (callback, seen) = recording();
        trigger.activate("motd", callback).unwrap();

        services.bus.dispatch_ping(ping(Some("play.example.net"))).await;

        let seen = seen.lock().unwrap();
        let ctx = &seen[0];
        assert_eq!(ctx.get_string("ping.server.motd").as_deref(), Some("welcome"));
        assert_eq!(ctx.get_string("ping.server.max_players").as_deref(), Some("50"));
        assert_eq!(ctx.get_string("ping.player.remote_address").as_deref(), Some("10.0.0.7"));
        assert_eq!(
            ctx.get_string("ping.player.virtual_host").as_deref(),
            Some("play.example.net")
        );
        assert_eq!(ctx.get_string("ping.player.protocol_version").as_deref(), Some("767"));
    }

    #[tokio::test]
    async fn should_skip_ping_without_host_in_whitelist_mode() {
        let (trigger, services) = trigger(
            ListFilter::default(),
            ListFilter::new(FilterMode::Whitelist, ["Play.Example.net"]),
            false,
        )
        .await;
        let (callback, seen) = recording();
        trigger.activate("motd", callback).unwrap();

        services.bus.dispatch_ping(ping(None)).await;
        services.bus.dispatch_ping(ping(Some("other.example.net"))).await;
        assert!(seen.lock().unwrap().is_empty());

        services.bus.dispatch_ping(ping(Some("play.example.net"))).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_hold_ping_denied_until_released() {
        let (trigger, services) = trigger(ListFilter::default(), ListFilter::default(), true).await;
        let (callback, _) = recording();
        trigger.activate("hold", callback).unwrap();

        let answered = services.bus.dispatch_ping(ping(Some("play.example.net"))).await;
        assert_eq!(answered.outcome(), PingOutcome::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn should_answer_held_ping_as_soon_as_an_action_allows_it() {
        let (trigger, services) = trigger(ListFilter::default(), ListFilter::default(), true).await;
        let callback: TriggerCallback = Arc::new(|ctx: ExecutionContext| -> BoxFuture<'static, ()> {
            Box::pin(async move {
                if let Some(ping) = ctx.get("ping").and_then(|value| value.downcast::<PingRequest>()) {
                    ping.allow();
                }
                ctx.release_event();
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
        });
        trigger.activate("hold", callback).unwrap();

        let started = tokio::time::Instant::now();
        let answered = services.bus.dispatch_ping(ping(Some("play.example.net"))).await;

        assert_eq!(answered.outcome(), PingOutcome::Allowed);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
