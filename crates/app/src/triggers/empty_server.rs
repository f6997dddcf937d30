//! `empty_server` — fired when a server has had no players for a while.
//!
//! Occupancy transitions start and cancel per-server countdowns. A
//! periodic sweep catches servers that are empty without a witnessed
//! transition, such as a server that just finished starting, and a
//! server that fired stays quiet until a player arrives and leaves again.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};

use autostart_domain::duration::format_duration;
use autostart_domain::error::ConfigError;
use autostart_domain::event::ProxyEvent;
use autostart_domain::filter::ListFilter;
use autostart_domain::time::{self, Timestamp};

use super::{Trigger, TriggerCallback, TriggerServices, firing_context, launch};
use crate::ports::{Platform, ProxyView};

/// Upper bound on the reachability check of a server the proxy knows but
/// the engine does not manage.
const PROXY_PING_TIMEOUT: Duration = Duration::from_secs(5);

pub struct EmptyServerTrigger<P: Platform> {
    empty_time: Duration,
    server_list: ListFilter,
    services: Arc<TriggerServices<P>>,
    running: Mutex<Option<Running<P>>>,
}

struct Running<P: Platform> {
    watcher: Arc<Watcher<P>>,
    tasks: Vec<AbortHandle>,
}

struct Countdown {
    generation: u64,
    since: Timestamp,
    handle: AbortHandle,
}

#[derive(Default)]
struct Tracking {
    countdowns: HashMap<String, Countdown>,
    fired: HashSet<String>,
    generation: u64,
}

struct Watcher<P: Platform> {
    rule: String,
    callback: TriggerCallback,
    empty_time: Duration,
    server_list: ListFilter,
    services: Arc<TriggerServices<P>>,
    tracking: Mutex<Tracking>,
}

impl<P: Platform> EmptyServerTrigger<P> {
    #[must_use]
    pub fn new(empty_time: Duration, server_list: ListFilter, services: Arc<TriggerServices<P>>) -> Self {
        Self {
            empty_time,
            server_list,
            services,
            running: Mutex::new(None),
        }
    }

    /// Servers with a countdown in progress, sorted.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = running
            .as_ref()
            .map(|running| running.watcher.lock().countdowns.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl<P: Platform> Watcher<P> {
    fn lock(&self) -> MutexGuard<'_, Tracking> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_disconnect(self: &Arc<Self>, server: &str, remaining: usize) {
        if remaining > 0 || !self.server_list.matches(server) {
            return;
        }
        self.lock().fired.remove(server);
        self.start_countdown(server, self.empty_time, time::now());
    }

    fn on_connect(self: &Arc<Self>, server: &str, previous: Option<&str>) {
        {
            let mut tracking = self.lock();
            if let Some(countdown) = tracking.countdowns.remove(server) {
                countdown.handle.abort();
                tracing::debug!(rule = %self.rule, server, "player arrived, countdown cancelled");
            }
            tracking.fired.remove(server);
        }
        let Some(previous) = previous.filter(|previous| self.server_list.matches(previous)) else {
            return;
        };
        if self.services.servers.player_count(previous) == 0 {
            self.lock().fired.remove(previous);
            self.start_countdown(previous, self.empty_time, time::now());
        }
    }

    async fn is_reachable(&self, server: &str) -> bool {
        let servers = &self.services.servers;
        if servers.has_server(server) {
            return servers.is_online(server).await;
        }
        tokio::time::timeout(PROXY_PING_TIMEOUT, servers.proxy().ping(server))
            .await
            .unwrap_or(false)
    }

    async fn sweep(self: &Arc<Self>) {
        let proxy = self.services.servers.proxy();
        for server in proxy.server_names() {
            if !self.server_list.matches(&server) || proxy.player_count(&server) > 0 {
                continue;
            }
            {
                let tracking = self.lock();
                if tracking.countdowns.contains_key(&server) || tracking.fired.contains(&server) {
                    continue;
                }
            }
            if !self.is_reachable(&server).await {
                continue;
            }
            let now = time::now();
            let since = proxy.empty_since(&server).unwrap_or(now);
            let countdown = self
                .empty_time
                .saturating_sub(time::elapsed_between(since, now));
            tracing::debug!(rule = %self.rule, server, ?countdown, "sweep found empty server");
            self.start_countdown(&server, countdown, since);
        }
    }

    fn start_countdown(self: &Arc<Self>, server: &str, delay: Duration, since: Timestamp) {
        let mut tracking = self.lock();
        tracking.generation += 1;
        let generation = tracking.generation;
        let watcher = Arc::clone(self);
        let name = server.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            watcher.expire(&name, generation);
        });
        let countdown = Countdown {
            generation,
            since,
            handle: task.abort_handle(),
        };
        if let Some(previous) = tracking.countdowns.insert(server.to_string(), countdown) {
            previous.handle.abort();
        }
        tracing::debug!(rule = %self.rule, server, ?delay, "empty countdown started");
    }

    fn expire(&self, server: &str, generation: u64) {
        let since = {
            let mut tracking = self.lock();
            match tracking.countdowns.get(server) {
                Some(countdown) if countdown.generation == generation => {}
                _ => return,
            }
            let since = tracking
                .countdowns
                .remove(server)
                .map_or_else(time::now, |countdown| countdown.since);
            if self.services.servers.player_count(server) > 0 {
                tracing::debug!(rule = %self.rule, server, "server occupied again, not firing");
                return;
            }
            tracking.fired.insert(server.to_string());
            since
        };

        let ctx = firing_context("empty_server");
        ctx.set("empty_server.server", server);
        ctx.set("empty_server.server.name", server);
        ctx.set("empty_server.empty_time", format_duration(self.empty_time));
        ctx.set("empty_server.empty_since", since.to_rfc3339());
        tracing::info!(rule = %self.rule, server, empty_time = %format_duration(self.empty_time), "server empty");
        launch(&self.callback, ctx);
    }

    fn cancel_all(&self) {
        let mut tracking = self.lock();
        for (_, countdown) in tracking.countdowns.drain() {
            countdown.handle.abort();
        }
        tracking.fired.clear();
    }
}

impl<P: Platform> Trigger for EmptyServerTrigger<P> {
    fn kind(&self) -> &'static str {
        "empty_server"
    }

    fn activate(&self, rule: &str, callback: TriggerCallback) -> Result<(), ConfigError> {
        let watcher = Arc::new(Watcher {
            rule: rule.to_string(),
            callback,
            empty_time: self.empty_time,
            server_list: self.server_list.clone(),
            services: Arc::clone(&self.services),
            tracking: Mutex::new(Tracking::default()),
        });

        let mut events = self.services.bus.subscribe();
        let listener = Arc::clone(&watcher);
        let events_task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ProxyEvent::PlayerDisconnected {
                        server, remaining, ..
                    }) => listener.on_disconnect(&server, remaining),
                    Ok(ProxyEvent::PlayerConnected { server, previous, .. }) => {
                        listener.on_connect(&server, previous.as_deref());
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(rule = %listener.rule, skipped, "empty server trigger lagged behind events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let interval = self.services.empty_check_interval;
        let sweeper = Arc::clone(&watcher);
        let sweep_task = tokio::spawn(async move {
            sweeper.sweep().await;
            if interval.is_zero() {
                return;
            }
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sweeper.sweep().await;
            }
        });

        tracing::debug!(
            rule,
            empty_time = %format_duration(self.empty_time),
            check_interval = ?interval,
            "empty server trigger activated"
        );
        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Running {
                watcher,
                tasks: vec![events_task.abort_handle(), sweep_task.abort_handle()],
            });
        if let Some(previous) = previous {
            stop(previous);
        }
        Ok(())
    }

    fn deactivate(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            stop(running);
        }
    }

    fn is_active(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

fn stop<P: Platform>(running: Running<P>) {
    for task in running.tasks {
        task.abort();
    }
    running.watcher.cancel_all();
}
