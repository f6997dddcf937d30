//! Virtual proxy — routes simulated players and pings through the engine.
//!
//! The proxy owns occupancy: which player sits on which server and since
//! when a server has been empty. Host operations ([`VirtualProxy::join`],
//! [`VirtualProxy::leave`], [`VirtualProxy::ping_proxy`]) go through the
//! event bus exactly like a real host would, so interception rules get to
//! decide before the proxy acts on the outcome.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use autostart_app::event_bus::InProcessEventBus;
use autostart_app::ports::{ProxyView, ServerControl};
use autostart_domain::event::{
    ConnectionAttempt, ConnectionOutcome, PingOutcome, PingRequest, PingResponse, Player,
    ProxyEvent,
};
use autostart_domain::time::{Timestamp, now};

use crate::server::VirtualServer;

/// Protocol version the virtual proxy advertises.
pub const PROTOCOL_VERSION: i32 = 767;

/// What became of a join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The player is now on this server.
    Joined(String),
    /// A rule denied the connection; the player stays where they were.
    Denied,
    /// The chosen server does not answer.
    Unreachable(String),
}

/// What became of a ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingReply {
    Answered(PingResponse),
    Dropped,
}

struct Registration {
    backend: Option<VirtualServer>,
    virtual_hosts: Vec<String>,
}

#[derive(Default)]
struct Occupancy {
    /// Server name per connected player name.
    locations: HashMap<String, (Arc<Player>, String)>,
    empty_since: HashMap<String, Timestamp>,
}

/// A simulated proxy in front of [`VirtualServer`]s.
pub struct VirtualProxy {
    bus: Arc<InProcessEventBus>,
    servers: HashMap<String, Registration>,
    occupancy: Mutex<Occupancy>,
    max_players: u32,
    motd: String,
}

impl VirtualProxy {
    #[must_use]
    pub fn new(bus: Arc<InProcessEventBus>) -> Self {
        Self {
            bus,
            servers: HashMap::new(),
            occupancy: Mutex::new(Occupancy::default()),
            max_players: 100,
            motd: "A virtual autostart proxy".to_string(),
        }
    }

    #[must_use]
    pub fn with_motd(mut self, motd: impl Into<String>) -> Self {
        self.motd = motd.into();
        self
    }

    #[must_use]
    pub fn with_max_players(mut self, max_players: u32) -> Self {
        self.max_players = max_players;
        self
    }

    /// Register a server. Servers without a backend are always reachable.
    ///
    /// Every server starts out empty, counted from registration.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        backend: Option<VirtualServer>,
        virtual_hosts: Vec<String>,
    ) {
        let name = name.into();
        self.lock()
            .empty_since
            .insert(name.clone(), now());
        self.servers.insert(
            name,
            Registration {
                backend,
                virtual_hosts,
            },
        );
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<InProcessEventBus> {
        &self.bus
    }

    /// Server the named player is on.
    #[must_use]
    pub fn location(&self, player: &str) -> Option<String> {
        self.lock()
            .locations
            .get(player)
            .map(|(_, server)| server.clone())
    }

    /// Route `player` to `target`, letting connection rules decide first.
    #[tracing::instrument(skip(self, player), fields(player = %player.name))]
    pub async fn join(&self, player: Player, target: &str) -> JoinOutcome {
        let previous = self.location(&player.name);
        let attempt = ConnectionAttempt::new(player, target, previous.clone());
        let attempt = self.bus.dispatch_connection(attempt).await;

        let server = match attempt.outcome() {
            ConnectionOutcome::Denied => {
                tracing::info!("connection denied");
                return JoinOutcome::Denied;
            }
            ConnectionOutcome::Allowed { server } => server,
        };
        if !self.is_reachable(&server).await {
            tracing::warn!(server, "connection target unreachable");
            return JoinOutcome::Unreachable(server);
        }

        let player = Arc::clone(attempt.player());
        {
            let mut occupancy = self.lock();
            occupancy
                .locations
                .insert(player.name.clone(), (Arc::clone(&player), server.clone()));
            occupancy.empty_since.remove(&server);
            if let Some(previous) = previous.as_deref() {
                mark_if_empty(&mut occupancy, previous);
            }
        }
        tracing::info!(server, "player connected");
        self.bus.publish(ProxyEvent::PlayerConnected {
            player,
            server: server.clone(),
            previous,
        });
        JoinOutcome::Joined(server)
    }

    /// Disconnect `player` from the proxy. Returns the server they left.
    #[tracing::instrument(skip(self))]
    pub fn leave(&self, player: &str) -> Option<String> {
        let (handle, server, remaining) = {
            let mut occupancy = self.lock();
            let (handle, server) = occupancy.locations.remove(player)?;
            mark_if_empty(&mut occupancy, &server);
            let remaining = occupants(&occupancy, &server);
            (handle, server, remaining)
        };
        tracing::info!(server, remaining, "player disconnected");
        self.bus.publish(ProxyEvent::PlayerDisconnected {
            player: handle,
            server: server.clone(),
            remaining,
        });
        Some(server)
    }

    /// Ping the proxy through `virtual_host`, letting ping rules rewrite or
    /// drop the response.
    #[tracing::instrument(skip(self))]
    pub async fn ping_proxy(
        &self,
        remote_address: Option<String>,
        virtual_host: Option<String>,
    ) -> PingReply {
        let response = PingResponse {
            version_name: "autostart-virtual".to_string(),
            protocol_version: PROTOCOL_VERSION,
            online_players: u32::try_from(self.lock().locations.len()).unwrap_or(u32::MAX),
            max_players: self.max_players,
            motd: self.motd.clone(),
        };
        let request = PingRequest::new(remote_address, virtual_host, PROTOCOL_VERSION, response);
        let request = self.bus.dispatch_ping(request).await;
        match request.outcome() {
            PingOutcome::Allowed => PingReply::Answered(request.response()),
            PingOutcome::Denied => PingReply::Dropped,
        }
    }

    async fn is_reachable(&self, server: &str) -> bool {
        match self.servers.get(server) {
            Some(Registration {
                backend: Some(backend),
                ..
            }) => backend.ping().await,
            Some(Registration { backend: None, .. }) => true,
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Occupancy> {
        self.occupancy.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn occupants(occupancy: &Occupancy, server: &str) -> usize {
    occupancy.locations.values().filter(|(_, s)| s == server).count()
}

fn mark_if_empty(occupancy: &mut Occupancy, server: &str) {
    if occupants(occupancy, server) == 0 {
        occupancy.empty_since.insert(server.to_string(), now());
    }
}

impl ProxyView for VirtualProxy {
    fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }

    fn player_count(&self, server: &str) -> usize {
        self.lock()
            .locations
            .values()
            .filter(|(_, s)| s == server)
            .count()
    }

    fn players(&self, server: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .locations
            .iter()
            .filter(|(_, (_, s))| s == server)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn ping(&self, server: &str) -> impl Future<Output = bool> + Send {
        self.is_reachable(server)
    }

    fn empty_since(&self, server: &str) -> Option<Timestamp> {
        self.lock().empty_since.get(server).copied()
    }

    fn virtual_hosts(&self, server: &str) -> Vec<String> {
        self.servers
            .get(server)
            .map(|r| r.virtual_hosts.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use autostart_app::ports::condition::BoxFuture;
    use uuid::Uuid;

    use super::*;
    use crate::server::SimulationSettings;

    fn alex() -> Player {
        Player::new("alex", Uuid::new_v4())
    }

    fn proxy(survival: VirtualServer) -> VirtualProxy {
        let mut proxy = VirtualProxy::new(Arc::new(InProcessEventBus::new(16)));
        proxy.register("lobby", None, vec!["lobby.example.com".to_string()]);
        proxy.register("survival", Some(survival), vec!["play.example.com".to_string()]);
        proxy
    }

    #[tokio::test]
    async fn should_join_reachable_server_and_track_occupancy() {
        let proxy = proxy(VirtualServer::online("survival", SimulationSettings::default()));
        assert!(proxy.empty_since("survival").is_some());

        let outcome = proxy.join(alex(), "survival").await;
        assert_eq!(outcome, JoinOutcome::Joined("survival".to_string()));
        assert_eq!(proxy.player_count("survival"), 1);
        assert_eq!(proxy.players("survival"), vec!["alex".to_string()]);
        assert!(proxy.empty_since("survival").is_none());
    }

    #[tokio::test]
    async fn should_refuse_join_when_backend_offline() {
        let proxy = proxy(VirtualServer::new("survival", SimulationSettings::default()));
        let outcome = proxy.join(alex(), "survival").await;
        assert_eq!(outcome, JoinOutcome::Unreachable("survival".to_string()));
        assert_eq!(proxy.player_count("survival"), 0);
    }

    #[tokio::test]
    async fn should_mark_previous_server_empty_when_player_moves() {
        let proxy = proxy(VirtualServer::online("survival", SimulationSettings::default()));
        proxy.join(alex(), "lobby").await;
        assert!(proxy.empty_since("lobby").is_none());

        proxy.join(alex(), "survival").await;
        assert!(proxy.empty_since("lobby").is_some());
        assert_eq!(proxy.location("alex").as_deref(), Some("survival"));
    }

    #[tokio::test]
    async fn should_publish_disconnect_with_remaining_players() {
        let proxy = proxy(VirtualServer::online("survival", SimulationSettings::default()));
        proxy.join(alex(), "lobby").await;
        proxy.join(Player::new("sam", Uuid::new_v4()), "lobby").await;
        let mut events = proxy.bus().subscribe();

        assert_eq!(proxy.leave("alex").as_deref(), Some("lobby"));
        match events.recv().await.unwrap() {
            ProxyEvent::PlayerDisconnected {
                player,
                server,
                remaining,
            } => {
                assert_eq!(player.name, "alex");
                assert_eq!(server, "lobby");
                assert_eq!(remaining, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(proxy.empty_since("lobby").is_none());

        proxy.leave("sam");
        assert!(matches!(
            events.recv().await.unwrap(),
            ProxyEvent::PlayerDisconnected { remaining: 0, .. }
        ));
        assert_eq!(proxy.player_count("lobby"), 0);
        assert!(proxy.empty_since("lobby").is_some());
        assert!(proxy.leave("alex").is_none());
    }

    #[tokio::test]
    async fn should_follow_connection_rule_decision() {
        let proxy = proxy(VirtualServer::online("survival", SimulationSettings::default()));
        proxy.bus().subscribe_connection(Arc::new(
            |attempt: Arc<ConnectionAttempt>| -> BoxFuture<'static, ()> {
                Box::pin(async move { attempt.allow("lobby") })
            },
        ));
        let outcome = proxy.join(alex(), "survival").await;
        assert_eq!(outcome, JoinOutcome::Joined("lobby".to_string()));
    }

    #[tokio::test]
    async fn should_drop_ping_denied_by_rule() {
        let proxy = proxy(VirtualServer::online("survival", SimulationSettings::default()));
        let answered = proxy.ping_proxy(None, Some("play.example.com".to_string())).await;
        assert!(matches!(answered, PingReply::Answered(r) if r.protocol_version == PROTOCOL_VERSION));

        proxy.bus().subscribe_ping(Arc::new(
            |ping: Arc<PingRequest>| -> BoxFuture<'static, ()> { Box::pin(async move { ping.deny() }) },
        ));
        let dropped = proxy.ping_proxy(None, None).await;
        assert_eq!(dropped, PingReply::Dropped);
    }

    #[tokio::test(start_paused = true)]
    async fn should_answer_proxy_ping_once_backend_booted() {
        let survival = VirtualServer::new(
            "survival",
            SimulationSettings {
                startup_time: Duration::from_secs(2),
                ..SimulationSettings::default()
            },
        );
        let proxy = proxy(survival.clone());
        assert!(!ProxyView::ping(&proxy, "survival").await);
        assert!(ProxyView::ping(&proxy, "lobby").await);
        assert!(!ProxyView::ping(&proxy, "nowhere").await);

        survival.start().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(ProxyView::ping(&proxy, "survival").await);
        assert_eq!(proxy.virtual_hosts("survival"), vec!["play.example.com".to_string()]);
    }
}
