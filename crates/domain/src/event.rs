//! Host events — what the proxy reports to the automation engine.
//!
//! Notification events ([`ProxyEvent`]) are broadcast and never answered.
//! Interception events ([`ConnectionAttempt`], [`PingRequest`]) carry an
//! interior-mutable outcome that rules may change before the host reads
//! it back.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::{Value, VariableSource};

/// A connected (or connecting) player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub uuid: Uuid,
}

impl Player {
    #[must_use]
    pub fn new(name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            uuid,
        }
    }
}

impl VariableSource for Player {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "name" | "username" => Some(Value::from(self.name.as_str())),
            "uuid" => Some(Value::from(self.uuid.to_string())),
            _ => None,
        }
    }

    fn render(&self) -> String {
        self.name.clone()
    }
}

/// Decision for a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Connect the player to the named server.
    Allowed { server: String },
    /// Keep the player where they are.
    Denied,
}

/// A player trying to join a backend server through the proxy.
#[derive(Debug)]
pub struct ConnectionAttempt {
    player: Arc<Player>,
    target: String,
    previous: Option<String>,
    outcome: Mutex<ConnectionOutcome>,
}

impl ConnectionAttempt {
    /// New attempt, allowed to its original target until a rule decides otherwise.
    #[must_use]
    pub fn new(player: Player, target: impl Into<String>, previous: Option<String>) -> Self {
        let target = target.into();
        Self {
            player: Arc::new(player),
            outcome: Mutex::new(ConnectionOutcome::Allowed {
                server: target.clone(),
            }),
            target,
            previous,
        }
    }

    #[must_use]
    pub fn player(&self) -> &Arc<Player> {
        &self.player
    }

    /// The server the player originally asked for.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn previous_server(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    #[must_use]
    pub fn outcome(&self) -> ConnectionOutcome {
        self.lock_outcome().clone()
    }

    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(*self.lock_outcome(), ConnectionOutcome::Denied)
    }

    pub fn allow(&self, server: impl Into<String>) {
        *self.lock_outcome() = ConnectionOutcome::Allowed {
            server: server.into(),
        };
    }

    pub fn deny(&self) {
        *self.lock_outcome() = ConnectionOutcome::Denied;
    }

    fn lock_outcome(&self) -> MutexGuard<'_, ConnectionOutcome> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VariableSource for ConnectionAttempt {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "player" => Some(Value::Object(self.player.clone())),
            "server" => Some(Value::from(self.target.as_str())),
            "previous_server" => Some(Value::from(self.previous.clone())),
            "denied" => Some(Value::from(self.is_denied())),
            _ => None,
        }
    }

    fn render(&self) -> String {
        format!("{} -> {}", self.player.name, self.target)
    }
}

/// The status response a ping will receive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub version_name: String,
    pub protocol_version: i32,
    pub online_players: u32,
    pub max_players: u32,
    pub motd: String,
}

/// Decision for a ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// Send the (possibly rewritten) response.
    Allowed,
    /// Drop the ping without answering.
    Denied,
}

/// A client pinging the proxy's server list entry.
#[derive(Debug)]
pub struct PingRequest {
    remote_address: Option<String>,
    virtual_host: Option<String>,
    protocol_version: i32,
    response: Mutex<PingResponse>,
    outcome: Mutex<PingOutcome>,
}

impl PingRequest {
    #[must_use]
    pub fn new(
        remote_address: Option<String>,
        virtual_host: Option<String>,
        protocol_version: i32,
        response: PingResponse,
    ) -> Self {
        Self {
            remote_address,
            virtual_host,
            protocol_version,
            response: Mutex::new(response),
            outcome: Mutex::new(PingOutcome::Allowed),
        }
    }

    #[must_use]
    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    /// Host name the client used to reach the proxy.
    #[must_use]
    pub fn virtual_host(&self) -> Option<&str> {
        self.virtual_host.as_deref()
    }

    #[must_use]
    pub fn protocol_version(&self) -> i32 {
        self.protocol_version
    }

    #[must_use]
    pub fn response(&self) -> PingResponse {
        self.response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rewrite the response in place.
    pub fn update_response(&self, update: impl FnOnce(&mut PingResponse)) {
        update(&mut self.response.lock().unwrap_or_else(PoisonError::into_inner));
    }

    #[must_use]
    pub fn outcome(&self) -> PingOutcome {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn allow(&self) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = PingOutcome::Allowed;
    }

    pub fn deny(&self) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = PingOutcome::Denied;
    }
}

impl VariableSource for PingRequest {
    fn field(&self, name: &str) -> Option<Value> {
        let response = self.response();
        match name {
            "remote_address" => Some(Value::from(self.remote_address.clone())),
            "virtual_host" => Some(Value::from(self.virtual_host.clone())),
            "protocol_version" => Some(Value::from(self.protocol_version)),
            "version_name" => Some(Value::from(response.version_name)),
            "motd" => Some(Value::from(response.motd)),
            "player_count" => Some(Value::from(response.online_players)),
            "max_players" => Some(Value::from(response.max_players)),
            "denied" => Some(Value::from(self.outcome() == PingOutcome::Denied)),
            _ => None,
        }
    }

    fn render(&self) -> String {
        format!(
            "ping from {}",
            self.remote_address.as_deref().unwrap_or("unknown")
        )
    }
}

/// Notifications the host broadcasts to interested triggers.
#[derive(Debug, Clone)]
pub enum ProxyEvent {
    /// A player finished connecting to `server`, coming from `previous`
    /// if they switched. Occupancy counts already include the move.
    PlayerConnected {
        player: Arc<Player>,
        server: String,
        previous: Option<String>,
    },
    /// A player left the proxy from `server`; `remaining` players are
    /// still connected to it.
    PlayerDisconnected {
        player: Arc<Player>,
        server: String,
        remaining: usize,
    },
    /// The proxy finished starting (`reload` when configuration was reloaded).
    ProxyStarted { reload: bool },
    /// The proxy is shutting down.
    ProxyShutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alex() -> Player {
        Player::new("alex", Uuid::new_v4())
    }

    #[test]
    fn should_allow_connection_to_original_target_by_default() {
        let attempt = ConnectionAttempt::new(alex(), "survival", None);
        assert_eq!(
            attempt.outcome(),
            ConnectionOutcome::Allowed {
                server: "survival".to_string()
            }
        );
        assert!(!attempt.is_denied());
    }

    #[test]
    fn should_reflect_deny_then_allow_to_other_server() {
        let attempt = ConnectionAttempt::new(alex(), "survival", Some("lobby".to_string()));
        attempt.deny();
        assert!(attempt.is_denied());
        attempt.allow("limbo");
        assert_eq!(
            attempt.outcome(),
            ConnectionOutcome::Allowed {
                server: "limbo".to_string()
            }
        );
    }

    #[test]
    fn should_recover_connection_attempt_stored_as_value() {
        let attempt = Arc::new(ConnectionAttempt::new(alex(), "survival", None));
        let value = Value::object(Arc::clone(&attempt));

        let recovered = value.downcast::<ConnectionAttempt>().unwrap();
        recovered.deny();

        assert!(Arc::ptr_eq(&attempt, &recovered));
        assert!(attempt.is_denied());
        assert!(value.downcast::<Player>().is_none());
    }

    #[test]
    fn should_expose_player_fields_through_connection_attempt() {
        let attempt = ConnectionAttempt::new(alex(), "survival", None);
        let player = attempt.field("player").unwrap();
        assert_eq!(player.field("name"), Some(Value::from("alex")));
        assert_eq!(attempt.field("server"), Some(Value::from("survival")));
    }

    #[test]
    fn should_rewrite_ping_response_in_place() {
        let ping = PingRequest::new(
            Some("10.0.0.1".to_string()),
            Some("play.example.com".to_string()),
            767,
            PingResponse::default(),
        );
        ping.update_response(|r| r.motd = "Starting...".to_string());
        assert_eq!(ping.response().motd, "Starting...");
        assert_eq!(ping.field("motd"), Some(Value::from("Starting...")));
        ping.deny();
        assert_eq!(ping.outcome(), PingOutcome::Denied);
    }
}
