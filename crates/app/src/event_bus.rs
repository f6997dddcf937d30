//! In-process host event bus.
//!
//! Notification events ([`ProxyEvent`]) travel over a tokio [`broadcast`]
//! channel. The two interception events go through a handler registry
//! instead: dispatch runs every handler and returns the event only once
//! they are all done, so handlers can change its outcome first.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinSet;

use autostart_domain::event::{ConnectionAttempt, PingRequest, ProxyEvent};
use autostart_domain::id::SubscriptionId;

use crate::ports::condition::BoxFuture;

/// Handler for intercepted connection attempts.
pub type ConnectionHandler =
    Arc<dyn Fn(Arc<ConnectionAttempt>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handler for intercepted pings.
pub type PingHandler = Arc<dyn Fn(Arc<PingRequest>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Event bus shared by the host adapter and every trigger.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped).
pub struct InProcessEventBus {
    sender: broadcast::Sender<ProxyEvent>,
    connection_handlers: Mutex<Vec<(SubscriptionId, ConnectionHandler)>>,
    ping_handlers: Mutex<Vec<(SubscriptionId, PingHandler)>>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            connection_handlers: Mutex::new(Vec::new()),
            ping_handlers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to notification events published *after* this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.sender.subscribe()
    }

    /// Broadcast a notification. Returns how many receivers got it.
    pub fn publish(&self, event: ProxyEvent) -> usize {
        // broadcast::send fails only when there are zero receivers.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe_connection(&self, handler: ConnectionHandler) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.connection_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    pub fn subscribe_ping(&self, handler: PingHandler) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.ping_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    /// Remove an interception handler. Returns `false` for unknown ids.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        self.connection_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sid, _)| {
                let keep = *sid != id;
                removed |= !keep;
                keep
            });
        self.ping_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sid, _)| {
                let keep = *sid != id;
                removed |= !keep;
                keep
            });
        removed
    }

    #[must_use]
    pub fn interception_subscribers(&self) -> usize {
        self.connection_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
            + self
                .ping_handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
    }

    /// Run every connection handler concurrently and hand the decided
    /// attempt back to the host.
    pub async fn dispatch_connection(&self, attempt: ConnectionAttempt) -> Arc<ConnectionAttempt> {
        let attempt = Arc::new(attempt);
        let handlers: Vec<ConnectionHandler> = self
            .connection_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        let mut set = JoinSet::new();
        for handler in handlers {
            set.spawn(handler(Arc::clone(&attempt)));
        }
        drain(set).await;
        attempt
    }

    /// Run every ping handler concurrently and hand the answered ping back.
    pub async fn dispatch_ping(&self, ping: PingRequest) -> Arc<PingRequest> {
        let ping = Arc::new(ping);
        let handlers: Vec<PingHandler> = self
            .ping_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        let mut set = JoinSet::new();
        for handler in handlers {
            set.spawn(handler(Arc::clone(&ping)));
        }
        drain(set).await;
        ping
    }
}

async fn drain(mut set: JoinSet<()>) {
    while let Some(result) = set.join_next().await {
        if let Err(err) = result {
            tracing::error!(%err, "interception handler failed");
        }
    }
}
