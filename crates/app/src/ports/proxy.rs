//! Proxy view port — what the proxy knows about servers and players.

use std::future::Future;

use autostart_domain::time::Timestamp;

/// Read-only access to the proxy's registered servers.
pub trait ProxyView: Send + Sync {
    /// Every server registered with the proxy.
    fn server_names(&self) -> Vec<String>;

    fn player_count(&self, server: &str) -> usize;

    /// Names of the players currently on `server`.
    fn players(&self, server: &str) -> Vec<String>;

    /// Proxy-level reachability check.
    fn ping(&self, server: &str) -> impl Future<Output = bool> + Send;

    /// When the last player left `server`, if it is empty and the proxy knows.
    fn empty_since(&self, server: &str) -> Option<Timestamp>;

    /// Host names that route to `server`.
    fn virtual_hosts(&self, server: &str) -> Vec<String>;
}

impl<T: ProxyView> ProxyView for std::sync::Arc<T> {
    fn server_names(&self) -> Vec<String> {
        (**self).server_names()
    }

    fn player_count(&self, server: &str) -> usize {
        (**self).player_count(server)
    }

    fn players(&self, server: &str) -> Vec<String> {
        (**self).players(server)
    }

    fn ping(&self, server: &str) -> impl Future<Output = bool> + Send {
        (**self).ping(server)
    }

    fn empty_since(&self, server: &str) -> Option<Timestamp> {
        (**self).empty_since(server)
    }

    fn virtual_hosts(&self, server: &str) -> Vec<String> {
        (**self).virtual_hosts(server)
    }
}
