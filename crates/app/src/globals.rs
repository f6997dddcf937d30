//! Per-server variables available to every template (`lobby.status`, ...).

use std::sync::Arc;

use autostart_domain::value::Value;

use crate::ports::Platform;
use crate::servers::ServerManager;
use crate::startup::StartupTracker;
use crate::variables::GlobalVariables;

/// Answers `<server>.<property>` for every managed server.
///
/// Lookups never block: states come from the startup tracker, then from
/// the last observed ping.
pub struct ServerVariables<P: Platform> {
    servers: Arc<ServerManager<P>>,
    tracker: Arc<StartupTracker<P>>,
}

impl<P: Platform> ServerVariables<P> {
    #[must_use]
    pub fn new(servers: Arc<ServerManager<P>>, tracker: Arc<StartupTracker<P>>) -> Self {
        Self { servers, tracker }
    }

    fn split<'a>(&self, path: &'a str) -> Option<(&'a str, &'a str)> {
        // Server names may contain dots, so try the longest prefix first.
        path.rmatch_indices('.')
            .map(|(at, _)| (&path[..at], &path[at + 1..]))
            .find(|(server, _)| self.servers.has_server(server))
    }

    fn property(&self, server: &str, property: &str) -> Option<Value> {
        let value = match property {
            "name" => Value::from(server),
            "status" | "state" => Value::from(self.tracker.cached_state(server).as_str()),
            "startup_timer" => Value::from(self.tracker.startup_timer(server)),
            "startup_progress" => Value::from(self.tracker.progress(server)),
            "startup_progress_percentage" => {
                Value::from(u32::from(self.tracker.progress_percentage(server)))
            }
            "player_count" => Value::from(self.servers.player_count(server)),
            "players" => Value::List(
                self.servers
                    .players(server)
                    .into_iter()
                    .map(Value::from)
                    .collect(),
            ),
            _ => return None,
        };
        Some(value)
    }
}

impl<P: Platform> GlobalVariables for ServerVariables<P> {
    fn resolve(&self, path: &str) -> Option<Value> {
        let (server, property) = self.split(path)?;
        self.property(server, property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::startup::StartupHistoryTracker;
    use crate::testing::{FakeControl, FakeHistory, FakeProxy, TestPlatform};
    use crate::variables::VariableResolver;
    use crate::servers::ServerSettings;

    async fn resolver() -> (VariableResolver, Arc<StartupTracker<TestPlatform>>, Arc<ServerManager<TestPlatform>>) {
        let mut servers = ServerManager::new(Arc::new(FakeProxy::default()));
        servers.register("lobby", Arc::new(FakeControl::default()), ServerSettings::default());
        servers.register("mini.games", Arc::new(FakeControl::default()), ServerSettings::default());
        let servers = Arc::new(servers);
        let history = Arc::new(StartupHistoryTracker::load(Arc::new(FakeHistory::default())).await);
        let tracker = Arc::new(StartupTracker::new(Arc::clone(&servers), history));
        let globals = ServerVariables::new(Arc::clone(&servers), Arc::clone(&tracker));
        (VariableResolver::with_globals(Arc::new(globals)), tracker, servers)
    }

    #[tokio::test]
    async fn should_resolve_player_variables() {
        let (resolver, _, servers) = resolver().await;
        servers.proxy().set_players("lobby", &["alex", "sam"]);
        let ctx = ExecutionContext::new();
        assert_eq!(resolver.resolve("${lobby.player_count}", &ctx), "2");
        assert_eq!(resolver.resolve("${lobby.players}", &ctx), "alex, sam");
        assert_eq!(resolver.resolve("${lobby.name}", &ctx), "lobby");
    }

    #[tokio::test]
    async fn should_resolve_server_names_containing_dots() {
        let (resolver, _, _) = resolver().await;
        let ctx = ExecutionContext::new();
        assert_eq!(resolver.resolve("${mini.games.name}", &ctx), "mini.games");
        assert_eq!(resolver.resolve("${mini.games.unknown}", &ctx), "");
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_starting_during_tracked_startup() {
        let (resolver, tracker, _) = resolver().await;
        let ctx = ExecutionContext::new();
        assert_eq!(resolver.resolve("${lobby.status}", &ctx), "unknown");
        tracker.begin_startup("lobby");
        assert_eq!(resolver.resolve("${lobby.status}", &ctx), "starting");
        assert_eq!(resolver.resolve("${lobby.startup_progress_percentage}", &ctx), "0");
        tracker.shutdown();
    }
}
