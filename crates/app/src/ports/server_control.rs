//! Backend control port — start, stop and query one managed server.

use std::future::Future;

use autostart_domain::server::ServerState;

/// Drives one backend process (shell commands, panel API, simulation).
///
/// Every operation may be slow or fail; failures are reported as `false`
/// or [`ServerState::Unknown`] rather than errors.
pub trait ServerControl: Send + Sync {
    fn start(&self) -> impl Future<Output = bool> + Send;

    fn stop(&self) -> impl Future<Output = bool> + Send;

    fn restart(&self) -> impl Future<Output = bool> + Send;

    fn send_command(&self, command: &str) -> impl Future<Output = bool> + Send;

    /// Reachability as seen by the control backend.
    fn ping(&self) -> impl Future<Output = bool> + Send;

    fn state(&self) -> impl Future<Output = ServerState> + Send;

    fn supports_ping(&self) -> bool {
        false
    }

    fn supports_state(&self) -> bool {
        false
    }

    fn supports_command_sending(&self) -> bool {
        false
    }
}

impl<T: ServerControl> ServerControl for std::sync::Arc<T> {
    fn start(&self) -> impl Future<Output = bool> + Send {
        (**self).start()
    }

    fn stop(&self) -> impl Future<Output = bool> + Send {
        (**self).stop()
    }

    fn restart(&self) -> impl Future<Output = bool> + Send {
        (**self).restart()
    }

    fn send_command(&self, command: &str) -> impl Future<Output = bool> + Send {
        (**self).send_command(command)
    }

    fn ping(&self) -> impl Future<Output = bool> + Send {
        (**self).ping()
    }

    fn state(&self) -> impl Future<Output = ServerState> + Send {
        (**self).state()
    }

    fn supports_ping(&self) -> bool {
        (**self).supports_ping()
    }

    fn supports_state(&self) -> bool {
        (**self).supports_state()
    }

    fn supports_command_sending(&self) -> bool {
        (**self).supports_command_sending()
    }
}
