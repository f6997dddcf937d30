//! Startup context — state and derived progress of one startup attempt.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use crate::duration::format_duration;
use crate::server::ServerState;
use crate::time::{Timestamp, elapsed_between, now};

/// Expected startup duration when neither history nor configuration
/// provides one.
pub const DEFAULT_EXPECTED_STARTUP: Duration = Duration::from_secs(30);

/// One in-flight startup attempt for a managed server.
///
/// Shared between the background monitor (the single writer that
/// completes it) and any number of readers rendering progress, so the
/// mutable parts are an atomic state and a set-once completion stamp.
#[derive(Debug)]
pub struct StartupContext {
    server: String,
    started_at: Timestamp,
    expected: Duration,
    state: AtomicU8,
    completed_at: OnceLock<Timestamp>,
}

impl StartupContext {
    /// Begin a startup now.
    #[must_use]
    pub fn new(server: impl Into<String>, expected: Duration) -> Self {
        Self::started_at(server, expected, now())
    }

    /// Begin a startup at an explicit instant.
    #[must_use]
    pub fn started_at(server: impl Into<String>, expected: Duration, started_at: Timestamp) -> Self {
        Self {
            server: server.into(),
            started_at,
            expected,
            state: AtomicU8::new(ServerState::Starting as u8),
            completed_at: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    #[must_use]
    pub fn start_time(&self) -> Timestamp {
        self.started_at
    }

    #[must_use]
    pub fn expected(&self) -> Duration {
        self.expected
    }

    #[must_use]
    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.get().is_some()
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<Timestamp> {
        self.completed_at.get().copied()
    }

    /// Stamp completion with the given final state.
    ///
    /// Only the first call has an effect; returns whether this call was it.
    pub fn mark_completed(&self, state: ServerState) -> bool {
        self.mark_completed_at(state, now())
    }

    /// [`mark_completed`](Self::mark_completed) at an explicit instant.
    pub fn mark_completed_at(&self, state: ServerState, at: Timestamp) -> bool {
        if self.completed_at.set(at).is_ok() {
            self.set_state(state);
            true
        } else {
            false
        }
    }

    /// Time since the start, frozen at completion once completed.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(now())
    }

    #[must_use]
    pub fn elapsed_at(&self, at: Timestamp) -> Duration {
        let end = self.completed_at().unwrap_or(at);
        elapsed_between(self.started_at, end)
    }

    /// Elapsed time formatted for templates (`1m 12s`).
    #[must_use]
    pub fn formatted_elapsed(&self) -> String {
        format_duration(self.elapsed())
    }

    /// Actual duration of a completed startup.
    #[must_use]
    pub fn actual_duration(&self) -> Option<Duration> {
        self.completed_at()
            .map(|end| elapsed_between(self.started_at, end))
    }

    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        self.progress_percentage_at(now())
    }

    /// Progress on the 0..=100 scale.
    ///
    /// Failed or offline is 0, online or completed is 100, anything else
    /// is the elapsed/expected ratio capped at 99.
    #[must_use]
    pub fn progress_percentage_at(&self, at: Timestamp) -> u8 {
        let ratio = self.progress_at(at);
        if ratio >= 1.0 {
            return 100;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percentage = (ratio * 100.0).floor() as u8;
        percentage.min(99)
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        self.progress_at(now())
    }

    /// Progress on the 0.0..=1.0 scale, with the same clamping rules as
    /// [`progress_percentage_at`](Self::progress_percentage_at).
    #[must_use]
    pub fn progress_at(&self, at: Timestamp) -> f64 {
        match self.state() {
            ServerState::Offline | ServerState::Failed => return 0.0,
            ServerState::Online => return 1.0,
            _ if self.is_completed() => return 1.0,
            _ => {}
        }
        let expected = self.expected.as_secs_f64();
        if expected <= 0.0 {
            return 0.0;
        }
        let ratio = self.elapsed_at(at).as_secs_f64() / expected;
        ratio.clamp(0.0, 0.99)
    }
}
