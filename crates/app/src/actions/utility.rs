//! `sleep` and `log`.

use std::str::FromStr;
use std::sync::Arc;

use autostart_domain::rule::Template;

use super::{Action, ActionServices, rule_name};
use crate::context::ExecutionContext;
use crate::ports::Platform;
use crate::ports::condition::BoxFuture;

pub struct SleepAction<P: Platform> {
    duration: Template,
    services: Arc<ActionServices<P>>,
}

impl<P: Platform> SleepAction<P> {
    #[must_use]
    pub fn new(duration: Template, services: Arc<ActionServices<P>>) -> Self {
        Self { duration, services }
    }
}

impl<P: Platform> Action for SleepAction<P> {
    fn kind(&self) -> &'static str {
        "sleep"
    }

    fn execute(self: Arc<Self>, ctx: ExecutionContext) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let Some(duration) = self.services.resolver.resolve_opt_duration(&self.duration, &ctx)
            else {
                tracing::warn!(rule = %rule_name(&ctx), duration = %self.duration, "invalid sleep duration");
                return;
            };
            tracing::debug!(?duration, "sleeping");
            tokio::time::sleep(duration).await;
        })
    }
}

/// Level of a `log` action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(()),
        }
    }
}

/// Writes an interpolated message to the log, prefixed with the rule name.
pub struct LogAction<P: Platform> {
    message: Template,
    level: Template,
    services: Arc<ActionServices<P>>,
}

impl<P: Platform> LogAction<P> {
    #[must_use]
    pub fn new(message: Template, level: Template, services: Arc<ActionServices<P>>) -> Self {
        Self {
            message,
            level,
            services,
        }
    }
}

impl<P: Platform> Action for LogAction<P> {
    fn kind(&self) -> &'static str {
        "log"
    }

    fn execute(self: Arc<Self>, ctx: ExecutionContext) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let resolver = &self.services.resolver;
            let message = resolver.resolve(&self.message, &ctx);
            let level = resolver.resolve_enum(&self.level, &ctx, LogLevel::Info);
            let rule = rule_name(&ctx);
            match level {
                LogLevel::Trace => tracing::trace!("({rule}) {message}"),
                LogLevel::Debug => tracing::debug!("({rule}) {message}"),
                LogLevel::Info => tracing::info!("({rule}) {message}"),
                LogLevel::Warn => tracing::warn!("({rule}) {message}"),
                LogLevel::Error => tracing::error!("({rule}) {message}"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use autostart_domain::rule::{ActionConfig, ActionKind};
    use tokio::time::Instant;

    use super::*;
    use crate::actions::test_support::registry;
    use crate::testing::FakeControl;

    #[tokio::test(start_paused = true)]
    async fn should_sleep_for_resolved_duration() {
        let registry = registry(FakeControl::default()).await;
        let ctx = ExecutionContext::new();
        ctx.set("delay", "2s");
        let started = Instant::now();
        registry
            .run_all(
                &[ActionConfig::new(ActionKind::Sleep {
                    duration: "${delay}".into(),
                })],
                &ctx,
            )
            .await;
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn should_skip_invalid_sleep_duration() {
        let registry = registry(FakeControl::default()).await;
        let started = Instant::now();
        registry
            .run_all(
                &[ActionConfig::new(ActionKind::Sleep {
                    duration: "soon".into(),
                })],
                &ExecutionContext::new(),
            )
            .await;
        assert!(started.elapsed() < Duration::from_millis(1));
    }

    #[test]
    fn should_parse_log_levels() {
        assert_eq!("warning".parse(), Ok(LogLevel::Warn));
        assert_eq!("trace".parse(), Ok(LogLevel::Trace));
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
