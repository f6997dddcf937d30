//! `while` — a bounded loop over a nested action list.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use autostart_domain::rule::WhileConfig;

use super::{Action, ActionRegistry, rule_name, settle};
use crate::context::ExecutionContext;
use crate::ports::Platform;
use crate::ports::condition::BoxFuture;

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    ConditionFailed,
    TimedOut,
}

/// Repeats its body while the condition holds.
///
/// Iterations start at least `update_interval` apart. With a timeout, the
/// remaining budget bounds the spacing sleep and every awaited nested
/// action, so the loop never outlives its timeout by more than the check
/// that notices it. A nested action that is still running when the budget
/// runs out keeps running on its own.
pub struct WhileAction<P: Platform> {
    config: WhileConfig,
    registry: ActionRegistry<P>,
}

impl<P: Platform> WhileAction<P> {
    #[must_use]
    pub fn new(config: WhileConfig, registry: ActionRegistry<P>) -> Self {
        Self { config, registry }
    }

    async fn run(&self, ctx: &ExecutionContext) {
        let services = self.registry.services();
        let timeout = self
            .config
            .timeout
            .as_ref()
            .and_then(|raw| services.resolver.resolve_opt_duration(raw, ctx))
            .filter(|timeout| !timeout.is_zero());
        let interval = services.resolver.resolve_duration(
            &self.config.update_interval,
            ctx,
            DEFAULT_UPDATE_INTERVAL,
        );
        let started = Instant::now();
        let deadline = timeout.map(|timeout| started + timeout);
        let remaining = || deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
        let expired = || remaining().is_some_and(|left| left.is_zero());

        tracing::debug!(rule = %rule_name(ctx), ?timeout, ?interval, "while loop started");
        let mut iterations: u64 = 0;
        let exit = 'outer: loop {
            let iteration_started = Instant::now();
            if expired() {
                break LoopExit::TimedOut;
            }
            if !services.conditions.evaluate(&self.config.condition, ctx).await {
                break LoopExit::ConditionFailed;
            }
            iterations += 1;

            for config in &self.config.body {
                if expired() {
                    break 'outer LoopExit::TimedOut;
                }
                let Some(handle) = self.registry.spawn(config, ctx) else {
                    continue;
                };
                if !config.wait_for_completion {
                    continue;
                }
                match remaining() {
                    None => settle(config.kind(), handle, ctx).await,
                    Some(budget) => {
                        let awaited = settle(config.kind(), handle, ctx);
                        if tokio::time::timeout(budget, awaited).await.is_err() {
                            tracing::debug!(
                                rule = %rule_name(ctx),
                                action = config.kind(),
                                iterations,
                                "while timeout reached during nested action"
                            );
                            break 'outer LoopExit::TimedOut;
                        }
                    }
                }
            }

            let spacing = interval.saturating_sub(iteration_started.elapsed());
            if spacing.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            let wait = match remaining() {
                Some(left) if left.is_zero() => break LoopExit::TimedOut,
                Some(left) => spacing.min(left),
                None => spacing,
            };
            tokio::time::sleep(wait).await;
        };

        tracing::debug!(
            rule = %rule_name(ctx),
            iterations,
            elapsed = ?started.elapsed(),
            timed_out = exit == LoopExit::TimedOut,
            "while loop finished"
        );
    }
}

impl<P: Platform> Action for WhileAction<P> {
    fn kind(&self) -> &'static str {
        "while"
    }

    fn execute(self: Arc<Self>, ctx: ExecutionContext) -> BoxFuture<'static, ()> {
        Box::pin(async move { self.run(&ctx).await })
    }
}
