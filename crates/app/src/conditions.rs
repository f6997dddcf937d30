//! Built-in [`ConditionEvaluator`].

use std::sync::Arc;

use autostart_domain::rule::{Check, Condition, ConditionConfig, ConditionMode, Template};
use autostart_domain::server::ServerState;

use crate::context::ExecutionContext;
use crate::ports::Platform;
use crate::ports::condition::{BoxFuture, ConditionEvaluator};
use crate::servers::ServerManager;
use crate::variables::VariableResolver;

/// Evaluates checks against context variables and live server state.
pub struct StandardConditionEvaluator<P: Platform> {
    servers: Arc<ServerManager<P>>,
    resolver: VariableResolver,
}

impl<P: Platform> StandardConditionEvaluator<P> {
    #[must_use]
    pub fn new(servers: Arc<ServerManager<P>>, resolver: VariableResolver) -> Self {
        Self { servers, resolver }
    }

    async fn evaluate_all(&self, condition: &ConditionConfig, ctx: &ExecutionContext) -> bool {
        if condition.is_empty() {
            return true;
        }
        let all = condition.mode == ConditionMode::All;
        for check in &condition.checks {
            let passed = self.evaluate_check(check, ctx).await;
            tracing::debug!(check = %check.condition, invert = check.invert, passed, "evaluated check");
            if all && !passed {
                return false;
            }
            if !all && passed {
                return true;
            }
        }
        all
    }

    async fn evaluate_check(&self, check: &Check, ctx: &ExecutionContext) -> bool {
        let result = match &check.condition {
            Condition::NumberCompare {
                value,
                min,
                max,
                equals,
            } => {
                let Some(number) = self.resolver.resolve_opt_f64(value, ctx) else {
                    tracing::warn!(value = %value, "number_compare value is not a number");
                    return check.invert;
                };
                self.in_bounds(number, min.as_ref(), max.as_ref(), equals.as_ref(), ctx)
            }
            Condition::StringEquals {
                value,
                equals,
                ignore_case,
            } => {
                let left = self.resolver.resolve(value, ctx);
                let right = self.resolver.resolve(equals, ctx);
                if *ignore_case {
                    left.eq_ignore_ascii_case(&right)
                } else {
                    left == right
                }
            }
            Condition::PlayerCount {
                server,
                min,
                max,
                equals,
            } => {
                let server = self.resolver.resolve(server, ctx);
                #[allow(clippy::cast_precision_loss)]
                let count = self.servers.player_count(&server) as f64;
                self.in_bounds(count, min.as_ref(), max.as_ref(), equals.as_ref(), ctx)
            }
            Condition::ServerStatus { server, status } => {
                let server = self.resolver.resolve(server, ctx);
                let expected = self.resolver.resolve(status, ctx);
                self.has_status(&server, expected.trim()).await
            }
        };
        result != check.invert
    }

    /// `equals` wins over the range; unparsable bounds are ignored.
    fn in_bounds(
        &self,
        number: f64,
        min: Option<&Template>,
        max: Option<&Template>,
        equals: Option<&Template>,
        ctx: &ExecutionContext,
    ) -> bool {
        if let Some(equals) = equals.and_then(|t| self.resolver.resolve_opt_f64(t, ctx)) {
            return (number - equals).abs() < f64::EPSILON;
        }
        if min
            .and_then(|t| self.resolver.resolve_opt_f64(t, ctx))
            .is_some_and(|min| number < min)
        {
            return false;
        }
        if max
            .and_then(|t| self.resolver.resolve_opt_f64(t, ctx))
            .is_some_and(|max| number > max)
        {
            return false;
        }
        true
    }

    async fn has_status(&self, server: &str, expected: &str) -> bool {
        if expected.eq_ignore_ascii_case("online") || expected.eq_ignore_ascii_case("offline") {
            let online = self.servers.is_online(server).await;
            return expected.eq_ignore_ascii_case(ServerState::from_online(online).as_str());
        }
        match expected.parse::<ServerState>() {
            Ok(state) => self.servers.state(server).await == state,
            Err(err) => {
                tracing::warn!(%err, server, "server_status check has an unknown status");
                false
            }
        }
    }
}

impl<P: Platform> ConditionEvaluator for StandardConditionEvaluator<P> {
    fn evaluate<'a>(
        &'a self,
        condition: &'a ConditionConfig,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, bool> {
        Box::pin(self.evaluate_all(condition, ctx))
    }
}
