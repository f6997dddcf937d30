//! `if` / `else_if` / `else`.

use std::sync::Arc;

use autostart_domain::rule::{ActionConfig, IfConfig};

use super::{Action, ActionRegistry, rule_name};
use crate::context::ExecutionContext;
use crate::ports::Platform;
use crate::ports::condition::BoxFuture;

/// Runs the first branch whose condition holds.
///
/// The primary condition is checked first, then each `else_if` in order;
/// `else` runs when nothing matched. An `if` without checks always takes
/// its `then` branch.
pub struct IfAction<P: Platform> {
    config: IfConfig,
    registry: ActionRegistry<P>,
}

impl<P: Platform> IfAction<P> {
    #[must_use]
    pub fn new(config: IfConfig, registry: ActionRegistry<P>) -> Self {
        Self { config, registry }
    }

    async fn select(&self, ctx: &ExecutionContext) -> Option<(&'static str, &[ActionConfig])> {
        let conditions = &self.registry.services().conditions;
        if conditions.evaluate(&self.config.condition, ctx).await {
            return Some(("then", &self.config.then));
        }
        for (condition, then) in self.config.branches() {
            if conditions.evaluate(&condition, ctx).await {
                return Some(("else_if", then));
            }
        }
        (!self.config.otherwise.is_empty()).then_some(("else", self.config.otherwise.as_slice()))
    }
}

impl<P: Platform> Action for IfAction<P> {
    fn kind(&self) -> &'static str {
        "if"
    }

    fn execute(self: Arc<Self>, ctx: ExecutionContext) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            match self.select(&ctx).await {
                Some((branch, actions)) => {
                    tracing::debug!(rule = %rule_name(&ctx), branch, actions = actions.len(), "if branch taken");
                    self.registry.run_all(actions, &ctx).await;
                }
                None => tracing::debug!(rule = %rule_name(&ctx), "no if branch matched"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use autostart_domain::rule::{
        ActionKind, Check, Condition, ConditionConfig, ConditionMode, ElseIfBranch,
    };

    use super::*;
    use crate::actions::test_support::registry;
    use crate::testing::FakeControl;

    fn equals(value: &str, expected: &str) -> Check {
        Check::new(Condition::StringEquals {
            value: value.into(),
            equals: expected.into(),
            ignore_case: false,
        })
    }

    fn send(command: &str) -> ActionConfig {
        ActionConfig::new(ActionKind::SendCommand {
            server: "lobby".into(),
            command: command.into(),
        })
    }

    fn branching() -> IfConfig {
        IfConfig {
            condition: ConditionConfig::new(ConditionMode::All, vec![equals("${mode}", "a")]),
            then: vec![send("then")],
            else_if: vec![
                ElseIfBranch {
                    mode: None,
                    checks: vec![equals("${mode}", "b")],
                    then: vec![send("first else_if")],
                },
                ElseIfBranch {
                    mode: None,
                    checks: vec![equals("${mode}", "b")],
                    then: vec![send("second else_if")],
                },
            ],
            otherwise: vec![send("else")],
        }
    }

    async fn run_with_mode(mode: &str) -> Vec<String> {
        let registry = registry(FakeControl::default().with_commands()).await;
        let ctx = ExecutionContext::new();
        ctx.set("mode", mode);
        registry
            .run_all(&[ActionConfig::new(ActionKind::If(branching()))], &ctx)
            .await;
        registry.services().servers.get("lobby").unwrap().control().commands()
    }

    #[tokio::test]
    async fn should_run_then_branch_when_condition_holds() {
        assert_eq!(run_with_mode("a").await, vec!["then".to_string()]);
    }

    #[tokio::test]
    async fn should_run_first_matching_else_if_only() {
        assert_eq!(run_with_mode("b").await, vec!["first else_if".to_string()]);
    }

    #[tokio::test]
    async fn should_run_else_when_nothing_matches() {
        assert_eq!(run_with_mode("c").await, vec!["else".to_string()]);
    }
}
