//! Condition evaluation port.

use std::future::Future;
use std::pin::Pin;

use autostart_domain::rule::ConditionConfig;

use crate::context::ExecutionContext;

/// Boxed future returned by the object-safe runtime traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Decides whether a condition holds for an execution.
///
/// Object safe: rules, `if` and `while` share one evaluator behind an `Arc`.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate<'a>(
        &'a self,
        condition: &'a ConditionConfig,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, bool>;
}
