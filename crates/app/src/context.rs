//! Per-firing variable scope.
//!
//! A trigger builds one [`ExecutionContext`] each time it fires, fills it
//! with what it knows about the event, and hands it to the rule. Actions
//! read and write the same context, so later actions see what earlier ones
//! stored. Child contexts layer temporary variables over a parent without
//! touching it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use autostart_domain::id::{ExecutionId, short_suffix};
use autostart_domain::value::Value;

/// Well-known variable set on every firing to the trigger's kind.
pub const TRIGGER_TYPE: &str = "_trigger_type";
/// Well-known variable set by the rule executor to the rule's name.
pub const RULE_NAME: &str = "_rule_name";

/// Shared handle to an execution scope. Clones point at the same scope.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    started: Instant,
    variables: RwLock<HashMap<String, Value>>,
    parent: Option<ExecutionContext>,
    release: Mutex<Option<watch::Sender<bool>>>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::build(ExecutionId::new().to_string(), None, HashMap::new())
    }

    /// Scope seeded with `variables`.
    #[must_use]
    pub fn with_variables(variables: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::build(
            ExecutionId::new().to_string(),
            None,
            variables.into_iter().collect(),
        )
    }

    /// New scope that reads through to `self`; writes stay local.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::build(
            format!("{}-{}", self.inner.id, short_suffix()),
            Some(self.clone()),
            HashMap::new(),
        )
    }

    fn build(id: String, parent: Option<Self>, variables: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                started: Instant::now(),
                variables: RwLock::new(variables),
                parent,
                release: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Time since this scope was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Look a key up here, then in the parent chain.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let local = self
            .inner
            .variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        local.or_else(|| self.inner.parent.as_ref().and_then(|p| p.get(key)))
    }

    #[must_use]
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| default.into())
    }

    /// Text form of a variable, if set.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove a local variable. Parent values are never touched.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner
            .variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Snapshot of every visible variable, local values shadowing the parent's.
    #[must_use]
    pub fn variables(&self) -> HashMap<String, Value> {
        let mut all = self
            .inner
            .parent
            .as_ref()
            .map(Self::variables)
            .unwrap_or_default();
        all.extend(
            self.inner
                .variables
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        all
    }

    /// Get or create the release signal.
    ///
    /// Child scopes share the signal of their root so a nested action can
    /// release the event the outer trigger is holding.
    #[must_use]
    pub fn release_signal(&self) -> ReleaseSignal {
        if let Some(parent) = &self.inner.parent {
            return parent.release_signal();
        }
        let mut slot = self
            .inner
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let sender = slot.get_or_insert_with(|| watch::channel(false).0);
        ReleaseSignal {
            receiver: sender.subscribe(),
        }
    }

    /// Fire the release signal. No-op if nobody asked for one.
    pub fn release_event(&self) {
        if let Some(parent) = &self.inner.parent {
            parent.release_event();
            return;
        }
        let slot = self
            .inner
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = slot.as_ref() {
            sender.send_replace(true);
        }
    }

    #[must_use]
    pub fn has_release_signal(&self) -> bool {
        match &self.inner.parent {
            Some(parent) => parent.has_release_signal(),
            None => self
                .inner
                .release
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some(),
        }
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        match &self.inner.parent {
            Some(parent) => parent.is_released(),
            None => self
                .inner
                .release
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|sender| *sender.borrow()),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("has_parent", &self.inner.parent.is_some())
            .finish_non_exhaustive()
    }
}

/// Single-fire signal a trigger waits on while holding an event.
#[derive(Debug)]
pub struct ReleaseSignal {
    receiver: watch::Receiver<bool>,
}

impl ReleaseSignal {
    /// Resolve once the event is released. Never resolves otherwise.
    pub async fn released(mut self) {
        if self.receiver.wait_for(|released| *released).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_read_parent_values_when_child_has_none() {
        let parent = ExecutionContext::new();
        parent.set("server", "lobby");
        let child = parent.child();
        assert_eq!(child.get("server"), Some(Value::from("lobby")));
    }

    #[test]
    fn should_keep_child_writes_local() {
        let parent = ExecutionContext::new();
        parent.set("server", "lobby");
        let child = parent.child();
        child.set("server", "survival");
        assert_eq!(child.get("server"), Some(Value::from("survival")));
        assert_eq!(parent.get("server"), Some(Value::from("lobby")));
        assert!(child.remove("server").is_some());
        assert_eq!(child.get("server"), Some(Value::from("lobby")));
    }

    #[test]
    fn should_derive_child_id_from_parent() {
        let parent = ExecutionContext::new();
        let child = parent.child();
        let suffix = child.id().strip_prefix(&format!("{}-", parent.id())).unwrap();
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn should_snapshot_with_local_values_shadowing_parent() {
        let parent = ExecutionContext::new();
        parent.set("a", 1);
        parent.set("b", 2);
        let child = parent.child();
        child.set("b", 3);
        let all = child.variables();
        assert_eq!(all.get("a"), Some(&Value::Int(1)));
        assert_eq!(all.get("b"), Some(&Value::Int(3)));
    }

    #[test]
    fn should_ignore_release_when_no_signal_exists() {
        let ctx = ExecutionContext::new();
        ctx.release_event();
        assert!(!ctx.has_release_signal());
        assert!(!ctx.is_released());
    }

    #[tokio::test]
    async fn should_resolve_signal_when_event_released() {
        let ctx = ExecutionContext::new();
        let signal = ctx.release_signal();
        ctx.release_event();
        ctx.release_event();
        tokio::time::timeout(Duration::from_secs(1), signal.released())
            .await
            .unwrap();
        assert!(ctx.is_released());
    }

    #[tokio::test]
    async fn should_release_root_signal_from_child_scope() {
        let ctx = ExecutionContext::new();
        let signal = ctx.release_signal();
        ctx.child().release_event();
        tokio::time::timeout(Duration::from_secs(1), signal.released())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn should_stay_pending_when_never_released() {
        let ctx = ExecutionContext::new();
        let signal = ctx.release_signal();
        let result = tokio::time::timeout(Duration::from_secs(5), signal.released()).await;
        assert!(result.is_err());
    }
}
