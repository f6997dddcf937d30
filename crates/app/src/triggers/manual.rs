//! `manual` — fired on demand.

use std::sync::{Mutex, PoisonError};

use tokio::task::JoinHandle;

use autostart_domain::error::ConfigError;
use autostart_domain::value::Value;

use super::{Trigger, TriggerCallback, firing_context, launch};

struct Binding {
    rule: String,
    callback: TriggerCallback,
}

/// A trigger fired through [`ManualTrigger::fire`], usually by an
/// operator command routed through the engine.
pub struct ManualTrigger {
    id: String,
    binding: Mutex<Option<Binding>>,
}

impl ManualTrigger {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            binding: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fire once with positional arguments.
    ///
    /// Returns `None` when the trigger is not active. The returned handle
    /// may be dropped; the rule keeps running.
    pub fn fire(&self, args: &[String]) -> Option<JoinHandle<()>> {
        let (rule, callback) = {
            let binding = self.binding.lock().unwrap_or_else(PoisonError::into_inner);
            let binding = binding.as_ref()?;
            (binding.rule.clone(), binding.callback.clone())
        };

        let ctx = firing_context(self.kind());
        ctx.set("manual.id", self.id.as_str());
        ctx.set("manual.args.length", args.len());
        for (index, arg) in args.iter().enumerate() {
            ctx.set(format!("manual.args.{index}"), arg.as_str());
        }
        ctx.set(
            "manual.args",
            Value::List(args.iter().map(|arg| Value::from(arg.as_str())).collect()),
        );
        tracing::debug!(rule, id = %self.id, args = args.len(), "manual trigger fired");
        Some(launch(&callback, ctx))
    }
}

impl Trigger for ManualTrigger {
    fn kind(&self) -> &'static str {
        "manual"
    }

    fn activate(&self, rule: &str, callback: TriggerCallback) -> Result<(), ConfigError> {
        *self.binding.lock().unwrap_or_else(PoisonError::into_inner) = Some(Binding {
            rule: rule.to_string(),
            callback,
        });
        tracing::debug!(rule, id = %self.id, "manual trigger activated");
        Ok(())
    }

    fn deactivate(&self) {
        self.binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_active(&self) -> bool {
        self.binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn as_manual(&self) -> Option<&ManualTrigger> {
        Some(self)
    }
}
