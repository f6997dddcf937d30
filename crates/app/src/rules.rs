//! Rules — triggers bound to a condition and an action list.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use autostart_domain::error::{AutoStartError, ConfigError};
use autostart_domain::rule::{ActionConfig, ConditionConfig, RuleConfig};

use crate::actions::ActionRegistry;
use crate::context::{ExecutionContext, RULE_NAME};
use crate::ports::Platform;
use crate::ports::condition::BoxFuture;
use crate::triggers::{Trigger, TriggerCallback, TriggerRegistry};

/// Runs one rule's condition and actions against a firing.
pub struct RuleExecutor<P: Platform> {
    name: String,
    conditions: ConditionConfig,
    actions: Vec<ActionConfig>,
    registry: ActionRegistry<P>,
}

impl<P: Platform> RuleExecutor<P> {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        conditions: ConditionConfig,
        actions: Vec<ActionConfig>,
        registry: ActionRegistry<P>,
    ) -> Self {
        Self {
            name: name.into(),
            conditions,
            actions,
            registry,
        }
    }

    /// Evaluate the condition and, when it holds, run the actions in order.
    ///
    /// Returns whether the actions ran.
    #[tracing::instrument(skip(self, ctx), fields(rule = %self.name, context = ctx.id()))]
    pub async fn execute(&self, ctx: ExecutionContext) -> bool {
        ctx.set(RULE_NAME, self.name.as_str());
        let conditions = &self.registry.services().conditions;
        if !conditions.evaluate(&self.conditions, &ctx).await {
            tracing::debug!("conditions not met");
            return false;
        }
        tracing::debug!(actions = self.actions.len(), "executing rule");
        self.registry.run_all(&self.actions, &ctx).await;
        tracing::debug!(elapsed = ?ctx.elapsed(), "rule finished");
        true
    }
}

/// A loaded rule and its live triggers.
pub struct Rule<P: Platform> {
    name: String,
    triggers: Vec<Arc<dyn Trigger>>,
    executor: Arc<RuleExecutor<P>>,
    active: AtomicBool,
}

impl<P: Platform> Rule<P> {
    /// Build the triggers and check the actions of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AutoStartError::Validation`] for a malformed declaration
    /// and [`AutoStartError::Config`] when a trigger or action refuses its
    /// configuration.
    pub fn build(
        config: &RuleConfig,
        triggers: &TriggerRegistry<P>,
        actions: &ActionRegistry<P>,
    ) -> Result<Self, AutoStartError> {
        config.validate()?;
        let built = config
            .triggers
            .iter()
            .map(|trigger| triggers.create(trigger))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        actions.check_all(&config.actions)?;
        Ok(Self {
            name: config.name.clone(),
            triggers: built,
            executor: Arc::new(RuleExecutor::new(
                config.name.as_str(),
                config.conditions.clone(),
                config.actions.clone(),
                actions.clone(),
            )),
            active: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn triggers(&self) -> &[Arc<dyn Trigger>] {
        &self.triggers
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Activate every trigger. All or nothing: when one refuses, the ones
    /// already activated are deactivated again.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] of the first trigger that refused.
    pub fn activate(&self) -> Result<(), ConfigError> {
        let executor = Arc::clone(&self.executor);
        let callback: TriggerCallback = Arc::new(move |ctx| -> BoxFuture<'static, ()> {
            let executor = Arc::clone(&executor);
            Box::pin(async move {
                executor.execute(ctx).await;
            })
        });
        for (index, trigger) in self.triggers.iter().enumerate() {
            if let Err(err) = trigger.activate(&self.name, Arc::clone(&callback)) {
                for activated in self.triggers[..index].iter().rev() {
                    activated.deactivate();
                }
                return Err(err);
            }
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Deactivate every trigger. Safe to call repeatedly.
    pub fn deactivate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            for trigger in &self.triggers {
                trigger.deactivate();
            }
        }
    }
}

/// Outcome of [`RuleManager::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub disabled: usize,
    pub failed: usize,
}

/// Owns the active rules.
pub struct RuleManager<P: Platform> {
    triggers: TriggerRegistry<P>,
    actions: ActionRegistry<P>,
    rules: Mutex<Vec<Rule<P>>>,
}

impl<P: Platform> RuleManager<P> {
    #[must_use]
    pub fn new(triggers: TriggerRegistry<P>, actions: ActionRegistry<P>) -> Self {
        Self {
            triggers,
            actions,
            rules: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Rule<P>>> {
        self.rules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the active rules with `configs`.
    ///
    /// A rule that fails to build or activate is logged and skipped; the
    /// others still load.
    pub fn load(&self, configs: &[RuleConfig]) -> LoadSummary {
        self.clear();
        let mut summary = LoadSummary::default();
        let mut loaded: Vec<Rule<P>> = Vec::new();
        for config in configs {
            if !config.enabled {
                tracing::debug!(rule = %config.name, "rule disabled");
                summary.disabled += 1;
                continue;
            }
            if loaded.iter().any(|rule| rule.name == config.name) {
                tracing::error!(rule = %config.name, "duplicate rule name");
                summary.failed += 1;
                continue;
            }
            let rule = match Rule::build(config, &self.triggers, &self.actions) {
                Ok(rule) => rule,
                Err(err) => {
                    tracing::error!(rule = %config.name, error = ?err, "failed to load rule");
                    summary.failed += 1;
                    continue;
                }
            };
            if let Err(err) = rule.activate() {
                tracing::error!(rule = %config.name, error = %err, "failed to activate rule");
                summary.failed += 1;
                continue;
            }
            tracing::debug!(rule = %config.name, triggers = rule.triggers.len(), "rule loaded");
            loaded.push(rule);
            summary.loaded += 1;
        }
        *self.lock() = loaded;
        tracing::info!(
            loaded = summary.loaded,
            disabled = summary.disabled,
            failed = summary.failed,
            "rules loaded"
        );
        summary
    }

    /// Deactivate and drop every rule.
    pub fn clear(&self) {
        let rules = std::mem::take(&mut *self.lock());
        for rule in &rules {
            rule.deactivate();
        }
    }

    #[must_use]
    pub fn rule_names(&self) -> Vec<String> {
        self.lock().iter().map(|rule| rule.name.clone()).collect()
    }

    /// Ids of every manual trigger, sorted and deduplicated.
    #[must_use]
    pub fn manual_trigger_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock()
            .iter()
            .flat_map(|rule| rule.triggers.iter())
            .filter_map(|trigger| trigger.as_manual().map(|manual| manual.id().to_string()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Fire every active manual trigger with `id`. Returns how many fired.
    pub fn fire_manual(&self, id: &str, args: &[String]) -> usize {
        self.lock()
            .iter()
            .flat_map(|rule| rule.triggers.iter())
            .filter_map(|trigger| trigger.as_manual())
            .filter(|manual| manual.id() == id)
            .filter_map(|manual| manual.fire(args))
            .count()
    }

    /// Fire every `proxy_shutdown` trigger and hand back the runs.
    pub fn fire_shutdown(&self) -> Vec<JoinHandle<()>> {
        self.lock()
            .iter()
            .flat_map(|rule| rule.triggers.iter())
            .filter_map(|trigger| trigger.as_shutdown())
            .filter_map(|shutdown| shutdown.fire())
            .collect()
    }
}
