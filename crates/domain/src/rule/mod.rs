//! Rules — trigger → condition → action declarations.
//!
//! A [`RuleConfig`] is the declarative form of a rule: one or more
//! [`TriggerConfig`]s that decide when it runs, an optional
//! [`ConditionConfig`] guard, and an ordered list of [`ActionConfig`]s.
//! The application layer turns it into live triggers and actions.

mod action;
mod condition;
mod preset;
mod template;
mod trigger;

pub use action::{
    ActionConfig, ActionKind, ElseIfBranch, IfConfig, RespondPingConfig, WhileConfig,
};
pub use condition::{Check, Condition, ConditionConfig, ConditionMode};
pub use preset::{ConnectionMode, RulePreset};
pub use template::Template;
pub use trigger::{CronFormat, TriggerConfig, UnknownCronFormat};

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{AutoStartError, ValidationError};

/// A rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Filled from the table key when loaded from a `[rules.<name>]` map.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub conditions: ConditionConfig,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

fn default_enabled() -> bool {
    true
}

impl RuleConfig {
    /// Create a builder for constructing a [`RuleConfig`].
    #[must_use]
    pub fn builder() -> RuleConfigBuilder {
        RuleConfigBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`AutoStartError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `triggers` is empty ([`ValidationError::NoTriggers`])
    /// - `actions` is empty ([`ValidationError::NoActions`])
    /// - a trigger or action lacks a required value
    ///   ([`ValidationError::MissingField`], [`ValidationError::InvalidField`])
    pub fn validate(&self) -> Result<(), AutoStartError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.triggers.is_empty() {
            return Err(ValidationError::NoTriggers.into());
        }
        if self.actions.is_empty() {
            return Err(ValidationError::NoActions.into());
        }
        for trigger in &self.triggers {
            validate_trigger(trigger)?;
        }
        for action in &self.actions {
            action.validate()?;
        }
        Ok(())
    }
}

fn validate_trigger(trigger: &TriggerConfig) -> Result<(), ValidationError> {
    match trigger {
        TriggerConfig::Manual { id } if id.trim().is_empty() => Err(ValidationError::MissingField {
            kind: "manual",
            field: "id",
        }),
        TriggerConfig::Cron { expression, .. } if expression.trim().is_empty() => {
            Err(ValidationError::MissingField {
                kind: "cron",
                field: "expression",
            })
        }
        TriggerConfig::EmptyServer { empty_time, .. } if parse_duration(empty_time).is_err() => {
            Err(ValidationError::InvalidField {
                kind: "empty_server",
                field: "empty_time",
                value: empty_time.clone(),
            })
        }
        _ => Ok(()),
    }
}

/// Step-by-step builder for [`RuleConfig`].
#[derive(Debug, Default)]
pub struct RuleConfigBuilder {
    name: Option<String>,
    enabled: Option<bool>,
    triggers: Vec<TriggerConfig>,
    conditions: ConditionConfig,
    actions: Vec<ActionConfig>,
}

impl RuleConfigBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: TriggerConfig) -> Self {
        self.triggers.push(trigger);
        self
    }

    #[must_use]
    pub fn conditions(mut self, conditions: ConditionConfig) -> Self {
        self.conditions = conditions;
        self
    }

    #[must_use]
    pub fn action(mut self, action: ActionConfig) -> Self {
        self.actions.push(action);
        self
    }

    /// Consume the builder, validate, and return a [`RuleConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AutoStartError::Validation`] if required fields are missing or empty.
    pub fn build(self) -> Result<RuleConfig, AutoStartError> {
        let rule = RuleConfig {
            name: self.name.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            triggers: self.triggers,
            conditions: self.conditions,
            actions: self.actions,
        };
        rule.validate()?;
        Ok(rule)
    }
}
