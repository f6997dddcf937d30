//! Condition configuration — guards evaluated after a trigger fires.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::template::Template;

/// How the checks of a [`ConditionConfig`] combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionMode {
    /// Every check must pass (stops at the first failure).
    #[default]
    All,
    /// One passing check is enough (stops at the first success).
    Any,
}

/// A list of checks and how to combine them. No checks means "true".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionConfig {
    pub mode: ConditionMode,
    pub checks: Vec<Check>,
}

impl ConditionConfig {
    #[must_use]
    pub fn new(mode: ConditionMode, checks: Vec<Check>) -> Self {
        Self { mode, checks }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

/// One check, optionally inverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    #[serde(flatten)]
    pub condition: Condition,
    #[serde(default)]
    pub invert: bool,
}

impl Check {
    #[must_use]
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            invert: false,
        }
    }

    #[must_use]
    pub fn inverted(mut self) -> Self {
        self.invert = !self.invert;
        self
    }
}

/// A predicate over context variables and server state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Numeric comparison; `equals` wins over the `min`/`max` range.
    NumberCompare {
        value: Template,
        #[serde(default)]
        min: Option<Template>,
        #[serde(default)]
        max: Option<Template>,
        #[serde(default)]
        equals: Option<Template>,
    },
    /// Text equality after interpolation.
    StringEquals {
        value: Template,
        equals: Template,
        #[serde(default)]
        ignore_case: bool,
    },
    /// Player count of a server against bounds.
    PlayerCount {
        server: Template,
        #[serde(default)]
        min: Option<Template>,
        #[serde(default)]
        max: Option<Template>,
        #[serde(default)]
        equals: Option<Template>,
    },
    /// Online/offline status of a server.
    ServerStatus { server: Template, status: Template },
}

impl Condition {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NumberCompare { .. } => "number_compare",
            Self::StringEquals { .. } => "string_equals",
            Self::PlayerCount { .. } => "player_count",
            Self::ServerStatus { .. } => "server_status",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NumberCompare { value, .. } => write!(f, "number_compare({value})"),
            Self::StringEquals { value, equals, .. } => {
                write!(f, "string_equals({value} == {equals})")
            }
            Self::PlayerCount { server, .. } => write!(f, "player_count({server})"),
            Self::ServerStatus { server, status } => write!(f, "server_status({server}, {status})"),
        }
    }
}
