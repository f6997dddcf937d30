//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`AutoStartError`] via `#[from]`. Transient operational failures
//! (unreachable backend, absent variable) are not errors at all: they
//! degrade to a safe default at the call site.

use crate::duration::DurationError;

/// Top-level error shared by every crate of the workspace.
#[derive(Debug, thiserror::Error)]
pub enum AutoStartError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("configuration error")]
    Config(#[from] ConfigError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Structural problems found while validating a rule declaration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("rule must declare at least one trigger")]
    NoTriggers,

    #[error("rule must declare at least one action")]
    NoActions,

    #[error("{kind}: missing required field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("{kind}: invalid value '{value}' for '{field}'")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        value: String,
    },
}

/// A named resource does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} '{id}' not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A trigger or action refused its configuration at activation time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{kind}: missing required field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("{kind}: invalid duration for '{field}'")]
    InvalidDuration {
        kind: &'static str,
        field: &'static str,
        #[source]
        source: DurationError,
    },

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("{kind}: invalid value '{value}' for '{field}'")]
    InvalidValue {
        kind: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("unknown server '{0}'")]
    UnknownServer(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_validation_error_into_top_level_error() {
        let err: AutoStartError = ValidationError::NoActions.into();
        assert!(matches!(
            err,
            AutoStartError::Validation(ValidationError::NoActions)
        ));
    }

    #[test]
    fn should_render_missing_field_with_kind_and_field() {
        let err = ConfigError::MissingField {
            kind: "cron",
            field: "expression",
        };
        assert_eq!(err.to_string(), "cron: missing required field 'expression'");
    }

    #[test]
    fn should_render_not_found_with_entity_and_id() {
        let err = NotFoundError {
            entity: "Server",
            id: "lobby".to_string(),
        };
        assert_eq!(err.to_string(), "Server 'lobby' not found");
    }
}
