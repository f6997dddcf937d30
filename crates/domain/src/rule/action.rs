use serde::{Deserialize, Serialize};

use super::condition::{Check, ConditionConfig, ConditionMode};
use super::template::Template;
use crate::error::ValidationError;

/// One entry of an action list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Await the action before running the next one.
    #[serde(default = "default_true")]
    pub wait_for_completion: bool,
}

fn default_true() -> bool {
    true
}

impl ActionConfig {
    #[must_use]
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            wait_for_completion: true,
        }
    }

    /// Run without awaiting completion.
    #[must_use]
    pub fn detached(mut self) -> Self {
        self.wait_for_completion = false;
        self
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind.kind()
    }

    /// Check required fields, recursing into nested action lists.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] when a required field is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let kind = self.kind();
        let required = |value: &Template, field: &'static str| {
            if value.is_blank() {
                Err(ValidationError::MissingField { kind, field })
            } else {
                Ok(())
            }
        };
        match &self.kind {
            ActionKind::Start { server }
            | ActionKind::Stop { server }
            | ActionKind::Restart { server } => required(server, "server"),
            ActionKind::SendCommand { server, command } => {
                required(server, "server")?;
                required(command, "command")
            }
            ActionKind::Sleep { duration } => required(duration, "duration"),
            ActionKind::Log { message, .. } => required(message, "message"),
            ActionKind::AllowConnection { connection, .. } => required(connection, "connection"),
            ActionKind::AllowPing { ping }
            | ActionKind::DenyPing { ping }
            | ActionKind::RespondPing(RespondPingConfig { ping, .. }) => required(ping, "ping"),
            ActionKind::If(config) => {
                config
                    .then
                    .iter()
                    .chain(config.else_if.iter().flat_map(|b| b.then.iter()))
                    .chain(config.otherwise.iter())
                    .try_for_each(Self::validate)
            }
            ActionKind::While(config) => config.body.iter().try_for_each(Self::validate),
        }
    }
}

/// The action variants and their settings.
///
/// Every text field is a [`Template`], interpolated against the
/// execution context when the action runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Start {
        server: Template,
    },
    Stop {
        server: Template,
    },
    Restart {
        server: Template,
    },
    SendCommand {
        server: Template,
        command: Template,
    },
    Sleep {
        duration: Template,
    },
    Log {
        message: Template,
        #[serde(default = "default_log_level")]
        level: Template,
    },
    /// Override a held connection attempt and release it.
    AllowConnection {
        #[serde(default = "default_connection_ref")]
        connection: Template,
        #[serde(default = "default_connection_server")]
        server: Template,
    },
    AllowPing {
        #[serde(default = "default_ping_ref")]
        ping: Template,
    },
    DenyPing {
        #[serde(default = "default_ping_ref")]
        ping: Template,
    },
    RespondPing(RespondPingConfig),
    If(IfConfig),
    While(WhileConfig),
}

fn default_log_level() -> Template {
    Template::from("info")
}

fn default_connection_ref() -> Template {
    Template::from("${connection}")
}

fn default_connection_server() -> Template {
    Template::from("${connection.server}")
}

fn default_ping_ref() -> Template {
    Template::from("${ping}")
}

fn default_update_interval() -> Template {
    Template::from("1s")
}

impl ActionKind {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Restart { .. } => "restart",
            Self::SendCommand { .. } => "send_command",
            Self::Sleep { .. } => "sleep",
            Self::Log { .. } => "log",
            Self::AllowConnection { .. } => "allow_connection",
            Self::AllowPing { .. } => "allow_ping",
            Self::DenyPing { .. } => "deny_ping",
            Self::RespondPing(_) => "respond_ping",
            Self::If(_) => "if",
            Self::While(_) => "while",
        }
    }
}

/// Fields of a ping response to rewrite; unset fields are left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondPingConfig {
    #[serde(default = "default_ping_ref")]
    pub ping: Template,
    #[serde(default)]
    pub version_name: Option<Template>,
    #[serde(default)]
    pub protocol_version: Option<Template>,
    #[serde(default)]
    pub motd: Option<Template>,
    #[serde(default)]
    pub player_count: Option<Template>,
    #[serde(default)]
    pub max_players: Option<Template>,
}

impl Default for RespondPingConfig {
    fn default() -> Self {
        Self {
            ping: default_ping_ref(),
            version_name: None,
            protocol_version: None,
            motd: None,
            player_count: None,
            max_players: None,
        }
    }
}

/// `if` / `else_if` / `else` branching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfConfig {
    #[serde(flatten)]
    pub condition: ConditionConfig,
    #[serde(default)]
    pub then: Vec<ActionConfig>,
    #[serde(default)]
    pub else_if: Vec<ElseIfBranch>,
    #[serde(default, rename = "else")]
    pub otherwise: Vec<ActionConfig>,
}

impl IfConfig {
    /// `else_if` branches that carry at least one check; the others can never match.
    pub fn branches(&self) -> impl Iterator<Item = (ConditionConfig, &[ActionConfig])> {
        let parent = self.condition.mode;
        self.else_if
            .iter()
            .filter(|branch| !branch.checks.is_empty())
            .map(move |branch| (branch.condition(parent), branch.then.as_slice()))
    }
}

/// One `else_if` entry. Without its own `mode` it inherits the parent's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElseIfBranch {
    #[serde(default)]
    pub mode: Option<ConditionMode>,
    #[serde(default)]
    pub checks: Vec<Check>,
    #[serde(default)]
    pub then: Vec<ActionConfig>,
}

impl ElseIfBranch {
    #[must_use]
    pub fn condition(&self, parent: ConditionMode) -> ConditionConfig {
        ConditionConfig::new(self.mode.unwrap_or(parent), self.checks.clone())
    }
}

/// Bounded loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhileConfig {
    #[serde(flatten)]
    pub condition: ConditionConfig,
    /// No timeout (or a zero one) means the loop runs until the condition fails.
    #[serde(default)]
    pub timeout: Option<Template>,
    #[serde(default = "default_update_interval")]
    pub update_interval: Template,
    #[serde(default, rename = "do")]
    pub body: Vec<ActionConfig>,
}

impl Default for WhileConfig {
    fn default() -> Self {
        Self {
            condition: ConditionConfig::default(),
            timeout: None,
            update_interval: default_update_interval(),
            body: Vec::new(),
        }
    }
}
