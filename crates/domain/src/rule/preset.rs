//! Rule presets: shorthand rule tables expanded into a full [`RuleConfig`].
//!
//! A `[rules.<name>]` table carrying a `template` key is read as a
//! [`RulePreset`] instead of a hand-written rule.

use serde::{Deserialize, Serialize};

use super::{
    ActionConfig, ActionKind, Check, Condition, ConditionConfig, ConditionMode, IfConfig,
    RuleConfig, Template, TriggerConfig, WhileConfig,
};
use crate::error::{AutoStartError, ValidationError};
use crate::filter::{FilterMode, ListFilter};

/// Ready-made rule shapes for the common start/stop policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum RulePreset {
    /// Stop any listed server once it has been empty for `empty_time`.
    StopOnEmpty {
        #[serde(default = "default_empty_time")]
        empty_time: String,
        servers: Vec<String>,
    },
    /// Start the listed servers, in order, when the proxy starts.
    StartOnProxyStart { servers: Vec<String> },
    /// Stop the listed servers, in order, when the proxy shuts down.
    StopOnProxyShutdown { servers: Vec<String> },
    /// Start a listed server when a player tries to join it.
    StartOnConnection {
        servers: Vec<String>,
        /// Restrict to these players; empty means everyone.
        #[serde(default)]
        players: Vec<String>,
        #[serde(default)]
        mode: ConnectionMode,
        /// How long `hold` waits for the server before giving up.
        #[serde(default = "default_hold_timeout")]
        hold_timeout: String,
    },
}

/// What happens to the connection that triggered a `start_on_connection` rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Let the connection through untouched.
    #[default]
    None,
    /// Refuse the connection while the server is offline.
    Disconnect,
    /// Keep the connection pending until the server is online.
    Hold,
}

fn default_empty_time() -> String {
    "15m".to_string()
}

fn default_hold_timeout() -> String {
    "30s".to_string()
}

const CONNECTION_SERVER: &str = "${connection.server}";

impl RulePreset {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StopOnEmpty { .. } => "stop_on_empty",
            Self::StartOnProxyStart { .. } => "start_on_proxy_start",
            Self::StopOnProxyShutdown { .. } => "stop_on_proxy_shutdown",
            Self::StartOnConnection { .. } => "start_on_connection",
        }
    }

    fn servers(&self) -> &[String] {
        match self {
            Self::StopOnEmpty { servers, .. }
            | Self::StartOnProxyStart { servers }
            | Self::StopOnProxyShutdown { servers }
            | Self::StartOnConnection { servers, .. } => servers,
        }
    }

    /// Build the rule this preset stands for.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] when `servers` is empty,
    /// or any error of [`RuleConfig::validate`] on the expanded rule.
    pub fn expand(
        &self,
        name: impl Into<String>,
        enabled: bool,
    ) -> Result<RuleConfig, AutoStartError> {
        if self.servers().iter().all(|server| server.trim().is_empty()) {
            return Err(ValidationError::MissingField {
                kind: self.kind(),
                field: "servers",
            }
            .into());
        }
        let builder = RuleConfig::builder().name(name).enabled(enabled);
        let builder = match self {
            Self::StopOnEmpty {
                empty_time,
                servers,
            } => builder
                .trigger(TriggerConfig::EmptyServer {
                    empty_time: empty_time.clone(),
                    server_list: whitelist(servers),
                })
                .action(stop("${empty_server.server.name}")),
            Self::StartOnProxyStart { servers } => servers
                .iter()
                .fold(builder.trigger(TriggerConfig::ProxyStart), |builder, server| {
                    builder.action(start(server))
                }),
            Self::StopOnProxyShutdown { servers } => servers
                .iter()
                .fold(builder.trigger(TriggerConfig::ProxyShutdown), |builder, server| {
                    builder.action(stop(server))
                }),
            Self::StartOnConnection {
                servers,
                players,
                mode,
                hold_timeout,
            } => builder
                .trigger(TriggerConfig::Connection {
                    server_list: whitelist(servers),
                    player_list: whitelist(players),
                    deny_connection: *mode != ConnectionMode::None,
                })
                .action(connection_action(*mode, hold_timeout)),
        };
        builder.build()
    }
}

fn whitelist(entries: &[String]) -> ListFilter {
    ListFilter::new(FilterMode::Whitelist, entries.iter().map(String::as_str))
}

fn start(server: &str) -> ActionConfig {
    ActionConfig::new(ActionKind::Start {
        server: Template::from(server),
    })
}

fn stop(server: &str) -> ActionConfig {
    ActionConfig::new(ActionKind::Stop {
        server: Template::from(server),
    })
}

fn target_online() -> Check {
    Check::new(Condition::ServerStatus {
        server: Template::from(CONNECTION_SERVER),
        status: Template::from("online"),
    })
}

fn allow_connection() -> ActionConfig {
    ActionConfig::new(ActionKind::AllowConnection {
        connection: Template::from("${connection}"),
        server: Template::from(CONNECTION_SERVER),
    })
}

fn guarded(
    checks: Vec<Check>,
    then: Vec<ActionConfig>,
    otherwise: Vec<ActionConfig>,
) -> ActionConfig {
    ActionConfig::new(ActionKind::If(IfConfig {
        condition: ConditionConfig::new(ConditionMode::All, checks),
        then,
        else_if: Vec::new(),
        otherwise,
    }))
}

fn connection_action(mode: ConnectionMode, hold_timeout: &str) -> ActionConfig {
    let launch = start(CONNECTION_SERVER);
    match mode {
        ConnectionMode::None => launch,
        ConnectionMode::Disconnect => {
            guarded(vec![target_online()], vec![allow_connection()], vec![launch])
        }
        ConnectionMode::Hold => {
            let wait = ActionConfig::new(ActionKind::While(WhileConfig {
                condition: ConditionConfig::new(ConditionMode::All, vec![target_online().inverted()]),
                timeout: Some(Template::from(hold_timeout)),
                ..WhileConfig::default()
            }));
            let give_up = ActionConfig::new(ActionKind::Log {
                message: Template::from(
                    "server ${connection.server} is still offline, dropping ${connection.player.name}",
                ),
                level: Template::from("warn"),
            });
            let allow_once_online =
                guarded(vec![target_online()], vec![allow_connection()], vec![give_up]);
            guarded(
                vec![target_online()],
                vec![allow_connection()],
                vec![launch, wait, allow_once_online],
            )
        }
    }
}
