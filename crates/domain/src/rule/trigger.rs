//! Trigger configuration — what causes a rule to fire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::filter::ListFilter;

/// Declarative description of a trigger.
///
/// Turned into a live trigger by the application layer; validation of
/// values that need parsing (cron expressions, durations) happens there,
/// at activation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Fired on demand through the engine (`fire_manual`).
    Manual { id: String },
    /// Fired on a cron schedule.
    Cron {
        expression: String,
        /// Dialect name; unknown dialects fall back to unix.
        #[serde(default)]
        format: Option<String>,
        /// IANA zone or UTC offset; defaults to UTC.
        #[serde(default)]
        time_zone: Option<String>,
    },
    /// Fired when a player tries to connect to a backend server.
    Connection {
        #[serde(default)]
        server_list: ListFilter,
        #[serde(default)]
        player_list: ListFilter,
        /// Hold the connection denied until the rule allows it or finishes.
        #[serde(default)]
        deny_connection: bool,
    },
    /// Fired when a client pings the proxy.
    Ping {
        #[serde(default)]
        server_list: ListFilter,
        #[serde(default)]
        virtual_host_list: ListFilter,
        /// Hold the ping response until the rule releases it or finishes.
        #[serde(default)]
        hold_response: bool,
    },
    /// Fired when a server has had no players for `empty_time`.
    EmptyServer {
        #[serde(default = "default_empty_time")]
        empty_time: String,
        #[serde(default)]
        server_list: ListFilter,
    },
    /// Fired once the proxy has started.
    ProxyStart,
    /// Fired when the proxy shuts down.
    ProxyShutdown,
}

fn default_empty_time() -> String {
    "15m".to_string()
}

impl TriggerConfig {
    /// Configuration name of this trigger kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Manual { .. } => "manual",
            Self::Cron { .. } => "cron",
            Self::Connection { .. } => "connection",
            Self::Ping { .. } => "ping",
            Self::EmptyServer { .. } => "empty_server",
            Self::ProxyStart => "proxy_start",
            Self::ProxyShutdown => "proxy_shutdown",
        }
    }
}

impl fmt::Display for TriggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual { id } => write!(f, "manual({id})"),
            Self::Cron { expression, .. } => write!(f, "cron({expression})"),
            Self::EmptyServer { empty_time, .. } => write!(f, "empty_server({empty_time})"),
            other => f.write_str(other.kind()),
        }
    }
}

/// Supported cron dialects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronFormat {
    /// `min hour dom month dow`, Sunday is 0 or 7.
    #[default]
    Unix,
    /// `sec min hour dom month dow [year]`, `?` allowed, Sunday is 1.
    Quartz,
    /// Same shape as unix.
    Cron4j,
    /// `sec min hour dom month dow`, Sunday is 0 or 7.
    Spring,
    /// Spring 5.3 flavour; same shape as spring.
    Spring53,
}

impl CronFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unix => "unix",
            Self::Quartz => "quartz",
            Self::Cron4j => "cron4j",
            Self::Spring => "spring",
            Self::Spring53 => "spring53",
        }
    }
}

impl fmt::Display for CronFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The input did not name a known cron dialect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cron format '{0}'")]
pub struct UnknownCronFormat(pub String);

impl FromStr for CronFormat {
    type Err = UnknownCronFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "unix" => Ok(Self::Unix),
            "quartz" => Ok(Self::Quartz),
            "cron4j" => Ok(Self::Cron4j),
            "spring" => Ok(Self::Spring),
            "spring53" | "spring_53" => Ok(Self::Spring53),
            _ => Err(UnknownCronFormat(s.to_string())),
        }
    }
}
