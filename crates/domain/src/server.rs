//! Managed server lifecycle state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Normalised lifecycle state of a managed backend server.
///
/// Control backends map their own states onto this set; backends that
/// cannot report state are described as [`Online`](Self::Online) or
/// [`Offline`](Self::Offline) from a ping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ServerState {
    #[default]
    Unknown = 0,
    Offline = 1,
    Starting = 2,
    Stopping = 3,
    Restarting = 4,
    Online = 5,
    Failed = 6,
}

impl ServerState {
    /// Lowercase name used in logs, templates and configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Offline => "offline",
            Self::Starting => "starting",
            Self::Stopping => "stopping",
            Self::Restarting => "restarting",
            Self::Online => "online",
            Self::Failed => "failed",
        }
    }

    /// Inverse of the `repr(u8)` discriminant; out-of-range values map to
    /// [`Unknown`](Self::Unknown).
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Offline,
            2 => Self::Starting,
            3 => Self::Stopping,
            4 => Self::Restarting,
            5 => Self::Online,
            6 => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// State derived from a reachability check.
    #[must_use]
    pub fn from_online(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The input did not name a known state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown server state '{0}'")]
pub struct UnknownServerState(pub String);

impl FromStr for ServerState {
    type Err = UnknownServerState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "offline" => Ok(Self::Offline),
            "starting" => Ok(Self::Starting),
            "stopping" => Ok(Self::Stopping),
            "restarting" => Ok(Self::Restarting),
            "online" => Ok(Self::Online),
            "failed" => Ok(Self::Failed),
            _ => Err(UnknownServerState(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_state_case_insensitively() {
        assert_eq!("ONLINE".parse::<ServerState>(), Ok(ServerState::Online));
        assert_eq!(" starting ".parse::<ServerState>(), Ok(ServerState::Starting));
        assert!("booting".parse::<ServerState>().is_err());
    }

    #[test]
    fn should_roundtrip_through_u8_discriminant() {
        for state in [
            ServerState::Unknown,
            ServerState::Offline,
            ServerState::Starting,
            ServerState::Stopping,
            ServerState::Restarting,
            ServerState::Online,
            ServerState::Failed,
        ] {
            assert_eq!(ServerState::from_u8(state as u8), state);
        }
        assert_eq!(ServerState::from_u8(200), ServerState::Unknown);
    }

    #[test]
    fn should_serialize_in_snake_case() {
        let json = serde_json::to_string(&ServerState::Restarting).unwrap();
        assert_eq!(json, "\"restarting\"");
    }

    #[test]
    fn should_derive_state_from_ping_result() {
        assert_eq!(ServerState::from_online(true), ServerState::Online);
        assert_eq!(ServerState::from_online(false), ServerState::Offline);
    }
}
