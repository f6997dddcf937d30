//! Line console on stdin.
//!
//! ```text
//! trigger <id> [args...]   fire manual triggers
//! join <player> <server>   connect a simulated player
//! leave <player>           disconnect a simulated player
//! ping [virtual-host]      ping the proxy
//! status                   servers, players and startups
//! reload                   reload rules from the config file
//! quit                     shut down
//! ```

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use autostart_adapter_virtual::{JoinOutcome, PingReply};
use autostart_app::ports::ProxyView;
use autostart_domain::event::Player;

use crate::Daemon;

const HELP: &str = "commands: trigger <id> [args...] | join <player> <server> | leave <player> | ping [virtual-host] | status | reload | quit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Trigger { id: String, args: Vec<String> },
    Join { player: String, server: String },
    Leave { player: String },
    Ping { virtual_host: Option<String> },
    Status,
    Reload,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(Self::Help);
        };
        let rest: Vec<String> = words.map(str::to_string).collect();
        match (verb.to_ascii_lowercase().as_str(), rest.as_slice()) {
            ("trigger", [id, args @ ..]) => Ok(Self::Trigger {
                id: id.clone(),
                args: args.to_vec(),
            }),
            ("trigger", _) => Err(CommandError::Usage("trigger <id> [args...]")),
            ("join", [player, server]) => Ok(Self::Join {
                player: player.clone(),
                server: server.clone(),
            }),
            ("join", _) => Err(CommandError::Usage("join <player> <server>")),
            ("leave", [player]) => Ok(Self::Leave {
                player: player.clone(),
            }),
            ("leave", _) => Err(CommandError::Usage("leave <player>")),
            ("ping", []) => Ok(Self::Ping { virtual_host: None }),
            ("ping", [host]) => Ok(Self::Ping {
                virtual_host: Some(host.clone()),
            }),
            ("ping", _) => Err(CommandError::Usage("ping [virtual-host]")),
            ("status", _) => Ok(Self::Status),
            ("reload", _) => Ok(Self::Reload),
            ("help", _) => Ok(Self::Help),
            ("quit" | "exit" | "stop", _) => Ok(Self::Quit),
            (other, _) => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Why the console stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Quit,
    EndOfInput,
}

/// Read commands from `input` until `quit` or end of input, answering on
/// `output`.
///
/// # Errors
///
/// Returns the IO error of `input` or `output`.
pub async fn run<R, W>(daemon: Arc<Daemon>, input: R, mut output: W) -> std::io::Result<Exit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match line.parse::<Command>() {
            Ok(Command::Quit) => return Ok(Exit::Quit),
            Ok(command) => execute(&daemon, command).await,
            Err(err) => err.to_string(),
        };
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(Exit::EndOfInput)
}

/// Run one command and describe the result.
#[tracing::instrument(skip(daemon))]
pub async fn execute(daemon: &Daemon, command: Command) -> String {
    match command {
        Command::Trigger { id, args } => {
            let fired = daemon.engine().fire_manual(&id, &args);
            if fired == 0 {
                let known = daemon.engine().manual_trigger_ids();
                format!("no active manual trigger '{id}' (known: {})", known.join(", "))
            } else {
                format!("fired {fired} manual trigger(s) with id '{id}'")
            }
        }
        Command::Join { player, server } => {
            match daemon.proxy().join(Player::new(player.as_str(), Uuid::new_v4()), &server).await {
                JoinOutcome::Joined(on) => format!("{player} joined {on}"),
                JoinOutcome::Denied => format!("{player} was denied"),
                JoinOutcome::Unreachable(on) => format!("{player} could not reach {on}"),
            }
        }
        Command::Leave { player } => match daemon.proxy().leave(&player) {
            Some(server) => format!("{player} left {server}"),
            None => format!("{player} is not connected"),
        },
        Command::Ping { virtual_host } => {
            match daemon
                .proxy()
                .ping_proxy(Some("127.0.0.1".to_string()), virtual_host)
                .await
            {
                PingReply::Answered(response) => format!(
                    "{} [{}/{}] {}",
                    response.version_name,
                    response.online_players,
                    response.max_players,
                    response.motd
                ),
                PingReply::Dropped => "ping dropped".to_string(),
            }
        }
        Command::Status => status(daemon).await,
        Command::Reload => match daemon.reload() {
            Ok(summary) => format!(
                "reloaded: {} loaded, {} disabled, {} failed",
                summary.loaded, summary.disabled, summary.failed
            ),
            Err(err) => format!("reload failed: {err}"),
        },
        Command::Help | Command::Quit => HELP.to_string(),
    }
}

async fn status(daemon: &Daemon) -> String {
    let engine = daemon.engine();
    let tracker = engine.tracker();
    let proxy = daemon.proxy();
    let mut out = String::new();
    for server in proxy.server_names() {
        let players = proxy.players(&server);
        let state = if engine.servers().has_server(&server) {
            tracker.server_state(&server).await.to_string()
        } else {
            "unmanaged".to_string()
        };
        let _ = write!(out, "{server}: {state}, {} player(s)", players.len());
        if !players.is_empty() {
            let _ = write!(out, " [{}]", players.join(", "));
        }
        if tracker.is_starting(&server) {
            let _ = write!(
                out,
                ", starting {} ({}%)",
                tracker.startup_timer(&server),
                tracker.progress_percentage(&server)
            );
        }
        out.push('\n');
    }
    let _ = write!(out, "rules: {}", engine.rule_names().join(", "));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_trigger_with_arguments() {
        assert_eq!(
            "trigger restart survival now".parse::<Command>(),
            Ok(Command::Trigger {
                id: "restart".to_string(),
                args: vec!["survival".to_string(), "now".to_string()],
            })
        );
    }

    #[test]
    fn should_parse_ping_with_optional_host() {
        assert_eq!("ping".parse::<Command>(), Ok(Command::Ping { virtual_host: None }));
        assert_eq!(
            "PING play.example.com".parse::<Command>(),
            Ok(Command::Ping {
                virtual_host: Some("play.example.com".to_string())
            })
        );
    }

    #[test]
    fn should_report_usage_when_arguments_missing() {
        assert_eq!(
            "join alex".parse::<Command>(),
            Err(CommandError::Usage("join <player> <server>"))
        );
        assert_eq!(
            "trigger".parse::<Command>(),
            Err(CommandError::Usage("trigger <id> [args...]"))
        );
    }

    #[test]
    fn should_reject_unknown_command() {
        assert_eq!(
            "dance".parse::<Command>(),
            Err(CommandError::Unknown("dance".to_string()))
        );
        assert_eq!("quit".parse::<Command>(), Ok(Command::Quit));
    }
}
