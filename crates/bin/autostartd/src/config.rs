//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `autostart.toml` in the working directory, or the file named
//! by `AUTOSTART_CONFIG`. Every field has a sensible default so the file
//! is optional. Environment variables take precedence over file values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use autostart_adapter_virtual::{DEFAULT_STARTUP_TIME, SimulationSettings};
use autostart_app::engine::EngineSettings;
use autostart_app::servers::{PingMethod, ServerSettings, StartupTimerSettings};
use autostart_domain::duration::{format_duration, parse_duration};
use autostart_domain::error::AutoStartError;
use autostart_domain::rule::{RuleConfig, RulePreset};

/// Config file read when `AUTOSTART_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "autostart.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub settings: SettingsConfig,
    /// Servers registered with the proxy, by name.
    pub servers: BTreeMap<String, ServerConfig>,
    /// Rules, by name. A table with a `template` key is a [`RulePreset`].
    #[serde(deserialize_with = "rule_tables")]
    pub rules: BTreeMap<String, RuleConfig>,
}

fn rule_tables<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, RuleConfig>, D::Error> {
    BTreeMap::<String, toml::Table>::deserialize(deserializer)?
        .into_iter()
        .map(|(name, table)| {
            let rule = rule_from_table(&name, table)
                .map_err(|reason| D::Error::custom(format!("rule '{name}': {reason}")))?;
            Ok((name, rule))
        })
        .collect()
}

fn rule_from_table(name: &str, mut table: toml::Table) -> Result<RuleConfig, String> {
    if !table.contains_key("template") {
        return toml::Value::Table(table)
            .try_into()
            .map_err(|err: toml::de::Error| err.message().to_string());
    }
    let enabled = match table.remove("enabled") {
        None => true,
        Some(toml::Value::Boolean(enabled)) => enabled,
        Some(other) => return Err(format!("'enabled' must be a boolean, found {other}")),
    };
    let preset: RulePreset = toml::Value::Table(table)
        .try_into()
        .map_err(|err: toml::de::Error| err.message().to_string())?;
    tracing::debug!(rule = name, template = preset.kind(), "expanding rule template");
    preset
        .expand(name, enabled)
        .map_err(|err| rule_error(&err))
}

/// The validation detail rather than the top-level category.
fn rule_error(err: &AutoStartError) -> String {
    std::error::Error::source(err).map_or_else(|| err.to_string(), ToString::to_string)
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Engine-wide settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Interval of the empty-server sweep; `0` disables it.
    pub empty_server_check_interval: String,
    /// How long `proxy_shutdown` rules may run.
    pub shutdown_timeout: String,
    pub history_file: PathBuf,
    pub event_bus_capacity: usize,
}

/// One server known to the proxy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Start, stop and track this server. Unmanaged servers are always up.
    pub managed: bool,
    pub virtual_hosts: Vec<String>,
    pub ping: PingConfig,
    pub startup_timer: Option<StartupTimerConfig>,
    pub simulation: SimulationConfig,
}

/// Reachability checks of one server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    pub timeout: String,
    /// `proxy` or `control_api`.
    pub method: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StartupTimerConfig {
    pub expected_startup_time: Option<String>,
    pub auto_calculate_expected_startup_time: bool,
}

/// How the virtual backend of a server behaves.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub startup_time: String,
    /// Already running when the daemon starts.
    pub running: bool,
    pub supports_state: bool,
    pub supports_commands: bool,
}

impl Config {
    /// Load configuration from `AUTOSTART_CONFIG` or `autostart.toml` (if
    /// present) then apply environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the result does not validate.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::path())
    }

    /// Path of the configuration file in use.
    #[must_use]
    pub fn path() -> PathBuf {
        std::env::var_os("AUTOSTART_CONFIG")
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }

    /// Like [`Config::load`] for an explicit path.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path.as_ref())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Parse TOML text. Rule names are filled in from their table keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        for (name, rule) in &mut config.rules {
            rule.name.clone_from(name);
        }
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AUTOSTART_HISTORY_FILE") {
            self.settings.history_file = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("AUTOSTART_EMPTY_CHECK_INTERVAL") {
            self.settings.empty_server_check_interval = val;
        }
        if let Ok(val) = std::env::var("AUTOSTART_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    /// Check every value that needs parsing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine_settings()?;
        if self.settings.event_bus_capacity == 0 {
            return Err(ConfigError::Validation(
                "event_bus_capacity must be non-zero".to_string(),
            ));
        }
        for name in self.servers.keys() {
            self.server_settings(name)?;
            self.simulation_settings(name)?;
        }
        for rule in self.rules.values() {
            rule.validate()
                .map_err(|err| {
                    ConfigError::Validation(format!("rule '{}': {}", rule.name, rule_error(&err)))
                })?;
        }
        Ok(())
    }

    /// Rules in name order.
    #[must_use]
    pub fn rules(&self) -> Vec<RuleConfig> {
        self.rules.values().cloned().collect()
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for unparsable durations.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        Ok(EngineSettings {
            empty_check_interval: duration(
                "settings.empty_server_check_interval",
                &self.settings.empty_server_check_interval,
            )?,
            shutdown_timeout: duration("settings.shutdown_timeout", &self.settings.shutdown_timeout)?,
        })
    }

    /// Engine settings of the named server; defaults for unknown names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an unparsable ping timeout,
    /// ping method or expected startup time.
    pub fn server_settings(&self, name: &str) -> Result<ServerSettings, ConfigError> {
        let Some(server) = self.servers.get(name) else {
            return Ok(ServerSettings::default());
        };
        let ping_method: PingMethod = server
            .ping
            .method
            .parse()
            .map_err(|err| ConfigError::Validation(format!("servers.{name}.ping.method: {err}")))?;
        let startup_timer = match &server.startup_timer {
            Some(timer) => Some(StartupTimerSettings {
                expected: timer
                    .expected_startup_time
                    .as_deref()
                    .map(|text| {
                        duration(
                            &format!("servers.{name}.startup_timer.expected_startup_time"),
                            text,
                        )
                    })
                    .transpose()?,
                auto_calculate: timer.auto_calculate_expected_startup_time,
            }),
            None => None,
        };
        Ok(ServerSettings {
            ping_timeout: duration(&format!("servers.{name}.ping.timeout"), &server.ping.timeout)?,
            ping_method,
            startup_timer,
        })
    }

    /// Behaviour of the named server's virtual backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an unparsable startup time.
    pub fn simulation_settings(&self, name: &str) -> Result<SimulationSettings, ConfigError> {
        let Some(server) = self.servers.get(name) else {
            return Ok(SimulationSettings::default());
        };
        Ok(SimulationSettings {
            startup_time: duration(
                &format!("servers.{name}.simulation.startup_time"),
                &server.simulation.startup_time,
            )?,
            supports_state: server.simulation.supports_state,
            supports_commands: server.simulation.supports_commands,
        })
    }
}

fn duration(field: &str, text: &str) -> Result<Duration, ConfigError> {
    parse_duration(text)
        .map_err(|err| ConfigError::Validation(format!("{field}: {err} ('{text}')")))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "autostartd=info,autostart_app=info,autostart_adapter_virtual=info".to_string(),
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            empty_server_check_interval: "5m".to_string(),
            shutdown_timeout: "10s".to_string(),
            history_file: PathBuf::from("startup_times.txt"),
            event_bus_capacity: 256,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            managed: true,
            virtual_hosts: Vec::new(),
            ping: PingConfig::default(),
            startup_timer: None,
            simulation: SimulationConfig::default(),
        }
    }
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            timeout: "30s".to_string(),
            method: "proxy".to_string(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            startup_time: format_duration(DEFAULT_STARTUP_TIME),
            running: false,
            supports_state: false,
            supports_commands: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use autostart_domain::rule::{ActionKind, TriggerConfig};

    use super::*;

    const FULL: &str = r#"
        [logging]
        filter = "debug"

        [settings]
        empty_server_check_interval = "30s"
        shutdown_timeout = "5s"
        history_file = "data/times.txt"
        event_bus_capacity = 64

        [servers.lobby]
        managed = false
        virtual_hosts = ["lobby.example.com"]

        [servers.survival]
        virtual_hosts = ["play.example.com"]
        ping = { timeout = "2s", method = "control_api" }
        startup_timer = { expected_startup_time = "40s", auto_calculate_expected_startup_time = true }
        simulation = { startup_time = "3s", supports_commands = true }

        [rules.wake_on_join]
        triggers = [
            { type = "connection", server_list = { entries = ["survival"] }, deny_connection = true },
        ]
        actions = [
            { type = "start", server = "${connection.server}" },
            { type = "allow_connection" },
        ]

        [rules.nightly]
        enabled = false
        triggers = [{ type = "cron", expression = "0 4 * * *" }]
        actions = [{ type = "restart", server = "survival" }]
    "#;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.settings.empty_server_check_interval, "5m");
        assert_eq!(config.settings.history_file, PathBuf::from("startup_times.txt"));
        assert_eq!(config.settings.event_bus_capacity, 256);
        assert!(config.servers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.settings.shutdown_timeout, "10s");
        assert!(config.rules.is_empty());
    }

    #[test]
    fn should_parse_full_toml() {
        let config = Config::parse(FULL).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.settings.event_bus_capacity, 64);
        assert!(!config.servers["lobby"].managed);
        assert!(config.servers["survival"].managed);
        assert!(config.validate().is_ok());

        let engine = config.engine_settings().unwrap();
        assert_eq!(engine.empty_check_interval, Duration::from_secs(30));
        assert_eq!(engine.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn should_name_rules_after_their_table_keys() {
        let config = Config::parse(FULL).unwrap();
        let rules = config.rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, "nightly");
        assert!(!rules[0].enabled);
        assert_eq!(rules[1].name, "wake_on_join");
        assert!(matches!(
            rules[1].triggers[0],
            TriggerConfig::Connection {
                deny_connection: true,
                ..
            }
        ));
        assert!(matches!(rules[1].actions[0].kind, ActionKind::Start { .. }));
    }

    #[test]
    fn should_convert_server_sections_into_settings() {
        let config = Config::parse(FULL).unwrap();
        let survival = config.server_settings("survival").unwrap();
        assert_eq!(survival.ping_timeout, Duration::from_secs(2));
        assert_eq!(survival.ping_method, PingMethod::ControlApi);
        assert_eq!(
            survival.startup_timer,
            Some(StartupTimerSettings {
                expected: Some(Duration::from_secs(40)),
                auto_calculate: true,
            })
        );

        let simulation = config.simulation_settings("survival").unwrap();
        assert_eq!(simulation.startup_time, Duration::from_secs(3));
        assert!(simulation.supports_commands);
        assert!(!simulation.supports_state);

        let lobby = config.server_settings("lobby").unwrap();
        assert_eq!(lobby, ServerSettings::default());
    }

    #[test]
    fn should_reject_unparsable_check_interval() {
        let mut config = Config::default();
        config.settings.empty_server_check_interval = "soon".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("empty_server_check_interval"));
    }

    #[test]
    fn should_reject_unknown_ping_method() {
        let config = Config::parse(
            "
            [servers.survival]
            ping = { method = 'carrier_pigeon' }
        ",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_rule_without_actions() {
        let config = Config::parse(
            "
            [rules.empty]
            triggers = [{ type = 'proxy_start' }]
        ",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rule 'empty'"));
    }

    #[test]
    fn should_expand_rule_templates_while_loading() {
        let config = Config::parse(
            "
            [rules.idle]
            template = 'stop_on_empty'
            empty_time = '5m'
            servers = ['survival']

            [rules.boot]
            template = 'start_on_proxy_start'
            enabled = false
            servers = ['lobby', 'survival']

            [rules.halt]
            template = 'stop_on_proxy_shutdown'
            servers = ['survival']

            [rules.join]
            template = 'start_on_connection'
            servers = ['survival']
            mode = 'hold'
        ",
        )
        .unwrap();
        assert!(config.validate().is_ok());
        let rules = config.rules();
        let names: Vec<_> = rules.iter().map(|rule| rule.name.as_str()).collect();
        assert_eq!(names, ["boot", "halt", "idle", "join"]);

        assert!(!rules[0].enabled);
        assert_eq!(rules[0].triggers, vec![TriggerConfig::ProxyStart]);
        assert_eq!(rules[0].actions.len(), 2);
        assert_eq!(rules[1].triggers, vec![TriggerConfig::ProxyShutdown]);
        assert!(matches!(
            &rules[2].triggers[0],
            TriggerConfig::EmptyServer { empty_time, .. } if empty_time == "5m"
        ));
        assert!(matches!(rules[2].actions[0].kind, ActionKind::Stop { .. }));
        assert!(matches!(
            rules[3].triggers[0],
            TriggerConfig::Connection {
                deny_connection: true,
                ..
            }
        ));
        assert!(matches!(rules[3].actions[0].kind, ActionKind::If(_)));
    }

    #[test]
    fn should_name_template_rule_in_expansion_error() {
        let result = Config::parse(
            "
            [rules.idle]
            template = 'stop_on_empty'
            servers = []
        ",
        );
        let Err(ConfigError::Parse(err)) = result else {
            panic!("expected a parse error");
        };
        let message = err.message();
        assert!(message.contains("rule 'idle'"), "{message}");
        assert!(message.contains("servers"), "{message}");
    }

    #[test]
    fn should_reject_unknown_template() {
        let result = Config::parse(
            "
            [rules.odd]
            template = 'stop_on_full_moon'
            servers = ['survival']
        ",
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file(Path::new("nonexistent.toml")).unwrap();
        assert_eq!(config.settings.event_bus_capacity, 256);
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        assert!(matches!(Config::parse("invalid {{{"), Err(ConfigError::Parse(_))));
    }
}
