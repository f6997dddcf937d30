//! Name filters used by triggers (`server_list`, `player_list`, `virtual_host_list`).

use serde::{Deserialize, Serialize};

/// How a [`ListFilter`] interprets its entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Only listed names match.
    #[default]
    Whitelist,
    /// Every name except the listed ones matches.
    Blacklist,
    /// Every name matches.
    Disabled,
}

/// A whitelist/blacklist over names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
    pub mode: FilterMode,
    #[serde(alias = "servers", alias = "players", alias = "virtual_hosts")]
    pub entries: Vec<String>,
}

impl ListFilter {
    #[must_use]
    pub fn new(mode: FilterMode, entries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            mode,
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// A filter with no entries matches everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.matches_by(|entry| entry == name)
    }

    /// Case-insensitive variant, used for virtual host names.
    #[must_use]
    pub fn matches_ignore_case(&self, name: &str) -> bool {
        self.matches_by(|entry| entry.eq_ignore_ascii_case(name))
    }

    fn matches_by(&self, eq: impl Fn(&str) -> bool) -> bool {
        if self.is_empty() {
            return true;
        }
        let listed = self.entries.iter().any(|entry| eq(entry));
        match self.mode {
            FilterMode::Whitelist => listed,
            FilterMode::Blacklist => !listed,
            FilterMode::Disabled => true,
        }
    }
}
