//! Configuration type definitions.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

/// Wildcard channel name meaning "any channel of this bot".
pub const EVERY_CHANNEL: &str = "*";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Bot id -> adapter settings.
    pub bots: BTreeMap<String, BotConfig>,
    /// Channel key -> platform channel and owning bot.
    pub channels: BTreeMap<String, ChannelConfig>,
    /// Groups of channel keys that mirror each other.
    #[serde(default)]
    pub bridges: Vec<Vec<String>>,
    pub filters: Option<FiltersConfig>,
}

/// Correlation ledger storage.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Drop the ledger tables on clean shutdown.
    #[serde(default = "default_true")]
    pub purge_on_shutdown: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            purge_on_shutdown: true,
        }
    }
}

fn default_database_url() -> String {
    "sqlite://ferryman.db?mode=rwc".to_string()
}

fn default_true() -> bool {
    true
}

/// A configured bot (one adapter instance).
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Adapter type tag, looked up in the adapter registry.
    #[serde(rename = "type")]
    pub kind: String,
    pub token: Option<String>,
    /// Adapter specific extras.
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

/// A channel owned by one bot.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Platform-native channel id, or `*` for every channel of the bot.
    pub name: String,
    /// Owning bot id.
    pub bot: String,
}

impl ChannelConfig {
    pub fn is_wildcard(&self) -> bool {
        self.name == EVERY_CHANNEL
    }
}

/// Message filtering configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FiltersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub patterns: Option<Vec<String>>,
}

impl Config {
    /// Native channel ids owned by a bot (wildcards excluded).
    pub fn channels_for_bot(&self, bot_id: &str) -> Vec<String> {
        self.channels
            .values()
            .filter(|c| c.bot == bot_id && !c.is_wildcard())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Patterns of the relay filter, if filtering is enabled.
    pub fn filter_patterns(&self) -> Option<Vec<String>> {
        match &self.filters {
            Some(f) if f.enabled => f.patterns.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Two bots with one channel each, bridged together.
    pub fn two_bot_config() -> Config {
        let mut bots = BTreeMap::new();
        bots.insert(
            "A".to_string(),
            BotConfig {
                kind: "discord".to_string(),
                token: Some("token-a".to_string()),
                settings: HashMap::new(),
            },
        );
        bots.insert(
            "B".to_string(),
            BotConfig {
                kind: "discord".to_string(),
                token: Some("token-b".to_string()),
                settings: HashMap::new(),
            },
        );

        let mut channels = BTreeMap::new();
        channels.insert(
            "a1".to_string(),
            ChannelConfig {
                name: "a1".to_string(),
                bot: "A".to_string(),
            },
        );
        channels.insert(
            "b1".to_string(),
            ChannelConfig {
                name: "b1".to_string(),
                bot: "B".to_string(),
            },
        );

        Config {
            database: DatabaseConfig::default(),
            bots,
            channels,
            bridges: vec![vec!["a1".to_string(), "b1".to_string()]],
            filters: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_for_bot_skips_wildcards() {
        let mut config = fixtures::two_bot_config();
        config.channels.insert(
            "all_a".to_string(),
            ChannelConfig {
                name: EVERY_CHANNEL.to_string(),
                bot: "A".to_string(),
            },
        );

        assert_eq!(config.channels_for_bot("A"), vec!["a1".to_string()]);
        assert!(config.channels_for_bot("C").is_empty());
    }

    #[test]
    fn test_filter_patterns_respect_enabled() {
        let mut config = fixtures::two_bot_config();
        assert!(config.filter_patterns().is_none());

        config.filters = Some(FiltersConfig {
            enabled: false,
            patterns: Some(vec!["spam".to_string()]),
        });
        assert!(config.filter_patterns().is_none());

        config.filters = Some(FiltersConfig {
            enabled: true,
            patterns: Some(vec!["spam".to_string()]),
        });
        assert_eq!(config.filter_patterns(), Some(vec!["spam".to_string()]));
    }
}
