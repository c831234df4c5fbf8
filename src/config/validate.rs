//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use fancy_regex::Regex;

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.database.url.is_empty() {
        errors.push("database.url is required".to_string());
    }

    if config.bots.is_empty() {
        errors.push("bots is empty - no adapters configured".to_string());
    }
    for (id, bot) in &config.bots {
        if bot.kind.is_empty() {
            errors.push(format!("bots.{}.type is required", id));
        }
    }

    for (key, channel) in &config.channels {
        if channel.name.is_empty() {
            errors.push(format!("channels.{}.name is required", key));
        }
        if !config.bots.contains_key(&channel.bot) {
            errors.push(format!(
                "channels.{}.bot '{}' does not name a configured bot",
                key, channel.bot
            ));
        }
    }

    for (i, group) in config.bridges.iter().enumerate() {
        if group.len() < 2 {
            errors.push(format!("bridges[{}] must contain at least two channels", i));
        }
        for key in group {
            if !config.channels.contains_key(key) {
                errors.push(format!("bridges[{}] references unknown channel '{}'", i, key));
            }
        }
    }

    if let Some(ref filters) = config.filters {
        if let Some(ref patterns) = filters.patterns {
            for (i, pattern) in patterns.iter().enumerate() {
                if Regex::new(pattern).is_err() {
                    errors.push(format!(
                        "filters.patterns[{}] is not a valid regex: '{}'",
                        i, pattern
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::fixtures::two_bot_config;
    use crate::config::types::{ChannelConfig, FiltersConfig};

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&two_bot_config()).is_ok());
    }

    #[test]
    fn test_unknown_bot_fails() {
        let mut config = two_bot_config();
        config.channels.insert(
            "c1".to_string(),
            ChannelConfig {
                name: "c1".to_string(),
                bot: "C".to_string(),
            },
        );

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("channels.c1.bot"));
    }

    #[test]
    fn test_unknown_bridge_channel_fails() {
        let mut config = two_bot_config();
        config.bridges.push(vec!["a1".to_string(), "missing".to_string()]);

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("unknown channel 'missing'"));
    }

    #[test]
    fn test_single_channel_group_fails() {
        let mut config = two_bot_config();
        config.bridges.push(vec!["a1".to_string()]);

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("at least two"));
    }

    #[test]
    fn test_invalid_regex_filter_fails() {
        let mut config = two_bot_config();
        config.filters = Some(FiltersConfig {
            enabled: true,
            patterns: Some(vec!["[invalid".to_string()]),
        });

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("not a valid regex"));
    }

    #[test]
    fn test_all_errors_reported_together() {
        let mut config = two_bot_config();
        config.database.url = String::new();
        config.bridges.push(vec!["nope".to_string()]);

        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("database.url"));
        assert!(message.contains("at least two"));
        assert!(message.contains("unknown channel 'nope'"));
    }
}
