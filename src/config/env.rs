//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `FERRYMAN_CONFIG` - Config file path
//! - `FERRYMAN_DATABASE_URL` - Correlation ledger database URL
//! - `FERRYMAN_BOT_<ID>_TOKEN` - Token of the bot `<id>` (uppercased, `-` becomes `_`)

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "FERRYMAN";

/// Apply environment variable overrides to a config.
///
/// This allows tokens to be provided via environment variables instead of
/// the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(url) = env::var(format!("{}_DATABASE_URL", ENV_PREFIX)) {
        config.database.url = url;
    }

    for (bot_id, bot) in config.bots.iter_mut() {
        if let Ok(token) = env::var(bot_token_var(bot_id)) {
            bot.token = Some(token);
        }
    }

    config
}

/// Name of the token override variable for a bot.
pub fn bot_token_var(bot_id: &str) -> String {
    format!(
        "{}_BOT_{}_TOKEN",
        ENV_PREFIX,
        bot_id.to_uppercase().replace('-', "_")
    )
}

/// Get the config file path from environment or use default.
///
/// Checks `FERRYMAN_CONFIG` environment variable, otherwise returns "ferryman.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "ferryman.conf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::fixtures::two_bot_config;

    #[test]
    fn test_bot_token_var() {
        assert_eq!(bot_token_var("discord-main"), "FERRYMAN_BOT_DISCORD_MAIN_TOKEN");
    }

    #[test]
    fn test_get_config_path_default() {
        env::remove_var("FERRYMAN_CONFIG");
        assert_eq!(get_config_path(), "ferryman.conf");
    }

    #[test]
    fn test_token_override() {
        env::set_var("FERRYMAN_BOT_B_TOKEN", "from-env");
        let config = apply_env_overrides(two_bot_config());
        env::remove_var("FERRYMAN_BOT_B_TOKEN");

        assert_eq!(config.bots["A"].token.as_deref(), Some("token-a"));
        assert_eq!(config.bots["B"].token.as_deref(), Some("from-env"));
    }
}
