//! Discord markup resolution for mirrored text.
//!
//! Other platforms cannot render Discord's `<@id>`, `<#id>` or `<:name:id>`
//! tokens, so inbound content is rewritten to plain text before relaying.

use fancy_regex::{Captures, Regex};
use serenity::cache::Cache;
use serenity::model::id::ChannelId;
use serenity::model::user::User;

/// Rewrites Discord-specific tokens into readable text.
#[derive(Debug, Clone)]
pub struct MarkupResolver {
    /// Pattern for user mentions (<@123> or <@!123>).
    mention_pattern: Regex,
    /// Pattern for channel mentions (<#123>).
    channel_pattern: Regex,
    /// Pattern for custom emojis (<:name:id> or <a:name:id>).
    emoji_pattern: Regex,
}

impl Default for MarkupResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkupResolver {
    pub fn new() -> Self {
        Self {
            mention_pattern: Regex::new(r"<@!?(\d+)>").unwrap(),
            channel_pattern: Regex::new(r"<#(\d+)>").unwrap(),
            emoji_pattern: Regex::new(r"<a?:([a-zA-Z0-9_]+):\d+>").unwrap(),
        }
    }

    /// Convert user mentions to `@name`, using the users the message mentions.
    pub fn resolve_mentions(&self, message: &str, mentioned: &[User]) -> String {
        self.mention_pattern
            .replace_all(message, |caps: &Captures| -> String {
                caps[1]
                    .parse::<u64>()
                    .ok()
                    .and_then(|id| mentioned.iter().find(|user| user.id.get() == id))
                    .map(|user| format!("@{}", user.name))
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .to_string()
    }

    /// Convert channel mentions to `#name` when the channel is cached.
    pub fn resolve_channel_mentions(&self, message: &str, cache: &Cache) -> String {
        self.channel_pattern
            .replace_all(message, |caps: &Captures| -> String {
                if let Ok(channel_id) = caps[1].parse::<u64>() {
                    if channel_id != 0 {
                        let channel_id = ChannelId::new(channel_id);
                        for guild_id in cache.guilds() {
                            if let Some(guild) = cache.guild(guild_id) {
                                if let Some(channel) = guild.channels.get(&channel_id) {
                                    return format!("#{}", channel.name);
                                }
                            }
                        }
                    }
                }
                caps[0].to_string()
            })
            .to_string()
    }

    /// Convert custom emojis to `:name:`.
    pub fn resolve_custom_emojis(&self, message: &str) -> String {
        self.emoji_pattern.replace_all(message, ":$1:").to_string()
    }

    /// Full inbound pipeline.
    pub fn to_plain_text(&self, message: &str, mentioned: &[User], cache: &Cache) -> String {
        let resolved = self.resolve_mentions(message, mentioned);
        let resolved = self.resolve_channel_mentions(&resolved, cache);
        self.resolve_custom_emojis(&resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::model::id::UserId;

    fn user(id: u64, name: &str) -> User {
        let mut user = User::default();
        user.id = UserId::new(id);
        user.name = name.to_string();
        user
    }

    #[test]
    fn test_resolve_mentions() {
        let resolver = MarkupResolver::new();
        let mentioned = vec![user(42, "alice"), user(7, "bob")];

        let output = resolver.resolve_mentions("hi <@42> and <@!7>", &mentioned);
        assert_eq!(output, "hi @alice and @bob");
    }

    #[test]
    fn test_unknown_mention_kept() {
        let resolver = MarkupResolver::new();
        let output = resolver.resolve_mentions("hi <@99>", &[user(42, "alice")]);
        assert_eq!(output, "hi <@99>");
    }

    #[test]
    fn test_resolve_custom_emojis() {
        let resolver = MarkupResolver::new();
        let input = "Hello <:pepega:123456789> world <a:animated:987654321>";
        assert_eq!(resolver.resolve_custom_emojis(input), "Hello :pepega: world :animated:");
    }

    #[test]
    fn test_uncached_channel_mention_kept() {
        let resolver = MarkupResolver::new();
        let cache = Cache::new();
        assert_eq!(resolver.resolve_channel_mentions("see <#123>", &cache), "see <#123>");
    }
}
