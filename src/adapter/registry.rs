//! Static adapter registry.
//!
//! Maps the `type` tag of a configured bot to the constructor of the
//! adapter that serves it.

use std::collections::HashMap;

use crate::adapter::SharedAdapter;
use crate::common::error::{AdapterError, AdapterResult};
use crate::config::types::BotConfig;
use crate::discord::DiscordAdapter;

/// Builds an adapter for a bot id and its configuration.
pub type AdapterFactory = fn(&str, &BotConfig) -> AdapterResult<SharedAdapter>;

/// Type tag -> adapter constructor.
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    /// Registry without any adapter types.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every adapter type shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("discord", DiscordAdapter::from_config);
        registry
    }

    /// Register (or replace) the factory for a type tag. Tags are case-insensitive.
    pub fn register(&mut self, kind: &str, factory: AdapterFactory) {
        self.factories.insert(kind.to_lowercase(), factory);
    }

    /// Construct the adapter for one configured bot.
    pub fn build(&self, bot_id: &str, bot: &BotConfig) -> AdapterResult<SharedAdapter> {
        let factory = self
            .factories
            .get(&bot.kind.to_lowercase())
            .ok_or_else(|| AdapterError::UnknownKind {
                kind: bot.kind.clone(),
            })?;
        factory(bot_id, bot)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
