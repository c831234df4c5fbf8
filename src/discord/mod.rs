//! Discord bot integration.
//!
//! Implements the bridge adapter contract on top of serenity.

pub mod adapter;
pub mod handler;
pub mod resolver;

pub use adapter::DiscordAdapter;
