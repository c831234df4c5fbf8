//! Platform adapter contract.
//!
//! Every chat platform is reached through a [`BotAdapter`]. The bridge
//! controller only ever talks to a platform through this trait, and refers
//! to adapters by their [`BotAdapter::id`] everywhere else.
//!
//! ## Module Structure
//!
//! - `envelope`: Shared outbound formatting and payload descriptions
//! - `registry`: Static mapping from configured bot type to adapter factory

pub mod envelope;
pub mod registry;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::bridge::BridgeController;
use crate::common::error::{AdapterError, AdapterResult};
use crate::common::{DocumentMessage, TextMessage};

pub use envelope::format_envelope;
pub use registry::AdapterRegistry;

/// Capabilities a platform adapter exposes to the bridge.
#[async_trait]
pub trait BotAdapter: Send + Sync {
    /// Stable identifier, used as the adapter key in routing and the ledger.
    fn id(&self) -> &str;

    /// Establish the platform session for the given native channel ids.
    async fn init(&self, channels: &[String]) -> AdapterResult<()>;

    /// Send a text message, returning the platform id of the created message.
    async fn send_text(
        &self,
        message: &TextMessage,
        envelope: &str,
        channel: &str,
    ) -> AdapterResult<Option<String>>;

    /// Send a document with `caption`, picking the platform call from its media kind.
    async fn send_document(
        &self,
        message: &DocumentMessage,
        caption: &str,
        channel: &str,
    ) -> AdapterResult<Option<String>>;

    /// Replace the content of a previously mirrored message.
    ///
    /// Implementations retry as a caption edit when the platform rejects a
    /// text edit (see [`edit_with_caption_fallback`]).
    async fn edit_text(
        &self,
        message: &TextMessage,
        envelope: &str,
        channel: &str,
        message_id: &str,
    ) -> AdapterResult<()>;

    /// Users known on a channel.
    ///
    /// Platforms without a membership query return every author seen so far,
    /// which is a lower bound rather than a roster.
    async fn list_known_users(&self, channel: &str) -> AdapterResult<Vec<String>>;

    /// Human readable name of a channel. Unknown ids come back unchanged.
    async fn resolve_channel_name(&self, channel_id: &str) -> String;

    /// Run the inbound event loop until the session ends.
    async fn run(&self, controller: Arc<BridgeController>) -> AdapterResult<()>;

    /// Tear down the platform session.
    async fn close(&self) {}
}

/// Shared adapter handle.
pub type SharedAdapter = Arc<dyn BotAdapter>;

/// Try an edit as text first, then as a caption edit.
///
/// Only [`AdapterError::NotEditableAsText`] triggers the caption attempt.
/// Any other failure is returned as is.
pub async fn edit_with_caption_fallback<T, C, FT, FC>(as_text: T, as_caption: C) -> AdapterResult<()>
where
    T: FnOnce() -> FT,
    C: FnOnce() -> FC,
    FT: Future<Output = AdapterResult<()>>,
    FC: Future<Output = AdapterResult<()>>,
{
    match as_text().await {
        Err(e @ AdapterError::NotEditableAsText { .. }) => {
            debug!("{}, retrying as caption edit", e);
            as_caption().await
        }
        result => result,
    }
}
