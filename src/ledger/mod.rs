//! Correlation ledger.
//!
//! Records every message the bridge has seen or produced, and links each
//! inbound message to the copies mirrored from it, so an edit of the
//! original can later find every copy.
//!
//! ## Module Structure
//!
//! - `sqlite`: SQLite-backed implementation (`SqliteLedger`)

pub mod sqlite;

use std::fmt;

use async_trait::async_trait;

use crate::common::error::LedgerResult;

pub use sqlite::SqliteLedger;

/// Synthetic id of one ledger node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationId(pub i64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of one fan-out leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The destination platform created the message with this id.
    Delivered(String),
    /// The send failed, or the platform gave no id back.
    Failed,
}

impl Delivery {
    pub fn native_id(&self) -> Option<&str> {
        match self {
            Delivery::Delivered(id) => Some(id),
            Delivery::Failed => None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered(_))
    }
}

impl From<Option<String>> for Delivery {
    fn from(id: Option<String>) -> Self {
        match id {
            Some(id) => Delivery::Delivered(id),
            None => Delivery::Failed,
        }
    }
}

/// A successfully delivered copy of a message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MirroredCopy {
    pub adapter_id: String,
    pub channel_id: String,
    pub native_message_id: String,
}

/// Persistent origin -> copies mapping.
///
/// Every call is atomic on its own; callers need no extra locking.
#[async_trait]
pub trait CorrelationLedger: Send + Sync {
    /// Create the backing tables if they do not exist.
    async fn init(&self) -> LedgerResult<()>;

    /// Record an inbound message before it is fanned out.
    async fn record_origin(
        &self,
        adapter_id: &str,
        channel_id: &str,
        native_message_id: &str,
    ) -> LedgerResult<CorrelationId>;

    /// Record one fan-out leg and link it to its origin.
    ///
    /// The copy's node and its link are written together or not at all.
    async fn record_copy(
        &self,
        origin: CorrelationId,
        adapter_id: &str,
        channel_id: &str,
        delivery: &Delivery,
    ) -> LedgerResult<CorrelationId>;

    /// Exact lookup of a message by its platform triple.
    async fn find_origin(
        &self,
        adapter_id: &str,
        channel_id: &str,
        native_message_id: &str,
    ) -> LedgerResult<Option<CorrelationId>>;

    /// Delivered copies of an origin. Failed legs are not returned.
    async fn children_of(&self, origin: CorrelationId) -> LedgerResult<Vec<MirroredCopy>>;

    /// Drop every ledger table.
    async fn purge(&self) -> LedgerResult<()>;
}
