//! Bridge controller that ties adapters, routing and the ledger together.
//!
//! Adapters call [`BridgeController::relay`] for new messages and
//! [`BridgeController::propagate_edit`] for edits. Every fan-out leg is
//! isolated: one failing destination never blocks or corrupts another.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::adapter::{format_envelope, SharedAdapter};
use crate::common::{RelayMessage, TextMessage};
use crate::ledger::{CorrelationId, CorrelationLedger, Delivery, MirroredCopy};

use super::filter::MessageFilter;
use super::graph::{BridgeEdge, BridgeGraph};

/// Known users per bridged destination, keyed by (adapter id, channel id).
pub type BridgedUsers = BTreeMap<(String, String), Vec<String>>;

/// Outcome of one `relay` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Fan-out legs attempted.
    pub attempted: usize,
    /// Legs the destination confirmed with a message id.
    pub delivered: usize,
    /// The envelope matched the relay filter and nothing was sent.
    pub filtered: bool,
}

impl RelayReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.delivered
    }
}

/// Outcome of one `propagate_edit` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditReport {
    /// Mirrored copies an edit was attempted on.
    pub attempted: usize,
    /// Copies successfully edited.
    pub edited: usize,
}

/// The main bridge that orchestrates message fan-out and edit propagation.
pub struct BridgeController {
    /// Routing table.
    graph: BridgeGraph,
    /// Live adapters keyed by id.
    adapters: HashMap<String, SharedAdapter>,
    /// Origin -> copies mapping.
    ledger: Arc<dyn CorrelationLedger>,
    /// Relay filter (applied to rendered envelopes).
    filter: MessageFilter,
}

impl BridgeController {
    pub fn new(
        graph: BridgeGraph,
        adapters: impl IntoIterator<Item = SharedAdapter>,
        ledger: Arc<dyn CorrelationLedger>,
        filter: MessageFilter,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.id().to_string(), adapter))
            .collect();

        Self {
            graph,
            adapters,
            ledger,
            filter,
        }
    }

    /// Display name of a channel, as its owning adapter knows it.
    async fn channel_name(&self, adapter_id: &str, channel_id: &str) -> String {
        match self.adapters.get(adapter_id) {
            Some(adapter) => adapter.resolve_channel_name(channel_id).await,
            None => channel_id.to_string(),
        }
    }

    /// Mirror a new inbound message to every bridged destination.
    ///
    /// `native_id` is the id of the message on its source platform; it
    /// anchors the ledger entry that later edits are looked up by.
    /// Never fails: each leg's errors are logged and recorded as failed
    /// deliveries.
    pub async fn relay(&self, message: &RelayMessage, source_channel: &str, native_id: &str) -> RelayReport {
        let chat = message.chat();
        let source_adapter = chat.origin_adapter_id();

        let edges = self.graph.edges_from(source_adapter, source_channel);
        if edges.is_empty() {
            debug!(source_adapter, source_channel, "No bridge route for message");
            return RelayReport::default();
        }

        let channel_name = self.channel_name(source_adapter, source_channel).await;
        let envelope = format_envelope(
            source_adapter,
            &channel_name,
            chat.author_nickname(),
            message.text_message().text(),
        );

        if self.filter.should_filter(&envelope) {
            info!(source_adapter, source_channel, "FILTERED relay: {}", envelope);
            return RelayReport {
                filtered: true,
                ..RelayReport::default()
            };
        }

        // The origin row must exist before any copy links to it.
        let origin = match self
            .ledger
            .record_origin(source_adapter, source_channel, native_id)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                error!(
                    source_adapter,
                    source_channel,
                    native_id,
                    "Failed to record origin, edits of this message will not propagate: {}",
                    e
                );
                None
            }
        };

        let legs = edges
            .into_iter()
            .map(|edge| self.relay_leg(edge, message, &envelope, origin));
        let deliveries = join_all(legs).await;

        let report = RelayReport {
            attempted: deliveries.len(),
            delivered: deliveries.iter().filter(|d| d.is_delivered()).count(),
            filtered: false,
        };

        debug!(
            source_adapter,
            source_channel,
            attempted = report.attempted,
            delivered = report.delivered,
            "Relay complete"
        );
        report
    }

    /// Deliver over one edge and record the attempt.
    async fn relay_leg(
        &self,
        edge: &BridgeEdge,
        message: &RelayMessage,
        envelope: &str,
        origin: Option<CorrelationId>,
    ) -> Delivery {
        let delivery = self.deliver(edge, message, envelope).await;

        if let Some(origin) = origin {
            if let Err(e) = self
                .ledger
                .record_copy(
                    origin,
                    &edge.destination_adapter_id,
                    &edge.destination_channel,
                    &delivery,
                )
                .await
            {
                error!(
                    destination_adapter = %edge.destination_adapter_id,
                    destination_channel = %edge.destination_channel,
                    "Failed to record copy of {}: {}",
                    origin,
                    e
                );
            }
        }

        delivery
    }

    async fn deliver(&self, edge: &BridgeEdge, message: &RelayMessage, envelope: &str) -> Delivery {
        let Some(adapter) = self.adapters.get(&edge.destination_adapter_id) else {
            warn!(
                "Bridge destination adapter '{}' is not running",
                edge.destination_adapter_id
            );
            return Delivery::Failed;
        };

        let result = match message {
            RelayMessage::Text(text) => {
                adapter
                    .send_text(text, envelope, &edge.destination_channel)
                    .await
            }
            RelayMessage::Document(document) => {
                adapter
                    .send_document(document, envelope, &edge.destination_channel)
                    .await
            }
        };

        match result {
            Ok(Some(id)) => {
                info!(
                    "{}/{} -> {}/{}: {}",
                    edge.source_adapter_id,
                    edge.source_channel,
                    edge.destination_adapter_id,
                    edge.destination_channel,
                    envelope
                );
                Delivery::Delivered(id)
            }
            Ok(None) => {
                warn!(
                    "{}/{} gave no message id back, edits will not reach this copy",
                    edge.destination_adapter_id, edge.destination_channel
                );
                Delivery::Failed
            }
            Err(e) => {
                error!(
                    "Failed to relay to {}/{}: {}",
                    edge.destination_adapter_id, edge.destination_channel, e
                );
                Delivery::Failed
            }
        }
    }

    /// Re-target an edit of a source message onto every mirrored copy.
    ///
    /// A message that was never mirrored (or whose ledger rows are gone) is
    /// silently ignored.
    pub async fn propagate_edit(&self, message: &TextMessage, source_channel: &str, native_id: &str) -> EditReport {
        let source_adapter = message.origin_adapter_id();

        let origin = match self
            .ledger
            .find_origin(source_adapter, source_channel, native_id)
            .await
        {
            Ok(Some(origin)) => origin,
            Ok(None) => {
                debug!(source_adapter, source_channel, native_id, "Edited message was never mirrored");
                return EditReport::default();
            }
            Err(e) => {
                error!("Ledger lookup for edit failed: {}", e);
                return EditReport::default();
            }
        };

        let copies = match self.ledger.children_of(origin).await {
            Ok(copies) => copies,
            Err(e) => {
                error!("Failed to load copies of {}: {}", origin, e);
                return EditReport::default();
            }
        };
        if copies.is_empty() {
            return EditReport::default();
        }

        let channel_name = self.channel_name(source_adapter, source_channel).await;
        let envelope = format_envelope(
            source_adapter,
            &channel_name,
            message.author_nickname(),
            message.text(),
        );

        if self.filter.should_filter(&envelope) {
            info!(source_adapter, source_channel, "FILTERED edit: {}", envelope);
            return EditReport::default();
        }

        let edits = copies
            .iter()
            .map(|copy| self.edit_copy(copy, message, &envelope));
        let results = join_all(edits).await;

        EditReport {
            attempted: results.len(),
            edited: results.into_iter().filter(|ok| *ok).count(),
        }
    }

    async fn edit_copy(&self, copy: &MirroredCopy, message: &TextMessage, envelope: &str) -> bool {
        let Some(adapter) = self.adapters.get(&copy.adapter_id) else {
            warn!("Cannot edit copy on '{}': adapter is not running", copy.adapter_id);
            return false;
        };

        match adapter
            .edit_text(message, envelope, &copy.channel_id, &copy.native_message_id)
            .await
        {
            Ok(()) => {
                info!(
                    "Edited {}/{} message {}: {}",
                    copy.adapter_id, copy.channel_id, copy.native_message_id, envelope
                );
                true
            }
            Err(e) => {
                error!(
                    "Failed to edit {}/{} message {}: {}",
                    copy.adapter_id, copy.channel_id, copy.native_message_id, e
                );
                false
            }
        }
    }

    /// Collect the known users of every channel bridged from a source channel.
    pub async fn aggregate_users(&self, adapter_id: &str, source_channel: &str) -> BridgedUsers {
        let lookups = self
            .graph
            .edges_from(adapter_id, source_channel)
            .into_iter()
            .map(|edge| async move {
                let Some(adapter) = self.adapters.get(&edge.destination_adapter_id) else {
                    return None;
                };
                match adapter.list_known_users(&edge.destination_channel).await {
                    Ok(users) => Some((
                        (
                            edge.destination_adapter_id.clone(),
                            edge.destination_channel.clone(),
                        ),
                        users,
                    )),
                    Err(e) => {
                        warn!(
                            "Failed to list users of {}/{}: {}",
                            edge.destination_adapter_id, edge.destination_channel, e
                        );
                        None
                    }
                }
            });

        join_all(lookups).await.into_iter().flatten().collect()
    }

    /// Answer a "who is bridged here" query as chat text.
    pub async fn describe_bridged_users(&self, adapter_id: &str, source_channel: &str) -> String {
        let users = self.aggregate_users(adapter_id, source_channel).await;

        let mut sections = Vec::with_capacity(users.len());
        for ((adapter, channel), names) in users {
            let channel_name = self.channel_name(&adapter, &channel).await;
            sections.push((adapter, channel_name, names));
        }

        render_user_listing(&sections)
    }

    /// Close every adapter session.
    pub async fn close_adapters(&self) {
        for adapter in self.adapters.values() {
            adapter.close().await;
            info!("Adapter '{}' closed", adapter.id());
        }
    }
}

/// Render `(adapter, channel name, users)` sections for the users command.
pub fn render_user_listing(sections: &[(String, String, Vec<String>)]) -> String {
    if sections.is_empty() {
        return "This channel is not bridged anywhere.".to_string();
    }

    let mut output = String::new();
    for (adapter, channel_name, users) in sections {
        output.push_str(&format!("{}/{}:\n", adapter, channel_name));
        for user in users {
            output.push_str(user);
            output.push('\n');
        }
        output.push('\n');
    }
    output
}
