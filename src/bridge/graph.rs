//! Directed bridge graph.
//!
//! Decides which (adapter, channel) destinations an inbound message is
//! mirrored to. Built once from the static topology and never mutated
//! afterwards, so it is shared without locking.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::common::error::GraphError;
use crate::config::types::{Config, EVERY_CHANNEL};

/// A directed rule: messages on the source must be mirrored to the destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BridgeEdge {
    pub source_adapter_id: String,
    /// Native channel id, or `*` for every channel of the source adapter.
    pub source_channel: String,
    pub destination_adapter_id: String,
    pub destination_channel: String,
}

impl BridgeEdge {
    /// Build an edge, rejecting self-bridges and wildcard destinations.
    pub fn new(
        source_adapter_id: impl Into<String>,
        source_channel: impl Into<String>,
        destination_adapter_id: impl Into<String>,
        destination_channel: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let edge = Self {
            source_adapter_id: source_adapter_id.into(),
            source_channel: source_channel.into(),
            destination_adapter_id: destination_adapter_id.into(),
            destination_channel: destination_channel.into(),
        };

        if edge.destination_channel == EVERY_CHANNEL {
            return Err(GraphError::WildcardDestination {
                adapter: edge.source_adapter_id,
                channel: edge.source_channel,
            });
        }
        if edge.source_adapter_id == edge.destination_adapter_id
            && edge.source_channel == edge.destination_channel
        {
            return Err(GraphError::SelfBridge {
                adapter: edge.source_adapter_id,
                channel: edge.source_channel,
            });
        }

        Ok(edge)
    }

    pub fn is_wildcard(&self) -> bool {
        self.source_channel == EVERY_CHANNEL
    }

    fn targets(&self, adapter_id: &str, channel_id: &str) -> bool {
        self.destination_adapter_id == adapter_id && self.destination_channel == channel_id
    }
}

/// Key for exact channel lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChannelKey {
    adapter_id: String,
    channel_id: String,
}

/// Read-only routing table with per-source indexes.
#[derive(Debug, Default)]
pub struct BridgeGraph {
    /// All edges, deduplicated.
    edges: Vec<BridgeEdge>,
    /// Index: exact (adapter, channel) source -> edges.
    by_channel: HashMap<ChannelKey, Vec<usize>>,
    /// Index: adapter -> wildcard-source edges.
    by_adapter_wildcard: HashMap<String, Vec<usize>>,
}

impl BridgeGraph {
    /// Create an empty graph with no routes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the graph from a set of edges. Duplicates are kept once.
    pub fn from_edges(edges: impl IntoIterator<Item = BridgeEdge>) -> Self {
        let mut graph = Self::empty();
        let mut seen = HashSet::new();

        for edge in edges {
            if !seen.insert(edge.clone()) {
                debug!(
                    "Skipping duplicate bridge {}/{} -> {}/{}",
                    edge.source_adapter_id,
                    edge.source_channel,
                    edge.destination_adapter_id,
                    edge.destination_channel
                );
                continue;
            }

            let idx = graph.edges.len();
            if edge.is_wildcard() {
                graph
                    .by_adapter_wildcard
                    .entry(edge.source_adapter_id.clone())
                    .or_default()
                    .push(idx);
            } else {
                graph
                    .by_channel
                    .entry(ChannelKey {
                        adapter_id: edge.source_adapter_id.clone(),
                        channel_id: edge.source_channel.clone(),
                    })
                    .or_default()
                    .push(idx);
            }
            graph.edges.push(edge);
        }

        graph
    }

    /// Build the graph from configured bridge groups.
    ///
    /// Every ordered pair of distinct channel keys in a group becomes one
    /// edge. Channels owned by a bot for which `is_active` returns false are
    /// left out of the topology. Wildcard channels only ever act as sources.
    pub fn from_config(config: &Config, is_active: impl Fn(&str) -> bool) -> Result<Self, GraphError> {
        let mut edges = Vec::new();

        for group in &config.bridges {
            for from_key in group {
                let Some(from) = config.channels.get(from_key) else {
                    warn!("Bridge references unknown channel '{}'", from_key);
                    continue;
                };
                if !is_active(&from.bot) {
                    warn!(
                        "Channel '{}' belongs to inactive bot '{}', not bridging from it",
                        from_key, from.bot
                    );
                    continue;
                }

                for to_key in group {
                    if to_key == from_key {
                        continue;
                    }
                    let Some(to) = config.channels.get(to_key) else {
                        continue;
                    };
                    if !is_active(&to.bot) {
                        continue;
                    }
                    if to.is_wildcard() {
                        debug!(
                            "Channel '{}' is a wildcard, not bridging into it from '{}'",
                            to_key, from_key
                        );
                        continue;
                    }

                    edges.push(BridgeEdge::new(&from.bot, &from.name, &to.bot, &to.name)?);
                }
            }
        }

        Ok(Self::from_edges(edges))
    }

    /// Edges a message on `(adapter_id, channel_id)` must follow.
    ///
    /// Matches both the exact channel and the adapter's wildcard edges, and
    /// never routes a message back onto its own channel.
    pub fn edges_from(&self, adapter_id: &str, channel_id: &str) -> Vec<&BridgeEdge> {
        let key = ChannelKey {
            adapter_id: adapter_id.to_string(),
            channel_id: channel_id.to_string(),
        };

        let exact = self.by_channel.get(&key).into_iter().flatten();
        let wildcard = self.by_adapter_wildcard.get(adapter_id).into_iter().flatten();

        exact
            .chain(wildcard)
            .map(|&i| &self.edges[i])
            .filter(|edge| !edge.targets(adapter_id, channel_id))
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
