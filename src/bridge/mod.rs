//! Bridge core: routing, filtering and fan-out.
//!
//! ## Module Structure
//!
//! - `controller`: Relay, edit propagation and user aggregation (`BridgeController`)
//! - `filter`: Regex relay filter (`MessageFilter`)
//! - `graph`: Directed routing table (`BridgeGraph`, `BridgeEdge`)

pub mod controller;
pub mod filter;
pub mod graph;

pub use controller::{render_user_listing, BridgeController, BridgedUsers, EditReport, RelayReport};
pub use filter::MessageFilter;
pub use graph::{BridgeEdge, BridgeGraph};
