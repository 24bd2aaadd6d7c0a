//! Software IPv4 router core.
//!
//! Frames arrive on named virtual interfaces through
//! [`Router::handle_frame`]; the router answers locally (ARP replies, ICMP
//! echo), forwards by longest-prefix match, or rejects with an ICMP error.
//! Outbound frames leave through the embedder-supplied [`FrameSink`].
//!
//! # Architecture
//!
//! - [`iface`] — the immutable interface registry built at startup.
//! - [`route`] — the ordered routing table with longest-prefix-match lookup.
//! - [`arp_cache`] — the ARP resolution cache and pending-request queue, the
//!   only mutable shared state.
//! - [`pipeline`] — the Ethernet/ARP/IPv4/ICMP state machine.
//! - [`sweep`] — the 1-second maintenance tick that ages cache entries and
//!   drives unresolved requests.
//! - [`config`] — text-format loaders for the startup interface and route
//!   records.
//!
//! # Concurrency
//!
//! [`Router`] is `Send + Sync`; `handle_frame` may run on any number of
//! receive threads concurrently while one sweeper thread ticks.  Cache
//! methods compute work under the cache lock and return action values the
//! caller executes after release, so no frame is ever transmitted with the
//! lock held.

pub mod arp_cache;
pub mod config;
pub mod error;
pub mod iface;
pub mod pipeline;
pub mod route;
pub mod sweep;

pub use arp_cache::{ArpCache, ArpRequest, PendingPacket, SweepAction};
pub use error::NetError;
pub use iface::{IfaceTable, Interface};
pub use pipeline::{FrameSink, Router};
pub use route::{RouteEntry, RouteTable};

#[cfg(test)]
mod pipeline_tests;
