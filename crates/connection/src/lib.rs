//! Channel plumbing for nofile transfers.
//!
//! Provides the candidate endpoint list, the failover policy that walks it,
//! the [`Channel`]/[`Connector`] seam (WebSocket and in-memory), and the
//! [`TransportSession`] that keeps exactly one request outstanding.

pub mod channel;
pub mod endpoints;
pub mod failover;
pub mod memory;
mod pumps;
pub mod session;
pub mod types;
pub mod ws;

pub use channel::{Channel, ChannelError, ChannelEvent, Connector};
pub use endpoints::build_candidates;
pub use failover::{FailoverDecision, FailoverPolicy};
pub use memory::{ChannelPeer, MemoryConnector, MemoryListener};
pub use session::{InboundFrame, RetryCallback, TransportError, TransportSession};
pub use types::{FailureKind, RetryNotice, TransportConfig};
pub use ws::WsConnector;
