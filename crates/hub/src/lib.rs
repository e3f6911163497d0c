//! Fan-out hub for live event viewers.
//!
//! A single task owns the set of connected clients. Everything else talks to
//! it through a cloneable [`HubHandle`]: registration, unregistration,
//! broadcasts and client-count queries each travel on their own channel, so
//! the client set is never shared.
//!
//! Each client gets a bounded outbound buffer. A broadcast never waits on a
//! slow client: if its buffer is full it is dropped instead. The broadcast
//! inbox is bounded too, and a broadcast arriving while it is full is
//! discarded rather than queued.

mod actor;
mod error;
mod handle;

pub use error::{HubError, Result};
pub use handle::{Broadcaster, ClientId, HubHandle, Subscription};

/// Default outbound buffer per client.
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

/// A message as delivered to viewers. Shared between all client buffers.
pub type HubMessage = std::sync::Arc<str>;
