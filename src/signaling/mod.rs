//! Signaling layer
//!
//! The wire protocol ([`SignalingCommand`]) and the WebSocket transport that
//! carries it. Sessions never touch the socket; they write through the
//! [`CommandSink`] seam, which the transport implements.

mod protocol;
mod transport;

pub use protocol::SignalingCommand;
pub use transport::{SignalingTransport, TransportEvent};

use crate::Result;

/// Write half of the signaling connection
///
/// All session-level sends are serialized through the one transport; this
/// trait is the only path to the wire.
pub trait CommandSink: Send + Sync {
    /// Serialize and transmit a command, fire-and-forget
    ///
    /// Fails with [`Error::TransportUnavailable`](crate::Error) when the
    /// transport is not in an open state.
    fn send(&self, command: &SignalingCommand) -> Result<()>;

    /// Whether the transport is currently open
    fn is_connected(&self) -> bool;
}
