//! Data-channel message framing and bridging

mod bridge;
mod framing;

pub use bridge::{sanitize_html, DataChannelBridge};
pub use framing::{encode_frames, Reassembler, CHUNK_PAYLOAD_SIZE};

/// A single data-channel message as seen by the capability boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelPayload {
    /// UTF-8 text message
    Text(String),
    /// Raw binary frame
    Binary(Vec<u8>),
}

impl ChannelPayload {
    /// Payload length in bytes
    pub fn len(&self) -> usize {
        match self {
            ChannelPayload::Text(t) => t.len(),
            ChannelPayload::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
