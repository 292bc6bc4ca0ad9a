//! Chunked binary framing for data-channel transfers
//!
//! Binary payloads larger than one frame are transferred as a header frame
//! `[token: i32 LE, size: i32 LE]` followed by chunk frames
//! `[token: i32 LE, bytes...]`. The receiver reassembles by token and
//! releases the buffer once `received == size`.

use std::collections::HashMap;

use crate::{Error, Result};

/// Maximum payload bytes per chunk frame (excluding the 4-byte token)
pub const CHUNK_PAYLOAD_SIZE: usize = 16000;

const TOKEN_LEN: usize = 4;
const HEADER_LEN: usize = 8;

/// Encode a binary payload into a header frame plus chunk frames
pub fn encode_frames(token: i32, data: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::with_capacity(1 + data.len().div_ceil(CHUNK_PAYLOAD_SIZE));

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&token.to_le_bytes());
    header.extend_from_slice(&(data.len() as i32).to_le_bytes());
    frames.push(header);

    let mut sent = 0;
    while sent < data.len() {
        let size = (data.len() - sent).min(CHUNK_PAYLOAD_SIZE);
        let mut frame = Vec::with_capacity(TOKEN_LEN + size);
        frame.extend_from_slice(&token.to_le_bytes());
        frame.extend_from_slice(&data[sent..sent + size]);
        frames.push(frame);
        sent += size;
    }

    frames
}

struct Transfer {
    size: usize,
    received: usize,
    data: Vec<u8>,
}

/// Reassembles chunked binary transfers keyed by token
#[derive(Default)]
pub struct Reassembler {
    transfers: HashMap<i32, Transfer>,
}

impl Reassembler {
    /// Create an empty reassembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one inbound frame
    ///
    /// Returns `Ok(Some(payload))` when a transfer completes, `Ok(None)`
    /// while more chunks are pending. On a decode error the transfer state
    /// for that token is reset.
    pub fn accept(&mut self, frame: &[u8]) -> Result<Option<Vec<u8>>> {
        if frame.len() < TOKEN_LEN {
            return Err(Error::DataChannelPayloadDecode(format!(
                "frame of {} bytes is shorter than the token header",
                frame.len()
            )));
        }

        let token = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);

        if let Some(transfer) = self.transfers.get_mut(&token) {
            let payload = &frame[TOKEN_LEN..];
            if transfer.received + payload.len() > transfer.size {
                self.transfers.remove(&token);
                return Err(Error::DataChannelPayloadDecode(format!(
                    "transfer {token} overflowed its announced size"
                )));
            }

            transfer.data[transfer.received..transfer.received + payload.len()]
                .copy_from_slice(payload);
            transfer.received += payload.len();

            if transfer.received == transfer.size {
                let data = std::mem::take(&mut transfer.data);
                self.transfers.remove(&token);
                return Ok(Some(data));
            }
            return Ok(None);
        }

        // First frame for a token must be the 8-byte header.
        if frame.len() != HEADER_LEN {
            return Err(Error::DataChannelPayloadDecode(format!(
                "chunk of {} bytes for unknown transfer token {token}",
                frame.len()
            )));
        }

        let size = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        if size < 0 {
            return Err(Error::DataChannelPayloadDecode(format!(
                "transfer {token} announced negative size {size}"
            )));
        }
        if size == 0 {
            return Ok(Some(Vec::new()));
        }

        self.transfers.insert(
            token,
            Transfer {
                size: size as usize,
                received: 0,
                data: vec![0; size as usize],
            },
        );
        Ok(None)
    }

    /// Number of in-flight transfers
    pub fn pending(&self) -> usize {
        self.transfers.len()
    }
}
