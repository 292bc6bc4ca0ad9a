//! Bridges the capability's data channel onto the event bus

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::channels::{encode_frames, ChannelPayload, Reassembler};
use crate::events::{Event, EventBus};
use crate::peer::DataChannelHandle;
use crate::{Error, Result};

/// Escape angle brackets so inbound text cannot carry markup
pub fn sanitize_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Per-session data-channel adapter
///
/// Inbound messages are sanitized (text) or reassembled from chunked frames
/// (binary) and re-emitted as [`Event::DataReceived`]. Outbound binary
/// payloads get the matching chunked framing. A decode failure surfaces as
/// a typed error event; the channel itself stays open.
pub struct DataChannelBridge {
    stream_id: String,
    sanitize: bool,
    bus: EventBus,
    open: AtomicBool,
    reassembler: Mutex<Reassembler>,
}

impl DataChannelBridge {
    /// Create a bridge for one session's channel
    pub fn new(stream_id: impl Into<String>, sanitize: bool, bus: EventBus) -> Self {
        Self {
            stream_id: stream_id.into(),
            sanitize,
            bus,
            open: AtomicBool::new(false),
            reassembler: Mutex::new(Reassembler::new()),
        }
    }

    /// Whether the channel has opened and not yet closed
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// The channel opened
    pub fn handle_open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.bus.emit(Event::DataChannelOpened {
            stream_id: self.stream_id.clone(),
        });
    }

    /// The channel closed
    pub fn handle_close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.bus.emit(Event::DataChannelClosed {
            stream_id: self.stream_id.clone(),
        });
    }

    /// One inbound message from the capability
    pub fn handle_message(&self, payload: ChannelPayload) {
        match payload {
            ChannelPayload::Text(text) => {
                let text = if self.sanitize {
                    sanitize_html(&text)
                } else {
                    text
                };
                self.bus.emit(Event::DataReceived {
                    stream_id: self.stream_id.clone(),
                    payload: ChannelPayload::Text(text),
                });
            }
            ChannelPayload::Binary(frame) => {
                let outcome = self
                    .reassembler
                    .lock()
                    .expect("reassembler lock poisoned")
                    .accept(&frame);
                match outcome {
                    Ok(Some(data)) => {
                        self.bus.emit(Event::DataReceived {
                            stream_id: self.stream_id.clone(),
                            payload: ChannelPayload::Binary(data),
                        });
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(stream_id = %self.stream_id, error = %err, "binary payload decode failed");
                        self.bus.emit(Event::Error {
                            stream_id: Some(self.stream_id.clone()),
                            error: Arc::new(err),
                        });
                    }
                }
            }
        }
    }

    /// A transport error reported by the capability's channel object
    ///
    /// Only surfaced while the channel is open; errors raised during
    /// teardown are expected and logged at debug.
    pub fn handle_error(&self, detail: String) {
        if !self.is_open() {
            debug!(stream_id = %self.stream_id, detail, "data channel error after close");
            return;
        }
        self.bus.emit(Event::Error {
            stream_id: Some(self.stream_id.clone()),
            error: Arc::new(Error::DataChannelTransport(detail)),
        });
    }

    /// Send a text message
    pub async fn send_text(&self, channel: &Arc<dyn DataChannelHandle>, text: &str) -> Result<()> {
        if !channel.is_open() {
            return Err(Error::DataChannelTransport(format!(
                "data channel for {} is not open",
                self.stream_id
            )));
        }
        channel.send_text(text).await
    }

    /// Send a binary payload with chunked framing
    pub async fn send_binary(
        &self,
        channel: &Arc<dyn DataChannelHandle>,
        data: &[u8],
    ) -> Result<()> {
        if !channel.is_open() {
            return Err(Error::DataChannelTransport(format!(
                "data channel for {} is not open",
                self.stream_id
            )));
        }
        let token: i32 = rand::random();
        for frame in encode_frames(token, data) {
            channel.send_binary(&frame).await?;
        }
        Ok(())
    }
}
