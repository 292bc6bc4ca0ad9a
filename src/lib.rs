//! # streamgate-webrtc
//!
//! Client-side WebRTC signaling and session SDK for StreamGate-compatible
//! media servers.
//!
//! The crate speaks the server's JSON-over-WebSocket signaling protocol,
//! drives offer/answer negotiation for publish and play sessions, manages
//! reconnection for both the transport and individual sessions, bridges
//! data-channel messaging (with chunked binary framing), and reduces raw
//! WebRTC statistics into normalized periodic snapshots.
//!
//! It does not implement WebRTC itself. The peer-connection primitives are
//! consumed through the [`PeerConnectionFactory`] / [`PeerConnection`]
//! capability boundary, so the SDK runs against any engine that can produce
//! offers, answers, candidates and stats.
//!
//! ## Architecture
//!
//! ```text
//!                        ┌──────────────┐
//!   caller ◄── events ── │   EventBus   │ ◄── events from every layer
//!                        └──────────────┘
//!                               ▲
//!   ┌──────────────┐    ┌───────────────┐    ┌────────────────────┐
//!   │ WebRtcClient │───►│ SessionManager│───►│ PeerSession (1/id) │
//!   └──────┬───────┘    └───────────────┘    └───────┬────────────┘
//!          │ TransportEvent                          │ PeerEvent
//!          ▼                                         ▼
//!   ┌────────────────────┐  CommandSink   ┌──────────────────────┐
//!   │ SignalingTransport │ ◄───────────── │ capability boundary  │
//!   │ (tokio-tungstenite)│                │ (PeerConnection &c.) │
//!   └────────────────────┘                └──────────────────────┘
//! ```
//!
//! The transport is the only component that writes to the wire; sessions
//! send through the [`CommandSink`] seam, which also makes them testable
//! without a server.

#![warn(missing_docs)]

pub mod channels;
pub mod config;
pub mod error;
pub mod events;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod stats;

mod client;

pub use channels::ChannelPayload;
pub use client::WebRtcClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use events::{Event, EventBus, EventKind, SubscriptionId};
pub use peer::{
    DataChannelHandle, IceCandidate, IceConnectionState, PeerConnection, PeerConnectionFactory,
    PeerEvent, PeerSession, PlayOptions, PublishOptions, ReconnectPolicy, SdpType,
    SessionDescription, SessionRole, SessionState,
};
pub use session::SessionManager;
pub use signaling::{CommandSink, SignalingCommand, SignalingTransport, TransportEvent};
pub use stats::{MediaKind, StatsCollector, StatsRecord, StatsSnapshot};
