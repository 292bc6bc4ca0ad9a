//! Peer-session layer
//!
//! The capability boundary traits, the reconnect policy, and the
//! [`PeerSession`] state machine that drives negotiation over signaling.

mod capability;
mod reconnect;
mod session;

pub use capability::{
    DataChannelHandle, IceCandidate, IceConnectionState, PeerConnection, PeerConnectionFactory,
    PeerEvent, SdpType, SessionDescription, SessionRole,
};
pub use reconnect::ReconnectPolicy;
pub use session::{PeerSession, PlayOptions, PublishOptions, SessionOptions, SessionState};
