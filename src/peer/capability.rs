//! Peer-connection capability boundary
//!
//! The SDK orchestrates an external object that already implements the
//! WebRTC session description protocol (offer/answer, candidate gathering,
//! connection-state reporting). It is consumed through these traits;
//! capability notifications arrive as [`PeerEvent`]s on a tagged queue
//! rather than ad-hoc closures.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::channels::ChannelPayload;
use crate::stats::StatsRecord;
use crate::Result;

/// Session description kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Locally or remotely proposed media parameters
    Offer,
    /// Acceptance of a proposed description
    Answer,
}

impl SdpType {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session description exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// Offer or answer
    pub kind: SdpType,
    /// SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// An ICE candidate descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    /// Candidate attribute string; empty marks end-of-candidates
    pub candidate: String,
    /// SDP m-line index
    pub label: u32,
    /// SDP mid, when known
    pub sdp_mid: Option<String>,
}

impl IceCandidate {
    /// Transport protocol of the candidate (`udp`/`tcp`), lowercased
    ///
    /// Parsed from the third field of the candidate attribute, e.g.
    /// `candidate:842163049 1 udp 1677729535 ...`.
    pub fn protocol(&self) -> Option<String> {
        self.candidate
            .split_whitespace()
            .nth(2)
            .map(|p| p.to_ascii_lowercase())
    }

    /// Whether this is the end-of-candidates marker
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.is_empty()
    }
}

/// ICE connectivity state reported by the capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    /// Gathering has not started
    New,
    /// Connectivity checks in progress
    Checking,
    /// A usable pair was found
    Connected,
    /// All checks finished successfully
    Completed,
    /// Liveness checks are failing; may self-heal
    Disconnected,
    /// Connectivity is irrecoverably lost
    Failed,
    /// The connection was closed
    Closed,
}

/// Capability notification delivered on the per-session event queue
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local ICE candidate was gathered
    IceCandidate(IceCandidate),
    /// The ICE connectivity state changed
    IceConnectionState(IceConnectionState),
    /// The data channel opened
    DataChannelOpen,
    /// The data channel closed
    DataChannelClose,
    /// A data-channel message arrived
    DataChannelMessage(ChannelPayload),
    /// The data channel reported a transport error
    DataChannelError(String),
}

/// Role of a session on the media platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Sends media; initiates the offer after the server grants negotiation
    Publisher,
    /// Receives media; answers the server-issued offer
    Subscriber,
}

/// Handle to the capability's data-channel object
#[async_trait]
pub trait DataChannelHandle: Send + Sync {
    /// Whether the channel is currently open
    fn is_open(&self) -> bool;

    /// Send a text message
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Send one binary frame
    async fn send_binary(&self, frame: &[u8]) -> Result<()>;

    /// Close the channel
    async fn close(&self) -> Result<()>;
}

/// The peer-connection capability consumed by a session
///
/// The SDK never constructs media streams itself; capture is an external
/// collaborator invoked only to obtain tracks to attach, which happens
/// behind this boundary.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Create a local offer
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Create a local answer to the applied remote offer
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Apply a local description
    async fn set_local_description(&self, description: &SessionDescription) -> Result<()>;

    /// Apply a remote description
    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()>;

    /// Apply a remote ICE candidate
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    /// Query the raw statistics snapshot
    async fn get_stats(&self) -> Result<Vec<StatsRecord>>;

    /// The data-channel object, when one exists
    fn data_channel(&self) -> Option<Arc<dyn DataChannelHandle>>;

    /// Release the capability instance
    async fn close(&self) -> Result<()>;
}

/// Creates capability instances for new negotiation rounds
///
/// The factory receives the session's event sender so capability
/// notifications arrive as tagged [`PeerEvent`]s.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    /// Create a capability instance for the given stream
    async fn create(
        &self,
        stream_id: &str,
        role: SessionRole,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_protocol_parsing() {
        let udp = IceCandidate {
            candidate: "candidate:842163049 1 udp 1677729535 10.0.0.1 35083 typ srflx".to_string(),
            label: 0,
            sdp_mid: None,
        };
        assert_eq!(udp.protocol().as_deref(), Some("udp"));

        let tcp = IceCandidate {
            candidate: "candidate:1 1 TCP 2105458943 192.168.1.5 9 typ host".to_string(),
            label: 0,
            sdp_mid: None,
        };
        assert_eq!(tcp.protocol().as_deref(), Some("tcp"));
    }

    #[test]
    fn test_end_of_candidates_marker() {
        let end = IceCandidate {
            candidate: String::new(),
            label: 0,
            sdp_mid: None,
        };
        assert!(end.is_end_of_candidates());
        assert_eq!(end.protocol(), None);
    }

    #[test]
    fn test_sdp_type_wire_names() {
        assert_eq!(SdpType::Offer.as_str(), "offer");
        assert_eq!(serde_json::to_string(&SdpType::Answer).unwrap(), "\"answer\"");
    }
}
