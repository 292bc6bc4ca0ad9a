//! Error types for the StreamGate WebRTC client SDK

/// Result type alias using the SDK Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in signaling and peer-session operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling transport is not connected
    #[error("Signaling transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Required capability missing or insecure context
    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// Media capture permission denied by the environment
    #[error("Media permission denied: {0}")]
    MediaPermissionDenied(String),

    /// Answer or candidate arrived before any remote description was applied
    #[error("Remote description missing: {0}")]
    RemoteDescriptionMissing(String),

    /// Data channel transport failure while the channel was open
    #[error("Data channel error: {0}")]
    DataChannelTransport(String),

    /// Binary data-channel payload could not be decoded
    #[error("Data channel payload decode failed: {0}")]
    DataChannelPayloadDecode(String),

    /// Negotiation did not reach the connected state in time
    #[error("Join timeout: {0}")]
    JoinTimeout(String),

    /// Server rejected the join, or reconnect attempts exhausted
    #[error("Join failed: {0}")]
    JoinFailed(String),

    /// Signaling protocol error
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No active session for the given stream id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A session for the given stream id is already active
    #[error("Session already active: {0}")]
    SessionAlreadyActive(String),

    /// Peer-connection capability error
    #[error("Peer connection error: {0}")]
    PeerConnection(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    Sdp(String),

    /// Internal error (should not occur in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable via reconnect policy
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransportUnavailable(_)
                | Error::Signaling(_)
                | Error::WebSocket(_)
                | Error::JoinTimeout(_)
                | Error::Io(_)
        )
    }

    /// Check if this error terminates a session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::JoinFailed(_)
                | Error::UnsupportedEnvironment(_)
                | Error::MediaPermissionDenied(_)
                | Error::SessionAlreadyActive(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Stable string code for event consumers
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "invalid_config",
            Error::TransportUnavailable(_) => "transport_unavailable",
            Error::UnsupportedEnvironment(_) => "unsupported_environment",
            Error::MediaPermissionDenied(_) => "media_permission_denied",
            Error::RemoteDescriptionMissing(_) => "remote_description_missing",
            Error::DataChannelTransport(_) => "data_channel_error",
            Error::DataChannelPayloadDecode(_) => "data_channel_payload_decode_failed",
            Error::JoinTimeout(_) => "join_timeout",
            Error::JoinFailed(_) => "join_failed",
            Error::Signaling(_) => "signaling_error",
            Error::WebSocket(_) => "websocket_error",
            Error::Serialization(_) => "serialization_error",
            Error::SessionNotFound(_) => "session_not_found",
            Error::SessionAlreadyActive(_) => "session_already_active",
            Error::PeerConnection(_) => "peer_connection_error",
            Error::IceCandidate(_) => "ice_candidate_error",
            Error::Sdp(_) => "sdp_error",
            Error::Internal(_) => "internal_error",
            Error::Io(_) => "io_error",
            Error::Other(_) => "error",
        }
    }

    /// Map a server `error` message definition onto the error taxonomy
    pub fn from_server_definition(definition: &str, information: Option<&str>) -> Self {
        let detail = match information {
            Some(info) => format!("{definition}: {info}"),
            None => definition.to_string(),
        };
        match definition {
            "streamIdInUse" => Error::SessionAlreadyActive(detail),
            "no_stream_exist" | "no_active_streams_in_room" => Error::SessionNotFound(detail),
            "join_timeout" => Error::JoinTimeout(detail),
            "joinRoomFailed" | "unauthorized_access" | "license_suspended_please_renew_license"
            | "publishTimeoutError" => Error::JoinFailed(detail),
            "notSetRemoteDescription" => Error::RemoteDescriptionMissing(detail),
            "data_store_not_available" | "high_resource_usage" => Error::Signaling(detail),
            _ => Error::Signaling(detail),
        }
    }
}
