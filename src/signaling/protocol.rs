//! Signaling wire protocol
//!
//! One JSON object per WebSocket text frame, discriminated by `command`.
//! Field names are the media platform's wire names, hence camelCase and the
//! `Command` suffixes some commands carry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::peer::SdpType;
use crate::{Error, Result};

/// A signaling message, outbound or inbound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum SignalingCommand {
    /// Announce a publish session (outbound)
    #[serde(rename = "publish", rename_all = "camelCase")]
    Publish {
        /// Stream identifier
        stream_id: String,
        /// Stream security token
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        /// Time-based one-time-password subscriber id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscriber_id: Option<String>,
        /// Time-based one-time-password subscriber code
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscriber_code: Option<String>,
        /// Human-readable stream name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_name: Option<String>,
        /// Main track this stream publishes under
        #[serde(default, skip_serializing_if = "Option::is_none")]
        main_track: Option<String>,
        /// Whether video is published
        video: bool,
        /// Whether audio is published
        audio: bool,
        /// Free-form metadata forwarded to the server
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta_data: Option<String>,
        /// Conference role
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },

    /// Request playback of a stream (outbound)
    #[serde(rename = "play", rename_all = "camelCase")]
    Play {
        /// Stream identifier
        stream_id: String,
        /// Stream security token
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        /// Room the stream belongs to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        /// Subtrack ids to enable for multitrack playback
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        track_list: Vec<String>,
        /// Time-based one-time-password subscriber id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscriber_id: Option<String>,
        /// Time-based one-time-password subscriber code
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscriber_code: Option<String>,
        /// Free-form viewer metadata
        #[serde(default, skip_serializing_if = "Option::is_none")]
        viewer_info: Option<String>,
        /// Conference role
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        /// Stream id this viewer publishes, when also publishing
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_publish_id: Option<String>,
    },

    /// Server grants negotiation for a publish (inbound)
    #[serde(rename = "start", rename_all = "camelCase")]
    Start {
        /// Stream identifier
        stream_id: String,
    },

    /// Session description exchange (both directions)
    #[serde(rename = "takeConfiguration", rename_all = "camelCase")]
    TakeConfiguration {
        /// Stream identifier
        stream_id: String,
        /// Offer or answer
        #[serde(rename = "type")]
        kind: SdpType,
        /// SDP body
        sdp: String,
        /// Track id mapping attached by the server
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id_mapping: Option<Value>,
    },

    /// ICE candidate exchange (both directions)
    #[serde(rename = "takeCandidate", rename_all = "camelCase")]
    TakeCandidate {
        /// Stream identifier
        stream_id: String,
        /// SDP m-line index
        label: u32,
        /// SDP mid
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Candidate attribute string; empty marks end-of-candidates
        candidate: String,
    },

    /// End a session (both directions)
    #[serde(rename = "stop", rename_all = "camelCase")]
    Stop {
        /// Stream identifier
        stream_id: String,
    },

    /// Heartbeat (outbound)
    #[serde(rename = "ping")]
    Ping,

    /// Heartbeat reply (inbound)
    #[serde(rename = "pong")]
    Pong,

    /// Join a conference room (outbound)
    #[serde(rename = "joinRoom", rename_all = "camelCase")]
    JoinRoom {
        /// Room name
        room: String,
        /// Main track, same as the room on this platform
        #[serde(default, skip_serializing_if = "Option::is_none")]
        main_track: Option<String>,
        /// Participant's stream id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
        /// Room mode (legacy, mcu, amcu)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
        /// Human-readable stream name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_name: Option<String>,
        /// Conference role
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        /// Free-form metadata
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<String>,
    },

    /// Leave a conference room (outbound)
    #[serde(rename = "leaveFromRoom", rename_all = "camelCase")]
    LeaveFromRoom {
        /// Room name
        room: String,
        /// Main track, same as the room on this platform
        #[serde(default, skip_serializing_if = "Option::is_none")]
        main_track: Option<String>,
        /// Participant's stream id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
    },

    /// Query stream info (outbound); answered by `streamInformation`
    #[serde(rename = "getStreamInfo", rename_all = "camelCase")]
    GetStreamInfo {
        /// Stream identifier
        stream_id: String,
    },

    /// Query the broadcast object (outbound)
    #[serde(rename = "getBroadcastObject", rename_all = "camelCase")]
    GetBroadcastObject {
        /// Stream identifier
        stream_id: String,
    },

    /// Query room info (outbound); answered by `roomInformation`
    #[serde(rename = "getRoomInfo", rename_all = "camelCase")]
    GetRoomInfo {
        /// Room name
        room: String,
        /// Requester's stream id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
    },

    /// Query the track ids under a main stream (outbound)
    #[serde(rename = "getTrackList", rename_all = "camelCase")]
    GetTrackList {
        /// Main stream identifier
        stream_id: String,
        /// Stream security token
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Query subtracks of a main track (outbound)
    #[serde(rename = "getSubtracks", rename_all = "camelCase")]
    GetSubtracks {
        /// Main track identifier
        stream_id: String,
        /// Filter by role
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        /// Pagination offset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<u32>,
        /// Pagination size
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u32>,
    },

    /// Query subtrack count of a main track (outbound)
    #[serde(rename = "getSubtracksCount", rename_all = "camelCase")]
    GetSubtracksCount {
        /// Main track identifier
        stream_id: String,
        /// Filter by role
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        /// Filter by status
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },

    /// Query subscriber count (outbound)
    #[serde(rename = "getSubscriberCount", rename_all = "camelCase")]
    GetSubscriberCount {
        /// Stream identifier
        stream_id: String,
    },

    /// Query the subscriber list (outbound)
    #[serde(rename = "getSubscribers", rename_all = "camelCase")]
    GetSubscribers {
        /// Stream identifier
        stream_id: String,
        /// Pagination offset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<u32>,
        /// Pagination size
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u32>,
    },

    /// Query video track assignments (outbound)
    #[serde(rename = "getVideoTrackAssignmentsCommand", rename_all = "camelCase")]
    GetVideoTrackAssignments {
        /// Stream identifier
        stream_id: String,
    },

    /// Pin or unpin a video track (outbound)
    #[serde(rename = "assignVideoTrackCommand", rename_all = "camelCase")]
    AssignVideoTrack {
        /// Stream identifier
        stream_id: String,
        /// Track to pin
        video_track_id: String,
        /// Pin or unpin
        enabled: bool,
    },

    /// Page the participants mapped onto video tracks (outbound)
    #[serde(rename = "updateVideoTrackAssignmentsCommand", rename_all = "camelCase")]
    UpdateVideoTrackAssignments {
        /// Stream identifier
        stream_id: String,
        /// Start index of the participant page
        offset: u32,
        /// Number of participants to play
        size: u32,
    },

    /// Cap the number of video tracks in a conference (outbound)
    #[serde(rename = "setMaxVideoTrackCountCommand", rename_all = "camelCase")]
    SetMaxVideoTrackCount {
        /// Stream identifier
        stream_id: String,
        /// Maximum video track count
        max_track_count: u32,
    },

    /// Toggle server-side video forwarding for a track (outbound)
    #[serde(rename = "toggleVideo", rename_all = "camelCase")]
    ToggleVideo {
        /// Stream identifier
        stream_id: String,
        /// Track identifier (the stream id itself for single-track streams)
        track_id: String,
        /// Forward or suppress
        enabled: bool,
    },

    /// Toggle server-side audio forwarding for a track (outbound)
    #[serde(rename = "toggleAudio", rename_all = "camelCase")]
    ToggleAudio {
        /// Stream identifier
        stream_id: String,
        /// Track identifier
        track_id: String,
        /// Forward or suppress
        enabled: bool,
    },

    /// Relay a message to the other peer (both directions)
    #[serde(rename = "peerMessageCommand", rename_all = "camelCase")]
    PeerMessage {
        /// Stream identifier
        stream_id: String,
        /// Message type tag
        definition: String,
        /// Message payload
        data: Value,
    },

    /// Update a stream's free-form metadata (outbound)
    #[serde(rename = "updateStreamMetaData", rename_all = "camelCase")]
    UpdateStreamMetaData {
        /// Stream identifier
        stream_id: String,
        /// New metadata
        meta_data: String,
    },

    /// Enable or disable data flow for a subtrack (outbound)
    #[serde(rename = "enableTrack", rename_all = "camelCase")]
    EnableTrack {
        /// Main track identifier
        stream_id: String,
        /// Subtrack identifier
        track_id: String,
        /// Enable or disable
        enabled: bool,
    },

    /// Force a specific adaptive-bitrate rendition (outbound)
    #[serde(rename = "forceStreamQuality", rename_all = "camelCase")]
    ForceStreamQuality {
        /// Stream identifier
        stream_id: String,
        /// Desired rendition height; 0 restores automatic selection
        stream_height: u32,
    },

    /// Server-reported error (inbound)
    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        /// Error definition string
        definition: String,
        /// Additional detail
        #[serde(default, skip_serializing_if = "Option::is_none")]
        information: Option<String>,
        /// Stream the error relates to, when session-scoped
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
    },

    /// Server notification (inbound); payload varies by definition
    #[serde(rename = "notification", rename_all = "camelCase")]
    Notification {
        /// Notification definition (joinedTheRoom, publish_started, ...)
        definition: String,
        /// Stream the notification relates to, when present
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
        /// Remaining notification fields
        #[serde(flatten)]
        payload: Value,
    },

    /// Stream info response (inbound)
    #[serde(rename = "streamInformation", rename_all = "camelCase")]
    StreamInformation {
        /// Stream identifier
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
        /// Response fields
        #[serde(flatten)]
        payload: Value,
    },

    /// Room info response (inbound)
    #[serde(rename = "roomInformation", rename_all = "camelCase")]
    RoomInformation {
        /// Room name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        /// Response fields
        #[serde(flatten)]
        payload: Value,
    },

    /// Track list response (inbound)
    #[serde(rename = "trackList", rename_all = "camelCase")]
    TrackList {
        /// Main stream identifier
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
        /// Track identifiers
        #[serde(default)]
        track_list: Vec<String>,
    },
}

impl SignalingCommand {
    /// Serialize for the wire
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse an inbound frame
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// The stream id the command relates to, when session-scoped
    pub fn stream_id(&self) -> Option<&str> {
        match self {
            SignalingCommand::Publish { stream_id, .. }
            | SignalingCommand::Play { stream_id, .. }
            | SignalingCommand::Start { stream_id }
            | SignalingCommand::TakeConfiguration { stream_id, .. }
            | SignalingCommand::TakeCandidate { stream_id, .. }
            | SignalingCommand::Stop { stream_id }
            | SignalingCommand::GetStreamInfo { stream_id }
            | SignalingCommand::GetBroadcastObject { stream_id }
            | SignalingCommand::GetTrackList { stream_id, .. }
            | SignalingCommand::GetSubtracks { stream_id, .. }
            | SignalingCommand::GetSubtracksCount { stream_id, .. }
            | SignalingCommand::GetSubscriberCount { stream_id }
            | SignalingCommand::GetSubscribers { stream_id, .. }
            | SignalingCommand::GetVideoTrackAssignments { stream_id }
            | SignalingCommand::AssignVideoTrack { stream_id, .. }
            | SignalingCommand::UpdateVideoTrackAssignments { stream_id, .. }
            | SignalingCommand::SetMaxVideoTrackCount { stream_id, .. }
            | SignalingCommand::ToggleVideo { stream_id, .. }
            | SignalingCommand::ToggleAudio { stream_id, .. }
            | SignalingCommand::PeerMessage { stream_id, .. }
            | SignalingCommand::UpdateStreamMetaData { stream_id, .. }
            | SignalingCommand::EnableTrack { stream_id, .. }
            | SignalingCommand::ForceStreamQuality { stream_id, .. } => Some(stream_id),
            SignalingCommand::JoinRoom { stream_id, .. }
            | SignalingCommand::LeaveFromRoom { stream_id, .. }
            | SignalingCommand::GetRoomInfo { stream_id, .. }
            | SignalingCommand::Error { stream_id, .. }
            | SignalingCommand::Notification { stream_id, .. }
            | SignalingCommand::StreamInformation { stream_id, .. }
            | SignalingCommand::TrackList { stream_id, .. } => stream_id.as_deref(),
            SignalingCommand::Ping
            | SignalingCommand::Pong
            | SignalingCommand::RoomInformation { .. } => None,
        }
    }
}
