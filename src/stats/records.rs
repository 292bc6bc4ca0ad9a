//! Raw statistics records queried from the capability
//!
//! Field names follow the W3C stats identifiers so raw snapshots can be
//! deserialized directly from a capability's JSON report.

use serde::{Deserialize, Serialize};

/// Media kind a record applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

/// One raw statistics record, discriminated by its `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatsRecord {
    /// Outbound RTP stream (publish direction)
    #[serde(rename = "outbound-rtp", rename_all = "camelCase")]
    OutboundRtp {
        /// Media kind
        kind: MediaKind,
        /// Cumulative bytes sent
        #[serde(default)]
        bytes_sent: u64,
        /// Cumulative packets sent
        #[serde(default)]
        packets_sent: u64,
        /// Cumulative frames encoded (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frames_encoded: Option<u64>,
        /// Encoded frame width (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_width: Option<u32>,
        /// Encoded frame height (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_height: Option<u32>,
        /// Reason encoding quality is limited, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality_limitation_reason: Option<String>,
    },

    /// Inbound RTP stream (play direction)
    #[serde(rename = "inbound-rtp", rename_all = "camelCase")]
    InboundRtp {
        /// Media kind
        kind: MediaKind,
        /// Cumulative bytes received
        #[serde(default)]
        bytes_received: u64,
        /// Cumulative packets received
        #[serde(default)]
        packets_received: u64,
        /// Cumulative packets lost
        #[serde(default)]
        packets_lost: i64,
        /// Packet jitter in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jitter: Option<f64>,
        /// Cumulative frames decoded (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frames_decoded: Option<u64>,
        /// Cumulative frames dropped (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frames_dropped: Option<u64>,
        /// Cumulative frames received (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frames_received: Option<u64>,
        /// Decoded frame width (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_width: Option<u32>,
        /// Decoded frame height (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_height: Option<u32>,
    },

    /// Remote peer's view of our outbound stream (publish direction)
    #[serde(rename = "remote-inbound-rtp", rename_all = "camelCase")]
    RemoteInboundRtp {
        /// Media kind
        kind: MediaKind,
        /// Packets lost as seen by the remote peer
        #[serde(default, skip_serializing_if = "Option::is_none")]
        packets_lost: Option<i64>,
        /// Round-trip time in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round_trip_time: Option<f64>,
        /// Packet jitter in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jitter: Option<f64>,
    },

    /// Track-level statistics
    #[serde(rename = "track", rename_all = "camelCase")]
    Track {
        /// Media kind
        kind: MediaKind,
        /// Instantaneous audio level (audio only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_level: Option<f64>,
        /// Cumulative jitter-buffer delay in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jitter_buffer_delay: Option<f64>,
        /// Samples emitted from the jitter buffer
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jitter_buffer_emitted_count: Option<u64>,
        /// Frame width (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_width: Option<u32>,
        /// Frame height (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_height: Option<u32>,
        /// Cumulative frames decoded (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frames_decoded: Option<u64>,
        /// Cumulative frames dropped (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frames_dropped: Option<u64>,
        /// Cumulative frames received (video only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frames_received: Option<u64>,
    },

    /// ICE candidate pair
    #[serde(rename = "candidate-pair", rename_all = "camelCase")]
    CandidatePair {
        /// Pair state; only `succeeded` pairs contribute to the snapshot
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<String>,
        /// Estimated available outgoing bitrate in bits per second
        #[serde(default, skip_serializing_if = "Option::is_none")]
        available_outgoing_bitrate: Option<f64>,
        /// Most recent round-trip time in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_round_trip_time: Option<f64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_names() {
        let json = r#"{
            "type": "outbound-rtp",
            "kind": "video",
            "bytesSent": 5000,
            "packetsSent": 50,
            "qualityLimitationReason": "bandwidth"
        }"#;
        let record: StatsRecord = serde_json::from_str(json).unwrap();
        match record {
            StatsRecord::OutboundRtp {
                kind,
                bytes_sent,
                packets_sent,
                quality_limitation_reason,
                ..
            } => {
                assert_eq!(kind, MediaKind::Video);
                assert_eq!(bytes_sent, 5000);
                assert_eq!(packets_sent, 50);
                assert_eq!(quality_limitation_reason.as_deref(), Some("bandwidth"));
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn test_candidate_pair_parsing() {
        let json = r#"{
            "type": "candidate-pair",
            "state": "succeeded",
            "availableOutgoingBitrate": 4000000.0,
            "currentRoundTripTime": 0.012
        }"#;
        let record: StatsRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(
            record,
            StatsRecord::CandidatePair {
                available_outgoing_bitrate: Some(b),
                ..
            } if (b - 4_000_000.0).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = r#"{"type": "inbound-rtp", "kind": "audio"}"#;
        let record: StatsRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(
            record,
            StatsRecord::InboundRtp {
                bytes_received: 0,
                packets_lost: 0,
                jitter: None,
                ..
            }
        ));
    }
}
