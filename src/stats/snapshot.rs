//! Normalized statistics snapshot
//!
//! Reduces the heterogeneous raw record set into one flat report keyed by
//! media kind, with bitrates derived from consecutive snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::records::{MediaKind, StatsRecord};

/// Normalized statistics for one session, produced on each poll tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Total bytes sent across outbound streams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes_sent: Option<u64>,
    /// Total bytes received across inbound streams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes_received: Option<u64>,
    /// Audio packets sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_packets_sent: Option<u64>,
    /// Video packets sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_packets_sent: Option<u64>,
    /// Audio packets received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_packets_received: Option<u64>,
    /// Video packets received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_packets_received: Option<u64>,
    /// Audio packets lost (inbound, or remote view when publishing)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_packets_lost: Option<i64>,
    /// Video packets lost (inbound, or remote view when publishing)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_packets_lost: Option<i64>,
    /// Audio jitter in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_jitter: Option<f64>,
    /// Video jitter in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_jitter: Option<f64>,
    /// Audio round-trip time in seconds (publish direction)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_round_trip_time: Option<f64>,
    /// Video round-trip time in seconds (publish direction)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_round_trip_time: Option<f64>,
    /// Frame width of the active video stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_width: Option<u32>,
    /// Frame height of the active video stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_height: Option<u32>,
    /// Frames encoded (publish direction)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_encoded: Option<u64>,
    /// Frames decoded (play direction)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_decoded: Option<u64>,
    /// Frames dropped (play direction)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_dropped: Option<u64>,
    /// Frames received (play direction)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_received: Option<u64>,
    /// Instantaneous audio level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_level: Option<f64>,
    /// Reason encoding quality is limited, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_limitation_reason: Option<String>,
    /// Average audio jitter-buffer delay in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_jitter_average_delay: Option<f64>,
    /// Average video jitter-buffer delay in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_jitter_average_delay: Option<f64>,
    /// Estimated available outgoing bitrate in kbps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_outgoing_bitrate_kbps: Option<u64>,
    /// Most recent ICE round-trip time in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_round_trip_time: Option<f64>,
    /// Send bitrate in kbps, derived from consecutive snapshots;
    /// absent on the first poll
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_bitrate_kbps: Option<u64>,
    /// Receive bitrate in kbps, derived from consecutive snapshots;
    /// absent on the first poll
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_bitrate_kbps: Option<u64>,
}

impl StatsSnapshot {
    /// Reduce a raw record set in one pass
    pub fn reduce(records: &[StatsRecord]) -> Self {
        let mut snapshot = StatsSnapshot::default();

        for record in records {
            match record {
                StatsRecord::OutboundRtp {
                    kind,
                    bytes_sent,
                    packets_sent,
                    frames_encoded,
                    frame_width,
                    frame_height,
                    quality_limitation_reason,
                } => {
                    *snapshot.total_bytes_sent.get_or_insert(0) += bytes_sent;
                    match kind {
                        MediaKind::Audio => snapshot.audio_packets_sent = Some(*packets_sent),
                        MediaKind::Video => {
                            snapshot.video_packets_sent = Some(*packets_sent);
                            merge(&mut snapshot.frame_width, *frame_width);
                            merge(&mut snapshot.frame_height, *frame_height);
                        }
                    }
                    if let Some(encoded) = frames_encoded {
                        *snapshot.frames_encoded.get_or_insert(0) += encoded;
                    }
                    if quality_limitation_reason.is_some() {
                        snapshot.quality_limitation_reason = quality_limitation_reason.clone();
                    }
                }

                StatsRecord::InboundRtp {
                    kind,
                    bytes_received,
                    packets_received,
                    packets_lost,
                    jitter,
                    frames_decoded,
                    frames_dropped,
                    frames_received,
                    frame_width,
                    frame_height,
                } => {
                    *snapshot.total_bytes_received.get_or_insert(0) += bytes_received;
                    match kind {
                        MediaKind::Audio => {
                            snapshot.audio_packets_received = Some(*packets_received);
                            snapshot.audio_packets_lost = Some(*packets_lost);
                            merge(&mut snapshot.audio_jitter, *jitter);
                        }
                        MediaKind::Video => {
                            snapshot.video_packets_received = Some(*packets_received);
                            snapshot.video_packets_lost = Some(*packets_lost);
                            merge(&mut snapshot.video_jitter, *jitter);
                            merge(&mut snapshot.frames_decoded, *frames_decoded);
                            merge(&mut snapshot.frames_dropped, *frames_dropped);
                            merge(&mut snapshot.frames_received, *frames_received);
                            merge(&mut snapshot.frame_width, *frame_width);
                            merge(&mut snapshot.frame_height, *frame_height);
                        }
                    }
                }

                StatsRecord::RemoteInboundRtp {
                    kind,
                    packets_lost,
                    round_trip_time,
                    jitter,
                } => match kind {
                    MediaKind::Audio => {
                        merge(&mut snapshot.audio_packets_lost, *packets_lost);
                        merge(&mut snapshot.audio_round_trip_time, *round_trip_time);
                        merge(&mut snapshot.audio_jitter, *jitter);
                    }
                    MediaKind::Video => {
                        merge(&mut snapshot.video_packets_lost, *packets_lost);
                        merge(&mut snapshot.video_round_trip_time, *round_trip_time);
                        merge(&mut snapshot.video_jitter, *jitter);
                    }
                },

                StatsRecord::Track {
                    kind,
                    audio_level,
                    jitter_buffer_delay,
                    jitter_buffer_emitted_count,
                    frame_width,
                    frame_height,
                    frames_decoded,
                    frames_dropped,
                    frames_received,
                } => {
                    let average_delay = match (jitter_buffer_delay, jitter_buffer_emitted_count) {
                        (Some(delay), Some(count)) if *count > 0 => Some(delay / *count as f64),
                        _ => None,
                    };
                    match kind {
                        MediaKind::Audio => {
                            merge(&mut snapshot.audio_level, *audio_level);
                            merge(&mut snapshot.audio_jitter_average_delay, average_delay);
                        }
                        MediaKind::Video => {
                            merge(&mut snapshot.video_jitter_average_delay, average_delay);
                            merge(&mut snapshot.frame_width, *frame_width);
                            merge(&mut snapshot.frame_height, *frame_height);
                            merge(&mut snapshot.frames_decoded, *frames_decoded);
                            merge(&mut snapshot.frames_dropped, *frames_dropped);
                            merge(&mut snapshot.frames_received, *frames_received);
                        }
                    }
                }

                StatsRecord::CandidatePair {
                    state,
                    available_outgoing_bitrate,
                    current_round_trip_time,
                } => {
                    if state.as_deref() == Some("succeeded") {
                        if let Some(bitrate) = available_outgoing_bitrate {
                            snapshot.available_outgoing_bitrate_kbps =
                                Some((bitrate / 1000.0) as u64);
                        }
                        merge(&mut snapshot.current_round_trip_time, *current_round_trip_time);
                    }
                }
            }
        }

        snapshot
    }

    /// Derive kbps rate fields from the previous snapshot's cumulative
    /// counters and the elapsed time between polls
    pub fn compute_rates(&mut self, previous: &StatsSnapshot, elapsed: Duration) {
        let millis = elapsed.as_millis() as u64;
        if millis == 0 {
            return;
        }

        if let (Some(current), Some(prior)) = (self.total_bytes_sent, previous.total_bytes_sent) {
            if current >= prior {
                self.send_bitrate_kbps = Some(8 * (current - prior) / millis);
            }
        }
        if let (Some(current), Some(prior)) =
            (self.total_bytes_received, previous.total_bytes_received)
        {
            if current >= prior {
                self.receive_bitrate_kbps = Some(8 * (current - prior) / millis);
            }
        }
    }
}

fn merge<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}
