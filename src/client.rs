//! Client facade
//!
//! Wires the transport, session registry and stats collector together and
//! exposes the public API surface. One dispatch task consumes transport
//! events; everything the caller observes arrives on the [`EventBus`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::events::{Event, EventBus};
use crate::peer::{PeerConnectionFactory, PlayOptions, PublishOptions};
use crate::session::SessionManager;
use crate::signaling::{CommandSink, SignalingCommand, SignalingTransport, TransportEvent};
use crate::stats::StatsCollector;
use crate::{Error, Result};

/// WebRTC signaling and session client
///
/// ```no_run
/// use std::sync::Arc;
/// use streamgate_webrtc::{ClientConfig, PublishOptions, WebRtcClient};
/// # use streamgate_webrtc::PeerConnectionFactory;
/// # async fn run(factory: Arc<dyn PeerConnectionFactory>) -> streamgate_webrtc::Result<()> {
/// let config = ClientConfig {
///     websocket_url: "wss://media.example.com/WebRTCAppEE/websocket".to_string(),
///     ..Default::default()
/// };
/// let client = WebRtcClient::new(config, factory)?;
/// client.connect().await?;
/// client.publish("stream-1", PublishOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
pub struct WebRtcClient {
    config: ClientConfig,
    bus: EventBus,
    transport: Arc<SignalingTransport>,
    manager: Arc<SessionManager>,
    stats: Arc<StatsCollector>,
    transport_events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl WebRtcClient {
    /// Create a client; the configuration is validated up front
    pub fn new(config: ClientConfig, factory: Arc<dyn PeerConnectionFactory>) -> Result<Self> {
        config.validate()?;
        let bus = EventBus::new();
        let (transport, transport_events) = SignalingTransport::new(&config);
        let manager = Arc::new(SessionManager::new(
            config.clone(),
            Arc::clone(&transport) as Arc<dyn CommandSink>,
            factory,
            bus.clone(),
        ));
        let stats = Arc::new(StatsCollector::new(bus.clone()));
        Ok(Self {
            config,
            bus,
            transport,
            manager,
            stats,
            transport_events: Mutex::new(Some(transport_events)),
            dispatch: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// The event bus callers subscribe on
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Open the signaling connection and start dispatching
    pub async fn connect(&self) -> Result<()> {
        let events = self
            .transport_events
            .lock()
            .expect("client lock poisoned")
            .take()
            .ok_or_else(|| Error::Internal("client already connected".to_string()))?;

        let task = tokio::spawn(Self::dispatch(
            events,
            self.bus.clone(),
            Arc::clone(&self.manager),
            Arc::clone(&self.transport),
        ));
        *self.dispatch.lock().expect("client lock poisoned") = Some(task);

        self.transport.connect().await
    }

    /// Consume transport events until the transport closes
    async fn dispatch(
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        bus: EventBus,
        manager: Arc<SessionManager>,
        transport: Arc<SignalingTransport>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Up { reconnected } => {
                    bus.emit(Event::Initialized);
                    if reconnected {
                        info!("transport reconnected, re-announcing sessions");
                        manager.reannounce_all().await;
                    }
                }
                TransportEvent::Down { error } => {
                    if let Some(error) = error {
                        bus.emit(Event::Error {
                            stream_id: None,
                            error: Arc::new(error),
                        });
                    }
                }
                TransportEvent::Command(command) => {
                    // The server drains connections before a shutdown; drop
                    // ours proactively and redial without delay.
                    if let SignalingCommand::Notification { definition, .. } = &command {
                        if definition == "server_will_stop" {
                            warn!("server announced shutdown, forcing reconnect");
                            transport.force_reconnect();
                        }
                    }
                    manager.route(command).await;
                }
            }
        }
    }

    /// Start publishing a stream
    pub async fn publish(&self, stream_id: &str, options: PublishOptions) -> Result<()> {
        self.manager.publish(stream_id, options).await.map(|_| ())
    }

    /// Start playing a stream
    pub async fn play(&self, stream_id: &str, options: PlayOptions) -> Result<()> {
        self.manager.play(stream_id, options).await.map(|_| ())
    }

    /// Stop a session
    pub async fn stop(&self, stream_id: &str) -> Result<()> {
        self.stats.disable(stream_id);
        self.manager.stop(stream_id).await
    }

    /// Send a text message over a session's data channel
    pub async fn send_text(&self, stream_id: &str, text: &str) -> Result<()> {
        self.session(stream_id)?.send_text(text).await
    }

    /// Send a binary payload over a session's data channel
    pub async fn send_binary(&self, stream_id: &str, data: &[u8]) -> Result<()> {
        self.session(stream_id)?.send_binary(data).await
    }

    /// Start periodic stats for a session
    ///
    /// Enabling twice replaces the running timer rather than leaking one.
    pub fn enable_stats(&self, stream_id: &str) -> Result<()> {
        let session = self.session(stream_id)?;
        self.stats.enable(session, self.config.stats_interval);
        Ok(())
    }

    /// Stop periodic stats for a session; idempotent
    pub fn disable_stats(&self, stream_id: &str) {
        self.stats.disable(stream_id);
    }

    fn session(&self, stream_id: &str) -> Result<Arc<crate::peer::PeerSession>> {
        self.manager
            .get(stream_id)
            .ok_or_else(|| Error::SessionNotFound(stream_id.to_string()))
    }

    /// Join a conference room
    pub fn join_room(
        &self,
        room: &str,
        stream_id: Option<&str>,
        mode: Option<&str>,
        role: Option<&str>,
    ) -> Result<()> {
        self.transport.send(&SignalingCommand::JoinRoom {
            room: room.to_string(),
            main_track: Some(room.to_string()),
            stream_id: stream_id.map(str::to_string),
            mode: mode.map(str::to_string),
            stream_name: None,
            role: role.map(str::to_string),
            metadata: None,
        })
    }

    /// Leave a conference room
    pub fn leave_room(&self, room: &str, stream_id: Option<&str>) -> Result<()> {
        self.transport.send(&SignalingCommand::LeaveFromRoom {
            room: room.to_string(),
            main_track: Some(room.to_string()),
            stream_id: stream_id.map(str::to_string),
        })
    }

    /// Request stream info; answered by [`Event::StreamInformation`]
    pub fn get_stream_info(&self, stream_id: &str) -> Result<()> {
        self.transport.send(&SignalingCommand::GetStreamInfo {
            stream_id: stream_id.to_string(),
        })
    }

    /// Request the broadcast object; answered by [`Event::BroadcastObject`]
    pub fn get_broadcast_object(&self, stream_id: &str) -> Result<()> {
        self.transport.send(&SignalingCommand::GetBroadcastObject {
            stream_id: stream_id.to_string(),
        })
    }

    /// Request room info; answered by [`Event::RoomInformation`]
    pub fn get_room_info(&self, room: &str, stream_id: Option<&str>) -> Result<()> {
        self.transport.send(&SignalingCommand::GetRoomInfo {
            room: room.to_string(),
            stream_id: stream_id.map(str::to_string),
        })
    }

    /// Request the track list of a main stream
    pub fn get_track_list(&self, stream_id: &str, token: Option<&str>) -> Result<()> {
        self.transport.send(&SignalingCommand::GetTrackList {
            stream_id: stream_id.to_string(),
            token: token.map(str::to_string),
        })
    }

    /// Request a page of subtracks of a main track
    pub fn get_subtracks(
        &self,
        stream_id: &str,
        role: Option<&str>,
        offset: Option<u32>,
        size: Option<u32>,
    ) -> Result<()> {
        self.transport.send(&SignalingCommand::GetSubtracks {
            stream_id: stream_id.to_string(),
            role: role.map(str::to_string),
            offset,
            size,
        })
    }

    /// Request the subtrack count of a main track
    pub fn get_subtracks_count(
        &self,
        stream_id: &str,
        role: Option<&str>,
        status: Option<&str>,
    ) -> Result<()> {
        self.transport.send(&SignalingCommand::GetSubtracksCount {
            stream_id: stream_id.to_string(),
            role: role.map(str::to_string),
            status: status.map(str::to_string),
        })
    }

    /// Request the subscriber count of a stream
    pub fn get_subscriber_count(&self, stream_id: &str) -> Result<()> {
        self.transport.send(&SignalingCommand::GetSubscriberCount {
            stream_id: stream_id.to_string(),
        })
    }

    /// Request a page of a stream's subscriber list
    pub fn get_subscribers(
        &self,
        stream_id: &str,
        offset: Option<u32>,
        size: Option<u32>,
    ) -> Result<()> {
        self.transport.send(&SignalingCommand::GetSubscribers {
            stream_id: stream_id.to_string(),
            offset,
            size,
        })
    }

    /// Request video track assignments
    pub fn request_video_track_assignments(&self, stream_id: &str) -> Result<()> {
        self.transport
            .send(&SignalingCommand::GetVideoTrackAssignments {
                stream_id: stream_id.to_string(),
            })
    }

    /// Pin or unpin a video track
    pub fn assign_video_track(
        &self,
        stream_id: &str,
        video_track_id: &str,
        enabled: bool,
    ) -> Result<()> {
        self.transport.send(&SignalingCommand::AssignVideoTrack {
            stream_id: stream_id.to_string(),
            video_track_id: video_track_id.to_string(),
            enabled,
        })
    }

    /// Page the participants mapped onto video tracks
    pub fn update_video_track_assignments(
        &self,
        stream_id: &str,
        offset: u32,
        size: u32,
    ) -> Result<()> {
        self.transport
            .send(&SignalingCommand::UpdateVideoTrackAssignments {
                stream_id: stream_id.to_string(),
                offset,
                size,
            })
    }

    /// Cap the number of video tracks in a conference
    pub fn set_max_video_track_count(&self, stream_id: &str, max_track_count: u32) -> Result<()> {
        self.transport
            .send(&SignalingCommand::SetMaxVideoTrackCount {
                stream_id: stream_id.to_string(),
                max_track_count,
            })
    }

    /// Toggle server-side video forwarding for a track
    pub fn toggle_video(&self, stream_id: &str, track_id: &str, enabled: bool) -> Result<()> {
        self.transport.send(&SignalingCommand::ToggleVideo {
            stream_id: stream_id.to_string(),
            track_id: track_id.to_string(),
            enabled,
        })
    }

    /// Toggle server-side audio forwarding for a track
    pub fn toggle_audio(&self, stream_id: &str, track_id: &str, enabled: bool) -> Result<()> {
        self.transport.send(&SignalingCommand::ToggleAudio {
            stream_id: stream_id.to_string(),
            track_id: track_id.to_string(),
            enabled,
        })
    }

    /// Relay a message to the other peer through the server
    pub fn send_peer_message(&self, stream_id: &str, definition: &str, data: Value) -> Result<()> {
        self.transport.send(&SignalingCommand::PeerMessage {
            stream_id: stream_id.to_string(),
            definition: definition.to_string(),
            data,
        })
    }

    /// Update a stream's free-form metadata
    pub fn update_stream_meta_data(&self, stream_id: &str, meta_data: &str) -> Result<()> {
        self.transport.send(&SignalingCommand::UpdateStreamMetaData {
            stream_id: stream_id.to_string(),
            meta_data: meta_data.to_string(),
        })
    }

    /// Enable or disable data flow for a subtrack
    pub fn enable_track(&self, stream_id: &str, track_id: &str, enabled: bool) -> Result<()> {
        self.transport.send(&SignalingCommand::EnableTrack {
            stream_id: stream_id.to_string(),
            track_id: track_id.to_string(),
            enabled,
        })
    }

    /// Force a specific adaptive-bitrate rendition height
    pub fn force_stream_quality(&self, stream_id: &str, stream_height: u32) -> Result<()> {
        self.transport.send(&SignalingCommand::ForceStreamQuality {
            stream_id: stream_id.to_string(),
            stream_height,
        })
    }

    /// Whether the signaling transport is open
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Close everything: sessions, stats timers, transport
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stats.disable_all();
        self.manager.close_all().await;
        self.transport.close();
        if let Some(task) = self.dispatch.lock().expect("client lock poisoned").take() {
            task.abort();
        }
        self.bus.emit(Event::Closed);
    }
}
