//! Stream-id keyed session registry
//!
//! Exclusively owns the `StreamId → PeerSession` map. Inbound signaling
//! lands here; session-scoped commands go to their session, everything else
//! becomes a typed event on the bus.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::events::{Event, EventBus};
use crate::peer::{PeerConnectionFactory, PeerSession, PlayOptions, PublishOptions, SessionOptions, SessionState};
use crate::signaling::{CommandSink, SignalingCommand};
use crate::{Error, Result};

/// Owns every active [`PeerSession`]
pub struct SessionManager {
    config: ClientConfig,
    sink: Arc<dyn CommandSink>,
    factory: Arc<dyn PeerConnectionFactory>,
    bus: EventBus,
    sessions: RwLock<HashMap<String, Arc<PeerSession>>>,
}

impl SessionManager {
    pub(crate) fn new(
        config: ClientConfig,
        sink: Arc<dyn CommandSink>,
        factory: Arc<dyn PeerConnectionFactory>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            sink,
            factory,
            bus,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a publish session for the stream
    pub async fn publish(&self, stream_id: &str, options: PublishOptions) -> Result<Arc<PeerSession>> {
        let session = self
            .open(stream_id, SessionOptions::Publish(options))
            .await?;
        self.bus.emit(Event::PublishRequested {
            stream_id: stream_id.to_string(),
        });
        Ok(session)
    }

    /// Start a play session for the stream
    pub async fn play(&self, stream_id: &str, options: PlayOptions) -> Result<Arc<PeerSession>> {
        let session = self.open(stream_id, SessionOptions::Play(options)).await?;
        self.bus.emit(Event::PlayRequested {
            stream_id: stream_id.to_string(),
        });
        Ok(session)
    }

    async fn open(&self, stream_id: &str, options: SessionOptions) -> Result<Arc<PeerSession>> {
        let session = PeerSession::new(
            stream_id,
            options,
            &self.config,
            Arc::clone(&self.sink),
            Arc::clone(&self.factory),
            self.bus.clone(),
        );

        {
            let mut sessions = self.sessions.write().expect("session map lock poisoned");
            // Closed sessions are pruned lazily; a stale entry must not
            // block a fresh announce for the same stream.
            sessions.retain(|_, existing| existing.state() != SessionState::Closed);
            if sessions.contains_key(stream_id) {
                return Err(Error::SessionAlreadyActive(stream_id.to_string()));
            }
            sessions.insert(stream_id.to_string(), Arc::clone(&session));
        }

        if let Err(err) = session.start().await {
            self.sessions
                .write()
                .expect("session map lock poisoned")
                .remove(stream_id);
            return Err(err);
        }
        Ok(session)
    }

    /// Stop a session: notify the server and release the capability
    pub async fn stop(&self, stream_id: &str) -> Result<()> {
        let session = self
            .remove(stream_id)
            .ok_or_else(|| Error::SessionNotFound(stream_id.to_string()))?;

        if self.sink.is_connected() {
            if let Err(err) = self.sink.send(&SignalingCommand::Stop {
                stream_id: stream_id.to_string(),
            }) {
                debug!(stream_id, error = %err, "stop command not sent");
            }
        }
        session.close().await;
        Ok(())
    }

    /// Look up an active session
    pub fn get(&self, stream_id: &str) -> Option<Arc<PeerSession>> {
        self.sessions
            .read()
            .expect("session map lock poisoned")
            .get(stream_id)
            .cloned()
    }

    fn remove(&self, stream_id: &str) -> Option<Arc<PeerSession>> {
        self.sessions
            .write()
            .expect("session map lock poisoned")
            .remove(stream_id)
    }

    /// Number of sessions not yet closed
    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .expect("session map lock poisoned")
            .values()
            .filter(|s| s.state() != SessionState::Closed)
            .count()
    }

    /// Close every session
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<PeerSession>> = {
            let mut map = self.sessions.write().expect("session map lock poisoned");
            map.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            session.close().await;
        }
    }

    /// Replay every live session's announce after a transport reconnect
    pub async fn reannounce_all(&self) {
        let sessions: Vec<Arc<PeerSession>> = {
            let map = self.sessions.read().expect("session map lock poisoned");
            map.values().cloned().collect()
        };
        for session in sessions {
            session.re_announce().await;
        }
    }

    /// Route one inbound signaling command
    pub async fn route(&self, command: SignalingCommand) {
        match command {
            SignalingCommand::Error {
                definition,
                information,
                stream_id,
            } => {
                let error = Error::from_server_definition(&definition, information.as_deref());
                let session = stream_id.as_deref().and_then(|id| self.get(id));
                match session {
                    Some(session) if error.is_fatal() => {
                        session.fail(error).await;
                    }
                    _ => {
                        warn!(definition, stream_id = ?stream_id, "server error");
                        self.bus.emit(Event::Error {
                            stream_id,
                            error: Arc::new(error),
                        });
                    }
                }
            }

            SignalingCommand::Notification {
                definition,
                stream_id,
                payload,
            } => self.route_notification(definition, stream_id, payload),

            SignalingCommand::StreamInformation { stream_id, payload } => {
                self.bus.emit(Event::StreamInformation { stream_id, payload });
            }
            SignalingCommand::RoomInformation { room, payload } => {
                self.bus.emit(Event::RoomInformation { room, payload });
            }
            SignalingCommand::TrackList {
                stream_id,
                track_list,
            } => {
                self.bus.emit(Event::TrackList {
                    stream_id,
                    tracks: track_list,
                });
            }

            SignalingCommand::Pong => {}

            command @ (SignalingCommand::Start { .. }
            | SignalingCommand::TakeConfiguration { .. }
            | SignalingCommand::TakeCandidate { .. }
            | SignalingCommand::Stop { .. }) => {
                let Some(stream_id) = command.stream_id().map(str::to_string) else {
                    return;
                };
                match self.get(&stream_id) {
                    Some(session) => session.handle_command(command).await,
                    None => {
                        warn!(stream_id = %stream_id, command = ?command, "command for unknown session");
                    }
                }
            }

            other => {
                debug!(command = ?other, "dropping unroutable inbound command");
            }
        }
    }

    /// Map a notification's definition onto a typed event
    fn route_notification(&self, definition: String, stream_id: Option<String>, payload: Value) {
        let count = payload.get("count").and_then(Value::as_u64);
        let event = match definition.as_str() {
            "broadcastObject" => Event::BroadcastObject { stream_id, payload },
            "subtrackList" => Event::SubtrackList { stream_id, payload },
            "subtracksCount" => Event::SubtracksCount { stream_id, count },
            "subscriberCount" => Event::SubscriberCount { stream_id, count },
            "subscriberList" => Event::SubscriberList { stream_id, payload },
            "videoTrackAssignmentList" => Event::VideoTrackAssignments { stream_id, payload },
            _ => Event::ServerNotification {
                definition,
                stream_id,
                payload,
            },
        };
        self.bus.emit(event);
    }
}
