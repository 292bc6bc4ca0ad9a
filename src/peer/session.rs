//! Peer session state machine
//!
//! One session per stream id. A session owns exactly one capability
//! instance at a time, drives the offer/answer exchange over signaling,
//! buffers early ICE candidates, and runs the reconnect policy when
//! connectivity drops.
//!
//! State machine: `Idle → Negotiating → Connected → Reconnecting → Closed`.
//! `Closed` is terminal; every async continuation re-checks the current
//! state and becomes a no-op once it is reached.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channels::DataChannelBridge;
use crate::config::ClientConfig;
use crate::events::{Event, EventBus};
use crate::peer::{
    DataChannelHandle, IceCandidate, IceConnectionState, PeerConnection, PeerConnectionFactory,
    PeerEvent, ReconnectPolicy, SdpType, SessionDescription, SessionRole,
};
use crate::signaling::{CommandSink, SignalingCommand};
use crate::stats::StatsRecord;
use crate::{Error, Result};

/// Lifecycle state of a [`PeerSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet announced
    Idle,
    /// Announced; offer/answer exchange in progress
    Negotiating,
    /// ICE reported connected or completed
    Connected,
    /// Connectivity lost; a reconnect cycle is scheduled
    Reconnecting,
    /// Terminal; the capability has been released
    Closed,
}

/// Options for a publish session
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Stream security token
    pub token: Option<String>,
    /// Time-based one-time-password subscriber id
    pub subscriber_id: Option<String>,
    /// Time-based one-time-password subscriber code
    pub subscriber_code: Option<String>,
    /// Human-readable stream name
    pub stream_name: Option<String>,
    /// Main track this stream publishes under
    pub main_track: Option<String>,
    /// Free-form metadata forwarded to the server
    pub meta_data: Option<String>,
    /// Conference role
    pub role: Option<String>,
    /// Publish video (default: true)
    pub video: bool,
    /// Publish audio (default: true)
    pub audio: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            token: None,
            subscriber_id: None,
            subscriber_code: None,
            stream_name: None,
            main_track: None,
            meta_data: None,
            role: None,
            video: true,
            audio: true,
        }
    }
}

/// Options for a play session
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    /// Stream security token
    pub token: Option<String>,
    /// Room the stream belongs to
    pub room: Option<String>,
    /// Subtrack ids to enable for multitrack playback
    pub track_list: Vec<String>,
    /// Time-based one-time-password subscriber id
    pub subscriber_id: Option<String>,
    /// Time-based one-time-password subscriber code
    pub subscriber_code: Option<String>,
    /// Free-form viewer metadata
    pub viewer_info: Option<String>,
    /// Conference role
    pub role: Option<String>,
    /// Stream id this viewer publishes, when also publishing
    pub user_publish_id: Option<String>,
}

/// Retained announce parameters, replayed on every reconnect
#[derive(Debug, Clone)]
pub enum SessionOptions {
    /// Publish with the given options
    Publish(PublishOptions),
    /// Play with the given options
    Play(PlayOptions),
}

impl SessionOptions {
    /// The role these options imply
    pub fn role(&self) -> SessionRole {
        match self {
            SessionOptions::Publish(_) => SessionRole::Publisher,
            SessionOptions::Play(_) => SessionRole::Subscriber,
        }
    }
}

/// Per-round negotiation state
///
/// `remote_description_set` and the pending queue live under one lock so
/// the drain happens exactly once per round.
struct Negotiation {
    remote_description_set: bool,
    pending: VecDeque<IceCandidate>,
}

/// A single stream's peer session
pub struct PeerSession {
    stream_id: String,
    role: SessionRole,
    options: SessionOptions,
    sink: Arc<dyn CommandSink>,
    factory: Arc<dyn PeerConnectionFactory>,
    bus: EventBus,
    bridge: DataChannelBridge,

    auto_reconnect: bool,
    policy: ReconnectPolicy,
    join_timeout: Duration,
    disconnected_grace: Duration,
    candidate_types: Vec<String>,

    state: Mutex<SessionState>,
    pc: Mutex<Option<Arc<dyn PeerConnection>>>,
    negotiation: Mutex<Negotiation>,
    // Bumped on every negotiation round; timers armed for an older round
    // become no-ops.
    round: AtomicU64,
    ice_disconnected: AtomicBool,
    reconnect_attempts: AtomicU32,
    failed: AtomicBool,
    close_notify: Notify,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl PeerSession {
    pub(crate) fn new(
        stream_id: impl Into<String>,
        options: SessionOptions,
        config: &ClientConfig,
        sink: Arc<dyn CommandSink>,
        factory: Arc<dyn PeerConnectionFactory>,
        bus: EventBus,
    ) -> Arc<Self> {
        let stream_id = stream_id.into();
        let bridge = DataChannelBridge::new(
            stream_id.clone(),
            config.sanitize_data_channel_strings,
            bus.clone(),
        );
        Arc::new(Self {
            role: options.role(),
            stream_id,
            options,
            sink,
            factory,
            bus,
            bridge,
            auto_reconnect: config.auto_reconnect,
            policy: config.session_reconnect.clone(),
            join_timeout: config.join_timeout,
            disconnected_grace: config.disconnected_grace,
            candidate_types: config.candidate_types.clone(),
            state: Mutex::new(SessionState::Idle),
            pc: Mutex::new(None),
            negotiation: Mutex::new(Negotiation {
                remote_description_set: false,
                pending: VecDeque::new(),
            }),
            round: AtomicU64::new(0),
            ice_disconnected: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            failed: AtomicBool::new(false),
            close_notify: Notify::new(),
            pump: Mutex::new(None),
        })
    }

    /// The stream this session belongs to
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Publisher or subscriber
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("session state lock poisoned")
    }

    /// Reconnect attempts in the current outage, zero while healthy
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: SessionState) -> SessionState {
        let mut state = self.state.lock().expect("session state lock poisoned");
        std::mem::replace(&mut *state, next)
    }

    fn capability(&self) -> Option<Arc<dyn PeerConnection>> {
        self.pc.lock().expect("session pc lock poisoned").clone()
    }

    /// Announce the session and begin the first negotiation round
    pub(crate) async fn start(self: &Arc<Self>) -> Result<()> {
        self.begin_round().await
    }

    /// Tear down the previous round (if any) and announce a fresh one
    async fn begin_round(self: &Arc<Self>) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Err(Error::SessionNotFound(format!(
                "session {} is closed",
                self.stream_id
            )));
        }

        let round = self.round.fetch_add(1, Ordering::SeqCst) + 1;
        self.ice_disconnected.store(false, Ordering::SeqCst);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let capability = self
            .factory
            .create(&self.stream_id, self.role, events_tx)
            .await?;

        let previous = self
            .pc
            .lock()
            .expect("session pc lock poisoned")
            .replace(capability);
        if let Some(previous) = previous {
            if let Err(err) = previous.close().await {
                debug!(stream_id = %self.stream_id, error = %err, "stale capability close failed");
            }
        }

        {
            let mut negotiation = self
                .negotiation
                .lock()
                .expect("session negotiation lock poisoned");
            negotiation.remote_description_set = false;
            negotiation.pending.clear();
        }

        let pump = tokio::spawn(Arc::clone(self).pump(events_rx));
        if let Some(old) = self
            .pump
            .lock()
            .expect("session pump lock poisoned")
            .replace(pump)
        {
            old.abort();
        }

        self.set_state(SessionState::Negotiating);
        self.sink.send(&self.announce_command())?;
        self.bus.emit(Event::NegotiationStarted {
            stream_id: self.stream_id.clone(),
        });
        self.arm_join_timer(round);
        Ok(())
    }

    /// Type-erased round start for spawned retry loops
    ///
    /// `begin_round` spawns the pump, whose events can schedule another
    /// round; boxing here keeps the recursion out of the inferred future
    /// type so the retry task stays `Send`.
    fn begin_round_boxed(self: Arc<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move { self.begin_round().await })
    }

    /// Re-announce after a signaling transport reconnect
    ///
    /// Server-side signaling state does not survive a transport drop, so the
    /// session replays its announce with the retained options.
    pub(crate) async fn re_announce(self: &Arc<Self>) {
        if self.state() == SessionState::Closed {
            return;
        }
        info!(stream_id = %self.stream_id, "re-announcing after transport reconnect");
        if let Err(err) = self.begin_round().await {
            warn!(stream_id = %self.stream_id, error = %err, "re-announce failed");
            self.emit_error(err);
        }
    }

    fn announce_command(&self) -> SignalingCommand {
        match &self.options {
            SessionOptions::Publish(options) => SignalingCommand::Publish {
                stream_id: self.stream_id.clone(),
                token: options.token.clone(),
                subscriber_id: options.subscriber_id.clone(),
                subscriber_code: options.subscriber_code.clone(),
                stream_name: options.stream_name.clone(),
                main_track: options.main_track.clone(),
                video: options.video,
                audio: options.audio,
                meta_data: options.meta_data.clone(),
                role: options.role.clone(),
            },
            SessionOptions::Play(options) => SignalingCommand::Play {
                stream_id: self.stream_id.clone(),
                token: options.token.clone(),
                room: options.room.clone(),
                track_list: options.track_list.clone(),
                subscriber_id: options.subscriber_id.clone(),
                subscriber_code: options.subscriber_code.clone(),
                viewer_info: options.viewer_info.clone(),
                role: options.role.clone(),
                user_publish_id: options.user_publish_id.clone(),
            },
        }
    }

    /// Route one inbound signaling command for this stream
    pub(crate) async fn handle_command(self: &Arc<Self>, command: SignalingCommand) {
        if self.state() == SessionState::Closed {
            return;
        }
        let result = match command {
            SignalingCommand::Start { .. } => self.handle_start().await,
            SignalingCommand::TakeConfiguration { kind, sdp, .. } => {
                self.handle_remote_description(kind, sdp).await
            }
            SignalingCommand::TakeCandidate {
                label,
                id,
                candidate,
                ..
            } => {
                self.handle_remote_candidate(IceCandidate {
                    candidate,
                    label,
                    sdp_mid: id,
                })
                .await
            }
            SignalingCommand::Stop { .. } => {
                self.close().await;
                Ok(())
            }
            other => {
                debug!(stream_id = %self.stream_id, command = ?other, "command not session-routable");
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!(stream_id = %self.stream_id, error = %err, "signaling command failed");
            self.emit_error(err);
        }
    }

    /// Server granted negotiation; the publisher sends its offer
    async fn handle_start(self: &Arc<Self>) -> Result<()> {
        if self.role != SessionRole::Publisher {
            debug!(stream_id = %self.stream_id, "ignoring start for subscriber session");
            return Ok(());
        }
        let Some(capability) = self.capability() else {
            return Ok(());
        };
        let offer = capability.create_offer().await?;
        capability.set_local_description(&offer).await?;
        self.sink.send(&SignalingCommand::TakeConfiguration {
            stream_id: self.stream_id.clone(),
            kind: SdpType::Offer,
            sdp: offer.sdp,
            id_mapping: None,
        })?;
        Ok(())
    }

    /// Apply the remote description, drain queued candidates, answer offers
    async fn handle_remote_description(self: &Arc<Self>, kind: SdpType, sdp: String) -> Result<()> {
        let Some(capability) = self.capability() else {
            return Ok(());
        };
        let description = SessionDescription { kind, sdp };
        capability.set_remote_description(&description).await?;

        // Flip the flag and take the queue atomically; this round's drain
        // happens exactly once.
        let drained: Vec<IceCandidate> = {
            let mut negotiation = self
                .negotiation
                .lock()
                .expect("session negotiation lock poisoned");
            negotiation.remote_description_set = true;
            negotiation.pending.drain(..).collect()
        };
        for candidate in &drained {
            capability.add_ice_candidate(candidate).await?;
        }
        if !drained.is_empty() {
            debug!(stream_id = %self.stream_id, count = drained.len(), "applied queued candidates");
        }

        if kind == SdpType::Offer {
            let answer = capability.create_answer().await?;
            capability.set_local_description(&answer).await?;
            self.sink.send(&SignalingCommand::TakeConfiguration {
                stream_id: self.stream_id.clone(),
                kind: SdpType::Answer,
                sdp: answer.sdp,
                id_mapping: None,
            })?;
        }
        Ok(())
    }

    /// Apply a remote candidate, or queue it until the description lands
    async fn handle_remote_candidate(self: &Arc<Self>, candidate: IceCandidate) -> Result<()> {
        {
            let mut negotiation = self
                .negotiation
                .lock()
                .expect("session negotiation lock poisoned");
            if !negotiation.remote_description_set {
                negotiation.pending.push_back(candidate);
                return Ok(());
            }
        }
        let Some(capability) = self.capability() else {
            return Ok(());
        };
        capability.add_ice_candidate(&candidate).await
    }

    /// Consume capability notifications for one round
    async fn pump(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<PeerEvent>) {
        loop {
            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = self.close_notify.notified() => break,
            };
            if self.state() == SessionState::Closed {
                break;
            }
            match event {
                PeerEvent::IceCandidate(candidate) => self.forward_local_candidate(candidate),
                PeerEvent::IceConnectionState(state) => self.handle_ice_state(state).await,
                PeerEvent::DataChannelOpen => self.bridge.handle_open(),
                PeerEvent::DataChannelClose => self.bridge.handle_close(),
                PeerEvent::DataChannelMessage(payload) => self.bridge.handle_message(payload),
                PeerEvent::DataChannelError(detail) => self.bridge.handle_error(detail),
            }
        }
    }

    /// Forward a locally gathered candidate, applying the protocol filter
    ///
    /// The empty end-of-candidates marker is always forwarded; a filtered
    /// candidate is a warning, not an error.
    fn forward_local_candidate(&self, candidate: IceCandidate) {
        if !candidate.is_end_of_candidates() {
            let allowed = candidate
                .protocol()
                .map(|protocol| self.candidate_types.iter().any(|t| *t == protocol))
                .unwrap_or(false);
            if !allowed {
                warn!(
                    stream_id = %self.stream_id,
                    candidate = %candidate.candidate,
                    supported = ?self.candidate_types,
                    "candidate protocol not supported, not forwarding"
                );
                return;
            }
        }
        let command = SignalingCommand::TakeCandidate {
            stream_id: self.stream_id.clone(),
            label: candidate.label,
            id: candidate.sdp_mid,
            candidate: candidate.candidate,
        };
        if let Err(err) = self.sink.send(&command) {
            debug!(stream_id = %self.stream_id, error = %err, "candidate not sent");
        }
    }

    async fn handle_ice_state(self: &Arc<Self>, state: IceConnectionState) {
        debug!(stream_id = %self.stream_id, ice_state = ?state, "ice state changed");
        match state {
            IceConnectionState::Connected | IceConnectionState::Completed => {
                self.ice_disconnected.store(false, Ordering::SeqCst);
                self.reconnect_attempts.store(0, Ordering::SeqCst);
                let previous = {
                    let mut current = self.state.lock().expect("session state lock poisoned");
                    if *current == SessionState::Closed {
                        return;
                    }
                    std::mem::replace(&mut *current, SessionState::Connected)
                };
                if previous != SessionState::Connected {
                    info!(stream_id = %self.stream_id, "session connected");
                    self.bus.emit(Event::SessionConnected {
                        stream_id: self.stream_id.clone(),
                    });
                }
            }
            IceConnectionState::Disconnected => {
                if self.state() != SessionState::Connected {
                    return;
                }
                self.ice_disconnected.store(true, Ordering::SeqCst);
                self.bus.emit(Event::SessionDisconnected {
                    stream_id: self.stream_id.clone(),
                });
                self.arm_grace_timer();
            }
            IceConnectionState::Failed => {
                warn!(stream_id = %self.stream_id, "ice failed");
                self.trigger_reconnect("ice failure").await;
            }
            IceConnectionState::New
            | IceConnectionState::Checking
            | IceConnectionState::Closed => {}
        }
    }

    /// Give a transient `disconnected` the grace window to self-heal
    fn arm_grace_timer(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(session.disconnected_grace).await;
            if !session.ice_disconnected.load(Ordering::SeqCst) {
                return;
            }
            if session.state() != SessionState::Connected {
                return;
            }
            warn!(stream_id = %session.stream_id, "grace period elapsed without recovery");
            session.trigger_reconnect("disconnected grace elapsed").await;
        });
    }

    /// Fail the session if it never reaches `Connected` this round
    fn arm_join_timer(self: &Arc<Self>, round: u64) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(session.join_timeout).await;
            if session.round.load(Ordering::SeqCst) != round {
                return;
            }
            match session.state() {
                SessionState::Connected | SessionState::Closed => {}
                _ => {
                    warn!(stream_id = %session.stream_id, "join timeout");
                    if session.auto_reconnect {
                        session.trigger_reconnect("join timeout").await;
                    } else {
                        session
                            .fail(Error::JoinTimeout(format!(
                                "session {} did not connect within {:?}",
                                session.stream_id, session.join_timeout
                            )))
                            .await;
                    }
                }
            }
        });
    }

    /// Enter a reconnect cycle; only one cycle runs at a time
    async fn trigger_reconnect(self: &Arc<Self>, reason: &str) {
        {
            let mut state = self.state.lock().expect("session state lock poisoned");
            match *state {
                SessionState::Closed | SessionState::Reconnecting => return,
                _ => *state = SessionState::Reconnecting,
            }
        }

        if !self.auto_reconnect {
            self.fail(Error::PeerConnection(format!(
                "connection lost ({reason}) and auto-reconnect is disabled"
            )))
            .await;
            return;
        }

        let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.policy.should_retry(attempt - 1) {
            self.fail(Error::JoinFailed(format!(
                "reconnect attempts exhausted after {} tries ({reason})",
                attempt - 1
            )))
            .await;
            return;
        }

        info!(stream_id = %self.stream_id, attempt, reason, "scheduling reconnect");
        self.bus.emit(Event::ReconnectAttempt {
            stream_id: self.stream_id.clone(),
            attempt,
        });

        let session = Arc::clone(self);
        let mut delay = self.policy.backoff(attempt - 1);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                if session.state() != SessionState::Reconnecting {
                    return;
                }
                match Arc::clone(&session).begin_round_boxed().await {
                    Ok(()) => return,
                    Err(err) => {
                        warn!(stream_id = %session.stream_id, error = %err, "reconnect round failed");
                        // begin_round moved us to Negotiating before the
                        // announce failed; fall back for the next try.
                        session.set_state(SessionState::Reconnecting);
                        let attempt =
                            session.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                        if !session.policy.should_retry(attempt - 1) {
                            session
                                .fail(Error::JoinFailed(format!(
                                    "reconnect attempts exhausted after {} tries",
                                    attempt - 1
                                )))
                                .await;
                            return;
                        }
                        session.bus.emit(Event::ReconnectAttempt {
                            stream_id: session.stream_id.clone(),
                            attempt,
                        });
                        delay = session.policy.backoff(attempt - 1);
                    }
                }
            }
        });
    }

    /// Surface a fatal error exactly once, then close
    pub(crate) async fn fail(self: &Arc<Self>, error: Error) {
        if self.failed.swap(true, Ordering::SeqCst) {
            self.close().await;
            return;
        }
        warn!(stream_id = %self.stream_id, error = %error, "session failed");
        self.bus.emit(Event::Error {
            stream_id: Some(self.stream_id.clone()),
            error: Arc::new(error),
        });
        self.close().await;
    }

    /// Close the session and release the capability; idempotent
    pub(crate) async fn close(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().expect("session state lock poisoned");
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }
        self.close_notify.notify_waiters();

        let capability = self.pc.lock().expect("session pc lock poisoned").take();
        if let Some(capability) = capability {
            if let Err(err) = capability.close().await {
                debug!(stream_id = %self.stream_id, error = %err, "capability close failed");
            }
        }

        info!(stream_id = %self.stream_id, "session closed");
        self.bus.emit(Event::SessionClosed {
            stream_id: self.stream_id.clone(),
        });
    }

    fn emit_error(&self, error: Error) {
        self.bus.emit(Event::Error {
            stream_id: Some(self.stream_id.clone()),
            error: Arc::new(error),
        });
    }

    /// Query the capability's raw statistics
    pub(crate) async fn query_stats(&self) -> Result<Vec<StatsRecord>> {
        let capability = self.capability().ok_or_else(|| {
            Error::PeerConnection(format!("no active capability for {}", self.stream_id))
        })?;
        capability.get_stats().await
    }

    fn data_channel(&self) -> Result<Arc<dyn DataChannelHandle>> {
        self.capability()
            .and_then(|capability| capability.data_channel())
            .ok_or_else(|| {
                Error::DataChannelTransport(format!(
                    "session {} has no data channel",
                    self.stream_id
                ))
            })
    }

    /// Send a text message over the session's data channel
    pub(crate) async fn send_text(&self, text: &str) -> Result<()> {
        let channel = self.data_channel()?;
        self.bridge.send_text(&channel, text).await
    }

    /// Send a binary payload over the session's data channel
    pub(crate) async fn send_binary(&self, data: &[u8]) -> Result<()> {
        let channel = self.data_channel()?;
        self.bridge.send_binary(&channel, data).await
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().expect("session pump lock poisoned").take() {
            pump.abort();
        }
    }
}
