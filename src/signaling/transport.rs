//! WebSocket signaling transport
//!
//! One connection shared by every session. A supervisor task owns the
//! connect/read loop and, when auto-reconnect is enabled, redials with
//! exponential backoff after an unexpected drop. Outbound frames go through
//! a sender task fed by an unbounded channel; the [`CommandSink`] impl is
//! the only write path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::peer::ReconnectPolicy;
use crate::signaling::{CommandSink, SignalingCommand};
use crate::{Error, Result};

/// Transport-level notification delivered to the client dispatch loop
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection is open; heartbeat is running
    Up {
        /// True when this connection replaced a dropped one
        reconnected: bool,
    },
    /// The connection dropped or a dial attempt failed
    Down {
        /// The failure, when one was observed
        error: Option<Error>,
    },
    /// A parsed inbound command
    Command(SignalingCommand),
}

/// The signaling WebSocket connection
pub struct SignalingTransport {
    url: String,
    ping_interval: Duration,
    auto_reconnect: bool,
    policy: ReconnectPolicy,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    connected: AtomicBool,
    closed: AtomicBool,
    force_immediate: AtomicBool,
    interrupt: Notify,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl SignalingTransport {
    /// Create a transport for the configured endpoint
    ///
    /// Returns the transport and the receiver for its [`TransportEvent`]s.
    pub fn new(config: &ClientConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            url: config.websocket_url.clone(),
            ping_interval: config.ping_interval,
            auto_reconnect: config.auto_reconnect,
            policy: config.transport_reconnect.clone(),
            events: events_tx,
            outbound: Mutex::new(None),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            force_immediate: AtomicBool::new(false),
            interrupt: Notify::new(),
            supervisor: Mutex::new(None),
            heartbeat: Mutex::new(None),
        });
        (transport, events_rx)
    }

    /// Open the connection and start the supervisor
    ///
    /// Resolves once the first dial attempt completes. When the first dial
    /// fails and auto-reconnect is enabled, the supervisor keeps retrying in
    /// the background even though this returns the dial error.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::TransportUnavailable(
                "transport already closed".to_string(),
            ));
        }

        let (first_tx, first_rx) = oneshot::channel();
        let task = tokio::spawn(Arc::clone(self).run(first_tx));
        *self.supervisor.lock().expect("transport lock poisoned") = Some(task);

        first_rx
            .await
            .map_err(|_| Error::TransportUnavailable("transport task exited".to_string()))?
    }

    /// Supervisor loop: dial, drive the connection, redial after a drop
    async fn run(self: Arc<Self>, first: oneshot::Sender<Result<()>>) {
        let mut first = Some(first);
        let mut attempt = 0u32;
        let mut reconnected = false;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            match connect_async(&self.url).await {
                Ok((stream, _response)) => {
                    info!(url = %self.url, reconnected, "signaling connected");
                    attempt = 0;
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Ok(()));
                    }
                    self.drive_connection(stream, reconnected).await;
                    reconnected = true;
                }
                Err(err) => {
                    warn!(url = %self.url, error = %err, "signaling dial failed");
                    let detail = err.to_string();
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Err(Error::WebSocket(detail.clone())));
                    }
                    let _ = self.events.send(TransportEvent::Down {
                        error: Some(Error::WebSocket(detail)),
                    });
                }
            }

            if self.closed.load(Ordering::SeqCst) || !self.auto_reconnect {
                break;
            }
            if !self.force_immediate.swap(false, Ordering::SeqCst) {
                let delay = self.policy.backoff(attempt);
                attempt = attempt.saturating_add(1);
                debug!(delay_ms = delay.as_millis() as u64, "signaling redial scheduled");
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Drive one open connection until it drops or is interrupted
    async fn drive_connection(
        self: &Arc<Self>,
        stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        reconnected: bool,
    ) {
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let sender = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if let Err(err) = sink.send(message).await {
                    debug!(error = %err, "signaling send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        *self.outbound.lock().expect("transport lock poisoned") = Some(out_tx);
        self.connected.store(true, Ordering::SeqCst);
        self.start_heartbeat();
        let _ = self.events.send(TransportEvent::Up { reconnected });

        let error = loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(raw))) => self.dispatch(&raw),
                    Some(Ok(Message::Close(_))) | None => break None,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Some(Error::WebSocket(err.to_string())),
                },
                _ = self.interrupt.notified() => break None,
            }
        };

        self.connected.store(false, Ordering::SeqCst);
        self.stop_heartbeat();
        self.outbound.lock().expect("transport lock poisoned").take();
        sender.abort();

        if !self.closed.load(Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Down { error });
        }
    }

    /// Parse one inbound text frame and forward it
    fn dispatch(&self, raw: &str) {
        match SignalingCommand::from_json(raw) {
            Ok(SignalingCommand::Pong) => debug!("pong"),
            Ok(command) => {
                let _ = self.events.send(TransportEvent::Command(command));
            }
            Err(err) => {
                warn!(error = %err, frame = raw, "dropping unparseable signaling frame");
            }
        }
    }

    /// Start the periodic ping task; replaces a running one
    pub fn start_heartbeat(self: &Arc<Self>) {
        let transport = Arc::downgrade(self);
        let period = self.ping_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(transport) = transport.upgrade() else {
                    break;
                };
                if transport.send(&SignalingCommand::Ping).is_err() {
                    break;
                }
            }
        });
        let mut heartbeat = self.heartbeat.lock().expect("transport lock poisoned");
        if let Some(old) = heartbeat.replace(task) {
            old.abort();
        }
    }

    /// Stop the periodic ping task; idempotent
    pub fn stop_heartbeat(&self) {
        if let Some(task) = self
            .heartbeat
            .lock()
            .expect("transport lock poisoned")
            .take()
        {
            task.abort();
        }
    }

    /// Drop the current connection and redial without backoff delay
    ///
    /// Used when the server announces it is about to stop.
    pub fn force_reconnect(&self) {
        if self.connected.load(Ordering::SeqCst) {
            self.force_immediate.store(true, Ordering::SeqCst);
            self.interrupt.notify_one();
        }
    }

    /// Close the transport permanently
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_heartbeat();
        self.interrupt.notify_one();
        self.outbound.lock().expect("transport lock poisoned").take();
        if let Some(task) = self
            .supervisor
            .lock()
            .expect("transport lock poisoned")
            .take()
        {
            task.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl CommandSink for SignalingTransport {
    fn send(&self, command: &SignalingCommand) -> Result<()> {
        let outbound = self.outbound.lock().expect("transport lock poisoned");
        let Some(tx) = outbound.as_ref() else {
            return Err(Error::TransportUnavailable(
                "signaling connection is not open".to_string(),
            ));
        };
        let json = command.to_json()?;
        tx.send(Message::Text(json))
            .map_err(|_| Error::TransportUnavailable("signaling sender task gone".to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SignalingTransport {
    fn drop(&mut self) {
        if let Some(task) = self
            .supervisor
            .lock()
            .expect("transport lock poisoned")
            .take()
        {
            task.abort();
        }
        if let Some(task) = self
            .heartbeat
            .lock()
            .expect("transport lock poisoned")
            .take()
        {
            task.abort();
        }
    }
}
