//! Shared test harness: in-process signaling server and mock capability.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use streamgate_webrtc::{
    DataChannelHandle, IceCandidate, PeerConnection, PeerConnectionFactory, PeerEvent, Result,
    SessionDescription, SessionRole, StatsRecord,
};

type WsSink = futures::stream::SplitSink<WebSocketStream<TcpStream>, Message>;

static TRACING: Once = Once::new();

/// Route test logs through `RUST_LOG`; silent unless the filter is set.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// In-process WebSocket signaling server.
///
/// Accepts any number of sequential connections, records every inbound JSON
/// frame, and lets tests push frames to (or drop) the current connection.
pub struct SignalingServer {
    addr: SocketAddr,
    inner: Arc<ServerInner>,
}

struct ServerInner {
    received: StdMutex<Vec<Value>>,
    current: Mutex<Option<WsSink>>,
    connections: AtomicUsize,
    drop_current: Notify,
}

impl SignalingServer {
    pub async fn start() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let inner = Arc::new(ServerInner {
            received: StdMutex::new(Vec::new()),
            current: Mutex::new(None),
            connections: AtomicUsize::new(0),
            drop_current: Notify::new(),
        });

        let accept_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                accept_inner.connections.fetch_add(1, Ordering::SeqCst);
                let (sink, mut source) = ws.split();
                *accept_inner.current.lock().await = Some(sink);

                loop {
                    tokio::select! {
                        frame = source.next() => match frame {
                            Some(Ok(Message::Text(raw))) => {
                                if let Ok(value) = serde_json::from_str(&raw) {
                                    accept_inner.received.lock().unwrap().push(value);
                                }
                            }
                            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                            Some(Ok(_)) => {}
                        },
                        _ = accept_inner.drop_current.notified() => {
                            accept_inner.current.lock().await.take();
                            break;
                        }
                    }
                }
            }
        });

        Self { addr, inner }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/websocket", self.addr)
    }

    pub fn received(&self) -> Vec<Value> {
        self.inner.received.lock().unwrap().clone()
    }

    /// Frames received with the given `command` discriminator.
    pub fn received_commands(&self, command: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|v| v["command"] == command)
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Push one JSON frame to the current connection.
    pub async fn send(&self, frame: Value) {
        let mut current = self.inner.current.lock().await;
        let sink = current.as_mut().expect("no active connection");
        sink.send(Message::Text(frame.to_string())).await.unwrap();
    }

    /// Drop the current connection without a close handshake.
    pub fn drop_connection(&self) {
        self.inner.drop_current.notify_one();
    }

    /// Poll until `predicate` passes over the received frames, or time out.
    pub async fn wait_until<F>(&self, predicate: F, timeout: Duration) -> bool
    where
        F: Fn(&[Value]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(&self.received()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Recording data-channel handle.
#[derive(Default)]
pub struct MockDataChannel {
    pub sent_text: StdMutex<Vec<String>>,
    pub sent_binary: StdMutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl DataChannelHandle for MockDataChannel {
    fn is_open(&self) -> bool {
        true
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.sent_text.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_binary(&self, frame: &[u8]) -> Result<()> {
        self.sent_binary.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Recording capability instance with canned SDP.
pub struct MockPeerConnection {
    pub calls: StdMutex<Vec<String>>,
    pub channel: Arc<MockDataChannel>,
}

impl Default for MockPeerConnection {
    fn default() -> Self {
        Self {
            calls: StdMutex::new(Vec::new()),
            channel: Arc::new(MockDataChannel::default()),
        }
    }
}

impl MockPeerConnection {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.calls.lock().unwrap().push("create_offer".into());
        Ok(SessionDescription::offer("v=0 mock-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.calls.lock().unwrap().push("create_answer".into());
        Ok(SessionDescription::answer("v=0 mock-answer"))
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("set_local:{}", description.kind));
        Ok(())
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("set_remote:{}", description.kind));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("add_candidate:{}", candidate.candidate));
        Ok(())
    }

    async fn get_stats(&self) -> Result<Vec<StatsRecord>> {
        Ok(Vec::new())
    }

    fn data_channel(&self) -> Option<Arc<dyn DataChannelHandle>> {
        Some(Arc::clone(&self.channel) as Arc<dyn DataChannelHandle>)
    }

    async fn close(&self) -> Result<()> {
        self.calls.lock().unwrap().push("close".into());
        Ok(())
    }
}

/// Factory that records every created capability and its event sender, so
/// tests can inject `PeerEvent`s.
#[derive(Default)]
pub struct MockFactory {
    created: StdMutex<Vec<Arc<MockPeerConnection>>>,
    senders: StdMutex<Vec<mpsc::UnboundedSender<PeerEvent>>>,
}

impl MockFactory {
    pub fn latest(&self) -> Arc<MockPeerConnection> {
        self.created.lock().unwrap().last().unwrap().clone()
    }

    pub fn latest_sender(&self) -> mpsc::UnboundedSender<PeerEvent> {
        self.senders.lock().unwrap().last().unwrap().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl PeerConnectionFactory for MockFactory {
    async fn create(
        &self,
        _stream_id: &str,
        _role: SessionRole,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>> {
        let connection = Arc::new(MockPeerConnection::default());
        self.created.lock().unwrap().push(Arc::clone(&connection));
        self.senders.lock().unwrap().push(events);
        Ok(connection)
    }
}
