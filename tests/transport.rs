//! Signaling transport integration tests against an in-process server.

mod harness;

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use harness::SignalingServer;
use streamgate_webrtc::{
    ClientConfig, CommandSink, Error, ReconnectPolicy, SignalingCommand, SignalingTransport,
    TransportEvent,
};

fn test_config(url: String) -> ClientConfig {
    ClientConfig {
        websocket_url: url,
        ping_interval: Duration::from_millis(30),
        transport_reconnect: ReconnectPolicy {
            max_attempts: u32::MAX,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
            jitter_enabled: false,
        },
        ..Default::default()
    }
}

async fn recv_event(
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    timeout: Duration,
) -> Option<TransportEvent> {
    tokio::time::timeout(timeout, events.recv()).await.ok()?
}

#[tokio::test]
async fn test_connect_sends_and_receives_commands() {
    let server = SignalingServer::start().await;
    let (transport, mut events) = SignalingTransport::new(&test_config(server.url()));

    transport.connect().await.unwrap();
    assert!(transport.is_connected());
    assert!(matches!(
        recv_event(&mut events, Duration::from_secs(1)).await,
        Some(TransportEvent::Up { reconnected: false })
    ));

    transport
        .send(&SignalingCommand::GetStreamInfo {
            stream_id: "s1".to_string(),
        })
        .unwrap();
    assert!(
        server
            .wait_until(
                |frames| frames.iter().any(|f| f["command"] == "getStreamInfo"),
                Duration::from_secs(1)
            )
            .await
    );

    server
        .send(json!({ "command": "start", "streamId": "s1" }))
        .await;
    let command = loop {
        match recv_event(&mut events, Duration::from_secs(1)).await {
            Some(TransportEvent::Command(command)) => break command,
            Some(_) => continue,
            None => panic!("no inbound command"),
        }
    };
    assert!(matches!(
        command,
        SignalingCommand::Start { stream_id } if stream_id == "s1"
    ));

    transport.close();
}

#[tokio::test]
async fn test_heartbeat_pings_until_stopped() {
    let server = SignalingServer::start().await;
    let (transport, _events) = SignalingTransport::new(&test_config(server.url()));
    transport.connect().await.unwrap();

    assert!(
        server
            .wait_until(
                |frames| frames.iter().filter(|f| f["command"] == "ping").count() >= 2,
                Duration::from_secs(1)
            )
            .await
    );

    transport.stop_heartbeat();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let count = server.received_commands("ping").len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.received_commands("ping").len(), count);

    transport.close();
}

#[tokio::test]
async fn test_send_while_disconnected_fails() {
    let server = SignalingServer::start().await;
    let (transport, _events) = SignalingTransport::new(&test_config(server.url()));

    let err = transport.send(&SignalingCommand::Ping).unwrap_err();
    assert!(matches!(err, Error::TransportUnavailable(_)));
}

#[tokio::test]
async fn test_dropped_connection_reconnects() {
    let server = SignalingServer::start().await;
    let (transport, mut events) = SignalingTransport::new(&test_config(server.url()));
    transport.connect().await.unwrap();
    assert!(matches!(
        recv_event(&mut events, Duration::from_secs(1)).await,
        Some(TransportEvent::Up { reconnected: false })
    ));

    server.drop_connection();

    let mut saw_down = false;
    loop {
        match recv_event(&mut events, Duration::from_secs(2)).await {
            Some(TransportEvent::Down { .. }) => saw_down = true,
            Some(TransportEvent::Up { reconnected }) => {
                assert!(reconnected);
                break;
            }
            Some(_) => continue,
            None => panic!("transport did not reconnect"),
        }
    }
    assert!(saw_down);
    assert_eq!(server.connection_count(), 2);
    assert!(transport.is_connected());

    transport.close();
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let server = SignalingServer::start().await;
    let (transport, mut events) = SignalingTransport::new(&test_config(server.url()));
    transport.connect().await.unwrap();
    assert!(matches!(
        recv_event(&mut events, Duration::from_secs(1)).await,
        Some(TransportEvent::Up { .. })
    ));

    server.send(json!({ "command": "iceServerConfig" })).await;
    server
        .send(json!({ "command": "stop", "streamId": "s1" }))
        .await;

    // The unknown command is dropped; the next parseable one still arrives.
    let command = loop {
        match recv_event(&mut events, Duration::from_secs(1)).await {
            Some(TransportEvent::Command(command)) => break command,
            Some(_) => continue,
            None => panic!("parseable frame was not delivered"),
        }
    };
    assert!(matches!(command, SignalingCommand::Stop { .. }));

    transport.close();
}

#[tokio::test]
async fn test_close_prevents_further_sends() {
    let server = SignalingServer::start().await;
    let (transport, _events) = SignalingTransport::new(&test_config(server.url()));
    transport.connect().await.unwrap();

    transport.close();
    assert!(!transport.is_connected());
    assert!(matches!(
        transport.send(&SignalingCommand::Ping),
        Err(Error::TransportUnavailable(_))
    ));
}

#[tokio::test]
async fn test_events_channel_closes_with_transport() {
    let server = SignalingServer::start().await;
    let (transport, mut events) = SignalingTransport::new(&test_config(server.url()));
    transport.connect().await.unwrap();
    assert!(matches!(
        recv_event(&mut events, Duration::from_secs(1)).await,
        Some(TransportEvent::Up { .. })
    ));

    transport.close();
    drop(transport);
    // Sender side gone; the receiver drains and ends.
    assert!(matches!(
        tokio::time::timeout(Duration::from_secs(1), events.recv()).await,
        Ok(None) | Ok(Some(TransportEvent::Down { .. })) | Err(_)
    ));
}
