//! End-to-end client flows against the in-process signaling server.

mod harness;

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::json;

use harness::{MockFactory, SignalingServer};
use streamgate_webrtc::{
    ClientConfig, Error, Event, IceConnectionState, PeerEvent, PlayOptions, PublishOptions,
    ReconnectPolicy, WebRtcClient,
};

fn test_config(url: String) -> ClientConfig {
    ClientConfig {
        websocket_url: url,
        stats_interval: Duration::from_millis(30),
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

fn collect_events(client: &WebRtcClient) -> Arc<StdMutex<Vec<Event>>> {
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client
        .events()
        .subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    seen
}

async fn wait_for<F>(seen: &Arc<StdMutex<Vec<Event>>>, predicate: F, timeout: Duration) -> bool
where
    F: Fn(&[Event]) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate(&seen.lock().unwrap()) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn connected_client(server: &SignalingServer) -> (WebRtcClient, Arc<MockFactory>, Arc<StdMutex<Vec<Event>>>) {
    let factory = Arc::new(MockFactory::default());
    let client = WebRtcClient::new(test_config(server.url()), Arc::clone(&factory) as _).unwrap();
    let seen = collect_events(&client);
    client.connect().await.unwrap();
    assert!(
        wait_for(
            &seen,
            |events| events.iter().any(|e| matches!(e, Event::Initialized)),
            Duration::from_secs(1)
        )
        .await
    );
    (client, factory, seen)
}

#[tokio::test]
async fn test_publish_flow_end_to_end() {
    let server = SignalingServer::start().await;
    let (client, factory, seen) = connected_client(&server).await;

    client.publish("s1", PublishOptions::default()).await.unwrap();
    assert!(
        server
            .wait_until(
                |frames| frames.iter().any(|f| f["command"] == "publish" && f["streamId"] == "s1"),
                Duration::from_secs(1)
            )
            .await
    );

    // Server grants negotiation; the publisher answers with its offer.
    server.send(json!({ "command": "start", "streamId": "s1" })).await;
    assert!(
        server
            .wait_until(
                |frames| frames.iter().any(|f| {
                    f["command"] == "takeConfiguration"
                        && f["streamId"] == "s1"
                        && f["type"] == "offer"
                }),
                Duration::from_secs(1)
            )
            .await
    );

    // Remote answer plus a candidate, then ICE connects.
    server
        .send(json!({
            "command": "takeConfiguration",
            "streamId": "s1",
            "type": "answer",
            "sdp": "v=0 server-answer"
        }))
        .await;
    server
        .send(json!({
            "command": "takeCandidate",
            "streamId": "s1",
            "label": 0,
            "candidate": "candidate:1 1 udp 1 10.0.0.9 1 typ host"
        }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let calls = factory.latest().calls();
    assert!(calls.contains(&"set_remote:answer".to_string()));
    assert!(calls.iter().any(|c| c.starts_with("add_candidate:")));

    factory
        .latest_sender()
        .send(PeerEvent::IceConnectionState(IceConnectionState::Connected))
        .unwrap();
    assert!(
        wait_for(
            &seen,
            |events| events
                .iter()
                .any(|e| matches!(e, Event::SessionConnected { stream_id } if stream_id == "s1")),
            Duration::from_secs(1)
        )
        .await
    );

    client.close().await;
}

#[tokio::test]
async fn test_play_flow_answers_server_offer() {
    let server = SignalingServer::start().await;
    let (client, factory, _seen) = connected_client(&server).await;

    client.play("v1", PlayOptions::default()).await.unwrap();
    assert!(
        server
            .wait_until(
                |frames| frames.iter().any(|f| f["command"] == "play" && f["streamId"] == "v1"),
                Duration::from_secs(1)
            )
            .await
    );

    server
        .send(json!({
            "command": "takeConfiguration",
            "streamId": "v1",
            "type": "offer",
            "sdp": "v=0 server-offer"
        }))
        .await;

    assert!(
        server
            .wait_until(
                |frames| frames.iter().any(|f| {
                    f["command"] == "takeConfiguration"
                        && f["streamId"] == "v1"
                        && f["type"] == "answer"
                }),
                Duration::from_secs(1)
            )
            .await
    );
    assert!(factory
        .latest()
        .calls()
        .contains(&"create_answer".to_string()));

    client.close().await;
}

#[tokio::test]
async fn test_transport_reconnect_replays_publish() {
    let server = SignalingServer::start().await;
    let (client, factory, seen) = connected_client(&server).await;

    client.publish("s1", PublishOptions::default()).await.unwrap();
    assert!(
        server
            .wait_until(
                |frames| frames.iter().any(|f| f["command"] == "publish"),
                Duration::from_secs(1)
            )
            .await
    );

    server.drop_connection();

    // The transport redials and the session replays its announce.
    assert!(
        server
            .wait_until(
                |frames| frames.iter().filter(|f| f["command"] == "publish").count() >= 2,
                Duration::from_secs(3)
            )
            .await
    );
    assert_eq!(server.connection_count(), 2);
    // A fresh capability instance backs the replayed round.
    assert!(factory.created_count() >= 2);
    assert!(
        wait_for(
            &seen,
            |events| events
                .iter()
                .filter(|e| matches!(e, Event::Initialized))
                .count()
                >= 2,
            Duration::from_secs(1)
        )
        .await
    );

    client.close().await;
}

#[tokio::test]
async fn test_server_will_stop_forces_reconnect() {
    let server = SignalingServer::start().await;
    let (client, _factory, _seen) = connected_client(&server).await;

    server
        .send(json!({
            "command": "notification",
            "definition": "server_will_stop"
        }))
        .await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while server.connection_count() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.connection_count(), 2);

    client.close().await;
}

#[tokio::test]
async fn test_fatal_server_error_closes_session() {
    let server = SignalingServer::start().await;
    let (client, _factory, seen) = connected_client(&server).await;

    client.publish("s1", PublishOptions::default()).await.unwrap();
    server
        .send(json!({
            "command": "error",
            "definition": "streamIdInUse",
            "streamId": "s1"
        }))
        .await;

    assert!(
        wait_for(
            &seen,
            |events| events.iter().any(|e| matches!(
                e,
                Event::Error { stream_id: Some(id), error }
                    if id == "s1" && matches!(**error, Error::SessionAlreadyActive(_))
            )),
            Duration::from_secs(1)
        )
        .await
    );
    assert!(
        wait_for(
            &seen,
            |events| events
                .iter()
                .any(|e| matches!(e, Event::SessionClosed { stream_id } if stream_id == "s1")),
            Duration::from_secs(1)
        )
        .await
    );

    client.close().await;
}

#[tokio::test]
async fn test_data_channel_send_uses_chunked_framing() {
    let server = SignalingServer::start().await;
    let (client, factory, _seen) = connected_client(&server).await;

    client.publish("s1", PublishOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    client.send_text("s1", "hello").await.unwrap();
    let data: Vec<u8> = (0..20000u32).map(|i| (i % 251) as u8).collect();
    client.send_binary("s1", &data).await.unwrap();

    let channel = factory.latest().channel.clone();
    assert_eq!(*channel.sent_text.lock().unwrap(), vec!["hello".to_string()]);
    // Header frame plus two chunks for a 20000-byte payload.
    let frames = channel.sent_binary.lock().unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].len(), 8);
    let reassembled: Vec<u8> = frames[1][4..]
        .iter()
        .chain(frames[2][4..].iter())
        .copied()
        .collect();
    assert_eq!(reassembled, data);

    client.close().await;
}

#[tokio::test]
async fn test_stats_polling_emits_snapshots() {
    let server = SignalingServer::start().await;
    let (client, _factory, seen) = connected_client(&server).await;

    client.publish("s1", PublishOptions::default()).await.unwrap();
    client.enable_stats("s1").unwrap();

    assert!(
        wait_for(
            &seen,
            |events| events
                .iter()
                .any(|e| matches!(e, Event::Stats { stream_id, .. } if stream_id == "s1")),
            Duration::from_secs(1)
        )
        .await
    );

    client.disable_stats("s1");
    tokio::time::sleep(Duration::from_millis(50)).await;
    let count = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, Event::Stats { .. }))
        .count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, Event::Stats { .. }))
        .count();
    assert_eq!(count, after);

    client.close().await;
}

#[tokio::test]
async fn test_stop_notifies_server_and_closes() {
    let server = SignalingServer::start().await;
    let (client, _factory, seen) = connected_client(&server).await;

    client.publish("s1", PublishOptions::default()).await.unwrap();
    client.stop("s1").await.unwrap();

    assert!(
        server
            .wait_until(
                |frames| frames.iter().any(|f| f["command"] == "stop" && f["streamId"] == "s1"),
                Duration::from_secs(1)
            )
            .await
    );
    assert!(
        wait_for(
            &seen,
            |events| events
                .iter()
                .any(|e| matches!(e, Event::SessionClosed { stream_id } if stream_id == "s1")),
            Duration::from_secs(1)
        )
        .await
    );

    // Stopping again is an error, not a panic.
    assert!(matches!(
        client.stop("s1").await,
        Err(Error::SessionNotFound(_))
    ));

    client.close().await;
}

#[tokio::test]
async fn test_room_queries_round_trip() {
    let server = SignalingServer::start().await;
    let (client, _factory, seen) = connected_client(&server).await;

    client.join_room("room1", Some("p1"), None, None).unwrap();
    assert!(
        server
            .wait_until(
                |frames| frames
                    .iter()
                    .any(|f| f["command"] == "joinRoom" && f["room"] == "room1"),
                Duration::from_secs(1)
            )
            .await
    );

    server
        .send(json!({
            "command": "notification",
            "definition": "joinedTheRoom",
            "streamId": "p1",
            "streams": ["a", "b"]
        }))
        .await;
    assert!(
        wait_for(
            &seen,
            |events| events.iter().any(|e| matches!(
                e,
                Event::ServerNotification { definition, .. } if definition == "joinedTheRoom"
            )),
            Duration::from_secs(1)
        )
        .await
    );

    server
        .send(json!({
            "command": "roomInformation",
            "room": "room1",
            "streams": ["a", "b"]
        }))
        .await;
    assert!(
        wait_for(
            &seen,
            |events| events.iter().any(|e| matches!(
                e,
                Event::RoomInformation { room: Some(room), .. } if room == "room1"
            )),
            Duration::from_secs(1)
        )
        .await
    );

    client.close().await;
}

#[tokio::test]
async fn test_close_emits_closed_once() {
    let server = SignalingServer::start().await;
    let (client, _factory, seen) = connected_client(&server).await;

    client.close().await;
    client.close().await;

    let closed = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, Event::Closed))
        .count();
    assert_eq!(closed, 1);
    assert!(!client.is_connected());
}
