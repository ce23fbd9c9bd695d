//! 端到端测试：真实的 WebSocket 连接驱动 Hub 和客户端任务

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use socket_server::{
    ConnectionState, Frame, FrameType, HandshakeData, Hub, Listener, Packet, PacketType, ServerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use sync_logic::{Broadcaster, BroadcasterConfig, ResourceType, SyncEvent};
use tokio::io::DuplexStream;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::Request;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ClientWs = WebSocketStream<DuplexStream>;

fn config() -> ServerConfig {
    ServerConfig {
        ping_interval: Duration::from_secs(10),
        ping_timeout: Duration::from_secs(10),
        keepalive_interval: Duration::from_secs(30),
        outbound_capacity: 16,
        path: "/socket.io".to_string(),
    }
}

fn hub_with(config: ServerConfig) -> Hub {
    Hub::new(config, Broadcaster::new(BroadcasterConfig::default()))
}

async fn connect(hub: &Hub, user: Option<&str>) -> (String, ClientWs) {
    connect_with_buffer(hub, user, 64 * 1024).await
}

async fn connect_with_buffer(hub: &Hub, user: Option<&str>, buffer: usize) -> (String, ClientWs) {
    let (server_io, client_io) = tokio::io::duplex(buffer);
    let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let client_ws = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    let sid = hub.accept(server_ws, user.map(str::to_string)).await.unwrap();
    (sid, client_ws)
}

/// 读取下一条文本帧，跳过 WebSocket 控制帧
async fn next_frame<S>(ws: &mut WebSocketStream<S>) -> Frame
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let message = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return Frame::decode(&text).unwrap().unwrap();
        }
    }
}

async fn next_packet(ws: &mut ClientWs) -> Packet {
    let frame = next_frame(ws).await;
    assert_eq!(frame.frame_type, FrameType::Message);
    Packet::decode(frame.payload.as_deref().unwrap()).unwrap()
}

async fn send(ws: &mut ClientWs, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

async fn handshake(ws: &mut ClientWs) -> HandshakeData {
    let frame = next_frame(ws).await;
    assert_eq!(frame.frame_type, FrameType::Open);
    serde_json::from_str(frame.payload.as_deref().unwrap()).unwrap()
}

/// 跳过心跳，等待服务端发来的 `disconnect` 包
async fn expect_disconnect(ws: &mut ClientWs) {
    loop {
        let frame = next_frame(ws).await;
        if frame.frame_type == FrameType::Ping {
            continue;
        }
        assert_eq!(frame.frame_type, FrameType::Message);
        let packet = Packet::decode(frame.payload.as_deref().unwrap()).unwrap();
        assert_eq!(packet.packet_type, PacketType::Disconnect);
        return;
    }
}

async fn wait_closed(hub: &Hub, sid: &str) {
    timeout(Duration::from_secs(2), hub.wait_closed(sid))
        .await
        .expect("client did not close");
}

#[tokio::test]
async fn test_open_handshake() {
    let hub = hub_with(config());
    let (sid, mut ws) = connect(&hub, None).await;

    let data = handshake(&mut ws).await;
    assert!(!data.sid.is_empty());
    assert_eq!(data.sid, sid);
    assert!(data.upgrades.is_empty());
    assert_eq!(data.ping_interval, 10_000);
    assert_eq!(data.ping_timeout, 10_000);

    assert!(hub.is_connected(&sid).await);
    assert_eq!(hub.state(&sid).await, Some(ConnectionState::Open));
    assert_eq!(hub.connected_count().await, 1);
}

#[tokio::test]
async fn test_namespace_connect_gets_new_sid() {
    let hub = hub_with(config());
    let (_, mut ws) = connect(&hub, None).await;
    let transport_sid = handshake(&mut ws).await.sid;

    send(&mut ws, "40").await;
    let packet = next_packet(&mut ws).await;

    assert_eq!(packet.packet_type, PacketType::Connect);
    let app_sid = packet.data.unwrap()["sid"].as_str().unwrap().to_string();
    assert!(!app_sid.is_empty());
    assert_ne!(app_sid, transport_sid);
}

#[tokio::test]
async fn test_event_with_ack_id_is_acknowledged() {
    let hub = hub_with(config());
    let (_, mut ws) = connect(&hub, None).await;
    handshake(&mut ws).await;

    send(&mut ws, r#"427["upload",{"id":"asset-1"}]"#).await;
    let packet = next_packet(&mut ws).await;

    assert_eq!(packet.packet_type, PacketType::Ack);
    assert_eq!(packet.ack_id, Some(7));
    assert_eq!(packet.data, Some(json!(["acknowledged"])));
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let hub = hub_with(config());
    let (sid, mut ws) = connect(&hub, None).await;
    handshake(&mut ws).await;

    for garbage in ["x", "9", "", "4", "4z", "42[broken"] {
        send(&mut ws, garbage).await;
    }
    send(&mut ws, "40").await;

    assert_eq!(next_packet(&mut ws).await.packet_type, PacketType::Connect);
    assert!(hub.is_connected(&sid).await);
}

#[tokio::test]
async fn test_heartbeat_ping_and_pong() {
    let hub = hub_with(ServerConfig {
        ping_interval: Duration::from_millis(50),
        ..config()
    });
    let (sid, mut ws) = connect(&hub, None).await;
    handshake(&mut ws).await;

    for _ in 0..3 {
        assert_eq!(next_frame(&mut ws).await.frame_type, FrameType::Ping);
        send(&mut ws, "3").await;
    }
    assert!(hub.is_connected(&sid).await);
}

#[tokio::test]
async fn test_client_ping_is_answered() {
    let hub = hub_with(config());
    let (_, mut ws) = connect(&hub, None).await;
    handshake(&mut ws).await;

    send(&mut ws, "2probe").await;
    assert_eq!(next_frame(&mut ws).await, Frame::pong(Some("probe".to_string())));
}

#[tokio::test]
async fn test_missing_pong_closes_client() {
    let hub = hub_with(ServerConfig {
        ping_interval: Duration::from_millis(30),
        ping_timeout: Duration::from_millis(30),
        ..config()
    });
    let (sid, mut ws) = connect(&hub, None).await;
    handshake(&mut ws).await;

    expect_disconnect(&mut ws).await;
    wait_closed(&hub, &sid).await;
    assert!(!hub.is_connected(&sid).await);
}

#[tokio::test]
async fn test_idle_connection_gets_websocket_ping() {
    let hub = hub_with(ServerConfig {
        keepalive_interval: Duration::from_millis(50),
        ..config()
    });
    let (sid, mut ws) = connect(&hub, None).await;
    handshake(&mut ws).await;

    let ping = timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_))) => return true,
                Some(Ok(_)) => continue,
                _ => return false,
            }
        }
    })
    .await
    .expect("no keepalive ping");
    assert!(ping);
    assert!(hub.is_connected(&sid).await);
}

#[tokio::test]
async fn test_close_frame_unregisters_and_unsubscribes() {
    let hub = hub_with(config());
    let (sid, mut ws) = connect(&hub, Some("alice")).await;
    handshake(&mut ws).await;
    assert_eq!(hub.broadcaster().subscriber_count("alice"), 1);

    send(&mut ws, "1").await;
    wait_closed(&hub, &sid).await;

    assert!(!hub.is_connected(&sid).await);
    assert_eq!(hub.state(&sid).await, None);
    assert_eq!(hub.connected_count().await, 0);
    assert_eq!(hub.broadcaster().subscriber_count("alice"), 0);
}

#[tokio::test]
async fn test_disconnect_packet_closes_client() {
    let hub = hub_with(config());
    let (sid, mut ws) = connect(&hub, None).await;
    handshake(&mut ws).await;

    send(&mut ws, "41").await;
    wait_closed(&hub, &sid).await;
    assert!(!hub.is_connected(&sid).await);
}

#[tokio::test]
async fn test_dropped_connection_is_cleaned_up() {
    let hub = hub_with(config());
    let (sid, mut ws) = connect(&hub, Some("bob")).await;
    handshake(&mut ws).await;

    drop(ws);
    wait_closed(&hub, &sid).await;
    assert_eq!(hub.connected_count().await, 0);
    assert_eq!(hub.broadcaster().user_count(), 0);
}

#[tokio::test]
async fn test_sync_events_are_pushed_to_subscribed_user() {
    let hub = hub_with(config());
    let (_, mut alice) = connect(&hub, Some("alice")).await;
    let (_, mut anonymous) = connect(&hub, None).await;
    handshake(&mut alice).await;
    handshake(&mut anonymous).await;

    let event = SyncEvent::upsert(ResourceType::Asset, "alice", "asset-1", Some(json!({ "isFavorite": true })));
    assert_eq!(hub.broadcaster().publish("alice", &event), 1);

    let packet = next_packet(&mut alice).await;
    assert_eq!(packet.packet_type, PacketType::Event);
    assert_eq!(packet.event_name(), Some("on_asset_upsert"));
    let payload: SyncEvent = serde_json::from_value(packet.data.unwrap()[1].clone()).unwrap();
    assert_eq!(payload, event);

    // 匿名连接没有订阅
    send(&mut anonymous, "40").await;
    assert_eq!(next_packet(&mut anonymous).await.packet_type, PacketType::Connect);
}

#[tokio::test]
async fn test_emit_to_single_client() {
    let hub = hub_with(config());
    let (sid, mut ws) = connect(&hub, None).await;
    handshake(&mut ws).await;

    hub.emit(&sid, "on_server_version", json!({ "major": 1 })).await.unwrap();
    let packet = next_packet(&mut ws).await;
    assert_eq!(packet.event_name(), Some("on_server_version"));
    assert_eq!(packet.data.unwrap()[1], json!({ "major": 1 }));

    assert!(hub.emit("unknown", "x", Value::Null).await.is_err());
}

#[tokio::test]
async fn test_hub_disconnect_and_shutdown() {
    let hub = hub_with(config());
    let (first, mut ws1) = connect(&hub, None).await;
    let (second, mut ws2) = connect(&hub, None).await;
    handshake(&mut ws1).await;
    handshake(&mut ws2).await;
    assert_eq!(hub.session_ids().await.len(), 2);

    assert!(hub.disconnect(&first).await);
    expect_disconnect(&mut ws1).await;
    wait_closed(&hub, &first).await;
    assert_eq!(hub.session_ids().await, vec![second.clone()]);

    hub.shutdown().await;
    expect_disconnect(&mut ws2).await;
    wait_closed(&hub, &second).await;
    assert_eq!(hub.connected_count().await, 0);
    assert!(!hub.disconnect(&second).await);
}

#[tokio::test]
async fn test_disconnect_does_not_hang_on_stalled_peer() {
    let hub = hub_with(config());
    // 客户端从不读取，小缓冲很快写满
    let (sid, _stalled) = connect_with_buffer(&hub, Some("alice"), 8 * 1024).await;

    let blob = "x".repeat(4096);
    for i in 0..10 {
        let event = SyncEvent::upsert(
            ResourceType::Asset,
            "alice",
            &format!("asset-{i}"),
            Some(json!({ "blob": blob })),
        );
        hub.broadcaster().publish("alice", &event);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(hub.disconnect(&sid).await);
    wait_closed(&hub, &sid).await;

    assert!(!hub.is_connected(&sid).await);
    assert_eq!(hub.state(&sid).await, None);
    assert_eq!(hub.broadcaster().subscriber_count("alice"), 0);
}

#[tokio::test]
async fn test_listener_over_tcp() {
    let hub = hub_with(config());
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let resolver: socket_server::IdentityResolver = Arc::new(|req: &Request| {
        req.headers()
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    let listener = Listener::new(hub.clone(), resolver);
    let server = tokio::spawn(async move { listener.serve(tcp, shutdown_rx).await });

    // 路径不匹配的升级被拒绝
    let rejected = tokio_tungstenite::connect_async(format!("ws://{addr}/other")).await;
    assert!(rejected.is_err());
    let rejected = tokio_tungstenite::connect_async(format!("ws://{addr}/socket.iox")).await;
    assert!(rejected.is_err());
    assert_eq!(hub.connected_count().await, 0);

    let (mut ws, _) = tokio_tungstenite::connect_async(format!(
        "ws://{addr}/socket.io/?EIO=4&transport=websocket"
    ))
    .await
    .unwrap();

    let open = next_frame(&mut ws).await;
    assert_eq!(open.frame_type, FrameType::Open);
    let data: HandshakeData = serde_json::from_str(open.payload.as_deref().unwrap()).unwrap();
    assert!(hub.is_connected(&data.sid).await);

    ws.send(Message::Text("40".to_string())).await.unwrap();
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame.encode().chars().take(2).collect::<String>(), "40");

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(2), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    wait_closed(&hub, &data.sid).await;
    assert_eq!(hub.connected_count().await, 0);
}
