//! Control channel behavior against a scripted relay

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::Framed;

use natlink_client::{ClientConfig, ControlChannel, TunnelPool};
use natlink_proto::{ControlMessage, FrameCodec, TunnelSettings};

/// Read the header block a client sends right after connecting.
async fn read_handshake(stream: &mut TcpStream) -> String {
    let mut block = Vec::new();
    let mut byte = [0u8; 1];
    while !block.ends_with(b"\r\n\r\n") {
        stream
            .read_exact(&mut byte)
            .await
            .expect("handshake read failed");
        block.push(byte[0]);
    }
    String::from_utf8(block).expect("handshake is not utf-8")
}

fn setting_frame(domain: &str, local_ip: &str, local_port: u16) -> Bytes {
    let msg = ControlMessage::Setting {
        setting: TunnelSettings {
            domain: domain.to_string(),
            local_ip: local_ip.to_string(),
            local_port,
        },
    };
    Bytes::from(serde_json::to_vec(&msg).unwrap())
}

/// Start pool and control channel against the given relay address.
fn start_client(config: &ClientConfig) -> natlink_client::PoolHandle {
    let pool = TunnelPool::spawn(config.clone());
    let control = ControlChannel::new(config.clone(), pool.clone());
    tokio::spawn(control.run());
    pool
}

#[tokio::test]
async fn test_setting_push_creates_pre_connection_pool() {
    let relay = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = relay.local_addr().unwrap().to_string();

    let config = ClientConfig::new(relay_addr, "secret");
    let pool = start_client(&config);

    // The control connection arrives first, flagged as the setting client.
    let (mut control_conn, _) = timeout(Duration::from_secs(5), relay.accept())
        .await
        .expect("no control connection")
        .unwrap();
    let block = read_handshake(&mut control_conn).await;
    assert!(block.contains("nat-setting-client: yes\r\n"));
    assert!(block.contains("Nat-token: secret\r\n"));

    let mut framed = Framed::new(control_conn, FrameCodec);
    framed
        .send(setting_frame("a.example.com", "127.0.0.1", 8080))
        .await
        .unwrap();

    // Ten tunnel connections follow, each pinned to the pushed domain.
    let mut tunnels = Vec::new();
    for i in 0..10 {
        let (mut conn, _) = timeout(Duration::from_secs(5), relay.accept())
            .await
            .unwrap_or_else(|_| panic!("tunnel connection {i} never arrived"))
            .unwrap();
        let block = read_handshake(&mut conn).await;
        assert!(
            block.contains("Nat-host: a.example.com\r\n"),
            "connection {i} carried the wrong domain: {block}"
        );
        assert!(!block.contains("nat-setting-client"));
        tunnels.push(conn);
    }

    // The pool never exceeds its target on its own.
    let extra = timeout(Duration::from_millis(300), relay.accept()).await;
    assert!(extra.is_err(), "pool exceeded its target size");

    assert_eq!(pool.metrics().connect_attempts(), 10);
}

#[tokio::test]
async fn test_repeated_setting_push_is_idempotent() {
    let relay = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = relay.local_addr().unwrap().to_string();

    let config = ClientConfig::new(relay_addr, "secret").with_pool_size(3);
    let pool = start_client(&config);

    let (mut control_conn, _) = timeout(Duration::from_secs(5), relay.accept())
        .await
        .expect("no control connection")
        .unwrap();
    read_handshake(&mut control_conn).await;

    let mut framed = Framed::new(control_conn, FrameCodec);
    framed
        .send(setting_frame("a.example.com", "127.0.0.1", 8080))
        .await
        .unwrap();
    framed
        .send(setting_frame("a.example.com", "127.0.0.1", 8080))
        .await
        .unwrap();

    let mut tunnels = Vec::new();
    for _ in 0..3 {
        let (mut conn, _) = timeout(Duration::from_secs(5), relay.accept())
            .await
            .expect("tunnel connection never arrived")
            .unwrap();
        read_handshake(&mut conn).await;
        tunnels.push(conn);
    }

    // The second push must not add connection churn.
    let extra = timeout(Duration::from_millis(300), relay.accept()).await;
    assert!(extra.is_err(), "idempotent push still created connections");

    assert_eq!(pool.metrics().connect_attempts(), 3);
    assert_eq!(pool.metrics().consecutive_failures(), 0);
}

#[tokio::test]
async fn test_channel_survives_garbage_and_unknown_messages() {
    let relay = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = relay.local_addr().unwrap().to_string();

    let config = ClientConfig::new(relay_addr, "secret").with_pool_size(2);
    start_client(&config);

    let (mut control_conn, _) = timeout(Duration::from_secs(5), relay.accept())
        .await
        .expect("no control connection")
        .unwrap();
    read_handshake(&mut control_conn).await;

    let mut framed = Framed::new(control_conn, FrameCodec);

    // Garbage, an unknown type, and a server-side ping must all be dropped
    // without losing the channel.
    framed
        .send(Bytes::from_static(b"this is not json"))
        .await
        .unwrap();
    framed
        .send(Bytes::from_static(b"{\"type\":\"resize\",\"cols\":80}"))
        .await
        .unwrap();
    framed
        .send(Bytes::from_static(b"{\"type\":\"ping\"}"))
        .await
        .unwrap();
    framed
        .send(setting_frame("a.example.com", "127.0.0.1", 8080))
        .await
        .unwrap();

    for _ in 0..2 {
        let (mut conn, _) = timeout(Duration::from_secs(5), relay.accept())
            .await
            .expect("channel died before the setting push was applied")
            .unwrap();
        let block = read_handshake(&mut conn).await;
        assert!(block.contains("Nat-host: a.example.com\r\n"));
    }
}

#[tokio::test]
async fn test_heartbeat_is_sent_while_established() {
    let relay = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = relay.local_addr().unwrap().to_string();

    let config = ClientConfig::new(relay_addr, "secret")
        .with_heartbeat_interval(Duration::from_millis(100));
    start_client(&config);

    let (mut control_conn, _) = timeout(Duration::from_secs(5), relay.accept())
        .await
        .expect("no control connection")
        .unwrap();
    read_handshake(&mut control_conn).await;

    let mut framed = Framed::new(control_conn, FrameCodec);
    let frame = timeout(Duration::from_secs(2), framed.next())
        .await
        .expect("no heartbeat within two seconds")
        .expect("control connection closed")
        .expect("frame error");

    let msg: ControlMessage = serde_json::from_slice(&frame).unwrap();
    assert_eq!(msg, ControlMessage::Ping);
}

#[tokio::test]
async fn test_control_channel_reconnects_after_close() {
    let relay = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = relay.local_addr().unwrap().to_string();

    let config = ClientConfig::new(relay_addr, "secret")
        .with_control_reconnect_delay(Duration::from_millis(50));
    start_client(&config);

    let (mut first, _) = timeout(Duration::from_secs(5), relay.accept())
        .await
        .expect("no control connection")
        .unwrap();
    read_handshake(&mut first).await;
    drop(first);

    // The client redials on its fixed pause.
    let (mut second, _) = timeout(Duration::from_secs(5), relay.accept())
        .await
        .expect("control channel never reconnected")
        .unwrap();
    let block = read_handshake(&mut second).await;
    assert!(block.contains("nat-setting-client: yes\r\n"));
}
