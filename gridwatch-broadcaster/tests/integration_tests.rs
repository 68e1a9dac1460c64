use futures_util::{SinkExt, StreamExt};
use gridwatch_broadcaster::{
    BroadcasterConfig, BroadcasterError, EventBroadcaster, StreamServer, SubscriberRegistry,
};
use gridwatch_classifier::SensorReading;
use gridwatch_log::{EventLogWriter, LogTailer};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(registry: &SubscriberRegistry) -> (StreamServer, SocketAddr) {
    let server = StreamServer::new("127.0.0.1:0".parse().unwrap(), registry.clone());
    let addr = server.start().await.unwrap();
    (server, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

async fn wait_for_subscribers(registry: &SubscriberRegistry, expected: usize) {
    for _ in 0..200 {
        if registry.len().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} subscribers, have {}",
        expected,
        registry.len().await
    );
}

async fn next_text(ws: &mut Client) -> String {
    let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("websocket error");
    msg.to_text().unwrap().to_string()
}

fn spawn_broadcaster(
    path: &Path,
    registry: &SubscriberRegistry,
) -> (oneshot::Sender<()>, JoinHandle<Result<(), BroadcasterError>>) {
    let config = BroadcasterConfig {
        poll_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let mut broadcaster = EventBroadcaster::new(LogTailer::new(path), registry.clone(), config);
    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        broadcaster
            .run(async move {
                let _ = rx.await;
            })
            .await
    });
    (tx, task)
}

#[tokio::test]
async fn test_server_lifecycle() {
    let registry = SubscriberRegistry::new();
    let (server, addr) = start_server(&registry).await;

    assert_eq!(server.local_addr().await, Some(addr));
    assert!(matches!(server.start().await, Err(BroadcasterError::AlreadyRunning)));

    server.stop().await.unwrap();
    assert_eq!(server.local_addr().await, None);
    assert!(matches!(server.stop().await, Err(BroadcasterError::NotStarted)));
}

#[tokio::test]
async fn test_spike_reaches_connected_subscriber() {
    let temp_dir = tempdir().unwrap();
    let log_path = temp_dir.path().join("events.jsonl");

    let registry = SubscriberRegistry::new();
    let (server, addr) = start_server(&registry).await;
    let (stop_tx, task) = spawn_broadcaster(&log_path, &registry);

    let mut client = connect(addr).await;
    wait_for_subscribers(&registry, 1).await;

    let event = SensorReading::new("2024-05-01T10:00:00", 25.0, 100.0).classify();
    let mut writer = EventLogWriter::open(&log_path).await.unwrap();
    writer.append(&event).await.unwrap();

    let frame = next_text(&mut client).await;
    assert_eq!(frame, serde_json::to_string(&event).unwrap());

    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["anomaly"], "Electricity Spike Detected");

    client.close(None).await.unwrap();
    stop_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_fan_out_preserves_order() {
    let temp_dir = tempdir().unwrap();
    let log_path = temp_dir.path().join("events.jsonl");

    let registry = SubscriberRegistry::new();
    let (server, addr) = start_server(&registry).await;
    let (stop_tx, task) = spawn_broadcaster(&log_path, &registry);

    let mut client1 = connect(addr).await;
    let mut client2 = connect(addr).await;
    wait_for_subscribers(&registry, 2).await;

    let mut writer = EventLogWriter::open(&log_path).await.unwrap();
    let mut expected = Vec::new();
    for (i, (electricity, water)) in [(25.0, 10.0), (5.0, 300.0), (5.0, 10.0)].into_iter().enumerate() {
        let event = SensorReading::new(format!("t{}", i), electricity, water).classify();
        writer.append(&event).await.unwrap();
        expected.push(serde_json::to_string(&event).unwrap());
    }

    for client in [&mut client1, &mut client2] {
        let mut received = Vec::new();
        for _ in 0..expected.len() {
            received.push(next_text(client).await);
        }
        assert_eq!(received, expected);
    }

    client1.close(None).await.unwrap();
    client2.close(None).await.unwrap();
    stop_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_unregisters_and_others_keep_receiving() {
    let temp_dir = tempdir().unwrap();
    let log_path = temp_dir.path().join("events.jsonl");

    let registry = SubscriberRegistry::new();
    let (server, addr) = start_server(&registry).await;
    let (stop_tx, task) = spawn_broadcaster(&log_path, &registry);

    let mut leaving = connect(addr).await;
    let mut staying = connect(addr).await;
    wait_for_subscribers(&registry, 2).await;

    leaving.close(None).await.unwrap();
    drop(leaving);
    wait_for_subscribers(&registry, 1).await;

    let event = SensorReading::new("t", 5.0, 260.0).classify();
    EventLogWriter::open(&log_path)
        .await
        .unwrap()
        .append(&event)
        .await
        .unwrap();

    let frame = next_text(&mut staying).await;
    assert!(frame.contains("Water Leakage Detected"));

    staying.close(None).await.unwrap();
    stop_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_subscriber_registered_once_handshake_completes() {
    let registry = SubscriberRegistry::new();
    let (server, addr) = start_server(&registry).await;

    for round in 0..20 {
        let mut ws = connect(addr).await;

        // No waiting: the handshake itself guarantees registration
        assert_eq!(registry.len().await, 1);
        let message = format!("msg-{}", round);
        let report = registry.broadcast(&message).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(next_text(&mut ws).await, message);

        ws.close(None).await.unwrap();
        drop(ws);
        wait_for_subscribers(&registry, 0).await;
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_inbound_frames_are_ignored() {
    let temp_dir = tempdir().unwrap();
    let log_path = temp_dir.path().join("events.jsonl");

    let registry = SubscriberRegistry::new();
    let (server, addr) = start_server(&registry).await;
    let (stop_tx, task) = spawn_broadcaster(&log_path, &registry);

    let mut client = connect(addr).await;
    wait_for_subscribers(&registry, 1).await;

    client.send(Message::Text("keep-alive".into())).await.unwrap();
    client.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.len().await, 1);

    let event = SensorReading::new("t", 1.0, 1.0).classify();
    EventLogWriter::open(&log_path)
        .await
        .unwrap()
        .append(&event)
        .await
        .unwrap();
    assert!(next_text(&mut client).await.contains("\"anomaly\":\"Normal\""));

    client.close(None).await.unwrap();
    stop_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_health_reports_subscribers() {
    let registry = SubscriberRegistry::new();
    let (server, addr) = start_server(&registry).await;

    let mut client = connect(addr).await;
    wait_for_subscribers(&registry, 1).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("\"status\":\"ok\""));
    assert!(response.contains("\"subscribers\":1"));

    client.close(None).await.unwrap();
    server.stop().await.unwrap();
}
