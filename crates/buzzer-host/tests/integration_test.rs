//! Integration tests for the buzzer host.
//!
//! These tests start an actual host and connect the real device client to
//! it over loopback TCP.

use std::net::{SocketAddr, TcpStream};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout;

use buzzer_core::client::SessionEnd;
use buzzer_core::{HostClient, ModeSink};
use buzzer_host::{BuzzerServer, DeviceRegistry, HostEvent, Mode, ModuleId, ServerConfig};

/// Start a test host and return its address, event stream and registry.
async fn start_test_host() -> (
    SocketAddr,
    broadcast::Receiver<HostEvent>,
    DeviceRegistry,
    tokio::task::JoinHandle<()>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = BuzzerServer::new(ServerConfig {
        bind_addr: addr,
        handshake_timeout: Duration::from_millis(500),
    });
    let events = server.subscribe();
    let registry = server.registry();

    let handle = tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    (addr, events, registry, handle)
}

/// Wait for the next event with timeout.
async fn next_event(events: &mut broadcast::Receiver<HostEvent>) -> HostEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("Timed out waiting for event")
        .expect("Event stream closed")
}

/// Forwards received modes to the test.
struct ChannelSink(std_mpsc::Sender<Mode>);

impl ModeSink for ChannelSink {
    fn apply_mode(&mut self, mode: Mode) {
        let _ = self.0.send(mode);
    }
}

#[tokio::test]
async fn test_device_joins_and_presses() {
    let (addr, mut events, registry, handle) = start_test_host().await;
    let id = ModuleId::new(0x21).unwrap();

    let client = Arc::new(HostClient::new());
    let device = client.clone();
    tokio::task::spawn_blocking(move || {
        let stream = TcpStream::connect(addr).unwrap();
        device.open_session(stream, id).unwrap();
        assert!(device.send_press());
        assert!(device.send_heartbeat());
    })
    .await
    .unwrap();

    match next_event(&mut events).await {
        HostEvent::Joined {
            id: joined,
            version,
            ..
        } => {
            assert_eq!(joined, id);
            assert_eq!(version, 4);
        }
        other => panic!("Expected Joined, got {:?}", other),
    }
    assert_eq!(next_event(&mut events).await, HostEvent::Press { id });
    assert_eq!(next_event(&mut events).await, HostEvent::Heartbeat { id });
    assert_eq!(registry.ids().await, vec![id]);

    client.close();
    assert_eq!(next_event(&mut events).await, HostEvent::Left { id });
    assert!(registry.is_empty().await);

    handle.abort();
}

#[tokio::test]
async fn test_mode_reaches_device() {
    let (addr, mut events, registry, handle) = start_test_host().await;
    let id = ModuleId::new(0x05).unwrap();

    let client = Arc::new(HostClient::new());
    let (mode_tx, mode_rx) = std_mpsc::channel();
    let device = client.clone();
    let reader = tokio::task::spawn_blocking(move || {
        let stream = TcpStream::connect(addr).unwrap();
        device.open_session(stream, id).unwrap();
        device.receive_loop(&mut ChannelSink(mode_tx))
    });

    assert!(matches!(
        next_event(&mut events).await,
        HostEvent::Joined { .. }
    ));

    registry.set_mode(id, Mode::new(true, true)).await.unwrap();
    let mode = tokio::task::spawn_blocking(move || mode_rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .expect("Device did not receive mode");
    assert_eq!(mode, Mode::new(true, true));

    // Closing wakes the blocked reader and the host sees the device leave.
    client.close();
    let end = timeout(Duration::from_secs(5), reader)
        .await
        .expect("Receive loop did not end")
        .unwrap();
    assert_eq!(end, SessionEnd::Closed);
    assert_eq!(next_event(&mut events).await, HostEvent::Left { id });

    handle.abort();
}

#[tokio::test]
async fn test_bad_handshake_is_dropped() {
    let (addr, mut events, registry, handle) = start_test_host().await;

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[0x30, 0x30]).await.unwrap();

    // The host closes without announcing a join.
    let mut buf = [0u8; 1];
    let read = timeout(
        Duration::from_secs(5),
        tokio::io::AsyncReadExt::read(&mut stream, &mut buf),
    )
    .await
    .expect("Host did not close");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert!(events.try_recv().is_err());
    assert!(registry.is_empty().await);

    handle.abort();
}

#[tokio::test]
async fn test_set_mode_for_absent_device() {
    let (_, _, registry, handle) = start_test_host().await;

    let result = registry
        .set_mode(ModuleId::new(9).unwrap(), Mode::OFF)
        .await;

    assert!(result.is_err());
    handle.abort();
}
