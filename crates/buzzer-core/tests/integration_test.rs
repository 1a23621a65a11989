//! Integration tests for the device core.
//!
//! These tests run the real orchestrator and host client against a fake
//! host on a loopback TCP socket.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use buzzer_core::client::SessionEnd;
use buzzer_core::hal::LevelCell;
use buzzer_core::tasks::spawn_heartbeat;
use buzzer_core::{
    Association, ButtonMonitor, ConnectionManager, ConnectivityState, CycleOutcome,
    DeviceController, DeviceSignals, HostClient, LinkEvent, NetError, Orchestrator, Shutdown,
    StaticLink, TcpConnector, TickHandler,
};
use buzzer_protocol::{Mode, ModuleId};

const DURATION: u32 = 1000;

/// A link whose every association attempt fails.
#[derive(Default)]
struct Unreachable {
    pending: VecDeque<LinkEvent>,
    attempts: u32,
}

impl Association for Unreachable {
    fn current_address(&self) -> Option<Ipv4Addr> {
        None
    }

    fn start(&mut self) -> Result<(), NetError> {
        self.pending.clear();
        self.pending.push_back(LinkEvent::Started);
        Ok(())
    }

    fn associate(&mut self) -> Result<(), NetError> {
        self.attempts += 1;
        self.pending.push_back(LinkEvent::Disconnected);
        Ok(())
    }

    fn next_event(&mut self) -> Result<LinkEvent, NetError> {
        self.pending
            .pop_front()
            .ok_or_else(|| NetError::Driver("no event".into()))
    }
}

type LoopbackOrchestrator = Orchestrator<StaticLink, TcpConnector, LevelCell, ModuleId>;

struct Device {
    orchestrator: LoopbackOrchestrator,
    signals: Arc<DeviceSignals>,
    client: Arc<HostClient<TcpStream>>,
    button_led: LevelCell,
}

fn device(addr: SocketAddr, id: u8) -> Device {
    let signals = Arc::new(DeviceSignals::new(DURATION));
    let button_led = LevelCell::new(false);
    let client = Arc::new(HostClient::new());
    let orchestrator = Orchestrator::new(
        ConnectionManager::new(StaticLink::new(Ipv4Addr::LOCALHOST), 6),
        TcpConnector::new(addr),
        client.clone(),
        DeviceController::new(signals.clone(), button_led.clone()),
        ModuleId::new(id).unwrap(),
    );
    Device {
        orchestrator,
        signals,
        client,
        button_led,
    }
}

/// Accept the device and check its handshake.
fn accept(listener: &TcpListener, id: u8) -> TcpStream {
    let (mut host, _) = listener.accept().expect("device did not connect");
    host.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let mut hello = [0u8; 2];
    host.read_exact(&mut hello).expect("no handshake");
    assert_eq!(hello, [0x04, 0x80 | id]);
    host
}

fn read_byte(host: &mut TcpStream) -> u8 {
    let mut buf = [0u8; 1];
    host.read_exact(&mut buf).expect("no byte from device");
    buf[0]
}

/// Poll `condition` for up to five seconds.
fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_mode_commands_drive_outputs() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let Device {
        mut orchestrator,
        signals,
        client,
        button_led,
    } = device(listener.local_addr().unwrap(), 0x21);

    let cycle = thread::spawn(move || orchestrator.run_once());
    let mut host = accept(&listener, 0x21);

    host.write_all(&[0x23]).unwrap();
    assert!(wait_for(|| signals.state.load()
        == ConnectivityState::Active(Mode::new(true, true))));
    assert!(button_led.get());

    let mut tick = TickHandler::new(
        signals.tick.clone(),
        LevelCell::new(false),
        LevelCell::new(false),
        125,
    );
    tick.on_tick();
    assert_eq!(signals.tick.playback.remaining(), DURATION - 1);

    // Garbage is answered and the session survives.
    host.write_all(&[0x01]).unwrap();
    assert_eq!(read_byte(&mut host), 0x7F);
    assert!(client.is_connected());

    host.write_all(&[0x20]).unwrap();
    assert!(wait_for(|| !button_led.get()));
    assert!(wait_for(|| signals.state.load()
        == ConnectivityState::Active(Mode::OFF)));
    tick.on_tick();
    assert!(!signals.tick.playback.is_playing());

    drop(host);
    let outcome = cycle.join().unwrap();
    assert_eq!(outcome, CycleOutcome::SessionEnded(SessionEnd::PeerClosed));
}

#[test]
fn test_press_reaches_host() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let Device {
        mut orchestrator,
        signals,
        client,
        ..
    } = device(listener.local_addr().unwrap(), 0x05);

    let cycle = thread::spawn(move || orchestrator.run_once());
    let mut host = accept(&listener, 0x05);
    assert!(wait_for(|| signals.state.load() == ConnectivityState::ConnectedIdle));

    let mut button = ButtonMonitor::new(signals.clone(), client.clone(), LevelCell::new(false));
    assert!(button.on_sample(true));
    assert!(!button.on_sample(true));
    assert_eq!(read_byte(&mut host), 0x30);

    drop(host);
    cycle.join().unwrap();
}

#[test]
fn test_lost_session_retries_without_backoff() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let Device {
        mut orchestrator,
        signals,
        ..
    } = device(listener.local_addr().unwrap(), 0x10);

    let cycle = thread::spawn(move || {
        let outcome = orchestrator.run_once();
        (outcome, orchestrator)
    });
    let host = accept(&listener, 0x10);
    assert!(wait_for(|| signals.state.load() == ConnectivityState::ConnectedIdle));
    drop(host);

    let (outcome, mut orchestrator) = cycle.join().unwrap();
    assert_eq!(outcome, CycleOutcome::SessionEnded(SessionEnd::PeerClosed));
    assert_eq!(outcome.backoff(Duration::from_secs(2)), None);

    // With the host gone the next cycle reconnects, fails and backs off.
    drop(listener);
    let outcome = orchestrator.run_once();
    assert_eq!(outcome, CycleOutcome::HostUnreachable);
    assert_eq!(
        outcome.backoff(Duration::from_secs(2)),
        Some(Duration::from_secs(2))
    );
    assert_eq!(signals.state.load(), ConnectivityState::Disconnected);
    assert!(signals.tick.status.is_flashing());
}

#[test]
fn test_network_failure_requests_backoff() {
    let signals = Arc::new(DeviceSignals::new(DURATION));
    let mut orchestrator = Orchestrator::new(
        ConnectionManager::new(Unreachable::default(), 6),
        TcpConnector::new("127.0.0.1:9".parse().unwrap()),
        Arc::new(HostClient::new()),
        DeviceController::new(signals.clone(), LevelCell::new(false)),
        ModuleId::new(1).unwrap(),
    );

    let outcome = orchestrator.run_once();

    assert_eq!(outcome, CycleOutcome::NetworkFailed);
    assert_eq!(orchestrator.network().link().attempts, 7);
    assert_eq!(
        outcome.backoff(Duration::from_secs(2)),
        Some(Duration::from_secs(2))
    );
}

#[test]
fn test_heartbeat_flows_while_connected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = Arc::new(HostClient::new());
    let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    client
        .open_session(stream, ModuleId::new(0x33).unwrap())
        .unwrap();
    let mut host = accept(&listener, 0x33);

    let shutdown = Shutdown::new();
    let heartbeat =
        spawn_heartbeat(client.clone(), Duration::from_millis(20), shutdown.clone()).unwrap();

    assert_eq!(read_byte(&mut host), 0x31);
    assert_eq!(read_byte(&mut host), 0x31);

    shutdown.trigger();
    heartbeat.join().unwrap();
    client.close();
    assert!(!client.is_connected());
}
