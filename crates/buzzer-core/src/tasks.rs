//! Background contexts: button poll, heartbeat and the software tick.
//!
//! Each runs on its own named `std::thread`. The hardware tick on ESP32 does
//! not use [`spawn_soft_tick`]; it runs the same [`TickHandler`] from a timer
//! interrupt instead.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::client::HostClient;
use crate::device::{ButtonMonitor, PressSink};
use crate::hal::{button_pressed, InputLine, OutputLine};
use crate::tick::TickHandler;
use crate::transport::Transport;

/// Longest single sleep while waiting, so shutdown is noticed promptly.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Cooperative stop signal shared by every long-running loop.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless shutdown comes first.
    ///
    /// Returns `false` if shutdown was triggered.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SHUTDOWN_POLL));
        }
    }
}

/// Sample `button` every `period` and feed the edges to `monitor`.
pub fn spawn_button_poll<B, P, D>(
    button: B,
    mut monitor: ButtonMonitor<P, D>,
    period: Duration,
    shutdown: Shutdown,
) -> io::Result<JoinHandle<()>>
where
    B: InputLine + 'static,
    P: PressSink + 'static,
    D: OutputLine + 'static,
{
    thread::Builder::new()
        .name("button-poll".into())
        .spawn(move || {
            debug!("Button poll every {:?}", period);
            while shutdown.sleep(period) {
                monitor.on_sample(button_pressed(&button));
            }
        })
}

/// Send heartbeats on `client` every `period`.
pub fn spawn_heartbeat<T: Transport>(
    client: Arc<HostClient<T>>,
    period: Duration,
    shutdown: Shutdown,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("heartbeat".into())
        .spawn(move || client.run_heartbeat(period, &shutdown))
}

/// Drive `handler` from a thread at `tick_hz`.
///
/// Used where there is no hardware timer. Ticks are scheduled against
/// absolute deadlines; after a stall the schedule restarts from now rather
/// than bursting to catch up.
pub fn spawn_soft_tick<A, S>(
    mut handler: TickHandler<A, S>,
    tick_hz: u32,
    shutdown: Shutdown,
) -> io::Result<JoinHandle<()>>
where
    A: OutputLine + 'static,
    S: OutputLine + 'static,
{
    let period = Duration::from_secs(1) / tick_hz.max(1);
    thread::Builder::new().name("tick".into()).spawn(move || {
        let mut next = Instant::now() + period;
        while !shutdown.is_triggered() {
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
                next += period;
            } else {
                next = now + period;
            }
            handler.on_tick();
        }
    })
}
