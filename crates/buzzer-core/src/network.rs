//! Network connection manager.
//!
//! Owns the retry contract around link association. The association
//! mechanics (radio, DHCP) live behind [`Association`]; this module only
//! decides when to try again and when to give up.
//!
//! ```text
//! connect()
//!   │ already have an address? ──▶ Ok(addr)
//!   ▼
//! start() ──▶ Started ──▶ associate()
//!               Disconnected ──▶ retries < max ? associate() : Err(RetriesExhausted)
//!               GotAddress(ip) ──▶ Ok(ip)
//! ```

use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Retries allowed after the first failed association.
pub const DEFAULT_MAX_RETRIES: u32 = 6;

/// Events reported by the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The interface is up and ready to associate.
    Started,
    /// An association attempt failed or the link dropped.
    Disconnected,
    /// The link obtained an address.
    GotAddress(Ipv4Addr),
}

/// Errors from [`ConnectionManager::connect`].
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Association failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Link driver error: {0}")]
    Driver(String),
}

/// Platform link layer driven by the connection manager.
pub trait Association {
    /// Address of the link if it is already up.
    fn current_address(&self) -> Option<Ipv4Addr>;

    /// Bring the interface up. Must lead to a [`LinkEvent::Started`].
    ///
    /// Events left over from a previous connection are discarded.
    fn start(&mut self) -> Result<(), NetError>;

    /// Begin one association attempt.
    fn associate(&mut self) -> Result<(), NetError>;

    /// Block until the next link event.
    fn next_event(&mut self) -> Result<LinkEvent, NetError>;
}

/// A link managed outside the process, such as a desktop's network stack.
///
/// Always reports itself up, so `connect` returns at once.
#[derive(Debug, Clone, Copy)]
pub struct StaticLink {
    addr: Ipv4Addr,
}

impl StaticLink {
    pub fn new(addr: Ipv4Addr) -> Self {
        Self { addr }
    }
}

impl Association for StaticLink {
    fn current_address(&self) -> Option<Ipv4Addr> {
        Some(self.addr)
    }

    fn start(&mut self) -> Result<(), NetError> {
        Ok(())
    }

    fn associate(&mut self) -> Result<(), NetError> {
        Ok(())
    }

    fn next_event(&mut self) -> Result<LinkEvent, NetError> {
        Ok(LinkEvent::GotAddress(self.addr))
    }
}

/// What to do after a failed association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again; carries the retry number (1-based).
    Retry(u32),
    /// The ceiling was exceeded.
    GiveUp,
}

/// Counts failed associations against a ceiling.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    retries: u32,
    max_retries: u32,
}

impl RetryTracker {
    pub fn new(max_retries: u32) -> Self {
        Self {
            retries: 0,
            max_retries,
        }
    }

    pub fn reset(&mut self) {
        self.retries = 0;
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn on_disconnect(&mut self) -> RetryDecision {
        if self.retries >= self.max_retries {
            RetryDecision::GiveUp
        } else {
            self.retries += 1;
            RetryDecision::Retry(self.retries)
        }
    }
}

impl Default for RetryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

/// Brings the link up with bounded retries.
pub struct ConnectionManager<A> {
    link: A,
    tracker: RetryTracker,
}

impl<A: Association> ConnectionManager<A> {
    pub fn new(link: A, max_retries: u32) -> Self {
        Self {
            link,
            tracker: RetryTracker::new(max_retries),
        }
    }

    pub fn link(&self) -> &A {
        &self.link
    }

    /// Associate and wait for an address.
    ///
    /// Blocks until exactly one outcome: an address, or
    /// [`NetError::RetriesExhausted`] once the retry ceiling is exceeded.
    pub fn connect(&mut self) -> Result<Ipv4Addr, NetError> {
        if let Some(addr) = self.link.current_address() {
            debug!("Link already up at {}", addr);
            return Ok(addr);
        }

        info!("Connecting to network");
        self.tracker.reset();
        self.link.start()?;

        loop {
            match self.link.next_event()? {
                LinkEvent::Started => {
                    self.tracker.reset();
                    self.link.associate()?;
                }
                LinkEvent::Disconnected => match self.tracker.on_disconnect() {
                    RetryDecision::Retry(n) => {
                        info!(
                            "Association failed, retry {}/{}",
                            n,
                            self.tracker.max_retries()
                        );
                        self.link.associate()?;
                    }
                    RetryDecision::GiveUp => {
                        let attempts = self.tracker.max_retries() + 1;
                        warn!("Association failed {} times, giving up", attempts);
                        return Err(NetError::RetriesExhausted { attempts });
                    }
                },
                LinkEvent::GotAddress(addr) => {
                    self.tracker.reset();
                    info!("Network up, address {}", addr);
                    return Ok(addr);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Link layer that replays a fixed list of association results.
    #[derive(Default)]
    pub(crate) struct ScriptedAssociation {
        pub(crate) address: Option<Ipv4Addr>,
        /// Result of each association attempt, in order.
        pub(crate) attempts: VecDeque<LinkEvent>,
        pub(crate) pending: VecDeque<LinkEvent>,
        pub(crate) starts: u32,
        pub(crate) associations: u32,
    }

    impl ScriptedAssociation {
        pub(crate) fn failing(times: usize) -> Self {
            Self {
                attempts: std::iter::repeat(LinkEvent::Disconnected)
                    .take(times)
                    .collect(),
                ..Default::default()
            }
        }

        pub(crate) fn succeeding_after(failures: usize, addr: Ipv4Addr) -> Self {
            let mut link = Self::failing(failures);
            link.attempts.push_back(LinkEvent::GotAddress(addr));
            link
        }
    }

    impl Association for ScriptedAssociation {
        fn current_address(&self) -> Option<Ipv4Addr> {
            self.address
        }

        fn start(&mut self) -> Result<(), NetError> {
            self.starts += 1;
            self.pending.clear();
            self.pending.push_back(LinkEvent::Started);
            Ok(())
        }

        fn associate(&mut self) -> Result<(), NetError> {
            self.associations += 1;
            let outcome = self
                .attempts
                .pop_front()
                .ok_or_else(|| NetError::Driver("script exhausted".into()))?;
            if let LinkEvent::GotAddress(addr) = outcome {
                self.address = Some(addr);
            }
            self.pending.push_back(outcome);
            Ok(())
        }

        fn next_event(&mut self) -> Result<LinkEvent, NetError> {
            self.pending
                .pop_front()
                .ok_or_else(|| NetError::Driver("no event pending".into()))
        }
    }

    #[test]
    fn test_retry_tracker_ceiling() {
        let mut tracker = RetryTracker::new(2);
        assert_eq!(tracker.on_disconnect(), RetryDecision::Retry(1));
        assert_eq!(tracker.on_disconnect(), RetryDecision::Retry(2));
        assert_eq!(tracker.on_disconnect(), RetryDecision::GiveUp);
        tracker.reset();
        assert_eq!(tracker.retries(), 0);
        assert_eq!(tracker.on_disconnect(), RetryDecision::Retry(1));
    }

    #[test]
    fn test_seven_failures_exhaust_retries() {
        let mut manager = ConnectionManager::new(ScriptedAssociation::failing(7), 6);

        let result = manager.connect();

        assert!(matches!(
            result,
            Err(NetError::RetriesExhausted { attempts: 7 })
        ));
        assert_eq!(manager.link().associations, 7);
    }

    #[test]
    fn test_six_failures_then_success() {
        let addr = Ipv4Addr::new(192, 168, 2, 40);
        let mut manager =
            ConnectionManager::new(ScriptedAssociation::succeeding_after(6, addr), 6);

        assert_eq!(manager.connect().unwrap(), addr);
        assert_eq!(manager.link().associations, 7);
    }

    #[test]
    fn test_already_associated_skips_start() {
        let addr = Ipv4Addr::new(10, 0, 0, 2);
        let link = ScriptedAssociation {
            address: Some(addr),
            ..Default::default()
        };
        let mut manager = ConnectionManager::new(link, 6);

        assert_eq!(manager.connect().unwrap(), addr);
        assert_eq!(manager.link().starts, 0);
    }

    #[test]
    fn test_static_link_is_always_up() {
        let addr = Ipv4Addr::LOCALHOST;
        let mut manager = ConnectionManager::new(StaticLink::new(addr), 6);
        assert_eq!(manager.connect().unwrap(), addr);
        assert_eq!(manager.connect().unwrap(), addr);
    }

    #[test]
    fn test_retries_reset_between_calls() {
        let addr = Ipv4Addr::new(10, 0, 0, 3);
        let mut link = ScriptedAssociation::failing(7);
        link.attempts.extend(
            std::iter::repeat(LinkEvent::Disconnected)
                .take(6)
                .chain([LinkEvent::GotAddress(addr)]),
        );
        let mut manager = ConnectionManager::new(link, 6);

        assert!(manager.connect().is_err());
        assert_eq!(manager.connect().unwrap(), addr);
        assert_eq!(manager.link().starts, 2);
    }
}
