/*
[INPUT]:  Connection open/close, sent pings, received pongs and traffic
[OUTPUT]: Ping requests and pong-timeout verdicts for the connection driver
[POS]:    WebSocket layer - application level liveness check
[UPDATE]: When changing ping cadence, timeout semantics or liveness sources
*/

use std::future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping frames.
    pub ping_interval: Duration,
    /// Grace period for the pong before the connection is considered dead.
    pub pong_timeout: Duration,
    /// Count any inbound frame as proof of life, not only pongs.
    pub traffic_as_liveness: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(10),
            traffic_as_liveness: false,
        }
    }
}

impl HeartbeatConfig {
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
            traffic_as_liveness: false,
        }
    }
}

/// What the driver has to do when the monitor wakes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a ping frame, then call [`HeartbeatMonitor::ping_sent`].
    SendPing,
    /// No pong within the grace period; treat the connection as dead.
    PongTimeout,
}

/// Timer state for one connection session.
///
/// Holds the two deadlines (next ping, pending pong) and is polled from the
/// driver's `select!` loop, so cancelling is just clearing a field and a
/// cleared deadline can never fire later.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    next_ping: Option<Instant>,
    pong_deadline: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            next_ping: None,
            pong_deadline: None,
        }
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Start the repeating ping schedule (on connection open).
    pub fn arm(&mut self, now: Instant) {
        self.next_ping = Some(now + self.config.ping_interval);
        self.pong_deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_ping.is_some()
    }

    pub fn is_awaiting_pong(&self) -> bool {
        self.pong_deadline.is_some()
    }

    /// Schedule the next ping and open a pong window if none is pending.
    ///
    /// An outstanding window is not pushed back by later pings.
    pub fn ping_sent(&mut self, now: Instant) {
        if self.next_ping.is_none() {
            return;
        }
        self.next_ping = Some(now + self.config.ping_interval);
        if self.pong_deadline.is_none() {
            self.pong_deadline = Some(now + self.config.pong_timeout);
        }
    }

    /// A pong arrived: the pending timeout is replaced by one counted from `now`.
    ///
    /// The new window spans the next ping and its grace period, so a quiet but
    /// healthy session never times out between pings. Ignored once cleaned up.
    pub fn pong_received(&mut self, now: Instant) {
        if self.next_ping.is_none() {
            return;
        }
        self.pong_deadline = Some(now + self.config.ping_interval + self.config.pong_timeout);
    }

    /// Any inbound frame; only counts as a pong when configured to.
    pub fn traffic_received(&mut self, now: Instant) {
        if self.config.traffic_as_liveness {
            self.pong_received(now);
        }
    }

    /// Cancel both timers. Safe to call repeatedly or before `arm`.
    pub fn cleanup(&mut self) {
        self.next_ping = None;
        self.pong_deadline = None;
    }

    /// Earliest pending deadline; a pong timeout wins a tie with a ping.
    pub fn next_deadline(&self) -> Option<(Instant, HeartbeatAction)> {
        match (self.pong_deadline, self.next_ping) {
            (Some(pong), Some(ping)) if ping < pong => Some((ping, HeartbeatAction::SendPing)),
            (Some(pong), _) => Some((pong, HeartbeatAction::PongTimeout)),
            (None, Some(ping)) => Some((ping, HeartbeatAction::SendPing)),
            (None, None) => None,
        }
    }

    /// Action due at `now`, if any.
    pub fn poll_due(&self, now: Instant) -> Option<HeartbeatAction> {
        self.next_deadline()
            .filter(|(at, _)| *at <= now)
            .map(|(_, action)| action)
    }

    /// Sleep until the next deadline. Never resolves while disarmed.
    pub async fn next_action(&self) -> HeartbeatAction {
        match self.next_deadline() {
            Some((at, action)) => {
                sleep_until(at).await;
                action
            }
            None => future::pending().await,
        }
    }
}
