// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer liveness tracking driven by heartbeats.
//!
//! Written by the receive thread only; read by both transport threads and by
//! `connected()` on any caller thread.
//!
//! ```text
//!   Disconnected --(qualifying HEARTBEAT: latch source addr)--> Connected
//!   Connected    --(HEARTBEAT: refresh timestamp)-------------> Connected
//!   Connected    --(now - last_rx > timeout, pull check)------> Disconnected
//! ```

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic millisecond time source.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;
}

/// Wall-clock source backed by `Instant`.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Shared clock for transports.
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Manually advanced clock for simulated time.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Clock starting at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct State {
    connected: bool,
    last_heartbeat_rx_ms: Option<u64>,
    last_heartbeat_tx_ms: Option<u64>,
    remote: Option<SocketAddr>,
}

/// Liveness judgment for the configured target.
pub struct Liveness {
    clock: Arc<dyn Clock>,
    timeout_ms: u64,
    heartbeat_interval_ms: u64,
    state: Mutex<State>,
}

impl Liveness {
    /// Track liveness with the given timeout and self-heartbeat spacing.
    pub fn new(clock: Arc<dyn Clock>, timeout: Duration, heartbeat_interval: Duration) -> Self {
        Self {
            clock,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            heartbeat_interval_ms: u64::try_from(heartbeat_interval.as_millis())
                .unwrap_or(u64::MAX),
            state: Mutex::new(State::default()),
        }
    }

    /// Current clock reading.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn timed_out(&self, state: &State, now: u64) -> bool {
        match state.last_heartbeat_rx_ms {
            Some(last) => now.saturating_sub(last) > self.timeout_ms,
            None => true,
        }
    }

    /// Record a qualifying heartbeat received from `source`.
    ///
    /// Latches `source` as the remote address when disconnected. Returns
    /// `true` if this heartbeat established the connection.
    pub fn on_heartbeat(&self, source: SocketAddr) -> bool {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        let newly_connected = if !state.connected || self.timed_out(&state, now) {
            state.remote = Some(source);
            state.connected = true;
            true
        } else {
            false
        };

        state.last_heartbeat_rx_ms = Some(now);
        newly_connected
    }

    /// `true` while connected and the last heartbeat is within the timeout.
    pub fn is_connected(&self) -> bool {
        let now = self.clock.now_ms();
        let state = self.state.lock();
        state.connected && !self.timed_out(&state, now)
    }

    /// Clear the connected flag once the timeout has elapsed.
    ///
    /// Returns `true` on the Connected -> Disconnected transition.
    pub fn check_timeout(&self) -> bool {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        if state.connected && self.timed_out(&state, now) {
            state.connected = false;
            true
        } else {
            false
        }
    }

    /// Stamp and return `true` if a self heartbeat is due.
    pub fn heartbeat_due(&self) -> bool {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let due = match state.last_heartbeat_tx_ms {
            Some(last) => now.saturating_sub(last) > self.heartbeat_interval_ms,
            None => true,
        };
        if due {
            state.last_heartbeat_tx_ms = Some(now);
        }
        due
    }

    /// Latched send destination, if discovery succeeded.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.state.lock().remote
    }

    /// Drop connection state (used when the socket is torn down).
    pub fn reset(&self) {
        *self.state.lock() = State::default();
    }
}

impl std::fmt::Debug for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Liveness")
            .field("connected", &state.connected)
            .field("remote", &state.remote)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}
