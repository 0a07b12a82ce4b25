// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP transport: one datagram socket, a receive thread and a send thread.
//!
//! # Architecture
//!
//! ```text
//! mav-udp-rx: recv_from() -> FrameExtractor -> target filter
//!                 -> heartbeat? Liveness::on_heartbeat (latch remote)
//!                 -> connected? SessionHandler::handle_message
//!                 -> Liveness::check_timeout, heartbeat cadence
//!
//! caller:     queue_message() -> BoundedQueue (drop on full)
//! mav-udp-tx: BoundedQueue::pop(blocking) -> send_to(remote)
//! ```
//!
//! The socket is created with `socket2` and bound to the URL's local address.
//! The peer's address is never configured: it is learned from the source of
//! the first heartbeat sent by the configured target.
//!
//! # Shutdown
//!
//! `stop()` clears the running flag, shuts the socket down to unblock the
//! receive thread, joins it, then closes the outbound queue, which releases
//! the send thread from its blocking pop, and joins it. `start()` reopens it.

use super::liveness::{Clock, Liveness, SystemClock};
use super::{MetricsSnapshot, SessionHandler, Transport, TransportMetrics};
use crate::codec::{FrameExtractor, InboundMessage, OutboundFrame};
use crate::config::{
    ConfigurationSettings, CONNECTION_TIMEOUT, HEARTBEAT_INTERVAL, OUTBOUND_QUEUE_CAPACITY,
    RECV_BUFFER_SIZE, RECV_POLL_INTERVAL, SEND_IDLE_INTERVAL, SETUP_RETRY_INTERVAL,
};
use crate::error::{ConnectionResult, Error, Result};
use crate::queue::BoundedQueue;
use crate::target::accepts_sender;
use parking_lot::{Mutex, RwLock};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::{Shutdown, SocketAddr, UdpSocket};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Datagram transport bound to a local address.
pub struct UdpTransport {
    inner: Arc<Inner>,
    threads: Mutex<Option<IoThreads>>,
}

struct IoThreads {
    recv: JoinHandle<()>,
    send: JoinHandle<()>,
}

/// State shared with the I/O threads.
struct Inner {
    local_addr: SocketAddr,
    settings: ConfigurationSettings,
    handler: Weak<dyn SessionHandler>,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    liveness: Liveness,
    outbound: BoundedQueue<OutboundFrame>,
    running: AtomicBool,
    metrics: TransportMetrics,
}

impl UdpTransport {
    /// Create a stopped transport bound (on `start`) to `local_addr`.
    pub fn new(
        local_addr: SocketAddr,
        settings: ConfigurationSettings,
        handler: Weak<dyn SessionHandler>,
    ) -> Self {
        Self::with_clock(local_addr, settings, handler, SystemClock::shared())
    }

    /// Same as [`UdpTransport::new`] with an explicit liveness clock.
    pub fn with_clock(
        local_addr: SocketAddr,
        settings: ConfigurationSettings,
        handler: Weak<dyn SessionHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                local_addr,
                settings,
                handler,
                socket: RwLock::new(None),
                liveness: Liveness::new(clock, CONNECTION_TIMEOUT, HEARTBEAT_INTERVAL),
                outbound: BoundedQueue::new(OUTBOUND_QUEUE_CAPACITY),
                running: AtomicBool::new(false),
                metrics: TransportMetrics::default(),
            }),
            threads: Mutex::new(None),
        }
    }

    /// Address the socket is actually bound to (resolves port 0).
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.inner
            .current_socket()
            .and_then(|socket| socket.local_addr().ok())
    }

    /// Peer address learned from the first qualifying heartbeat.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.liveness.remote()
    }

    /// `true` between a successful `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Frames waiting for the send thread.
    pub fn queued(&self) -> usize {
        self.inner.outbound.len()
    }

    /// Live diagnostics counters.
    pub fn transport_metrics(&self) -> &TransportMetrics {
        &self.inner.metrics
    }

    fn spawn_threads(&self) -> io::Result<IoThreads> {
        let inner = Arc::clone(&self.inner);
        let recv = thread::Builder::new()
            .name("mav-udp-rx".to_string())
            .spawn(move || inner.recv_loop())?;

        let inner = Arc::clone(&self.inner);
        let send = match thread::Builder::new()
            .name("mav-udp-tx".to_string())
            .spawn(move || inner.send_loop())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.running.store(false, Ordering::Release);
                self.inner.shutdown_socket();
                let _ = recv.join();
                return Err(e);
            }
        };

        Ok(IoThreads { recv, send })
    }
}

impl Transport for UdpTransport {
    fn start(&self) -> ConnectionResult {
        let mut threads = self.threads.lock();
        if threads.is_some() {
            log::warn!("[UDP] start() on running transport {}", self.inner.local_addr);
            return ConnectionResult::SystemBusy;
        }

        if let Err(e) = self.inner.setup_port() {
            log::error!("[UDP] setup failed on {}: {}", self.inner.local_addr, e);
            return e.connection_result();
        }

        self.inner.outbound.reopen();
        self.inner.running.store(true, Ordering::Release);
        match self.spawn_threads() {
            Ok(io) => {
                *threads = Some(io);
                log::info!("[UDP] listening on {}", self.inner.local_addr);
                ConnectionResult::Success
            }
            Err(e) => {
                self.inner.running.store(false, Ordering::Release);
                self.inner.teardown();
                let err = Error::Spawn(e);
                log::error!("[UDP] {}", err);
                err.connection_result()
            }
        }
    }

    fn stop(&self) {
        // Take the handles first so no lock is held while joining
        let threads = self.threads.lock().take();
        let Some(io) = threads else {
            return;
        };

        self.inner.running.store(false, Ordering::Release);
        self.inner.shutdown_socket();
        let _ = io.recv.join();

        self.inner.outbound.close();
        let _ = io.send.join();

        self.inner.outbound.clear();
        self.inner.teardown();
        log::info!("[UDP] stopped {}", self.inner.local_addr);
    }

    fn send_message(&self, frame: &OutboundFrame) -> bool {
        self.inner.send_frame(frame)
    }

    fn queue_message(&self, frame: OutboundFrame) -> bool {
        if self.inner.outbound.push(frame) {
            true
        } else {
            TransportMetrics::bump(&self.inner.metrics.queue_drops);
            false
        }
    }

    fn connected(&self) -> bool {
        self.inner.liveness.is_connected()
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(self.inner.metrics.snapshot())
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local_addr", &self.inner.local_addr)
            .field("running", &self.is_running())
            .field("liveness", &self.inner.liveness)
            .field("outbound", &self.inner.outbound)
            .finish()
    }
}

impl Inner {
    fn current_socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket.read().clone()
    }

    fn create_socket(&self) -> Result<UdpSocket> {
        let socket = Socket::new(
            Domain::for_address(self.local_addr),
            Type::DGRAM,
            Some(Protocol::UDP),
        )
        .map_err(Error::Socket)?;
        socket.set_reuse_address(true).map_err(Error::Socket)?;
        socket
            .bind(&self.local_addr.into())
            .map_err(Error::Bind)?;

        let socket: UdpSocket = socket.into();
        // Bounded reads so the loop keeps checking timeout and cadence
        socket
            .set_read_timeout(Some(RECV_POLL_INTERVAL))
            .map_err(Error::Socket)?;
        Ok(socket)
    }

    /// Uninitialized -> Initialized.
    fn setup_port(&self) -> Result<()> {
        let socket = self.create_socket()?;
        log::debug!(
            "[UDP] socket bound to {}",
            socket
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string())
        );
        *self.socket.write() = Some(Arc::new(socket));
        Ok(())
    }

    /// Unblock a pending `recv_from` without dropping the socket.
    fn shutdown_socket(&self) {
        if let Some(socket) = self.current_socket() {
            // ENOTCONN is expected on an unconnected datagram socket
            if let Err(e) = SockRef::from(&*socket).shutdown(Shutdown::Both) {
                log::debug!("[UDP] socket shutdown: {}", e);
            }
        }
    }

    /// Initialized -> Uninitialized.
    fn teardown(&self) {
        *self.socket.write() = None;
        self.liveness.reset();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn sleep_while_running(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(RECV_POLL_INTERVAL));
        }
    }

    fn recv_loop(&self) {
        log::debug!(
            "[UDP] receive thread started addr={} thread={:?}",
            self.local_addr,
            thread::current().id()
        );
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        while self.is_running() {
            let Some(socket) = self.current_socket() else {
                self.sleep_while_running(SETUP_RETRY_INTERVAL);
                if !self.is_running() {
                    break;
                }
                match self.setup_port() {
                    Ok(()) => log::info!("[UDP] socket re-established on {}", self.local_addr),
                    Err(e) => log::warn!("[UDP] setup retry failed on {}: {}", self.local_addr, e),
                }
                continue;
            };

            match socket.recv_from(&mut buf) {
                Ok((0, _)) => {}
                Ok((len, src)) => self.process_datagram(&buf[..len], src),
                Err(e) => self.on_recv_error(&e),
            }

            if self.liveness.check_timeout() {
                log::info!(
                    "[UDP] connection to target {}/{} timed out",
                    self.settings.target_sysid,
                    self.settings.target_compid
                );
            }

            if self.settings.emit_heartbeat
                && self.liveness.is_connected()
                && self.liveness.heartbeat_due()
            {
                if let Some(handler) = self.handler.upgrade() {
                    handler.emit_heartbeat();
                }
            }
        }

        log::debug!("[UDP] receive thread exiting");
    }

    fn on_recv_error(&self, e: &io::Error) {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {}
            // ICMP port unreachable from a vanished peer
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                log::debug!("[UDP] peer unreachable: {}", e);
            }
            _ if !self.is_running() => {}
            _ => {
                log::error!("[UDP] receive failed, resetting socket: {}", e);
                self.teardown();
            }
        }
    }

    fn process_datagram(&self, datagram: &[u8], src: SocketAddr) {
        TransportMetrics::bump(&self.metrics.datagrams_received);

        let mut extractor = FrameExtractor::new(datagram);
        for message in extractor.by_ref() {
            if !accepts_sender(
                self.settings.target_sysid,
                self.settings.target_compid,
                message.system_id(),
                message.component_id(),
            ) {
                TransportMetrics::bump(&self.metrics.frames_filtered);
                continue;
            }

            if message.is_heartbeat() && self.liveness.on_heartbeat(src) {
                log::info!(
                    "[UDP] connected to system {}/{} at {}",
                    message.system_id(),
                    message.component_id(),
                    src
                );
            }

            if self.liveness.is_connected() {
                self.dispatch(&message);
            } else {
                TransportMetrics::bump(&self.metrics.frames_filtered);
            }
        }

        let skipped = extractor.skipped();
        if skipped > 0 {
            self.metrics
                .frames_skipped
                .fetch_add(skipped as u64, Ordering::Relaxed);
        }
    }

    fn dispatch(&self, message: &InboundMessage) {
        let Some(handler) = self.handler.upgrade() else {
            return;
        };
        // A panicking subscriber must not take the receive thread down
        let result = catch_unwind(AssertUnwindSafe(|| handler.handle_message(message)));
        match result {
            Ok(()) => TransportMetrics::bump(&self.metrics.frames_dispatched),
            Err(_) => {
                TransportMetrics::bump(&self.metrics.callback_panics);
                log::error!(
                    "[UDP] subscriber panicked on message id {}",
                    message.message_id()
                );
            }
        }
    }

    fn send_frame(&self, frame: &OutboundFrame) -> bool {
        let (Some(remote), Some(socket)) = (self.liveness.remote(), self.current_socket()) else {
            TransportMetrics::bump(&self.metrics.queue_drops);
            return false;
        };

        match socket.send_to(frame.as_bytes(), remote) {
            Ok(sent) if sent == frame.len() => {
                TransportMetrics::bump(&self.metrics.frames_sent);
                true
            }
            Ok(sent) => {
                TransportMetrics::bump(&self.metrics.send_failures);
                log::warn!("[UDP] partial send to {}: {}/{} bytes", remote, sent, frame.len());
                false
            }
            Err(e) => {
                TransportMetrics::bump(&self.metrics.send_failures);
                log::debug!("[UDP] send to {} failed: {}", remote, e);
                false
            }
        }
    }

    fn send_loop(&self) {
        log::debug!("[UDP] send thread started thread={:?}", thread::current().id());

        while self.is_running() {
            if self.current_socket().is_some() && self.liveness.is_connected() {
                // Woken by close() on stop
                if let Some(frame) = self.outbound.pop(true) {
                    if !self.send_frame(&frame) {
                        log::warn!("[UDP] send message failed, frame dropped");
                    }
                }
            } else {
                thread::sleep(SEND_IDLE_INTERVAL);
            }
        }

        log::debug!("[UDP] send thread exiting");
    }
}
