// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport layer: the contract a link must fulfil and its UDP realization.
//!
//! A transport owns the I/O threads, the outbound queue and the liveness
//! judgment for one peer. It never interprets messages beyond heartbeats; every
//! accepted message is handed to the owning session through [`SessionHandler`].
//!
//! # Connection URLs
//!
//! | URL | Transport |
//! |-----|-----------|
//! | `udp:<local-ip>:<port>` | [`UdpTransport`] bound to that local address |
//! | `udp://<local-ip>:<port>` | same |
//! | `serial:<device>[:<baud>]` | recognized, not implemented |
//! | `serial_flowcontrol:<device>[:<baud>]` | recognized, not implemented |

pub mod liveness;
pub mod udp;

pub use liveness::{Clock, Liveness, ManualClock, SystemClock};
pub use udp::UdpTransport;

use crate::codec::{InboundMessage, OutboundFrame};
use crate::error::{ConnectionResult, Error, Result};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// A bidirectional message link to one peer.
///
/// All methods take `&self`: the transport is shared between the session and
/// its own I/O threads.
pub trait Transport: Send + Sync {
    /// Open the link and spawn the I/O threads.
    fn start(&self) -> ConnectionResult;

    /// Stop the I/O threads and release the link. Idempotent.
    fn stop(&self);

    /// Transmit one frame immediately on the caller's thread.
    ///
    /// Returns `true` only if the whole frame went out.
    fn send_message(&self, frame: &OutboundFrame) -> bool;

    /// Hand a frame to the send thread. Returns `false` if it was dropped.
    fn queue_message(&self, frame: OutboundFrame) -> bool;

    /// `true` while the peer is heard from within the liveness timeout.
    fn connected(&self) -> bool;

    /// Diagnostics counters, if the transport keeps any.
    fn metrics(&self) -> Option<MetricsSnapshot> {
        None
    }
}

/// Receiving side of a transport: the session that owns it.
///
/// Both methods run on the transport's receive thread.
pub trait SessionHandler: Send + Sync {
    /// Dispatch one accepted inbound message.
    fn handle_message(&self, message: &InboundMessage);

    /// Queue one self heartbeat (called on the heartbeat cadence).
    fn emit_heartbeat(&self);
}

/// Transport diagnostics (relaxed atomic counters).
#[derive(Debug, Default)]
pub struct TransportMetrics {
    /// Datagrams read from the socket
    pub datagrams_received: AtomicU64,
    /// Messages handed to the session
    pub frames_dispatched: AtomicU64,
    /// Messages rejected by the target filter or received while disconnected
    pub frames_filtered: AtomicU64,
    /// Frames the codec could not decode
    pub frames_skipped: AtomicU64,
    /// Frames written to the socket
    pub frames_sent: AtomicU64,
    /// Failed or partial socket writes
    pub send_failures: AtomicU64,
    /// Frames dropped because the outbound queue was full or no peer was known
    pub queue_drops: AtomicU64,
    /// Panics caught in subscriber callbacks
    pub callback_panics: AtomicU64,
}

/// Point-in-time copy of [`TransportMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub datagrams_received: u64,
    pub frames_dispatched: u64,
    pub frames_filtered: u64,
    pub frames_skipped: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
    pub queue_drops: u64,
    pub callback_panics: u64,
}

impl TransportMetrics {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            frames_dispatched: self.frames_dispatched.load(Ordering::Relaxed),
            frames_filtered: self.frames_filtered.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
        }
    }
}

/// Parsed connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUrl {
    /// Datagram link bound to a local address
    Udp(SocketAddr),
    /// Serial device (no transport yet)
    Serial {
        device: String,
        baudrate: Option<u32>,
        flow_control: bool,
    },
}

impl ConnectionUrl {
    /// Parse `<scheme>:<address>[:<port>]`.
    pub fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once(':')
            .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;

        match scheme {
            "udp" => {
                let addr = rest.strip_prefix("//").unwrap_or(rest);
                SocketAddr::from_str(addr)
                    .map(Self::Udp)
                    .map_err(|_| Error::InvalidUrl(url.to_string()))
            }
            "serial" | "serial_flowcontrol" => {
                let (device, baudrate) = match rest.rsplit_once(':') {
                    Some((device, baud)) => {
                        let baud = baud
                            .parse::<u32>()
                            .map_err(|_| Error::InvalidBaudrate(baud.to_string()))?;
                        (device, Some(baud))
                    }
                    None => (rest, None),
                };
                if device.is_empty() {
                    return Err(Error::InvalidUrl(url.to_string()));
                }
                Ok(Self::Serial {
                    device: device.to_string(),
                    baudrate,
                    flow_control: scheme == "serial_flowcontrol",
                })
            }
            _ if is_scheme_name(scheme) => Err(Error::UnsupportedScheme(scheme.to_string())),
            _ => Err(Error::InvalidUrl(url.to_string())),
        }
    }

    /// URL scheme name.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Udp(_) => "udp",
            Self::Serial {
                flow_control: false,
                ..
            } => "serial",
            Self::Serial {
                flow_control: true,
                ..
            } => "serial_flowcontrol",
        }
    }
}

/// `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." / "_" )`
fn is_scheme_name(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | '_'))
}

impl FromStr for ConnectionUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp(addr) => write!(f, "udp:{}", addr),
            Self::Serial {
                device,
                baudrate: Some(baud),
                ..
            } => write!(f, "{}:{}:{}", self.scheme(), device, baud),
            Self::Serial { device, .. } => write!(f, "{}:{}", self.scheme(), device),
        }
    }
}
