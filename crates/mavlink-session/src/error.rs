// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Result codes and error types for the session layer.

use std::fmt;
use std::io;

/// Outcome of a connection attempt.
///
/// Returned synchronously by `start()`, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionResult {
    /// Connection started
    Success,
    /// Operation timed out
    Timeout,
    /// Socket could not be created
    SocketError,
    /// Socket could not be bound to the local address
    BindError,
    /// Socket connection failed
    SocketConnectionError,
    /// Generic connection failure
    ConnectionError,
    /// Transport variant not implemented
    NotImplemented,
    /// No system connected
    SystemNotConnected,
    /// Transport already running
    SystemBusy,
    /// Command denied
    CommandDenied,
    /// Destination address unknown
    DestinationIpUnknown,
    /// No more connections available
    ConnectionsExhausted,
    /// Connection URL could not be parsed
    ConnectionUrlInvalid,
    /// Serial baudrate not supported
    BaudrateUnknown,
}

impl ConnectionResult {
    /// `true` for [`ConnectionResult::Success`].
    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for ConnectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "Success",
            Self::Timeout => "Timeout",
            Self::SocketError => "Socket error",
            Self::BindError => "Bind error",
            Self::SocketConnectionError => "Socket connection error",
            Self::ConnectionError => "Connection error",
            Self::NotImplemented => "Not implemented",
            Self::SystemNotConnected => "System not connected",
            Self::SystemBusy => "System busy",
            Self::CommandDenied => "Command denied",
            Self::DestinationIpUnknown => "Destination IP unknown",
            Self::ConnectionsExhausted => "Connections exhausted",
            Self::ConnectionUrlInvalid => "Invalid connection URL",
            Self::BaudrateUnknown => "Baudrate unknown",
        };
        f.write_str(text)
    }
}

/// Result type for fallible session helpers
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by internal helpers (URL parsing, socket setup, encoding).
///
/// Mapped onto [`ConnectionResult`] at the `start()` boundary.
#[derive(Debug)]
pub enum Error {
    /// Connection URL is malformed
    InvalidUrl(String),
    /// URL scheme has no transport
    UnsupportedScheme(String),
    /// Serial baud rate is not a number
    InvalidBaudrate(String),
    /// Socket creation failed
    Socket(io::Error),
    /// Binding the local address failed
    Bind(io::Error),
    /// Frame encoding failed
    Encode(String),
    /// Thread spawn failed
    Spawn(io::Error),
}

impl Error {
    /// Result code reported to the caller of `start()`.
    pub fn connection_result(&self) -> ConnectionResult {
        match self {
            Self::InvalidUrl(_) => ConnectionResult::ConnectionUrlInvalid,
            Self::UnsupportedScheme(_) => ConnectionResult::NotImplemented,
            Self::InvalidBaudrate(_) => ConnectionResult::BaudrateUnknown,
            Self::Socket(_) | Self::Spawn(_) => ConnectionResult::SocketError,
            Self::Bind(_) => ConnectionResult::BindError,
            Self::Encode(_) => ConnectionResult::ConnectionError,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(url) => write!(f, "invalid connection url: {}", url),
            Self::UnsupportedScheme(scheme) => {
                write!(f, "connection scheme not implemented: {}", scheme)
            }
            Self::InvalidBaudrate(baud) => write!(f, "unknown baud rate: {}", baud),
            Self::Socket(e) => write!(f, "socket error: {}", e),
            Self::Bind(e) => write!(f, "bind error: {}", e),
            Self::Encode(msg) => write!(f, "frame encoding failed: {}", msg),
            Self::Spawn(e) => write!(f, "thread spawn failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Socket(e) | Self::Bind(e) | Self::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Socket(e)
    }
}

impl From<Error> for ConnectionResult {
    fn from(e: Error) -> Self {
        e.connection_result()
    }
}
