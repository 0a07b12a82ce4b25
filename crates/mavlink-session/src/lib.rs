// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # mavlink-session - MAVLink client session layer
//!
//! Talks to one remote autopilot or ground station over UDP: discovers the
//! peer from its heartbeats, tracks liveness, moves frames between the caller
//! and two I/O threads through bounded queues and routes inbound messages to
//! one subscriber per message id.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mavlink_session::{ConfigurationSettings, MavlinkSession, Parameter};
//!
//! let settings = ConfigurationSettings::new("udp:0.0.0.0:14540", 1, 191).with_target(1, 1);
//! let session = MavlinkSession::new(settings);
//!
//! session.enable_parameters(
//!     || vec![Parameter::new("RATE_HZ", 50i32).with_position(0, 1)],
//!     |param| param.name == "RATE_HZ",
//! );
//!
//! if !session.start().is_success() {
//!     return;
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |  MavlinkSession: subscriptions | params | commands | acks   |
//! +-------------------------------------------------------------+
//! |  Transport (trait)                                          |
//! |    UdpTransport: mav-udp-rx  |  mav-udp-tx  |  Liveness     |
//! +-------------------------------------------------------------+
//! |  codec (mavlink crate, v2 framing)  |  BoundedQueue         |
//! +-------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MavlinkSession`] | Entry point: start/stop, subscribe, send helpers |
//! | [`ConfigurationSettings`] | Ids, target, connection URL, heartbeat policy |
//! | [`ConnectionResult`] | Synchronous outcome of `start()` |
//! | [`Parameter`] | Named value served by the parameter protocol |
//! | [`PendingCommand`] | COMMAND_LONG waiting for an ack |

/// Inbound command capture and acknowledgement.
pub mod command;
/// Protocol constants and session configuration.
pub mod config;
/// Datagram framing on top of the `mavlink` codec.
pub mod codec;
/// Result codes and error types.
pub mod error;
/// Parameter records and wire conversions.
pub mod params;
/// Bounded blocking queue.
pub mod queue;
/// Session router (the public entry point).
pub mod session;
/// System/component addressing rules.
pub mod target;
/// Transport contract and UDP realization.
pub mod transport;

pub use codec::{InboundMessage, OutboundFrame};
pub use command::PendingCommand;
pub use config::ConfigurationSettings;
pub use error::{ConnectionResult, Error, Result};
pub use params::{ParamValue, Parameter};
pub use session::{MavlinkSession, MessageCallback};
pub use transport::{ManualClock, MetricsSnapshot, SessionHandler, Transport, UdpTransport};

/// Re-export of the codec crate for message types.
pub use mavlink;
