// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session configuration and protocol constants.
//!
//! Every timing value, queue capacity and wire field width used by the
//! session layer lives here. **Never hardcode them elsewhere.**
//!
//! # Environment Variables
//!
//! [`ConfigurationSettings::from_env`] starts from the defaults and applies:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `MAVLINK_URL` | `connection_url` |
//! | `MAVLINK_SYSID` | `sysid` |
//! | `MAVLINK_COMPID` | `compid` |
//! | `MAVLINK_TARGET_SYSID` | `target_sysid` |
//! | `MAVLINK_TARGET_COMPID` | `target_compid` |
//! | `MAVLINK_MAV_TYPE` | `mav_type` (numeric `MAV_TYPE`) |
//! | `MAVLINK_AUTOPILOT` | `mav_autopilot` (numeric `MAV_AUTOPILOT`) |
//! | `MAVLINK_EMIT_HEARTBEAT` | `emit_heartbeat` (`1`/`true`) |

use mavlink::common::{MavAutopilot, MavType};
use num_traits::FromPrimitive;
use std::time::Duration;

// =======================================================================
// Liveness and cadence
// =======================================================================

/// Silence after which the target is considered gone.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_millis(2000);

/// Minimum spacing between two self-emitted heartbeats (1 Hz).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

/// Backoff between socket setup attempts in the receive thread.
pub const SETUP_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Sleep of the send thread while no target is connected.
pub const SEND_IDLE_INTERVAL: Duration = Duration::from_millis(100);

/// OS-level read timeout on the datagram socket.
///
/// Bounds how long the receive loop can go without re-checking the liveness
/// timeout and heartbeat cadence when no traffic arrives.
pub const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

// =======================================================================
// Capacities
// =======================================================================

/// Outbound frame queue capacity (drop-on-full).
pub const OUTBOUND_QUEUE_CAPACITY: usize = 100;

/// Pending command queue capacity (temporarily-rejected ack on overflow).
pub const COMMAND_QUEUE_CAPACITY: usize = 10;

/// Receive buffer size, enough for a 1500 byte MTU.
pub const RECV_BUFFER_SIZE: usize = 2048;

// =======================================================================
// Wire field widths
// =======================================================================

/// PARAM_VALUE / PARAM_SET `param_id` width.
pub const PARAM_ID_LEN: usize = 16;

/// STATUSTEXT `text` width (including the terminator slot).
pub const STATUS_TEXT_LEN: usize = 50;

/// Usable STATUSTEXT characters before the NUL terminator.
pub const STATUS_TEXT_MAX_CHARS: usize = STATUS_TEXT_LEN - 1;

/// MAVLink protocol version advertised in HEARTBEAT.
pub const MAVLINK_VERSION: u8 = 3;

// =======================================================================
// Message ids (common dialect)
// =======================================================================

/// HEARTBEAT
pub const MSG_ID_HEARTBEAT: u32 = 0;
/// PARAM_REQUEST_LIST
pub const MSG_ID_PARAM_REQUEST_LIST: u32 = 21;
/// PARAM_VALUE
pub const MSG_ID_PARAM_VALUE: u32 = 22;
/// PARAM_SET
pub const MSG_ID_PARAM_SET: u32 = 23;
/// COMMAND_LONG
pub const MSG_ID_COMMAND_LONG: u32 = 76;
/// COMMAND_ACK
pub const MSG_ID_COMMAND_ACK: u32 = 77;
/// STATUSTEXT
pub const MSG_ID_STATUSTEXT: u32 = 253;

// =======================================================================
// Defaults
// =======================================================================

/// Default connection URL (QGroundControl/MAVSDK companion port).
pub const DEFAULT_CONNECTION_URL: &str = "udp:0.0.0.0:14540";

/// Default target system id (first autopilot).
pub const DEFAULT_TARGET_SYSID: u8 = 1;

/// Default target component id (MAV_COMP_ID_AUTOPILOT1).
pub const DEFAULT_TARGET_COMPID: u8 = 1;

/// Session configuration.
///
/// Immutable once handed to a [`crate::MavlinkSession`]; the transport only
/// reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationSettings {
    /// `<scheme>:<address>:<port>`, e.g. `udp:0.0.0.0:14540`
    pub connection_url: String,
    /// Our system id
    pub sysid: u8,
    /// Our component id
    pub compid: u8,
    /// Target system id (0 = any system)
    pub target_sysid: u8,
    /// Target component id (0 = any component of the target system)
    pub target_compid: u8,
    /// Vehicle type advertised in our heartbeat
    pub mav_type: MavType,
    /// Autopilot type advertised in our heartbeat
    pub mav_autopilot: MavAutopilot,
    /// Emit a heartbeat every [`HEARTBEAT_INTERVAL`] while connected
    pub emit_heartbeat: bool,
    /// Answer a rejected PARAM_SET with a STATUSTEXT warning instead of silence
    pub param_set_nack: bool,
}

impl Default for ConfigurationSettings {
    fn default() -> Self {
        Self {
            connection_url: DEFAULT_CONNECTION_URL.to_string(),
            sysid: 1,
            compid: 191, // MAV_COMP_ID_ONBOARD_COMPUTER
            target_sysid: DEFAULT_TARGET_SYSID,
            target_compid: DEFAULT_TARGET_COMPID,
            mav_type: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
            mav_autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            emit_heartbeat: true,
            param_set_nack: false,
        }
    }
}

impl ConfigurationSettings {
    /// Create settings for `connection_url` with our own ids, defaults elsewhere.
    pub fn new(connection_url: impl Into<String>, sysid: u8, compid: u8) -> Self {
        Self {
            connection_url: connection_url.into(),
            sysid,
            compid,
            ..Self::default()
        }
    }

    /// Set the target system/component pair.
    #[must_use]
    pub fn with_target(mut self, target_sysid: u8, target_compid: u8) -> Self {
        self.target_sysid = target_sysid;
        self.target_compid = target_compid;
        self
    }

    /// Set the vehicle and autopilot type advertised in our heartbeat.
    #[must_use]
    pub fn with_vehicle(mut self, mav_type: MavType, mav_autopilot: MavAutopilot) -> Self {
        self.mav_type = mav_type;
        self.mav_autopilot = mav_autopilot;
        self
    }

    /// Enable or disable self-emitted heartbeats.
    #[must_use]
    pub fn with_emit_heartbeat(mut self, emit: bool) -> Self {
        self.emit_heartbeat = emit;
        self
    }

    /// Enable or disable the PARAM_SET negative acknowledgment.
    #[must_use]
    pub fn with_param_set_nack(mut self, nack: bool) -> Self {
        self.param_set_nack = nack;
        self
    }

    /// Create from environment variables (see module docs).
    ///
    /// Unparseable values are ignored and the default is kept.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("MAVLINK_URL") {
            config.connection_url = url;
        }
        if let Some(v) = env_u8("MAVLINK_SYSID") {
            config.sysid = v;
        }
        if let Some(v) = env_u8("MAVLINK_COMPID") {
            config.compid = v;
        }
        if let Some(v) = env_u8("MAVLINK_TARGET_SYSID") {
            config.target_sysid = v;
        }
        if let Some(v) = env_u8("MAVLINK_TARGET_COMPID") {
            config.target_compid = v;
        }
        if let Some(t) = env_u8("MAVLINK_MAV_TYPE").and_then(MavType::from_u8) {
            config.mav_type = t;
        }
        if let Some(a) = env_u8("MAVLINK_AUTOPILOT").and_then(MavAutopilot::from_u8) {
            config.mav_autopilot = a;
        }
        if let Ok(val) = std::env::var("MAVLINK_EMIT_HEARTBEAT") {
            config.emit_heartbeat = matches!(val.as_str(), "1" | "true" | "yes");
        }

        log::debug!(
            "[CONFIG] url={} sysid={} compid={} target={}/{} emit_heartbeat={}",
            config.connection_url,
            config.sysid,
            config.compid,
            config.target_sysid,
            config.target_compid,
            config.emit_heartbeat
        );

        config
    }
}

fn env_u8(key: &str) -> Option<u8> {
    std::env::var(key).ok()?.trim().parse::<u8>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let cfg = ConfigurationSettings::new("udp:127.0.0.1:14561", 1, 123)
            .with_target(42, 0)
            .with_vehicle(MavType::MAV_TYPE_WINCH, MavAutopilot::MAV_AUTOPILOT_INVALID)
            .with_emit_heartbeat(false);

        assert_eq!(cfg.connection_url, "udp:127.0.0.1:14561");
        assert_eq!(cfg.sysid, 1);
        assert_eq!(cfg.compid, 123);
        assert_eq!(cfg.target_sysid, 42);
        assert_eq!(cfg.target_compid, 0);
        assert_eq!(cfg.mav_type, MavType::MAV_TYPE_WINCH);
        assert!(!cfg.emit_heartbeat);
        assert!(!cfg.param_set_nack);
    }

    #[test]
    fn test_status_text_width() {
        assert_eq!(STATUS_TEXT_MAX_CHARS, 49);
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("MAVLINK_URL", "udp:127.0.0.1:14999");
        std::env::set_var("MAVLINK_TARGET_SYSID", "7");
        std::env::set_var("MAVLINK_TARGET_COMPID", "not-a-number");
        std::env::set_var("MAVLINK_EMIT_HEARTBEAT", "0");

        let cfg = ConfigurationSettings::from_env();

        std::env::remove_var("MAVLINK_URL");
        std::env::remove_var("MAVLINK_TARGET_SYSID");
        std::env::remove_var("MAVLINK_TARGET_COMPID");
        std::env::remove_var("MAVLINK_EMIT_HEARTBEAT");

        assert_eq!(cfg.connection_url, "udp:127.0.0.1:14999");
        assert_eq!(cfg.target_sysid, 7);
        assert_eq!(cfg.target_compid, DEFAULT_TARGET_COMPID);
        assert!(!cfg.emit_heartbeat);
    }
}
