// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound commands awaiting an acknowledgement.

use mavlink::common::{MavCmd, MavMessage, MavResult, COMMAND_ACK_DATA, COMMAND_LONG_DATA};

/// A COMMAND_LONG received from a peer, queued for the application.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    /// System id of the sender (ack destination)
    pub sender_sysid: u8,
    /// Component id of the sender (ack destination)
    pub sender_compid: u8,
    pub command: MavCmd,
    /// Retransmission counter (0 for the first transmission)
    pub confirmation: u8,
    /// param1..param7
    pub params: [f32; 7],
}

impl PendingCommand {
    /// Capture a COMMAND_LONG sent by `sender_sysid`/`sender_compid`.
    pub fn from_command_long(sender_sysid: u8, sender_compid: u8, data: &COMMAND_LONG_DATA) -> Self {
        Self {
            sender_sysid,
            sender_compid,
            command: data.command,
            confirmation: data.confirmation,
            params: [
                data.param1,
                data.param2,
                data.param3,
                data.param4,
                data.param5,
                data.param6,
                data.param7,
            ],
        }
    }

    /// COMMAND_ACK answering this command.
    pub fn ack(&self, result: MavResult) -> MavMessage {
        MavMessage::COMMAND_ACK(COMMAND_ACK_DATA {
            command: self.command,
            result,
            progress: 0,
            result_param2: 0,
            target_system: self.sender_sysid,
            target_component: self.sender_compid,
        })
    }
}
