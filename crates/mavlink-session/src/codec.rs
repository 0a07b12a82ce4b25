// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame extraction and encoding on top of the `mavlink` codec.
//!
//! The `mavlink` crate owns byte-level framing, CRC validation and field
//! layout. This module only owns the "one datagram may hold several frames"
//! iteration and the conversion of typed messages into transmit buffers.

use crate::error::{Error, Result};
use mavlink::common::MavMessage;
use mavlink::error::MessageReadError;
use mavlink::peek_reader::PeekReader;
use mavlink::{MavHeader, Message};
use std::io::Cursor;

/// Largest MAVLink v2 frame (header + 255 payload + CRC + signature).
pub const MAX_FRAME_LEN: usize = 280;

/// A decoded message together with its sender header.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Sender system/component id and sequence number
    pub header: MavHeader,
    /// Decoded payload
    pub message: MavMessage,
}

impl InboundMessage {
    /// Wrap a decoded message.
    pub fn new(header: MavHeader, message: MavMessage) -> Self {
        Self { header, message }
    }

    /// Numeric message id (e.g. 0 for HEARTBEAT).
    #[inline]
    pub fn message_id(&self) -> u32 {
        self.message.message_id()
    }

    /// Sender system id.
    #[inline]
    pub fn system_id(&self) -> u8 {
        self.header.system_id
    }

    /// Sender component id.
    #[inline]
    pub fn component_id(&self) -> u8 {
        self.header.component_id
    }

    /// `true` if the payload is a HEARTBEAT.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self.message, MavMessage::HEARTBEAT(_))
    }
}

/// A fully encoded frame ready for one `send_to` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    bytes: Vec<u8>,
}

impl OutboundFrame {
    /// Wrap raw frame bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Encoded bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded length.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// `true` for a zero-length frame.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume into the byte buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Serialize `message` as a MAVLink v2 frame sent by `header`.
pub fn encode(header: MavHeader, message: &MavMessage) -> Result<OutboundFrame> {
    let mut bytes = Vec::with_capacity(MAX_FRAME_LEN);
    mavlink::write_v2_msg(&mut bytes, header, message)
        .map_err(|e| Error::Encode(format!("{:?}", e)))?;
    Ok(OutboundFrame { bytes })
}

/// Iterator over the messages packed into one datagram.
///
/// Yields every complete, CRC-valid frame in input order. The decoder
/// resynchronizes past frames with a bad checksum; frames with an unknown id
/// are skipped and counted. Trailing bytes that never complete a frame end
/// the iteration. Nothing carries over to the next datagram.
pub struct FrameExtractor<'a> {
    reader: PeekReader<Cursor<&'a [u8]>>,
    yielded: usize,
    skipped: usize,
    exhausted: bool,
}

impl<'a> FrameExtractor<'a> {
    /// Start extracting from `datagram`.
    pub fn new(datagram: &'a [u8]) -> Self {
        Self {
            reader: PeekReader::new(Cursor::new(datagram)),
            yielded: 0,
            skipped: 0,
            exhausted: datagram.is_empty(),
        }
    }

    /// Messages yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Frames recognized but rejected by the decoder (unknown id).
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for FrameExtractor<'_> {
    type Item = InboundMessage;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted {
            match mavlink::read_v2_msg::<MavMessage, _>(&mut self.reader) {
                Ok((header, message)) => {
                    self.yielded += 1;
                    return Some(InboundMessage { header, message });
                }
                Err(MessageReadError::Parse(e)) => {
                    self.skipped += 1;
                    log::debug!("[CODEC] skipping undecodable frame: {:?}", e);
                }
                Err(MessageReadError::Io(_)) => {
                    // End of datagram, possibly with an incomplete frame
                    self.exhausted = true;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{
        MavAutopilot, MavModeFlag, MavParamType, MavSeverity, MavState, MavType, HEARTBEAT_DATA,
        PARAM_VALUE_DATA, STATUSTEXT_DATA,
    };

    fn header(system_id: u8, component_id: u8) -> MavHeader {
        MavHeader {
            system_id,
            component_id,
            sequence: 0,
        }
    }

    fn heartbeat() -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_PX4,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_STANDBY,
            mavlink_version: 3,
        })
    }

    fn status_text() -> MavMessage {
        let mut text = [0u8; 50];
        text[..5].copy_from_slice(b"hello");
        MavMessage::STATUSTEXT(STATUSTEXT_DATA {
            severity: MavSeverity::MAV_SEVERITY_INFO,
            text,
            id: 0,
            chunk_seq: 0,
        })
    }

    fn param_value() -> MavMessage {
        let mut param_id = [0u8; 16];
        param_id[..5].copy_from_slice(b"SPEED");
        MavMessage::PARAM_VALUE(PARAM_VALUE_DATA {
            param_value: 5.0,
            param_count: 2,
            param_index: 1,
            param_id,
            param_type: MavParamType::MAV_PARAM_TYPE_REAL32,
        })
    }

    #[test]
    fn test_three_frames_in_one_datagram() {
        let mut datagram = Vec::new();
        datagram.extend_from_slice(encode(header(1, 1), &heartbeat()).unwrap().as_bytes());
        datagram.extend_from_slice(encode(header(1, 1), &status_text()).unwrap().as_bytes());
        datagram.extend_from_slice(encode(header(1, 1), &param_value()).unwrap().as_bytes());

        let mut extractor = FrameExtractor::new(&datagram);
        let messages: Vec<_> = extractor.by_ref().collect();

        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0].message, MavMessage::HEARTBEAT(_)));
        assert!(matches!(messages[1].message, MavMessage::STATUSTEXT(_)));
        assert!(matches!(messages[2].message, MavMessage::PARAM_VALUE(_)));
        assert_eq!(extractor.yielded(), 3);
        assert_eq!(extractor.next(), None);
    }

    #[test]
    fn test_trailing_garbage_is_dropped() {
        let mut datagram = encode(header(3, 4), &heartbeat()).unwrap().into_bytes();
        let second = encode(header(3, 4), &heartbeat()).unwrap().into_bytes();
        // Truncated second frame
        datagram.extend_from_slice(&second[..second.len() / 2]);

        let messages: Vec<_> = FrameExtractor::new(&datagram).collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].system_id(), 3);
        assert_eq!(messages[0].component_id(), 4);
        assert!(messages[0].is_heartbeat());
    }

    #[test]
    fn test_corrupted_frame_skipped_next_frame_kept() {
        let mut first = encode(header(1, 1), &status_text()).unwrap().into_bytes();
        let last = first.len() - 1;
        first[last] ^= 0xFF; // break CRC
        let second = encode(header(2, 1), &heartbeat()).unwrap().into_bytes();

        let mut datagram = first;
        datagram.extend_from_slice(&second);
        // Room for any false start-of-frame inside the broken frame
        datagram.extend_from_slice(&[0u8; MAX_FRAME_LEN]);

        let messages: Vec<_> = FrameExtractor::new(&datagram).collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].system_id(), 2);
    }

    #[test]
    fn test_empty_and_noise_yield_nothing() {
        assert_eq!(FrameExtractor::new(&[]).count(), 0);
        assert_eq!(FrameExtractor::new(&[0x01, 0x02, 0x03, 0x04]).count(), 0);
    }

    #[test]
    fn test_encode_carries_sender_ids() {
        let frame = encode(header(9, 200), &heartbeat()).unwrap();
        assert!(!frame.is_empty());
        assert!(frame.len() <= MAX_FRAME_LEN);

        let decoded: Vec<_> = FrameExtractor::new(frame.as_bytes()).collect();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].system_id(), 9);
        assert_eq!(decoded[0].component_id(), 200);
        assert_eq!(decoded[0].message_id(), crate::config::MSG_ID_HEARTBEAT);
    }
}
