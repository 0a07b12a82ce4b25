// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Parameter records for the PARAM_REQUEST_LIST / PARAM_SET sub-protocol.
//!
//! Integer values travel bytewise in the `f32` field of PARAM_VALUE and
//! PARAM_SET (the i32 bit pattern reinterpreted), tagged with an integer
//! `MAV_PARAM_TYPE`. Float values are tagged `MAV_PARAM_TYPE_REAL32`.

use crate::config::PARAM_ID_LEN;
use mavlink::common::{MavMessage, MavParamType, PARAM_SET_DATA, PARAM_VALUE_DATA};
use std::fmt;

/// Typed parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
}

impl ParamValue {
    /// Wire representation: `(param_value, param_type)`.
    pub fn to_wire(self) -> (f32, MavParamType) {
        match self {
            Self::Float(v) => (v, MavParamType::MAV_PARAM_TYPE_REAL32),
            Self::Int(v) => (f32::from_bits(v as u32), MavParamType::MAV_PARAM_TYPE_INT32),
        }
    }

    /// Decode a wire value by its type tag.
    ///
    /// Every integer tag is read bytewise; real tags are taken as-is.
    pub fn from_wire(value: f32, param_type: MavParamType) -> Self {
        match param_type {
            MavParamType::MAV_PARAM_TYPE_UINT8
            | MavParamType::MAV_PARAM_TYPE_INT8
            | MavParamType::MAV_PARAM_TYPE_UINT16
            | MavParamType::MAV_PARAM_TYPE_INT16
            | MavParamType::MAV_PARAM_TYPE_UINT32
            | MavParamType::MAV_PARAM_TYPE_INT32 => Self::Int(value.to_bits() as i32),
            _ => Self::Float(value),
        }
    }

    /// Value as `f32` (integers converted numerically).
    pub fn as_f32(self) -> f32 {
        match self {
            Self::Float(v) => v,
            Self::Int(v) => v as f32,
        }
    }

    /// Value as `i32` if integer-typed.
    pub fn as_i32(self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(v),
            Self::Float(_) => None,
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
        }
    }
}

/// One named parameter and its position in the full list.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// At most 16 bytes
    pub name: String,
    pub value: ParamValue,
    /// Position in the canonical list
    pub index: u16,
    /// Size of the canonical list
    pub total_count: u16,
}

impl Parameter {
    /// Create a parameter; the name is truncated to 16 bytes.
    pub fn new(name: &str, value: impl Into<ParamValue>) -> Self {
        Self {
            name: truncate_name(name).to_string(),
            value: value.into(),
            index: 0,
            total_count: 0,
        }
    }

    /// Set list position.
    #[must_use]
    pub fn with_position(mut self, index: u16, total_count: u16) -> Self {
        self.index = index;
        self.total_count = total_count;
        self
    }

    /// Build from an inbound PARAM_SET; index and count are left at zero.
    pub fn from_param_set(data: &PARAM_SET_DATA) -> Self {
        Self {
            name: decode_param_id(&data.param_id),
            value: ParamValue::from_wire(data.param_value, data.param_type),
            index: 0,
            total_count: 0,
        }
    }

    /// Build from an inbound PARAM_VALUE.
    pub fn from_param_value(data: &PARAM_VALUE_DATA) -> Self {
        Self {
            name: decode_param_id(&data.param_id),
            value: ParamValue::from_wire(data.param_value, data.param_type),
            index: data.param_index,
            total_count: data.param_count,
        }
    }

    /// PARAM_VALUE message announcing this parameter.
    pub fn to_param_value(&self) -> MavMessage {
        let (param_value, param_type) = self.value.to_wire();
        MavMessage::PARAM_VALUE(PARAM_VALUE_DATA {
            param_value,
            param_count: self.total_count,
            param_index: self.index,
            param_id: encode_param_id(&self.name),
            param_type,
        })
    }
}

/// Longest prefix of `name` that fits the wire field on a char boundary.
fn truncate_name(name: &str) -> &str {
    if name.len() <= PARAM_ID_LEN {
        return name;
    }
    let mut end = PARAM_ID_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Fixed-width, NUL-padded `param_id` (not terminated when 16 bytes long).
pub fn encode_param_id(name: &str) -> [u8; PARAM_ID_LEN] {
    let mut id = [0u8; PARAM_ID_LEN];
    let bytes = truncate_name(name).as_bytes();
    id[..bytes.len()].copy_from_slice(bytes);
    id
}

/// Read a `param_id` up to the first NUL or the full 16 bytes.
pub fn decode_param_id(id: &[u8; PARAM_ID_LEN]) -> String {
    let len = id.iter().position(|&b| b == 0).unwrap_or(PARAM_ID_LEN);
    String::from_utf8_lossy(&id[..len]).into_owned()
}
