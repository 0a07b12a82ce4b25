// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! System/component addressing rules.
//!
//! MAVLink uses 0 as a wildcard in target fields. A request addressed to
//! `(target_system, target_component)` reaches endpoint `(system, component)`
//! when:
//!
//! | Request | Match |
//! |---------|-------|
//! | `(system, component)` | [`TargetMatch::Exact`] |
//! | `(system, 0)` | [`TargetMatch::System`] |
//! | `(0, 0)` | [`TargetMatch::Broadcast`] |

/// How a request reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMatch {
    /// Addressed to this exact component
    Exact,
    /// Addressed to every component of our system
    System,
    /// Addressed to everyone
    Broadcast,
}

/// Match a request target against an endpoint id pair.
///
/// Returns `None` when the request is meant for someone else.
#[inline]
pub fn match_target(
    target_system: u8,
    target_component: u8,
    system: u8,
    component: u8,
) -> Option<TargetMatch> {
    if target_system == system && target_component == component {
        Some(TargetMatch::Exact)
    } else if target_system == system && target_component == 0 {
        Some(TargetMatch::System)
    } else if target_system == 0 && target_component == 0 {
        Some(TargetMatch::Broadcast)
    } else {
        None
    }
}

/// `true` if the request is addressed to us under any of the three tiers.
#[inline]
pub fn is_addressed_to(target_system: u8, target_component: u8, system: u8, component: u8) -> bool {
    match_target(target_system, target_component, system, component).is_some()
}

/// Inbound sender filter for the configured peer.
///
/// The configured target plays the request role: a target system of 0
/// accepts any sender, a target component of 0 accepts any component of the
/// target system, otherwise the sender must match exactly.
#[inline]
pub fn accepts_sender(
    target_system: u8,
    target_component: u8,
    sender_system: u8,
    sender_component: u8,
) -> bool {
    target_system == 0
        || is_addressed_to(target_system, target_component, sender_system, sender_component)
}
