// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability over pedantic
#![allow(clippy::float_cmp)] // Test assertions with constants
#![allow(clippy::missing_panics_doc)] // Tests panic on failure
#![allow(clippy::items_after_statements)] // Test helpers

//! Loopback tests: a session on 127.0.0.1 against a plain UDP peer socket.
//!
//! The peer plays the remote autopilot/GCS: it sends heartbeats and requests
//! and decodes whatever the session transmits back.

use mavlink_session::codec::{encode, FrameExtractor};
use mavlink_session::config::{MSG_ID_HEARTBEAT, MSG_ID_STATUSTEXT};
use mavlink_session::mavlink::common::{
    MavAutopilot, MavMessage, MavModeFlag, MavSeverity, MavState, MavType, HEARTBEAT_DATA,
    PARAM_REQUEST_LIST_DATA, STATUSTEXT_DATA,
};
use mavlink_session::mavlink::MavHeader;
use mavlink_session::{
    ConfigurationSettings, InboundMessage, ManualClock, MavlinkSession, Parameter,
};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(3);

fn free_local_addr() -> SocketAddr {
    let probe = UdpSocket::bind("127.0.0.1:0").expect("probe bind");
    probe.local_addr().expect("probe addr")
}

fn peer_socket() -> UdpSocket {
    let peer = UdpSocket::bind("127.0.0.1:0").expect("peer bind");
    peer.set_read_timeout(Some(Duration::from_millis(50)))
        .expect("peer timeout");
    peer
}

fn frame(system_id: u8, component_id: u8, message: &MavMessage) -> Vec<u8> {
    let header = MavHeader {
        system_id,
        component_id,
        sequence: 0,
    };
    encode(header, message).expect("encode").into_bytes()
}

fn heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_QUADROTOR,
        autopilot: MavAutopilot::MAV_AUTOPILOT_PX4,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

fn status_text(text: &str) -> MavMessage {
    let mut bytes = [0u8; 50];
    bytes[..text.len()].copy_from_slice(text.as_bytes());
    MavMessage::STATUSTEXT(STATUSTEXT_DATA {
        severity: MavSeverity::MAV_SEVERITY_INFO,
        text: bytes,
        id: 0,
        chunk_seq: 0,
    })
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Read from `peer` until `count` messages matching `keep` arrived or timeout.
fn collect_from_session(
    peer: &UdpSocket,
    count: usize,
    keep: impl Fn(&InboundMessage) -> bool,
) -> Vec<InboundMessage> {
    let mut buf = [0u8; 2048];
    let mut out = Vec::new();
    let deadline = Instant::now() + WAIT;
    while out.len() < count && Instant::now() < deadline {
        if let Ok((len, _)) = peer.recv_from(&mut buf) {
            out.extend(FrameExtractor::new(&buf[..len]).filter(|m| keep(m)));
        }
    }
    out
}

#[test]
fn test_heartbeat_connects_and_session_answers() {
    let local = free_local_addr();
    let settings = ConfigurationSettings::new(format!("udp:{}", local), 1, 191).with_target(1, 1);
    let session = MavlinkSession::new(settings);
    assert!(session.start().is_success());
    assert!(!session.connected());

    let peer = peer_socket();
    peer.send_to(&frame(1, 1, &heartbeat()), local).unwrap();
    assert!(wait_until(|| session.connected()), "no connection after heartbeat");

    // Self heartbeat goes back to the learned peer address
    let heartbeats = collect_from_session(&peer, 1, |m| m.message_id() == MSG_ID_HEARTBEAT);
    assert_eq!(heartbeats.len(), 1);
    assert_eq!(heartbeats[0].system_id(), 1);
    assert_eq!(heartbeats[0].component_id(), 191);

    // Application frames follow the same path
    assert!(session.send_status_text("ready", MavSeverity::MAV_SEVERITY_INFO));
    let texts = collect_from_session(&peer, 1, |m| m.message_id() == MSG_ID_STATUSTEXT);
    assert_eq!(texts.len(), 1);

    let begin = Instant::now();
    session.stop();
    assert!(begin.elapsed() < Duration::from_secs(1));
    assert!(!session.connected());
}

#[test]
fn test_messages_before_heartbeat_are_discarded() {
    let local = free_local_addr();
    let settings = ConfigurationSettings::new(format!("udp:{}", local), 1, 191)
        .with_target(1, 1)
        .with_emit_heartbeat(false);
    let session = MavlinkSession::new(settings);

    let received = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&received);
    session.subscribe_to_message(MSG_ID_STATUSTEXT, move |_| {
        r.fetch_add(1, Ordering::SeqCst);
    });
    assert!(session.start().is_success());

    let peer = peer_socket();
    peer.send_to(&frame(1, 1, &status_text("early")), local).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(received.load(Ordering::SeqCst), 0);

    // Heartbeat and a status text in one datagram: both handled in order
    let mut datagram = frame(1, 1, &heartbeat());
    datagram.extend_from_slice(&frame(1, 1, &status_text("late")));
    peer.send_to(&datagram, local).unwrap();
    assert!(wait_until(|| received.load(Ordering::SeqCst) == 1));

    // Foreign sender stays filtered while connected
    peer.send_to(&frame(7, 1, &status_text("other")), local).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(received.load(Ordering::SeqCst), 1);

    let metrics = session.metrics().expect("udp metrics");
    assert!(metrics.frames_filtered >= 2);
    session.stop();
}

#[test]
fn test_liveness_follows_simulated_time() {
    let clock = Arc::new(ManualClock::new(50_000));
    let local = free_local_addr();
    let settings = ConfigurationSettings::new(format!("udp:{}", local), 1, 191)
        .with_target(1, 1)
        .with_emit_heartbeat(false);
    let session = MavlinkSession::with_clock(settings, clock.clone());
    assert!(session.start().is_success());

    let peer = peer_socket();
    assert!(!session.connected());
    peer.send_to(&frame(1, 1, &heartbeat()), local).unwrap();
    assert!(wait_until(|| session.connected()));

    clock.advance(Duration::from_millis(1999));
    assert!(session.connected());
    clock.advance(Duration::from_millis(2));
    assert!(!session.connected());

    // Nothing leaves while disconnected
    assert!(!session.send_heartbeat());

    // A fresh heartbeat reconnects
    peer.send_to(&frame(1, 1, &heartbeat()), local).unwrap();
    assert!(wait_until(|| session.connected()));
    session.stop();
}

#[test]
fn test_parameter_list_over_the_wire() {
    let local = free_local_addr();
    // Any sender: the GCS is the peer
    let settings = ConfigurationSettings::new(format!("udp:{}", local), 1, 191)
        .with_target(0, 0)
        .with_emit_heartbeat(false);
    let session = MavlinkSession::new(settings);
    session.enable_parameters(
        || {
            vec![
                Parameter::new("RATE_HZ", 50i32).with_position(0, 2),
                Parameter::new("GAIN", 0.25f32).with_position(1, 2),
            ]
        },
        |_| true,
    );
    assert!(session.start().is_success());

    let peer = peer_socket();
    peer.send_to(&frame(255, 190, &heartbeat()), local).unwrap();
    assert!(wait_until(|| session.connected()));

    let request = MavMessage::PARAM_REQUEST_LIST(PARAM_REQUEST_LIST_DATA {
        target_system: 0,
        target_component: 0,
    });
    peer.send_to(&frame(255, 190, &request), local).unwrap();

    let values: Vec<Parameter> =
        collect_from_session(&peer, 2, |m| matches!(m.message, MavMessage::PARAM_VALUE(_)))
            .into_iter()
            .filter_map(|m| match m.message {
                MavMessage::PARAM_VALUE(v) => Some(Parameter::from_param_value(&v)),
                _ => None,
            })
            .collect();

    assert_eq!(values.len(), 2);
    assert_eq!(values[0], Parameter::new("RATE_HZ", 50i32).with_position(0, 2));
    assert_eq!(values[1], Parameter::new("GAIN", 0.25f32).with_position(1, 2));
    session.stop();
}

#[test]
fn test_drop_stops_session() {
    let local = free_local_addr();
    {
        let session =
            MavlinkSession::new(ConfigurationSettings::new(format!("udp:{}", local), 1, 191));
        assert!(session.start().is_success());
    }
    // Port is free again once the session is gone
    let rebind = UdpSocket::bind(local);
    assert!(rebind.is_ok(), "socket still bound after drop");
}
