// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The public session object: configuration, subscriptions and helpers.
//!
//! A [`MavlinkSession`] selects a transport from its connection URL, receives
//! every accepted inbound message on the transport's receive thread and routes
//! it to at most one subscriber per message id. Outbound helpers encode with
//! the local system/component id and hand the frame to the transport's queue;
//! nothing on the caller's thread ever waits for the network.
//!
//! # Example
//!
//! ```no_run
//! use mavlink_session::{ConfigurationSettings, MavlinkSession};
//!
//! let settings = ConfigurationSettings::new("udp:0.0.0.0:14540", 1, 191);
//! let session = MavlinkSession::new(settings);
//!
//! session.subscribe_to_message(mavlink_session::config::MSG_ID_HEARTBEAT, |msg| {
//!     println!("heartbeat from {}/{}", msg.system_id(), msg.component_id());
//! });
//!
//! assert!(session.start().is_success());
//! ```

use crate::codec::{encode, InboundMessage, OutboundFrame};
use crate::command::PendingCommand;
use crate::config::{
    ConfigurationSettings, COMMAND_QUEUE_CAPACITY, MAVLINK_VERSION, MSG_ID_COMMAND_LONG,
    MSG_ID_PARAM_REQUEST_LIST, MSG_ID_PARAM_SET, STATUS_TEXT_LEN, STATUS_TEXT_MAX_CHARS,
};
use crate::error::{ConnectionResult, Error, Result};
use crate::params::Parameter;
use crate::queue::BoundedQueue;
use crate::target::{is_addressed_to, match_target, TargetMatch};
use crate::transport::{
    Clock, ConnectionUrl, MetricsSnapshot, SessionHandler, SystemClock, Transport, UdpTransport,
};
use mavlink::common::{
    MavMessage, MavModeFlag, MavResult, MavSeverity, MavState, HEARTBEAT_DATA, STATUSTEXT_DATA,
};
use mavlink::MavHeader;
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

/// Subscriber callback, invoked on the receive thread.
pub type MessageCallback = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Produces the full parameter list on PARAM_REQUEST_LIST.
pub type ParamListProvider = Arc<dyn Fn() -> Vec<Parameter> + Send + Sync>;

/// Applies a PARAM_SET; may update `index`/`total_count` in place.
/// Returns `false` to reject.
pub type ParamSetHandler = Arc<dyn Fn(&mut Parameter) -> bool + Send + Sync>;

/// MAVLink endpoint bound to one peer.
pub struct MavlinkSession {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    /// Serializes start/stop
    lifecycle: Mutex<()>,
}

struct Shared {
    settings: ConfigurationSettings,
    subscriptions: Mutex<HashMap<u32, MessageCallback>>,
    sequence: AtomicU8,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    commands: BoundedQueue<PendingCommand>,
}

impl MavlinkSession {
    /// Create a stopped session.
    pub fn new(settings: ConfigurationSettings) -> Self {
        Self::with_clock(settings, SystemClock::shared())
    }

    /// Create a stopped session whose transport judges liveness with `clock`.
    pub fn with_clock(settings: ConfigurationSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                subscriptions: Mutex::new(HashMap::new()),
                sequence: AtomicU8::new(0),
                transport: RwLock::new(None),
                commands: BoundedQueue::new(COMMAND_QUEUE_CAPACITY),
            }),
            clock,
            lifecycle: Mutex::new(()),
        }
    }

    /// Open the link named by the connection URL.
    ///
    /// Spawns the transport threads on success. A second call while running
    /// returns [`ConnectionResult::SystemBusy`].
    pub fn start(&self) -> ConnectionResult {
        let _guard = self.lifecycle.lock();
        if self.shared.transport.read().is_some() {
            log::warn!("[SESSION] start() while a transport is active");
            return ConnectionResult::SystemBusy;
        }

        match self.build_transport() {
            Ok(transport) => self.start_locked(transport),
            Err(e) => {
                log::error!(
                    "[SESSION] no connection started for '{}': {}",
                    self.shared.settings.connection_url,
                    e
                );
                e.connection_result()
            }
        }
    }

    /// Start on a caller-provided transport instead of the URL's.
    ///
    /// The transport should deliver inbound messages to [`Self::handler`].
    pub fn start_with(&self, transport: Arc<dyn Transport>) -> ConnectionResult {
        let _guard = self.lifecycle.lock();
        if self.shared.transport.read().is_some() {
            return ConnectionResult::SystemBusy;
        }
        self.start_locked(transport)
    }

    fn start_locked(&self, transport: Arc<dyn Transport>) -> ConnectionResult {
        let result = transport.start();
        if result.is_success() {
            *self.shared.transport.write() = Some(transport);
        }
        result
    }

    fn build_transport(&self) -> Result<Arc<dyn Transport>> {
        let settings = &self.shared.settings;
        match ConnectionUrl::parse(&settings.connection_url)? {
            ConnectionUrl::Udp(local_addr) => Ok(Arc::new(UdpTransport::with_clock(
                local_addr,
                settings.clone(),
                self.handler(),
                Arc::clone(&self.clock),
            ))),
            url @ ConnectionUrl::Serial { .. } => {
                Err(Error::UnsupportedScheme(url.scheme().to_string()))
            }
        }
    }

    /// Stop and release the active transport. Safe to call repeatedly.
    ///
    /// Must not be called from a subscriber callback.
    pub fn stop(&self) {
        let _guard = self.lifecycle.lock();
        // Release the slot before joining the I/O threads
        let transport = self.shared.transport.write().take();
        if let Some(transport) = transport {
            transport.stop();
            log::info!("[SESSION] stopped");
        }
        self.shared.commands.clear();
    }

    /// Receiving entry point for custom transports.
    pub fn handler(&self) -> Weak<dyn SessionHandler> {
        let shared: Arc<dyn SessionHandler> = self.shared.clone();
        Arc::downgrade(&shared)
    }

    /// `true` if a transport is active and its peer is alive.
    pub fn connected(&self) -> bool {
        self.shared.connected()
    }

    /// Our system id.
    pub fn sysid(&self) -> u8 {
        self.shared.settings.sysid
    }

    /// Our component id.
    pub fn compid(&self) -> u8 {
        self.shared.settings.compid
    }

    pub fn settings(&self) -> &ConfigurationSettings {
        &self.shared.settings
    }

    /// Transport counters, if a transport is active.
    pub fn metrics(&self) -> Option<MetricsSnapshot> {
        self.shared
            .transport
            .read()
            .as_ref()
            .and_then(|t| t.metrics())
    }

    /// Register the callback for `message_id`.
    ///
    /// Only one callback per id: a second registration is rejected and
    /// `false` returned.
    pub fn subscribe_to_message<F>(&self, message_id: u32, callback: F) -> bool
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.shared.subscribe(message_id, Arc::new(callback))
    }

    /// Remove the callback for `message_id`; `false` if none was registered.
    pub fn unsubscribe(&self, message_id: u32) -> bool {
        self.shared.subscriptions.lock().remove(&message_id).is_some()
    }

    /// Route one inbound message to its subscriber.
    pub fn handle_message(&self, message: &InboundMessage) {
        self.shared.handle_message(message);
    }

    /// Encode and queue `message`. Returns `false` if it was not queued.
    pub fn send_message(&self, message: &MavMessage) -> bool {
        self.shared.send_message(message)
    }

    /// Queue an already-encoded frame. Returns `false` if it was not queued.
    pub fn send_frame(&self, frame: OutboundFrame) -> bool {
        self.shared.send_frame(frame)
    }

    /// Queue a HEARTBEAT with our vehicle type, autopilot and ACTIVE state.
    pub fn send_heartbeat(&self) -> bool {
        self.shared.send_heartbeat()
    }

    /// Queue a STATUSTEXT; `text` is cut to 49 bytes.
    pub fn send_status_text(&self, text: &str, severity: MavSeverity) -> bool {
        self.shared.send_status_text(text, severity)
    }

    /// Queue a COMMAND_ACK addressed to the command's sender.
    pub fn send_command_ack(&self, command: &PendingCommand, result: MavResult) -> bool {
        self.shared.send_command_ack(command, result)
    }

    /// Queue a PARAM_VALUE announcing `param`.
    pub fn send_param_value(&self, param: &Parameter) -> bool {
        self.shared.send_message(&param.to_param_value())
    }

    /// Serve the parameter protocol.
    ///
    /// - PARAM_REQUEST_LIST (exact, system or full broadcast): one PARAM_VALUE
    ///   per entry of `list_provider()`.
    /// - PARAM_SET (exact target only): `set_handler` decides; accepted
    ///   parameters are echoed back. Rejections are silent unless
    ///   `param_set_nack` is configured.
    ///
    /// Returns `false` if either message id already had a subscriber.
    pub fn enable_parameters<L, S>(&self, list_provider: L, set_handler: S) -> bool
    where
        L: Fn() -> Vec<Parameter> + Send + Sync + 'static,
        S: Fn(&mut Parameter) -> bool + Send + Sync + 'static,
    {
        let list_provider: ParamListProvider = Arc::new(list_provider);
        let set_handler: ParamSetHandler = Arc::new(set_handler);

        let weak = Arc::downgrade(&self.shared);
        let list_ok = self.shared.subscribe(
            MSG_ID_PARAM_REQUEST_LIST,
            Arc::new(move |msg: &InboundMessage| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_param_request_list(msg, &list_provider);
                }
            }),
        );

        let weak = Arc::downgrade(&self.shared);
        let set_ok = self.shared.subscribe(
            MSG_ID_PARAM_SET,
            Arc::new(move |msg: &InboundMessage| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_param_set(msg, &set_handler);
                }
            }),
        );

        list_ok && set_ok
    }

    /// Queue inbound COMMAND_LONG requests for [`Self::next_command`].
    ///
    /// When the queue is full the command is answered with
    /// `MAV_RESULT_TEMPORARILY_REJECTED`.
    pub fn enable_commands(&self) -> bool {
        let weak = Arc::downgrade(&self.shared);
        self.shared.subscribe(
            MSG_ID_COMMAND_LONG,
            Arc::new(move |msg: &InboundMessage| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_command_long(msg);
                }
            }),
        )
    }

    /// Oldest pending command. A blocking call returns `None` on `stop()`.
    pub fn next_command(&self, blocking: bool) -> Option<PendingCommand> {
        self.shared.commands.pop(blocking)
    }

    /// Commands waiting for the application.
    pub fn pending_commands(&self) -> usize {
        self.shared.commands.len()
    }
}

impl Drop for MavlinkSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MavlinkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MavlinkSession")
            .field("settings", &self.shared.settings)
            .field("connected", &self.connected())
            .field("subscriptions", &self.shared.subscriptions.lock().len())
            .finish()
    }
}

impl Shared {
    fn connected(&self) -> bool {
        self.transport
            .read()
            .as_ref()
            .is_some_and(|t| t.connected())
    }

    fn subscribe(&self, message_id: u32, callback: MessageCallback) -> bool {
        match self.subscriptions.lock().entry(message_id) {
            Entry::Vacant(slot) => {
                slot.insert(callback);
                true
            }
            Entry::Occupied(_) => {
                log::warn!(
                    "[SESSION] subscribe_to_message({}) failed, callback already registered",
                    message_id
                );
                false
            }
        }
    }

    fn header(&self) -> MavHeader {
        MavHeader {
            system_id: self.settings.sysid,
            component_id: self.settings.compid,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn send_message(&self, message: &MavMessage) -> bool {
        match encode(self.header(), message) {
            Ok(frame) => self.send_frame(frame),
            Err(e) => {
                log::error!("[SESSION] {}", e);
                false
            }
        }
    }

    fn send_frame(&self, frame: OutboundFrame) -> bool {
        let transport = self.transport.read();
        let Some(transport) = transport.as_ref() else {
            return false;
        };
        if !transport.connected() {
            log::trace!("[SESSION] not connected, frame discarded");
            return false;
        }
        if !transport.queue_message(frame) {
            log::warn!("[SESSION] queueing message failed, outbound queue full");
            return false;
        }
        true
    }

    fn send_heartbeat(&self) -> bool {
        self.send_message(&MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: self.settings.mav_type,
            autopilot: self.settings.mav_autopilot,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: MAVLINK_VERSION,
        }))
    }

    fn send_status_text(&self, text: &str, severity: MavSeverity) -> bool {
        log::debug!("[SESSION] statustext: {}", text);
        self.send_message(&MavMessage::STATUSTEXT(STATUSTEXT_DATA {
            severity,
            text: status_text_bytes(text),
            id: 0,
            chunk_seq: 0,
        }))
    }

    fn send_command_ack(&self, command: &PendingCommand, result: MavResult) -> bool {
        self.send_message(&command.ack(result))
    }

    fn handle_param_request_list(&self, msg: &InboundMessage, list_provider: &ParamListProvider) {
        let MavMessage::PARAM_REQUEST_LIST(data) = &msg.message else {
            return;
        };
        if !is_addressed_to(
            data.target_system,
            data.target_component,
            self.settings.sysid,
            self.settings.compid,
        ) {
            return;
        }

        let params = list_provider();
        log::info!(
            "[PARAM] sending {} parameters to {}/{}",
            params.len(),
            msg.system_id(),
            msg.component_id()
        );
        for param in &params {
            self.send_message(&param.to_param_value());
        }
    }

    fn handle_param_set(&self, msg: &InboundMessage, set_handler: &ParamSetHandler) {
        let MavMessage::PARAM_SET(data) = &msg.message else {
            return;
        };
        // Component-level operation: no broadcast
        if match_target(
            data.target_system,
            data.target_component,
            self.settings.sysid,
            self.settings.compid,
        ) != Some(TargetMatch::Exact)
        {
            return;
        }

        let mut param = Parameter::from_param_set(data);
        if set_handler(&mut param) {
            log::debug!("[PARAM] {} set to {}", param.name, param.value);
            self.send_message(&param.to_param_value());
        } else {
            log::info!("[PARAM] set rejected for {}", param.name);
            if self.settings.param_set_nack {
                self.send_status_text(
                    &format!("param set rejected: {}", param.name),
                    MavSeverity::MAV_SEVERITY_WARNING,
                );
            }
        }
    }

    fn handle_command_long(&self, msg: &InboundMessage) {
        let MavMessage::COMMAND_LONG(data) = &msg.message else {
            return;
        };
        if !is_addressed_to(
            data.target_system,
            data.target_component,
            self.settings.sysid,
            self.settings.compid,
        ) {
            return;
        }

        let command = PendingCommand::from_command_long(msg.system_id(), msg.component_id(), data);
        if !self.commands.push(command.clone()) {
            log::warn!(
                "[CMD] command queue full, rejecting {:?} from {}/{}",
                command.command,
                command.sender_sysid,
                command.sender_compid
            );
            self.send_command_ack(&command, MavResult::MAV_RESULT_TEMPORARILY_REJECTED);
        }
    }
}

impl SessionHandler for Shared {
    fn handle_message(&self, message: &InboundMessage) {
        // Clone out so the callback runs without the table lock
        let callback = self
            .subscriptions
            .lock()
            .get(&message.message_id())
            .cloned();
        if let Some(callback) = callback {
            callback(message);
        }
    }

    fn emit_heartbeat(&self) {
        self.send_heartbeat();
    }
}

/// STATUSTEXT payload: at most 49 bytes of `text`, NUL at index 49.
fn status_text_bytes(text: &str) -> [u8; STATUS_TEXT_LEN] {
    let mut out = [0u8; STATUS_TEXT_LEN];
    let bytes = text.as_bytes();
    let len = bytes.len().min(STATUS_TEXT_MAX_CHARS);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}
