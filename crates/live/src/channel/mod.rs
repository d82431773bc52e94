// Live channel: one reconnecting push connection shared by many topics.
//
// The state machine here is sans-io. The transport reports open/text/close
// through `handle_transport`, and the reconnect timer is armed by whoever
// drives the channel (see `session`), which calls `fire_reconnect` when the
// delay from `pending_reconnect` has elapsed.
//
// Transport trouble never surfaces as an error. Callers watch `health()`.

pub mod backoff;
pub mod listeners;

use std::time::Duration;

use anyhow::Result;
use indexmap::IndexSet;
use serde_json::Value;
use sherpa_common::protocol::ws::{ClientMessage, Decoded, ServerEvent};
use sherpa_common::types::{ChatMessage, MessageDeleted, ReactionEvent, TopicKey, TypingPayload};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::LiveConfig;
use crate::endpoint::{live_endpoint, redacted, EndpointError};

use self::backoff::{Backoff, ReconnectPolicy};
use self::listeners::Listeners;

// ── Transport trait ─────────────────────────────────────────────────

/// Abstraction over the push transport.
///
/// `open` only starts a connection attempt; its outcome arrives later as
/// [`TransportEvent`]s tagged with the same `attempt`.
pub trait LiveTransport {
    fn open(&mut self, attempt: u64, endpoint: &Url) -> Result<()>;

    fn send(&mut self, msg: &ClientMessage) -> Result<()>;

    /// Close the current connection, if any. Must be safe to call repeatedly.
    fn close(&mut self);
}

/// Something that happened on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened { attempt: u64 },
    Text { attempt: u64, text: String },
    Closed { attempt: u64, reason: Option<String> },
}

impl TransportEvent {
    pub fn attempt(&self) -> u64 {
        match self {
            Self::Opened { attempt } | Self::Text { attempt, .. } | Self::Closed { attempt, .. } => {
                *attempt
            }
        }
    }
}

// ── Connection state ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

/// What the owner of the channel gets to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHealth {
    pub state: ConnectionState,
    pub last_error: Option<String>,
}

impl ConnectionHealth {
    pub fn connected(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self { state: ConnectionState::Disconnected, last_error: None }
    }
}

/// A reconnect that is waiting for its delay to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReconnect {
    pub timer_id: u64,
    pub delay: Duration,
}

// ── Live channel ────────────────────────────────────────────────────

pub struct LiveChannel<T: LiveTransport> {
    config: LiveConfig,
    transport: T,
    state: ConnectionState,
    token: Option<String>,
    endpoint: Option<Url>,
    attempt: u64,
    backoff: Backoff,
    pending_reconnect: Option<PendingReconnect>,
    next_timer_id: u64,
    topics: IndexSet<TopicKey>,
    listeners: Listeners,
    last_error: Option<String>,
}

impl<T: LiveTransport> LiveChannel<T> {
    pub fn new(config: LiveConfig, transport: T) -> Self {
        let backoff = Backoff::new(config.reconnect_policy());
        Self {
            config,
            transport,
            state: ConnectionState::Disconnected,
            token: None,
            endpoint: None,
            attempt: 0,
            backoff,
            pending_reconnect: None,
            next_timer_id: 0,
            topics: IndexSet::new(),
            listeners: Listeners::default(),
            last_error: None,
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.backoff = Backoff::new(policy);
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn health(&self) -> ConnectionHealth {
        ConnectionHealth { state: self.state, last_error: self.last_error.clone() }
    }

    pub fn pending_reconnect(&self) -> Option<PendingReconnect> {
        self.pending_reconnect
    }

    /// Joined topics in registration order.
    pub fn joined_topics(&self) -> Vec<TopicKey> {
        self.topics.iter().copied().collect()
    }

    /// Point the channel at `token`.
    ///
    /// A missing or empty token tears the connection down. Re-asserting the
    /// token of a live or in-flight connection does nothing. Only a bad
    /// `api_url` is reported as an error.
    pub fn connect(&mut self, token: Option<&str>) -> Result<(), EndpointError> {
        let Some(token) = token.filter(|token| !token.is_empty()) else {
            self.disconnect();
            return Ok(());
        };

        let active = matches!(self.state, ConnectionState::Connecting | ConnectionState::Open);
        if active && self.token.as_deref() == Some(token) {
            return Ok(());
        }

        let endpoint =
            live_endpoint(&self.config.api_url, &self.config.ws_path, &self.config.token_param, token)?;

        if self.state != ConnectionState::Disconnected {
            info!(attempt = self.attempt, "replacing live channel connection");
            self.transport.close();
        }

        self.token = Some(token.to_string());
        self.endpoint = Some(endpoint);
        self.pending_reconnect = None;
        self.backoff.reset();
        self.start_attempt();
        Ok(())
    }

    /// Intentional teardown. Cancels any pending reconnect, leaves every
    /// joined topic and closes the transport. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.pending_reconnect.take().is_some() {
            debug!("pending live channel reconnect cancelled");
        }
        self.token = None;
        self.endpoint = None;

        match self.state {
            ConnectionState::Open => {
                for topic in self.joined_topics() {
                    self.send_best_effort(&ClientMessage::leave(topic));
                }
                self.transport.close();
                self.state = ConnectionState::Closing;
                info!(attempt = self.attempt, "live channel closing");
            }
            ConnectionState::Connecting => {
                self.transport.close();
                self.state = ConnectionState::Disconnected;
                info!(attempt = self.attempt, "live channel attempt abandoned");
            }
            ConnectionState::Closing | ConnectionState::Disconnected => {}
        }

        self.topics.clear();
    }

    /// Disconnect and drop every listener.
    pub fn teardown(&mut self) {
        self.disconnect();
        self.listeners.clear();
    }

    /// Record interest in `topic`; sent now if open, otherwise on next open.
    pub fn join(&mut self, topic: TopicKey) {
        if !self.topics.insert(topic) {
            debug!(%topic, "topic already joined");
            return;
        }
        if self.state == ConnectionState::Open {
            self.send_best_effort(&ClientMessage::join(topic));
        }
    }

    pub fn leave(&mut self, topic: TopicKey) {
        if self.state == ConnectionState::Open {
            self.send_best_effort(&ClientMessage::leave(topic));
        }
        self.topics.shift_remove(&topic);
    }

    /// Send an ephemeral typing signal. Returns false when nothing was sent.
    pub fn send_typing(&mut self, channel_id: u64, user_name: &str, is_typing: bool) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }
        self.send_best_effort(&ClientMessage::typing(channel_id, user_name, is_typing))
    }

    pub fn subscribe_message(&mut self, callback: impl FnMut(ChatMessage) + Send + 'static) {
        self.listeners.set_message(Box::new(callback));
    }

    pub fn subscribe_message_updated(
        &mut self,
        callback: impl FnMut(ChatMessage) + Send + 'static,
    ) {
        self.listeners.set_message_updated(Box::new(callback));
    }

    pub fn subscribe_message_deleted(
        &mut self,
        callback: impl FnMut(MessageDeleted) + Send + 'static,
    ) {
        self.listeners.set_message_deleted(Box::new(callback));
    }

    pub fn subscribe_reaction(&mut self, callback: impl FnMut(ReactionEvent) + Send + 'static) {
        self.listeners.set_reaction(Box::new(callback));
    }

    pub fn subscribe_typing(&mut self, callback: impl FnMut(TypingPayload) + Send + 'static) {
        self.listeners.set_typing(Box::new(callback));
    }

    pub fn subscribe_calendar_update(
        &mut self,
        callback: impl FnMut(Option<Value>) + Send + 'static,
    ) {
        self.listeners.set_calendar_update(Box::new(callback));
    }

    pub fn subscribe_error(&mut self, callback: impl FnMut(String) + Send + 'static) {
        self.listeners.set_error(Box::new(callback));
    }

    pub fn listeners_mut(&mut self) -> &mut Listeners {
        &mut self.listeners
    }

    /// Feed one transport event. Events from superseded attempts are dropped.
    pub fn handle_transport(&mut self, event: TransportEvent) {
        if event.attempt() != self.attempt {
            debug!(
                event_attempt = event.attempt(),
                current_attempt = self.attempt,
                "ignoring event from stale live channel attempt"
            );
            return;
        }

        match event {
            TransportEvent::Opened { .. } => {
                if self.state == ConnectionState::Connecting {
                    self.on_open();
                }
            }
            TransportEvent::Text { text, .. } => {
                if self.state == ConnectionState::Open {
                    self.handle_text(&text);
                }
            }
            TransportEvent::Closed { reason, .. } => match self.state {
                ConnectionState::Closing => {
                    self.state = ConnectionState::Disconnected;
                    info!(attempt = self.attempt, "live channel closed");
                }
                ConnectionState::Connecting | ConnectionState::Open => {
                    self.on_connection_lost(reason);
                }
                ConnectionState::Disconnected => {}
            },
        }
    }

    /// The reconnect delay for `timer_id` elapsed. Returns true when a new
    /// attempt was started.
    pub fn fire_reconnect(&mut self, timer_id: u64) -> bool {
        match self.pending_reconnect {
            Some(pending) if pending.timer_id == timer_id => {
                self.pending_reconnect = None;
            }
            _ => return false,
        }

        if self.token.is_none() || self.state != ConnectionState::Disconnected {
            return false;
        }

        self.start_attempt();
        true
    }

    fn start_attempt(&mut self) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };

        self.attempt += 1;
        self.state = ConnectionState::Connecting;
        info!(attempt = self.attempt, endpoint = %redacted(&endpoint), "opening live channel");

        if let Err(error) = self.transport.open(self.attempt, &endpoint) {
            self.on_connection_lost(Some(format!("failed to open live channel: {error}")));
        }
    }

    fn on_open(&mut self) {
        self.state = ConnectionState::Open;
        self.last_error = None;
        self.backoff.reset();
        info!(attempt = self.attempt, topics = self.topics.len(), "live channel open");

        for topic in self.joined_topics() {
            self.send_best_effort(&ClientMessage::join(topic));
        }
    }

    fn on_connection_lost(&mut self, reason: Option<String>) {
        self.state = ConnectionState::Disconnected;
        if let Some(reason) = reason {
            self.last_error = Some(reason);
        }

        if self.token.is_none() {
            return;
        }

        let delay = self.backoff.next_delay();
        self.next_timer_id += 1;
        self.pending_reconnect = Some(PendingReconnect { timer_id: self.next_timer_id, delay });
        info!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            last_error = self.last_error.as_deref().unwrap_or(""),
            "live channel lost, reconnect scheduled"
        );
    }

    fn handle_text(&mut self, raw: &str) {
        let event = match ServerEvent::decode_str(raw) {
            Ok(Decoded::Event(event)) => event,
            Ok(Decoded::Ignored(reason)) => {
                debug!(?reason, "ignoring live event");
                return;
            }
            Err(error) => {
                warn!(%error, "dropping live event");
                self.last_error = Some(error.to_string());
                return;
            }
        };

        if let ServerEvent::Error(text) = &event {
            warn!(error = %text, "live channel reported an error");
            self.last_error = Some(text.clone());
        }

        let kind = event.kind();
        if !self.listeners.dispatch(event) {
            debug!(%kind, "no listener for live event");
        }
    }

    fn send_best_effort(&mut self, msg: &ClientMessage) -> bool {
        match self.transport.send(msg) {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, message_type = msg.type_name(), "failed to send live channel message");
                false
            }
        }
    }
}
