// Async session: drives a LiveChannel from a single tokio task.
//
// Handles talk to the task over an mpsc queue; health flows back through a
// watch channel. When every handle is gone the task tears the channel down.

use std::future::pending;
use std::pin::Pin;

use serde_json::Value;
use sherpa_common::types::{ChatMessage, MessageDeleted, ReactionEvent, TopicKey, TypingPayload};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Sleep};
use tracing::{debug, info};

use crate::channel::listeners::Listeners;
use crate::channel::{ConnectionHealth, LiveChannel, LiveTransport, TransportEvent};
use crate::config::LiveConfig;
use crate::endpoint::EndpointError;
use crate::transport::WsTransport;

type Subscribe = Box<dyn FnOnce(&mut Listeners) + Send>;

enum Command {
    Connect { token: Option<String>, reply: oneshot::Sender<Result<(), EndpointError>> },
    Disconnect,
    Join(TopicKey),
    Leave(TopicKey),
    SendTyping { channel_id: u64, user_name: String, is_typing: bool, reply: oneshot::Sender<bool> },
    Subscribe(Subscribe),
    Shutdown,
}

pub struct LiveSession;

impl LiveSession {
    /// Spawn a session backed by real WebSocket connections.
    pub fn spawn(config: LiveConfig) -> LiveHandle {
        Self::spawn_with(config, WsTransport::new)
    }

    /// Spawn a session with a custom transport. The factory receives the
    /// sink the transport must report its events to.
    pub fn spawn_with<T, F>(config: LiveConfig, make_transport: F) -> LiveHandle
    where
        T: LiveTransport + Send + 'static,
        F: FnOnce(mpsc::UnboundedSender<TransportEvent>) -> T,
    {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (health_tx, health_rx) = watch::channel(ConnectionHealth::default());

        let channel = LiveChannel::new(config, make_transport(event_tx));
        tokio::spawn(run(channel, command_rx, event_rx, health_tx));

        LiveHandle { commands: command_tx, health: health_rx }
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct LiveHandle {
    commands: mpsc::UnboundedSender<Command>,
    health: watch::Receiver<ConnectionHealth>,
}

impl LiveHandle {
    pub async fn connect(&self, token: Option<&str>) -> Result<(), EndpointError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { token: token.map(str::to_string), reply });
        rx.await.unwrap_or(Ok(()))
    }

    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    pub fn join(&self, topic: TopicKey) {
        self.send(Command::Join(topic));
    }

    pub fn leave(&self, topic: TopicKey) {
        self.send(Command::Leave(topic));
    }

    /// Returns whether the signal was written to an open connection.
    pub async fn send_typing(&self, channel_id: u64, user_name: &str, is_typing: bool) -> bool {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SendTyping {
            channel_id,
            user_name: user_name.to_string(),
            is_typing,
            reply,
        });
        rx.await.unwrap_or(false)
    }

    pub fn subscribe_message(&self, callback: impl FnMut(ChatMessage) + Send + 'static) {
        self.subscribe(move |listeners| listeners.set_message(Box::new(callback)));
    }

    pub fn subscribe_message_updated(&self, callback: impl FnMut(ChatMessage) + Send + 'static) {
        self.subscribe(move |listeners| listeners.set_message_updated(Box::new(callback)));
    }

    pub fn subscribe_message_deleted(
        &self,
        callback: impl FnMut(MessageDeleted) + Send + 'static,
    ) {
        self.subscribe(move |listeners| listeners.set_message_deleted(Box::new(callback)));
    }

    pub fn subscribe_reaction(&self, callback: impl FnMut(ReactionEvent) + Send + 'static) {
        self.subscribe(move |listeners| listeners.set_reaction(Box::new(callback)));
    }

    pub fn subscribe_typing(&self, callback: impl FnMut(TypingPayload) + Send + 'static) {
        self.subscribe(move |listeners| listeners.set_typing(Box::new(callback)));
    }

    pub fn subscribe_calendar_update(
        &self,
        callback: impl FnMut(Option<Value>) + Send + 'static,
    ) {
        self.subscribe(move |listeners| listeners.set_calendar_update(Box::new(callback)));
    }

    pub fn subscribe_error(&self, callback: impl FnMut(String) + Send + 'static) {
        self.subscribe(move |listeners| listeners.set_error(Box::new(callback)));
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health.borrow().clone()
    }

    /// A receiver that observes every health change.
    pub fn health_changes(&self) -> watch::Receiver<ConnectionHealth> {
        self.health.clone()
    }

    /// Wait until the connection is open. Returns false if the session ended.
    pub async fn wait_connected(&self) -> bool {
        let mut health = self.health.clone();
        let connected = health.wait_for(ConnectionHealth::connected).await.is_ok();
        connected
    }

    /// Tear the session down and wait for its task to finish.
    pub async fn shutdown(&self) {
        let mut health = self.health.clone();
        self.send(Command::Shutdown);
        while health.changed().await.is_ok() {}
    }

    fn subscribe(&self, register: impl FnOnce(&mut Listeners) + Send + 'static) {
        self.send(Command::Subscribe(Box::new(register)));
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("live session has shut down; command ignored");
        }
    }
}

// ── Event loop ──────────────────────────────────────────────────────

struct ReconnectTimer {
    timer_id: u64,
    sleep: Pin<Box<Sleep>>,
}

async fn run<T: LiveTransport>(
    mut channel: LiveChannel<T>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    health: watch::Sender<ConnectionHealth>,
) {
    let mut timer: Option<ReconnectTimer> = None;

    loop {
        sync_timer(&channel, &mut timer);

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => {
                    channel.teardown();
                    publish(&channel, &health);
                    break;
                }
                Some(command) => apply(&mut channel, command),
            },
            Some(event) = events.recv() => channel.handle_transport(event),
            timer_id = reconnect_due(&mut timer) => {
                timer = None;
                channel.fire_reconnect(timer_id);
            }
        }

        publish(&channel, &health);
    }

    info!("live session stopped");
}

fn apply<T: LiveTransport>(channel: &mut LiveChannel<T>, command: Command) {
    match command {
        Command::Connect { token, reply } => {
            let _ = reply.send(channel.connect(token.as_deref()));
        }
        Command::Disconnect => channel.disconnect(),
        Command::Join(topic) => channel.join(topic),
        Command::Leave(topic) => channel.leave(topic),
        Command::SendTyping { channel_id, user_name, is_typing, reply } => {
            let _ = reply.send(channel.send_typing(channel_id, &user_name, is_typing));
        }
        Command::Subscribe(register) => register(channel.listeners_mut()),
        // Handled by the event loop before dispatch.
        Command::Shutdown => {}
    }
}

/// Keep the armed sleep in step with the channel's pending reconnect.
fn sync_timer<T: LiveTransport>(channel: &LiveChannel<T>, timer: &mut Option<ReconnectTimer>) {
    match channel.pending_reconnect() {
        None => *timer = None,
        Some(pending) => {
            if timer.as_ref().is_some_and(|t| t.timer_id == pending.timer_id) {
                return;
            }
            *timer =
                Some(ReconnectTimer { timer_id: pending.timer_id, sleep: Box::pin(sleep(pending.delay)) });
        }
    }
}

async fn reconnect_due(timer: &mut Option<ReconnectTimer>) -> u64 {
    match timer {
        Some(timer) => {
            timer.sleep.as_mut().await;
            timer.timer_id
        }
        None => pending().await,
    }
}

fn publish<T: LiveTransport>(channel: &LiveChannel<T>, health: &watch::Sender<ConnectionHealth>) {
    let next = channel.health();
    health.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
}
