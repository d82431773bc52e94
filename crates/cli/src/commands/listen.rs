// `sherpa-live listen`: print live events until Ctrl-C.

use clap::Args;
use serde::Serialize;
use serde_json::Value;
use sherpa_common::types::{
    ChatMessage, MessageDeleted, ReactionEvent, TopicKey, TypingPayload,
};
use sherpa_live::{ConnectionHealth, LiveHandle, LiveSession};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::ConnectionArgs;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ListenArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Chat channel to join. Repeatable.
    #[arg(long = "channel", value_name = "ID")]
    pub channels: Vec<u64>,

    /// Calendar event to follow. Repeatable.
    #[arg(long = "calendar", value_name = "ID")]
    pub calendars: Vec<u64>,

    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

/// One printed event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    Message(ChatMessage),
    MessageUpdated(ChatMessage),
    MessageDeleted(MessageDeleted),
    Reaction(ReactionEvent),
    Typing(TypingPayload),
    CalendarUpdate(Option<Value>),
    Error(String),
}

/// A connection status change.
#[derive(Debug, Clone, Serialize)]
pub struct StatusLine {
    pub status: &'static str,
    pub connected: bool,
    pub last_error: Option<String>,
}

impl From<&ConnectionHealth> for StatusLine {
    fn from(health: &ConnectionHealth) -> Self {
        Self {
            status: health.state.as_str(),
            connected: health.connected(),
            last_error: health.last_error.clone(),
        }
    }
}

pub async fn run(args: ListenArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let handle = LiveSession::spawn(args.connection.config());

    let (sink, mut events) = mpsc::unbounded_channel();
    forward_events(&handle, &sink);

    for id in &args.channels {
        handle.join(TopicKey::channel(*id));
    }
    for id in &args.calendars {
        handle.join(TopicKey::calendar(*id));
    }
    info!(channels = args.channels.len(), calendars = args.calendars.len(), "listening");

    if let Err(error) = handle.connect(Some(&args.connection.token)).await {
        warn!(%error, "live channel could not start");
        output::print_error(format, "INVALID_API_URL", &error.to_string());
        handle.shutdown().await;
        return Err(error.into());
    }

    let mut health = handle.health_changes();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted, leaving live channel");
                break;
            }
            Some(event) = events.recv() => output::print_output(format, &event, format_event)?,
            changed = health.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = StatusLine::from(&*health.borrow_and_update());
                output::print_output(format, &status, format_status)?;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn forward_events(handle: &LiveHandle, sink: &mpsc::UnboundedSender<LiveEvent>) {
    handle.subscribe_message(into_sink(sink, LiveEvent::Message));
    handle.subscribe_message_updated(into_sink(sink, LiveEvent::MessageUpdated));
    handle.subscribe_message_deleted(into_sink(sink, LiveEvent::MessageDeleted));
    handle.subscribe_reaction(into_sink(sink, LiveEvent::Reaction));
    handle.subscribe_typing(into_sink(sink, LiveEvent::Typing));
    handle.subscribe_calendar_update(into_sink(sink, LiveEvent::CalendarUpdate));
    handle.subscribe_error(into_sink(sink, LiveEvent::Error));
}

fn into_sink<T: 'static>(
    sink: &mpsc::UnboundedSender<LiveEvent>,
    wrap: fn(T) -> LiveEvent,
) -> impl FnMut(T) + Send + 'static {
    let sink = sink.clone();
    move |value| {
        let _ = sink.send(wrap(value));
    }
}

fn format_event(event: &LiveEvent) -> String {
    match event {
        LiveEvent::Message(message) => {
            format!("[channel:{}] {}: {}", message.channel_id, author(message), message.content)
        }
        LiveEvent::MessageUpdated(message) => format!(
            "[channel:{}] {} edited #{}: {}",
            message.channel_id,
            author(message),
            message.id,
            message.content
        ),
        LiveEvent::MessageDeleted(deleted) => match deleted.channel_id {
            Some(channel_id) => format!("[channel:{channel_id}] #{} deleted", deleted.message_id),
            None => format!("#{} deleted", deleted.message_id),
        },
        LiveEvent::Reaction(ReactionEvent::Added(added)) => {
            format!("#{} +{} by user {}", added.message_id, added.emoji, added.user_id)
        }
        LiveEvent::Reaction(ReactionEvent::Removed(removed)) => {
            format!("#{} -{} by user {}", removed.message_id, removed.emoji, removed.user_id)
        }
        LiveEvent::Typing(typing) if typing.typing => format!("{} is typing...", typing.user_name),
        LiveEvent::Typing(typing) => format!("{} stopped typing", typing.user_name),
        LiveEvent::CalendarUpdate(_) => "calendar updated".to_string(),
        LiveEvent::Error(message) => format!("server error: {message}"),
    }
}

fn author(message: &ChatMessage) -> String {
    match &message.user {
        Some(user) if !user.name.is_empty() => user.name.clone(),
        _ => format!("user {}", message.user_id),
    }
}

fn format_status(status: &StatusLine) -> String {
    match &status.last_error {
        Some(error) => format!("-- {} ({error})", status.status),
        None => format!("-- {}", status.status),
    }
}
