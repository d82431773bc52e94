// WebSocket transport over tokio-tungstenite.
//
// Each attempt runs in its own task and reports back through the shared
// event sink. Frames are only ever written by that task; `send` queues them.

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use sherpa_common::protocol::ws::ClientMessage;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;
use url::Url;

use crate::channel::{LiveTransport, TransportEvent};

enum Outbound {
    Text(String),
    Close,
}

struct Connection {
    attempt: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// A [`LiveTransport`] that opens real WebSocket connections.
///
/// `open` must be called from inside a tokio runtime.
pub struct WsTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    current: Option<Connection>,
}

impl WsTransport {
    pub fn new(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { events, current: None }
    }
}

impl LiveTransport for WsTransport {
    fn open(&mut self, attempt: u64, endpoint: &Url) -> Result<()> {
        self.close();

        let runtime = tokio::runtime::Handle::try_current()
            .context("live transport needs a tokio runtime")?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        runtime.spawn(run_connection(attempt, endpoint.clone(), outbound_rx, self.events.clone()));
        self.current = Some(Connection { attempt, outbound });
        Ok(())
    }

    fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let connection = self.current.as_ref().ok_or_else(|| anyhow!("no live connection"))?;
        let text = msg.to_json()?;
        connection
            .outbound
            .send(Outbound::Text(text))
            .map_err(|_| anyhow!("live connection {} has already ended", connection.attempt))
    }

    fn close(&mut self) {
        if let Some(connection) = self.current.take() {
            // The task may already be gone; then there is nothing to close.
            let _ = connection.outbound.send(Outbound::Close);
        }
    }
}

async fn run_connection(
    attempt: u64,
    endpoint: Url,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let ws = tokio::select! {
        result = connect_async(endpoint.as_str()) => match result {
            Ok((ws, _response)) => ws,
            Err(error) => {
                let reason = Some(format!("failed to connect live channel: {error}"));
                let _ = events.send(TransportEvent::Closed { attempt, reason });
                return;
            }
        },
        // Nothing is written before open, so any command here means close.
        _ = outbound.recv() => {
            let _ = events.send(TransportEvent::Closed { attempt, reason: None });
            return;
        }
    };

    let _ = events.send(TransportEvent::Opened { attempt });
    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(error) = sink.send(Message::Text(text.into())).await {
                        break Some(format!("live channel send failed: {error}"));
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break None;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Text { attempt, text: text.to_string() });
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(attempt, ?frame, "live channel closed by server");
                    break None;
                }
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(error)) => break Some(format!("live channel error: {error}")),
                None => break None,
            },
        }
    };

    let _ = events.send(TransportEvent::Closed { attempt, reason });
}
