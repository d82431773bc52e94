// End-to-end: a LiveSession against a local axum WebSocket server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sherpa_common::types::TopicKey;
use sherpa_live::config::ReconnectConfig;
use sherpa_live::{LiveConfig, LiveHandle, LiveSession};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

enum ServerCommand {
    Push(String),
    Drop,
}

#[derive(Clone)]
struct ServerState {
    connections: Arc<Mutex<Vec<mpsc::UnboundedSender<ServerCommand>>>>,
    tokens: Arc<Mutex<Vec<String>>>,
    frames: mpsc::UnboundedSender<(usize, Value)>,
}

impl ServerState {
    fn command(&self, connection: usize, command: ServerCommand) {
        let connections = self.connections.lock().unwrap();
        connections[connection].send(command).expect("connection task alive");
    }
}

#[derive(serde::Deserialize)]
struct TokenQuery {
    token: String,
}

async fn start_server() -> (SocketAddr, ServerState, mpsc::UnboundedReceiver<(usize, Value)>) {
    let (frames, frames_rx) = mpsc::unbounded_channel();
    let state = ServerState {
        connections: Arc::new(Mutex::new(Vec::new())),
        tokens: Arc::new(Mutex::new(Vec::new())),
        frames,
    };

    let app = Router::new().route("/api/ws", get(ws_handler)).with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state, frames_rx)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<TokenQuery>,
    State(state): State<ServerState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, query.token, state))
}

async fn serve_socket(socket: WebSocket, token: String, state: ServerState) {
    let (command_tx, mut commands) = mpsc::unbounded_channel();
    let index = {
        let mut connections = state.connections.lock().unwrap();
        connections.push(command_tx);
        connections.len() - 1
    };
    state.tokens.lock().unwrap().push(token);

    let (mut tx, mut rx) = socket.split();
    loop {
        tokio::select! {
            frame = rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
                    let _ = state.frames.send((index, value));
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            command = commands.recv() => match command {
                Some(ServerCommand::Push(text)) => {
                    if tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(ServerCommand::Drop) | None => break,
            },
        }
    }
}

fn spawn_client(addr: SocketAddr) -> LiveHandle {
    let config = LiveConfig {
        api_url: format!("http://{addr}"),
        reconnect: ReconnectConfig { initial_delay_ms: 50, max_delay_ms: 200 },
        ..LiveConfig::default()
    };
    LiveSession::spawn(config)
}

async fn next_frame(frames: &mut mpsc::UnboundedReceiver<(usize, Value)>) -> (usize, Value) {
    timeout(WAIT, frames.recv()).await.expect("frame in time").expect("server alive")
}

#[tokio::test]
async fn joins_receives_and_rejoins_after_drop() {
    let (addr, server, mut frames) = start_server().await;
    let handle = spawn_client(addr);

    let (messages_tx, mut messages) = mpsc::unbounded_channel();
    handle.subscribe_message(move |message| {
        let _ = messages_tx.send(message);
    });
    handle.join(TopicKey::channel(42));
    handle.connect(Some("tok1")).await.expect("connect");
    assert!(timeout(WAIT, handle.wait_connected()).await.expect("open in time"));

    assert_eq!(next_frame(&mut frames).await, (0, json!({ "type": "join", "channel_id": 42 })));
    assert_eq!(*server.tokens.lock().unwrap(), vec!["tok1".to_string()]);

    server.command(
        0,
        ServerCommand::Push(
            json!({
                "type": "message",
                "message": { "id": 1, "channel_id": 42, "user_id": 7, "content": "hello" }
            })
            .to_string(),
        ),
    );
    let message = timeout(WAIT, messages.recv()).await.expect("message in time").unwrap();
    assert_eq!(message.content, "hello");

    server.command(0, ServerCommand::Drop);
    assert_eq!(next_frame(&mut frames).await, (1, json!({ "type": "join", "channel_id": 42 })));
    assert!(timeout(WAIT, handle.wait_connected()).await.expect("reopen in time"));
    assert_eq!(server.tokens.lock().unwrap().len(), 2);

    handle.shutdown().await;
    assert_eq!(next_frame(&mut frames).await, (1, json!({ "type": "leave", "channel_id": 42 })));
}

#[tokio::test]
async fn garbage_from_server_keeps_connection_open() {
    let (addr, server, mut frames) = start_server().await;
    let handle = spawn_client(addr);
    handle.join(TopicKey::calendar(3));
    handle.connect(Some("tok1")).await.expect("connect");
    assert_eq!(
        next_frame(&mut frames).await,
        (0, json!({ "type": "join_calendar", "event_id": 3 }))
    );

    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    handle.subscribe_calendar_update(move |payload| {
        let _ = updates_tx.send(payload);
    });

    server.command(0, ServerCommand::Push("definitely not json".into()));
    server.command(0, ServerCommand::Push(json!({ "type": "calendar_update" }).to_string()));

    let update = timeout(WAIT, updates.recv()).await.expect("update in time").unwrap();
    assert_eq!(update, None);

    let health = handle.health();
    assert!(health.connected());
    assert!(health.last_error.is_some_and(|e| e.starts_with("malformed live event")));
    assert_eq!(server.connections.lock().unwrap().len(), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn typing_frames_reach_the_server() {
    let (addr, _server, mut frames) = start_server().await;
    let handle = spawn_client(addr);
    handle.connect(Some("tok1")).await.expect("connect");
    assert!(timeout(WAIT, handle.wait_connected()).await.expect("open in time"));

    assert!(handle.send_typing(5, "mina", true).await);
    assert!(handle.send_typing(5, "mina", false).await);

    assert_eq!(
        next_frame(&mut frames).await,
        (0, json!({ "type": "typing", "channel_id": 5, "user_name": "mina" }))
    );
    assert_eq!(
        next_frame(&mut frames).await,
        (0, json!({ "type": "typing_stop", "channel_id": 5, "user_name": "mina" }))
    );

    handle.shutdown().await;
}
