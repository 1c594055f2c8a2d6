//! `/ws`: JSON command channel for desktop and voice clients.
//!
//! The bearer token comes from the `Authorization` header or the
//! `access_token` / `token` query parameter. Client frames:
//!
//! - `{"type": "connect", "client_id": "...", "session_id": "..."}` (optional, first)
//! - `{"type": "ping"}`
//! - `{"type": "command", "text": "...", "session_id": "..."}`
//! - `{"type": "new_session"}`
//! - `{"type": "disconnect"}`
//!
//! Every command runs one chat turn and is answered with a `response`
//! frame; with memory enabled it continues the connection's session.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Router;
use axum::response::Response;
use axum::routing::get;
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::middleware::auth::{authenticate, bearer_token};
use crate::routes::chat::run_turn;
use crate::schemas::chat::ChatRequest;
use crate::state::AppState;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(gateway_ws))
}

#[derive(Debug, Default, Deserialize)]
struct WsQuery {
    access_token: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Frame {
    #[serde(rename = "type")]
    kind: Option<String>,
    client_id: Option<String>,
    session_id: Option<String>,
    text: Option<String>,
}

/// Per-connection state.
#[derive(Debug)]
struct Connection {
    user: AuthUser,
    client_id: String,
    session_id: Option<String>,
}

enum Step {
    Reply(Value),
    Close,
}

async fn gateway_ws(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    if !state.config.enable_websocket {
        return Err(ServerError::ServiceUnavailable("WebSocket is disabled".into()));
    }
    let bearer = bearer_token(&headers).or_else(|| {
        query
            .access_token
            .or(query.token)
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
    });
    let user = authenticate(&state, bearer.as_deref())?;
    Ok(ws
        .max_message_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state, user)))
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_frame(raw: &str) -> Result<Frame, Value> {
    serde_json::from_str(raw).map_err(|e| json!({ "type": "error", "message": format!("Invalid message: {e}") }))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: AuthUser) {
    let (mut sender, mut receiver) = socket.split();

    // A `connect` frame may name the client and resume a session.
    let mut pending = None;
    let mut client_id = None;
    let mut session_id = None;
    if let Ok(Some(Ok(Message::Text(raw)))) = tokio::time::timeout(HANDSHAKE_TIMEOUT, receiver.next()).await {
        match parse_frame(raw.as_str()) {
            Ok(frame) if frame.kind.as_deref() == Some("connect") => {
                client_id = frame.client_id.filter(|c| !c.trim().is_empty());
                session_id = frame.session_id.filter(|s| !s.trim().is_empty());
            }
            _ => pending = Some(raw.as_str().to_owned()),
        }
    }

    let mut conn = Connection {
        client_id: client_id.unwrap_or_else(|| format!("client_{}", Uuid::new_v4().simple())),
        session_id: session_id.or_else(|| state.config.enable_memory.then(|| Uuid::new_v4().to_string())),
        user,
    };
    info!(client_id = %conn.client_id, username = %conn.user.username, "websocket client connected");

    let welcome = json!({
        "type": "connected",
        "client_id": conn.client_id,
        "session_id": conn.session_id,
        "message": "Connected to Nora Gateway",
        "timestamp": now(),
    });
    if send_json(&mut sender, &welcome).await.is_err() {
        return;
    }

    loop {
        let raw = match pending.take() {
            Some(raw) => raw,
            None => match receiver.next().await {
                Some(Ok(Message::Text(raw))) => raw.as_str().to_owned(),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(client_id = %conn.client_id, error = %e, "websocket receive failed");
                    break;
                }
            },
        };
        match handle_frame(&state, &mut conn, &raw).await {
            Step::Reply(reply) => {
                if send_json(&mut sender, &reply).await.is_err() {
                    break;
                }
            }
            Step::Close => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }
    info!(client_id = %conn.client_id, "websocket client disconnected");
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, value: &Value) -> Result<(), axum::Error> {
    sender.send(Message::Text(value.to_string().into())).await
}

/// Answer one client frame.
async fn handle_frame(state: &AppState, conn: &mut Connection, raw: &str) -> Step {
    let frame = match parse_frame(raw) {
        Ok(frame) => frame,
        Err(reply) => return Step::Reply(reply),
    };
    match frame.kind.as_deref().unwrap_or("command") {
        "ping" => Step::Reply(json!({ "type": "pong", "timestamp": now() })),
        "command" => {
            let text = frame.text.unwrap_or_default().trim().to_owned();
            if text.is_empty() {
                return Step::Reply(json!({ "type": "error", "message": "Empty command received" }));
            }
            debug!(client_id = %conn.client_id, chars = text.chars().count(), "websocket command");
            let session_id = frame.session_id.filter(|s| !s.trim().is_empty()).or_else(|| conn.session_id.clone());
            let req = ChatRequest {
                message: text,
                provider: None,
                model: None,
                language: None,
                session_id,
                use_fallback: true,
                temperature: None,
            };
            match run_turn(state, &conn.user, req).await {
                Ok(reply) => {
                    if conn.session_id.is_none() {
                        conn.session_id = reply.session_id.clone();
                    }
                    Step::Reply(json!({
                        "type": "response",
                        "text": reply.response,
                        "success": reply.success,
                        "session_id": reply.session_id,
                        "timestamp": now(),
                    }))
                }
                Err(e) => {
                    warn!(client_id = %conn.client_id, error = %e, "websocket command failed");
                    Step::Reply(json!({ "type": "error", "message": e.to_string() }))
                }
            }
        }
        "new_session" => {
            let session_id = Uuid::new_v4().to_string();
            conn.session_id = Some(session_id.clone());
            Step::Reply(json!({ "type": "session_created", "session_id": session_id, "timestamp": now() }))
        }
        "disconnect" => Step::Close,
        other => Step::Reply(json!({ "type": "error", "message": format!("Unknown message type '{other}'") })),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::routes::test_support::TestApp;
    use mockito::Server;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;

    fn conn() -> Connection {
        Connection {
            user: AuthUser { username: "alice".into(), role: "user".into() },
            client_id: "desk".into(),
            session_id: None,
        }
    }

    fn reply(step: Step) -> Value {
        match step {
            Step::Reply(v) => v,
            Step::Close => panic!("unexpected close"),
        }
    }

    #[tokio::test]
    async fn ping_empty_command_and_new_session() {
        let app = TestApp::new().await;
        let mut conn = conn();

        assert_eq!(reply(handle_frame(&app.state, &mut conn, r#"{"type":"ping"}"#).await)["type"], "pong");

        let empty = reply(handle_frame(&app.state, &mut conn, r#"{"type":"command","text":"  "}"#).await);
        assert_eq!(empty, json!({ "type": "error", "message": "Empty command received" }));

        let created = reply(handle_frame(&app.state, &mut conn, r#"{"type":"new_session"}"#).await);
        assert_eq!(created["type"], "session_created");
        assert_eq!(conn.session_id.as_deref(), created["session_id"].as_str());

        assert!(matches!(handle_frame(&app.state, &mut conn, r#"{"type":"disconnect"}"#).await, Step::Close));
        assert_eq!(reply(handle_frame(&app.state, &mut conn, "not json").await)["type"], "error");
    }

    #[tokio::test]
    async fn commands_continue_the_connection_session() {
        let mut ollama = Server::new_async().await;
        ollama
            .mock("POST", "/api/chat")
            .with_body(
                json!({ "model": "llama2", "message": { "role": "assistant", "content": "Hi there" }, "done": true })
                    .to_string(),
            )
            .expect(2)
            .create_async()
            .await;
        let app = TestApp::with_ollama(&ollama.url()).await;
        let mut conn = conn();

        let first = reply(handle_frame(&app.state, &mut conn, r#"{"text":"hello"}"#).await);
        assert_eq!(first["type"], "response");
        assert_eq!(first["text"], "Hi there");
        assert_eq!(first["success"], true);
        let session = first["session_id"].as_str().unwrap().to_owned();
        assert_eq!(conn.session_id.as_deref(), Some(session.as_str()));

        let second = reply(handle_frame(&app.state, &mut conn, r#"{"type":"command","text":"again"}"#).await);
        assert_eq!(second["session_id"], session.as_str());
        let (_, history) = app.get(&format!("/chat/sessions/{session}/messages"), Some(&app.token())).await;
        assert_eq!(history["messages"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn socket_requires_a_token_and_greets_the_client() {
        let app = TestApp::new().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app.router.clone();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        assert!(connect_async(format!("ws://{addr}/ws")).await.is_err());

        let url = format!("ws://{addr}/ws?token={}", app.token());
        let (mut socket, _) = connect_async(url).await.unwrap();
        socket
            .send(ClientMessage::Text(r#"{"type":"connect","client_id":"desk-1"}"#.into()))
            .await
            .unwrap();
        let Some(Ok(ClientMessage::Text(raw))) = socket.next().await else {
            panic!("expected a welcome frame");
        };
        let welcome: Value = serde_json::from_str(raw.as_str()).unwrap();
        assert_eq!(welcome["type"], "connected");
        assert_eq!(welcome["client_id"], "desk-1");
        assert_eq!(welcome["message"], "Connected to Nora Gateway");

        socket.send(ClientMessage::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
        let Some(Ok(ClientMessage::Text(raw))) = socket.next().await else {
            panic!("expected a pong frame");
        };
        assert!(raw.as_str().contains("pong"));
    }
}
