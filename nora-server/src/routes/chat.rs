//! Chat routes: one-shot and streamed completions, transcript export and
//! conversation management.
//!
//! With memory enabled every turn is stored under a conversation owned by
//! the caller, and the last `MEMORY_CONTEXT_LENGTH` messages are replayed to
//! the provider on the next turn.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use nora_llm::{ChatRequest as LlmRequest, ProviderKind};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use utoipa::OpenApi;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::entities::{
    Conversation, ConversationStore, MAX_SAVED_CHATS, MessageStore, SavedChat, SavedChatStore, StoredMessage,
};
use crate::error::ServerError;
use crate::schemas::chat::{
    ChatRequest, ChatResponse, CreateSessionRequest, MessageList, MessageResponse, MessagesQuery, SaveChatRequest,
    SaveChatResponse, SavedChatList, SavedChatResponse, SessionList, SessionResponse, SessionsQuery, download_url,
};
use crate::schemas::files::DeleteResponse;
use crate::services::files::FileDir;
use crate::services::language::{self, Language};
use crate::services::prompt::{build_messages, history_from_stored, title_from, truncate_response};
use crate::services::transcript::{self, ExportFormat, Transcript, TranscriptMessage};
use crate::state::AppState;

const DEFAULT_SESSION_LIMIT: i64 = 50;
const MAX_SESSION_LIMIT: i64 = 200;

#[derive(OpenApi)]
#[openapi(
    paths(
        chat,
        chat_stream,
        save_chat,
        list_saved,
        list_sessions,
        create_session,
        list_session_messages,
        delete_session
    ),
    components(schemas(
        ChatRequest,
        ChatResponse,
        SaveChatRequest,
        SaveChatResponse,
        SavedChatResponse,
        SavedChatList,
        CreateSessionRequest,
        SessionResponse,
        SessionList,
        MessageResponse,
        MessageList,
        TranscriptMessage,
        ExportFormat
    ))
)]
pub struct ChatApi;

/// Register chat routes (all require a bearer token).
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .route("/chat/save", post(save_chat))
        .route("/chat/saved", get(list_saved))
        .route("/chat/sessions", get(list_sessions).post(create_session))
        .route("/chat/sessions/{id}", delete(delete_session))
        .route("/chat/sessions/{id}/messages", get(list_session_messages))
}

/// Everything needed to run one chat turn against a provider.
struct Turn {
    kind: ProviderKind,
    request: LlmRequest,
    language: Language,
    conversation: Option<Conversation>,
    message: String,
    started_at: DateTime<Utc>,
    use_fallback: bool,
}

async fn prepare_turn(state: &AppState, user: &AuthUser, req: ChatRequest) -> Result<Turn, ServerError> {
    req.validate()?;
    let message = req.message.trim().to_owned();
    if message.is_empty() {
        return Err(ServerError::BadRequest("Message cannot be empty".into()));
    }
    let kind = state.providers.resolve(req.provider.as_deref())?;
    let language = language::lookup(
        req.language
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&state.company.config.default_language),
    );

    let (conversation, history) = if state.config.enable_memory {
        let (conversation, existing) = open_conversation(state, user, req.session_id.as_deref(), &message).await?;
        let history = if existing {
            let limit = i64::try_from(state.config.memory_context_length).unwrap_or(i64::MAX);
            history_from_stored(state.store.recent_messages(&conversation.id, limit).await?)
        } else {
            Vec::new()
        };
        (Some(conversation), history)
    } else {
        (None, Vec::new())
    };

    let context = state.context.get().await;
    let messages = build_messages(&state.company.system_prompt, &context, &language, history, &message);
    debug!(
        provider = %kind,
        history = messages.len().saturating_sub(2),
        context_chars = context.len(),
        "chat turn prepared"
    );
    let request = LlmRequest::new(messages)
        .with_model(req.model.filter(|m| !m.trim().is_empty()))
        .with_temperature(req.temperature);

    Ok(Turn {
        kind,
        request,
        language,
        conversation,
        message,
        started_at: Utc::now(),
        use_fallback: req.use_fallback,
    })
}

/// Continue the caller's conversation `session_id`, or describe a new one.
///
/// Nothing is written here: a new conversation is created together with its
/// first stored turn. The flag is `true` for an existing conversation. An id
/// owned by another user is reported as missing.
async fn open_conversation(
    state: &AppState,
    user: &AuthUser,
    session_id: Option<&str>,
    first_message: &str,
) -> Result<(Conversation, bool), ServerError> {
    let session_id = session_id.map(str::trim).filter(|s| !s.is_empty());
    if let Some(id) = session_id {
        if let Some(existing) = state.store.get_conversation(id).await? {
            if existing.username != user.username {
                return Err(ServerError::NotFound(format!("Session '{id}' not found")));
            }
            return Ok((existing, true));
        }
    }
    let now = Utc::now();
    let conversation = Conversation {
        id: session_id.map(str::to_owned).unwrap_or_else(|| Uuid::new_v4().to_string()),
        username: user.username.clone(),
        title: Some(title_from(first_message)),
        created_at: now,
        updated_at: now,
    };
    Ok((conversation, false))
}

/// Store the user message and the reply in `conversation`, creating it on
/// its first turn.
async fn persist_turn(
    state: &AppState,
    conversation: &Conversation,
    user_message: &str,
    user_at: DateTime<Utc>,
    reply: &str,
) -> Result<(), ServerError> {
    let message = |role: &str, content: &str, created_at| StoredMessage {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation.id.clone(),
        role: role.into(),
        content: content.to_owned(),
        created_at,
    };
    let messages = [message("user", user_message, user_at), message("assistant", reply, Utc::now())];
    if !state.store.record_turn(conversation, &messages).await? {
        return Err(ServerError::NotFound(format!("Session '{}' not found", conversation.id)));
    }
    debug!(session_id = %conversation.id, "turn stored");
    Ok(())
}

fn apology(error: &impl std::fmt::Display) -> String {
    format!("I'm sorry, I couldn't process your request. Error: {error}")
}

/// Send a message and wait for the whole reply.
///
/// Provider failures are not HTTP errors: the reply is an apology with
/// `success: false`.
#[utoipa::path(
    post,
    path = "/chat",
    tag = "chat",
    security(("bearer" = [])),
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Reply (check `success`)", body = ChatResponse),
        (status = 400, description = "Empty message or unknown provider"),
        (status = 401, description = "Missing or invalid token"),
        (status = 503, description = "Requested provider is not configured"),
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ServerError> {
    run_turn(&state, &user, req).await.map(Json)
}

/// Run one non-streamed chat turn for `user` and store it when memory is on.
pub(crate) async fn run_turn(state: &AppState, user: &AuthUser, req: ChatRequest) -> Result<ChatResponse, ServerError> {
    let turn = prepare_turn(state, user, req).await?;
    let session_id = turn.conversation.as_ref().map(|c| c.id.clone());

    let completion = match state.providers.complete(turn.kind, &turn.request, turn.use_fallback).await {
        Ok(completion) => completion,
        Err(e) => {
            warn!(provider = %turn.kind, error = %e, "chat completion failed");
            return Ok(ChatResponse {
                response: apology(&e),
                success: false,
                provider: Some(turn.kind.to_string()),
                model: None,
                language: turn.language.code.to_owned(),
                session_id,
                fell_back: false,
                timestamp: Utc::now().to_rfc3339(),
            });
        }
    };

    let reply = truncate_response(completion.text, state.config.max_response_length);
    if let Some(conversation) = &turn.conversation {
        persist_turn(state, conversation, &turn.message, turn.started_at, &reply).await?;
    }
    info!(
        provider = %completion.provider,
        model = %completion.model,
        fell_back = completion.fell_back,
        reply_len = reply.len(),
        "chat completed"
    );

    Ok(ChatResponse {
        response: reply,
        success: true,
        provider: Some(completion.provider.to_string()),
        model: Some(completion.model),
        language: turn.language.code.to_owned(),
        session_id,
        fell_back: completion.fell_back,
        timestamp: Utc::now().to_rfc3339(),
    })
}

fn json_event(value: serde_json::Value) -> Result<Event, Infallible> {
    Ok(Event::default().data(value.to_string()))
}

/// Send a message and relay the reply as server-sent events.
///
/// Events carry `{"delta": "..."}`, then a final
/// `{"done": true, "session_id": ..., "provider": ...}`, or `{"error": "..."}`.
/// The reply is stored once the provider stream ends.
#[utoipa::path(
    post,
    path = "/chat/stream",
    tag = "chat",
    security(("bearer" = [])),
    request_body = ChatRequest,
    responses(
        (status = 200, description = "SSE stream of reply deltas", content_type = "text/event-stream"),
        (status = 400, description = "Empty message or unknown provider"),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<KeepAliveStream<ReceiverStream<Result<Event, Infallible>>>>, ServerError> {
    let turn = prepare_turn(&state, &user, req).await?;
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let session_id = turn.conversation.as_ref().map(|c| c.id.clone());
        let (kind, mut deltas) = match state.providers.stream(turn.kind, &turn.request, turn.use_fallback).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(provider = %turn.kind, error = %e, "chat stream failed to open");
                let _ = tx.send(json_event(serde_json::json!({ "error": apology(&e) }))).await;
                return;
            }
        };

        let mut reply = String::new();
        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    reply.push_str(&delta);
                    if tx.send(json_event(serde_json::json!({ "delta": delta }))).await.is_err() {
                        debug!(provider = %kind, "client disconnected mid-stream");
                        return;
                    }
                }
                Err(e) => {
                    warn!(provider = %kind, error = %e, "chat stream failed");
                    let _ = tx.send(json_event(serde_json::json!({ "error": e.to_string() }))).await;
                    return;
                }
            }
        }

        match &turn.conversation {
            Some(conversation) if reply.trim().is_empty() => {
                warn!(session_id = %conversation.id, provider = %kind, "stream produced no text; turn not stored");
            }
            Some(conversation) => {
                if let Err(e) = persist_turn(&state, conversation, &turn.message, turn.started_at, &reply).await {
                    warn!(session_id = %conversation.id, error = %e, "failed to persist streamed reply");
                }
            }
            None => {}
        }
        info!(provider = %kind, reply_len = reply.len(), "chat stream completed");
        let _ = tx
            .send(json_event(serde_json::json!({
                "done": true,
                "session_id": session_id,
                "provider": kind,
                "fell_back": kind != turn.kind,
            })))
            .await;
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// First free `exports/` path for `name`, adding `_2`, `_3`, ... before the extension.
async fn unique_export_path(dir: &std::path::Path, name: &str) -> (PathBuf, String) {
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let mut candidate = name.to_owned();
    let mut n = 1;
    while tokio::fs::try_exists(dir.join(&candidate)).await.unwrap_or(false) {
        n += 1;
        candidate = if ext.is_empty() { format!("{stem}_{n}") } else { format!("{stem}_{n}.{ext}") };
    }
    (dir.join(&candidate), candidate)
}

/// Export a conversation as a transcript under `uploads/exports`.
///
/// Each user keeps at most 50 saved chats; older ones are removed together
/// with their files.
#[utoipa::path(
    post,
    path = "/chat/save",
    tag = "chat",
    security(("bearer" = [])),
    request_body = SaveChatRequest,
    responses(
        (status = 200, description = "Transcript written", body = SaveChatResponse),
        (status = 400, description = "No messages to save"),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn save_chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<SaveChatRequest>,
) -> Result<Json<SaveChatResponse>, ServerError> {
    if req.messages.is_empty() {
        return Err(ServerError::BadRequest("No messages to save".into()));
    }
    req.validate()?;

    let now = Utc::now();
    let session_id = req.session_id.as_deref().map(str::trim).unwrap_or("");
    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .or_else(|| req.messages.iter().find(|m| m.role == "user").map(|m| title_from(&m.content)))
        .unwrap_or_else(|| "Chat Transcript".to_owned());

    let company = &state.company.config;
    let body = Transcript {
        session_id,
        title: &title,
        company_name: &company.company_name,
        assistant_name: &company.assistant_name,
        messages: &req.messages,
    }
    .render(req.format, now)?;

    let exports = state.files.dir_path(FileDir::Exports);
    tokio::fs::create_dir_all(&exports).await?;
    let (path, filename) = unique_export_path(&exports, &transcript::file_name(session_id, req.format, now)).await;
    tokio::fs::write(&path, body).await?;

    state
        .store
        .insert_saved_chat(SavedChat {
            id: Uuid::new_v4().to_string(),
            username: user.username.clone(),
            filename: filename.clone(),
            format: req.format.to_string(),
            title: Some(title),
            message_count: i64::try_from(req.messages.len()).unwrap_or(i64::MAX),
            created_at: now,
        })
        .await?;

    let evicted = state.store.evict_saved_chats(&user.username, MAX_SAVED_CHATS).await?;
    for old in &evicted {
        match tokio::fs::remove_file(exports.join(&old.filename)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %old.filename, error = %e, "failed to delete evicted transcript"),
        }
    }
    info!(
        username = %user.username,
        file = %filename,
        messages = req.messages.len(),
        evicted = evicted.len(),
        "chat saved"
    );

    Ok(Json(SaveChatResponse {
        success: true,
        download_url: download_url(&filename),
        filename,
        format: req.format,
        message_count: req.messages.len(),
    }))
}

/// Saved transcripts of the caller, newest first.
#[utoipa::path(
    get,
    path = "/chat/saved",
    tag = "chat",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Saved chats", body = SavedChatList),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn list_saved(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SavedChatList>, ServerError> {
    let chats = state.store.list_saved_chats(&user.username).await?;
    Ok(Json(SavedChatList { chats: chats.iter().map(SavedChat::to_response).collect() }))
}

async fn owned_conversation(state: &AppState, user: &AuthUser, id: &str) -> Result<Conversation, ServerError> {
    state
        .store
        .get_conversation(id)
        .await?
        .filter(|c| c.username == user.username)
        .ok_or_else(|| ServerError::NotFound(format!("Session '{id}' not found")))
}

#[utoipa::path(
    get,
    path = "/chat/sessions",
    tag = "sessions",
    security(("bearer" = [])),
    params(SessionsQuery),
    responses(
        (status = 200, description = "Conversations, most recent first", body = SessionList),
    )
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<SessionList>, ServerError> {
    let limit = query.limit.unwrap_or(DEFAULT_SESSION_LIMIT).clamp(1, MAX_SESSION_LIMIT);
    let sessions = state.store.list_conversations(&user.username, limit).await?;
    Ok(Json(SessionList { sessions: sessions.iter().map(Conversation::to_response).collect() }))
}

#[utoipa::path(
    post,
    path = "/chat/sessions",
    tag = "sessions",
    security(("bearer" = [])),
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Conversation created", body = SessionResponse),
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, ServerError> {
    let now = Utc::now();
    let conversation = Conversation {
        id: Uuid::new_v4().to_string(),
        username: user.username,
        title: req.title.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty()),
        created_at: now,
        updated_at: now,
    };
    state.store.create_conversation(conversation.clone()).await?;
    Ok(Json(conversation.to_response()))
}

#[utoipa::path(
    get,
    path = "/chat/sessions/{id}/messages",
    tag = "sessions",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Session ID"), MessagesQuery),
    responses(
        (status = 200, description = "Messages, oldest first", body = MessageList),
        (status = 404, description = "Session not found"),
    )
)]
pub async fn list_session_messages(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessageList>, ServerError> {
    let conversation = owned_conversation(&state, &user, &id).await?;
    let messages = match query.limit.filter(|n| *n > 0) {
        Some(limit) => state.store.recent_messages(&conversation.id, limit).await?,
        None => state.store.list_messages(&conversation.id).await?,
    };
    Ok(Json(MessageList {
        session_id: conversation.id,
        messages: messages.iter().map(StoredMessage::to_response).collect(),
    }))
}

#[utoipa::path(
    delete,
    path = "/chat/sessions/{id}",
    tag = "sessions",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Conversation deleted", body = DeleteResponse),
        (status = 404, description = "Session not found"),
    )
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ServerError> {
    let conversation = owned_conversation(&state, &user, &id).await?;
    state.store.delete_conversation(&conversation.id).await?;
    info!(session_id = %id, "conversation deleted");
    Ok(Json(DeleteResponse { success: true, message: format!("Session '{id}' deleted") }))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn apology_carries_the_error() {
        let text = apology(&"connection refused");
        assert!(text.starts_with("I'm sorry"));
        assert!(text.ends_with("Error: connection refused"));
    }

    #[tokio::test]
    async fn export_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let (first, name) = unique_export_path(dir.path(), "transcript_chat_20240101_000000.txt").await;
        assert_eq!(name, "transcript_chat_20240101_000000.txt");
        std::fs::write(&first, "x").unwrap();
        let (_, second) = unique_export_path(dir.path(), "transcript_chat_20240101_000000.txt").await;
        assert_eq!(second, "transcript_chat_20240101_000000_2.txt");
    }
}
