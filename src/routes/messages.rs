//! Message send/edit/delete/list and reactions — the realtime engine's
//! `send_message` algorithm expressed as an HTTP handler: outbound
//! fan-out happens over the SSE bus (`events::EventBus`), inbound requests
//! arrive here instead of over a socket frame, since the transport is SSE
//! rather than a full-duplex socket (see DESIGN.md).

use crate::auth::{self, AuthUser};
use crate::config::AppConfig;
use crate::crypto;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::events::{ChatEvent, EventBus};
use crate::models::*;
use crate::state_store::StateStore;
use crate::store;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, Request, State};
use std::time::Duration;

const MAX_CONTENT_CHARS: usize = 10_000;

fn normalize_type(t: &str) -> &'static str {
    match t {
        "file" => "file",
        "image" => "image",
        _ => "text",
    }
}

/// The most intricate handler in the spec: normalizes input, enforces the
/// per-user send quota, consumes the upload token for file/image sends
/// (never trusting client-supplied file metadata), persists the message,
/// and computes the listener-facing `unread_count` before fan-out.
#[post("/api/rooms/<room_id>/messages", format = "json", data = "<body>")]
pub async fn send_message(
    db: &State<Db>,
    events: &State<EventBus>,
    state_store: &State<StateStore>,
    config: &State<AppConfig>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
    body: Json<SendMessageRequest>,
) -> AppResult<Json<Message>> {
    auth::check_csrf(req)?;
    {
        let conn = db.conn.lock().unwrap();
        auth::require_member(&conn, room_id, &auth.0.id)?;
    }

    let quota_key = format!("socket:send_message:{}", auth.0.id);
    let n = state_store.incr(&quota_key, Some(Duration::from_secs(60))).await;
    if n as usize > config.socket_send_message_per_minute {
        return Err(AppError::RateLimited { retry_after_secs: 60, limit: n as usize - 1 });
    }

    let message_type = normalize_type(&body.message_type);
    let mut content = body.content.clone().unwrap_or_default();
    content = content.trim().chars().take(MAX_CONTENT_CHARS).collect();
    let encrypted = match message_type {
        "text" => body.encrypted.unwrap_or(true),
        _ => false,
    };

    let (final_content, file_path, file_name, file_size);
    if message_type == "file" || message_type == "image" {
        let token = body.upload_token.as_deref().ok_or_else(|| AppError::Validation("upload_token is required for file/image messages".into()))?;
        let payload = consume_upload_token(state_store, token, &auth.0.id, room_id, message_type).await?;
        final_content = payload.file_name.clone();
        file_path = Some(payload.file_path);
        file_name = Some(payload.file_name);
        file_size = Some(payload.file_size);
    } else {
        if content.is_empty() {
            return Err(AppError::Validation("content must not be empty".into()));
        }
        final_content = content;
        file_path = None;
        file_name = None;
        file_size = None;
    }

    let conn = db.conn.lock().unwrap();
    let message = store::messages::insert(
        &conn,
        room_id,
        &auth.0.id,
        &final_content,
        encrypted,
        message_type,
        file_path.as_deref(),
        file_name.as_deref(),
        body.reply_to,
        &super::now(),
    )?;

    if let (Some(path), Some(name), Some(size)) = (&file_path, &file_name, file_size) {
        // Orphan-upload is tolerated: the message is already visible even
        // if the RoomFile catalog entry fails to write.
        let file_type = if message_type == "image" { "image" } else { "file" };
        if let Err(e) = store::files::create(&conn, room_id, Some(message.id), path, name, size, file_type, &auth.0.id, &super::now()) {
            tracing::error!(error = ?e, message_id = message.id, "orphaned upload: message persisted without a RoomFile row");
        }
    }

    let mut out = message.clone();
    out.unread_count = Some(store::messages::unread_count_for_new_message(&conn, room_id, message.id, &auth.0.id)?);
    events.publish(ChatEvent::NewMessage { room_id: room_id.to_string(), message: out.clone() });
    events.publish(ChatEvent::RoomUpdated { room_id: room_id.to_string() });
    Ok(Json(out))
}

/// Single-use consumption with a reason-specific rejection so retries can
/// tell expired apart from forged. Mismatches are detected by a read-only
/// peek *before* the token is actually claimed, so a forged/mis-bound
/// attempt never burns a token a legitimate retry still needs; the claim
/// itself is a `get_and_delete`, so of two concurrent valid attempts
/// exactly one wins and the other sees "already consumed".
async fn consume_upload_token(state_store: &StateStore, token: &str, user_id: &str, room_id: &str, expected_type: &str) -> AppResult<UploadTokenPayload> {
    let key = format!("upload_token:{token}");
    let Some(peeked) = state_store.get_json::<UploadTokenPayload>(&key).await else {
        return Err(AppError::Validation("upload token missing or expired".into()));
    };
    check_binding(&peeked, user_id, room_id, expected_type)?;

    let Some(payload) = state_store.get_and_delete_json::<UploadTokenPayload>(&key).await else {
        return Err(AppError::Validation("upload token already consumed".into()));
    };
    check_binding(&payload, user_id, room_id, expected_type)?;
    Ok(payload)
}

fn check_binding(payload: &UploadTokenPayload, user_id: &str, room_id: &str, expected_type: &str) -> AppResult<()> {
    if payload.user_id != user_id {
        return Err(AppError::Validation("upload token was not issued to this user".into()));
    }
    if payload.room_id != room_id {
        return Err(AppError::Validation("upload token was not issued for this room".into()));
    }
    if payload.file_type != expected_type {
        return Err(AppError::Validation("upload token type does not match the message type".into()));
    }
    Ok(())
}

#[get("/api/rooms/<room_id>/messages?<before_id>&<limit>&<include_meta>")]
pub fn get_messages(
    db: &State<Db>,
    auth: AuthUser,
    room_id: &str,
    before_id: Option<i64>,
    limit: Option<i64>,
    include_meta: Option<bool>,
) -> AppResult<Json<MessageListResponse>> {
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    let limit = limit.unwrap_or(50).clamp(1, 200);
    let (messages, total, has_more) = store::messages::list(&conn, room_id, before_id, limit)?;
    let _ = include_meta; // reserved for future per-message metadata expansion
    Ok(Json(MessageListResponse { messages, total, limit, has_more }))
}

#[put("/api/messages/<message_id>", format = "json", data = "<body>")]
pub fn edit_message(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    message_id: i64,
    body: Json<EditMessageRequest>,
) -> AppResult<Json<Message>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    let existing = auth::require_member_owning(&conn, &auth.0.id, |c| store::messages::get(c, message_id), |m: &Message| m.room_id.as_str())?;
    if existing.sender_id != auth.0.id {
        return Err(AppError::AuthZ("only the sender may edit this message".into()));
    }
    let content: String = body.content.trim().chars().take(MAX_CONTENT_CHARS).collect();
    if content.is_empty() {
        return Err(AppError::Validation("content must not be empty".into()));
    }
    let message = store::messages::edit(&conn, message_id, &content, &super::now())?;
    events.publish(ChatEvent::MessageEdited { room_id: message.room_id.clone(), message: message.clone() });
    Ok(Json(message))
}

/// Delete is a tombstone edit, never a row removal, so reply chains stay
/// valid even after the original message is "deleted".
#[delete("/api/messages/<message_id>")]
pub fn delete_message(db: &State<Db>, events: &State<EventBus>, req: &Request<'_>, auth: AuthUser, message_id: i64) -> AppResult<Json<Message>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    let existing = auth::require_member_owning(&conn, &auth.0.id, |c| store::messages::get(c, message_id), |m: &Message| m.room_id.as_str())?;
    if existing.sender_id != auth.0.id {
        return Err(AppError::AuthZ("only the sender may delete this message".into()));
    }
    let message = store::messages::tombstone(&conn, message_id, &super::now())?;
    events.publish(ChatEvent::MessageDeleted { room_id: message.room_id.clone(), message: message.clone() });
    Ok(Json(message))
}

// ---------- Reactions ----------

#[post("/api/messages/<message_id>/reactions", format = "json", data = "<body>")]
pub fn add_reaction(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    message_id: i64,
    body: Json<AddReactionRequest>,
) -> AppResult<Json<Vec<ReactionSummary>>> {
    auth::check_csrf(req)?;
    toggle_reaction(db, events, req, auth, message_id, &body.emoji)
}

#[delete("/api/messages/<message_id>/reactions", format = "json", data = "<body>")]
pub fn remove_reaction(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    message_id: i64,
    body: Json<AddReactionRequest>,
) -> AppResult<Json<Vec<ReactionSummary>>> {
    auth::check_csrf(req)?;
    toggle_reaction(db, events, req, auth, message_id, &body.emoji)
}

/// Add and remove are the same toggle: presence ⇒ remove, absence ⇒
/// insert, so calling either endpoint twice in a row returns to the
/// original set.
fn toggle_reaction(
    db: &State<Db>,
    events: &State<EventBus>,
    _req: &Request<'_>,
    auth: AuthUser,
    message_id: i64,
    emoji: &str,
) -> AppResult<Json<Vec<ReactionSummary>>> {
    let conn = db.conn.lock().unwrap();
    let message = auth::require_member_owning(&conn, &auth.0.id, |c| store::messages::get(c, message_id), |m: &Message| m.room_id.as_str())?;
    store::reactions::toggle(&conn, message_id, &auth.0.id, emoji, &super::now())?;
    let reactions = store::reactions::for_message(&conn, message_id)?;
    events.publish(ChatEvent::ReactionUpdated { room_id: message.room_id, message_id, reactions: reactions.clone() });
    Ok(Json(reactions))
}

#[get("/api/messages/<message_id>/reactions")]
pub fn get_reactions(db: &State<Db>, auth: AuthUser, message_id: i64) -> AppResult<Json<Vec<ReactionSummary>>> {
    let conn = db.conn.lock().unwrap();
    auth::require_member_owning(&conn, &auth.0.id, |c| store::messages::get(c, message_id), |m: &Message| m.room_id.as_str())?;
    Ok(Json(store::reactions::for_message(&conn, message_id)?))
}
