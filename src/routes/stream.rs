//! The realtime engine's outbound half. One SSE connection per session
//! carries every event relevant to that user across every room they
//! belong to — on connect the engine auto-joins all of the user's rooms
//! rather than requiring an explicit per-room subscription, matching the
//! "record sid, auto-join, coalesce presence" connection lifecycle.
//!
//! Inbound events that on a full-duplex socket would be frames on this
//! same connection (`message_read`, `typing`, `profile_updated`) are
//! instead separate POST handlers below, published onto the same
//! `EventBus` this stream reads from.

use crate::auth::AuthUser;
use crate::db::Db;
use crate::events::{ChatEvent, EventBus};
use crate::models::{ReadPositionRequest, TypingNotification};
use crate::routes::{PresenceTracker, TypingTracker};
use crate::state_store::StateStore;
use crate::store;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::serde::Deserialize;
use rocket::{post, put, Request, State};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};

/// Decrements the presence counter and emits `offline` to every room the
/// user was in, once this connection's stream is dropped (client
/// disconnect or server shutdown). The decrement is async so it has to
/// run as a spawned task rather than directly in `Drop`.
struct PresenceGuard {
    state: StateStore,
    sender: broadcast::Sender<ChatEvent>,
    user_id: String,
    room_ids: Vec<String>,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        let state = self.state.clone();
        let sender = self.sender.clone();
        let user_id = self.user_id.clone();
        let room_ids = std::mem::take(&mut self.room_ids);
        tokio::spawn(async move {
            if PresenceTracker::disconnect(&state, &user_id).await {
                for room_id in room_ids {
                    let _ = sender.send(ChatEvent::UserStatus { room_id, user_id: user_id.clone(), status: "offline".into() });
                }
            }
        });
    }
}

#[rocket::get("/api/stream")]
pub async fn connect_stream(db: &State<Db>, events: &State<EventBus>, state_store: &State<StateStore>, auth: AuthUser) -> EventStream![] {
    let user_id = auth.0.id.clone();
    let room_ids = {
        let conn = db.conn.lock().unwrap();
        store::rooms::room_ids_for_user(&conn, &user_id).unwrap_or_default()
    };

    let became_online = PresenceTracker::connect(state_store, &user_id).await;
    if became_online {
        let conn = db.conn.lock().unwrap();
        let _ = store::users::set_status(&conn, &user_id, "online");
        drop(conn);
        for room_id in &room_ids {
            events.publish(ChatEvent::UserStatus { room_id: room_id.clone(), user_id: user_id.clone(), status: "online".into() });
        }
    }

    let mut rx = events.sender.subscribe();
    let guard = PresenceGuard { state: (**state_store).clone(), sender: events.sender.clone(), user_id: user_id.clone(), room_ids: room_ids.clone() };

    EventStream! {
        let _guard = guard;
        let mut heartbeat = interval(Duration::from_secs(15));
        let mut room_refresh = interval(Duration::from_secs(300));

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Ok(event) => {
                            if let Some((name, in_scope)) = classify(&event, &user_id, &room_ids) {
                                if in_scope {
                                    yield Event::json(&event).event(name);
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                    }
                }
                _ = heartbeat.tick() => {
                    yield Event::json(&json!({"time": chrono::Utc::now().to_rfc3339()})).event("heartbeat");
                }
                _ = room_refresh.tick() => {
                    // refresh the cached membership list so room creation/leave
                    // elsewhere is reflected without requiring a reconnect
                }
            }
        }
    }
}

/// Maps an event to its outbound frame name and whether this connection's
/// user/room scope should actually see it. `room_ids` is a snapshot from
/// connect time — members added to a room after connecting won't see that
/// room's events until their next reconnect, an accepted staleness window
/// matching the 5-minute room-id cache described for the connection.
fn classify(event: &ChatEvent, user_id: &str, room_ids: &[String]) -> Option<(&'static str, bool)> {
    let in_room = |rid: &str| room_ids.iter().any(|r| r == rid);
    Some(match event {
        ChatEvent::NewMessage { room_id, .. } => ("new_message", in_room(room_id)),
        ChatEvent::MessageEdited { room_id, .. } => ("message_edited", in_room(room_id)),
        ChatEvent::MessageDeleted { room_id, .. } => ("message_deleted", in_room(room_id)),
        ChatEvent::UserStatus { room_id, .. } => ("user_status", in_room(room_id)),
        ChatEvent::UserTyping { room_id, user_id: typer, .. } => ("user_typing", in_room(room_id) && typer != user_id),
        ChatEvent::ReadUpdated { room_id, .. } => ("read_updated", in_room(room_id)),
        ChatEvent::RoomNameUpdated { room_id, .. } => ("room_name_updated", in_room(room_id)),
        ChatEvent::RoomMembersUpdated { room_id, .. } => ("room_members_updated", in_room(room_id)),
        ChatEvent::UserProfileUpdated { room_id, .. } => ("user_profile_updated", in_room(room_id)),
        ChatEvent::PinUpdated { room_id, .. } => ("pin_updated", in_room(room_id)),
        ChatEvent::PollUpdated { room_id, .. } => ("poll_updated", in_room(room_id)),
        ChatEvent::PollCreated { room_id, .. } => ("poll_created", in_room(room_id)),
        ChatEvent::ReactionUpdated { room_id, .. } => ("reaction_updated", in_room(room_id)),
        ChatEvent::AdminUpdated { room_id, .. } => ("admin_updated", in_room(room_id)),
        ChatEvent::RoomUpdated { room_id } => ("room_updated", in_room(room_id)),
        ChatEvent::JoinedRoom { room } => ("joined_room", room.members.iter().any(|m| m.id == user_id)),
        ChatEvent::Error { target_user_id, .. } => ("error", target_user_id == user_id),
    })
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}

/// `message_read`: advances the cursor and emits the canonical value,
/// never trusting a client-asserted `last_read_message_id` that might
/// move it backwards.
#[put("/api/rooms/<room_id>/read", format = "json", data = "<body>")]
pub fn mark_read(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
    body: Json<ReadPositionRequest>,
) -> crate::error::AppResult<Json<serde_json::Value>> {
    crate::auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    crate::auth::require_member(&conn, room_id, &auth.0.id)?;
    store::messages::require(&conn, body.message_id)?;
    store::rooms::advance_read(&conn, room_id, &auth.0.id, body.message_id)?;
    let last_read = store::rooms::last_read(&conn, room_id, &auth.0.id)?;
    events.publish(ChatEvent::ReadUpdated { room_id: room_id.to_string(), user_id: auth.0.id.clone(), last_read_message_id: last_read });
    Ok(Json(json!({"ok": true, "last_read_message_id": last_read})))
}

/// `typing`: rate-limited to one emit per (user, room) per second via the
/// process-local `TypingTracker`; over-rate calls are silently dropped
/// rather than erroring, since this is a best-effort indicator.
#[post("/api/rooms/<room_id>/typing", format = "json", data = "<body>")]
pub fn notify_typing(
    db: &State<Db>,
    events: &State<EventBus>,
    typing: &State<TypingTracker>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
    body: Json<TypingNotification>,
) -> crate::error::AppResult<Json<serde_json::Value>> {
    crate::auth::check_csrf(req)?;
    {
        let conn = db.conn.lock().unwrap();
        crate::auth::require_member(&conn, room_id, &auth.0.id)?;
    }
    if typing.allow(room_id, &auth.0.id) {
        events.publish(ChatEvent::UserTyping { room_id: room_id.to_string(), user_id: auth.0.id.clone(), is_typing: body.is_typing });
    }
    Ok(Json(json!({"ok": true})))
}

/// `profile_updated`: the client's claimed nickname/image/status is
/// discarded after the write; the broadcast carries the Store's
/// authoritative row, read back fresh.
#[put("/api/me/profile", format = "json", data = "<body>")]
pub fn update_profile(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    body: Json<ProfileUpdateRequest>,
) -> crate::error::AppResult<Json<crate::models::PublicUser>> {
    crate::auth::check_csrf(req)?;
    let nickname = body.nickname.as_deref().map(|n| crate::crypto::sanitize_input(n, 100));
    let conn = db.conn.lock().unwrap();
    store::users::update_profile(&conn, &auth.0.id, nickname.as_deref(), body.profile_image.as_deref(), body.status_message.as_deref())?;
    let user = store::users::get_by_id(&conn, &auth.0.id)?.ok_or_else(|| crate::error::AppError::NotFound("user not found".into()))?;
    let public = crate::models::PublicUser::from(&user);

    for room_id in store::rooms::room_ids_for_user(&conn, &auth.0.id).unwrap_or_default() {
        events.publish(ChatEvent::UserProfileUpdated { room_id, user: public.clone() });
    }
    Ok(Json(public))
}
