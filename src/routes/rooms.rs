//! Room lifecycle, membership, pins, polls, files, and admin actions.
//! Every handler applies the existence/membership/admin gates in the order
//! the spec requires: membership before existence, admin after membership.

use crate::auth::{self, AuthUser};
use crate::crypto;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::events::{ChatEvent, EventBus};
use crate::models::*;
use crate::store;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, Request, State};

#[post("/api/rooms", format = "json", data = "<body>")]
pub fn create_room(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    body: Json<CreateRoomRequest>,
) -> AppResult<Json<RoomWithMembers>> {
    auth::check_csrf(req)?;
    if body.members.is_empty() {
        return Err(AppError::Validation("at least one other member is required".into()));
    }

    let conn = db.conn.lock().unwrap();
    for uid in &body.members {
        if store::users::get_by_id(&conn, uid)?.is_none() {
            return Err(AppError::Validation(format!("unknown member id {uid}")));
        }
    }

    // Exactly two participants and no explicit name ⇒ a direct room,
    // deduplicated against any existing direct room between the same pair.
    if body.members.len() == 1 && body.name.is_none() {
        let other = &body.members[0];
        if other == &auth.0.id {
            return Err(AppError::Validation("cannot create a direct room with yourself".into()));
        }
        if let Some(existing_id) = store::rooms::find_direct_room(&conn, &auth.0.id, other)? {
            return Ok(Json(store::rooms::with_members(&conn, &existing_id, &auth.0.id)?));
        }
        let id = super::new_id();
        let now = super::now();
        let key = crypto::generate_room_key();
        store::rooms::create(&conn, &id, None, "direct", &auth.0.id, &key, &now, &[&auth.0.id, other])?;
        return Ok(Json(store::rooms::with_members(&conn, &id, &auth.0.id)?));
    }

    let id = super::new_id();
    let now = super::now();
    let key = crypto::generate_room_key();
    let name = body.name.as_deref().map(|n| crypto::sanitize_input(n, 100));
    let mut member_ids: Vec<&str> = vec![&auth.0.id];
    member_ids.extend(body.members.iter().map(|s| s.as_str()));
    member_ids.sort_unstable();
    member_ids.dedup();
    store::rooms::create(&conn, &id, name.as_deref(), "group", &auth.0.id, &key, &now, &member_ids)?;
    let room = store::rooms::with_members(&conn, &id, &auth.0.id)?;
    events.publish(ChatEvent::RoomMembersUpdated { room_id: id.clone(), members: room.members.clone() });
    Ok(Json(room))
}

#[get("/api/rooms")]
pub fn list_rooms(db: &State<Db>, auth: AuthUser) -> AppResult<Json<Vec<RoomWithMembers>>> {
    let conn = db.conn.lock().unwrap();
    Ok(Json(store::rooms::list_for_user(&conn, &auth.0.id)?))
}

#[get("/api/rooms/<room_id>/info")]
pub fn room_info(db: &State<Db>, auth: AuthUser, room_id: &str) -> AppResult<Json<RoomWithMembers>> {
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    Ok(Json(store::rooms::with_members(&conn, room_id, &auth.0.id)?))
}

#[put("/api/rooms/<room_id>/name", format = "json", data = "<body>")]
pub fn rename_room(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
    body: Json<RenameRoomRequest>,
) -> AppResult<Json<serde_json::Value>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    auth::require_admin(&conn, room_id, &auth.0.id)?;
    store::rooms::require(&conn, room_id)?;
    let name = crypto::sanitize_input(body.name.trim(), 100);
    store::rooms::rename(&conn, room_id, &name)?;
    events.publish(ChatEvent::RoomNameUpdated { room_id: room_id.to_string(), name: Some(name) });
    events.publish(ChatEvent::RoomUpdated { room_id: room_id.to_string() });
    Ok(Json(serde_json::json!({"ok": true})))
}

#[post("/api/rooms/<room_id>/members", format = "json", data = "<body>")]
pub fn room_members_add(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
    body: Json<InviteMembersRequest>,
) -> AppResult<Json<RoomWithMembers>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    let room = store::rooms::require(&conn, room_id)?;
    if room.room_type == "direct" {
        return Err(AppError::Validation("cannot add members to a direct room".into()));
    }
    for uid in &body.user_ids {
        if store::users::get_by_id(&conn, uid)?.is_none() {
            return Err(AppError::Validation(format!("unknown member id {uid}")));
        }
    }
    let ids: Vec<&str> = body.user_ids.iter().map(|s| s.as_str()).collect();
    store::rooms::add_members(&conn, room_id, &ids, &super::now())?;
    let updated = store::rooms::with_members(&conn, room_id, &auth.0.id)?;
    events.publish(ChatEvent::RoomMembersUpdated { room_id: room_id.to_string(), members: updated.members.clone() });
    events.publish(ChatEvent::RoomUpdated { room_id: room_id.to_string() });
    Ok(Json(updated))
}

/// Idempotent: `{left: true, already_left: false}` the first time,
/// `{left: false, already_left: true}` on any repeat.
#[post("/api/rooms/<room_id>/leave")]
pub fn room_leave(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
) -> AppResult<Json<LeaveRoomResponse>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    store::rooms::require(&conn, room_id)?;
    let left = store::rooms::leave(&conn, room_id, &auth.0.id)?;
    if left {
        let updated = store::rooms::member_public_users(&conn, room_id)?;
        events.publish(ChatEvent::RoomMembersUpdated { room_id: room_id.to_string(), members: updated });
        events.publish(ChatEvent::RoomUpdated { room_id: room_id.to_string() });
    }
    Ok(Json(LeaveRoomResponse { left, already_left: !left }))
}

/// Per the stricter of the two inconsistent variants found in the
/// originating codebase (see DESIGN.md): an admin may not kick themself
/// through this endpoint, and the kick is always audit-logged.
#[delete("/api/rooms/<room_id>/members/<user_id>")]
pub fn kick_member(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
    user_id: &str,
) -> AppResult<Json<serde_json::Value>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    auth::require_admin(&conn, room_id, &auth.0.id)?;
    if user_id == auth.0.id {
        return Err(AppError::Validation("use leave_room to remove yourself".into()));
    }
    if !store::rooms::is_member(&conn, room_id, user_id)? {
        return Err(AppError::NotFound("user is not a member of this room".into()));
    }
    store::rooms::kick(&conn, room_id, user_id)?;
    store::audit::log_admin_action(&conn, room_id, &auth.0.id, Some(user_id), "kick_member", &serde_json::json!({}), &super::now())?;
    let updated = store::rooms::member_public_users(&conn, room_id)?;
    events.publish(ChatEvent::RoomMembersUpdated { room_id: room_id.to_string(), members: updated });
    events.publish(ChatEvent::RoomUpdated { room_id: room_id.to_string() });
    Ok(Json(serde_json::json!({"ok": true})))
}

#[post("/api/rooms/<room_id>/admins", format = "json", data = "<body>")]
pub fn set_admin(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
    body: Json<SetAdminRequest>,
) -> AppResult<Json<serde_json::Value>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    auth::require_admin(&conn, room_id, &auth.0.id)?;
    if !store::rooms::is_member(&conn, room_id, &body.user_id)? {
        return Err(AppError::NotFound("user is not a member of this room".into()));
    }
    store::rooms::set_admin(&conn, room_id, &body.user_id, body.is_admin)?;
    store::audit::log_admin_action(
        &conn,
        room_id,
        &auth.0.id,
        Some(&body.user_id),
        "set_admin",
        &serde_json::json!({"is_admin": body.is_admin}),
        &super::now(),
    )?;
    events.publish(ChatEvent::AdminUpdated { room_id: room_id.to_string(), user_id: body.user_id.clone(), is_admin: body.is_admin });
    Ok(Json(serde_json::json!({"ok": true})))
}

#[get("/api/rooms/<room_id>/admins")]
pub fn list_admins(db: &State<Db>, auth: AuthUser, room_id: &str) -> AppResult<Json<Vec<PublicUser>>> {
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    Ok(Json(store::rooms::admins(&conn, room_id)?))
}

#[get("/api/rooms/<room_id>/admin-check")]
pub fn admin_check(db: &State<Db>, auth: AuthUser, room_id: &str) -> AppResult<Json<serde_json::Value>> {
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    Ok(Json(serde_json::json!({"is_admin": store::rooms::is_admin(&conn, room_id, &auth.0.id)?})))
}

#[get("/api/rooms/<room_id>/admin-audit-logs?<format>")]
pub fn admin_audit_logs(db: &State<Db>, auth: AuthUser, room_id: &str, format: Option<&str>) -> AppResult<(rocket::http::ContentType, String)> {
    let conn = db.conn.lock().unwrap();
    auth::require_admin(&conn, room_id, &auth.0.id)?;
    let entries = store::audit::list_for_room(&conn, room_id)?;
    if format == Some("csv") {
        let mut out = String::from("id,room_id,actor_user_id,target_user_id,action,metadata,created_at\n");
        for e in &entries {
            out.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                e.id,
                e.room_id,
                e.actor_user_id,
                e.target_user_id.clone().unwrap_or_default(),
                e.action,
                e.metadata.to_string().replace(',', ";"),
                e.created_at
            ));
        }
        Ok((rocket::http::ContentType::CSV, out))
    } else {
        Ok((rocket::http::ContentType::JSON, serde_json::to_string(&entries).unwrap_or_default()))
    }
}

#[post("/api/rooms/<room_id>/pin-room")]
pub fn pin_room(db: &State<Db>, req: &Request<'_>, auth: AuthUser, room_id: &str) -> AppResult<Json<serde_json::Value>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    let currently: i64 = conn.query_row(
        "SELECT pinned FROM room_members WHERE room_id = ?1 AND user_id = ?2",
        rusqlite::params![room_id, &auth.0.id],
        |r| r.get(0),
    )?;
    store::rooms::set_pinned(&conn, room_id, &auth.0.id, currently == 0)?;
    Ok(Json(serde_json::json!({"pinned": currently == 0})))
}

#[post("/api/rooms/<room_id>/mute")]
pub fn mute_room(db: &State<Db>, req: &Request<'_>, auth: AuthUser, room_id: &str) -> AppResult<Json<serde_json::Value>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    let currently: i64 = conn.query_row(
        "SELECT muted FROM room_members WHERE room_id = ?1 AND user_id = ?2",
        rusqlite::params![room_id, &auth.0.id],
        |r| r.get(0),
    )?;
    store::rooms::set_muted(&conn, room_id, &auth.0.id, currently == 0)?;
    Ok(Json(serde_json::json!({"muted": currently == 0})))
}

// ---------- Pins ----------

#[post("/api/rooms/<room_id>/pins", format = "json", data = "<body>")]
pub fn create_pin(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
    body: Json<CreatePinRequest>,
) -> AppResult<Json<PinnedMessage>> {
    auth::check_csrf(req)?;
    if body.message_id.is_none() && body.content.is_none() {
        return Err(AppError::Validation("message_id or content is required".into()));
    }
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    if let Some(mid) = body.message_id {
        let msg = store::messages::require(&conn, mid)?;
        if msg.room_id != room_id {
            return Err(AppError::Validation("message does not belong to this room".into()));
        }
    }
    let content = body.content.as_deref().map(|c| crypto::sanitize_input(c, 500));
    let pin = store::pins::create(&conn, room_id, body.message_id, content.as_deref(), &auth.0.id, &super::now())?;
    let pins = store::pins::list(&conn, room_id)?;
    events.publish(ChatEvent::PinUpdated { room_id: room_id.to_string(), pins });
    Ok(Json(pin))
}

#[get("/api/rooms/<room_id>/pins")]
pub fn list_pins(db: &State<Db>, auth: AuthUser, room_id: &str) -> AppResult<Json<Vec<PinnedMessage>>> {
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    Ok(Json(store::pins::list(&conn, room_id)?))
}

#[delete("/api/rooms/<room_id>/pins/<pin_id>")]
pub fn delete_pin(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
    pin_id: i64,
) -> AppResult<Json<serde_json::Value>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    if !store::pins::delete(&conn, room_id, pin_id)? {
        return Err(AppError::NotFound("pin not found".into()));
    }
    let pins = store::pins::list(&conn, room_id)?;
    events.publish(ChatEvent::PinUpdated { room_id: room_id.to_string(), pins });
    Ok(Json(serde_json::json!({"ok": true})))
}

// ---------- Polls ----------

#[post("/api/rooms/<room_id>/polls", format = "json", data = "<body>")]
pub fn create_poll(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
    body: Json<CreatePollRequest>,
) -> AppResult<Json<Poll>> {
    auth::check_csrf(req)?;
    if body.options.len() < 2 {
        return Err(AppError::Validation("a poll needs at least two options".into()));
    }
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    let question = crypto::sanitize_input(&body.question, 500);
    let options: Vec<String> = body.options.iter().map(|o| crypto::sanitize_input(o, 200)).collect();
    let poll = store::polls::create(
        &conn,
        room_id,
        &auth.0.id,
        &question,
        &options,
        body.multiple_choice,
        body.anonymous,
        body.ends_at.as_deref(),
        &super::now(),
    )?;
    events.publish(ChatEvent::PollCreated { room_id: room_id.to_string(), poll: poll.clone() });
    Ok(Json(poll))
}

#[get("/api/rooms/<room_id>/polls")]
pub fn list_polls(db: &State<Db>, auth: AuthUser, room_id: &str) -> AppResult<Json<Vec<Poll>>> {
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    Ok(Json(store::polls::list(&conn, room_id)?))
}

#[post("/api/polls/<poll_id>/vote", format = "json", data = "<body>")]
pub fn poll_vote(
    db: &State<Db>,
    events: &State<EventBus>,
    req: &Request<'_>,
    auth: AuthUser,
    poll_id: i64,
    body: Json<VotePollRequest>,
) -> AppResult<Json<Poll>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    auth::require_member_owning(&conn, &auth.0.id, |c| store::polls::get(c, poll_id), |p: &Poll| p.room_id.as_str())?;
    store::polls::vote(&conn, poll_id, &body.option_ids, &auth.0.id, &super::now())?;
    let updated = store::polls::require(&conn, poll_id)?;
    events.publish(ChatEvent::PollUpdated { room_id: updated.room_id.clone(), poll: updated.clone() });
    Ok(Json(updated))
}

#[post("/api/polls/<poll_id>/close")]
pub fn poll_close(db: &State<Db>, events: &State<EventBus>, req: &Request<'_>, auth: AuthUser, poll_id: i64) -> AppResult<Json<Poll>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    auth::require_member_owning(&conn, &auth.0.id, |c| store::polls::get(c, poll_id), |p: &Poll| p.room_id.as_str())?;
    store::polls::close(&conn, poll_id)?;
    let updated = store::polls::require(&conn, poll_id)?;
    events.publish(ChatEvent::PollUpdated { room_id: updated.room_id.clone(), poll: updated.clone() });
    Ok(Json(updated))
}

// ---------- Files ----------

#[get("/api/rooms/<room_id>/files")]
pub fn list_files(db: &State<Db>, auth: AuthUser, room_id: &str) -> AppResult<Json<Vec<RoomFile>>> {
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    Ok(Json(store::files::list(&conn, room_id)?))
}

#[delete("/api/rooms/<room_id>/files/<file_id>")]
pub fn delete_file(
    db: &State<Db>,
    req: &Request<'_>,
    auth: AuthUser,
    room_id: &str,
    file_id: i64,
) -> AppResult<Json<serde_json::Value>> {
    auth::check_csrf(req)?;
    let conn = db.conn.lock().unwrap();
    auth::require_member(&conn, room_id, &auth.0.id)?;
    let file = store::files::require(&conn, file_id)?;
    if file.room_id != room_id {
        return Err(AppError::NotFound("file not found".into()));
    }
    let is_admin = store::rooms::is_admin(&conn, room_id, &auth.0.id)?;
    if file.uploaded_by != auth.0.id && !is_admin {
        return Err(AppError::AuthZ("only the uploader or a room admin may delete this file".into()));
    }
    store::files::delete(&conn, file_id)?;
    let _ = std::fs::remove_file(&file.file_path);
    Ok(Json(serde_json::json!({"ok": true})))
}
