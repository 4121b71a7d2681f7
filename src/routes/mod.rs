// Route module decomposition — each domain area in its own file.
// Shared helpers (catchers, id/timestamp minting, the presence tracker used
// by the realtime engine) live here; route functions live in submodules.

pub mod auth_routes;
pub mod messages;
pub mod rooms;
pub mod search;
pub mod stream;
pub mod upload;
pub mod users;

pub use auth_routes::{
    auth_providers, change_password, config_snapshot, delete_account, login, logout, me, oidc_callback, oidc_login, register,
};
pub use messages::{add_reaction, delete_message, edit_message, get_messages, get_reactions, remove_reaction, send_message};
pub use rooms::{
    admin_audit_logs, admin_check, create_pin, create_poll, create_room, delete_file, delete_pin, kick_member, list_admins,
    list_files, list_pins, list_polls, list_rooms, mute_room, pin_room, poll_close, poll_vote, rename_room, room_info,
    room_leave, room_members_add, set_admin,
};
pub use search::{search_advanced, search_basic};
pub use stream::{connect_stream, mark_read, notify_typing, update_profile};
pub use upload::{serve_upload, upload_file, upload_job_status};
pub use users::{list_online_users, list_users};

use crate::state_store::StateStore;
use rocket::serde::json::Json;
use serde_json::{json, Value};
use std::collections::HashMap;

pub fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[rocket::catch(429)]
pub fn too_many_requests() -> Json<Value> {
    Json(json!({"error": "rate limit exceeded", "code": "rate_limited"}))
}

#[rocket::catch(404)]
pub fn not_found() -> Json<Value> {
    Json(json!({"error": "not found", "code": "not_found"}))
}

#[rocket::catch(400)]
pub fn bad_request() -> Json<Value> {
    Json(json!({"error": "malformed request body", "code": "invalid_json"}))
}

#[rocket::catch(413)]
pub fn payload_too_large() -> Json<Value> {
    Json(json!({"error": "payload too large", "code": "payload_too_large"}))
}

/// Presence coalescing across a user's multiple simultaneous connections.
/// Backed by the [`StateStore`] refcount (not a process-local map) so the
/// 0↔1 transition is the linearizable signal a clustered deployment can
/// share: only one server's connect/disconnect actually flips `online`.
pub struct PresenceTracker;

impl PresenceTracker {
    fn key(user_id: &str) -> String {
        format!("presence:{user_id}")
    }

    /// Returns true if this is the user's first live connection (0 → 1).
    pub async fn connect(state: &StateStore, user_id: &str) -> bool {
        state.incr(&Self::key(user_id), None).await == 1
    }

    /// Returns true if this was the user's last live connection (n → 0).
    pub async fn disconnect(state: &StateStore, user_id: &str) -> bool {
        state.decr(&Self::key(user_id)).await == 0
    }
}

/// In-memory per-(user, room) typing debounce, separate from the
/// StateStore since it's purely a local rate-limit, not shared state.
#[derive(Default)]
pub struct TypingTracker {
    last: std::sync::Mutex<HashMap<String, i64>>,
}

impl TypingTracker {
    /// Returns true if a typing emit for this (room, user) is allowed now
    /// (at most one per second), and records the attempt either way.
    pub fn allow(&self, room_id: &str, user_id: &str) -> bool {
        let key = format!("{room_id}:{user_id}");
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.last.lock().unwrap();
        last.retain(|_, t| now - *t < 60_000);
        match last.get(&key) {
            Some(t) if now - *t < 1000 => false,
            _ => {
                last.insert(key, now);
                true
            }
        }
    }
}
