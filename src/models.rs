use serde::{Deserialize, Serialize};

fn default_false() -> bool { false }
fn default_true() -> bool { true }

// ---------- Users ----------

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(skip)]
    pub session_token: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        PublicUser {
            id: u.id.clone(),
            username: u.username.clone(),
            nickname: u.nickname.clone(),
            profile_image: u.profile_image.clone(),
            status: u.status.clone(),
            status_message: u.status_message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: PublicUser,
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

// ---------- Rooms ----------

#[derive(Debug, Serialize, Clone)]
pub struct Room {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub room_type: String,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct RoomWithMembers {
    #[serde(flatten)]
    pub room: Room,
    pub members: Vec<PublicUser>,
    pub my_role: String,
    pub last_read_message_id: i64,
    pub pinned: bool,
    pub muted: bool,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRoomRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct InviteMembersRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetAdminRequest {
    pub user_id: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct LeaveRoomResponse {
    pub left: bool,
    pub already_left: bool,
}

// ---------- Messages ----------

#[derive(Debug, Serialize, Clone)]
pub struct Message {
    pub id: i64,
    /// Monotonic counter independent of `id` reuse in cursor pagination;
    /// currently set equal to `id` at insert time since rowids already
    /// never repeat, but kept distinct so a future resequencing (e.g.
    /// message import) doesn't have to renumber `id` itself.
    pub seq: i64,
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub encrypted: bool,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<i64>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
    /// Present on listing endpoints only (populated via the O(n log m)
    /// sorted-cursor binary search, not a per-message join).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default = "default_text_type")]
    pub message_type: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reply_to: Option<i64>,
    #[serde(default)]
    pub encrypted: Option<bool>,
    #[serde(default)]
    pub upload_token: Option<String>,
}

fn default_text_type() -> String { "text".to_string() }

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
    pub total: i64,
    pub limit: i64,
    pub has_more: bool,
}

// ---------- Pins ----------

#[derive(Debug, Serialize, Clone)]
pub struct PinnedMessage {
    pub id: i64,
    pub room_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub pinned_by: String,
    pub pinned_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePinRequest {
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
}

// ---------- Polls ----------

#[derive(Debug, Serialize, Clone)]
pub struct PollOption {
    pub id: i64,
    pub option_text: String,
    pub vote_count: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct Poll {
    pub id: i64,
    pub room_id: String,
    pub created_by: String,
    pub question: String,
    pub multiple_choice: bool,
    pub anonymous: bool,
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    pub created_at: String,
    pub options: Vec<PollOption>,
    pub total_voters: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default = "default_false")]
    pub multiple_choice: bool,
    #[serde(default = "default_false")]
    pub anonymous: bool,
    #[serde(default)]
    pub ends_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VotePollRequest {
    pub option_ids: Vec<i64>,
}

// ---------- Reactions ----------

#[derive(Debug, Serialize, Clone)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: i64,
    pub user_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddReactionRequest {
    pub emoji: String,
}

// ---------- Files / uploads ----------

#[derive(Debug, Serialize, Clone)]
pub struct RoomFile {
    pub id: i64,
    pub room_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    pub uploaded_by: String,
    pub uploaded_at: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct UploadTokenPayload {
    pub user_id: String,
    pub room_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub expires_at: String,
}

impl<'de> Deserialize<'de> for UploadTokenPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            user_id: String,
            room_id: String,
            file_path: String,
            file_name: String,
            file_type: String,
            file_size: i64,
            expires_at: String,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(UploadTokenPayload {
            user_id: raw.user_id,
            room_id: raw.room_id,
            file_path: raw.file_path,
            file_name: raw.file_name,
            file_type: raw.file_type,
            file_size: raw.file_size,
            expires_at: raw.expires_at,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "scan_status")]
pub enum UploadResponse {
    #[serde(rename = "clean")]
    Clean { upload_token: String, file_path: String, file_name: String, file_type: String },
    #[serde(rename = "pending")]
    Pending { job_id: String },
}

#[derive(Debug, Serialize, Clone)]
pub struct ScanJobStatus {
    pub job_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

// ---------- Audit ----------

#[derive(Debug, Serialize, Clone)]
pub struct AdminAuditLogEntry {
    pub id: i64,
    pub room_id: String,
    pub actor_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,
    pub action: String,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

// ---------- Search ----------

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Message>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
    pub has_more: bool,
}

// ---------- Presence / typing (realtime DTOs) ----------

#[derive(Debug, Serialize, Clone)]
pub struct PresenceEntry {
    pub user_id: String,
    pub connected_at: String,
}

#[derive(Debug, Deserialize)]
pub struct TypingNotification {
    #[serde(default = "default_true")]
    pub is_typing: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReadPositionRequest {
    pub message_id: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct ConfigSnapshot {
    pub max_content_length: u64,
    pub oidc_enabled: bool,
    pub av_scan_enabled: bool,
}
