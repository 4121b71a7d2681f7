//! Upload pipeline: multipart intake, optional AV scan hop through
//! quarantine, upload-token mint, and the gated `/uploads/<path>` file
//! server. Rocket's `TempFile` form guard does the streaming-to-disk and
//! size-limit enforcement the teacher's base64-in-JSON handler didn't need,
//! since file bytes never pass through a JSON body here.

use crate::auth::{self, AuthUser};
use crate::config::AppConfig;
use crate::crypto;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::models::{ScanJobStatus, UploadResponse, UploadTokenPayload};
use crate::state_store::StateStore;
use crate::store;
use rocket::form::Form;
use rocket::fs::{NamedFile, TempFile};
use rocket::serde::json::Json;
use rocket::{get, post, FromForm, Request, State};
use std::path::{Path, PathBuf};
use std::time::Duration;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

fn classify(extension: &str) -> &'static str {
    if IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()) {
        "image"
    } else {
        "file"
    }
}

fn timestamped_name(original: &str) -> String {
    let safe = crypto::secure_filename(original);
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let rand_hex = hex::encode(rand::random::<[u8; 4]>());
    format!("{stamp}_{rand_hex}_{safe}")
}

fn extension_of(name: &str) -> String {
    Path::new(name).extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase()
}

#[derive(FromForm)]
pub struct UploadForm<'r> {
    pub file: TempFile<'r>,
    pub room_id: String,
}

/// Multipart intake: validates membership, the declared size against the
/// configured max, the file's magic-number signature, then either writes
/// straight through (scanning disabled) or quarantines pending a scan.
#[post("/api/upload", data = "<form>")]
pub async fn upload_file(
    db: &State<Db>,
    config: &State<AppConfig>,
    state_store: &State<StateStore>,
    req: &Request<'_>,
    auth: AuthUser,
    mut form: Form<UploadForm<'_>>,
) -> AppResult<Json<UploadResponse>> {
    auth::check_csrf(req)?;
    {
        let conn = db.conn.lock().unwrap();
        auth::require_member(&conn, &form.room_id, &auth.0.id)?;
    }

    let declared_len = form.file.len();
    if declared_len > config.max_content_length {
        return Err(AppError::PayloadTooLarge);
    }

    let original_name = form.file.raw_name().map(|n| n.dangerous_unsafe_unsanitized_raw().to_string()).unwrap_or_else(|| "upload".to_string());
    let extension = extension_of(&original_name);
    let file_type = classify(&extension);
    let final_name = timestamped_name(&original_name);

    let uploads_root = PathBuf::from(&config.uploads_dir);
    let quarantine_dir = uploads_root.join("quarantine");
    tokio::fs::create_dir_all(&uploads_root).await.map_err(|e| AppError::External(format!("cannot create uploads dir: {e}")))?;

    if config.feature_av_scan_enabled {
        tokio::fs::create_dir_all(&quarantine_dir).await.map_err(|e| AppError::External(format!("cannot create quarantine dir: {e}")))?;
        let temp_path = quarantine_dir.join(&final_name);
        form.file.persist_to(&temp_path).await.map_err(|e| AppError::External(format!("upload write failed: {e}")))?;

        if !signature_ok(&extension, &temp_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(AppError::Validation("file content does not match its extension".into()));
        }

        let final_path = uploads_root.join(&final_name);
        let job_id = super::new_id();
        let conn = db.conn.lock().unwrap();
        store::scan_jobs::insert(
            &conn,
            &job_id,
            &auth.0.id,
            &form.room_id,
            temp_path.to_string_lossy().as_ref(),
            final_path.to_string_lossy().as_ref(),
            &final_name,
            file_type,
            declared_len as i64,
            &super::now(),
        )?;
        drop(conn);

        // Picked up by the background scan worker spawned at boot
        // (`avscan::spawn_worker`); this handler only enqueues the row.
        return Ok(Json(UploadResponse::Pending { job_id }));
    }

    let final_path = uploads_root.join(&final_name);
    form.file.persist_to(&final_path).await.map_err(|e| AppError::External(format!("upload write failed: {e}")))?;
    if !signature_ok(&extension, &final_path).await {
        let _ = tokio::fs::remove_file(&final_path).await;
        return Err(AppError::Validation("file content does not match its extension".into()));
    }

    let file_size = tokio::fs::metadata(&final_path).await.map(|m| m.len() as i64).unwrap_or(declared_len as i64);
    let path_str = final_path.to_string_lossy().to_string();
    let token = mint_upload_token(state_store, &auth.0.id, &form.room_id, &path_str, &final_name, file_type, file_size).await;

    Ok(Json(UploadResponse::Clean { upload_token: token, file_path: path_str, file_name: final_name, file_type: file_type.to_string() }))
}

async fn signature_ok(extension: &str, path: &Path) -> bool {
    let Ok(bytes) = tokio::fs::read(path).await else { return false };
    crypto::file_signature_ok(extension, &bytes[..bytes.len().min(64)])
}

async fn mint_upload_token(state_store: &StateStore, user_id: &str, room_id: &str, file_path: &str, file_name: &str, file_type: &str, file_size: i64) -> String {
    let token = auth::random_token();
    let payload = UploadTokenPayload {
        user_id: user_id.to_string(),
        room_id: room_id.to_string(),
        file_path: file_path.to_string(),
        file_name: file_name.to_string(),
        file_type: file_type.to_string(),
        file_size,
        expires_at: (chrono::Utc::now() + chrono::Duration::minutes(5)).to_rfc3339(),
    };
    state_store.set_json(&format!("upload_token:{token}"), &payload, Some(Duration::from_secs(300))).await;
    token
}

#[get("/api/upload/jobs/<job_id>")]
pub fn upload_job_status(db: &State<Db>, auth: AuthUser, job_id: &str) -> AppResult<Json<ScanJobStatus>> {
    let conn = db.conn.lock().unwrap();
    let job = store::scan_jobs::get(&conn, job_id)?.ok_or_else(|| AppError::NotFound("scan job not found".into()))?;
    if job.user_id != auth.0.id {
        return Err(AppError::AuthZ("not the owner of this upload".into()));
    }
    let status = store::scan_jobs::status(&conn, job_id)?.ok_or_else(|| AppError::NotFound("scan job not found".into()))?;
    Ok(Json(status))
}

/// Gated static file server: profile images are open to any authenticated
/// user, room files require membership in the owning room, and the
/// resolved path must stay inside the uploads root regardless of what the
/// request path contains.
#[get("/uploads/<path..>")]
pub async fn serve_upload(db: &State<Db>, config: &State<AppConfig>, auth: AuthUser, path: PathBuf) -> AppResult<NamedFile> {
    let uploads_root = std::fs::canonicalize(&config.uploads_dir).map_err(|_| AppError::NotFound("uploads directory missing".into()))?;
    let requested = uploads_root.join(&path);
    let resolved = tokio::fs::canonicalize(&requested).await.map_err(|_| AppError::NotFound("file not found".into()))?;
    if !resolved.starts_with(&uploads_root) {
        return Err(AppError::NotFound("file not found".into()));
    }

    let path_str = resolved.to_string_lossy().to_string();
    let conn = db.conn.lock().unwrap();
    if let Some(file) = store::files::by_path(&conn, &path_str)? {
        auth::require_member(&conn, &file.room_id, &auth.0.id)?;
    }
    drop(conn);

    NamedFile::open(&resolved).await.map_err(|_| AppError::NotFound("file not found".into()))
}
