//! Optional AV scan worker: consumes the pending scan queue, moves clean
//! files out of quarantine, mints an upload token when clean. Speaks
//! clamd's `INSTREAM` wire protocol directly since that's the de facto
//! standard a self-hosted deployment points `AV_CLAMD_HOST` at; no client
//! crate for it is in wide enough use to justify a dependency over ~30
//! lines of socket framing.

use crate::auth;
use crate::config::AppConfig;
use crate::db::Db;
use crate::models::UploadTokenPayload;
use crate::state_store::StateStore;
use crate::store;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

pub enum ScanVerdict {
    Clean,
    Infected(String),
    Error(String),
}

/// Streams the file to clamd in chunks framed as `<u32 len><bytes>`,
/// terminated by a zero-length chunk, then reads the one-line reply.
pub fn scan_file(config: &AppConfig, path: &Path) -> ScanVerdict {
    if !config.feature_av_scan_enabled {
        return ScanVerdict::Clean;
    }
    match scan_file_inner(config, path) {
        Ok(v) => v,
        Err(e) => ScanVerdict::Error(e),
    }
}

fn scan_file_inner(config: &AppConfig, path: &Path) -> Result<ScanVerdict, String> {
    let timeout = Duration::from_secs(config.av_scan_timeout_secs);
    let mut stream = TcpStream::connect((config.av_clamd_host.as_str(), config.av_clamd_port)).map_err(|e| e.to_string())?;
    stream.set_read_timeout(Some(timeout)).ok();
    stream.set_write_timeout(Some(timeout)).ok();
    stream.write_all(b"zINSTREAM\0").map_err(|e| e.to_string())?;

    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut buf = vec![0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| e.to_string())?;
        if n == 0 {
            break;
        }
        stream.write_all(&(n as u32).to_be_bytes()).map_err(|e| e.to_string())?;
        stream.write_all(&buf[..n]).map_err(|e| e.to_string())?;
    }
    stream.write_all(&0u32.to_be_bytes()).map_err(|e| e.to_string())?;

    let mut reply = String::new();
    stream.read_to_string(&mut reply).map_err(|e| e.to_string())?;
    let reply = reply.trim_end_matches('\0').trim();
    if reply.contains("FOUND") {
        Ok(ScanVerdict::Infected(reply.to_string()))
    } else if reply.contains("OK") {
        Ok(ScanVerdict::Clean)
    } else {
        Err(format!("unexpected clamd reply: {reply}"))
    }
}

/// Polls `upload_scan_jobs` for pending rows and scans each in turn.
/// Runs for the lifetime of the process; a single in-flight scan per tick
/// is enough since this is a self-hosted single-instance deployment, not
/// a queue serving concurrent workers.
pub async fn spawn_worker(db: Db, state_store: StateStore, config: AppConfig) {
    if !config.feature_av_scan_enabled {
        return;
    }
    loop {
        tokio::time::sleep(Duration::from_secs(3)).await;
        let job_ids = {
            let conn = db.conn.lock().unwrap();
            match store::scan_jobs::pending_job_ids(&conn) {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::error!(error = ?e, "failed to list pending scan jobs");
                    continue;
                }
            }
        };
        for job_id in job_ids {
            process_job(&db, &state_store, &config, &job_id).await;
        }
    }
}

async fn process_job(db: &Db, state_store: &StateStore, config: &AppConfig, job_id: &str) {
    let job = {
        let conn = db.conn.lock().unwrap();
        match store::scan_jobs::get(&conn, job_id) {
            Ok(Some(j)) => j,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(error = ?e, job_id, "failed to load scan job");
                return;
            }
        }
    };

    let temp_path = job.temp_path.clone();
    let cfg = config.clone();
    let verdict = tokio::task::spawn_blocking(move || scan_file(&cfg, Path::new(&temp_path)))
        .await
        .unwrap_or_else(|e| ScanVerdict::Error(format!("scan task panicked: {e}")));

    match verdict {
        ScanVerdict::Clean => {
            let moved = tokio::fs::rename(&job.temp_path, &job.final_path).await.is_ok();
            if !moved {
                let conn = db.conn.lock().unwrap();
                let _ = store::scan_jobs::update_status(&conn, job_id, "error", Some("failed to move scanned file"), None, &now());
                return;
            }
            let token = auth::random_token();
            let payload = UploadTokenPayload {
                user_id: job.user_id.clone(),
                room_id: job.room_id.clone(),
                file_path: job.final_path.clone(),
                file_name: job.file_name.clone(),
                file_type: job.file_type.clone(),
                file_size: job.file_size,
                expires_at: (chrono::Utc::now() + chrono::Duration::minutes(5)).to_rfc3339(),
            };
            state_store.set_json(&format!("upload_token:{token}"), &payload, Some(Duration::from_secs(300))).await;
            let conn = db.conn.lock().unwrap();
            let _ = store::scan_jobs::update_status(&conn, job_id, "clean", None, Some(&token), &now());
        }
        ScanVerdict::Infected(reason) => {
            let _ = tokio::fs::remove_file(&job.temp_path).await;
            let conn = db.conn.lock().unwrap();
            let _ = store::scan_jobs::update_status(&conn, job_id, "infected", Some(&reason), None, &now());
        }
        ScanVerdict::Error(reason) => {
            let conn = db.conn.lock().unwrap();
            let _ = store::scan_jobs::update_status(&conn, job_id, "error", Some(&reason), None, &now());
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
