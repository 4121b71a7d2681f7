//! Background maintenance loop: runs every `maintenance_interval_seconds`
//! and performs the housekeeping passes that have no natural request to
//! hang off of — expired polls, stale access-log rows, empty-room
//! archival/hard-delete, and (if retention is configured) old message and
//! file deletion.

use crate::config::AppConfig;
use crate::db::Db;

pub async fn spawn_loop(db: Db, config: AppConfig) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(config.maintenance_interval_seconds));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        run_pass(&db, &config).await;
    }
}

async fn run_pass(db: &Db, config: &AppConfig) {
    let now = chrono::Utc::now();
    let now_str = now.to_rfc3339();

    let conn = db.conn.lock().unwrap();

    match crate::store::polls::close_expired(&conn, &now_str) {
        Ok(n) if n > 0 => tracing::info!(closed = n, "maintenance: closed expired polls"),
        Ok(_) => {}
        Err(e) => tracing::error!(error = ?e, "maintenance: close_expired failed"),
    }

    // Access log rows older than 90 days are pruned regardless of the
    // retention setting; they're diagnostic, not user content.
    let access_log_cutoff = (now - chrono::Duration::days(90)).to_rfc3339();
    match crate::store::audit::trim_access_log(&conn, &access_log_cutoff) {
        Ok(n) if n > 0 => tracing::info!(trimmed = n, "maintenance: trimmed access log"),
        Ok(_) => {}
        Err(e) => tracing::error!(error = ?e, "maintenance: trim_access_log failed"),
    }

    match crate::store::rooms::archive_empty_rooms(&conn, &now_str) {
        Ok(n) if n > 0 => tracing::info!(archived = n, "maintenance: archived empty rooms"),
        Ok(_) => {}
        Err(e) => tracing::error!(error = ?e, "maintenance: archive_empty_rooms failed"),
    }
    let archive_cutoff = (now - chrono::Duration::days(7)).to_rfc3339();
    match crate::store::rooms::hard_delete_archived(&conn, &archive_cutoff) {
        Ok(n) if n > 0 => tracing::info!(deleted = n, "maintenance: hard-deleted archived rooms"),
        Ok(_) => {}
        Err(e) => tracing::error!(error = ?e, "maintenance: hard_delete_archived failed"),
    }

    if config.retention_days > 0 {
        let retention_cutoff = (now - chrono::Duration::days(config.retention_days)).to_rfc3339();

        match crate::store::files::delete_older_than(&conn, &retention_cutoff) {
            Ok(victims) => {
                for f in &victims {
                    if let Err(e) = remove_under_root(&config.uploads_dir, &f.file_path) {
                        tracing::warn!(error = %e, file_path = %f.file_path, "maintenance: failed to unlink retained file");
                    }
                }
                if !victims.is_empty() {
                    tracing::info!(deleted = victims.len(), "maintenance: deleted files past retention");
                }
            }
            Err(e) => tracing::error!(error = ?e, "maintenance: delete_older_than (files) failed"),
        }

        match crate::store::messages::delete_older_than(&conn, &retention_cutoff) {
            Ok(n) if n > 0 => tracing::info!(deleted = n, "maintenance: deleted messages past retention"),
            Ok(_) => {}
            Err(e) => tracing::error!(error = ?e, "maintenance: delete_older_than (messages) failed"),
        }
    }
}

/// Refuses to unlink anything that doesn't resolve inside the uploads
/// root, mirroring the same containment check the upload file server uses.
fn remove_under_root(uploads_dir: &str, file_path: &str) -> std::io::Result<()> {
    let root = std::fs::canonicalize(uploads_dir)?;
    let target = std::path::Path::new(file_path);
    let resolved = if target.is_absolute() { std::fs::canonicalize(target)? } else { std::fs::canonicalize(root.join(target))? };
    if !resolved.starts_with(&root) {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "path escapes uploads root"));
    }
    std::fs::remove_file(resolved)
}
