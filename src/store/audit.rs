use crate::error::AppResult;
use crate::models::AdminAuditLogEntry;
use rusqlite::{params, Connection};

pub fn log_access(conn: &Connection, user_id: Option<&str>, action: &str, ip: &str, user_agent: &str, now: &str) -> AppResult<()> {
    let ua: String = user_agent.chars().take(500).collect();
    conn.execute(
        "INSERT INTO access_log (user_id, action, ip_address, user_agent, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, action, ip, ua, now],
    )?;
    Ok(())
}

pub fn log_admin_action(conn: &Connection, room_id: &str, actor_user_id: &str, target_user_id: Option<&str>, action: &str, metadata: &serde_json::Value, now: &str) -> AppResult<()> {
    conn.execute(
        "INSERT INTO admin_audit_log (room_id, actor_user_id, target_user_id, action, metadata, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![room_id, actor_user_id, target_user_id, action, metadata.to_string(), now],
    )?;
    Ok(())
}

pub fn list_for_room(conn: &Connection, room_id: &str) -> AppResult<Vec<AdminAuditLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, room_id, actor_user_id, target_user_id, action, metadata, created_at FROM admin_audit_log WHERE room_id = ?1 ORDER BY id DESC",
    )?;
    let rows = stmt
        .query_map(params![room_id], |row| {
            let metadata_str: String = row.get(5)?;
            Ok(AdminAuditLogEntry {
                id: row.get(0)?,
                room_id: row.get(1)?,
                actor_user_id: row.get(2)?,
                target_user_id: row.get(3)?,
                action: row.get(4)?,
                metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::json!({})),
                created_at: row.get(6)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Maintenance loop: trims `access_log` rows past the configured horizon.
pub fn trim_access_log(conn: &Connection, cutoff: &str) -> AppResult<i64> {
    Ok(conn.execute("DELETE FROM access_log WHERE created_at < ?1", params![cutoff])? as i64)
}
