use crate::error::AppResult;
use crate::models::ScanJobStatus;
use rusqlite::{params, Connection, OptionalExtension};

#[allow(clippy::too_many_arguments)]
pub fn insert(conn: &Connection, job_id: &str, user_id: &str, room_id: &str, temp_path: &str, final_path: &str, file_name: &str, file_type: &str, file_size: i64, now: &str) -> AppResult<()> {
    conn.execute(
        "INSERT INTO upload_scan_jobs (job_id, user_id, room_id, temp_path, final_path, file_name, file_type, file_size, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?9)",
        params![job_id, user_id, room_id, temp_path, final_path, file_name, file_type, file_size, now],
    )?;
    Ok(())
}

pub struct ScanJobRow {
    pub job_id: String,
    pub user_id: String,
    pub room_id: String,
    pub temp_path: String,
    pub final_path: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub status: String,
}

pub fn get(conn: &Connection, job_id: &str) -> AppResult<Option<ScanJobRow>> {
    Ok(conn
        .query_row(
            "SELECT job_id, user_id, room_id, temp_path, final_path, file_name, file_type, file_size, status FROM upload_scan_jobs WHERE job_id = ?1",
            params![job_id],
            |row| {
                Ok(ScanJobRow {
                    job_id: row.get(0)?,
                    user_id: row.get(1)?,
                    room_id: row.get(2)?,
                    temp_path: row.get(3)?,
                    final_path: row.get(4)?,
                    file_name: row.get(5)?,
                    file_type: row.get(6)?,
                    file_size: row.get(7)?,
                    status: row.get(8)?,
                })
            },
        )
        .optional()?)
}

pub fn status(conn: &Connection, job_id: &str) -> AppResult<Option<ScanJobStatus>> {
    Ok(conn
        .query_row(
            "SELECT job_id, status, result, token FROM upload_scan_jobs WHERE job_id = ?1",
            params![job_id],
            |row| Ok(ScanJobStatus { job_id: row.get(0)?, status: row.get(1)?, result: row.get(2)?, token: row.get(3)? }),
        )
        .optional()?)
}

pub fn update_status(conn: &Connection, job_id: &str, status: &str, result: Option<&str>, token: Option<&str>, now: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE upload_scan_jobs SET status = ?1, result = ?2, token = ?3, updated_at = ?4 WHERE job_id = ?5",
        params![status, result, token, now, job_id],
    )?;
    Ok(())
}

pub fn pending_job_ids(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT job_id FROM upload_scan_jobs WHERE status = 'pending' ORDER BY created_at")?;
    Ok(stmt.query_map([], |r| r.get(0))?.filter_map(|r| r.ok()).collect())
}
