use crate::error::{AppError, AppResult};
use crate::models::RoomFile;
use rusqlite::{params, Connection, OptionalExtension};

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<RoomFile> {
    Ok(RoomFile {
        id: row.get(0)?,
        room_id: row.get(1)?,
        message_id: row.get(2)?,
        file_path: row.get(3)?,
        file_name: row.get(4)?,
        file_size: row.get(5)?,
        file_type: row.get(6)?,
        uploaded_by: row.get(7)?,
        uploaded_at: row.get(8)?,
    })
}

const SELECT_FILE: &str = "SELECT id, room_id, message_id, file_path, file_name, file_size, file_type, uploaded_by, uploaded_at FROM room_files";

#[allow(clippy::too_many_arguments)]
pub fn create(conn: &Connection, room_id: &str, message_id: Option<i64>, file_path: &str, file_name: &str, file_size: i64, file_type: &str, uploaded_by: &str, now: &str) -> AppResult<RoomFile> {
    conn.execute(
        "INSERT INTO room_files (room_id, message_id, file_path, file_name, file_size, file_type, uploaded_by, uploaded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![room_id, message_id, file_path, file_name, file_size, file_type, uploaded_by, now],
    )?;
    let id = conn.last_insert_rowid();
    Ok(conn.query_row(&format!("{SELECT_FILE} WHERE id = ?1"), params![id], row_to_file)?)
}

pub fn get(conn: &Connection, file_id: i64) -> AppResult<Option<RoomFile>> {
    Ok(conn.query_row(&format!("{SELECT_FILE} WHERE id = ?1"), params![file_id], row_to_file).optional()?)
}

pub fn require(conn: &Connection, file_id: i64) -> AppResult<RoomFile> {
    get(conn, file_id)?.ok_or_else(|| AppError::NotFound("file not found".into()))
}

pub fn by_path(conn: &Connection, file_path: &str) -> AppResult<Option<RoomFile>> {
    Ok(conn.query_row(&format!("{SELECT_FILE} WHERE file_path = ?1"), params![file_path], row_to_file).optional()?)
}

pub fn list(conn: &Connection, room_id: &str) -> AppResult<Vec<RoomFile>> {
    let mut stmt = conn.prepare(&format!("{SELECT_FILE} WHERE room_id = ?1 ORDER BY uploaded_at DESC"))?;
    Ok(stmt.query_map(params![room_id], row_to_file)?.filter_map(|r| r.ok()).collect())
}

pub fn delete(conn: &Connection, file_id: i64) -> AppResult<()> {
    conn.execute("DELETE FROM room_files WHERE id = ?1", params![file_id])?;
    Ok(())
}

/// Retention sweep: files uploaded before the horizon. Returns the
/// deleted rows so the caller can unlink the corresponding disk objects.
pub fn delete_older_than(conn: &Connection, cutoff: &str) -> AppResult<Vec<RoomFile>> {
    let victims: Vec<RoomFile> = {
        let mut stmt = conn.prepare(&format!("{SELECT_FILE} WHERE uploaded_at < ?1"))?;
        stmt.query_map(params![cutoff], row_to_file)?.filter_map(|r| r.ok()).collect()
    };
    for f in &victims {
        conn.execute("DELETE FROM room_files WHERE id = ?1", params![f.id])?;
    }
    Ok(victims)
}
