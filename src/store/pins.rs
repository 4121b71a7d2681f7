use crate::error::AppResult;
use crate::models::PinnedMessage;
use rusqlite::{params, Connection};

fn row_to_pin(row: &rusqlite::Row) -> rusqlite::Result<PinnedMessage> {
    Ok(PinnedMessage {
        id: row.get(0)?,
        room_id: row.get(1)?,
        message_id: row.get(2)?,
        content: row.get(3)?,
        pinned_by: row.get(4)?,
        pinned_at: row.get(5)?,
    })
}

const SELECT_PIN: &str = "SELECT id, room_id, message_id, content, pinned_by, pinned_at FROM pinned_messages";

pub fn create(conn: &Connection, room_id: &str, message_id: Option<i64>, content: Option<&str>, pinned_by: &str, now: &str) -> AppResult<PinnedMessage> {
    conn.execute(
        "INSERT INTO pinned_messages (room_id, message_id, content, pinned_by, pinned_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![room_id, message_id, content, pinned_by, now],
    )?;
    let id = conn.last_insert_rowid();
    Ok(conn.query_row(&format!("{SELECT_PIN} WHERE id = ?1"), params![id], row_to_pin)?)
}

pub fn list(conn: &Connection, room_id: &str) -> AppResult<Vec<PinnedMessage>> {
    let mut stmt = conn.prepare(&format!("{SELECT_PIN} WHERE room_id = ?1 ORDER BY pinned_at DESC"))?;
    Ok(stmt.query_map(params![room_id], row_to_pin)?.filter_map(|r| r.ok()).collect())
}

pub fn delete(conn: &Connection, room_id: &str, pin_id: i64) -> AppResult<bool> {
    let n = conn.execute("DELETE FROM pinned_messages WHERE id = ?1 AND room_id = ?2", params![pin_id, room_id])?;
    Ok(n > 0)
}
