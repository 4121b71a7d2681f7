use crate::error::{AppError, AppResult};
use crate::models::Message;
use rusqlite::{params, Connection, OptionalExtension};

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    Ok(Message {
        id,
        seq: row.get::<_, Option<i64>>(1)?.unwrap_or(id),
        room_id: row.get(2)?,
        sender_id: row.get(3)?,
        content: row.get(4)?,
        encrypted: row.get::<_, i64>(5)? != 0,
        message_type: row.get(6)?,
        file_path: row.get(7)?,
        file_name: row.get(8)?,
        reply_to: row.get(9)?,
        created_at: row.get(10)?,
        edited_at: row.get(11)?,
        unread_count: None,
    })
}

const SELECT_MESSAGE: &str =
    "SELECT id, seq, room_id, sender_id, content, encrypted, message_type, file_path, file_name, reply_to, created_at, edited_at FROM messages";

pub fn get(conn: &Connection, id: i64) -> AppResult<Option<Message>> {
    Ok(conn.query_row(&format!("{SELECT_MESSAGE} WHERE id = ?1"), params![id], row_to_message).optional()?)
}

pub fn require(conn: &Connection, id: i64) -> AppResult<Message> {
    get(conn, id)?.ok_or_else(|| AppError::NotFound("message not found".into()))
}

#[allow(clippy::too_many_arguments)]
pub fn insert(
    conn: &Connection,
    room_id: &str,
    sender_id: &str,
    content: &str,
    encrypted: bool,
    message_type: &str,
    file_path: Option<&str>,
    file_name: Option<&str>,
    reply_to: Option<i64>,
    now: &str,
) -> AppResult<Message> {
    // A dangling reply_to is tolerated on read (the original message may
    // since have been deleted) but the row must reference a message in
    // the same room at write time.
    if let Some(rid) = reply_to {
        let ok: Option<i64> = conn
            .query_row("SELECT 1 FROM messages WHERE id = ?1 AND room_id = ?2", params![rid, room_id], |r| r.get(0))
            .optional()?;
        if ok.is_none() {
            return Err(AppError::Validation("reply_to must reference a message in the same room".into()));
        }
    }
    conn.execute(
        "INSERT INTO messages (room_id, sender_id, content, encrypted, message_type, file_path, file_name, reply_to, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![room_id, sender_id, content, encrypted as i64, message_type, file_path, file_name, reply_to, now],
    )?;
    let id = conn.last_insert_rowid();
    conn.execute("UPDATE messages SET seq = ?1 WHERE id = ?1", params![id])?;
    crate::db::upsert_fts(conn, id);
    require(conn, id)
}

pub fn edit(conn: &Connection, id: i64, content: &str, now: &str) -> AppResult<Message> {
    conn.execute("UPDATE messages SET content = ?1, edited_at = ?2 WHERE id = ?3", params![content, now, id])?;
    crate::db::upsert_fts(conn, id);
    require(conn, id)
}

/// Tombstone delete: content replaced with a marker, `encrypted=0`, file
/// references cleared; the row is never removed so reply chains stay valid.
pub fn tombstone(conn: &Connection, id: i64, now: &str) -> AppResult<Message> {
    conn.execute(
        "UPDATE messages SET content = '[deleted]', encrypted = 0, file_path = NULL, file_name = NULL, edited_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    crate::db::delete_fts(conn, id);
    require(conn, id)
}

/// Paginated listing by `before_id`, with an O(n log m) unread-count pass:
/// sort the room's member read-cursors once, then binary-search per
/// message instead of an O(n*m) join.
pub fn list(conn: &Connection, room_id: &str, before_id: Option<i64>, limit: i64) -> AppResult<(Vec<Message>, i64, bool)> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM messages WHERE room_id = ?1", params![room_id], |r| r.get(0))?;

    let mut stmt = match before_id {
        Some(_) => conn.prepare(&format!("{SELECT_MESSAGE} WHERE room_id = ?1 AND id < ?2 ORDER BY id DESC LIMIT ?3"))?,
        None => conn.prepare(&format!("{SELECT_MESSAGE} WHERE room_id = ?1 ORDER BY id DESC LIMIT ?2"))?,
    };
    // fetch one extra row to compute has_more without a second count query
    let fetch_limit = limit + 1;
    let mut rows: Vec<Message> = match before_id {
        Some(b) => stmt
            .query_map(params![room_id, b, fetch_limit], row_to_message)?
            .filter_map(|r| r.ok())
            .collect(),
        None => stmt.query_map(params![room_id, fetch_limit], row_to_message)?.filter_map(|r| r.ok()).collect(),
    };
    let has_more = rows.len() as i64 > limit;
    rows.truncate(limit.max(0) as usize);
    rows.reverse();

    let cursors = crate::store::rooms::member_read_cursors(conn, room_id)?;
    for m in rows.iter_mut() {
        m.unread_count = Some(unread_count_for(&cursors, m.id, &m.sender_id, conn, room_id)?);
    }

    Ok((rows, total, has_more))
}

/// Binary-search count of members whose cursor is strictly behind
/// `message_id`, excluding the sender.
fn unread_count_for(sorted_cursors: &[i64], message_id: i64, sender_id: &str, conn: &Connection, room_id: &str) -> AppResult<i64> {
    let idx = sorted_cursors.partition_point(|&c| c < message_id);
    let mut count = idx as i64;
    // the sender's own cursor, if it happens to sit below message_id, must not count
    let sender_cursor: Option<i64> = conn
        .query_row(
            "SELECT last_read_message_id FROM room_members WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, sender_id],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(sc) = sender_cursor
        && sc < message_id
    {
        count -= 1;
    }
    Ok(count.max(0))
}

/// Same computation used directly by the realtime send-message path, for
/// a single freshly-inserted message.
pub fn unread_count_for_new_message(conn: &Connection, room_id: &str, message_id: i64, sender_id: &str) -> AppResult<i64> {
    let cursors = crate::store::rooms::member_read_cursors(conn, room_id)?;
    unread_count_for(&cursors, message_id, sender_id, conn, room_id)
}

/// Always scoped to rooms `user_id` is a member of, regardless of whether
/// the caller also asked to filter to one specific `room_id` — mirrors
/// the grounding source's `JOIN room_members rm ... WHERE rm.user_id = ?`,
/// which runs unconditionally rather than only when a room is named.
pub fn search(conn: &Connection, user_id: &str, room_id: Option<&str>, query: &str, offset: i64, limit: i64) -> AppResult<(Vec<Message>, i64, bool)> {
    let sql_total = match room_id {
        Some(_) => {
            "SELECT COUNT(*) FROM messages_fts f JOIN messages m ON m.id = f.message_id \
             JOIN room_members rm ON rm.room_id = m.room_id \
             WHERE f.content MATCH ?1 AND rm.user_id = ?2 AND m.room_id = ?3"
        }
        None => {
            "SELECT COUNT(*) FROM messages_fts f JOIN messages m ON m.id = f.message_id \
             JOIN room_members rm ON rm.room_id = m.room_id \
             WHERE f.content MATCH ?1 AND rm.user_id = ?2"
        }
    };
    let total: i64 = match room_id {
        Some(rid) => conn.query_row(sql_total, params![query, user_id, rid], |r| r.get(0)).unwrap_or(0),
        None => conn.query_row(sql_total, params![query, user_id], |r| r.get(0)).unwrap_or(0),
    };

    let sql = match room_id {
        Some(_) => format!(
            "SELECT {cols} FROM messages_fts f JOIN messages m ON m.id = f.message_id \
             JOIN room_members rm ON rm.room_id = m.room_id \
             WHERE f.content MATCH ?1 AND rm.user_id = ?2 AND m.room_id = ?3 \
             ORDER BY m.id DESC LIMIT ?4 OFFSET ?5",
            cols = select_cols_prefixed("m")
        ),
        None => format!(
            "SELECT {cols} FROM messages_fts f JOIN messages m ON m.id = f.message_id \
             JOIN room_members rm ON rm.room_id = m.room_id \
             WHERE f.content MATCH ?1 AND rm.user_id = ?2 \
             ORDER BY m.id DESC LIMIT ?3 OFFSET ?4",
            cols = select_cols_prefixed("m")
        ),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<Message> = match room_id {
        Some(rid) => stmt
            .query_map(params![query, user_id, rid, limit, offset], row_to_message)?
            .filter_map(|r| r.ok())
            .collect(),
        None => stmt
            .query_map(params![query, user_id, limit, offset], row_to_message)?
            .filter_map(|r| r.ok())
            .collect(),
    };
    let has_more = offset + (rows.len() as i64) < total;
    Ok((rows, total, has_more))
}

/// Retention sweep: hard-deletes messages older than `cutoff`, dropping
/// their FTS entries too. Unlike a user-facing delete this is a real row
/// removal — old content is gone, not tombstoned.
pub fn delete_older_than(conn: &Connection, cutoff: &str) -> AppResult<i64> {
    let ids: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT id FROM messages WHERE created_at < ?1")?;
        stmt.query_map(params![cutoff], |r| r.get(0))?.filter_map(|r| r.ok()).collect()
    };
    for id in &ids {
        crate::db::delete_fts(conn, *id);
    }
    conn.execute("DELETE FROM messages WHERE created_at < ?1", params![cutoff])?;
    Ok(ids.len() as i64)
}

fn select_cols_prefixed(alias: &str) -> String {
    ["id", "seq", "room_id", "sender_id", "content", "encrypted", "message_type", "file_path", "file_name", "reply_to", "created_at", "edited_at"]
        .iter()
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}
