use crate::error::{AppError, AppResult};
use crate::models::{Poll, PollOption};
use rusqlite::{params, Connection, OptionalExtension};

fn options_for(conn: &Connection, poll_id: i64) -> AppResult<Vec<PollOption>> {
    let mut stmt = conn.prepare(
        "SELECT o.id, o.option_text, (SELECT COUNT(*) FROM poll_votes v WHERE v.option_id = o.id) as vote_count
         FROM poll_options o WHERE o.poll_id = ?1 ORDER BY o.id",
    )?;
    let rows = stmt
        .query_map(params![poll_id], |row| {
            Ok(PollOption { id: row.get(0)?, option_text: row.get(1)?, vote_count: row.get(2)? })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

#[allow(clippy::type_complexity)]
fn row_to_poll(_conn: &Connection, row: &rusqlite::Row) -> rusqlite::Result<(i64, String, String, String, bool, bool, bool, Option<String>, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get::<_, i64>(4)? != 0,
        row.get::<_, i64>(5)? != 0,
        row.get::<_, i64>(6)? != 0,
        row.get(7)?,
        row.get(8)?,
    ))
}

const SELECT_POLL: &str = "SELECT id, room_id, created_by, question, multiple_choice, anonymous, closed, ends_at, created_at FROM polls";

pub fn get(conn: &Connection, poll_id: i64) -> AppResult<Option<Poll>> {
    let base = conn
        .query_row(&format!("{SELECT_POLL} WHERE id = ?1"), params![poll_id], |row| row_to_poll(conn, row))
        .optional()?;
    match base {
        None => Ok(None),
        Some((id, room_id, created_by, question, multiple_choice, anonymous, closed, ends_at, created_at)) => {
            let options = options_for(conn, id)?;
            let total_voters: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT user_id) FROM poll_votes WHERE poll_id = ?1",
                params![id],
                |r| r.get(0),
            )?;
            Ok(Some(Poll { id, room_id, created_by, question, multiple_choice, anonymous, closed, ends_at, created_at, options, total_voters }))
        }
    }
}

pub fn require(conn: &Connection, poll_id: i64) -> AppResult<Poll> {
    get(conn, poll_id)?.ok_or_else(|| AppError::NotFound("poll not found".into()))
}

pub fn list(conn: &Connection, room_id: &str) -> AppResult<Vec<Poll>> {
    let mut stmt = conn.prepare(&format!("{SELECT_POLL} WHERE room_id = ?1 ORDER BY created_at DESC"))?;
    let ids: Vec<i64> = stmt.query_map(params![room_id], |r| r.get(0))?.filter_map(|r| r.ok()).collect();
    ids.into_iter().filter_map(|id| get(conn, id).transpose()).collect()
}

pub fn create(conn: &Connection, room_id: &str, created_by: &str, question: &str, options: &[String], multiple_choice: bool, anonymous: bool, ends_at: Option<&str>, now: &str) -> AppResult<Poll> {
    conn.execute(
        "INSERT INTO polls (room_id, created_by, question, multiple_choice, anonymous, closed, ends_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
        params![room_id, created_by, question, multiple_choice as i64, anonymous as i64, ends_at, now],
    )?;
    let poll_id = conn.last_insert_rowid();
    for opt in options {
        conn.execute("INSERT INTO poll_options (poll_id, option_text) VALUES (?1, ?2)", params![poll_id, opt])?;
    }
    require(conn, poll_id)
}

/// Enforces poll-option scope and not-closed. Single-choice votes
/// atomically replace the voter's prior vote in the same poll.
pub fn vote(conn: &Connection, poll_id: i64, option_ids: &[i64], user_id: &str, now: &str) -> AppResult<()> {
    let (closed, multiple_choice): (i64, i64) = conn
        .query_row("SELECT closed, multiple_choice FROM polls WHERE id = ?1", params![poll_id], |r| Ok((r.get(0)?, r.get(1)?)))
        .map_err(|_| AppError::NotFound("poll not found".into()))?;
    if closed != 0 {
        return Err(AppError::Validation("poll is closed".into()));
    }
    for oid in option_ids {
        let belongs: Option<i64> = conn
            .query_row("SELECT 1 FROM poll_options WHERE id = ?1 AND poll_id = ?2", params![oid, poll_id], |r| r.get(0))
            .optional()?;
        if belongs.is_none() {
            return Err(AppError::Validation("option does not belong to this poll".into()));
        }
    }
    if multiple_choice == 0 {
        conn.execute("DELETE FROM poll_votes WHERE poll_id = ?1 AND user_id = ?2", params![poll_id, user_id])?;
        if let Some(oid) = option_ids.first() {
            conn.execute(
                "INSERT INTO poll_votes (poll_id, option_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![poll_id, oid, user_id, now],
            )?;
        }
    } else {
        for oid in option_ids {
            conn.execute(
                "INSERT OR IGNORE INTO poll_votes (poll_id, option_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![poll_id, oid, user_id, now],
            )?;
        }
    }
    Ok(())
}

pub fn close(conn: &Connection, poll_id: i64) -> AppResult<()> {
    conn.execute("UPDATE polls SET closed = 1 WHERE id = ?1", params![poll_id])?;
    Ok(())
}

/// Maintenance loop: close polls whose `ends_at` has passed.
pub fn close_expired(conn: &Connection, now: &str) -> AppResult<i64> {
    Ok(conn.execute("UPDATE polls SET closed = 1 WHERE closed = 0 AND ends_at IS NOT NULL AND ends_at <= ?1", params![now])? as i64)
}
