use crate::error::AppResult;
use crate::models::ReactionSummary;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

/// Toggle semantics: presence ⇒ remove, absence ⇒ insert. Returns true if
/// the reaction is now present.
pub fn toggle(conn: &Connection, message_id: i64, user_id: &str, emoji: &str, now: &str) -> AppResult<bool> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
            params![message_id, user_id, emoji],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        conn.execute(
            "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
            params![message_id, user_id, emoji],
        )?;
        Ok(false)
    } else {
        conn.execute(
            "INSERT INTO reactions (message_id, user_id, emoji, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![message_id, user_id, emoji, now],
        )?;
        Ok(true)
    }
}

/// Per-emoji counts with the reacting user ids joined into one field.
pub fn for_message(conn: &Connection, message_id: i64) -> AppResult<Vec<ReactionSummary>> {
    let mut stmt = conn.prepare("SELECT emoji, user_id FROM reactions WHERE message_id = ?1 ORDER BY created_at")?;
    let mut by_emoji: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let rows = stmt.query_map(params![message_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
    for row in rows.filter_map(|r| r.ok()) {
        by_emoji.entry(row.0).or_default().push(row.1);
    }
    Ok(by_emoji
        .into_iter()
        .map(|(emoji, user_ids)| ReactionSummary { count: user_ids.len() as i64, emoji, user_ids })
        .collect())
}
