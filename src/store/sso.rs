use crate::error::AppResult;
use rusqlite::{params, Connection, OptionalExtension};

pub fn find_user_id(conn: &Connection, provider: &str, subject: &str) -> AppResult<Option<String>> {
    Ok(conn
        .query_row("SELECT user_id FROM sso_identities WHERE provider = ?1 AND subject = ?2", params![provider, subject], |r| r.get(0))
        .optional()?)
}

pub fn link(conn: &Connection, provider: &str, subject: &str, user_id: &str) -> AppResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO sso_identities (provider, subject, user_id) VALUES (?1, ?2, ?3)",
        params![provider, subject, user_id],
    )?;
    Ok(())
}
