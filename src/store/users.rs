use crate::error::{AppError, AppResult};
use crate::models::{PublicUser, User};
use rusqlite::{params, Connection, OptionalExtension};

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        nickname: row.get(3)?,
        profile_image: row.get(4)?,
        status: row.get(5)?,
        status_message: row.get(6)?,
        session_token: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const SELECT_USER: &str = "SELECT id, username, password_hash, nickname, profile_image, status, status_message, session_token, created_at FROM users";

pub fn create(conn: &Connection, id: &str, username: &str, password_hash: &str, nickname: &str, now: &str) -> AppResult<User> {
    conn.execute(
        "INSERT INTO users (id, username, password_hash, nickname, status, created_at) VALUES (?1, ?2, ?3, ?4, 'offline', ?5)",
        params![id, username, password_hash, nickname, now],
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE") {
            AppError::Conflict("duplicate username".into())
        } else {
            AppError::Store(e)
        }
    })?;
    get_by_id(conn, id)?.ok_or_else(|| AppError::Store(rusqlite::Error::QueryReturnedNoRows))
}

pub fn get_by_id(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    Ok(conn
        .query_row(&format!("{SELECT_USER} WHERE id = ?1"), params![id], row_to_user)
        .optional()?)
}

pub fn get_by_username(conn: &Connection, username: &str) -> AppResult<Option<User>> {
    Ok(conn
        .query_row(&format!("{SELECT_USER} WHERE username = ?1"), params![username], row_to_user)
        .optional()?)
}

pub fn get_by_session_token(conn: &Connection, token: &str) -> AppResult<Option<User>> {
    Ok(conn
        .query_row(&format!("{SELECT_USER} WHERE session_token = ?1"), params![token], row_to_user)
        .optional()?)
}

pub fn list_all(conn: &Connection) -> AppResult<Vec<PublicUser>> {
    let mut stmt = conn.prepare(&format!("{SELECT_USER} ORDER BY username"))?;
    let rows = stmt
        .query_map([], row_to_user)?
        .filter_map(|r| r.ok())
        .map(|u| PublicUser::from(&u))
        .collect();
    Ok(rows)
}

pub fn list_online(conn: &Connection) -> AppResult<Vec<PublicUser>> {
    let mut stmt = conn.prepare(&format!("{SELECT_USER} WHERE status = 'online' ORDER BY username"))?;
    let rows = stmt
        .query_map([], row_to_user)?
        .filter_map(|r| r.ok())
        .map(|u| PublicUser::from(&u))
        .collect();
    Ok(rows)
}

/// Rotates `session_token` — the single source of truth for the
/// single-active-session policy. Logging in elsewhere overwrites this
/// value, invalidating every previously issued session cookie.
pub fn rotate_session_token(conn: &Connection, user_id: &str, token: &str) -> AppResult<()> {
    conn.execute("UPDATE users SET session_token = ?1 WHERE id = ?2", params![token, user_id])?;
    Ok(())
}

pub fn clear_session_token(conn: &Connection, user_id: &str) -> AppResult<()> {
    conn.execute("UPDATE users SET session_token = NULL WHERE id = ?1", params![user_id])?;
    Ok(())
}

pub fn set_status(conn: &Connection, user_id: &str, status: &str) -> AppResult<()> {
    conn.execute("UPDATE users SET status = ?1 WHERE id = ?2", params![status, user_id])?;
    Ok(())
}

pub fn update_profile(conn: &Connection, user_id: &str, nickname: Option<&str>, profile_image: Option<&str>, status_message: Option<&str>) -> AppResult<()> {
    if let Some(n) = nickname {
        conn.execute("UPDATE users SET nickname = ?1 WHERE id = ?2", params![n, user_id])?;
    }
    if let Some(img) = profile_image {
        conn.execute("UPDATE users SET profile_image = ?1 WHERE id = ?2", params![img, user_id])?;
    }
    if let Some(sm) = status_message {
        conn.execute("UPDATE users SET status_message = ?1 WHERE id = ?2", params![sm, user_id])?;
    }
    Ok(())
}

pub fn update_password_hash(conn: &Connection, user_id: &str, hash: &str) -> AppResult<()> {
    conn.execute("UPDATE users SET password_hash = ?1 WHERE id = ?2", params![hash, user_id])?;
    Ok(())
}

pub fn delete(conn: &Connection, user_id: &str) -> AppResult<()> {
    conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
    Ok(())
}
