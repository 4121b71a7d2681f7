use crate::error::{AppError, AppResult};
use crate::models::{PublicUser, Room, RoomWithMembers};
use rusqlite::{params, Connection, OptionalExtension};

fn row_to_room(row: &rusqlite::Row) -> rusqlite::Result<Room> {
    Ok(Room {
        id: row.get(0)?,
        name: row.get(1)?,
        room_type: row.get(2)?,
        created_by: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const SELECT_ROOM: &str = "SELECT id, name, type, created_by, created_at FROM rooms";

pub fn get(conn: &Connection, room_id: &str) -> AppResult<Option<Room>> {
    Ok(conn
        .query_row(&format!("{SELECT_ROOM} WHERE id = ?1"), params![room_id], row_to_room)
        .optional()?)
}

pub fn require(conn: &Connection, room_id: &str) -> AppResult<Room> {
    get(conn, room_id)?.ok_or_else(|| AppError::NotFound("room not found".into()))
}

/// Direct-room dedup: returns the existing room id if one already
/// connects these two users, so starting a DM twice reuses the same room.
pub fn find_direct_room(conn: &Connection, user_a: &str, user_b: &str) -> AppResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT r.id FROM rooms r
             JOIN room_members m1 ON m1.room_id = r.id AND m1.user_id = ?1
             JOIN room_members m2 ON m2.room_id = r.id AND m2.user_id = ?2
             WHERE r.type = 'direct'
             LIMIT 1",
            params![user_a, user_b],
            |row| row.get(0),
        )
        .optional()?)
}

#[allow(clippy::too_many_arguments)]
pub fn create(
    conn: &Connection,
    id: &str,
    name: Option<&str>,
    room_type: &str,
    created_by: &str,
    encryption_key: &str,
    now: &str,
    member_ids: &[&str],
) -> AppResult<()> {
    conn.execute(
        "INSERT INTO rooms (id, name, type, created_by, encryption_key, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, name, room_type, created_by, encryption_key, now],
    )?;
    for uid in member_ids {
        let role = if *uid == created_by { "admin" } else { "member" };
        conn.execute(
            "INSERT INTO room_members (room_id, user_id, joined_at, role) VALUES (?1, ?2, ?3, ?4)",
            params![id, uid, now, role],
        )?;
    }
    Ok(())
}

pub fn is_member(conn: &Connection, room_id: &str, user_id: &str) -> AppResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM room_members WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

pub fn is_admin(conn: &Connection, room_id: &str, user_id: &str) -> AppResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM room_members WHERE room_id = ?1 AND user_id = ?2 AND role = 'admin'",
            params![room_id, user_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

pub fn member_ids(conn: &Connection, room_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT user_id FROM room_members WHERE room_id = ?1")?;
    let rows = stmt.query_map(params![room_id], |r| r.get(0))?.filter_map(|r| r.ok()).collect();
    Ok(rows)
}

pub fn member_public_users(conn: &Connection, room_id: &str) -> AppResult<Vec<PublicUser>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.nickname, u.profile_image, u.status, u.status_message
         FROM room_members m JOIN users u ON u.id = m.user_id WHERE m.room_id = ?1 ORDER BY m.joined_at",
    )?;
    let rows = stmt
        .query_map(params![room_id], |row| {
            Ok(PublicUser {
                id: row.get(0)?,
                username: row.get(1)?,
                nickname: row.get(2)?,
                profile_image: row.get(3)?,
                status: row.get(4)?,
                status_message: row.get(5)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// All `last_read_message_id`s for the room's members, sorted so the
/// caller can binary-search instead of joining per message.
pub fn member_read_cursors(conn: &Connection, room_id: &str) -> AppResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT last_read_message_id FROM room_members WHERE room_id = ?1")?;
    let mut rows: Vec<i64> = stmt.query_map(params![room_id], |r| r.get(0))?.filter_map(|r| r.ok()).collect();
    rows.sort_unstable();
    Ok(rows)
}

pub fn with_members(conn: &Connection, room_id: &str, viewer_id: &str) -> AppResult<RoomWithMembers> {
    let room = require(conn, room_id)?;
    let members = member_public_users(conn, room_id)?;
    let (role, last_read, pinned, muted): (String, i64, i64, i64) = conn.query_row(
        "SELECT role, last_read_message_id, pinned, muted FROM room_members WHERE room_id = ?1 AND user_id = ?2",
        params![room_id, viewer_id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
    )?;
    let unread_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE room_id = ?1 AND id > ?2 AND sender_id != ?3",
        params![room_id, last_read, viewer_id],
        |r| r.get(0),
    )?;
    Ok(RoomWithMembers {
        room,
        members,
        my_role: role,
        last_read_message_id: last_read,
        pinned: pinned != 0,
        muted: muted != 0,
        unread_count,
    })
}

pub fn room_ids_for_user(conn: &Connection, user_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT room_id FROM room_members WHERE user_id = ?1")?;
    Ok(stmt.query_map(params![user_id], |r| r.get(0))?.filter_map(|r| r.ok()).collect())
}

pub fn list_for_user(conn: &Connection, user_id: &str) -> AppResult<Vec<RoomWithMembers>> {
    let room_ids = room_ids_for_user(conn, user_id)?;
    room_ids.into_iter().map(|rid| with_members(conn, &rid, user_id)).collect()
}

pub fn add_members(conn: &Connection, room_id: &str, user_ids: &[&str], now: &str) -> AppResult<()> {
    for uid in user_ids {
        conn.execute(
            "INSERT OR IGNORE INTO room_members (room_id, user_id, joined_at, role) VALUES (?1, ?2, ?3, 'member')",
            params![room_id, uid, now],
        )?;
    }
    conn.execute("UPDATE rooms SET archived_at = NULL WHERE id = ?1", params![room_id])?;
    Ok(())
}

/// Idempotent leave with the admin invariant: if the leaving member was
/// the last admin, the earliest-joined remaining member is promoted
/// atomically with the leave so the room is never left without one.
pub fn leave(conn: &Connection, room_id: &str, user_id: &str) -> AppResult<bool> {
    let was_member = is_member(conn, room_id, user_id)?;
    if !was_member {
        return Ok(false);
    }
    let was_admin = is_admin(conn, room_id, user_id)?;
    conn.execute("DELETE FROM room_members WHERE room_id = ?1 AND user_id = ?2", params![room_id, user_id])?;
    if was_admin {
        let remaining_admin = is_admin_any(conn, room_id)?;
        if !remaining_admin {
            conn.execute(
                "UPDATE room_members SET role = 'admin' WHERE room_id = ?1 AND user_id = (
                    SELECT user_id FROM room_members WHERE room_id = ?1 ORDER BY joined_at LIMIT 1
                )",
                params![room_id],
            )?;
        }
    }
    Ok(true)
}

fn is_admin_any(conn: &Connection, room_id: &str) -> AppResult<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM room_members WHERE room_id = ?1 AND role = 'admin' LIMIT 1", params![room_id], |_| Ok(()))
        .optional()?
        .is_some())
}

pub fn kick(conn: &Connection, room_id: &str, user_id: &str) -> AppResult<()> {
    leave(conn, room_id, user_id)?;
    Ok(())
}

pub fn rename(conn: &Connection, room_id: &str, name: &str) -> AppResult<()> {
    conn.execute("UPDATE rooms SET name = ?1 WHERE id = ?2", params![name, room_id])?;
    Ok(())
}

pub fn set_admin(conn: &Connection, room_id: &str, user_id: &str, is_admin: bool) -> AppResult<()> {
    let role = if is_admin { "admin" } else { "member" };
    conn.execute("UPDATE room_members SET role = ?1 WHERE room_id = ?2 AND user_id = ?3", params![role, room_id, user_id])?;
    Ok(())
}

pub fn set_pinned(conn: &Connection, room_id: &str, user_id: &str, pinned: bool) -> AppResult<()> {
    conn.execute(
        "UPDATE room_members SET pinned = ?1 WHERE room_id = ?2 AND user_id = ?3",
        params![pinned as i64, room_id, user_id],
    )?;
    Ok(())
}

pub fn set_muted(conn: &Connection, room_id: &str, user_id: &str, muted: bool) -> AppResult<()> {
    conn.execute(
        "UPDATE room_members SET muted = ?1 WHERE room_id = ?2 AND user_id = ?3",
        params![muted as i64, room_id, user_id],
    )?;
    Ok(())
}

/// `last_read_message_id` only ever advances; an out-of-order or stale
/// read receipt can never move the cursor backwards.
pub fn advance_read(conn: &Connection, room_id: &str, user_id: &str, message_id: i64) -> AppResult<()> {
    conn.execute(
        "UPDATE room_members SET last_read_message_id = MAX(last_read_message_id, ?1) WHERE room_id = ?2 AND user_id = ?3",
        params![message_id, room_id, user_id],
    )?;
    Ok(())
}

pub fn last_read(conn: &Connection, room_id: &str, user_id: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT last_read_message_id FROM room_members WHERE room_id = ?1 AND user_id = ?2",
        params![room_id, user_id],
        |r| r.get(0),
    )?)
}

pub fn admins(conn: &Connection, room_id: &str) -> AppResult<Vec<PublicUser>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.nickname, u.profile_image, u.status, u.status_message
         FROM room_members m JOIN users u ON u.id = m.user_id WHERE m.room_id = ?1 AND m.role = 'admin'",
    )?;
    let rows = stmt
        .query_map(params![room_id], |row| {
            Ok(PublicUser {
                id: row.get(0)?,
                username: row.get(1)?,
                nickname: row.get(2)?,
                profile_image: row.get(3)?,
                status: row.get(4)?,
                status_message: row.get(5)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Maintenance loop, first pass: a room with zero members is archived
/// rather than deleted immediately, giving admins a grace window to
/// notice and re-invite before `hard_delete_archived` removes it.
pub fn archive_empty_rooms(conn: &Connection, now: &str) -> AppResult<i64> {
    Ok(conn.execute(
        "UPDATE rooms SET archived_at = ?1
         WHERE archived_at IS NULL
           AND id NOT IN (SELECT DISTINCT room_id FROM room_members)",
        params![now],
    )? as i64)
}

/// Maintenance loop, second pass: rooms archived before the cutoff are
/// deleted outright.
pub fn hard_delete_archived(conn: &Connection, cutoff: &str) -> AppResult<i64> {
    Ok(conn.execute("DELETE FROM rooms WHERE archived_at IS NOT NULL AND archived_at < ?1", params![cutoff])? as i64)
}
