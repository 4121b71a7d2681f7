use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// Owns the single SQLite connection: one pooled `Mutex<Connection>`,
/// WAL + foreign keys pragmas, and an idempotent additive migration run
/// at startup. The `Arc` lets the maintenance loop and the AV scan worker
/// hold their own handle to the same connection independent of Rocket's
/// request-scoped `&State` borrow.
#[derive(Clone)]
pub struct Db {
    pub conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("failed to set pragmas");
        let db = Db { conn: Arc::new(Mutex::new(conn)) };
        db.migrate();
        db
    }

    pub fn open_in_memory() -> Self {
        let conn = Connection::open_in_memory().expect("failed to open in-memory database");
        conn.execute_batch("PRAGMA foreign_keys=ON;").expect("failed to set pragmas");
        let db = Db { conn: Arc::new(Mutex::new(conn)) };
        db.migrate();
        db
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                nickname TEXT NOT NULL,
                profile_image TEXT,
                status TEXT NOT NULL DEFAULT 'offline',
                status_message TEXT,
                session_token TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sso_identities (
                provider TEXT NOT NULL,
                subject TEXT NOT NULL,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (provider, subject)
            );

            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                name TEXT,
                type TEXT NOT NULL DEFAULT 'group',
                created_by TEXT NOT NULL REFERENCES users(id),
                encryption_key TEXT NOT NULL,
                created_at TEXT NOT NULL,
                archived_at TEXT
            );

            CREATE TABLE IF NOT EXISTS room_members (
                room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                joined_at TEXT NOT NULL,
                last_read_message_id INTEGER NOT NULL DEFAULT 0,
                pinned INTEGER NOT NULL DEFAULT 0,
                muted INTEGER NOT NULL DEFAULT 0,
                role TEXT NOT NULL DEFAULT 'member',
                PRIMARY KEY (room_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_room_members_user ON room_members(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                sender_id TEXT NOT NULL REFERENCES users(id),
                content TEXT NOT NULL,
                encrypted INTEGER NOT NULL DEFAULT 1,
                message_type TEXT NOT NULL DEFAULT 'text',
                file_path TEXT,
                file_name TEXT,
                reply_to INTEGER,
                created_at TEXT NOT NULL,
                edited_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_messages_room_id ON messages(room_id, id);
            CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id);

            CREATE TABLE IF NOT EXISTS pinned_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                message_id INTEGER REFERENCES messages(id),
                content TEXT,
                pinned_by TEXT NOT NULL REFERENCES users(id),
                pinned_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pinned_room ON pinned_messages(room_id);

            CREATE TABLE IF NOT EXISTS polls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                created_by TEXT NOT NULL REFERENCES users(id),
                question TEXT NOT NULL,
                multiple_choice INTEGER NOT NULL DEFAULT 0,
                anonymous INTEGER NOT NULL DEFAULT 0,
                closed INTEGER NOT NULL DEFAULT 0,
                ends_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_polls_room ON polls(room_id);

            CREATE TABLE IF NOT EXISTS poll_options (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_id INTEGER NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
                option_text TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_poll_options_poll ON poll_options(poll_id);

            CREATE TABLE IF NOT EXISTS poll_votes (
                poll_id INTEGER NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
                option_id INTEGER NOT NULL REFERENCES poll_options(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id),
                created_at TEXT NOT NULL,
                PRIMARY KEY (poll_id, option_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS reactions (
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id),
                emoji TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id, emoji)
            );

            CREATE TABLE IF NOT EXISTS room_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                message_id INTEGER REFERENCES messages(id),
                file_path TEXT NOT NULL UNIQUE,
                file_name TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                file_type TEXT NOT NULL,
                uploaded_by TEXT NOT NULL REFERENCES users(id),
                uploaded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_room_files_room ON room_files(room_id);

            CREATE TABLE IF NOT EXISTS access_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                action TEXT NOT NULL,
                ip_address TEXT NOT NULL,
                user_agent TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_access_log_created ON access_log(created_at);

            CREATE TABLE IF NOT EXISTS admin_audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                actor_user_id TEXT NOT NULL REFERENCES users(id),
                target_user_id TEXT,
                action TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_admin_audit_room ON admin_audit_log(room_id);

            CREATE TABLE IF NOT EXISTS upload_scan_jobs (
                job_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                room_id TEXT NOT NULL REFERENCES rooms(id),
                temp_path TEXT NOT NULL,
                final_path TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                result TEXT,
                token TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )
        .expect("failed to run base migrations");

        // Additive, idempotent: every ALTER is wrapped so a rerun over an
        // already-migrated database is a no-op.
        conn.execute_batch("ALTER TABLE messages ADD COLUMN seq INTEGER;").ok();
        conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_messages_seq ON messages(seq);").ok();

        // FTS5 index over message content for `/api/search`.
        conn.execute_batch(
            "CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
                message_id UNINDEXED,
                content,
                tokenize='porter unicode61'
            );",
        )
        .expect("failed to create fts5 table");

        rebuild_fts_index(&conn);
    }
}

pub fn rebuild_fts_index(conn: &Connection) {
    conn.execute("DELETE FROM messages_fts", []).ok();
    conn.execute_batch(
        "INSERT INTO messages_fts (message_id, content) SELECT id, content FROM messages;",
    )
    .ok();
}

pub fn upsert_fts(conn: &Connection, message_id: i64) {
    conn.execute("DELETE FROM messages_fts WHERE message_id = ?1", [message_id]).ok();
    conn.execute(
        "INSERT INTO messages_fts (message_id, content) SELECT id, content FROM messages WHERE id = ?1",
        [message_id],
    )
    .ok();
}

pub fn delete_fts(conn: &Connection, message_id: i64) {
    conn.execute("DELETE FROM messages_fts WHERE message_id = ?1", [message_id]).ok();
}
