use rusqlite::{Connection, params};
use std::sync::{Mutex, MutexGuard};

/// Default channel. Cannot be deleted or renamed.
pub const DEFAULT_CHANNEL: &str = "general";

/// Maximum number of decisions retained at once (§3 Decision).
pub const DECISION_CAP: i64 = 30;

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("failed to set pragmas");
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate();
        db
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS channels (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                sender TEXT NOT NULL,
                sender_type TEXT NOT NULL DEFAULT 'agent',
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                display_time TEXT NOT NULL,
                reply_to INTEGER,
                attachments TEXT,
                msg_type TEXT NOT NULL DEFAULT 'message',
                deleted INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_messages_channel_id ON messages(channel, id);
            CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender);

            CREATE TABLE IF NOT EXISTS pins (
                message_id INTEGER PRIMARY KEY REFERENCES messages(id) ON DELETE CASCADE,
                status TEXT NOT NULL CHECK (status IN ('todo', 'done'))
            );

            CREATE TABLE IF NOT EXISTS decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                text TEXT NOT NULL,
                reason TEXT,
                status TEXT NOT NULL CHECK (status IN ('proposed', 'approved')),
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS read_positions (
                agent TEXT NOT NULL,
                channel TEXT NOT NULL,
                last_read_id INTEGER NOT NULL,
                PRIMARY KEY (agent, channel)
            );",
        )
        .expect("failed to run migrations");

        // Seed the default channel if it doesn't exist.
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM channels WHERE name = ?1",
                params![DEFAULT_CHANNEL],
                |r| r.get(0),
            )
            .unwrap_or(0);
        if count == 0 {
            let now = chrono::Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO channels (name, created_at) VALUES (?1, ?2)",
                params![DEFAULT_CHANNEL, &now],
            )
            .ok();
        }
    }
}

/// Evict the oldest non-approved decision, if one exists. Returns its id.
pub fn evict_oldest_proposed(conn: &Connection) -> Option<i64> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM decisions WHERE status = 'proposed' ORDER BY id ASC LIMIT 1",
            [],
            |r| r.get(0),
        )
        .ok();
    if let Some(id) = id {
        conn.execute("DELETE FROM decisions WHERE id = ?1", params![id])
            .ok();
    }
    id
}
