use crate::app_dirs::AppDirs;
use crate::audit::{AuditSink, AuthEvent, AuthEventKind, SecurityNotice};
use crate::error::Result;
use crate::pattern::TypingPattern;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

const PATTERN_KIND_MANUAL: &str = "manual";

// Fixed-width so text ordering matches time ordering
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// An enrolled pattern as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPattern {
    pub id: i64,
    pub customer_id: String,
    pub pattern: TypingPattern,
    pub quality: f64,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Per-customer storage of enrolled patterns. The newest one is authoritative.
pub trait PatternStore {
    fn save_pattern(&self, customer_id: &str, pattern: &TypingPattern, quality: f64) -> Result<i64>;
    fn latest_pattern(&self, customer_id: &str) -> Result<Option<StoredPattern>>;
    fn pattern_history(&self, customer_id: &str) -> Result<Vec<StoredPattern>>;
    fn has_pattern(&self, customer_id: &str) -> Result<bool>;
    fn clear_patterns(&self, customer_id: &str) -> Result<usize>;
}

/// SQLite-backed pattern store that also keeps the auth audit trail.
#[derive(Debug)]
pub struct SqlitePatternStore {
    conn: Connection,
}

impl SqlitePatternStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open the database under the state directory.
    pub fn open_default() -> Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("keyprint_patterns.db"));
        Self::open(path)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS typing_patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id TEXT NOT NULL,
                pattern TEXT NOT NULL,
                quality REAL NOT NULL,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_typing_patterns_customer
                ON typing_patterns(customer_id, created_at);

            CREATE TABLE IF NOT EXISTS auth_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id TEXT NOT NULL,
                event TEXT NOT NULL,
                score REAL,
                attempt_number INTEGER,
                detail TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_auth_events_customer
                ON auth_events(customer_id, created_at);

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    fn query_patterns(&self, customer_id: &str, limit: Option<u32>) -> Result<Vec<StoredPattern>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, customer_id, pattern, quality, kind, created_at
            FROM typing_patterns
            WHERE customer_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )?;

        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(i64::from).unwrap_or(-1);
        let rows = stmt.query_map(params![customer_id, limit], |row| {
            let pattern_json: String = row.get(2)?;
            let created_at: String = row.get(5)?;
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                pattern_json,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                created_at,
            ))
        })?;

        let mut patterns = Vec::new();
        for row in rows {
            let (id, customer_id, pattern_json, quality, kind, created_at) = row?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        5,
                        "created_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Utc);
            patterns.push(StoredPattern {
                id,
                customer_id,
                pattern: serde_json::from_str(&pattern_json)?,
                quality,
                kind,
                created_at,
            });
        }
        Ok(patterns)
    }

    pub fn record_auth_event(&self, event: &AuthEvent) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO auth_events
            (customer_id, event, score, attempt_number, detail, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                event.customer_id,
                event.kind.to_string(),
                event.score,
                event.attempt_number,
                event.detail,
                timestamp(&event.at),
            ],
        )?;
        Ok(())
    }

    /// Most recent audit entries for a customer, newest first.
    pub fn recent_auth_events(&self, customer_id: &str, limit: u32) -> Result<Vec<AuthEvent>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT customer_id, event, score, attempt_number, detail, created_at
            FROM auth_events
            WHERE customer_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![customer_id, limit], |row| {
            let event: String = row.get(1)?;
            let kind = AuthEventKind::from_db(&event).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(1, "event".to_string(), rusqlite::types::Type::Text)
            })?;
            let at: String = row.get(5)?;
            let at = DateTime::parse_from_rfc3339(&at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(5, "created_at".to_string(), rusqlite::types::Type::Text)
                })?
                .with_timezone(&Utc);

            Ok(AuthEvent {
                customer_id: row.get(0)?,
                kind,
                score: row.get(2)?,
                attempt_number: row.get(3)?,
                detail: row.get(4)?,
                at,
            })
        })?;

        let mut events = Vec::new();
        for ev in rows {
            events.push(ev?);
        }
        Ok(events)
    }

    pub fn notification_count(&self, customer_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE customer_id = ?1",
            [customer_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl PatternStore for SqlitePatternStore {
    fn save_pattern(&self, customer_id: &str, pattern: &TypingPattern, quality: f64) -> Result<i64> {
        let json = serde_json::to_string(pattern)?;
        self.conn.execute(
            r#"
            INSERT INTO typing_patterns (customer_id, pattern, quality, kind, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                customer_id,
                json,
                quality,
                PATTERN_KIND_MANUAL,
                timestamp(&Utc::now()),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn latest_pattern(&self, customer_id: &str) -> Result<Option<StoredPattern>> {
        Ok(self.query_patterns(customer_id, Some(1))?.into_iter().next())
    }

    fn pattern_history(&self, customer_id: &str) -> Result<Vec<StoredPattern>> {
        self.query_patterns(customer_id, None)
    }

    fn has_pattern(&self, customer_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM typing_patterns WHERE customer_id = ?1 LIMIT 1",
                [customer_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn clear_patterns(&self, customer_id: &str) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM typing_patterns WHERE customer_id = ?1", [customer_id])?;
        Ok(removed)
    }
}

impl AuditSink for SqlitePatternStore {
    fn record(&self, event: &AuthEvent) -> Result<()> {
        self.record_auth_event(event)
    }

    fn notify(&self, notice: &SecurityNotice) -> Result<()> {
        self.conn.execute(
            "INSERT INTO notifications (customer_id, title, body, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                notice.customer_id,
                notice.title,
                notice.body,
                timestamp(&notice.at),
            ],
        )?;
        Ok(())
    }
}
