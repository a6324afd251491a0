mod calendar;
mod chats;
mod directory;
mod messages;
mod notifications;

use anyhow::Result;
use rusqlite::Connection;
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Single SQLite database holding the directory, conversations, calendar and
/// notification tables. Cloning shares the connection.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Connection>>,
}

impl Store {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db = Connection::open(path)?;
        info!("Opened database at {}", path.display());
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.db.lock().await.execute_batch(sql)?;
        Ok(())
    }

    fn with_connection(db: Connection) -> Result<Self> {
        db.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&db)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }
}

fn init_schema(db: &Connection) -> Result<()> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS organizations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS roles (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL REFERENCES organizations(id),
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            system_prompt TEXT,
            prompt_file TEXT,
            model_name TEXT,
            agent_type TEXT NOT NULL DEFAULT 'simple',
            agent_config TEXT NOT NULL DEFAULT 'null',
            tool_names TEXT NOT NULL DEFAULT '[]',
            is_active INTEGER NOT NULL DEFAULT 1,
            UNIQUE(org_id, code)
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL REFERENCES organizations(id),
            username TEXT NOT NULL,
            display_name TEXT,
            role_id TEXT REFERENCES roles(id),
            is_system_persona INTEGER NOT NULL DEFAULT 0,
            UNIQUE(org_id, username)
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS chats (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL REFERENCES organizations(id),
            kind TEXT NOT NULL,
            name TEXT,
            participants TEXT NOT NULL DEFAULT '[]',
            created_by TEXT,
            last_message_at DATETIME,
            created_at DATETIME NOT NULL
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            chat_id TEXT NOT NULL REFERENCES chats(id),
            sender_kind TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            content TEXT NOT NULL,
            mentions TEXT NOT NULL DEFAULT '[]',
            reply_to_id TEXT,
            ai_validated INTEGER NOT NULL DEFAULT 0,
            ai_edited INTEGER NOT NULL DEFAULT 0,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )",
        [],
    )?;
    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, seq)",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS calendar_events (
            id TEXT PRIMARY KEY,
            role_id TEXT NOT NULL,
            org_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            kind TEXT NOT NULL,
            scheduled_at DATETIME,
            cron_expression TEXT,
            next_trigger_at DATETIME,
            last_triggered_at DATETIME,
            trigger_count INTEGER NOT NULL DEFAULT 0,
            created_by_user_id TEXT,
            source_chat_id TEXT,
            source_message_id TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME NOT NULL
        )",
        [],
    )?;
    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_calendar_due ON calendar_events(is_active, next_trigger_at)",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS notification_channels (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            org_id TEXT NOT NULL,
            channel_kind TEXT NOT NULL,
            config TEXT NOT NULL DEFAULT '{}',
            is_enabled INTEGER NOT NULL DEFAULT 1,
            is_verified INTEGER NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            UNIQUE(user_id, channel_kind)
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS notification_log (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL,
            channel_kind TEXT NOT NULL,
            event_id TEXT,
            role_id TEXT,
            content TEXT NOT NULL,
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at DATETIME NOT NULL,
            sent_at DATETIME
        )",
        [],
    )?;

    Ok(())
}

/// Reads a JSON-encoded TEXT column.
fn json_column<T: DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads a TEXT column holding one of an enum's `as_str` values.
fn enum_column<T>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unexpected value '{}'", raw).into(),
        )
    })
}
