use anyhow::Context;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AppResult;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('Student', 'Mentor')),
    description TEXT NOT NULL DEFAULT '',
    social_url TEXT NOT NULL DEFAULT '',
    profile_picture TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    user_lo TEXT NOT NULL,
    user_hi TEXT NOT NULL,
    last_message_id TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE (user_lo, user_hi)
);

CREATE TABLE IF NOT EXISTS messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    conversation_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_chats (
    user_id TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    UNIQUE (user_id, conversation_id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages (conversation_id, created_at, seq);
CREATE INDEX IF NOT EXISTS idx_conversations_user_lo ON conversations (user_lo);
CREATE INDEX IF NOT EXISTS idx_conversations_user_hi ON conversations (user_hi);
";

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await
}

pub async fn init(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(db_pool).await?;
    Ok(())
}

pub(crate) fn parse_uuid(value: &str) -> AppResult<Uuid> {
    Ok(Uuid::parse_str(value).context("malformed uuid column")?)
}

pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn millis_to_datetime(millis: i64) -> AppResult<OffsetDateTime> {
    Ok(
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .context("timestamp out of range")?,
    )
}

/// Single-connection in-memory database, so every statement sees the same data.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init(&db_pool).await.unwrap();
    db_pool
}
