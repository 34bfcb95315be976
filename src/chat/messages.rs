use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AppError, AppResult, db};

/// One stored chat message. `seq` is the arrival order within the whole
/// log and never goes over the wire; it only breaks timestamp ties.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip)]
    pub seq: i64,
}

/// Appends to the conversation log and returns the stored record.
///
/// The stored timestamp is clamped to the conversation's current maximum,
/// so history order always matches append order even when the clock reads
/// the same millisecond twice or steps backwards.
pub async fn append(
    db_pool: &SqlitePool,
    conversation_id: Uuid,
    sender_id: Uuid,
    text: &str,
) -> AppResult<Message> {
    let body = text.trim();
    if body.is_empty() {
        return Err(AppError::InvalidMessage(
            "message text must not be empty".to_owned(),
        ));
    }

    if sqlx::query("SELECT 1 FROM conversations WHERE id = ?")
        .bind(conversation_id.to_string())
        .fetch_optional(db_pool)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("conversation"));
    }

    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO messages (id, conversation_id, sender_id, body, created_at)
         VALUES (?1, ?2, ?3, ?4, MAX(?5, COALESCE(
             (SELECT MAX(created_at) FROM messages WHERE conversation_id = ?2), 0)))",
    )
    .bind(id.to_string())
    .bind(conversation_id.to_string())
    .bind(sender_id.to_string())
    .bind(body)
    .bind(db::now_millis())
    .execute(db_pool)
    .await?;

    let row = sqlx::query_as(
        "SELECT seq, id, conversation_id, sender_id, body, created_at
         FROM messages WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_one(db_pool)
    .await?;

    from_row(row)
}

/// Full history of one conversation, oldest first. Unknown conversations
/// read as empty.
pub async fn list_by_conversation(
    db_pool: &SqlitePool,
    conversation_id: Uuid,
) -> AppResult<Vec<Message>> {
    let rows: Vec<(i64, String, String, String, String, i64)> = sqlx::query_as(
        "SELECT seq, id, conversation_id, sender_id, body, created_at
         FROM messages WHERE conversation_id = ? ORDER BY created_at, seq",
    )
    .bind(conversation_id.to_string())
    .fetch_all(db_pool)
    .await?;

    rows.into_iter().map(from_row).collect()
}

pub async fn get(db_pool: &SqlitePool, message_id: Uuid) -> AppResult<Option<Message>> {
    let Some(row) = sqlx::query_as(
        "SELECT seq, id, conversation_id, sender_id, body, created_at
         FROM messages WHERE id = ?",
    )
    .bind(message_id.to_string())
    .fetch_optional(db_pool)
    .await?
    else {
        return Ok(None);
    };

    from_row(row).map(Some)
}

fn from_row(
    (seq, id, conversation_id, sender_id, body, created_at): (i64, String, String, String, String, i64),
) -> AppResult<Message> {
    Ok(Message {
        id: db::parse_uuid(&id)?,
        conversation_id: db::parse_uuid(&conversation_id)?,
        sender_id: db::parse_uuid(&sender_id)?,
        body,
        created_at: db::millis_to_datetime(created_at)?,
        seq,
    })
}
