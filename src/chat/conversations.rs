use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AppError, AppResult, chat::messages, db, users};

/// A pairwise thread between two users. `participants` is stored as an
/// unordered pair, so lookups are insensitive to who initiated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub last_message_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A conversation as listed for one user, with participant display data
/// and the latest message attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: Uuid,
    pub participants: Vec<Participant>,
    pub last_message: Option<messages::Message>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    pub profile_picture: String,
    pub role: Option<users::store::Role>,
}

/// Returns the conversation between the two users, creating it if it does
/// not exist yet. Safe to call concurrently: the unordered pair is unique,
/// so racing callers all land on the same row.
pub async fn find_or_create(
    db_pool: &SqlitePool,
    user_a: Uuid,
    user_b: Uuid,
) -> AppResult<Conversation> {
    if user_a.is_nil() || user_b.is_nil() {
        return Err(AppError::InvalidMessage(
            "both participant ids are required".to_owned(),
        ));
    }
    if user_a == user_b {
        return Err(AppError::InvalidMessage(
            "a conversation needs two distinct participants".to_owned(),
        ));
    }

    let (user_lo, user_hi) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };

    sqlx::query(
        "INSERT INTO conversations (id, user_lo, user_hi, created_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (user_lo, user_hi) DO NOTHING",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(user_lo.to_string())
    .bind(user_hi.to_string())
    .bind(db::now_millis())
    .execute(db_pool)
    .await?;

    let row: (String, String, String, Option<String>, i64) = sqlx::query_as(
        "SELECT id, user_lo, user_hi, last_message_id, created_at
         FROM conversations WHERE user_lo = ? AND user_hi = ?",
    )
    .bind(user_lo.to_string())
    .bind(user_hi.to_string())
    .fetch_one(db_pool)
    .await?;

    from_row(row)
}

pub async fn get(db_pool: &SqlitePool, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
    let Some(row) = sqlx::query_as(
        "SELECT id, user_lo, user_hi, last_message_id, created_at
         FROM conversations WHERE id = ?",
    )
    .bind(conversation_id.to_string())
    .fetch_optional(db_pool)
    .await?
    else {
        return Ok(None);
    };

    from_row(row).map(Some)
}

pub async fn set_last_message(
    db_pool: &SqlitePool,
    conversation_id: Uuid,
    message_id: Uuid,
) -> AppResult<()> {
    let result = sqlx::query("UPDATE conversations SET last_message_id = ? WHERE id = ?")
        .bind(message_id.to_string())
        .bind(conversation_id.to_string())
        .execute(db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("conversation"));
    }
    Ok(())
}

/// Every conversation the user takes part in, with display data for both
/// sides. Order is by creation time, so repeated calls agree.
pub async fn list_for_user(
    db_pool: &SqlitePool,
    user_id: Uuid,
) -> AppResult<Vec<ConversationView>> {
    let rows: Vec<(String, String, String, Option<String>, i64)> = sqlx::query_as(
        "SELECT id, user_lo, user_hi, last_message_id, created_at
         FROM conversations WHERE ? IN (user_lo, user_hi) ORDER BY created_at, id",
    )
    .bind(user_id.to_string())
    .fetch_all(db_pool)
    .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let conversation = from_row(row)?;

        let mut participants = Vec::with_capacity(2);
        for participant_id in conversation.participants {
            participants.push(participant(db_pool, participant_id).await?);
        }

        let last_message = match conversation.last_message_id {
            Some(message_id) => messages::get(db_pool, message_id).await?,
            None => None,
        };

        views.push(ConversationView {
            id: conversation.id,
            participants,
            last_message,
            created_at: conversation.created_at,
        });
    }
    Ok(views)
}

async fn participant(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Participant> {
    let summary = users::store::summary(db_pool, user_id)
        .await?
        .unwrap_or_else(users::store::fallback_summary);

    Ok(Participant {
        id: user_id,
        name: summary.name,
        profile_picture: summary.profile_picture,
        role: summary.role,
    })
}

fn from_row(
    (id, user_lo, user_hi, last_message_id, created_at): (String, String, String, Option<String>, i64),
) -> AppResult<Conversation> {
    Ok(Conversation {
        id: db::parse_uuid(&id)?,
        participants: [db::parse_uuid(&user_lo)?, db::parse_uuid(&user_hi)?],
        last_message_id: last_message_id.as_deref().map(db::parse_uuid).transpose()?,
        created_at: db::millis_to_datetime(created_at)?,
    })
}
