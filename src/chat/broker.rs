use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AppError, AppResult, users};
use crate::chat::{conversations, messages, rooms::RoomRegistry};

/// A stored message joined with its sender's display data, as pushed to
/// room members.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub sender: users::store::UserSummary,
}

/// Events the server pushes over the live channel.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    MessageReceived(EnrichedMessage),
    Error { message: String },
}

/// Persists the message, then fans it out to the room. Persistence comes
/// first: a message is never announced before it is durable, and a failed
/// append announces nothing.
pub async fn send(
    db_pool: &SqlitePool,
    rooms: &RoomRegistry,
    conversation_id: Uuid,
    sender_id: Uuid,
    text: &str,
) -> AppResult<EnrichedMessage> {
    if conversation_id.is_nil() || sender_id.is_nil() {
        return Err(AppError::InvalidMessage(
            "conversation and sender ids are required".to_owned(),
        ));
    }
    if text.trim().is_empty() {
        return Err(AppError::InvalidMessage(
            "message text must not be empty".to_owned(),
        ));
    }

    let message = messages::append(db_pool, conversation_id, sender_id, text).await?;

    // Listing staleness is tolerable; a lost message is not.
    if let Err(err) = conversations::set_last_message(db_pool, conversation_id, message.id).await {
        tracing::warn!(%conversation_id, error = %err, "last-message pointer not updated");
    }

    let sender = users::store::summary(db_pool, sender_id)
        .await?
        .unwrap_or_else(users::store::fallback_summary);

    let enriched = EnrichedMessage {
        id: message.id,
        conversation_id: message.conversation_id,
        sender_id: message.sender_id,
        body: message.body,
        created_at: message.created_at,
        sender,
    };

    let payload = serde_json::to_string(&ServerEvent::MessageReceived(enriched.clone()))?;
    let delivered = rooms.broadcast(conversation_id, &payload).await;
    tracing::debug!(
        message_id = %enriched.id,
        %conversation_id,
        delivered,
        "message fanned out"
    );

    Ok(enriched)
}
