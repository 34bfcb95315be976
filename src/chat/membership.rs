use sqlx::SqlitePool;
use uuid::Uuid;

use crate::AppResult;
use crate::chat::conversations::{self, Conversation};

/// Guarantees the pair has a conversation to talk in before any message
/// flows.
pub async fn ensure_conversation(
    db_pool: &SqlitePool,
    user_a: Uuid,
    user_b: Uuid,
) -> AppResult<Conversation> {
    conversations::find_or_create(db_pool, user_a, user_b).await
}

/// Records the conversation in both users' chat lists. Set semantics:
/// linking twice leaves a single entry, and ids without a user row are
/// skipped rather than left dangling.
pub async fn link_to_users(
    db_pool: &SqlitePool,
    conversation_id: Uuid,
    user_a: Uuid,
    user_b: Uuid,
) -> AppResult<()> {
    link_one(db_pool, user_a, conversation_id).await?;
    link_one(db_pool, user_b, conversation_id).await?;
    Ok(())
}

async fn link_one(db_pool: &SqlitePool, user_id: Uuid, conversation_id: Uuid) -> AppResult<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO user_chats (user_id, conversation_id)
         SELECT ?1, ?2 WHERE EXISTS (SELECT 1 FROM users WHERE id = ?1)",
    )
    .bind(user_id.to_string())
    .bind(conversation_id.to_string())
    .execute(db_pool)
    .await?;
    Ok(())
}
