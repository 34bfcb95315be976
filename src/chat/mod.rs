pub mod broker;
pub mod conversations;
pub mod membership;
pub mod messages;
pub mod rooms;
mod ws;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppResult, AppState};
pub use broker::{EnrichedMessage, ServerEvent};
pub use rooms::{ConnectionId, RoomRegistry};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/conversation", post(create_conversation))
        .route("/api/chat/addToUsers", post(add_to_users))
        .route("/api/chat/mychats/{user_id}", get(my_chats))
        .route("/api/chat/messages/{conversation_id}", get(conversation_messages))
        .route("/ws", get(ws::chat_ws))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateConversation {
    sender_id: Uuid,
    receiver_id: Uuid,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_conversation(
    State(db_pool): State<SqlitePool>,
    Json(CreateConversation {
        sender_id,
        receiver_id,
    }): Json<CreateConversation>,
) -> AppResult<Json<conversations::Conversation>> {
    let conversation = membership::ensure_conversation(&db_pool, sender_id, receiver_id).await?;
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddToUsers {
    conversation_id: Uuid,
    user_id: Uuid,
    mentor_id: Uuid,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn add_to_users(
    State(db_pool): State<SqlitePool>,
    Json(AddToUsers {
        conversation_id,
        user_id,
        mentor_id,
    }): Json<AddToUsers>,
) -> AppResult<Json<Value>> {
    membership::link_to_users(&db_pool, conversation_id, user_id, mentor_id).await?;
    Ok(Json(json!({ "message": "Conversation added to users" })))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn my_chats(
    State(db_pool): State<SqlitePool>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<conversations::ConversationView>>> {
    Ok(Json(conversations::list_for_user(&db_pool, user_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn conversation_messages(
    State(db_pool): State<SqlitePool>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<Vec<messages::Message>>> {
    Ok(Json(
        messages::list_by_conversation(&db_pool, conversation_id).await?,
    ))
}
