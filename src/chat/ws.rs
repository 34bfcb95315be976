use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade, ws::WebSocket},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::chat::{
    broker::{self, ServerEvent},
    rooms::{ConnectionId, RoomRegistry},
};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub(crate) enum ClientEvent {
    Join {
        conversation_id: Uuid,
    },
    Leave {
        conversation_id: Uuid,
    },
    NewMessage {
        conversation_id: Uuid,
        sender_id: Uuid,
        message: MessageBody,
    },
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageBody {
    content: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    State(db_pool): State<SqlitePool>,
    State(rooms): State<RoomRegistry>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| handle_socket(stream, db_pool, rooms))
}

async fn handle_socket(stream: WebSocket, db_pool: SqlitePool, rooms: RoomRegistry) {
    let connection_id = ConnectionId::new();
    tracing::info!(%connection_id, "socket connected");

    let (queue, mut queued) = mpsc::unbounded_channel::<String>();
    let (mut sender, mut receiver) = stream.split();

    let forward_task = tokio::spawn(async move {
        while let Some(msg) = queued.recv().await {
            if sender.send(msg.into()).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Ok(event) = serde_json::from_slice(&msg.into_data()) else {
            tracing::debug!(%connection_id, "ignoring unparseable frame");
            continue;
        };

        match event {
            ClientEvent::Join { conversation_id } => {
                rooms.join(conversation_id, connection_id, queue.clone()).await;
            }
            ClientEvent::Leave { conversation_id } => {
                rooms.leave(conversation_id, connection_id).await;
            }
            ClientEvent::NewMessage {
                conversation_id,
                sender_id,
                message,
            } => {
                if let Err(err) =
                    broker::send(&db_pool, &rooms, conversation_id, sender_id, &message.content)
                        .await
                {
                    tracing::error!(%connection_id, %conversation_id, error = %err, "send failed");
                    let event = ServerEvent::Error {
                        message: err.to_string(),
                    };
                    if let Ok(payload) = serde_json::to_string(&event) {
                        let _ = queue.send(payload);
                    }
                }
            }
        }
    }

    rooms.leave_all(connection_id).await;
    forward_task.abort();
    tracing::info!(%connection_id, "socket disconnected");
}
