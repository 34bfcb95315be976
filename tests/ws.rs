use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mentorlink::chat::{RoomRegistry, conversations, messages};
use mentorlink::users::store::{self, NewUser, Role};
use mentorlink::{AppState, db};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::protocol::Message};
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (String, SqlitePool, RoomRegistry) {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::init(&db_pool).await.unwrap();

    let rooms = RoomRegistry::new();
    let app = mentorlink::app(AppState {
        db_pool: db_pool.clone(),
        rooms: rooms.clone(),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr.to_string(), db_pool, rooms)
}

async fn connect(addr: &str) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    socket
}

async fn make_user(db_pool: &SqlitePool, name: &str, role: Role) -> Uuid {
    store::create(
        db_pool,
        NewUser {
            name: name.to_owned(),
            role,
            description: String::new(),
            social_url: String::new(),
            profile_picture: None,
        },
    )
    .await
    .unwrap()
    .id
}

async fn send_json(socket: &mut Socket, value: Value) {
    socket.send(Message::Text(value.to_string())).await.unwrap();
}

async fn recv_json(socket: &mut Socket) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("timed out waiting for frame")
        .expect("socket closed")
        .expect("socket errored");
    match frame {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    }
}

async fn assert_silent(socket: &mut Socket) {
    let waited = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(waited.is_err(), "expected no frame, got {waited:?}");
}

/// Joins and disconnects are handled on the server's schedule, so give the
/// registry a moment to settle before asserting on it.
async fn wait_for_members(rooms: &RoomRegistry, conversation_id: Uuid, expected: usize) {
    for _ in 0..50 {
        if rooms.member_count(conversation_id).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let stuck_at = rooms.member_count(conversation_id).await;
    panic!("room held {stuck_at} members, expected {expected}");
}

fn join_frame(conversation_id: Uuid) -> Value {
    json!({ "type": "join", "conversationId": conversation_id })
}

fn message_frame(conversation_id: Uuid, sender_id: Uuid, content: &str) -> Value {
    json!({
        "type": "newMessage",
        "conversationId": conversation_id,
        "senderId": sender_id,
        "message": { "content": content },
    })
}

#[tokio::test]
async fn joined_sockets_receive_persisted_messages() {
    let (addr, db_pool, _) = spawn_server().await;
    let student = make_user(&db_pool, "Ada", Role::Student).await;
    let mentor = make_user(&db_pool, "Grace", Role::Mentor).await;
    let conversation = conversations::find_or_create(&db_pool, student, mentor)
        .await
        .unwrap();

    let mut ada = connect(&addr).await;
    send_json(&mut ada, join_frame(conversation.id)).await;
    send_json(&mut ada, message_frame(conversation.id, student, "hello Grace")).await;

    let frame = recv_json(&mut ada).await;
    assert_eq!(frame["type"], "messageReceived");
    assert_eq!(frame["body"], "hello Grace");
    assert_eq!(frame["sender"]["name"], "Ada");
    assert_eq!(frame["sender"]["role"], "Student");

    let mut grace = connect(&addr).await;
    send_json(&mut grace, join_frame(conversation.id)).await;
    send_json(&mut grace, message_frame(conversation.id, mentor, "hello Ada")).await;

    let reply = recv_json(&mut grace).await;
    assert_eq!(reply["body"], "hello Ada");
    let echoed = recv_json(&mut ada).await;
    assert_eq!(echoed["body"], "hello Ada");
    assert_eq!(echoed["sender"]["name"], "Grace");

    let history = messages::list_by_conversation(&db_pool, conversation.id)
        .await
        .unwrap();
    let bodies: Vec<&str> = history.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["hello Grace", "hello Ada"]);
}

#[tokio::test]
async fn delivery_respects_room_boundaries() {
    let (addr, db_pool, _) = spawn_server().await;
    let first = conversations::find_or_create(&db_pool, Uuid::now_v7(), Uuid::now_v7())
        .await
        .unwrap();
    let second = conversations::find_or_create(&db_pool, Uuid::now_v7(), Uuid::now_v7())
        .await
        .unwrap();

    let mut insider = connect(&addr).await;
    send_json(&mut insider, join_frame(first.id)).await;

    let mut outsider = connect(&addr).await;
    send_json(&mut outsider, join_frame(second.id)).await;
    send_json(
        &mut outsider,
        message_frame(second.id, first.participants[0], "other room"),
    )
    .await;
    let ack = recv_json(&mut outsider).await;
    assert_eq!(ack["body"], "other room");

    send_json(
        &mut insider,
        message_frame(first.id, first.participants[0], "just for us"),
    )
    .await;
    let frame = recv_json(&mut insider).await;
    assert_eq!(frame["body"], "just for us");

    assert_silent(&mut outsider).await;
}

#[tokio::test]
async fn rejected_sends_report_an_error_frame() {
    let (addr, db_pool, _) = spawn_server().await;
    let conversation = conversations::find_or_create(&db_pool, Uuid::now_v7(), Uuid::now_v7())
        .await
        .unwrap();

    let mut socket = connect(&addr).await;
    send_json(&mut socket, join_frame(conversation.id)).await;

    send_json(
        &mut socket,
        message_frame(conversation.id, conversation.participants[0], "   "),
    )
    .await;
    let error = recv_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert!(error["message"].as_str().unwrap().contains("empty"));

    send_json(
        &mut socket,
        message_frame(Uuid::now_v7(), conversation.participants[0], "anyone there?"),
    )
    .await;
    let error = recv_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "conversation not found");

    let history = messages::list_by_conversation(&db_pool, conversation.id)
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn garbage_frames_are_ignored() {
    let (addr, db_pool, _) = spawn_server().await;
    let conversation = conversations::find_or_create(&db_pool, Uuid::now_v7(), Uuid::now_v7())
        .await
        .unwrap();

    let mut socket = connect(&addr).await;
    send_json(&mut socket, join_frame(conversation.id)).await;
    socket
        .send(Message::Text("definitely not json".to_owned()))
        .await
        .unwrap();
    send_json(&mut socket, json!({ "type": "dance" })).await;

    send_json(
        &mut socket,
        message_frame(conversation.id, conversation.participants[0], "still alive"),
    )
    .await;
    let frame = recv_json(&mut socket).await;
    assert_eq!(frame["body"], "still alive");
}

#[tokio::test]
async fn abrupt_disconnect_leaves_the_room_working() {
    let (addr, db_pool, rooms) = spawn_server().await;
    let conversation = conversations::find_or_create(&db_pool, Uuid::now_v7(), Uuid::now_v7())
        .await
        .unwrap();
    let sender_id = conversation.participants[0];

    let mut stayer = connect(&addr).await;
    send_json(&mut stayer, join_frame(conversation.id)).await;

    let mut leaver = connect(&addr).await;
    send_json(&mut leaver, join_frame(conversation.id)).await;
    send_json(&mut leaver, message_frame(conversation.id, sender_id, "first")).await;
    assert_eq!(recv_json(&mut leaver).await["body"], "first");
    assert_eq!(recv_json(&mut stayer).await["body"], "first");
    assert_eq!(rooms.member_count(conversation.id).await, 2);

    drop(leaver);
    wait_for_members(&rooms, conversation.id, 1).await;

    send_json(&mut stayer, message_frame(conversation.id, sender_id, "second")).await;
    assert_eq!(recv_json(&mut stayer).await["body"], "second");

    let history = messages::list_by_conversation(&db_pool, conversation.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn abrupt_disconnect_empties_the_registry() {
    let (addr, db_pool, rooms) = spawn_server().await;
    let conversation = conversations::find_or_create(&db_pool, Uuid::now_v7(), Uuid::now_v7())
        .await
        .unwrap();

    let mut viewer = connect(&addr).await;
    send_json(&mut viewer, join_frame(conversation.id)).await;
    wait_for_members(&rooms, conversation.id, 1).await;

    drop(viewer);
    wait_for_members(&rooms, conversation.id, 0).await;

    assert_eq!(rooms.broadcast(conversation.id, "anyone left?").await, 0);
}

#[tokio::test]
async fn leave_frame_stops_delivery() {
    let (addr, db_pool, _) = spawn_server().await;
    let conversation = conversations::find_or_create(&db_pool, Uuid::now_v7(), Uuid::now_v7())
        .await
        .unwrap();
    let sender_id = conversation.participants[0];

    let mut watcher = connect(&addr).await;
    send_json(&mut watcher, join_frame(conversation.id)).await;
    send_json(&mut watcher, message_frame(conversation.id, sender_id, "before")).await;
    assert_eq!(recv_json(&mut watcher).await["body"], "before");

    send_json(
        &mut watcher,
        json!({ "type": "leave", "conversationId": conversation.id }),
    )
    .await;
    send_json(&mut watcher, message_frame(conversation.id, sender_id, "after")).await;
    assert_silent(&mut watcher).await;

    let history = messages::list_by_conversation(&db_pool, conversation.id)
        .await
        .unwrap();
    let bodies: Vec<&str> = history.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["before", "after"]);
}
