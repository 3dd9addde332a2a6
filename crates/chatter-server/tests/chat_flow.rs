//! End-to-end chat flows over real WebSocket connections.

use chatter_core::Claims;
use chatter_protocol::{codec, InboundEvent, OutboundEvent};
use chatter_server::{serve, AppState, Config};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const SECRET: &str = "integration-secret";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (SocketAddr, Arc<AppState>) {
    start_server_with(|_| {}).await
}

async fn start_server_with(configure: impl FnOnce(&mut Config)) -> (SocketAddr, Arc<AppState>) {
    let mut config = Config::default();
    config.auth.jwt_secret = SECRET.into();
    config.metrics.enabled = false;
    configure(&mut config);

    let state = Arc::new(AppState::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        serve(listener, server_state, std::future::pending())
            .await
            .unwrap();
    });

    (addr, state)
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn token(user_id: &str, name: &str, exp: u64) -> String {
    let claims = Claims {
        sub: user_id.into(),
        name: name.into(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn connect(addr: SocketAddr, user_id: &str, name: &str) -> Client {
    let url = format!("ws://{}/ws?token={}", addr, token(user_id, name, now() + 3600));
    let (client, _) = connect_async(url).await.unwrap();
    client
}

async fn next_event(client: &mut Client) -> OutboundEvent {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .unwrap();

        match message {
            Message::Text(text) => return codec::decode_json(&text).unwrap(),
            Message::Binary(data) => return codec::decode(&data).unwrap(),
            _ => continue,
        }
    }
}

async fn assert_silent(client: &mut Client) {
    let result = tokio::time::timeout(Duration::from_millis(300), client.next()).await;
    assert!(result.is_err(), "unexpected event: {:?}", result);
}

async fn send(client: &mut Client, event: &InboundEvent) {
    let text = codec::encode_json(event).unwrap();
    client.send(Message::Text(text)).await.unwrap();
}

fn roster(names: &[&str]) -> OutboundEvent {
    OutboundEvent::UpdateUsers(names.iter().map(|n| n.to_string()).collect())
}

fn expect_message(event: OutboundEvent, content: &str, sender: &str) {
    match event {
        OutboundEvent::NewMessage(message) => {
            assert_eq!(message.content, content);
            assert_eq!(message.sender.name, sender);
        }
        other => panic!("Expected newMessage, got {:?}", other),
    }
}

fn status_of(error: WsError) -> u16 {
    match error {
        WsError::Http(response) => response.status().as_u16(),
        other => panic!("Expected HTTP refusal, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_token_is_refused() {
    let (addr, state) = start_server().await;

    let error = connect_async(format!("ws://{}/ws", addr)).await.unwrap_err();
    assert_eq!(status_of(error), 401);
    assert_eq!(state.hub.online(), 0);
}

#[tokio::test]
async fn test_expired_token_does_not_change_roster() {
    let (addr, state) = start_server().await;
    let mut alice = connect(addr, "u1", "Alice").await;
    assert_eq!(next_event(&mut alice).await, roster(&["Alice"]));

    let expired = token("u2", "Mallory", now() - 3600);
    let error = connect_async(format!("ws://{}/ws?token={}", addr, expired))
        .await
        .unwrap_err();
    assert_eq!(status_of(error), 401);

    assert_silent(&mut alice).await;
    assert_eq!(state.hub.roster(), vec!["Alice".to_string()]);
}

#[tokio::test]
async fn test_full_server_refuses_with_503() {
    let (addr, state) = start_server_with(|config| config.limits.max_connections = 1).await;
    let mut alice = connect(addr, "u1", "Alice").await;
    assert_eq!(next_event(&mut alice).await, roster(&["Alice"]));

    let url = format!("ws://{}/ws?token={}", addr, token("u2", "Bob", now() + 3600));
    let error = connect_async(url).await.unwrap_err();
    assert_eq!(status_of(error), 503);

    assert_silent(&mut alice).await;
    assert_eq!(state.hub.roster(), vec!["Alice".to_string()]);
}

#[tokio::test]
async fn test_bearer_header_is_accepted() {
    let (addr, _state) = start_server().await;

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    let value = format!("Bearer {}", token("u1", "Alice", now() + 60));
    request
        .headers_mut()
        .insert("authorization", HeaderValue::from_str(&value).unwrap());

    let (mut alice, _) = connect_async(request).await.unwrap();
    assert_eq!(next_event(&mut alice).await, roster(&["Alice"]));
}

#[tokio::test]
async fn test_presence_and_broadcast() {
    let (addr, state) = start_server().await;

    let mut alice = connect(addr, "u1", "Alice").await;
    assert_eq!(next_event(&mut alice).await, roster(&["Alice"]));

    let mut bob = connect(addr, "u2", "Bob").await;
    assert_eq!(next_event(&mut alice).await, roster(&["Alice", "Bob"]));
    assert_eq!(next_event(&mut alice).await, OutboundEvent::joined("Bob"));
    assert_eq!(next_event(&mut bob).await, roster(&["Alice", "Bob"]));

    // Typing goes to others only; Bob's next event is his own message.
    send(&mut bob, &InboundEvent::Typing).await;
    send(&mut bob, &InboundEvent::send_message("hello")).await;

    assert_eq!(
        next_event(&mut alice).await,
        OutboundEvent::UserTyping("Bob".into())
    );
    expect_message(next_event(&mut alice).await, "hello", "Bob");
    expect_message(next_event(&mut bob).await, "hello", "Bob");

    bob.close(None).await.unwrap();
    assert_eq!(next_event(&mut alice).await, roster(&["Alice"]));
    assert_eq!(next_event(&mut alice).await, OutboundEvent::left("Bob"));
    assert_eq!(state.hub.online(), 1);
}

#[tokio::test]
async fn test_blank_message_is_not_broadcast() {
    let (addr, _state) = start_server().await;

    let mut alice = connect(addr, "u1", "Alice").await;
    assert_eq!(next_event(&mut alice).await, roster(&["Alice"]));

    send(&mut alice, &InboundEvent::send_message("   ")).await;
    send(&mut alice, &InboundEvent::send_message("real")).await;

    expect_message(next_event(&mut alice).await, "real", "Alice");
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let (addr, _state) = start_server().await;

    let mut alice = connect(addr, "u1", "Alice").await;
    assert_eq!(next_event(&mut alice).await, roster(&["Alice"]));

    alice.send(Message::Text("{not json".into())).await.unwrap();
    alice
        .send(Message::Text(r#"{"event":"newMessage","data":{}}"#.into()))
        .await
        .unwrap();
    send(&mut alice, &InboundEvent::send_message("still here")).await;

    expect_message(next_event(&mut alice).await, "still here", "Alice");
}

#[tokio::test]
async fn test_two_tabs_appear_twice() {
    let (addr, state) = start_server().await;

    let mut first = connect(addr, "u1", "Alice").await;
    assert_eq!(next_event(&mut first).await, roster(&["Alice"]));

    let mut second = connect(addr, "u1", "Alice").await;
    assert_eq!(next_event(&mut second).await, roster(&["Alice", "Alice"]));
    assert_eq!(next_event(&mut first).await, roster(&["Alice", "Alice"]));
    assert_eq!(next_event(&mut first).await, OutboundEvent::joined("Alice"));

    // Closing one tab leaves the other in the roster.
    second.close(None).await.unwrap();
    assert_eq!(next_event(&mut first).await, roster(&["Alice"]));
    assert_eq!(next_event(&mut first).await, OutboundEvent::left("Alice"));
    assert_eq!(state.hub.online(), 1);
}

#[tokio::test]
async fn test_messagepack_client_gets_binary_replies() {
    let (addr, _state) = start_server().await;

    let mut alice = connect(addr, "u1", "Alice").await;
    assert_eq!(next_event(&mut alice).await, roster(&["Alice"]));

    let frame = codec::encode(&InboundEvent::send_message("packed")).unwrap();
    alice.send(Message::Binary(frame.to_vec())).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), alice.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match reply {
        Message::Binary(data) => {
            let event: OutboundEvent = codec::decode(&data).unwrap();
            expect_message(event, "packed", "Alice");
        }
        other => panic!("Expected binary reply, got {:?}", other),
    }
}

#[tokio::test]
async fn test_split_binary_frame_over_limit_ends_session() {
    let (addr, state) =
        start_server_with(|config| config.transport.max_message_size = 1024).await;

    let mut alice = connect(addr, "u1", "Alice").await;
    assert_eq!(next_event(&mut alice).await, roster(&["Alice"]));
    let mut bob = connect(addr, "u2", "Bob").await;
    assert_eq!(next_event(&mut alice).await, roster(&["Alice", "Bob"]));
    assert_eq!(next_event(&mut alice).await, OutboundEvent::joined("Bob"));

    // Each slice fits the limit; the buffered frame does not.
    let mut first = 4096u32.to_be_bytes().to_vec();
    first.resize(1024, 0);
    let _ = bob.send(Message::Binary(first)).await;
    for _ in 0..3 {
        let _ = bob.send(Message::Binary(vec![0u8; 1024])).await;
    }

    assert_eq!(next_event(&mut alice).await, roster(&["Alice"]));
    assert_eq!(next_event(&mut alice).await, OutboundEvent::left("Bob"));
    assert_eq!(state.hub.online(), 1);
}
