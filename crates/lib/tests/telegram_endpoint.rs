//! Integration test: run the Telegram endpoint against a local stub of the
//! Bot API (getUpdates / sendMessage) instead of api.telegram.org.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use lib::bot::Bot;
use lib::channels::{Endpoint, TelegramEndpoint};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TOKEN: &str = "TESTTOKEN";

/// Pending updates to serve (each once) and a record of sendMessage calls.
#[derive(Default)]
struct StubState {
    pending: Mutex<Vec<serde_json::Value>>,
    sent: Mutex<Vec<(i64, String)>>,
}

async fn get_updates(State(state): State<Arc<StubState>>) -> Json<serde_json::Value> {
    let batch: Vec<serde_json::Value> = state.pending.lock().unwrap().drain(..).collect();
    if batch.is_empty() {
        // keep the poll loop from spinning against the stub
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    Json(json!({ "ok": true, "result": batch }))
}

async fn send_message(
    State(state): State<Arc<StubState>>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let chat_id = body["chat_id"].as_i64().expect("chat_id");
    let text = body["text"].as_str().expect("text").to_string();
    state.sent.lock().unwrap().push((chat_id, text));
    Json(json!({ "ok": true }))
}

async fn start_stub() -> (Arc<StubState>, String) {
    let state = Arc::new(StubState::default());
    let app = Router::new()
        .route(&format!("/bot{}/getUpdates", TOKEN), get(get_updates))
        .route(&format!("/bot{}/sendMessage", TOKEN), post(send_message))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (state, base)
}

fn push_text_update(state: &StubState, update_id: i64, chat_id: i64, text: &str) {
    state.pending.lock().unwrap().push(json!({
        "update_id": update_id,
        "message": { "chat": { "id": chat_id }, "text": text }
    }));
}

async fn wait_for_sent(state: &StubState, count: usize) -> Vec<(i64, String)> {
    for _ in 0..100 {
        {
            let sent = state.sent.lock().unwrap();
            if sent.len() >= count {
                return sent.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    state.sent.lock().unwrap().clone()
}

#[tokio::test]
async fn text_messages_are_dispatched_and_replied_in_chat() {
    let (state, base) = start_stub().await;

    let bot = Bot::builder()
        .command("start", || "Hello!".to_string())
        .default_response(|t| Some(t.to_lowercase()))
        .build();
    let mut ep = TelegramEndpoint::new(TOKEN).with_api_base(base);
    ep.bind(bot.dispatcher());
    ep.start().await.expect("start");

    push_text_update(&state, 1, 42, "HELLO THERE");
    let sent = wait_for_sent(&state, 1).await;
    assert_eq!(sent, vec![(42, "hello there".to_string())]);

    ep.stop().await.expect("stop");
}

#[tokio::test]
async fn slash_commands_run_through_the_dispatcher() {
    let (state, base) = start_stub().await;

    let bot = Bot::builder()
        .command("start", || "Hello!".to_string())
        .default_response(|t| Some(t.to_lowercase()))
        .build();
    let mut ep = TelegramEndpoint::new(TOKEN).with_api_base(base);
    ep.bind(bot.dispatcher());
    ep.start().await.expect("start");

    push_text_update(&state, 1, 7, "/start");
    push_text_update(&state, 2, 7, "/unknown");
    let sent = wait_for_sent(&state, 2).await;
    assert_eq!(
        sent,
        vec![(7, "Hello!".to_string()), (7, "/unknown".to_string())]
    );

    ep.stop().await.expect("stop");
}

#[tokio::test]
async fn updates_without_text_are_skipped_and_offset_advances() {
    let (state, base) = start_stub().await;

    let bot = Bot::builder().default_response(|t| Some(t.to_string())).build();
    let mut ep = TelegramEndpoint::new(TOKEN).with_api_base(base);
    ep.bind(bot.dispatcher());
    ep.start().await.expect("start");

    state.pending.lock().unwrap().push(json!({ "update_id": 1 }));
    push_text_update(&state, 2, 9, "ok");
    let sent = wait_for_sent(&state, 1).await;
    assert_eq!(sent, vec![(9, "ok".to_string())]);

    ep.stop().await.expect("stop");
}

#[tokio::test]
async fn stop_cancels_the_long_poll_promptly() {
    let (_state, base) = start_stub().await;

    let bot = Bot::builder().build();
    let mut ep = TelegramEndpoint::new(TOKEN).with_api_base(base);
    ep.bind(bot.dispatcher());
    ep.start().await.expect("start");

    let stopped = tokio::time::timeout(Duration::from_secs(2), ep.stop()).await;
    assert!(stopped.is_ok(), "stop did not return promptly");
}
