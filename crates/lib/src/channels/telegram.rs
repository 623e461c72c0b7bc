//! Telegram endpoint: long-poll getUpdates and reply via sendMessage.

use crate::bot::Dispatcher;
use crate::channels::{dispatch, Endpoint, Message, Shutdown};
use crate::error::ChannelError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT_SECS: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

/// Telegram update payload (getUpdates result item).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

/// Bot API worker owned by the polling task.
struct TelegramWorker {
    client: reqwest::Client,
    api_base: String,
    token: String,
    dispatcher: Arc<Dispatcher>,
}

impl TelegramWorker {
    /// Call getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), ChannelError> {
        let mut url = format!(
            "{}/bot{}/getUpdates?timeout={}",
            self.api_base, self.token, LONG_POLL_TIMEOUT_SECS
        );
        if let Some(off) = offset {
            url.push_str(&format!("&offset={}", off));
        }
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ChannelError::from_request)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Unavailable(format!(
                "getUpdates failed: {} {}",
                status, body
            )));
        }
        let data: GetUpdatesResponse = res.json().await.map_err(ChannelError::from_request)?;
        if !data.ok {
            return Err(ChannelError::Unavailable(
                "getUpdates returned ok: false".to_string(),
            ));
        }
        let next_offset = data
            .result
            .iter()
            .map(|u| u.update_id)
            .max()
            .map(|id| id + 1);
        Ok((data.result, next_offset))
    }

    /// Send a text message to a chat via sendMessage.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ChannelError::from_request)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Unavailable(format!(
                "sendMessage failed: {} {}",
                status, body
            )));
        }
        Ok(())
    }

    /// Dispatch every text message in a batch of updates and reply in place.
    async fn handle_updates(&self, updates: Vec<TelegramUpdate>) {
        for update in updates {
            let Some(msg) = update.message else { continue };
            let Some(text) = msg.text else { continue };
            let inbound = Message {
                sender_id: msg.chat.id.to_string(),
                text,
            };
            if let Some(reply) = dispatch(&self.dispatcher, &inbound) {
                if let Err(e) = self.send_message(msg.chat.id, &reply).await {
                    log::warn!("telegram: sendMessage failed: {}", e);
                }
            }
        }
    }
}

async fn run_get_updates_loop(worker: TelegramWorker, shutdown: Arc<Shutdown>) {
    let mut offset: Option<i64> = None;
    while shutdown.is_running() {
        // cancel the in-flight long poll on stop instead of waiting it out
        let fetched = tokio::select! {
            res = worker.get_updates(offset) => res,
            _ = shutdown.cancelled() => break,
        };
        match fetched {
            Ok((updates, next)) => {
                offset = next;
                worker.handle_updates(updates).await;
            }
            Err(e) => {
                log::warn!("telegram getUpdates error: {}", e);
                if !shutdown.sleep(ERROR_BACKOFF).await {
                    break;
                }
            }
        }
    }
    log::info!("telegram endpoint: getUpdates loop stopped");
}

/// Connects the bot to Telegram via Bot API long polling.
pub struct TelegramEndpoint {
    token: String,
    api_base: String,
    dispatcher: Option<Arc<Dispatcher>>,
    shutdown: Arc<Shutdown>,
    task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl TelegramEndpoint {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
            dispatcher: None,
            shutdown: Arc::new(Shutdown::new()),
            task: None,
            stopped: false,
        }
    }

    /// Point the endpoint at a different Bot API base URL (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Endpoint for TelegramEndpoint {
    fn id(&self) -> &str {
        "telegram"
    }

    fn bind(&mut self, dispatcher: Arc<Dispatcher>) {
        self.dispatcher = Some(dispatcher);
    }

    async fn start(&mut self) -> Result<(), ChannelError> {
        let dispatcher = self.dispatcher.clone().ok_or(ChannelError::NotBound)?;
        if self.task.is_some() || self.stopped {
            return Err(ChannelError::AlreadyStarted);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT_SECS + 10))
            .build()
            .map_err(ChannelError::from_request)?;
        let worker = TelegramWorker {
            client,
            api_base: self.api_base.clone(),
            token: self.token.clone(),
            dispatcher,
        };
        let shutdown = self.shutdown.clone();
        self.task = Some(tokio::spawn(run_get_updates_loop(worker, shutdown)));
        log::info!("telegram endpoint: getUpdates loop started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ChannelError> {
        self.stopped = true;
        self.shutdown.trigger();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_updates_response_parses_text_messages() {
        let raw = r#"{
            "ok": true,
            "result": [
                {"update_id": 10, "message": {"chat": {"id": 42}, "text": "hello"}},
                {"update_id": 11, "message": {"chat": {"id": 42}}},
                {"update_id": 12}
            ]
        }"#;
        let parsed: GetUpdatesResponse = serde_json::from_str(raw).expect("parse");
        assert!(parsed.ok);
        assert_eq!(parsed.result.len(), 3);
        assert_eq!(
            parsed.result[0].message.as_ref().and_then(|m| m.text.as_deref()),
            Some("hello")
        );
        assert!(parsed.result[1].message.as_ref().unwrap().text.is_none());
        assert!(parsed.result[2].message.is_none());
    }

    #[test]
    fn next_offset_is_max_update_id_plus_one() {
        let raw = r#"{"ok": true, "result": [{"update_id": 7}, {"update_id": 5}]}"#;
        let parsed: GetUpdatesResponse = serde_json::from_str(raw).expect("parse");
        let next = parsed.result.iter().map(|u| u.update_id).max().map(|id| id + 1);
        assert_eq!(next, Some(8));
    }
}
