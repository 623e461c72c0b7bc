//! Twitter API surface used by the polling and streaming endpoints.
//!
//! The endpoints talk to the service only through the `TwitterApi` trait:
//! DM listing/sending, follower/friend ids, friendship creation, and the
//! live event stream. `RestTwitterApi` is the reqwest-backed implementation;
//! tests substitute an in-memory fake.

use crate::error::ChannelError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;

const TWITTER_API_BASE: &str = "https://api.twitter.com";
const TWITTER_STREAM_URL: &str = "https://userstream.twitter.com/1.1/user.json";

/// Twitter's created_at format, e.g. "Wed Aug 27 13:08:45 +0000 2008".
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// One direct message as seen by the endpoints.
#[derive(Debug, Clone)]
pub struct DirectMessage {
    pub id: u64,
    pub sender_id: u64,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// One event from the live stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    DirectMessage(DirectMessage),
    /// A user started following the bot.
    Follow { user_id: u64 },
    /// Anything else on the stream (deletes, limits, keep-alives).
    Other,
}

/// Narrow contract to the Twitter service.
#[async_trait]
pub trait TwitterApi: Send + Sync {
    /// Direct messages with id greater than `since_id`, any order.
    /// `since_id = 0` returns the current inbox.
    async fn direct_messages_since(&self, since_id: u64)
        -> Result<Vec<DirectMessage>, ChannelError>;

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), ChannelError>;

    /// Ids of users following the bot.
    async fn follower_ids(&self) -> Result<Vec<u64>, ChannelError>;

    /// Ids of users the bot follows.
    async fn friend_ids(&self) -> Result<Vec<u64>, ChannelError>;

    async fn create_friendship(&self, user_id: u64) -> Result<(), ChannelError>;

    /// Open the live event stream. The subscription disconnects when the
    /// returned stream is dropped.
    async fn user_stream(
        &self,
    ) -> Result<BoxStream<'static, Result<StreamEvent, ChannelError>>, ChannelError>;
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct WireDirectMessage {
    id: u64,
    text: String,
    sender: WireUser,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<WireDirectMessage> for DirectMessage {
    fn from(wire: WireDirectMessage) -> Self {
        let created_at = wire.created_at.as_deref().and_then(parse_created_at);
        DirectMessage {
            id: wire.id,
            sender_id: wire.sender.id,
            text: wire.text,
            created_at,
        }
    }
}

fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, CREATED_AT_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Deserialize)]
struct WireIdList {
    ids: Vec<u64>,
}

/// Parse one stream line into an event. Unknown payloads map to `Other`;
/// unparseable lines return None and are skipped.
fn parse_stream_event(line: &str) -> Option<StreamEvent> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    if let Some(dm) = value.get("direct_message") {
        let wire: WireDirectMessage = serde_json::from_value(dm.clone()).ok()?;
        return Some(StreamEvent::DirectMessage(wire.into()));
    }
    if value.get("event").and_then(|e| e.as_str()) == Some("follow") {
        let user_id = value.get("source")?.get("id")?.as_u64()?;
        return Some(StreamEvent::Follow { user_id });
    }
    Some(StreamEvent::Other)
}

/// reqwest-backed `TwitterApi` with bearer-token auth.
///
/// OAuth1 request signing is deliberately not implemented here; deployments
/// that need it can provide their own `TwitterApi` implementation.
pub struct RestTwitterApi {
    client: reqwest::Client,
    bearer_token: String,
    api_base: String,
    stream_url: String,
}

impl RestTwitterApi {
    pub fn new(bearer_token: impl Into<String>) -> Self {
        Self {
            // no client-level timeout: the same client serves the long-lived stream
            client: reqwest::Client::new(),
            bearer_token: bearer_token.into(),
            api_base: TWITTER_API_BASE.to_string(),
            stream_url: TWITTER_STREAM_URL.to_string(),
        }
    }

    /// Point REST calls at a different base URL (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the streaming URL (tests, or a relay that handles auth).
    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.stream_url = stream_url.into();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ChannelError> {
        let res = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(ChannelError::from_request)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Unavailable(format!(
                "GET {} failed: {} {}",
                url, status, body
            )));
        }
        res.json().await.map_err(ChannelError::from_request)
    }

    async fn post_ok(&self, url: &str, body: serde_json::Value) -> Result<(), ChannelError> {
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.bearer_token)
            .json(&body)
            .send()
            .await
            .map_err(ChannelError::from_request)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Unavailable(format!(
                "POST {} failed: {} {}",
                url, status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TwitterApi for RestTwitterApi {
    async fn direct_messages_since(
        &self,
        since_id: u64,
    ) -> Result<Vec<DirectMessage>, ChannelError> {
        let mut url = format!("{}/1.1/direct_messages.json?count=200", self.api_base);
        if since_id > 0 {
            url.push_str(&format!("&since_id={}", since_id));
        }
        let wire: Vec<WireDirectMessage> = self.get_json(&url).await?;
        Ok(wire.into_iter().map(DirectMessage::from).collect())
    }

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), ChannelError> {
        let url = format!("{}/1.1/direct_messages/new.json", self.api_base);
        self.post_ok(&url, serde_json::json!({ "user_id": user_id, "text": text }))
            .await
    }

    async fn follower_ids(&self) -> Result<Vec<u64>, ChannelError> {
        let url = format!("{}/1.1/followers/ids.json", self.api_base);
        let wire: WireIdList = self.get_json(&url).await?;
        Ok(wire.ids)
    }

    async fn friend_ids(&self) -> Result<Vec<u64>, ChannelError> {
        let url = format!("{}/1.1/friends/ids.json", self.api_base);
        let wire: WireIdList = self.get_json(&url).await?;
        Ok(wire.ids)
    }

    async fn create_friendship(&self, user_id: u64) -> Result<(), ChannelError> {
        let url = format!("{}/1.1/friendships/create.json", self.api_base);
        self.post_ok(&url, serde_json::json!({ "user_id": user_id }))
            .await
    }

    async fn user_stream(
        &self,
    ) -> Result<BoxStream<'static, Result<StreamEvent, ChannelError>>, ChannelError> {
        let res = self
            .client
            .get(&self.stream_url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(ChannelError::from_request)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Unavailable(format!(
                "stream connect failed: {} {}",
                status, body
            )));
        }
        let bytes = res.bytes_stream();
        // newline-delimited JSON; blank lines are keep-alives
        let stream = futures_util::stream::try_unfold(
            (bytes, Vec::<u8>::new()),
            |(mut bytes, mut buffer)| async move {
                loop {
                    if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line_bytes);
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_stream_event(line) {
                            Some(event) => return Ok(Some((event, (bytes, buffer)))),
                            None => continue,
                        }
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                        Some(Err(e)) => return Err(ChannelError::from_request(e)),
                        None => return Ok(None),
                    }
                }
            },
        );
        Ok(stream.boxed())
    }
}
