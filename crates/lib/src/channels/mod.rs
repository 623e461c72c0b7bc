//! Channel endpoints (HTTP, Telegram, Twitter).
//!
//! Endpoint trait and lifecycle plumbing so a bot can start/stop channel
//! connectors. Each endpoint owns its connection to the external service,
//! dispatches inbound text through the shared dispatcher, and sends the
//! reply back through the same channel.

mod http;
mod telegram;
#[cfg(test)]
pub(crate) mod testing;
mod twitter;
mod twitter_polling;
mod twitter_streaming;

pub use http::HttpEndpoint;
pub use telegram::{TelegramEndpoint, TelegramUpdate};
pub use twitter::{DirectMessage, RestTwitterApi, StreamEvent, TwitterApi};
pub use twitter_polling::TwitterPollingEndpoint;
pub use twitter_streaming::TwitterStreamingEndpoint;

use crate::bot::Dispatcher;
use crate::error::ChannelError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// One inbound message: who sent it and what they said. Transient — lives
/// only for the duration of one dispatch.
#[derive(Debug, Clone)]
pub struct Message {
    pub sender_id: String,
    pub text: String,
}

/// A channel adapter connecting the bot to one external messaging service.
///
/// Lifecycle: CREATED → RUNNING → STOPPED (terminal; build a fresh endpoint
/// to reconnect). `bind` must be called exactly once before `start`; the
/// bot host does this in `add_endpoint`. `start` resolves only once the
/// endpoint is live, so a following `stop` cannot race the loop startup.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Short channel id used in logs (e.g. "telegram").
    fn id(&self) -> &str;

    /// Bind the dispatcher this endpoint will call for every message.
    fn bind(&mut self, dispatcher: Arc<Dispatcher>);

    /// Connect and start delivering messages. Resolves once live.
    async fn start(&mut self) -> Result<(), ChannelError>;

    /// Disconnect and wait for the background task to finish. After this
    /// returns, no further dispatch calls occur.
    async fn stop(&mut self) -> Result<(), ChannelError>;
}

/// Run one message through the dispatcher.
pub(crate) fn dispatch(dispatcher: &Dispatcher, message: &Message) -> Option<String> {
    log::debug!("dispatching message from {}", message.sender_id);
    dispatcher.process(&message.text)
}

/// Cooperative shutdown signal shared between an endpoint and its loop.
///
/// Replaces busy-wait flag polling: `trigger` flips the flag and wakes any
/// waiter immediately, so `stop` never has to wait out a poll interval.
pub(crate) struct Shutdown {
    running: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            notify: Notify::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request shutdown and wake any waiting loop.
    pub fn trigger(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Sleep for `dur` or until shutdown is triggered, whichever comes
    /// first. Returns whether the loop should keep running.
    pub async fn sleep(&self, dur: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        // re-check after registering interest so a concurrent trigger is not missed
        if !self.is_running() {
            return false;
        }
        tokio::select! {
            _ = &mut notified => {}
            _ = tokio::time::sleep(dur) => {}
        }
        self.is_running()
    }

    /// Resolves when shutdown is triggered. Used to cancel a blocked
    /// long-poll or stream read.
    pub async fn cancelled(&self) {
        while self.is_running() {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}
