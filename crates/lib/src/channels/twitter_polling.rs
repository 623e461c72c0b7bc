//! Twitter direct-message polling endpoint.
//!
//! Tracks a high-water mark so messages that predate startup are never
//! answered: `start` records the max DM id currently in the inbox, then the
//! loop fetches only newer messages and advances the mark as it replies.
//! Delivery is at-least-once — the mark moves only after the reply send, so
//! a crash in between can duplicate one reply after a restart.

use crate::bot::Dispatcher;
use crate::channels::{dispatch, Endpoint, Message, Shutdown, TwitterApi};
use crate::error::ChannelError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Polls the bot's DM inbox and replies through the same channel.
pub struct TwitterPollingEndpoint {
    api: Arc<dyn TwitterApi>,
    poll_interval: Duration,
    dispatcher: Option<Arc<Dispatcher>>,
    shutdown: Arc<Shutdown>,
    task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl TwitterPollingEndpoint {
    pub fn new(api: Arc<dyn TwitterApi>) -> Self {
        Self {
            api,
            poll_interval: DEFAULT_POLL_INTERVAL,
            dispatcher: None,
            shutdown: Arc::new(Shutdown::new()),
            task: None,
            stopped: false,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// One poll cycle: fetch DMs past the mark, answer them in ascending id
/// order, advance the mark per message. On a send failure the mark stays
/// put so the remainder is retried next cycle.
async fn poll_cycle(
    api: &dyn TwitterApi,
    dispatcher: &Dispatcher,
    last_seen_id: &mut u64,
) -> Result<(), ChannelError> {
    let mut dms = api.direct_messages_since(*last_seen_id).await?;
    dms.sort_by_key(|dm| dm.id);
    for dm in dms {
        let inbound = Message {
            sender_id: dm.sender_id.to_string(),
            text: dm.text,
        };
        if let Some(reply) = dispatch(dispatcher, &inbound) {
            api.send_direct_message(dm.sender_id, &reply).await?;
        }
        *last_seen_id = dm.id;
    }
    Ok(())
}

async fn run_polling_loop(
    api: Arc<dyn TwitterApi>,
    dispatcher: Arc<Dispatcher>,
    mut last_seen_id: u64,
    poll_interval: Duration,
    shutdown: Arc<Shutdown>,
) {
    loop {
        if let Err(e) = poll_cycle(api.as_ref(), &dispatcher, &mut last_seen_id).await {
            log::warn!("twitter-dm poll cycle failed: {}", e);
        }
        if !shutdown.sleep(poll_interval).await {
            break;
        }
    }
    log::info!("twitter-dm endpoint: polling loop stopped");
}

#[async_trait]
impl Endpoint for TwitterPollingEndpoint {
    fn id(&self) -> &str {
        "twitter-dm"
    }

    fn bind(&mut self, dispatcher: Arc<Dispatcher>) {
        self.dispatcher = Some(dispatcher);
    }

    async fn start(&mut self) -> Result<(), ChannelError> {
        let dispatcher = self.dispatcher.clone().ok_or(ChannelError::NotBound)?;
        if self.task.is_some() || self.stopped {
            return Err(ChannelError::AlreadyStarted);
        }

        // prime the high-water mark before the loop: anything already in
        // the inbox must never be answered
        let last_seen_id = self
            .api
            .direct_messages_since(0)
            .await?
            .iter()
            .map(|dm| dm.id)
            .max()
            .unwrap_or(0);
        log::info!(
            "twitter-dm endpoint: starting at high-water mark {}",
            last_seen_id
        );

        let api = self.api.clone();
        let shutdown = self.shutdown.clone();
        let poll_interval = self.poll_interval;
        self.task = Some(tokio::spawn(run_polling_loop(
            api,
            dispatcher,
            last_seen_id,
            poll_interval,
            shutdown,
        )));
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
