//! Twitter streaming endpoint: live DM dispatch plus follower auto-greet.
//!
//! On start the endpoint follows back everyone who already follows the bot
//! and greets them with the bot's `/start` reply; while streaming, `follow`
//! events get the same treatment and `direct_message` events are dispatched
//! exactly like the polling variant.

use crate::bot::Dispatcher;
use crate::channels::{dispatch, Endpoint, Message, Shutdown, StreamEvent, TwitterApi};
use crate::error::ChannelError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Follow the user back and send them the bot's greeting (the `/start`
/// reply). Bots without a `start` command still follow back, silently.
async fn follow_back_and_greet(
    api: &dyn TwitterApi,
    dispatcher: &Dispatcher,
    user_id: u64,
) -> Result<(), ChannelError> {
    api.create_friendship(user_id).await?;
    if let Some(greeting) = dispatcher.greeting() {
        api.send_direct_message(user_id, &greeting).await?;
    }
    Ok(())
}

async fn handle_direct_message(
    api: &dyn TwitterApi,
    dispatcher: &Dispatcher,
    sender_id: u64,
    text: String,
) {
    let inbound = Message {
        sender_id: sender_id.to_string(),
        text,
    };
    if let Some(reply) = dispatch(dispatcher, &inbound) {
        if let Err(e) = api.send_direct_message(sender_id, &reply).await {
            log::warn!("twitter-stream: reply send failed: {}", e);
        }
    }
}

async fn run_stream_loop(
    api: Arc<dyn TwitterApi>,
    dispatcher: Arc<Dispatcher>,
    mut stream: BoxStream<'static, Result<StreamEvent, ChannelError>>,
    mut friends: HashSet<u64>,
    shutdown: Arc<Shutdown>,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            ev = stream.next() => ev,
        };
        match event {
            Some(Ok(StreamEvent::DirectMessage(dm))) => {
                handle_direct_message(api.as_ref(), &dispatcher, dm.sender_id, dm.text).await;
            }
            Some(Ok(StreamEvent::Follow { user_id })) => {
                if friends.contains(&user_id) {
                    continue;
                }
                match follow_back_and_greet(api.as_ref(), &dispatcher, user_id).await {
                    Ok(()) => {
                        friends.insert(user_id);
                    }
                    Err(e) => log::warn!("twitter-stream: follow-back of {} failed: {}", user_id, e),
                }
            }
            Some(Ok(StreamEvent::Other)) => {}
            Some(Err(e)) => {
                log::warn!("twitter-stream: stream error: {}", e);
            }
            None => {
                log::warn!("twitter-stream: disconnected, reconnecting");
                let reconnected = loop {
                    if !shutdown.sleep(RECONNECT_BACKOFF).await {
                        break None;
                    }
                    match api.user_stream().await {
                        Ok(s) => break Some(s),
                        Err(e) => log::warn!("twitter-stream: reconnect failed: {}", e),
                    }
                };
                match reconnected {
                    Some(s) => stream = s,
                    None => break,
                }
            }
        }
    }
    // dropping the stream here releases the subscription
    log::info!("twitter-stream endpoint: stream loop stopped");
}

/// Connects the bot to the live Twitter event stream.
pub struct TwitterStreamingEndpoint {
    api: Arc<dyn TwitterApi>,
    dispatcher: Option<Arc<Dispatcher>>,
    shutdown: Arc<Shutdown>,
    task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl TwitterStreamingEndpoint {
    pub fn new(api: Arc<dyn TwitterApi>) -> Self {
        Self {
            api,
            dispatcher: None,
            shutdown: Arc::new(Shutdown::new()),
            task: None,
            stopped: false,
        }
    }
}

#[async_trait]
impl Endpoint for TwitterStreamingEndpoint {
    fn id(&self) -> &str {
        "twitter-stream"
    }

    fn bind(&mut self, dispatcher: Arc<Dispatcher>) {
        self.dispatcher = Some(dispatcher);
    }

    async fn start(&mut self) -> Result<(), ChannelError> {
        let dispatcher = self.dispatcher.clone().ok_or(ChannelError::NotBound)?;
        if self.task.is_some() || self.stopped {
            return Err(ChannelError::AlreadyStarted);
        }

        // greet pass before the stream opens: follow back anyone who is
        // already following but not yet followed
        let followers = self.api.follower_ids().await?;
        let mut friends: HashSet<u64> = self.api.friend_ids().await?.into_iter().collect();
        for user_id in followers {
            if friends.contains(&user_id) {
                continue;
            }
            match follow_back_and_greet(self.api.as_ref(), &dispatcher, user_id).await {
                Ok(()) => {
                    friends.insert(user_id);
                }
                Err(e) => log::warn!("twitter-stream: greeting {} failed: {}", user_id, e),
            }
        }

        let stream = self.api.user_stream().await?;
        log::info!("twitter-stream endpoint: stream connected");

        let api = self.api.clone();
        let shutdown = self.shutdown.clone();
        self.task = Some(tokio::spawn(run_stream_loop(
            api, dispatcher, stream, friends, shutdown,
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
