//! Test double for the Twitter service, shared by the polling and
//! streaming endpoint tests.

use crate::channels::{DirectMessage, StreamEvent, TwitterApi};
use crate::error::ChannelError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// In-memory stand-in for the Twitter service: an inbox, a follower graph,
/// a record of outbound calls, and an optional scripted event stream.
pub(crate) struct FakeTwitterApi {
    pub inbox: Mutex<Vec<DirectMessage>>,
    pub sent: Mutex<Vec<(u64, String)>>,
    pub followers: Mutex<Vec<u64>>,
    pub friends: Mutex<Vec<u64>>,
    pub friendships_created: Mutex<Vec<u64>>,
    stream: Mutex<Option<mpsc::UnboundedReceiver<Result<StreamEvent, ChannelError>>>>,
}

impl FakeTwitterApi {
    pub fn new() -> Self {
        Self {
            inbox: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            followers: Mutex::new(Vec::new()),
            friends: Mutex::new(Vec::new()),
            friendships_created: Mutex::new(Vec::new()),
            stream: Mutex::new(None),
        }
    }

    pub fn push_dm(&self, id: u64, sender_id: u64, text: &str) {
        self.inbox.lock().unwrap().push(DirectMessage {
            id,
            sender_id,
            text: text.to_string(),
            created_at: None,
        });
    }

    pub fn sent_messages(&self) -> Vec<(u64, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Arm the stream: events sent on the returned sender flow out of the
    /// next `user_stream` call; dropping the sender ends the stream.
    pub fn arm_stream(&self) -> mpsc::UnboundedSender<Result<StreamEvent, ChannelError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.stream.lock().unwrap() = Some(rx);
        tx
    }
}

#[async_trait]
impl TwitterApi for FakeTwitterApi {
    async fn direct_messages_since(
        &self,
        since_id: u64,
    ) -> Result<Vec<DirectMessage>, ChannelError> {
        Ok(self
            .inbox
            .lock()
            .unwrap()
            .iter()
            .filter(|dm| dm.id > since_id)
            .cloned()
            .collect())
    }

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push((user_id, text.to_string()));
        Ok(())
    }

    async fn follower_ids(&self) -> Result<Vec<u64>, ChannelError> {
        Ok(self.followers.lock().unwrap().clone())
    }

    async fn friend_ids(&self) -> Result<Vec<u64>, ChannelError> {
        Ok(self.friends.lock().unwrap().clone())
    }

    async fn create_friendship(&self, user_id: u64) -> Result<(), ChannelError> {
        self.friendships_created.lock().unwrap().push(user_id);
        self.friends.lock().unwrap().push(user_id);
        Ok(())
    }

    async fn user_stream(
        &self,
    ) -> Result<BoxStream<'static, Result<StreamEvent, ChannelError>>, ChannelError> {
        let rx = self
            .stream
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ChannelError::Unavailable("stream not armed".to_string()))?;
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(stream.boxed())
    }
}
