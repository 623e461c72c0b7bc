//! Error kinds shared by the channel endpoints.

use thiserror::Error;

/// What can go wrong in a channel endpoint.
///
/// `Unavailable` is the transient kind: a running poll loop logs it and
/// retries on the next cycle instead of propagating it. The other kinds
/// surface through `start`/`stop` or as an HTTP 4xx.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The external service could not be reached or rejected the call.
    #[error("channel unavailable: {0}")]
    Unavailable(String),

    /// An inbound request was missing or malformed (e.g. no `in_message`).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// `start` was called before `bind`.
    #[error("endpoint not bound to a bot")]
    NotBound,

    /// `start` was called twice; the lifecycle is not resumable.
    #[error("endpoint already started")]
    AlreadyStarted,

    /// Binding the listener failed at startup.
    #[error("bind failed: {0}")]
    Bind(#[from] std::io::Error),
}

impl ChannelError {
    /// Map a reqwest failure to the transient kind.
    pub(crate) fn from_request(err: reqwest::Error) -> Self {
        ChannelError::Unavailable(err.to_string())
    }
}
