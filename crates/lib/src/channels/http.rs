//! HTTP endpoint: answer `GET /<anything>?in_message=<text>` with the bot's
//! reply as `{"out_message": ...}`.

use crate::bot::Dispatcher;
use crate::channels::{dispatch, Endpoint, Message, Shutdown};
use crate::error::ChannelError;
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Serves the bot over plain HTTP GET requests.
pub struct HttpEndpoint {
    bind: String,
    port: u16,
    dispatcher: Option<Arc<Dispatcher>>,
    shutdown: Arc<Shutdown>,
    task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    stopped: bool,
}

impl HttpEndpoint {
    /// Bind address and port; pass port 0 to let the OS pick (tests).
    pub fn new(bind: impl Into<String>, port: u16) -> Self {
        Self {
            bind: bind.into(),
            port,
            dispatcher: None,
            shutdown: Arc::new(Shutdown::new()),
            task: None,
            local_addr: None,
            stopped: false,
        }
    }

    /// The bound address once started (resolves port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

/// GET handler for every path: `in_message` query param in, JSON reply out.
/// A missing param is a client error; a dispatcher "no reply" is `null`.
async fn process_request(
    State(dispatcher): State<Arc<Dispatcher>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let Some(in_message) = params.get("in_message") else {
        let err = ChannelError::MalformedInput("missing in_message query parameter".to_string());
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        ));
    };
    let message = Message {
        sender_id: "http".to_string(),
        text: in_message.clone(),
    };
    let reply = dispatch(&dispatcher, &message);
    Ok(Json(json!({ "out_message": reply })))
}

#[async_trait]
impl Endpoint for HttpEndpoint {
    fn id(&self) -> &str {
        "http"
    }

    fn bind(&mut self, dispatcher: Arc<Dispatcher>) {
        self.dispatcher = Some(dispatcher);
    }

    async fn start(&mut self) -> Result<(), ChannelError> {
        let dispatcher = self.dispatcher.clone().ok_or(ChannelError::NotBound)?;
        if self.task.is_some() || self.stopped {
            return Err(ChannelError::AlreadyStarted);
        }

        let app = Router::new()
            .route("/", get(process_request))
            .route("/*path", get(process_request))
            .with_state(dispatcher);

        let bind_addr = format!("{}:{}", self.bind, self.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        log::info!("http endpoint listening on {}", local_addr);

        // the listener is accepting as soon as bind returns, so spawning
        // the serve task is the readiness point
        let shutdown = self.shutdown.clone();
        self.task = Some(tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                log::warn!("http endpoint server exited with error: {}", e);
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ChannelError> {
        self.stopped = true;
        self.shutdown.trigger();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        log::info!("http endpoint stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::Bot;

    #[tokio::test]
    async fn start_without_bind_is_an_error() {
        let mut ep = HttpEndpoint::new("127.0.0.1", 0);
        assert!(matches!(ep.start().await, Err(ChannelError::NotBound)));
    }

    #[tokio::test]
    async fn start_after_stop_is_an_error() {
        let bot = Bot::builder().build();
        let mut ep = HttpEndpoint::new("127.0.0.1", 0);
        ep.bind(bot.dispatcher());
        ep.start().await.expect("start");
        ep.stop().await.expect("stop");
        assert!(matches!(ep.start().await, Err(ChannelError::AlreadyStarted)));
    }
}
