//! Bot core: command registry, dispatch, and endpoint host.
//!
//! A `Bot` is built once through `BotBuilder` (explicit command
//! registration — the registry is per instance, nothing is shared across
//! bots), then endpoints are attached and driven via `run`/`stop`.

use crate::channels::Endpoint;
use crate::error::ChannelError;
use std::collections::HashMap;
use std::sync::Arc;

/// Zero-argument command handler; the reply is always sent.
pub type CommandHandler = Arc<dyn Fn() -> String + Send + Sync>;

/// Fallback handler for non-command text. `None` means "no reply" and the
/// endpoints send nothing (never an empty string).
pub type DefaultHandler = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Decides command vs. default handling for one inbound text message.
///
/// Shared by every endpoint attached to the bot; handlers may be invoked
/// concurrently from multiple channel tasks and must be `Send + Sync`.
pub struct Dispatcher {
    prefix: String,
    commands: HashMap<String, CommandHandler>,
    default: Option<DefaultHandler>,
}

impl Dispatcher {
    /// Dispatch one message: `<prefix><name>` with `name` registered runs
    /// that command; everything else (including prefix-bearing text whose
    /// name is not registered) goes to the default handler.
    ///
    /// Exact name match only — no argument parsing, no partial matches.
    pub fn process(&self, in_message: &str) -> Option<String> {
        if let Some(name) = in_message.strip_prefix(self.prefix.as_str()) {
            if let Some(handler) = self.commands.get(name) {
                return Some(handler());
            }
        }
        self.default.as_ref().and_then(|f| f(in_message))
    }

    /// The configured command prefix (default "/").
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Registered command names, sorted.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// The bot's `start` reply, used by channels that greet new contacts.
    /// `None` when no `start` command is registered.
    pub fn greeting(&self) -> Option<String> {
        self.commands.get("start").map(|h| h())
    }
}

/// Builder for a `Bot`: prefix, commands, default response.
pub struct BotBuilder {
    prefix: String,
    commands: HashMap<String, CommandHandler>,
    default: Option<DefaultHandler>,
}

impl Default for BotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BotBuilder {
    pub fn new() -> Self {
        Self {
            prefix: "/".to_string(),
            commands: HashMap::new(),
            default: None,
        }
    }

    /// Override the command prefix (default "/").
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Register a command. Re-registering a name replaces the handler.
    pub fn command<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.commands.insert(name.into(), Arc::new(handler));
        self
    }

    /// Set the handler for non-command text.
    pub fn default_response<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Bot {
        Bot {
            dispatcher: Arc::new(Dispatcher {
                prefix: self.prefix,
                commands: self.commands,
                default: self.default,
            }),
            endpoints: Vec::new(),
        }
    }
}

/// A bot: one dispatcher plus the endpoints that feed it.
pub struct Bot {
    dispatcher: Arc<Dispatcher>,
    endpoints: Vec<Box<dyn Endpoint>>,
}

impl Bot {
    pub fn builder() -> BotBuilder {
        BotBuilder::new()
    }

    /// The shared dispatcher (e.g. for driving the bot without endpoints).
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Bind the dispatcher into the endpoint and take ownership of it.
    /// Endpoints are started in attachment order.
    pub fn add_endpoint(&mut self, mut endpoint: Box<dyn Endpoint>) {
        endpoint.bind(self.dispatcher.clone());
        self.endpoints.push(endpoint);
    }

    /// Start every endpoint. Each `start` resolves once that endpoint is
    /// live, so when `run` returns all channels are accepting traffic.
    /// The first failure aborts startup and is returned.
    pub async fn run(&mut self) -> Result<(), ChannelError> {
        for ep in self.endpoints.iter_mut() {
            log::info!("starting endpoint {}", ep.id());
            ep.start().await?;
        }
        Ok(())
    }

    /// Stop every endpoint. Errors are logged and stop continues through
    /// the remaining endpoints.
    pub async fn stop(&mut self) {
        for ep in self.endpoints.iter_mut() {
            if let Err(e) = ep.stop().await {
                log::warn!("stopping endpoint {} failed: {}", ep.id(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_reply_matches_handler() {
        let bot = Bot::builder()
            .command("hello", || "hello!".to_string())
            .command("bye", || "goodbye...".to_string())
            .build();
        let d = bot.dispatcher();
        assert_eq!(d.process("/hello"), Some("hello!".to_string()));
        assert_eq!(d.process("/bye"), Some("goodbye...".to_string()));
    }

    #[test]
    fn free_text_goes_to_default_response() {
        let bot = Bot::builder()
            .default_response(|t| Some(t.to_string()))
            .build();
        let d = bot.dispatcher();
        assert_eq!(d.process("hello"), Some("hello".to_string()));
        assert_eq!(d.process("123"), Some("123".to_string()));
    }

    #[test]
    fn unregistered_command_falls_through_to_default() {
        let bot = Bot::builder()
            .command("hello", || "hello!".to_string())
            .default_response(|t| Some(t.to_lowercase()))
            .build();
        let d = bot.dispatcher();
        assert_eq!(d.process("/nope"), Some("/nope".to_string()));
        // prefix must be stripped before lookup; "/hello " is not a match
        assert_eq!(d.process("/hello there"), Some("/hello there".to_string()));
    }

    #[test]
    fn no_default_response_means_no_reply() {
        let bot = Bot::builder().command("hi", || "hi".to_string()).build();
        let d = bot.dispatcher();
        assert_eq!(d.process("anything"), None);
        assert_eq!(d.process("/unknown"), None);
    }

    #[test]
    fn custom_prefix() {
        let bot = Bot::builder()
            .prefix("!")
            .command("ping", || "pong".to_string())
            .default_response(|t| Some(t.to_string()))
            .build();
        let d = bot.dispatcher();
        assert_eq!(d.process("!ping"), Some("pong".to_string()));
        assert_eq!(d.process("/ping"), Some("/ping".to_string()));
    }

    #[test]
    fn registries_do_not_leak_across_bots() {
        let a = Bot::builder().command("only_a", || "a".to_string()).build();
        let b = Bot::builder().command("only_b", || "b".to_string()).build();
        assert_eq!(a.dispatcher().process("/only_b"), None);
        assert_eq!(b.dispatcher().process("/only_a"), None);
        assert_eq!(a.dispatcher().command_names(), vec!["only_a".to_string()]);
    }

    #[test]
    fn greeting_is_the_start_command_reply() {
        let bot = Bot::builder().command("start", || "Hello!".to_string()).build();
        assert_eq!(bot.dispatcher().greeting(), Some("Hello!".to_string()));
        let silent = Bot::builder().build();
        assert_eq!(silent.dispatcher().greeting(), None);
    }
}
