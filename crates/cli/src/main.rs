use clap::{Parser, Subcommand};
use lib::bot::Bot;
use lib::channels::{
    Endpoint, HttpEndpoint, RestTwitterApi, TelegramEndpoint, TwitterPollingEndpoint,
    TwitterStreamingEndpoint,
};
use lib::config::{self, Config};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "parrot")]
#[command(about = "Parrot CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the reference bot on every configured endpoint (HTTP, Telegram,
    /// Twitter) until Ctrl+C.
    Run {
        /// Config file path (default: PARROT_CONFIG_PATH or ~/.parrot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP endpoint port (default from config or 8000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Dispatch one message locally (no endpoints) and print the reply.
    Process {
        /// The message text, e.g. "/start"
        text: String,

        /// Config file path (default: PARROT_CONFIG_PATH or ~/.parrot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("parrot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run { config, port }) => {
            if let Err(e) = run(config, port).await {
                log::error!("run failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Process { text, config }) => {
            if let Err(e) = process_one(text, config) {
                log::error!("process failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// The reference bot: `start` answers the configured greeting, `ping`
/// answers pong, `help` lists the commands. Free text gets no reply.
fn build_bot(config: &Config) -> Bot {
    let prefix = config.bot.command_prefix.clone();
    let greeting = config.bot.greeting.clone();
    let help = format!("commands: {p}help, {p}ping, {p}start", p = prefix);
    Bot::builder()
        .prefix(prefix)
        .command("start", move || greeting.clone())
        .command("ping", || "pong".to_string())
        .command("help", move || help.clone())
        .build()
}

async fn run(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _path) = config::load_config(config_path)?;
    if let Some(p) = port {
        config.http.port = p;
    }

    let mut bot = build_bot(&config);
    let mut attached = 0usize;

    if config.http.enabled {
        bot.add_endpoint(Box::new(HttpEndpoint::new(
            config.http.bind.clone(),
            config.http.port,
        )));
        attached += 1;
    }

    if let Some(token) = config::resolve_telegram_token(&config) {
        bot.add_endpoint(Box::new(TelegramEndpoint::new(token)));
        attached += 1;
    }

    if let Some(token) = config::resolve_twitter_token(&config) {
        let mut api = RestTwitterApi::new(token);
        if let Some(ref url) = config.channels.twitter.stream_url {
            api = api.with_stream_url(url.clone());
        }
        let api = Arc::new(api);
        let endpoint: Box<dyn Endpoint> = if config.channels.twitter.streaming {
            Box::new(TwitterStreamingEndpoint::new(api))
        } else {
            Box::new(
                TwitterPollingEndpoint::new(api).with_poll_interval(Duration::from_secs(
                    config.channels.twitter.poll_interval_secs,
                )),
            )
        };
        bot.add_endpoint(endpoint);
        attached += 1;
    }

    if attached == 0 {
        anyhow::bail!("no endpoints configured (enable http or set channel credentials)");
    }

    bot.run().await?;
    log::info!("bot running on {} endpoint(s), Ctrl+C to stop", attached);

    tokio::signal::ctrl_c().await?;
    log::info!("shutdown signal received, stopping endpoints");
    bot.stop().await;
    Ok(())
}

fn process_one(
    text: String,
    config_path: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    let (config, _path) = config::load_config(config_path)?;
    let bot = build_bot(&config);
    match bot.dispatcher().process(&text) {
        Some(reply) => println!("{}", reply),
        None => println!("(no reply)"),
    }
    Ok(())
}
