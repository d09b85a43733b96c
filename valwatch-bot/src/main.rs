mod webhook;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use reqwest::{redirect, ClientBuilder};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use valwatch_core::{
    spawn_poller, ArticleStore, Delivery, Event, ForumClient, NewsClient, Sources, Stores,
    ThreadStore, WatchConfig,
};

use crate::webhook::DiscordWebhook;

const CONFIG_FILE: &str = "config.json";
const ENV_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
const ENV_LOG_FILE: &str = "VALWATCH_LOG_FILE";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let dir = WatchConfig::config_dir();
    let config = WatchConfig::load(dir.join(CONFIG_FILE));
    let poll = config.poll.to_poll_config();

    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent(concat!("valwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let stores = Stores {
        articles: ArticleStore::load_from(config.article_store_path(&dir)).await,
        threads: ThreadStore::load_from(config.thread_store_path(&dir)).await,
    };
    let sources = Sources {
        news: NewsClient::new(client.clone(), config.articles.page_url.clone(), poll),
        forum: ForumClient::new(client.clone(), &config.threads, poll),
    };

    let webhook = std::env::var(ENV_WEBHOOK_URL)
        .ok()
        .filter(|url| !url.trim().is_empty())
        .map(|url| {
            DiscordWebhook::new(url, client)
                .with_timeout(poll.request_timeout)
                .with_retries(poll.max_retries, poll.retry_backoff_ms)
        });
    if webhook.is_none() {
        warn!("{ENV_WEBHOOK_URL} not set, updates will only be logged");
    }

    let (update_tx, mut update_rx) = mpsc::channel(64);
    let poller = spawn_poller(sources, stores, config, update_tx);
    info!(config_dir = %dir.display(), "valwatch started");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            event = update_rx.recv() => match event {
                Some(Event::NewArticle(delivery)) => deliver(webhook.as_ref(), delivery).await,
                Some(Event::NewThreads(deliveries)) => {
                    for delivery in deliveries {
                        deliver(webhook.as_ref(), delivery).await;
                    }
                }
                None => {
                    warn!("poller exited");
                    break;
                }
            }
        }
    }

    // Undelivered events still queued count as failed deliveries.
    drop(update_rx);
    let stores = poller.stop().await?;
    info!(
        last_article = stores.articles.last_url().unwrap_or("-"),
        threads = stores.threads.len(),
        "poller stopped"
    );
    Ok(())
}

/// Sends one payload and reports the outcome back to the poller.
///
/// Without a webhook the log line is the delivery.
async fn deliver(webhook: Option<&DiscordWebhook>, delivery: Delivery) {
    let payload = &delivery.payload;
    let delivered = match webhook {
        Some(hook) => match hook.send(payload).await {
            Ok(()) => {
                info!(title = %payload.title, url = %payload.url, "delivered");
                true
            }
            Err(e) => {
                error!(title = %payload.title, error = %e, "delivery failed");
                false
            }
        },
        None => {
            info!(title = %payload.title, url = %payload.url, body = %payload.body, "update");
            true
        }
    };
    delivery.confirm(delivered);
}

/// Console logging, mirrored to `$VALWATCH_LOG_FILE` when set.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = std::env::var(ENV_LOG_FILE)
        .ok()
        .and_then(|path| open_log_file(Path::new(&path)))
        .map(|file| fmt::layer().with_ansi(false).with_writer(Mutex::new(file)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();
}

fn open_log_file(path: &Path) -> Option<std::fs::File> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("could not open log file {}: {e}", path.display());
            None
        }
    }
}
