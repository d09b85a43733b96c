use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::warn;
use valwatch_core::{retry_backoff, Payload};

/// Posts payloads to a Discord channel through an incoming webhook.
#[derive(Clone)]
pub struct DiscordWebhook {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff_ms: u64,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>, client: Client) -> Self {
        Self {
            url: url.into(),
            client,
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_ms: 500,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u8, backoff_ms: u64) -> Self {
        self.max_retries = retries.max(1);
        self.backoff_ms = backoff_ms;
        self
    }

    pub async fn send(&self, payload: &Payload) -> Result<()> {
        let message = WebhookMessage::from(payload);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&message)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            warn!(attempt, error = %err, "webhook delivery failed, retrying");
            tokio::time::sleep(retry_backoff(self.backoff_ms, attempt)).await;
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    url: String,
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Serialize)]
struct Thumbnail {
    url: String,
}

impl From<&Payload> for WebhookMessage {
    fn from(payload: &Payload) -> Self {
        Self {
            content: payload.announcement.clone(),
            embeds: vec![Embed {
                title: payload.title.clone(),
                url: payload.url.clone(),
                description: payload.body.clone(),
                color: payload.accent_color.0,
                thumbnail: payload
                    .thumbnail_url
                    .clone()
                    .map(|url| Thumbnail { url }),
            }],
        }
    }
}
