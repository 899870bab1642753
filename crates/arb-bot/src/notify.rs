//! Notification sinks.
//!
//! Every sink is best-effort: failures are logged and reported as `false`,
//! never propagated. Sinks are built once at startup; only the announcement
//! cooldown of the notify section is re-read on reload.

use std::sync::Arc;
use std::time::Duration;

use arb_core::NotificationSink;
use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::NotifyConfig;
use crate::error::{AppError, AppResult};

/// Environment variable holding the Telegram bot token.
pub const TELEGRAM_TOKEN_ENV: &str = "ARB_TELEGRAM_TOKEN";

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Writes notifications to the log.
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, text: &str) -> bool {
        info!(target: "arb::notify", "{text}");
        true
    }
}

/// POSTs `{"text": ...}` to a webhook.
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, text: &str) -> bool {
        let body = serde_json::json!({ "text": text });
        post(&self.client, &self.url, &body, "webhook").await
    }
}

/// Sends messages through the Telegram Bot API.
pub struct TelegramSink {
    client: Client,
    base_url: String,
    token: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(token: String, chat_id: String, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: TELEGRAM_API.to_string(),
            token,
            chat_id,
        })
    }

    /// Point at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token)
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn notify(&self, text: &str) -> bool {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        post(&self.client, &self.endpoint(), &body, "telegram").await
    }
}

/// Delivers to every inner sink. Succeeds if any one did.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn notify(&self, text: &str) -> bool {
        let results = join_all(self.sinks.iter().map(|s| s.notify(text))).await;
        results.into_iter().any(|delivered| delivered)
    }
}

/// Build the sink for `config`. The log sink is always included.
pub fn build_notifier(config: &NotifyConfig) -> AppResult<Arc<dyn NotificationSink>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let log: Arc<dyn NotificationSink> = Arc::new(TracingSink);
    let mut sinks = vec![log];

    if let Some(url) = &config.webhook_url {
        sinks.push(Arc::new(WebhookSink::new(url.clone(), timeout)?));
    }
    if let Some(chat_id) = &config.telegram_chat_id {
        match std::env::var(TELEGRAM_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => {
                sinks.push(Arc::new(TelegramSink::new(token, chat_id.clone(), timeout)?));
            }
            _ => warn!(
                env = TELEGRAM_TOKEN_ENV,
                "Telegram chat configured without a bot token, skipping"
            ),
        }
    }

    info!(sinks = sinks.len(), "Notification sinks ready");
    Ok(Arc::new(FanoutSink::new(sinks)))
}

fn build_client(timeout: Duration) -> AppResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Startup(format!("Failed to build HTTP client: {e}")))
}

async fn post(client: &Client, url: &str, body: &serde_json::Value, sink: &str) -> bool {
    match client.post(url).json(body).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            warn!(sink, status = %response.status(), "Notification rejected");
            false
        }
        Err(e) => {
            warn!(sink, error = %e, "Notification failed");
            false
        }
    }
}
