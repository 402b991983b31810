//! Notification delivery for the freeze sweep.
//!
//! Delivery is fire-and-forget at the sweep boundary: failures are logged,
//! never propagated. The Telegram sender follows the Bot API `sendMessage`
//! call the product's chat front end uses.

use reqwest::Client;
use serde_json::json;

use crate::error::NotifyError;
use crate::habit::User;

/// Outbound notification channel.
pub trait Notifier: Send + Sync {
    fn notify(&self, user: &User, message: &str) -> Result<(), NotifyError>;
}

impl Notifier for Box<dyn Notifier> {
    fn notify(&self, user: &User, message: &str) -> Result<(), NotifyError> {
        (**self).notify(user, message)
    }
}

/// Logs notifications instead of delivering them. Default when no bot
/// token is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user: &User, message: &str) -> Result<(), NotifyError> {
        tracing::info!(user = %user.id, message, "notification (log only)");
        Ok(())
    }
}

/// Delivers via the Telegram Bot API.
///
/// Must be called from within a tokio runtime context (the sweep's
/// blocking section qualifies): the send blocks on the shared runtime,
/// mirroring how the rest of the codebase drives reqwest from sync code.
pub struct TelegramNotifier {
    bot_token: String,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            client: Client::new(),
        }
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, user: &User, message: &str) -> Result<(), NotifyError> {
        let chat_id = user.telegram_id.ok_or_else(|| NotifyError::NoAddress(user.id.clone()))?;

        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = json!({
            "chat_id": chat_id,
            "text": message,
            "parse_mode": "HTML",
        });

        let handle = tokio::runtime::Handle::current();
        let resp = handle.block_on(self.client.post(&url).json(&body).send())?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let text = handle.block_on(resp.text()).unwrap_or_default();
        Err(NotifyError::DeliveryFailed {
            status: status.as_u16(),
            message: text,
        })
    }
}
