use std::fmt;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::config::{PushMethod, PushTarget, RunConfig};
use crate::error::NotifyError;
use crate::store::StoreLookupResult;

const RELEASE_NOTES_LIMIT: usize = 200;
const NO_RELEASE_NOTES: &str = "No release notes provided.";
const BARK_GROUP: &str = "App Store Updates";
const BARK_SOUND: &str = "bell";

/// A rendered update notification, independent of the delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMessage {
    pub title: String,
    pub body: String,
    pub url: Option<String>,
}

impl UpdateMessage {
    pub fn for_update(result: &StoreLookupResult, previous: &str) -> Self {
        let notes = result
            .release_notes
            .as_deref()
            .map(|n| truncate_chars(n.trim(), RELEASE_NOTES_LIMIT))
            .unwrap_or_else(|| NO_RELEASE_NOTES.to_owned());
        Self {
            title: format!("📱 {} updated", result.app_name),
            body: format!(
                "Version: {} → {}\n\nWhat's new:\n{}",
                previous, result.version, notes
            ),
            url: result.store_url.clone(),
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_owned(),
    }
}

/// Escapes text for Telegram's HTML parse mode.
fn escape_html(text: &str) -> String {
    text.chars()
        .fold(String::with_capacity(text.len()), |mut out, c| {
            match c {
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '&' => out.push_str("&amp;"),
                '"' => out.push_str("&quot;"),
                _ => out.push(c),
            }
            out
        })
}

// Request URLs embed the Bark key or the bot token.
fn network_error(err: reqwest::Error) -> NotifyError {
    NotifyError::Network(err.without_url())
}

fn join_base(base: &Url, tail: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        tail.trim_start_matches('/')
    )
}

#[derive(Debug, Serialize)]
struct BarkForm<'a> {
    title: &'a str,
    body: &'a str,
    group: &'a str,
    sound: &'a str,
    #[serde(rename = "isArchive")]
    is_archive: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Clone)]
pub struct BarkNotifier {
    client: Client,
    server: Url,
    key: String,
}

impl BarkNotifier {
    /// `key` is the device key, optionally followed by further path segments.
    pub fn new(client: Client, server: Url, key: impl Into<String>) -> Self {
        Self {
            client,
            server,
            key: key.into(),
        }
    }

    pub async fn send(&self, message: &UpdateMessage) -> Result<(), NotifyError> {
        let form = BarkForm {
            title: &message.title,
            body: &message.body,
            group: BARK_GROUP,
            sound: BARK_SOUND,
            is_archive: "1",
            url: message.url.as_deref(),
        };
        let response = self
            .client
            .post(join_base(&self.server, self.key.trim_matches('/')))
            .form(&form)
            .send()
            .await
            .map_err(network_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status));
        }
        info!(title = %message.title, "bark push delivered");
        Ok(())
    }
}

impl fmt::Debug for BarkNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarkNotifier")
            .field("server", &self.server.as_str())
            .field("key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api: Url,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(
        client: Client,
        api: Url,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api,
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn render(message: &UpdateMessage) -> String {
        let mut text = format!(
            "<b>{}</b>\n\n{}",
            escape_html(&message.title),
            escape_html(&message.body)
        );
        if let Some(url) = &message.url {
            text.push_str(&format!(
                "\n\n<a href=\"{}\">View in App Store</a>",
                escape_html(url)
            ));
        }
        text
    }

    pub async fn send(&self, message: &UpdateMessage) -> Result<(), NotifyError> {
        let payload = TelegramMessage {
            chat_id: &self.chat_id,
            text: Self::render(message),
            parse_mode: "HTML",
            disable_web_page_preview: false,
        };
        let endpoint = join_base(&self.api, &format!("bot{}/sendMessage", self.bot_token));
        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(network_error)?;
        let status = response.status();
        let body = response.json::<TelegramResponse>().await;

        match body {
            Ok(body) if status.is_success() && body.ok => {
                info!(title = %message.title, "telegram push delivered");
                Ok(())
            }
            Ok(TelegramResponse {
                description: Some(description),
                ..
            }) => Err(NotifyError::Rejected(description)),
            Ok(_) if status.is_success() => {
                Err(NotifyError::Rejected("ok=false without description".into()))
            }
            Ok(_) => Err(NotifyError::Status(status)),
            Err(e) if status.is_success() => Err(network_error(e)),
            Err(e) => {
                debug!(error = %e.without_url(), "telegram error body was not JSON");
                Err(NotifyError::Status(status))
            }
        }
    }
}

impl fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api", &self.api.as_str())
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// The push channel chosen for the run.
#[derive(Debug, Clone)]
pub enum Notifier {
    Bark(BarkNotifier),
    Telegram(TelegramNotifier),
}

impl Notifier {
    pub fn from_config(config: &RunConfig, client: Client) -> Self {
        match &config.push {
            PushTarget::Bark { key } => Notifier::Bark(BarkNotifier::new(
                client,
                config.endpoints.bark_server.clone(),
                key.clone(),
            )),
            PushTarget::Telegram { bot_token, chat_id } => {
                Notifier::Telegram(TelegramNotifier::new(
                    client,
                    config.endpoints.telegram_api.clone(),
                    bot_token.clone(),
                    chat_id.clone(),
                ))
            }
        }
    }

    pub fn method(&self) -> PushMethod {
        match self {
            Notifier::Bark(_) => PushMethod::Bark,
            Notifier::Telegram(_) => PushMethod::Telegram,
        }
    }

    pub async fn send(&self, message: &UpdateMessage) -> Result<(), NotifyError> {
        match self {
            Notifier::Bark(bark) => bark.send(message).await,
            Notifier::Telegram(telegram) => telegram.send(message).await,
        }
    }
}
