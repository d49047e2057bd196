use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_STOREFRONT: &str = "us";
pub const DEFAULT_CACHE_PATH: &str = "version_cache.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOOKUP_URL: &str = "https://itunes.apple.com/lookup";
pub const DEFAULT_BARK_SERVER: &str = "https://api.day.app";
pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushMethod {
    Bark,
    Telegram,
}

impl PushMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushMethod::Bark => "bark",
            PushMethod::Telegram => "telegram",
        }
    }
}

impl fmt::Display for PushMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bark" => Ok(PushMethod::Bark),
            "telegram" => Ok(PushMethod::Telegram),
            _ => Err(ConfigError::UnsupportedPushMethod(s.trim().to_owned())),
        }
    }
}

/// One monitored app, identified by its numeric App Store id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppConfig {
    pub app_id: String,
}

impl AppConfig {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let app_id = raw.trim();
        if app_id.is_empty() || !app_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidAppId(app_id.to_owned()));
        }
        Ok(Self {
            app_id: app_id.to_owned(),
        })
    }
}

/// Selected push channel together with the credentials it needs.
#[derive(Clone, PartialEq, Eq)]
pub enum PushTarget {
    Bark { key: String },
    Telegram { bot_token: String, chat_id: String },
}

impl PushTarget {
    pub fn method(&self) -> PushMethod {
        match self {
            PushTarget::Bark { .. } => PushMethod::Bark,
            PushTarget::Telegram { .. } => PushMethod::Telegram,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub lookup_url: Url,
    pub bark_server: Url,
    pub telegram_api: Url,
}

/// Everything a single run needs, read once at start-up.
#[derive(Clone)]
pub struct RunConfig {
    pub push: PushTarget,
    /// Configured order, duplicates included.
    pub app_ids: Vec<AppConfig>,
    pub storefront: String,
    pub cache_path: PathBuf,
    pub request_timeout: Duration,
    pub endpoints: Endpoints,
}

impl RunConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key/value source.
    ///
    /// Blank values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let method: PushMethod = get("PUSH_METHOD")
            .ok_or(ConfigError::Missing("PUSH_METHOD"))?
            .parse()?;

        let push = match method {
            PushMethod::Bark => PushTarget::Bark {
                key: get("BARK_KEY").ok_or(ConfigError::MissingCredential("BARK_KEY", "bark"))?,
            },
            PushMethod::Telegram => PushTarget::Telegram {
                bot_token: get("TELEGRAM_BOT_TOKEN")
                    .ok_or(ConfigError::MissingCredential("TELEGRAM_BOT_TOKEN", "telegram"))?,
                chat_id: get("TELEGRAM_CHAT_ID")
                    .ok_or(ConfigError::MissingCredential("TELEGRAM_CHAT_ID", "telegram"))?,
            },
        };

        let app_ids = parse_app_ids(&get("APP_IDS").ok_or(ConfigError::Missing("APP_IDS"))?)?;

        let storefront = get("APP_STORE_COUNTRY")
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_STOREFRONT.to_owned());

        let cache_path = get("VERSION_CACHE_PATH")
            .unwrap_or_else(|| DEFAULT_CACHE_PATH.to_owned())
            .into();

        let request_timeout = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => parse_timeout(&raw)?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let endpoints = Endpoints {
            lookup_url: parse_url(
                "APP_STORE_LOOKUP_URL",
                get("APP_STORE_LOOKUP_URL").as_deref().unwrap_or(DEFAULT_LOOKUP_URL),
            )?,
            bark_server: parse_url(
                "BARK_SERVER",
                get("BARK_SERVER").as_deref().unwrap_or(DEFAULT_BARK_SERVER),
            )?,
            telegram_api: parse_url(
                "TELEGRAM_API_URL",
                get("TELEGRAM_API_URL").as_deref().unwrap_or(DEFAULT_TELEGRAM_API),
            )?,
        };

        Ok(Self {
            push,
            app_ids,
            storefront,
            cache_path,
            request_timeout,
            endpoints,
        })
    }

    pub fn push_method(&self) -> PushMethod {
        self.push.method()
    }

    pub fn bark_key(&self) -> Option<&str> {
        match &self.push {
            PushTarget::Bark { key } => Some(key),
            PushTarget::Telegram { .. } => None,
        }
    }

    pub fn telegram_bot_token(&self) -> Option<&str> {
        match &self.push {
            PushTarget::Telegram { bot_token, .. } => Some(bot_token),
            PushTarget::Bark { .. } => None,
        }
    }

    pub fn telegram_chat_id(&self) -> Option<&str> {
        match &self.push {
            PushTarget::Telegram { chat_id, .. } => Some(chat_id),
            PushTarget::Bark { .. } => None,
        }
    }
}

// Credentials stay out of logs.
impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("push_method", &self.push_method())
            .field("credentials", &"<redacted>")
            .field("app_ids", &self.app_ids)
            .field("storefront", &self.storefront)
            .field("cache_path", &self.cache_path)
            .field("request_timeout", &self.request_timeout)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

fn parse_app_ids(raw: &str) -> Result<Vec<AppConfig>, ConfigError> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(AppConfig::parse)
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        return Err(ConfigError::NoAppIds);
    }
    Ok(ids)
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        Ok(_) => Err(ConfigError::InvalidValue {
            key: "REQUEST_TIMEOUT_SECS",
            reason: "must be greater than zero".into(),
        }),
        Err(e) => Err(ConfigError::InvalidValue {
            key: "REQUEST_TIMEOUT_SECS",
            reason: e.to_string(),
        }),
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key,
        reason: e.to_string(),
    })
}
