use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("unsupported push method '{0}', expected 'bark' or 'telegram'")]
    UnsupportedPushMethod(String),
    #[error("{0} must not be empty when PUSH_METHOD={1}")]
    MissingCredential(&'static str, &'static str),
    #[error("APP_IDS contains no app ids")]
    NoAppIds,
    #[error("app id '{0}' is not numeric")]
    InvalidAppId(String),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("lookup result for app {0} has no version field")]
    MissingVersion(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Built with the request URL stripped, since it carries credentials.
    #[error("network error: {0}")]
    Network(reqwest::Error),
    #[error("push endpoint answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("telegram rejected the message: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
