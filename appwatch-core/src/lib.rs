pub mod cache;
pub mod checker;
pub mod client;
pub mod config;
pub mod error;
pub mod notify;
pub mod store;

pub use cache::{VersionCache, VersionRecord};
pub use checker::{
    AppOutcome, AppReport, OutcomeCounts, RunStatus, RunSummary, UpdateChecker,
    EXIT_CONFIG_ERROR,
};
pub use client::build_client;
pub use config::{AppConfig, Endpoints, PushMethod, PushTarget, RunConfig};
pub use error::{CacheError, ConfigError, LookupError, NotifyError};
pub use notify::{BarkNotifier, Notifier, TelegramNotifier, UpdateMessage};
pub use store::{StoreClient, StoreLookupResult};
