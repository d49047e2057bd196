use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{info, warn};

use crate::cache::{VersionCache, VersionRecord};
use crate::config::{AppConfig, RunConfig};
use crate::notify::{Notifier, UpdateMessage};
use crate::store::StoreClient;

pub const EXIT_CONFIG_ERROR: u8 = 1;

/// Result of checking a single app during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppOutcome {
    /// First sighting: version recorded, nothing sent.
    Initialized { app_name: String, version: String },
    Unchanged { app_name: String, version: String },
    Notified {
        app_name: String,
        previous: String,
        current: String,
    },
    /// The cache still moves to `current` so the next run does not resend.
    NotifyFailed {
        app_name: String,
        previous: String,
        current: String,
        error: String,
    },
    NotFound,
    LookupFailed { error: String },
}

impl AppOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AppOutcome::Initialized { .. } => "initialized",
            AppOutcome::Unchanged { .. } => "unchanged",
            AppOutcome::Notified { .. } => "changed+notified",
            AppOutcome::NotifyFailed { .. } => "changed+notify-failed",
            AppOutcome::NotFound => "skipped-not-found",
            AppOutcome::LookupFailed { .. } => "skipped-error",
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, AppOutcome::NotFound | AppOutcome::LookupFailed { .. })
    }
}

impl fmt::Display for AppOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppOutcome::Initialized { app_name, version }
            | AppOutcome::Unchanged { app_name, version } => {
                write!(f, "{} {} (v{})", self.label(), app_name, version)
            }
            AppOutcome::Notified {
                app_name,
                previous,
                current,
            } => write!(f, "{} {} {} -> {}", self.label(), app_name, previous, current),
            AppOutcome::NotifyFailed {
                app_name,
                previous,
                current,
                error,
            } => write!(
                f,
                "{} {} {} -> {}: {}",
                self.label(),
                app_name,
                previous,
                current,
                error
            ),
            AppOutcome::NotFound => f.write_str(self.label()),
            AppOutcome::LookupFailed { error } => write!(f, "{}: {}", self.label(), error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppReport {
    pub app_id: String,
    pub outcome: AppOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Cache save or a push delivery failed.
    Degraded,
    /// No app lookup completed.
    Failed,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Degraded => 2,
            RunStatus::Failed => 3,
        }
    }
}

/// Number of apps per outcome in one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub initialized: usize,
    pub unchanged: usize,
    pub notified: usize,
    pub notify_failed: usize,
    pub not_found: usize,
    pub lookup_failed: usize,
}

impl OutcomeCounts {
    pub fn skipped(&self) -> usize {
        self.not_found + self.lookup_failed
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In processing order.
    pub reports: Vec<AppReport>,
    pub cache_error: Option<String>,
}

impl RunSummary {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for report in &self.reports {
            match report.outcome {
                AppOutcome::Initialized { .. } => counts.initialized += 1,
                AppOutcome::Unchanged { .. } => counts.unchanged += 1,
                AppOutcome::Notified { .. } => counts.notified += 1,
                AppOutcome::NotifyFailed { .. } => counts.notify_failed += 1,
                AppOutcome::NotFound => counts.not_found += 1,
                AppOutcome::LookupFailed { .. } => counts.lookup_failed += 1,
            }
        }
        counts
    }

    pub fn status(&self) -> RunStatus {
        let all_failed = !self.reports.is_empty()
            && self
                .reports
                .iter()
                .all(|r| matches!(r.outcome, AppOutcome::LookupFailed { .. }));
        let notify_failed = self
            .reports
            .iter()
            .any(|r| matches!(r.outcome, AppOutcome::NotifyFailed { .. }));

        if all_failed {
            RunStatus::Failed
        } else if self.cache_error.is_some() || notify_failed {
            RunStatus::Degraded
        } else {
            RunStatus::Success
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.status().exit_code()
    }

    /// Emits the final summary line.
    pub fn log(&self) {
        let elapsed_ms = (self.finished_at - self.started_at).num_milliseconds();
        let status = self.status();
        let counts = self.counts();
        let line = format!(
            "checked {} apps: {} initialized, {} unchanged, {} notified, {} notify-failed, {} skipped",
            self.reports.len(),
            counts.initialized,
            counts.unchanged,
            counts.notified,
            counts.notify_failed,
            counts.skipped(),
        );
        match status {
            RunStatus::Success => info!(?status, elapsed_ms, "{line}"),
            _ => warn!(?status, elapsed_ms, cache_error = ?self.cache_error, "{line}"),
        }
    }
}

/// Runs the check-compare-notify pass over the configured apps. Owns the
/// version cache for the duration of the run.
#[derive(Debug, Clone)]
pub struct UpdateChecker {
    store: StoreClient,
    notifier: Notifier,
    cache: VersionCache,
}

impl UpdateChecker {
    pub fn new(store: StoreClient, notifier: Notifier, cache: VersionCache) -> Self {
        Self {
            store,
            notifier,
            cache,
        }
    }

    pub fn from_config(config: &RunConfig, client: Client) -> Self {
        let store = StoreClient::new(
            client.clone(),
            config.endpoints.lookup_url.clone(),
            config.storefront.clone(),
        );
        let notifier = Notifier::from_config(config, client);
        Self::new(store, notifier, VersionCache::new(config.cache_path.clone()))
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Checks one app against `record`, notifying and updating the record as needed.
    pub async fn check_app(&self, app: &AppConfig, record: &mut VersionRecord) -> AppOutcome {
        let result = match self.store.lookup(&app.app_id).await {
            Ok(result) if result.found => result,
            Ok(_) => return AppOutcome::NotFound,
            Err(err) => {
                return AppOutcome::LookupFailed {
                    error: err.to_string(),
                }
            }
        };

        let previous = match record.get(&app.app_id) {
            None => {
                record.insert(app.app_id.as_str(), result.version.as_str());
                return AppOutcome::Initialized {
                    app_name: result.app_name,
                    version: result.version,
                };
            }
            Some(previous) if previous == result.version => {
                return AppOutcome::Unchanged {
                    app_name: result.app_name,
                    version: result.version,
                };
            }
            Some(previous) => previous.to_owned(),
        };

        let message = UpdateMessage::for_update(&result, &previous);
        let delivery = self.notifier.send(&message).await;
        record.insert(app.app_id.as_str(), result.version.as_str());

        match delivery {
            Ok(()) => AppOutcome::Notified {
                app_name: result.app_name,
                previous,
                current: result.version,
            },
            Err(err) => AppOutcome::NotifyFailed {
                app_name: result.app_name,
                previous,
                current: result.version,
                error: err.to_string(),
            },
        }
    }

    /// Loads the cache, checks every app in order, then saves the cache once.
    pub async fn run(&self, apps: &[AppConfig]) -> RunSummary {
        let started_at = Utc::now();
        info!(
            push_method = %self.notifier.method(),
            storefront = self.store.storefront(),
            apps = apps.len(),
            "starting update check"
        );

        let mut record = self.cache.load().await;
        let mut reports = Vec::with_capacity(apps.len());

        for app in apps {
            let outcome = self.check_app(app, &mut record).await;
            match &outcome {
                AppOutcome::NotifyFailed { .. } | AppOutcome::LookupFailed { .. } => {
                    warn!(app_id = %app.app_id, outcome = %outcome, "app checked")
                }
                AppOutcome::NotFound => {
                    warn!(app_id = %app.app_id, outcome = %outcome, "app not found in storefront")
                }
                _ => info!(app_id = %app.app_id, outcome = %outcome, "app checked"),
            }
            reports.push(AppReport {
                app_id: app.app_id.clone(),
                outcome,
            });
        }

        let cache_error = match self.cache.save(&record).await {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, path = %self.cache.path().display(), "failed to persist version cache");
                Some(err.to_string())
            }
        };

        RunSummary {
            started_at,
            finished_at: Utc::now(),
            reports,
            cache_error,
        }
    }
}
