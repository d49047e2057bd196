use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::LookupError;

const UNKNOWN_APP_NAME: &str = "Unknown";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    result_count: u32,
    #[serde(default)]
    results: Vec<LookupEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupEntry {
    version: Option<String>,
    track_name: Option<String>,
    release_notes: Option<String>,
    track_view_url: Option<String>,
}

/// What the store currently reports for one app id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLookupResult {
    pub app_id: String,
    pub app_name: String,
    pub version: String,
    /// `false` when the store has no record for the id (removed or invalid app).
    pub found: bool,
    pub release_notes: Option<String>,
    pub store_url: Option<String>,
}

impl StoreLookupResult {
    pub fn not_found(app_id: &str) -> Self {
        Self {
            app_id: app_id.to_owned(),
            app_name: UNKNOWN_APP_NAME.to_owned(),
            version: String::new(),
            found: false,
            release_notes: None,
            store_url: None,
        }
    }
}

/// Client for the App Store lookup API, bound to one storefront.
#[derive(Debug, Clone)]
pub struct StoreClient {
    client: Client,
    lookup_url: Url,
    storefront: String,
}

impl StoreClient {
    pub fn new(client: Client, lookup_url: Url, storefront: impl Into<String>) -> Self {
        Self {
            client,
            lookup_url,
            storefront: storefront.into(),
        }
    }

    pub fn storefront(&self) -> &str {
        &self.storefront
    }

    fn request_url(&self, app_id: &str) -> Url {
        let mut url = self.lookup_url.clone();
        url.query_pairs_mut()
            .append_pair("id", app_id)
            .append_pair("country", &self.storefront);
        url
    }

    /// Fetches the current listing for `app_id`. Timeouts and non-2xx answers
    /// surface as [`LookupError::Network`].
    pub async fn lookup(&self, app_id: &str) -> Result<StoreLookupResult, LookupError> {
        let response = self
            .client
            .get(self.request_url(app_id))
            .send()
            .await?
            .error_for_status()?;
        let body: LookupResponse = response.json().await?;
        debug!(app_id, result_count = body.result_count, "lookup answered");

        let Some(entry) = body.results.into_iter().next() else {
            return Ok(StoreLookupResult::not_found(app_id));
        };
        let version = entry
            .version
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| LookupError::MissingVersion(app_id.to_owned()))?;

        Ok(StoreLookupResult {
            app_id: app_id.to_owned(),
            app_name: entry
                .track_name
                .unwrap_or_else(|| UNKNOWN_APP_NAME.to_owned()),
            version,
            found: true,
            release_notes: entry.release_notes.filter(|n| !n.trim().is_empty()),
            store_url: entry.track_view_url,
        })
    }
}
