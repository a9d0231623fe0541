use crate::{FeedMode, RemoteSource, SyncConfig, SyncError};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::value::RawValue;
use serde_json::Value;
use srt_core::WeaponCatalog;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const WEAPON_ENDPOINT: &str = "/api/v2/weapon";

/// Blocking stat.ink API client.
pub struct StatInkClient {
    http: Client,
    base_url: String,
    mode: FeedMode,
    api_key: Option<String>,
}

impl StatInkClient {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);
        if config.mode == FeedMode::User && api_key.is_none() {
            return Err(SyncError::InvalidConfig(
                "the user feed requires a stat.ink API key".to_string(),
            ));
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("srt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| SyncError::NetworkFetch(err.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            mode: config.mode,
            api_key,
        })
    }

    fn get(&self, endpoint: &str) -> RequestBuilder {
        let request = self.http.get(format!("{}{endpoint}", self.base_url));
        match self.api_key.as_deref() {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, SyncError> {
        let response = request
            .send()
            .map_err(|err| SyncError::NetworkFetch(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::NetworkFetch(format!(
                "{} returned {status}",
                response.url()
            )));
        }
        let body = response
            .bytes()
            .map_err(|err| SyncError::NetworkFetch(err.to_string()))?;
        Ok(body.to_vec())
    }

    /// Weapon list with the Grizzco-only weapons added.
    pub fn fetch_weapon_catalog(&self) -> Result<WeaponCatalog, SyncError> {
        let body = self.send(self.get(WEAPON_ENDPOINT))?;
        let value: Value = serde_json::from_slice(&body)
            .map_err(|err| SyncError::NetworkFetch(format!("weapon list: {err}")))?;
        Ok(WeaponCatalog::from_value(&value)?.with_grizzco_weapons())
    }
}

impl RemoteSource for StatInkClient {
    fn fetch_page(&self, newer_than: Option<u64>) -> Result<Vec<Box<RawValue>>, SyncError> {
        let mut query = vec![("order", "asc".to_string())];
        if let Some(id) = newer_than {
            query.push(("newer_than", id.to_string()));
        }
        let body = self.send(self.get(self.mode.endpoint()).query(&query))?;
        let page: Vec<Box<RawValue>> = serde_json::from_slice(&body)
            .map_err(|err| SyncError::NetworkFetch(format!("job page: {err}")))?;
        debug!(
            event = "statink_page",
            mode = %self.mode,
            newer_than = ?newer_than,
            records = page.len()
        );
        Ok(page)
    }
}
