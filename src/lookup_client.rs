use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;

use crate::config::AppConfig;
use crate::error::LookupError;

/// Resolves one search term against the remote code service.
///
/// Implementations make a single attempt; fallback and pacing are the
/// scheduler's concern.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, search_key: &str) -> Result<String, LookupError>;
}

pub struct HttpLookupClient {
    client: Client,
    endpoint: String,
    param: String,
}

impl HttpLookupClient {
    pub fn new(endpoint: impl Into<String>, param: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| LookupError::Network(e.to_string()))?;

        let endpoint = endpoint.into();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(LookupError::InvalidEndpoint(endpoint));
        }

        Ok(HttpLookupClient {
            client,
            endpoint,
            param: param.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, LookupError> {
        Self::new(&config.lookup_endpoint, &config.lookup_param, config.lookup_timeout)
    }

    fn request_url(&self, search_key: &str) -> String {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}={}",
            self.endpoint,
            sep,
            self.param,
            urlencoding::encode(search_key)
        )
    }
}

#[async_trait]
impl Lookup for HttpLookupClient {
    async fn lookup(&self, search_key: &str) -> Result<String, LookupError> {
        let url = self.request_url(search_key);
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!("Lookup for '{}' rejected with status {}", search_key, status);
            return Err(LookupError::RemoteRejection {
                status: status.as_u16(),
            });
        }

        Ok(resp.text().await?)
    }
}
