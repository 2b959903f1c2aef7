//! CRM contact sync.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use ecospray_shared::{CrmConfig, Result, SiteError, secret_from_env};

/// Contact payload sent to the CRM upsert endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CrmContact {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub source: String,
    pub tags: Vec<String>,
}

/// Client for the CRM's contact upsert endpoint.
pub struct CrmClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CrmClient {
    /// Build a client, or `None` when no CRM is configured.
    pub fn from_config(config: &CrmConfig) -> Result<Option<Self>> {
        let Some(base_url) = config.base_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SiteError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: secret_from_env(&config.api_key_env),
        }))
    }

    /// Create or update a contact, matched by e-mail.
    #[instrument(skip_all)]
    pub async fn upsert_contact(&self, contact: &CrmContact) -> Result<()> {
        let url = format!("{}/contacts/upsert", self.base_url);
        let mut request = self.client.post(&url).json(contact);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SiteError::request("CRM", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                format!("CRM returned HTTP {status}")
            } else {
                body
            };
            return Err(SiteError::upstream(Some(status.as_u16()), message));
        }

        debug!("CRM contact upserted");
        Ok(())
    }
}
