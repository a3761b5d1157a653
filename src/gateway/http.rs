use async_trait::async_trait;
use anyhow::Context;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

use super::{Credential, GatewayError, NotamGateway};
use crate::filters::FilterState;
use crate::notams::NotamRecord;

/// REST client for a NOTAM backend
///
/// Endpoints, relative to `base_url`:
/// - `GET /notams?region=&type=&dateRange=&minAlt=&maxAlt=`
/// - `GET /notams/search?q=`
/// - `GET /notams/{id}`
pub struct HttpNotamGateway {
    client: Client,
    base_url: Url,
}

impl HttpNotamGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("notamboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        let base_url = base_url.into();
        let base_url = Url::parse(&base_url).with_context(|| format!("Invalid NOTAM API URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("NOTAM API URL cannot carry a path: {}", base_url);
        }

        Ok(Self { client, base_url })
    }

    /// `base_url` with `segments` appended, each percent-encoded as one path segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Query parameters for a structured list fetch
    fn list_params(filters: &FilterState) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("region", filters.region.to_string()),
            (
                "type",
                filters
                    .category
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "all".to_string()),
            ),
            ("dateRange", filters.date_range.to_string()),
        ];
        if let Some(min) = filters.altitude.min_ft {
            params.push(("minAlt", min.to_string()));
        }
        if let Some(max) = filters.altitude.max_ft {
            params.push(("maxAlt", max.to_string()));
        }
        params
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&str, String)],
        credential: &Credential,
        not_found_id: Option<&str>,
    ) -> Result<T, GatewayError> {
        let mut request = self.client.get(url.clone()).query(params);
        if !credential.is_empty() {
            request = request.bearer_auth(credential.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND
            && let Some(id) = not_found_id
        {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(
                status.as_u16(),
                body.chars().take(200).collect::<String>(),
            ));
        }

        // Read response body as text first for better error reporting
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to read response body: {}", e)))?;

        debug!(
            "NOTAM API response (first 500 chars): {}",
            &text.chars().take(500).collect::<String>()
        );

        serde_json::from_str(&text).map_err(|e| {
            GatewayError::Transport(format!(
                "failed to parse NOTAM API response: {}. Response: {}",
                e,
                &text.chars().take(200).collect::<String>()
            ))
        })
    }
}

#[async_trait]
impl NotamGateway for HttpNotamGateway {
    async fn fetch_list(
        &self,
        filters: &FilterState,
        credential: &Credential,
    ) -> Result<Vec<NotamRecord>, GatewayError> {
        let url = self.endpoint(&["notams"]);
        let records: Vec<NotamRecord> = self
            .get_json(url, &Self::list_params(filters), credential, None)
            .await?;
        info!(
            "Fetched {} NOTAMs (region={}, dateRange={})",
            records.len(),
            filters.region,
            filters.date_range
        );
        Ok(records)
    }

    async fn search(&self, term: &str, credential: &Credential) -> Result<Vec<NotamRecord>, GatewayError> {
        let url = self.endpoint(&["notams", "search"]);
        let records: Vec<NotamRecord> = self
            .get_json(url, &[("q", term.to_string())], credential, None)
            .await?;
        info!("Search '{}' returned {} NOTAMs", term, records.len());
        Ok(records)
    }

    async fn fetch_detail(&self, id: &str, credential: &Credential) -> Result<NotamRecord, GatewayError> {
        // NOTAM ids contain '/', e.g. "A1234/23", so the id is one encoded segment
        let url = self.endpoint(&["notams", id]);
        self.get_json(url, &[], credential, Some(id)).await
    }
}
