use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::{Credential, GatewayError, NotamGateway};
use crate::filters::FilterState;
use crate::notams::NotamRecord;

/// Gateway over a fixed record set
///
/// Applies the same structured filter rules a real backend would. Optional detail
/// overlays stand in for fields that only a detail fetch returns.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    records: Vec<NotamRecord>,
    details: HashMap<String, NotamRecord>,
}

impl InMemoryGateway {
    pub fn new(records: Vec<NotamRecord>) -> Self {
        Self {
            records,
            details: HashMap::new(),
        }
    }

    /// Load records from a JSON array file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let records: Vec<NotamRecord> =
            serde_json::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(Self::new(records))
    }

    /// Detail fields returned by `fetch_detail` for `detail.id`
    pub fn with_detail(mut self, detail: NotamRecord) -> Self {
        self.details.insert(detail.id.clone(), detail);
        self
    }

    pub fn records(&self) -> &[NotamRecord] {
        &self.records
    }
}

fn matches_term(record: &NotamRecord, term: &str) -> bool {
    let term = term.to_lowercase();
    record.id.to_lowercase().contains(&term)
        || record.location.to_lowercase().contains(&term)
        || record.description.to_lowercase().contains(&term)
}

#[async_trait]
impl NotamGateway for InMemoryGateway {
    async fn fetch_list(
        &self,
        filters: &FilterState,
        _credential: &Credential,
    ) -> Result<Vec<NotamRecord>, GatewayError> {
        let now = Utc::now();
        let records: Vec<NotamRecord> = self
            .records
            .iter()
            .filter(|r| filters.matches(r, now))
            .cloned()
            .collect();
        debug!("In-memory list fetch matched {} of {}", records.len(), self.records.len());
        Ok(records)
    }

    async fn search(&self, term: &str, _credential: &Credential) -> Result<Vec<NotamRecord>, GatewayError> {
        let term = term.trim();
        Ok(self
            .records
            .iter()
            .filter(|r| matches_term(r, term))
            .cloned()
            .collect())
    }

    async fn fetch_detail(&self, id: &str, _credential: &Credential) -> Result<NotamRecord, GatewayError> {
        let mut record = self
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        if let Some(detail) = self.details.get(id) {
            record.merge_detail(detail.clone());
        }
        Ok(record)
    }
}
