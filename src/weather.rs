//! Weather tiles for monitored airports

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::flights::FlightPlan;
use crate::minima::{MinimaCheck, MinimaError, MinimaField, MinimaRegistry, MinimaThreshold, WeatherReport};

/// How often monitored airports are re-fetched
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Where weather reports come from
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self, icao: &str) -> Result<WeatherReport>;
}

/// `GET {base_url}/api/weather/{icao}` returning a JSON report
pub struct HttpWeatherSource {
    client: Client,
    base_url: String,
}

impl HttpWeatherSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("notamboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl WeatherSource for HttpWeatherSource {
    async fn fetch(&self, icao: &str) -> Result<WeatherReport> {
        let url = format!("{}/api/weather/{}", self.base_url, icao);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch weather for {}", icao))?
            .error_for_status()
            .with_context(|| format!("Weather service rejected {}", icao))?;
        response
            .json::<WeatherReport>()
            .await
            .with_context(|| format!("Failed to parse weather for {}", icao))
    }
}

/// What a weather tile shows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherTile {
    pub icao: String,
    pub report: Option<WeatherReport>,
    pub error: Option<String>,
    pub minima: MinimaThreshold,
    pub custom_minima: bool,
    pub check: Option<MinimaCheck>,
}

/// Monitored airports, their ICAO-keyed minima and the latest report for each
#[derive(Debug, Clone, Default)]
pub struct WeatherMonitor {
    icaos: Vec<String>,
    minima: MinimaRegistry,
    reports: BTreeMap<String, WeatherReport>,
    errors: BTreeMap<String, String>,
}

impl WeatherMonitor {
    pub fn new(global: MinimaThreshold) -> Self {
        Self {
            minima: MinimaRegistry::new(global),
            ..Default::default()
        }
    }

    pub fn icaos(&self) -> &[String] {
        &self.icaos
    }

    /// Start monitoring `icao`. Returns `false` if it is blank or already monitored.
    pub fn add(&mut self, icao: &str) -> bool {
        let icao = icao.trim().to_ascii_uppercase();
        if icao.is_empty() || self.icaos.contains(&icao) {
            return false;
        }
        info!("Monitoring weather for {}", icao);
        self.icaos.push(icao);
        true
    }

    pub fn remove(&mut self, icao: &str) -> bool {
        let icao = icao.trim().to_ascii_uppercase();
        let before = self.icaos.len();
        self.icaos.retain(|i| *i != icao);
        self.reports.remove(&icao);
        self.errors.remove(&icao);
        before != self.icaos.len()
    }

    /// Monitor the airport a flight tile is currently targeting
    pub fn add_from_flight(&mut self, flight: &FlightPlan, use_alternate: bool) -> bool {
        self.add(flight.target_icao(use_alternate))
    }

    pub fn minima(&self) -> &MinimaRegistry {
        &self.minima
    }

    pub fn set_global_minima(&mut self, threshold: MinimaThreshold) {
        self.minima.set_global(threshold);
    }

    pub fn set_minima(&mut self, icao: &str, field: MinimaField, raw: &str) -> Result<(), MinimaError> {
        self.minima.set_field(icao, field, raw)
    }

    pub fn reset_minima(&mut self, icao: &str) {
        self.minima.reset(icao);
    }

    pub fn report(&self, icao: &str) -> Option<&WeatherReport> {
        self.reports.get(&icao.trim().to_ascii_uppercase())
    }

    pub fn error(&self, icao: &str) -> Option<&str> {
        self.errors.get(&icao.trim().to_ascii_uppercase()).map(String::as_str)
    }

    /// Evaluate the latest report; `None` until one has arrived
    pub fn check(&self, icao: &str) -> Option<MinimaCheck> {
        self.report(icao).map(|r| self.minima.check(icao, r))
    }

    /// Store the outcome of one fetch. A failure keeps the previous report.
    pub fn record(&mut self, icao: &str, outcome: Result<WeatherReport>) {
        let icao = icao.trim().to_ascii_uppercase();
        if !self.icaos.contains(&icao) {
            debug!("Dropping weather for {}, no longer monitored", icao);
            return;
        }
        match outcome {
            Ok(report) => {
                self.errors.remove(&icao);
                self.reports.insert(icao, report);
            }
            Err(e) => {
                warn!("Weather fetch for {} failed: {:#}", icao, e);
                self.errors.insert(icao.clone(), format!("Failed to fetch weather for {}", icao));
            }
        }
    }

    /// Fetch every monitored airport in order
    pub async fn refresh_all(&mut self, source: &dyn WeatherSource) {
        for icao in self.icaos.clone() {
            let outcome = source.fetch(&icao).await;
            self.record(&icao, outcome);
        }
    }

    pub fn tiles(&self) -> Vec<WeatherTile> {
        self.icaos
            .iter()
            .map(|icao| WeatherTile {
                icao: icao.clone(),
                report: self.reports.get(icao).cloned(),
                error: self.errors.get(icao).cloned(),
                minima: self.minima.effective(icao),
                custom_minima: self.minima.has_override(icao),
                check: self.check(icao),
            })
            .collect()
    }
}

/// Refresh a shared monitor every `period` until `shutdown` flips to true.
///
/// The monitor lock is released while fetching so tiles stay readable.
pub async fn run_refresh_loop(
    monitor: Arc<Mutex<WeatherMonitor>>,
    source: Arc<dyn WeatherSource>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Weather refresh loop stopping");
                    return;
                }
                continue;
            }
        }

        let icaos = monitor.lock().await.icaos().to_vec();
        for icao in icaos {
            let outcome = source.fetch(&icao).await;
            if let Err(e) = &outcome {
                error!("Weather refresh for {} failed: {:#}", icao, e);
            }
            monitor.lock().await.record(&icao, outcome);
        }

        let tiles = monitor.lock().await.tiles();
        let below = tiles
            .iter()
            .filter(|t| t.check.as_ref().is_some_and(|c| !c.overall_met))
            .count();
        info!("Refreshed weather for {} airports, {} below minima", tiles.len(), below);
    }
}
