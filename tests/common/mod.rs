//! Common test utilities for dashboard integration tests
//!
//! - [`sample_records`]: a small NOTAM set spread over regions and categories
//! - [`GatedGateway`]: an in-memory gateway whose calls can be held open or made to
//!   fail per request key, so tests control the order responses arrive in
//! - [`CountingCredentials`]: counts token refreshes
//! - [`build_dashboard`]: a dashboard wired to a [`RecordingBackend`]
//!
//! Request keys are `list:<region>`, `search:<term>` and `detail:<id>`.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use notamboard::dashboard::Dashboard;
use notamboard::filters::FilterState;
use notamboard::gateway::{Credential, CredentialProvider, GatewayError, InMemoryGateway, NotamGateway};
use notamboard::geometry::{Coordinate, Geometry};
use notamboard::map::{MapSettings, MapSurfaceController, RecordingBackend};
use notamboard::notams::{NotamCategory, NotamRecord};

pub fn sample_records() -> Vec<NotamRecord> {
    let now = Utc::now();
    vec![
        NotamRecord::new("A1234/23", "KJFK", NotamCategory::Airport, now - Duration::hours(2), "Runway 4L/22R closed")
            .with_coordinates(40.6413, -73.7781),
        NotamRecord::new("B5678/23", "EGLL", NotamCategory::Obstacle, now - Duration::hours(1), "Temporary crane")
            .with_coordinates(51.47, -0.4543),
        NotamRecord::new("C9012/23", "EHAM", NotamCategory::Navaid, now, "AMS VOR/DME unserviceable")
            .with_coordinates(52.3105, 4.7683),
        NotamRecord::new("D3456/23", "RJTT", NotamCategory::Airspace, now, "Restricted area active")
            .with_coordinates(35.5494, 139.7798),
        NotamRecord::new("E7890/23", "YSSY", NotamCategory::Procedure, now, "RNAV approach suspended"),
    ]
}

/// Detail overlay for A1234/23 carrying a circle geometry
pub fn jfk_detail() -> NotamRecord {
    let mut detail = NotamRecord::new("A1234/23", "KJFK", NotamCategory::Airport, Utc::now(), "").with_geometry(
        Geometry::Circle {
            center: Coordinate::new(40.6413, -73.7781),
            radius_nm: 3.0,
        },
    );
    detail.issued_by = Some("FAA".to_string());
    detail
}

pub struct GatedGateway {
    inner: InMemoryGateway,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    failures: Mutex<HashMap<String, GatewayError>>,
    calls: AtomicUsize,
}

impl GatedGateway {
    pub fn new(inner: InMemoryGateway) -> Self {
        Self {
            inner,
            gates: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Hold every request for `key` until [`GatedGateway::open`] is called
    pub fn close(&self, key: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(key.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Release one held request for `key`
    pub fn open(&self, key: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(key) {
            gate.add_permits(1);
        }
    }

    pub fn fail(&self, key: &str, error: GatewayError) {
        self.failures.lock().unwrap().insert(key.to_string(), error);
    }

    pub fn recover(&self, key: &str) {
        self.failures.lock().unwrap().remove(key);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn pass(&self, key: String) -> Result<(), GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().get(&key).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        match self.failures.lock().unwrap().get(&key) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NotamGateway for GatedGateway {
    async fn fetch_list(
        &self,
        filters: &FilterState,
        credential: &Credential,
    ) -> Result<Vec<NotamRecord>, GatewayError> {
        self.pass(format!("list:{}", filters.region)).await?;
        self.inner.fetch_list(filters, credential).await
    }

    async fn search(&self, term: &str, credential: &Credential) -> Result<Vec<NotamRecord>, GatewayError> {
        self.pass(format!("search:{}", term)).await?;
        self.inner.search(term, credential).await
    }

    async fn fetch_detail(&self, id: &str, credential: &Credential) -> Result<NotamRecord, GatewayError> {
        self.pass(format!("detail:{}", id)).await?;
        self.inner.fetch_detail(id, credential).await
    }
}

#[derive(Default)]
pub struct CountingCredentials {
    refreshes: AtomicUsize,
}

impl CountingCredentials {
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for CountingCredentials {
    async fn token(&self) -> Credential {
        Credential::new(format!("token-{}", self.refreshes()))
    }

    async fn refresh_token(&self) -> anyhow::Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub dashboard: Dashboard,
    pub gateway: Arc<GatedGateway>,
    pub credentials: Arc<CountingCredentials>,
    pub backend: RecordingBackend,
}

pub fn build_dashboard(inner: InMemoryGateway) -> Harness {
    let gateway = Arc::new(GatedGateway::new(inner));
    let credentials = Arc::new(CountingCredentials::default());
    let backend = RecordingBackend::new();
    let controller = MapSurfaceController::new(Box::new(backend.clone()), MapSettings::default());
    let dashboard = Dashboard::new(
        gateway.clone(),
        credentials.clone(),
        controller,
        "notam-map",
        FilterState::default(),
    )
    .unwrap();
    Harness {
        dashboard,
        gateway,
        credentials,
        backend,
    }
}
