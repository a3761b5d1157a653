//! NOTAM dashboard orchestration
//!
//! [`Dashboard`] owns the filter state, the working record set, the derived stats
//! and the map view, and exposes the five UI entry points (`set_filters`,
//! `set_search_term`, `select`, `close_detail`, `refresh`). Every entry point takes
//! `&self` and may run concurrently with the others.
//!
//! Ordering rules:
//! - List fetches and searches share one sequence counter. A response is applied only
//!   if no newer list/search was issued after it; anything else is dropped.
//! - Detail fetches have their own counter, bumped by `select`, `close_detail` and
//!   filter changes.
//! - The state lock is never held across a gateway call. When both locks are needed
//!   the state lock is taken first, then the map lock.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::filters::{FilterState, SearchIntent, classify_search};
use crate::gateway::{CredentialProvider, GatewayError, NotamGateway};
use crate::geometry::Geometry;
use crate::map::{
    LayerId, MapError, MapHandle, MapLayerSet, MapState, MapSurfaceController, MarkerActivation, SurfaceId,
};
use crate::notams::NotamRecord;
use crate::stats::{NotamStats, aggregate};

/// Loading flag and last error of one kind of request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OpStatus {
    pub loading: bool,
    pub error: Option<String>,
    /// Sequence of the request that owns `loading`
    #[serde(skip)]
    in_flight: Option<u64>,
}

impl OpStatus {
    fn start(&mut self, seq: u64) {
        self.loading = true;
        self.error = None;
        self.in_flight = Some(seq);
    }

    fn finish(&mut self, seq: u64) {
        if self.in_flight == Some(seq) {
            self.loading = false;
            self.in_flight = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordsOp {
    List,
    Search,
}

impl RecordsOp {
    fn as_str(&self) -> &'static str {
        match self {
            RecordsOp::List => "list",
            RecordsOp::Search => "search",
        }
    }

    /// Verb used in user-facing error text
    fn verb(&self) -> &'static str {
        match self {
            RecordsOp::List => "load",
            RecordsOp::Search => "search",
        }
    }
}

enum RecordsRequest {
    List(FilterState),
    Search(String),
}

impl RecordsRequest {
    fn op(&self) -> RecordsOp {
        match self {
            RecordsRequest::List(_) => RecordsOp::List,
            RecordsRequest::Search(_) => RecordsOp::Search,
        }
    }
}

#[derive(Debug, Default)]
struct DashboardState {
    filters: FilterState,
    records: Vec<NotamRecord>,
    stats: NotamStats,
    selection: Option<String>,
    detail: Option<NotamRecord>,
    list_status: OpStatus,
    search_status: OpStatus,
    detail_status: OpStatus,
    records_seq: u64,
    detail_seq: u64,
}

impl DashboardState {
    fn status_mut(&mut self, op: RecordsOp) -> &mut OpStatus {
        match op {
            RecordsOp::List => &mut self.list_status,
            RecordsOp::Search => &mut self.search_status,
        }
    }

    /// Forget the selection and any detail request still in flight
    fn clear_selection(&mut self) {
        self.selection = None;
        self.detail = None;
        self.detail_seq += 1;
        self.detail_status = OpStatus::default();
    }
}

struct MapView {
    controller: MapSurfaceController,
    handle: MapHandle,
}

/// Map failures never reach the user; they are logged and the operation is skipped
impl MapView {
    fn reconcile(&mut self, records: &[NotamRecord]) {
        if let Err(e) = self.controller.reconcile(&mut self.handle, records) {
            warn!("Map reconcile skipped: {}", e);
        }
    }

    fn highlight(&mut self, notam_id: &str) {
        if let Err(e) = self.controller.highlight(&mut self.handle, notam_id) {
            warn!("Map highlight of {} skipped: {}", notam_id, e);
        }
    }

    fn clear_highlight(&mut self) {
        if let Err(e) = self.controller.clear_highlight(&mut self.handle) {
            debug!("Map highlight clear skipped: {}", e);
        }
    }

    fn draw_geometry(&mut self, geometry: &Geometry) {
        if let Err(e) = self.controller.draw_geometry(&mut self.handle, geometry) {
            warn!("Map geometry skipped: {}", e);
        }
    }

    fn clear_geometry(&mut self) {
        if let Err(e) = self.controller.clear_geometry(&mut self.handle) {
            debug!("Map geometry clear skipped: {}", e);
        }
    }
}

/// Read state handed to the UI boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub filters: FilterState,
    pub records: Vec<NotamRecord>,
    pub stats: NotamStats,
    pub selection: Option<String>,
    pub detail: Option<NotamRecord>,
    pub list: OpStatus,
    pub search: OpStatus,
    pub detail_status: OpStatus,
    /// NOTAM ids that currently have a marker
    pub markers: Vec<String>,
    pub highlighted: bool,
}

struct Inner {
    gateway: Arc<dyn NotamGateway>,
    credentials: Arc<dyn CredentialProvider>,
    state: Mutex<DashboardState>,
    map: Mutex<MapView>,
}

/// Cheap to clone; clones share the same state and map
#[derive(Clone)]
pub struct Dashboard {
    inner: Arc<Inner>,
}

/// A marker activation handler that forwards NOTAM ids to a channel.
///
/// Feed the receiver into [`Dashboard::select`] to open details from map popups.
pub fn selection_channel() -> (MarkerActivation, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let activation: MarkerActivation = Arc::new(move |id: &str| {
        if tx.send(id.to_string()).is_err() {
            debug!("Marker activation for {} dropped, no receiver", id);
        }
    });
    (activation, rx)
}

impl Dashboard {
    /// Open a map surface in `container` and start with `filters`. No fetch is issued
    /// until an entry point is called.
    pub fn new(
        gateway: Arc<dyn NotamGateway>,
        credentials: Arc<dyn CredentialProvider>,
        mut controller: MapSurfaceController,
        container: &str,
        filters: FilterState,
    ) -> Result<Self, MapError> {
        let handle = controller.open(container)?;
        Ok(Self {
            inner: Arc::new(Inner {
                gateway,
                credentials,
                state: Mutex::new(DashboardState {
                    filters,
                    ..Default::default()
                }),
                map: Mutex::new(MapView { controller, handle }),
            }),
        })
    }

    /// Apply new structured filters. The search term is kept; while it is active the
    /// filters are only stored.
    pub async fn set_filters(&self, filters: FilterState) {
        let request = {
            let mut state = self.inner.state.lock().await;
            let search = std::mem::take(&mut state.filters.search);
            state.filters = FilterState { search, ..filters };
            state.clear_selection();

            let mut map = self.inner.map.lock().await;
            map.clear_highlight();
            map.clear_geometry();

            if state.filters.active_search().is_some() {
                debug!("Search active, storing filters without fetching");
                None
            } else {
                Some(state.filters.clone())
            }
        };
        if let Some(filters) = request {
            self.load_records(RecordsRequest::List(filters)).await;
        }
    }

    /// Handle a change of the search box
    pub async fn set_search_term(&self, term: &str) {
        let request = {
            let mut state = self.inner.state.lock().await;
            state.filters.search = term.to_string();
            match classify_search(term) {
                SearchIntent::Search(term) => Some(RecordsRequest::Search(term)),
                SearchIntent::Clear => Some(RecordsRequest::List(state.filters.clone())),
                SearchIntent::Incomplete => None,
            }
        };
        if let Some(request) = request {
            self.load_records(request).await;
        }
    }

    /// Re-issue the structured list fetch, dropping any search term
    pub async fn refresh(&self) {
        let filters = {
            let mut state = self.inner.state.lock().await;
            state.filters.search.clear();
            state.filters.clone()
        };
        self.load_records(RecordsRequest::List(filters)).await;
    }

    /// Open the detail view for `notam_id`
    pub async fn select(&self, notam_id: &str) {
        let seq = {
            let mut state = self.inner.state.lock().await;
            state.detail_seq += 1;
            let seq = state.detail_seq;
            state.selection = Some(notam_id.to_string());
            state.detail = None;
            state.detail_status.start(seq);
            self.inner.map.lock().await.clear_geometry();
            seq
        };

        let credential = self.inner.credentials.token().await;
        let result = self.inner.gateway.fetch_detail(notam_id, &credential).await;
        record_outcome("detail", &result);
        if let Err(e) = &result
            && e.is_auth()
        {
            self.refresh_credentials().await;
        }

        let mut state = self.inner.state.lock().await;
        state.detail_status.finish(seq);
        if seq != state.detail_seq || state.selection.as_deref() != Some(notam_id) {
            metrics::counter!(crate::metrics::STALE_RESPONSES_TOTAL).increment(1);
            debug!("Discarding stale detail response for {}", notam_id);
            return;
        }

        let geometry = match result {
            Ok(detail) => {
                let merged = match state.records.iter_mut().find(|r| r.id == notam_id) {
                    Some(record) => {
                        record.merge_detail(detail);
                        record.clone()
                    }
                    None => detail,
                };
                let geometry = merged.geometry.clone();
                state.detail = Some(merged);
                geometry
            }
            Err(e) => {
                log_gateway_error("detail", &e);
                let fallback = state.records.iter().find(|r| r.id == notam_id).cloned();
                state.detail = fallback;
                state.detail_status.error = Some(e.user_message("load"));
                None
            }
        };

        let mut map = self.inner.map.lock().await;
        map.highlight(notam_id);
        if let Some(geometry) = geometry {
            map.draw_geometry(&geometry);
        }
    }

    /// Leave the detail view and restore the plain marker set
    pub async fn close_detail(&self) {
        let mut state = self.inner.state.lock().await;
        state.clear_selection();
        let mut map = self.inner.map.lock().await;
        map.clear_geometry();
        map.clear_highlight();
        map.reconcile(&state.records);
    }

    /// Run the popup action of the marker on `layer`
    pub async fn activate_marker(&self, layer: LayerId) -> bool {
        let map = self.inner.map.lock().await;
        map.controller.activate_marker(&map.handle, layer)
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        let state = self.inner.state.lock().await;
        let map = self.inner.map.lock().await;
        let layers = map.handle.layers();
        DashboardSnapshot {
            filters: state.filters.clone(),
            records: state.records.clone(),
            stats: state.stats.clone(),
            selection: state.selection.clone(),
            detail: state.detail.clone(),
            list: state.list_status.clone(),
            search: state.search_status.clone(),
            detail_status: state.detail_status.clone(),
            markers: layers.marker_ids().into_iter().map(String::from).collect(),
            highlighted: layers.highlight().is_some(),
        }
    }

    pub async fn map_layers(&self) -> MapLayerSet {
        self.inner.map.lock().await.handle.layers().clone()
    }

    pub async fn map_surface(&self) -> Option<SurfaceId> {
        self.inner.map.lock().await.handle.surface()
    }

    pub async fn map_state(&self) -> MapState {
        self.inner.map.lock().await.handle.state()
    }

    /// Dispose the map surface. Further map work becomes a logged no-op.
    pub async fn shutdown(&self) {
        let mut map = self.inner.map.lock().await;
        let MapView { controller, handle } = &mut *map;
        if let Err(e) = controller.dispose(handle) {
            warn!("Map dispose failed: {}", e);
        }
        info!("Dashboard shut down");
    }

    async fn load_records(&self, request: RecordsRequest) {
        let op = request.op();
        let seq = {
            let mut state = self.inner.state.lock().await;
            state.records_seq += 1;
            let seq = state.records_seq;
            state.status_mut(op).start(seq);
            seq
        };

        let credential = self.inner.credentials.token().await;
        let result = match &request {
            RecordsRequest::List(filters) => self.inner.gateway.fetch_list(filters, &credential).await,
            RecordsRequest::Search(term) => self.inner.gateway.search(term, &credential).await,
        };
        record_outcome(op.as_str(), &result);
        if let Err(e) = &result
            && e.is_auth()
        {
            self.refresh_credentials().await;
        }

        let mut state = self.inner.state.lock().await;
        state.status_mut(op).finish(seq);
        if seq != state.records_seq {
            metrics::counter!(crate::metrics::STALE_RESPONSES_TOTAL).increment(1);
            debug!(
                "Discarding stale {} response (seq {} < {})",
                op.as_str(),
                seq,
                state.records_seq
            );
            return;
        }

        match result {
            Ok(records) => {
                info!("Applying {} NOTAMs from {}", records.len(), op.as_str());
                state.status_mut(op).error = None;
                let stats = aggregate(&records, Utc::now());
                state.stats = stats;
                state.records = records;
                metrics::gauge!(crate::metrics::RECORDS).set(state.records.len() as f64);

                let mut map = self.inner.map.lock().await;
                map.reconcile(&state.records);
                if let Some(selected) = &state.selection {
                    map.highlight(selected);
                }
            }
            Err(e) => {
                log_gateway_error(op.as_str(), &e);
                state.status_mut(op).error = Some(e.user_message(op.verb()));
            }
        }
    }

    async fn refresh_credentials(&self) {
        metrics::counter!(crate::metrics::AUTH_REFRESH_TOTAL).increment(1);
        if let Err(e) = self.inner.credentials.refresh_token().await {
            error!("Credential refresh failed: {:#}", e);
        }
    }
}

fn record_outcome<T>(op: &'static str, result: &Result<T, GatewayError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.metric_label(),
    };
    metrics::counter!(crate::metrics::FETCH_TOTAL, "op" => op, "outcome" => outcome).increment(1);
}

fn log_gateway_error(op: &str, e: &GatewayError) {
    match e {
        GatewayError::Auth(status) => warn!("NOTAM {} rejected: {}", op, status),
        GatewayError::NotFound(id) => info!("NOTAM {} not found during {}", id, op),
        GatewayError::Transport(msg) => error!("NOTAM {} failed: {}", op, msg),
    }
}
