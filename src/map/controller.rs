use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{InitialView, LayerId, MapBackend, MapError, MarkerStyle, ShapeRole, SurfaceId};
use crate::geometry::{Bounds, Coordinate, Geometry, ShapePrimitive};
use crate::notams::NotamRecord;

/// Called with the NOTAM id when a marker's "details" action is used
pub type MarkerActivation = Arc<dyn Fn(&str) + Send + Sync>;

/// Zoom box around a highlighted marker, as a multiple of the emphasis radius
const HIGHLIGHT_VIEW_FACTOR: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MapSettings {
    /// Group markers under a cluster layer once a reconcile adds more than this
    pub cluster_threshold: Option<usize>,
    /// Radius of the emphasis circle drawn around a highlighted marker
    pub highlight_radius_m: f64,
    pub initial_view: InitialView,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            cluster_threshold: Some(200),
            highlight_radius_m: 2_000.0,
            initial_view: InitialView::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Uninitialized,
    Ready,
    Disposed,
}

/// A marker placed for one NOTAM
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerLayer {
    pub layer: LayerId,
    pub notam_id: String,
    pub position: Coordinate,
}

/// Every layer the controller placed on a surface.
///
/// Only layers listed here are ever removed; base imagery and anything else on the
/// surface is left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapLayerSet {
    markers: Vec<MarkerLayer>,
    highlight: Option<LayerId>,
    cluster: Option<LayerId>,
    notam_geometry: Vec<LayerId>,
}

impl MapLayerSet {
    pub fn markers(&self) -> &[MarkerLayer] {
        &self.markers
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn marker_ids(&self) -> Vec<&str> {
        self.markers.iter().map(|m| m.notam_id.as_str()).collect()
    }

    pub fn highlight(&self) -> Option<LayerId> {
        self.highlight
    }

    pub fn cluster(&self) -> Option<LayerId> {
        self.cluster
    }

    pub fn geometry_layers(&self) -> &[LayerId] {
        &self.notam_geometry
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
            && self.highlight.is_none()
            && self.cluster.is_none()
            && self.notam_geometry.is_empty()
    }

    fn find_marker(&self, notam_id: &str) -> Option<&MarkerLayer> {
        self.markers.iter().find(|m| m.notam_id == notam_id)
    }
}

/// One map surface and the NOTAM layers placed on it
#[derive(Debug)]
pub struct MapHandle {
    id: Uuid,
    container: String,
    state: MapState,
    surface: Option<SurfaceId>,
    layers: MapLayerSet,
}

impl MapHandle {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            container: container.into(),
            state: MapState::Uninitialized,
            surface: None,
            layers: MapLayerSet::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn state(&self) -> MapState {
        self.state
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    pub fn layers(&self) -> &MapLayerSet {
        &self.layers
    }
}

/// Drives a [`MapBackend`] to reflect the current NOTAM set on a [`MapHandle`]
pub struct MapSurfaceController {
    backend: Box<dyn MapBackend>,
    settings: MapSettings,
    on_activate: Option<MarkerActivation>,
}

impl fmt::Debug for MapSurfaceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapSurfaceController")
            .field("settings", &self.settings)
            .field("on_activate", &self.on_activate.is_some())
            .finish()
    }
}

impl MapSurfaceController {
    pub fn new(backend: Box<dyn MapBackend>, settings: MapSettings) -> Self {
        Self {
            backend,
            settings,
            on_activate: None,
        }
    }

    /// Handler for the popup "details" action
    pub fn with_activation(mut self, on_activate: MarkerActivation) -> Self {
        self.on_activate = Some(on_activate);
        self
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    /// Create a handle for `container` and initialize it
    pub fn open(&mut self, container: &str) -> Result<MapHandle, MapError> {
        let mut handle = MapHandle::new(container);
        self.initialize(&mut handle)?;
        Ok(handle)
    }

    pub fn initialize(&mut self, handle: &mut MapHandle) -> Result<(), MapError> {
        match handle.state {
            MapState::Ready => return Err(MapError::AlreadyInitialized),
            MapState::Disposed => return Err(MapError::Disposed),
            MapState::Uninitialized => {}
        }
        let surface = self.backend.create(&handle.container, &self.settings.initial_view)?;
        handle.surface = Some(surface);
        handle.state = MapState::Ready;
        info!("Initialized map {} in '{}' ({})", handle.id, handle.container, surface);
        Ok(())
    }

    /// Replace all NOTAM markers with markers for `records`.
    ///
    /// Records without usable coordinates are skipped. Returns the number of markers
    /// placed. Calling it twice with the same records leaves the same markers.
    pub fn reconcile(&mut self, handle: &mut MapHandle, records: &[NotamRecord]) -> Result<usize, MapError> {
        let surface = ready_surface(handle)?;
        self.clear_markers(surface, &mut handle.layers);

        let mut positions = Vec::with_capacity(records.len());
        for record in records {
            let Some(position) = record.map_position() else {
                debug!("NOTAM {} has no coordinates, not mapped", record.id);
                continue;
            };
            match self
                .backend
                .add_marker(surface, position, &MarkerStyle::for_record(record))
            {
                Ok(layer) => {
                    handle.layers.markers.push(MarkerLayer {
                        layer,
                        notam_id: record.id.clone(),
                        position,
                    });
                    positions.push(position);
                }
                Err(e) => warn!("Failed to add marker for NOTAM {}: {}", record.id, e),
            }
        }

        if let Some(threshold) = self.settings.cluster_threshold
            && positions.len() > threshold
        {
            let shape = ShapePrimitive::Cluster {
                center: centroid(&positions),
                count: positions.len(),
            };
            match self.backend.draw_shape(surface, &shape, ShapeRole::ClusterGroup) {
                Ok(layer) => handle.layers.cluster = Some(layer),
                Err(e) => warn!("Failed to create marker cluster: {}", e),
            }
        }

        if let Some(bounds) = Bounds::from_coordinates(&positions)
            && let Err(e) = self.backend.fit_bounds(surface, &bounds)
        {
            warn!("Failed to fit map to markers: {}", e);
        }

        metrics::gauge!(crate::metrics::MAP_MARKERS).set(positions.len() as f64);
        debug!("Reconciled map {}: {} markers from {} records", handle.id, positions.len(), records.len());
        Ok(positions.len())
    }

    /// Emphasize the marker for `notam_id`.
    ///
    /// Returns `false` when no marker carries that id; the record may simply not be
    /// in the current filtered set.
    pub fn highlight(&mut self, handle: &mut MapHandle, notam_id: &str) -> Result<bool, MapError> {
        let surface = ready_surface(handle)?;
        self.clear_highlight_layer(surface, &mut handle.layers);

        let Some(position) = handle.layers.find_marker(notam_id).map(|m| m.position) else {
            debug!("No marker for NOTAM {} on map {}, nothing to highlight", notam_id, handle.id);
            return Ok(false);
        };

        let radius_m = self.settings.highlight_radius_m;
        let shape = ShapePrimitive::Circle {
            center: position,
            radius_m,
        };
        let layer = self.backend.draw_shape(surface, &shape, ShapeRole::Highlight)?;
        handle.layers.highlight = Some(layer);

        if let Err(e) = self
            .backend
            .fit_bounds(surface, &Bounds::around(position, radius_m * HIGHLIGHT_VIEW_FACTOR))
        {
            warn!("Failed to center map on NOTAM {}: {}", notam_id, e);
        }
        Ok(true)
    }

    pub fn clear_highlight(&mut self, handle: &mut MapHandle) -> Result<(), MapError> {
        let surface = ready_surface(handle)?;
        self.clear_highlight_layer(surface, &mut handle.layers);
        Ok(())
    }

    /// Draw a NOTAM's geometry, replacing any geometry already shown.
    ///
    /// Geometry that cannot be drawn (unknown type, too few vertices) is logged and
    /// skipped; the previous geometry is still removed. Returns whether a shape was drawn.
    pub fn draw_geometry(&mut self, handle: &mut MapHandle, geometry: &Geometry) -> Result<bool, MapError> {
        let surface = ready_surface(handle)?;
        self.clear_geometry_layers(surface, &mut handle.layers);

        let shape = match geometry.to_shape() {
            Ok(shape) => shape,
            Err(e) => {
                warn!("Not drawing {} geometry: {}", geometry.kind(), e);
                return Ok(false);
            }
        };

        let layer = self.backend.draw_shape(surface, &shape, ShapeRole::NotamGeometry)?;
        handle.layers.notam_geometry.push(layer);

        if let Some(bounds) = shape.bounds()
            && let Err(e) = self.backend.fit_bounds(surface, &bounds)
        {
            warn!("Failed to fit map to {} geometry: {}", geometry.kind(), e);
        }
        Ok(true)
    }

    pub fn clear_geometry(&mut self, handle: &mut MapHandle) -> Result<(), MapError> {
        let surface = ready_surface(handle)?;
        self.clear_geometry_layers(surface, &mut handle.layers);
        Ok(())
    }

    /// Remove every NOTAM layer and release the surface. A second call does nothing.
    pub fn dispose(&mut self, handle: &mut MapHandle) -> Result<(), MapError> {
        match handle.state {
            MapState::Disposed => return Ok(()),
            MapState::Uninitialized => {
                handle.state = MapState::Disposed;
                return Ok(());
            }
            MapState::Ready => {}
        }

        if let Some(surface) = handle.surface {
            self.clear_markers(surface, &mut handle.layers);
            self.clear_highlight_layer(surface, &mut handle.layers);
            self.clear_geometry_layers(surface, &mut handle.layers);
            if let Err(e) = self.backend.dispose(surface) {
                warn!("Backend failed to dispose {}: {}", surface, e);
            }
        }
        handle.surface = None;
        handle.state = MapState::Disposed;
        info!("Disposed map {}", handle.id);
        Ok(())
    }

    /// Run the popup "details" action for the marker on `layer`.
    ///
    /// Returns `false` if the layer is not a NOTAM marker or no handler is set.
    pub fn activate_marker(&self, handle: &MapHandle, layer: LayerId) -> bool {
        let Some(marker) = handle.layers.markers.iter().find(|m| m.layer == layer) else {
            return false;
        };
        match &self.on_activate {
            Some(callback) => {
                callback(&marker.notam_id);
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, surface: SurfaceId, layer: LayerId) {
        if let Err(e) = self.backend.remove_layer(surface, layer) {
            warn!("Failed to remove {} from {}: {}", layer, surface, e);
        }
    }

    fn clear_markers(&mut self, surface: SurfaceId, layers: &mut MapLayerSet) {
        if let Some(cluster) = layers.cluster.take() {
            self.remove(surface, cluster);
        }
        for marker in std::mem::take(&mut layers.markers) {
            self.remove(surface, marker.layer);
        }
    }

    fn clear_highlight_layer(&mut self, surface: SurfaceId, layers: &mut MapLayerSet) {
        if let Some(highlight) = layers.highlight.take() {
            self.remove(surface, highlight);
        }
    }

    fn clear_geometry_layers(&mut self, surface: SurfaceId, layers: &mut MapLayerSet) {
        for layer in std::mem::take(&mut layers.notam_geometry) {
            self.remove(surface, layer);
        }
    }
}

fn ready_surface(handle: &MapHandle) -> Result<SurfaceId, MapError> {
    match (handle.state, handle.surface) {
        (MapState::Ready, Some(surface)) => Ok(surface),
        (MapState::Disposed, _) => Err(MapError::Disposed),
        _ => Err(MapError::NotInitialized),
    }
}

fn centroid(positions: &[Coordinate]) -> Coordinate {
    let n = positions.len().max(1) as f64;
    let (lat, lng) = positions
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));
    Coordinate::new(lat / n, lng / n)
}
