use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{InitialView, LayerId, MapBackend, MapError, MarkerStyle, ShapeRole, SurfaceId};
use crate::geometry::{Bounds, Coordinate, ShapePrimitive};

/// Points used to approximate a circle as a polygon ring
const CIRCLE_SEGMENTS: usize = 32;
const METERS_PER_DEGREE: f64 = 111_320.0;

#[derive(Debug, Default)]
struct Collection {
    container: String,
    base_layer: String,
    initial_view: Option<InitialView>,
    features: BTreeMap<LayerId, Value>,
    bbox: Option<Bounds>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    surfaces: HashMap<SurfaceId, Collection>,
}

/// Backend that renders each surface as a GeoJSON `FeatureCollection`.
///
/// Used by the CLI to export what a map would show. Clones share state.
#[derive(Debug, Clone)]
pub struct GeoJsonBackend {
    base_layer: String,
    state: Arc<Mutex<State>>,
}

impl Default for GeoJsonBackend {
    fn default() -> Self {
        Self::new("osm")
    }
}

impl GeoJsonBackend {
    pub fn new(base_layer: impl Into<String>) -> Self {
        Self {
            base_layer: base_layer.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The surface as a GeoJSON document, or `None` if it does not exist
    pub fn feature_collection(&self, surface: SurfaceId) -> Option<Value> {
        let state = self.lock();
        let collection = state.surfaces.get(&surface)?;
        let mut doc = json!({
            "type": "FeatureCollection",
            "properties": {
                "container": collection.container,
                "baseLayer": collection.base_layer,
                "initialView": collection.initial_view,
            },
            "features": collection.features.values().cloned().collect::<Vec<_>>(),
        });
        if let Some(b) = collection.bbox {
            doc["bbox"] = json!([b.west, b.south, b.east, b.north]);
        }
        Some(doc)
    }

    fn insert(&self, surface: SurfaceId, feature: Value) -> Result<LayerId, MapError> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = LayerId(state.next_id);
        state
            .surfaces
            .get_mut(&surface)
            .ok_or(MapError::UnknownSurface(surface))?
            .features
            .insert(id, feature);
        Ok(id)
    }
}

fn position(c: &Coordinate) -> Value {
    json!([c.lng, c.lat])
}

fn circle_ring(center: &Coordinate, radius_m: f64) -> Vec<Value> {
    let dlat = radius_m / METERS_PER_DEGREE;
    let dlng = dlat / center.lat.to_radians().cos().abs().max(1e-6);
    (0..=CIRCLE_SEGMENTS)
        .map(|i| {
            let theta = 2.0 * PI * (i % CIRCLE_SEGMENTS) as f64 / CIRCLE_SEGMENTS as f64;
            json!([center.lng + dlng * theta.cos(), center.lat + dlat * theta.sin()])
        })
        .collect()
}

fn shape_feature(shape: &ShapePrimitive, role: ShapeRole) -> Value {
    let geometry = match shape {
        ShapePrimitive::Circle { center, radius_m } => json!({
            "type": "Polygon",
            "coordinates": [circle_ring(center, *radius_m)],
        }),
        ShapePrimitive::Polygon { vertices } => {
            let mut ring: Vec<Value> = vertices.iter().map(position).collect();
            if let Some(first) = vertices.first()
                && vertices.last() != Some(first)
            {
                ring.push(position(first));
            }
            json!({ "type": "Polygon", "coordinates": [ring] })
        }
        ShapePrimitive::Polyline { vertices } => json!({
            "type": "LineString",
            "coordinates": vertices.iter().map(position).collect::<Vec<_>>(),
        }),
        ShapePrimitive::Cluster { center, .. } => json!({
            "type": "Point",
            "coordinates": position(center),
        }),
    };
    let mut properties = json!({ "role": role });
    match shape {
        ShapePrimitive::Circle { radius_m, .. } => properties["radiusM"] = json!(radius_m),
        ShapePrimitive::Cluster { count, .. } => properties["count"] = json!(count),
        _ => {}
    }
    json!({ "type": "Feature", "geometry": geometry, "properties": properties })
}

impl MapBackend for GeoJsonBackend {
    fn create(&mut self, container: &str, view: &InitialView) -> Result<SurfaceId, MapError> {
        let mut state = self.lock();
        state.next_id += 1;
        let surface = SurfaceId(state.next_id);
        state.surfaces.insert(
            surface,
            Collection {
                container: container.to_string(),
                base_layer: self.base_layer.clone(),
                initial_view: Some(*view),
                ..Collection::default()
            },
        );
        Ok(surface)
    }

    fn add_marker(&mut self, surface: SurfaceId, at: Coordinate, style: &MarkerStyle) -> Result<LayerId, MapError> {
        let feature = json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": position(&at) },
            "properties": { "role": "marker", "category": style.category, "popup": style.popup },
        });
        self.insert(surface, feature)
    }

    fn remove_layer(&mut self, surface: SurfaceId, layer: LayerId) -> Result<(), MapError> {
        let mut state = self.lock();
        let collection = state
            .surfaces
            .get_mut(&surface)
            .ok_or(MapError::UnknownSurface(surface))?;
        collection
            .features
            .remove(&layer)
            .map(|_| ())
            .ok_or(MapError::UnknownLayer(layer))
    }

    fn fit_bounds(&mut self, surface: SurfaceId, bounds: &Bounds) -> Result<(), MapError> {
        let mut state = self.lock();
        state
            .surfaces
            .get_mut(&surface)
            .ok_or(MapError::UnknownSurface(surface))?
            .bbox = Some(*bounds);
        Ok(())
    }

    fn draw_shape(&mut self, surface: SurfaceId, shape: &ShapePrimitive, role: ShapeRole) -> Result<LayerId, MapError> {
        self.insert(surface, shape_feature(shape, role))
    }

    fn dispose(&mut self, surface: SurfaceId) -> Result<(), MapError> {
        self.lock()
            .surfaces
            .remove(&surface)
            .map(|_| ())
            .ok_or(MapError::UnknownSurface(surface))
    }
}
