use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{InitialView, LayerId, MapBackend, MapError, MarkerStyle, ShapeRole, SurfaceId};
use crate::geometry::{Bounds, Coordinate, ShapePrimitive};

/// Tile source attached to every surface the recorder creates
pub const BASE_TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedLayer {
    BaseTiles { url: String },
    Marker { position: Coordinate, style: MarkerStyle },
    Shape { shape: ShapePrimitive, role: ShapeRole },
}

/// Everything the recorder knows about one surface
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSurface {
    pub container: String,
    pub initial_view: InitialView,
    pub layers: BTreeMap<LayerId, RecordedLayer>,
    /// Last bounds the surface was fitted to
    pub view: Option<Bounds>,
    pub fit_count: usize,
    pub disposed: bool,
}

#[derive(Debug, Default)]
struct Recorder {
    next_id: u64,
    surfaces: HashMap<SurfaceId, RecordedSurface>,
}

impl Recorder {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn live(&mut self, surface: SurfaceId) -> Result<&mut RecordedSurface, MapError> {
        match self.surfaces.get_mut(&surface) {
            Some(s) if !s.disposed => Ok(s),
            _ => Err(MapError::UnknownSurface(surface)),
        }
    }

    fn add_layer(&mut self, surface: SurfaceId, layer: RecordedLayer) -> Result<LayerId, MapError> {
        let id = LayerId(self.next_id());
        self.live(surface)?.layers.insert(id, layer);
        Ok(id)
    }
}

/// Headless backend that keeps the layer tree in memory.
///
/// Clones share state, so a test can hand one clone to the controller and inspect
/// the surface through another.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Mutex<Recorder>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn surface(&self, surface: SurfaceId) -> Option<RecordedSurface> {
        self.lock().surfaces.get(&surface).cloned()
    }

    pub fn marker_count(&self, surface: SurfaceId) -> usize {
        self.count(surface, |l| matches!(l, RecordedLayer::Marker { .. }))
    }

    pub fn base_layer_count(&self, surface: SurfaceId) -> usize {
        self.count(surface, |l| matches!(l, RecordedLayer::BaseTiles { .. }))
    }

    pub fn shape_count(&self, surface: SurfaceId, role: ShapeRole) -> usize {
        self.count(surface, |l| matches!(l, RecordedLayer::Shape { role: r, .. } if *r == role))
    }

    /// NOTAM ids of the markers on a surface, in placement order
    pub fn marker_ids(&self, surface: SurfaceId) -> Vec<String> {
        self.lock()
            .surfaces
            .get(&surface)
            .map(|s| {
                s.layers
                    .values()
                    .filter_map(|l| match l {
                        RecordedLayer::Marker { style, .. } => Some(style.popup.notam_id.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn count(&self, surface: SurfaceId, pred: impl Fn(&RecordedLayer) -> bool) -> usize {
        self.lock()
            .surfaces
            .get(&surface)
            .map(|s| s.layers.values().filter(|l| pred(l)).count())
            .unwrap_or(0)
    }
}

impl MapBackend for RecordingBackend {
    fn create(&mut self, container: &str, view: &InitialView) -> Result<SurfaceId, MapError> {
        let mut recorder = self.lock();
        let surface = SurfaceId(recorder.next_id());
        recorder.surfaces.insert(
            surface,
            RecordedSurface {
                container: container.to_string(),
                initial_view: *view,
                layers: BTreeMap::new(),
                view: None,
                fit_count: 0,
                disposed: false,
            },
        );
        recorder.add_layer(
            surface,
            RecordedLayer::BaseTiles {
                url: BASE_TILE_URL.to_string(),
            },
        )?;
        Ok(surface)
    }

    fn add_marker(&mut self, surface: SurfaceId, position: Coordinate, style: &MarkerStyle) -> Result<LayerId, MapError> {
        self.lock().add_layer(
            surface,
            RecordedLayer::Marker {
                position,
                style: style.clone(),
            },
        )
    }

    fn remove_layer(&mut self, surface: SurfaceId, layer: LayerId) -> Result<(), MapError> {
        let mut recorder = self.lock();
        recorder
            .live(surface)?
            .layers
            .remove(&layer)
            .map(|_| ())
            .ok_or(MapError::UnknownLayer(layer))
    }

    fn fit_bounds(&mut self, surface: SurfaceId, bounds: &Bounds) -> Result<(), MapError> {
        let mut recorder = self.lock();
        let s = recorder.live(surface)?;
        s.view = Some(*bounds);
        s.fit_count += 1;
        Ok(())
    }

    fn draw_shape(&mut self, surface: SurfaceId, shape: &ShapePrimitive, role: ShapeRole) -> Result<LayerId, MapError> {
        self.lock().add_layer(
            surface,
            RecordedLayer::Shape {
                shape: shape.clone(),
                role,
            },
        )
    }

    fn dispose(&mut self, surface: SurfaceId) -> Result<(), MapError> {
        let mut recorder = self.lock();
        let s = recorder.live(surface)?;
        s.layers.clear();
        s.disposed = true;
        Ok(())
    }
}
