//! Map surface management
//!
//! [`MapSurfaceController`] owns every NOTAM layer on a map surface and keeps it in
//! step with the records the dashboard holds. Rendering goes through the
//! [`MapBackend`] capability trait; the controller never knows which library is
//! behind it. All layer bookkeeping lives in the [`MapHandle`] returned by
//! `initialize`, so several maps can coexist.

mod controller;
mod geojson;
mod recording;

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::geometry::{Bounds, Coordinate, ShapePrimitive};
use crate::notams::{NotamCategory, NotamRecord};

pub use controller::{MapHandle, MapLayerSet, MapSettings, MapState, MapSurfaceController, MarkerActivation, MarkerLayer};
pub use geojson::GeoJsonBackend;
pub use recording::{RecordedLayer, RecordedSurface, RecordingBackend};

/// Backend-assigned id of a map surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SurfaceId(pub u64);

/// Backend-assigned id of a layer on a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LayerId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// View a new surface opens with
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InitialView {
    pub center: Coordinate,
    pub zoom: u8,
}

impl Default for InitialView {
    fn default() -> Self {
        Self {
            center: Coordinate::new(20.0, 0.0),
            zoom: 2,
        }
    }
}

/// Popup content bound to a NOTAM marker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerPopup {
    pub notam_id: String,
    pub location: String,
    pub category: NotamCategory,
    pub effective: String,
    pub description: String,
}

impl From<&NotamRecord> for MarkerPopup {
    fn from(record: &NotamRecord) -> Self {
        Self {
            notam_id: record.id.clone(),
            location: record.location.clone(),
            category: record.category,
            effective: record.effective.format("%Y-%m-%d").to_string(),
            description: record.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerStyle {
    pub category: NotamCategory,
    pub popup: MarkerPopup,
}

impl MarkerStyle {
    pub fn for_record(record: &NotamRecord) -> Self {
        Self {
            category: record.category,
            popup: MarkerPopup::from(record),
        }
    }
}

/// What a drawn shape represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeRole {
    NotamGeometry,
    Highlight,
    ClusterGroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("map surface has not been initialized")]
    NotInitialized,
    #[error("map surface is already initialized")]
    AlreadyInitialized,
    #[error("map surface has been disposed")]
    Disposed,
    #[error("unknown {0}")]
    UnknownSurface(SurfaceId),
    #[error("unknown {0}")]
    UnknownLayer(LayerId),
    #[error("map backend error: {0}")]
    Backend(String),
}

/// Capabilities the controller needs from a rendering library
pub trait MapBackend: Send {
    /// Create a surface in `container`, including its base imagery
    fn create(&mut self, container: &str, view: &InitialView) -> Result<SurfaceId, MapError>;

    fn add_marker(&mut self, surface: SurfaceId, position: Coordinate, style: &MarkerStyle)
    -> Result<LayerId, MapError>;

    fn remove_layer(&mut self, surface: SurfaceId, layer: LayerId) -> Result<(), MapError>;

    fn fit_bounds(&mut self, surface: SurfaceId, bounds: &Bounds) -> Result<(), MapError>;

    fn draw_shape(&mut self, surface: SurfaceId, shape: &ShapePrimitive, role: ShapeRole)
    -> Result<LayerId, MapError>;

    /// Release the surface and everything on it
    fn dispose(&mut self, surface: SurfaceId) -> Result<(), MapError>;
}
