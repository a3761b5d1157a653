mod common;

use common::sample_records;
use notamboard::geometry::{Coordinate, Geometry};
use notamboard::map::{MapError, MapSettings, MapSurfaceController, RecordingBackend, ShapeRole};

fn open() -> (MapSurfaceController, notamboard::map::MapHandle, RecordingBackend) {
    let backend = RecordingBackend::new();
    let mut controller = MapSurfaceController::new(Box::new(backend.clone()), MapSettings::default());
    let handle = controller.open("notam-map").unwrap();
    (controller, handle, backend)
}

#[test]
fn test_reconcile_is_idempotent() {
    let (mut controller, mut handle, backend) = open();
    let surface = handle.surface().unwrap();
    let records = sample_records();

    controller.reconcile(&mut handle, &records).unwrap();
    let first = backend.marker_ids(surface);
    controller.reconcile(&mut handle, &records).unwrap();

    assert_eq!(backend.marker_ids(surface), first);
    assert_eq!(backend.marker_count(surface), 4);
    assert_eq!(handle.layers().marker_count(), 4);
    assert_eq!(backend.base_layer_count(surface), 1);
}

#[test]
fn test_empty_reconcile_clears_markers_only() {
    let (mut controller, mut handle, backend) = open();
    let surface = handle.surface().unwrap();

    controller.reconcile(&mut handle, &sample_records()).unwrap();
    let fits = backend.surface(surface).unwrap().fit_count;
    controller.reconcile(&mut handle, &[]).unwrap();

    assert_eq!(backend.marker_count(surface), 0);
    assert_eq!(backend.base_layer_count(surface), 1);
    assert_eq!(backend.surface(surface).unwrap().fit_count, fits);
}

#[test]
fn test_geometry_replaces_previous_and_skips_invalid() {
    let (mut controller, mut handle, backend) = open();
    let surface = handle.surface().unwrap();

    let polygon = Geometry::Polygon {
        vertices: vec![
            Coordinate::new(40.0, -74.0),
            Coordinate::new(40.5, -74.0),
            Coordinate::new(40.5, -73.5),
        ],
    };
    assert!(controller.draw_geometry(&mut handle, &polygon).unwrap());
    let line = Geometry::Line {
        vertices: vec![Coordinate::new(51.0, 0.0), Coordinate::new(51.5, 0.5)],
    };
    assert!(controller.draw_geometry(&mut handle, &line).unwrap());
    assert_eq!(backend.shape_count(surface, ShapeRole::NotamGeometry), 1);

    let degenerate = Geometry::Polygon {
        vertices: vec![Coordinate::new(0.0, 0.0)],
    };
    assert!(!controller.draw_geometry(&mut handle, &degenerate).unwrap());
    assert!(!controller.draw_geometry(&mut handle, &Geometry::Unknown).unwrap());
    assert_eq!(backend.shape_count(surface, ShapeRole::NotamGeometry), 0);
}

#[test]
fn test_circle_geometry_fits_radius() {
    let (mut controller, mut handle, backend) = open();
    let surface = handle.surface().unwrap();
    let center = Coordinate::new(40.6413, -73.7781);

    controller
        .draw_geometry(&mut handle, &Geometry::Circle { center, radius_nm: 5.0 })
        .unwrap();
    let view = backend.surface(surface).unwrap().view.unwrap();
    assert!(view.contains(center));
    // 5 NM is roughly 0.083 degrees of latitude
    assert!((view.north - center.lat - 0.0832).abs() < 0.001);
}

#[test]
fn test_independent_handles() {
    let backend = RecordingBackend::new();
    let mut controller = MapSurfaceController::new(Box::new(backend.clone()), MapSettings::default());
    let mut a = controller.open("left").unwrap();
    let mut b = controller.open("right").unwrap();
    assert_ne!(a.id(), b.id());

    let records = sample_records();
    controller.reconcile(&mut a, &records).unwrap();
    controller.reconcile(&mut b, &records[..1]).unwrap();
    controller.dispose(&mut a).unwrap();

    assert_eq!(backend.marker_count(b.surface().unwrap()), 1);
    assert_eq!(controller.reconcile(&mut a, &records), Err(MapError::Disposed));
}
