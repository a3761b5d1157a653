use notamboard::minima::{
    MinimaField, MinimaRegistry, MinimaThreshold, WeatherReport, WeatherValue, evaluate,
};

fn report(ceiling: Option<WeatherValue>, visibility: Option<WeatherValue>) -> WeatherReport {
    WeatherReport::new(ceiling, visibility)
}

#[test]
fn test_reference_examples() {
    let threshold = MinimaThreshold::new(800, 1.0);

    let check = evaluate(&report(Some(1000.into()), Some("1 1/2".into())), &threshold);
    assert!(check.overall_met);
    assert_eq!(check.parsed_visibility, Some(1.5));

    let check = evaluate(&report(Some(500.into()), Some("1".into())), &threshold);
    assert!(!check.overall_met);
    assert!(!check.ceiling_met);
    assert!(check.visibility_met);
}

#[test]
fn test_empty_report_fails_every_threshold() {
    for threshold in [
        MinimaThreshold::new(0, 0.0),
        MinimaThreshold::new(-100, -1.0),
        MinimaThreshold::default(),
        MinimaThreshold::new(i32::MAX, f64::MAX),
    ] {
        let check = evaluate(&WeatherReport::default(), &threshold);
        assert!(!check.overall_met);
        assert_eq!(check.parsed_ceiling, None);
        assert_eq!(check.parsed_visibility, None);
    }
}

#[test]
fn test_overall_is_conjunction() {
    let ceilings: [Option<WeatherValue>; 5] = [
        None,
        Some(200.into()),
        Some("1,500 ft".into()),
        Some("BKN008".into()),
        Some("unknown".into()),
    ];
    let visibilities: [Option<WeatherValue>; 5] = [
        None,
        Some("1/2".into()),
        Some("P6SM".into()),
        Some(3.into()),
        Some("haze".into()),
    ];
    for threshold in [MinimaThreshold::new(800, 1.0), MinimaThreshold::default()] {
        for ceiling in &ceilings {
            for visibility in &visibilities {
                let check = evaluate(&report(ceiling.clone(), visibility.clone()), &threshold);
                assert_eq!(check.overall_met, check.ceiling_met && check.visibility_met);
            }
        }
    }
}

#[test]
fn test_reset_restores_global() {
    let mut registry = MinimaRegistry::new(MinimaThreshold::new(1000, 3.0));
    registry.set_field("BAW117", MinimaField::Ceiling, "400").unwrap();
    registry.set_field("BAW117", MinimaField::Visibility, "1 1/2").unwrap();
    assert_eq!(registry.effective("BAW117"), MinimaThreshold::new(400, 1.5));

    registry.set_global(MinimaThreshold::new(1200, 5.0));
    assert_eq!(registry.effective("BAW117"), MinimaThreshold::new(400, 1.5));
    assert_eq!(registry.effective("DAL42"), MinimaThreshold::new(1200, 5.0));

    registry.reset("BAW117");
    assert!(!registry.has_override("BAW117"));
    assert_eq!(registry.effective("BAW117"), registry.global());
}

#[test]
fn test_invalid_edit_leaves_state_unchanged() {
    let mut registry = MinimaRegistry::default();
    assert!(registry.set_field("EGLL", MinimaField::Ceiling, "low").is_err());
    assert!(registry.set_field("EGLL", MinimaField::Visibility, "").is_err());
    assert!(!registry.has_override("EGLL"));
    assert!("wind".parse::<MinimaField>().is_err());
}
