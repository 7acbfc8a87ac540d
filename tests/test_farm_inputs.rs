mod common;

use cane_et::config::EtConfig;
use cane_et::core::pipeline::{EtPipeline, QueryStatus};
use cane_et::core::timeseries::Trend;
use cane_et::geometry::Geometry;
use cane_et::io::MemoryBackend;
use cane_et::types::EtError;
use common::*;
use std::io::Write;

const FARM_GEOJSON: &str = r#"{
    "type": "FeatureCollection",
    "features": [{
        "type": "Feature",
        "properties": {"name": "Amir Kabir block 12"},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [48.301, 31.581], [48.319, 31.581], [48.319, 31.599],
                [48.301, 31.599], [48.301, 31.581]
            ]]
        }
    }]
}"#;

#[test]
fn test_geojson_farm_and_config_file() {
    init_logging();

    let mut farm_file = tempfile::NamedTempFile::new().unwrap();
    farm_file.write_all(FARM_GEOJSON.as_bytes()).unwrap();
    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    write!(
        config_file,
        r#"{{"parallel": false, "trend": {{"slope_threshold": 0.0}}}}"#
    )
    .unwrap();

    let farm = Geometry::from_geojson_file(farm_file.path()).unwrap();
    let config = EtConfig::from_file(config_file.path()).unwrap();
    assert!(!config.parallel);

    let backend = MemoryBackend::new().with_scenes(vec![
        landsat_scene(5, 293.0, Some(landsat_clear())),
        landsat_scene(13, 294.0, Some(landsat_clear())),
        landsat_scene(21, 295.0, Some(landsat_clear())),
    ]);
    let pipeline = EtPipeline::new(backend, &config);
    let report = pipeline
        .analyze_str(&farm, "2023-01-01", "2023-01-31", "Landsat")
        .unwrap();

    assert_eq!(report.status, QueryStatus::Computed);
    assert_eq!(report.image_count, 3);
    assert_eq!(report.series.values().len(), 3);

    // Cooler days leave more energy for LE, so ET falls as the surface warms
    let values = report.series.values();
    assert!(values.windows(2).all(|w| w[1] < w[0]));
    assert_eq!(report.summary.trend, Some(Trend::Decreasing));
    assert_eq!(report.summary.max_et, Some(values[0]));
}

#[test]
fn test_farm_outside_every_scene() {
    let backend = MemoryBackend::new().with_scene(landsat_scene(5, 295.0, Some(landsat_clear())));
    let pipeline = EtPipeline::new(backend, &EtConfig::default());

    let far_away = Geometry::point(10.0, 10.0);
    let report = pipeline
        .analyze_str(&far_away, "2023-01-01", "2023-01-31", "Landsat")
        .unwrap();
    assert_eq!(report.status, QueryStatus::NoImagery);
    assert_eq!(pipeline.backend().search_calls(), 1);
}

#[test]
fn test_line_farm_is_rejected() {
    let line = r#"{"type": "LineString", "coordinates": [[48.3, 31.5], [48.4, 31.6]]}"#;
    assert!(matches!(
        Geometry::from_geojson_str(line),
        Err(EtError::InvalidGeometry(_))
    ));
}
