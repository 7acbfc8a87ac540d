#![allow(dead_code)]

use cane_et::geometry::Geometry;
use cane_et::io::Scene;
use cane_et::types::{GeoTransform, GridSpec, Raster};
use chrono::{NaiveDate, TimeZone, Utc};
use ndarray::Array2;
use std::collections::HashMap;

pub const MOD11A1: &str = "MODIS/061/MOD11A1";
pub const MOD09GA: &str = "MODIS/061/MOD09GA";
pub const LC08: &str = "LANDSAT/LC08/C02/T1_L2";

/// Clear-sky Landsat QA_PIXEL value; bit 3 is the cloud flag
pub const LANDSAT_CLEAR: f32 = 21824.0;
pub const LANDSAT_CLOUD: f32 = 21824.0 + 8.0;
/// MODIS state_1km internal cloud flag (bit 10)
pub const MODIS_CLOUD: f32 = 1024.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 2x2 grid of 0.01° pixels over the test farm
pub fn farm_grid() -> GridSpec {
    GridSpec {
        transform: GeoTransform::north_up(48.30, 31.60, 0.01),
        rows: 2,
        cols: 2,
    }
}

/// Point inside pixel (0, 0)
pub fn farm_point() -> Geometry {
    Geometry::point(48.305, 31.595)
}

/// Polygon covering all four pixel centres
pub fn farm_polygon() -> Geometry {
    Geometry::polygon(vec![
        (48.301, 31.581),
        (48.319, 31.581),
        (48.319, 31.599),
        (48.301, 31.599),
    ])
    .unwrap()
}

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, month, day).unwrap()
}

fn scene(id: String, collection: &str, day: u32, bands: Vec<(&str, Raster)>) -> Scene {
    Scene {
        id,
        collection: collection.to_string(),
        acquired: Utc.with_ymd_and_hms(2023, 1, day, 7, 0, 0).unwrap(),
        grid: farm_grid(),
        bands: bands
            .into_iter()
            .map(|(name, data)| (name.to_string(), data))
            .collect::<HashMap<_, _>>(),
    }
}

fn filled(value: f32) -> Raster {
    Array2::from_elem((2, 2), value)
}

pub fn modis_lst_scene(day: u32, lst_k: f32) -> Scene {
    scene(
        format!("MOD11A1_2023_01_{:02}", day),
        MOD11A1,
        day,
        vec![("LST_Day_1km", filled(lst_k / 0.02))],
    )
}

/// Reflectance 0.1 in every band except NIR at 0.4
pub fn modis_reflectance_scene(day: u32, quality: Raster) -> Scene {
    let mut bands: Vec<(&str, Raster)> = [
        "sur_refl_b01",
        "sur_refl_b03",
        "sur_refl_b04",
        "sur_refl_b05",
        "sur_refl_b06",
        "sur_refl_b07",
    ]
    .into_iter()
    .map(|name| (name, filled(1000.0)))
    .collect();
    bands.push(("sur_refl_b02", filled(4000.0)));
    bands.push(("state_1km", quality));
    scene(format!("MOD09GA_2023_01_{:02}", day), MOD09GA, day, bands)
}

pub fn modis_clear() -> Raster {
    filled(0.0)
}

/// Landsat L2 scene with reflectance 0.1 (NIR 0.4) and brightness `tb_k`
pub fn landsat_scene(day: u32, tb_k: f32, qa: Option<Raster>) -> Scene {
    let sr = (0.1 + 0.2) / 0.0000275;
    let sr_nir = (0.4 + 0.2) / 0.0000275;
    let st = (tb_k - 149.0) / 0.00341802;

    let mut bands: Vec<(&str, Raster)> = ["SR_B2", "SR_B3", "SR_B4", "SR_B6", "SR_B7"]
        .into_iter()
        .map(|name| (name, filled(sr)))
        .collect();
    bands.push(("SR_B5", filled(sr_nir)));
    bands.push(("ST_B10", filled(st)));
    if let Some(qa) = qa {
        bands.push(("QA_PIXEL", qa));
    }
    scene(format!("LC08_151038_2023_01_{:02}", day), LC08, day, bands)
}

pub fn landsat_clear() -> Raster {
    filled(LANDSAT_CLEAR)
}
