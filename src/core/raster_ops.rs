//! Nodata-aware per-pixel combinators.
//!
//! Every combinator writes `NODATA` when any input pixel is nodata, when the
//! closure declines (`None`), or when the result is not finite.

use crate::types::{is_valid, Raster, NODATA};
use ndarray::Zip;

#[inline]
fn finish(value: Option<f64>) -> f32 {
    match value {
        Some(v) if v.is_finite() => v as f32,
        _ => NODATA,
    }
}

pub fn map1<F>(a: &Raster, f: F) -> Raster
where
    F: Fn(f64) -> Option<f64>,
{
    a.mapv(|a| if is_valid(a) { finish(f(a as f64)) } else { NODATA })
}

pub fn zip2<F>(a: &Raster, b: &Raster, f: F) -> Raster
where
    F: Fn(f64, f64) -> Option<f64>,
{
    Zip::from(a).and(b).map_collect(|&a, &b| {
        if is_valid(a) && is_valid(b) {
            finish(f(a as f64, b as f64))
        } else {
            NODATA
        }
    })
}

pub fn zip3<F>(a: &Raster, b: &Raster, c: &Raster, f: F) -> Raster
where
    F: Fn(f64, f64, f64) -> Option<f64>,
{
    Zip::from(a).and(b).and(c).map_collect(|&a, &b, &c| {
        if is_valid(a) && is_valid(b) && is_valid(c) {
            finish(f(a as f64, b as f64, c as f64))
        } else {
            NODATA
        }
    })
}

pub fn zip4<F>(a: &Raster, b: &Raster, c: &Raster, d: &Raster, f: F) -> Raster
where
    F: Fn(f64, f64, f64, f64) -> Option<f64>,
{
    Zip::from(a).and(b).and(c).and(d).map_collect(|&a, &b, &c, &d| {
        if is_valid(a) && is_valid(b) && is_valid(c) && is_valid(d) {
            finish(f(a as f64, b as f64, c as f64, d as f64))
        } else {
            NODATA
        }
    })
}

/// Fraction of pixels carrying data
pub fn valid_fraction(a: &Raster) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter().filter(|v| is_valid(**v)).count() as f64 / a.len() as f64
}

/// (min, max) over valid pixels
pub fn valid_range(a: &Raster) -> Option<(f32, f32)> {
    a.iter()
        .copied()
        .filter(|v| is_valid(*v))
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
