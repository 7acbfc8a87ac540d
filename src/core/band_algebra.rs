use crate::core::raster_ops::{map1, zip2};
use crate::core::sensor::{EmissivityModel, SensorProfile, ThermalModel};
use crate::core::stage::Stage;
use crate::types::{is_valid, Band, EtResult, Image, Raster, NODATA};
use ndarray::Zip;

const STAGE: &str = "surface";

/// NDVI for one pixel; `None` when NIR + Red is zero
#[inline]
pub fn ndvi_value(nir: f64, red: f64) -> Option<f64> {
    let sum = nir + red;
    if sum == 0.0 {
        None
    } else {
        Some((nir - red) / sum)
    }
}

/// Land-surface temperature from brightness temperature and emissivity
#[inline]
pub fn lst_from_brightness(brightness_k: f64, emissivity: f64) -> Option<f64> {
    if emissivity <= 0.0 {
        return None;
    }
    Some(brightness_k / emissivity.powf(0.25))
}

/// Broadband surface albedo from the profile's weighted reflectance bands
pub fn albedo(image: &Image, profile: &SensorProfile) -> EtResult<Raster> {
    let coefficients = &profile.albedo;
    let mut weighted = Raster::zeros(image.grid.shape());

    for (band, weight) in coefficients.weights {
        let reflectance = image.band(*band, STAGE)?;
        Zip::from(&mut weighted).and(reflectance).for_each(|acc, &rho| {
            if *acc == NODATA || !is_valid(rho) {
                *acc = NODATA;
            } else {
                *acc += (weight * rho as f64) as f32;
            }
        });
    }

    let (a, b) = (coefficients.a, coefficients.b);
    Ok(map1(&weighted, |sum| Some((sum + a) / b)))
}

/// `(NIR − Red)/(NIR + Red)`, nodata where the denominator is zero
pub fn ndvi(image: &Image) -> EtResult<Raster> {
    let nir = image.band(Band::Nir, STAGE)?;
    let red = image.band(Band::Red, STAGE)?;
    Ok(zip2(nir, red, ndvi_value))
}

/// Land-surface temperature in Kelvin.
///
/// The Landsat path needs NDVI for the emissivity correction, so NDVI has to be
/// on the image first.
pub fn land_surface_temperature(image: &Image, profile: &SensorProfile) -> EtResult<Raster> {
    let thermal = image.band(Band::Thermal, STAGE)?;

    match profile.thermal {
        ThermalModel::Kelvin { scale } => Ok(map1(thermal, |dn| {
            let kelvin = dn * scale;
            (kelvin > 0.0).then_some(kelvin)
        })),
        ThermalModel::Brightness { scale, emissivity } => {
            let ndvi = image.band(Band::Ndvi, STAGE)?;
            Ok(zip2(thermal, ndvi, |dn, ndvi| {
                brightness_to_lst(scale.apply(dn), ndvi, &emissivity)
            }))
        }
    }
}

fn brightness_to_lst(brightness_k: f64, ndvi: f64, model: &EmissivityModel) -> Option<f64> {
    lst_from_brightness(brightness_k, model.emissivity(ndvi))
}

/// Run the surface stage: adds albedo, NDVI and LST
pub fn add_surface_bands(mut image: Image, profile: &SensorProfile) -> EtResult<Image> {
    Stage::Surface.check(&image)?;

    let albedo = albedo(&image, profile)?;
    image.insert_band(Band::Albedo, albedo)?;

    let ndvi = ndvi(&image)?;
    image.insert_band(Band::Ndvi, ndvi)?;

    let lst = land_surface_temperature(&image, profile)?;
    image.insert_band(Band::Lst, lst)?;

    log::debug!("{}: surface bands ready", image.id);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sensor::{LANDSAT_PROFILE, MODIS_PROFILE};
    use crate::types::{EtError, GeoTransform, GridSpec};
    use approx::assert_abs_diff_eq;
    use chrono::Utc;
    use ndarray::array;

    fn image(rows: usize, cols: usize) -> Image {
        let grid = GridSpec {
            transform: GeoTransform::north_up(0.0, 0.0, 0.01),
            rows,
            cols,
        };
        Image::new("algebra-test", Utc::now(), grid)
    }

    #[test]
    fn test_ndvi_values() {
        let img = image(2, 2)
            .with_band(Band::Nir, array![[0.5f32, 0.3], [0.0, 0.2]])
            .unwrap()
            .with_band(Band::Red, array![[0.25f32, 0.3], [0.0, 0.6]])
            .unwrap();

        let out = ndvi(&img).unwrap();
        assert_abs_diff_eq!(out[[0, 0]], 1.0 / 3.0, epsilon = 1e-6);
        assert_eq!(out[[0, 1]], 0.0);
        assert_eq!(out[[1, 0]], NODATA);
        assert_abs_diff_eq!(out[[1, 1]], -0.5, epsilon = 1e-6);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_ndvi_bounded() {
        let values = [0.0f32, 0.001, 0.05, 0.2, 0.5, 0.9, 1.0];
        for &nir in &values {
            for &red in &values {
                if nir + red == 0.0 {
                    assert_eq!(ndvi_value(nir as f64, red as f64), None);
                    continue;
                }
                let v = ndvi_value(nir as f64, red as f64).unwrap();
                assert!((-1.0..=1.0).contains(&v), "ndvi({}, {}) = {}", nir, red, v);
            }
        }
    }

    #[test]
    fn test_landsat_albedo() {
        let mut img = image(1, 1);
        for band in [Band::Blue, Band::Red, Band::Nir, Band::Swir1, Band::Swir2] {
            img.insert_band(band, array![[0.2f32]]).unwrap();
        }
        // weights sum to 1.016, so (0.2 * 1.016 - 0.0018) / 1.016
        let out = albedo(&img, &LANDSAT_PROFILE).unwrap();
        assert_abs_diff_eq!(out[[0, 0]], 0.198228, epsilon = 1e-5);
    }

    #[test]
    fn test_albedo_missing_band() {
        let img = image(1, 1).with_band(Band::Red, array![[0.2f32]]).unwrap();
        let err = albedo(&img, &MODIS_PROFILE).unwrap_err();
        assert!(matches!(err, EtError::MissingBand { stage: "surface", .. }));
    }

    #[test]
    fn test_modis_lst_scale() {
        let img = image(1, 2).with_band(Band::Thermal, array![[15000.0f32, 0.0]]).unwrap();
        let out = land_surface_temperature(&img, &MODIS_PROFILE).unwrap();
        assert_abs_diff_eq!(out[[0, 0]], 300.0, epsilon = 1e-4);
        // zero is the MODIS LST fill value
        assert_eq!(out[[0, 1]], NODATA);
    }

    #[test]
    fn test_landsat_lst_needs_ndvi() {
        let img = image(1, 1).with_band(Band::Thermal, array![[44000.0f32]]).unwrap();
        let err = land_surface_temperature(&img, &LANDSAT_PROFILE).unwrap_err();
        assert!(matches!(err, EtError::MissingBand { band: Band::Ndvi, .. }));

        let img = img.with_band(Band::Ndvi, array![[0.8f32]]).unwrap();
        let out = land_surface_temperature(&img, &LANDSAT_PROFILE).unwrap();
        let tb = 44000.0 * 0.00341802 + 149.0;
        assert_abs_diff_eq!(out[[0, 0]] as f64, tb / 0.99f64.powf(0.25), epsilon = 1e-3);
    }
}
