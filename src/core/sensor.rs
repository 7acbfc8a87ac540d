use crate::types::{is_valid, Band, EtError, EtResult, GridSpec, Image, Raster, Sensor, NODATA};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One source collection and the native band names it contributes
#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    pub id: &'static str,
    pub bands: &'static [(&'static str, Band)],
}

impl CollectionSpec {
    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|(name, _)| name.to_string()).collect()
    }
}

/// `value * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    pub scale: f64,
    pub offset: f64,
}

impl LinearScale {
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

/// Broadband albedo as `(Σ wᵢ·ρᵢ + a) / b`
#[derive(Debug, Clone, Copy)]
pub struct AlbedoCoefficients {
    pub weights: &'static [(Band, f64)],
    pub a: f64,
    pub b: f64,
}

/// NDVI-driven surface emissivity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissivityModel {
    /// Used for NDVI < 0 (water)
    pub water: f64,
    /// Emissivity at NDVI = 0
    pub bare_soil: f64,
    /// Used above `full_cover_ndvi`
    pub full_cover: f64,
    pub full_cover_ndvi: f64,
}

impl EmissivityModel {
    pub fn emissivity(&self, ndvi: f64) -> f64 {
        if ndvi < 0.0 {
            self.water
        } else if ndvi > self.full_cover_ndvi {
            self.full_cover
        } else {
            self.bare_soil + (self.full_cover - self.bare_soil) * ndvi / self.full_cover_ndvi
        }
    }
}

/// How the thermal band becomes land-surface temperature
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThermalModel {
    /// Band is already LST in Kelvin after scaling
    Kelvin { scale: f64 },
    /// Band is brightness temperature; LST = Tb / ε^0.25
    Brightness {
        scale: LinearScale,
        emissivity: EmissivityModel,
    },
}

/// Fixed configuration for one sensor
#[derive(Debug, Clone, Copy)]
pub struct SensorProfile {
    pub sensor: Sensor,
    /// First entry is the primary collection; further entries are inner-joined
    /// to it on acquisition time
    pub collections: &'static [CollectionSpec],
    pub reflectance: LinearScale,
    pub albedo: AlbedoCoefficients,
    pub thermal: ThermalModel,
    /// Native pixel size in meters
    pub resolution_m: f64,
    /// Bit of the quality band flagging cloud
    pub cloud_bit: u32,
}

pub const MODIS_PROFILE: SensorProfile = SensorProfile {
    sensor: Sensor::Modis,
    collections: &[
        CollectionSpec {
            id: "MODIS/061/MOD11A1",
            bands: &[("LST_Day_1km", Band::Thermal)],
        },
        CollectionSpec {
            id: "MODIS/061/MOD09GA",
            bands: &[
                ("sur_refl_b01", Band::Red),
                ("sur_refl_b02", Band::Nir),
                ("sur_refl_b03", Band::Blue),
                ("sur_refl_b04", Band::Green),
                ("sur_refl_b05", Band::Swir5),
                ("sur_refl_b06", Band::Swir1),
                ("sur_refl_b07", Band::Swir2),
                ("state_1km", Band::Quality),
            ],
        },
    ],
    reflectance: LinearScale { scale: 0.0001, offset: 0.0 },
    // Liang (2001) MODIS shortwave albedo
    albedo: AlbedoCoefficients {
        weights: &[
            (Band::Red, 0.160),
            (Band::Nir, 0.291),
            (Band::Blue, 0.243),
            (Band::Green, 0.116),
            (Band::Swir5, 0.112),
            (Band::Swir2, 0.081),
        ],
        a: -0.0015,
        b: 1.0,
    },
    thermal: ThermalModel::Kelvin { scale: 0.02 },
    resolution_m: 1000.0,
    // state_1km internal cloud algorithm flag
    cloud_bit: 10,
};

pub const LANDSAT_PROFILE: SensorProfile = SensorProfile {
    sensor: Sensor::Landsat,
    collections: &[CollectionSpec {
        id: "LANDSAT/LC08/C02/T1_L2",
        bands: &[
            ("SR_B2", Band::Blue),
            ("SR_B3", Band::Green),
            ("SR_B4", Band::Red),
            ("SR_B5", Band::Nir),
            ("SR_B6", Band::Swir1),
            ("SR_B7", Band::Swir2),
            ("ST_B10", Band::Thermal),
            ("QA_PIXEL", Band::Quality),
        ],
    }],
    reflectance: LinearScale { scale: 0.0000275, offset: -0.2 },
    // Liang (2001) adapted to OLI
    albedo: AlbedoCoefficients {
        weights: &[
            (Band::Blue, 0.356),
            (Band::Red, 0.130),
            (Band::Nir, 0.373),
            (Band::Swir1, 0.085),
            (Band::Swir2, 0.072),
        ],
        a: -0.0018,
        b: 1.016,
    },
    thermal: ThermalModel::Brightness {
        scale: LinearScale { scale: 0.00341802, offset: 149.0 },
        emissivity: EmissivityModel {
            water: 0.985,
            bare_soil: 0.97,
            full_cover: 0.99,
            full_cover_ndvi: 0.7,
        },
    },
    resolution_m: 30.0,
    // QA_PIXEL cloud
    cloud_bit: 3,
};

impl Sensor {
    pub fn profile(&self) -> &'static SensorProfile {
        match self {
            Sensor::Modis => &MODIS_PROFILE,
            Sensor::Landsat => &LANDSAT_PROFILE,
        }
    }
}

impl Band {
    pub fn is_reflectance(&self) -> bool {
        matches!(
            self,
            Band::Blue | Band::Green | Band::Red | Band::Nir | Band::Swir1 | Band::Swir2 | Band::Swir5
        )
    }
}

impl SensorProfile {
    pub fn primary_collection(&self) -> &'static CollectionSpec {
        &self.collections[0]
    }

    /// Build a logical [`Image`] from native band arrays.
    ///
    /// Reflectance bands are scaled to unitless reflectance here; the thermal
    /// band keeps its raw DN for the LST stage. Native bands not listed in the
    /// profile are ignored, listed bands that are absent are left out so the
    /// stage that needs them reports it.
    pub fn to_image(
        &self,
        id: impl Into<String>,
        acquired: DateTime<Utc>,
        grid: GridSpec,
        mut native: HashMap<String, Raster>,
    ) -> EtResult<Image> {
        let mut image = Image::new(id, acquired, grid);

        for collection in self.collections {
            for (name, band) in collection.bands {
                let Some(data) = native.remove(*name) else {
                    log::debug!("{}: native band {} not present", image.id, name);
                    continue;
                };
                let data = if band.is_reflectance() {
                    let scale = self.reflectance;
                    data.mapv(|v| {
                        if is_valid(v) {
                            scale.apply(v as f64) as f32
                        } else {
                            NODATA
                        }
                    })
                } else {
                    data
                };
                image.insert_band(*band, data)?;
            }
        }

        if image.band_count() == 0 {
            return Err(EtError::Processing(format!(
                "{} carries none of the {} bands",
                image.id, self.sensor
            )));
        }

        Ok(image)
    }
}
