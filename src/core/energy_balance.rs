//! Simplified SEBAL energy balance: Rn → G → H → LE/ET.
//!
//! Incoming radiation is a pair of constants and H uses a fixed linear dT model
//! with constant aerodynamic resistance; there is no hot/cold anchor pixel
//! calibration.

use crate::core::raster_ops::{map1, zip2, zip3, zip4};
use crate::core::stage::Stage;
use crate::types::{Band, EtResult, Image, Raster};
use serde::{Deserialize, Serialize};

/// Kelvin offset used by the G/Rn ratio
pub const ZERO_CELSIUS_K: f64 = 273.15;

/// Constants of the energy-balance model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyBalanceParams {
    /// Incoming shortwave radiation Rs↓ (W/m²)
    pub shortwave_in: f64,
    /// Incoming longwave radiation Rl↓ (W/m²)
    pub longwave_in: f64,
    /// Stefan-Boltzmann constant (W/m²/K⁴)
    pub stefan_boltzmann: f64,
    /// dT = dt_slope * LST + dt_intercept
    pub dt_slope: f64,
    pub dt_intercept: f64,
    /// Aerodynamic resistance to heat transport rah (s/m)
    pub aerodynamic_resistance: f64,
    /// Specific heat of air cp (J/kg/K)
    pub air_specific_heat: f64,
    /// Air density at sea level (kg/m³)
    pub sea_level_air_density: f64,
    /// Reference air temperature for the density lapse (K)
    pub reference_air_temperature: f64,
    /// Temperature lapse rate (K/m)
    pub lapse_rate: f64,
    pub density_exponent: f64,
    /// W/m² to daily energy factor
    pub et_conversion_factor: f64,
    /// Latent heat of vaporization (J/g)
    pub latent_heat_vaporization: f64,
}

impl Default for EnergyBalanceParams {
    fn default() -> Self {
        Self {
            shortwave_in: 1000.0,
            longwave_in: 300.0,
            stefan_boltzmann: 5.67e-8,
            dt_slope: 0.3225,
            dt_intercept: -91.743,
            aerodynamic_resistance: 10.0,
            air_specific_heat: 1004.0,
            sea_level_air_density: 1.225,
            reference_air_temperature: 293.0,
            lapse_rate: 0.0065,
            density_exponent: 5.26,
            et_conversion_factor: 0.0864,
            latent_heat_vaporization: 2450.0,
        }
    }
}

impl EnergyBalanceParams {
    /// Rn = (1 − α)·Rs↓ + Rl↓ − σ·LST⁴
    pub fn net_radiation(&self, albedo: f64, lst: f64) -> f64 {
        let longwave_out = self.stefan_boltzmann * lst.powi(4);
        (1.0 - albedo) * self.shortwave_in + self.longwave_in - longwave_out
    }

    /// G/Rn = (T − 273.15)/α · (0.0038α + 0.0074α²) · (1 − 0.98·NDVI⁴)
    pub fn soil_heat_ratio(&self, lst: f64, albedo: f64, ndvi: f64) -> Option<f64> {
        if albedo == 0.0 {
            return None;
        }
        let celsius = lst - ZERO_CELSIUS_K;
        Some(
            celsius / albedo
                * (0.0038 * albedo + 0.0074 * albedo * albedo)
                * (1.0 - 0.98 * ndvi.powi(4)),
        )
    }

    pub fn soil_heat_flux(&self, rn: f64, lst: f64, albedo: f64, ndvi: f64) -> Option<f64> {
        self.soil_heat_ratio(lst, albedo, ndvi).map(|ratio| rn * ratio)
    }

    /// Near-surface temperature difference proxy (K)
    pub fn temperature_difference(&self, lst: f64) -> f64 {
        self.dt_slope * lst + self.dt_intercept
    }

    /// Air density from elevation (kg/m³)
    pub fn air_density(&self, elevation_m: f64) -> Option<f64> {
        let t0 = self.reference_air_temperature;
        let ratio = (t0 - self.lapse_rate * elevation_m) / t0;
        if ratio <= 0.0 {
            return None;
        }
        Some(self.sea_level_air_density * ratio.powf(self.density_exponent))
    }

    /// H = ρ·cp·dT / rah
    pub fn sensible_heat_flux(&self, lst: f64, elevation_m: f64) -> Option<f64> {
        if self.aerodynamic_resistance <= 0.0 {
            return None;
        }
        let rho = self.air_density(elevation_m)?;
        Some(rho * self.air_specific_heat * self.temperature_difference(lst) / self.aerodynamic_resistance)
    }

    /// ET (mm/day) from latent heat flux, clamped at zero
    pub fn et_from_latent_heat(&self, le: f64) -> f64 {
        (le * self.et_conversion_factor / self.latent_heat_vaporization).max(0.0)
    }
}

/// Runs the energy-balance stages over one image
#[derive(Debug, Clone, Default)]
pub struct EnergyBalance {
    params: EnergyBalanceParams,
}

impl EnergyBalance {
    pub fn new(params: EnergyBalanceParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &EnergyBalanceParams {
        &self.params
    }

    pub fn net_radiation(&self, image: &mut Image) -> EtResult<()> {
        let stage = Stage::NetRadiation;
        stage.check(image)?;
        let albedo = image.band(Band::Albedo, stage.name())?;
        let lst = image.band(Band::Lst, stage.name())?;

        let rn = zip2(albedo, lst, |albedo, lst| Some(self.params.net_radiation(albedo, lst)));
        image.insert_band(Band::NetRadiation, rn)
    }

    pub fn soil_heat_flux(&self, image: &mut Image) -> EtResult<()> {
        let stage = Stage::SoilHeatFlux;
        stage.check(image)?;
        let rn = image.band(Band::NetRadiation, stage.name())?;
        let lst = image.band(Band::Lst, stage.name())?;
        let albedo = image.band(Band::Albedo, stage.name())?;
        let ndvi = image.band(Band::Ndvi, stage.name())?;

        let g = zip4(rn, lst, albedo, ndvi, |rn, lst, albedo, ndvi| {
            self.params.soil_heat_flux(rn, lst, albedo, ndvi)
        });
        image.insert_band(Band::SoilHeatFlux, g)
    }

    pub fn sensible_heat_flux(&self, image: &mut Image) -> EtResult<()> {
        let stage = Stage::SensibleHeatFlux;
        stage.check(image)?;
        let lst = image.band(Band::Lst, stage.name())?;
        let elevation = image.band(Band::Elevation, stage.name())?;

        let h = zip2(lst, elevation, |lst, z| self.params.sensible_heat_flux(lst, z));
        image.insert_band(Band::SensibleHeatFlux, h)
    }

    /// LE = Rn − G − H, then ET = max(0, LE·0.0864/2450)
    pub fn evapotranspiration(&self, image: &mut Image) -> EtResult<()> {
        let stage = Stage::Evapotranspiration;
        stage.check(image)?;
        let rn = image.band(Band::NetRadiation, stage.name())?;
        let g = image.band(Band::SoilHeatFlux, stage.name())?;
        let h = image.band(Band::SensibleHeatFlux, stage.name())?;

        let le: Raster = zip3(rn, g, h, |rn, g, h| Some(rn - g - h));
        let et = map1(&le, |le| Some(self.params.et_from_latent_heat(le)));

        image.insert_band(Band::LatentHeatFlux, le)?;
        image.insert_band(Band::Et, et)
    }

    /// Attach the DEM and run Rn → G → H → LE/ET in order
    pub fn apply(&self, mut image: Image, elevation: Raster) -> EtResult<Image> {
        image.insert_band(Band::Elevation, elevation)?;

        self.net_radiation(&mut image)?;
        self.soil_heat_flux(&mut image)?;
        self.sensible_heat_flux(&mut image)?;
        self.evapotranspiration(&mut image)?;

        log::debug!("{}: energy balance complete", image.id);
        Ok(image)
    }
}
