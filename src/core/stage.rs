use crate::types::{Band, EtError, EtResult, Image};

/// Pipeline stages in the order they run on one image.
///
/// Each stage lists the bands it needs and the bands it guarantees afterwards.
/// Stage functions call [`Stage::check`] on entry so a stage invoked out of
/// order fails with `MissingBand` instead of reading garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    CloudMask,
    Surface,
    NetRadiation,
    SoilHeatFlux,
    SensibleHeatFlux,
    Evapotranspiration,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::CloudMask,
        Stage::Surface,
        Stage::NetRadiation,
        Stage::SoilHeatFlux,
        Stage::SensibleHeatFlux,
        Stage::Evapotranspiration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::CloudMask => "cloud_mask",
            Stage::Surface => "surface",
            Stage::NetRadiation => "net_radiation",
            Stage::SoilHeatFlux => "soil_heat_flux",
            Stage::SensibleHeatFlux => "sensible_heat_flux",
            Stage::Evapotranspiration => "evapotranspiration",
        }
    }

    /// Bands that must exist before the stage runs. Surface needs the sensor's
    /// reflectance bands as well; those are checked by the band functions.
    pub fn requires(&self) -> &'static [Band] {
        match self {
            Stage::CloudMask => &[Band::Quality],
            Stage::Surface => &[Band::Red, Band::Nir, Band::Thermal],
            Stage::NetRadiation => &[Band::Albedo, Band::Lst],
            Stage::SoilHeatFlux => &[Band::NetRadiation, Band::Lst, Band::Albedo, Band::Ndvi],
            Stage::SensibleHeatFlux => &[Band::Lst, Band::Elevation],
            Stage::Evapotranspiration => &[
                Band::NetRadiation,
                Band::SoilHeatFlux,
                Band::SensibleHeatFlux,
            ],
        }
    }

    pub fn produces(&self) -> &'static [Band] {
        match self {
            Stage::CloudMask => &[],
            Stage::Surface => &[Band::Albedo, Band::Ndvi, Band::Lst],
            Stage::NetRadiation => &[Band::NetRadiation],
            Stage::SoilHeatFlux => &[Band::SoilHeatFlux],
            Stage::SensibleHeatFlux => &[Band::SensibleHeatFlux],
            Stage::Evapotranspiration => &[Band::LatentHeatFlux, Band::Et],
        }
    }

    pub fn check(&self, image: &Image) -> EtResult<()> {
        match self.requires().iter().find(|band| !image.has_band(**band)) {
            Some(band) => Err(EtError::MissingBand {
                band: *band,
                stage: self.name(),
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
