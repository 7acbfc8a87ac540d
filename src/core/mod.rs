//! Core ET processing modules

pub mod band_algebra;
pub mod cloud_mask;
pub mod composite;
pub mod energy_balance;
pub mod pipeline;
pub mod presentation;
pub mod raster_ops;
pub mod sensor;
pub mod stage;
pub mod timeseries;

// Re-export main types
pub use band_algebra::{add_surface_bands, albedo, land_surface_temperature, ndvi};
pub use cloud_mask::{apply_cloud_mask, cloud_mask};
pub use composite::median_composite;
pub use energy_balance::{EnergyBalance, EnergyBalanceParams};
pub use pipeline::{
    DroppedImage, EtComputation, EtPipeline, EtRaster, EtReport, QueryStatus, RasterSummary,
};
pub use presentation::{recommendation, MapStyle, StressGauge, StressLevel};
pub use sensor::{SensorProfile, LANDSAT_PROFILE, MODIS_PROFILE};
pub use stage::Stage;
pub use timeseries::{EtSample, EtTimeSeries, Trend, TrendAnalyzer, TrendParams, TrendSummary};
