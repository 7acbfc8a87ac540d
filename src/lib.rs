//! cane-et: Surface Energy-Balance Evapotranspiration for Sugarcane Farms
//!
//! This library turns MODIS or Landsat imagery over a farm into a median
//! evapotranspiration raster, an ET time series and a trend summary that
//! drive irrigation decisions.

pub mod config;
pub mod core;
pub mod geometry;
pub mod io;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use crate::config::{parse_iso_date, BackendConfig, EtConfig};
pub use crate::core::{EtComputation, EtPipeline, EtReport, QueryStatus, Trend, TrendSummary};
pub use crate::geometry::Geometry;
pub use crate::io::{CachedBackend, HttpBackend, MemoryBackend, RasterBackend};
pub use crate::types::{Band, EtError, EtResult, Image, Raster, Sensor, NODATA};
