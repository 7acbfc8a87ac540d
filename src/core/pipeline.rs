//! Farm-level ET orchestration.
//!
//! Fetches the sensor's collections for a farm and date range, joins them,
//! runs every image through cloud masking, surface bands and the energy
//! balance, then aggregates ET into a per-pixel median raster and a farm
//! time series.

use crate::config::{parse_iso_date, EtConfig};
use crate::core::band_algebra::add_surface_bands;
use crate::core::cloud_mask::apply_cloud_mask;
use crate::core::composite::median_composite;
use crate::core::energy_balance::EnergyBalance;
use crate::core::presentation::{recommendation, MapStyle, StressGauge};
use crate::core::raster_ops::{valid_fraction, valid_range};
use crate::core::sensor::SensorProfile;
use crate::core::timeseries::{
    sample_first_valid, EtSample, EtTimeSeries, TrendAnalyzer, TrendSummary,
};
use crate::geometry::Geometry;
use crate::io::backend::{PublishRequest, RasterBackend, RasterHandle, Scene, SceneQuery};
use crate::types::{Band, BoundingBox, EtResult, GridSpec, Image, Raster, Sensor};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

/// Image removed from the run by a per-image failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedImage {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub reason: String,
}

/// Published median ET raster
#[derive(Debug, Clone)]
pub struct EtRaster {
    pub handle: RasterHandle,
    pub grid: GridSpec,
    pub data: Raster,
    pub style: MapStyle,
    /// Images that contributed to the median
    pub source_images: usize,
}

/// Result of [`EtPipeline::compute_et`]
#[derive(Debug, Clone)]
pub struct EtComputation {
    pub sensor: Sensor,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// `None` when no image survived
    pub et_raster: Option<EtRaster>,
    /// Processed images carrying the full band chain, ascending by time
    pub images: Vec<Image>,
    pub dropped: Vec<DroppedImage>,
    /// Number of images that completed the chain
    pub image_count: usize,
}

impl EtComputation {
    pub fn has_imagery(&self) -> bool {
        self.image_count > 0
    }

    /// One sample per joined image, dropped images as nulls
    pub fn time_series(&self, geometry: &Geometry) -> EtTimeSeries {
        let processed = self.images.iter().map(|image| EtSample {
            date: image.date(),
            et: image
                .band(Band::Et, "time_series")
                .ok()
                .and_then(|et| sample_first_valid(et, &image.grid, geometry)),
        });
        let dropped = self.dropped.iter().map(|d| EtSample {
            date: d.acquired.date_naive(),
            et: None,
        });
        EtTimeSeries::from_samples(processed.chain(dropped).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Nothing matched the query, or every match was dropped
    NoImagery,
    Computed,
}

/// Serializable view of the median raster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterSummary {
    pub handle: RasterHandle,
    pub rows: usize,
    pub cols: usize,
    pub valid_fraction: f64,
    pub min_et: Option<f32>,
    pub max_et: Option<f32>,
    pub source_images: usize,
    pub style: MapStyle,
}

impl From<&EtRaster> for RasterSummary {
    fn from(raster: &EtRaster) -> Self {
        let range = valid_range(&raster.data);
        Self {
            handle: raster.handle.clone(),
            rows: raster.grid.rows,
            cols: raster.grid.cols,
            valid_fraction: valid_fraction(&raster.data),
            min_et: range.map(|r| r.0),
            max_et: range.map(|r| r.1),
            source_images: raster.source_images,
            style: raster.style.clone(),
        }
    }
}

/// Everything the dashboard shows for one farm query
#[derive(Debug, Clone, Serialize)]
pub struct EtReport {
    pub status: QueryStatus,
    pub sensor: Sensor,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub image_count: usize,
    pub dropped: Vec<DroppedImage>,
    pub raster: Option<RasterSummary>,
    pub series: EtTimeSeries,
    pub summary: TrendSummary,
    pub stress: Option<StressGauge>,
    pub recommendation: String,
    #[serde(skip)]
    pub computation: EtComputation,
}

/// Native bands of one acquisition, merged across joined collections
struct SceneBundle {
    id: String,
    acquired: DateTime<Utc>,
    grid: GridSpec,
    bands: HashMap<String, Raster>,
}

/// ET pipeline bound to one raster backend
pub struct EtPipeline<B: RasterBackend> {
    backend: B,
    energy_balance: EnergyBalance,
    analyzer: TrendAnalyzer,
    style: MapStyle,
    parallel: bool,
}

impl<B: RasterBackend> EtPipeline<B> {
    pub fn new(backend: B, config: &EtConfig) -> Self {
        Self {
            backend,
            energy_balance: EnergyBalance::new(config.energy_balance.clone()),
            analyzer: TrendAnalyzer::new(config.trend.clone()),
            style: MapStyle::default(),
            parallel: config.parallel,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Median ET raster and per-image results for a farm and date range
    pub fn compute_et(
        &self,
        geometry: &Geometry,
        start: NaiveDate,
        end: NaiveDate,
        sensor: Sensor,
    ) -> EtResult<EtComputation> {
        let timer = Instant::now();
        let profile = sensor.profile();
        let bounds = geometry.bounds()?;

        log::info!("Computing {} ET for {} to {} via {}", sensor, start, end, self.backend.name());

        let bundles = self.fetch_bundles(profile, start, end, bounds)?;
        log::info!("{} {} acquisitions to process", bundles.len(), sensor);

        let results = self.process_bundles(profile, bundles);

        let mut images = Vec::with_capacity(results.len());
        let mut dropped = Vec::new();
        for (id, acquired, result) in results {
            match result {
                Ok(image) => images.push(image),
                Err(e) if e.is_per_image() => {
                    log::warn!("Dropping image {}: {}", id, e);
                    dropped.push(DroppedImage { id, acquired, reason: e.to_string() });
                }
                Err(e) => return Err(e),
            }
        }
        images.sort_by_key(|image| image.acquired);
        dropped.sort_by_key(|d| d.acquired);

        let et_raster = self.composite_and_publish(&images, sensor, start, end)?;

        log::info!(
            "{} ET done in {:.2?}: {} images, {} dropped",
            sensor,
            timer.elapsed(),
            images.len(),
            dropped.len()
        );

        Ok(EtComputation {
            sensor,
            start,
            end,
            et_raster,
            image_count: images.len(),
            images,
            dropped,
        })
    }

    /// String entry point; the sensor is validated before any backend call
    pub fn compute_et_str(
        &self,
        geometry: &Geometry,
        start: &str,
        end: &str,
        sensor: &str,
    ) -> EtResult<EtComputation> {
        let sensor: Sensor = sensor.parse()?;
        let start = parse_iso_date(start)?;
        let end = parse_iso_date(end)?;
        self.compute_et(geometry, start, end, sensor)
    }

    /// ET computation plus time series, trend summary and advice
    pub fn analyze(
        &self,
        geometry: &Geometry,
        start: NaiveDate,
        end: NaiveDate,
        sensor: Sensor,
    ) -> EtResult<EtReport> {
        let computation = self.compute_et(geometry, start, end, sensor)?;
        let series = computation.time_series(geometry);
        let summary = self.analyzer.summarize(&series);
        let stress = summary
            .water_stress_days
            .and_then(|days| StressGauge::from_counts(days, series.values().len()));
        let advice = recommendation(&summary, stress.as_ref(), computation.has_imagery());

        let status = if computation.has_imagery() {
            QueryStatus::Computed
        } else {
            log::info!("No usable {} imagery between {} and {}", sensor, start, end);
            QueryStatus::NoImagery
        };

        Ok(EtReport {
            status,
            sensor,
            start,
            end,
            image_count: computation.image_count,
            dropped: computation.dropped.clone(),
            raster: computation.et_raster.as_ref().map(RasterSummary::from),
            series,
            summary,
            stress,
            recommendation: advice,
            computation,
        })
    }

    pub fn analyze_str(
        &self,
        geometry: &Geometry,
        start: &str,
        end: &str,
        sensor: &str,
    ) -> EtResult<EtReport> {
        let sensor: Sensor = sensor.parse()?;
        let start = parse_iso_date(start)?;
        let end = parse_iso_date(end)?;
        self.analyze(geometry, start, end, sensor)
    }

    fn fetch_bundles(
        &self,
        profile: &SensorProfile,
        start: NaiveDate,
        end: NaiveDate,
        bounds: BoundingBox,
    ) -> EtResult<Vec<SceneBundle>> {
        let mut per_collection = Vec::with_capacity(profile.collections.len());
        for collection in profile.collections {
            let query = SceneQuery {
                collection: collection.id.to_string(),
                start,
                end,
                bounds,
                scale_m: profile.resolution_m,
                bands: collection.band_names(),
            };
            let scenes = self.backend.search(&query)?;
            log::debug!("{}: {} scenes", collection.id, scenes.len());
            per_collection.push(scenes);
        }

        let mut collections = per_collection.into_iter();
        let primary = collections.next().unwrap_or_default();
        let others: Vec<Vec<Scene>> = collections.collect();
        Ok(join_on_acquired(primary, others))
    }

    fn process_bundles(
        &self,
        profile: &SensorProfile,
        bundles: Vec<SceneBundle>,
    ) -> Vec<(String, DateTime<Utc>, EtResult<Image>)> {
        let run = |bundle: SceneBundle| {
            let (id, acquired) = (bundle.id.clone(), bundle.acquired);
            let result = self.process_bundle(profile, bundle);
            (id, acquired, result)
        };

        #[cfg(feature = "parallel")]
        if self.parallel {
            use rayon::prelude::*;
            log::debug!("Processing {} images on the rayon pool", bundles.len());
            return bundles.into_par_iter().map(run).collect();
        }
        #[cfg(not(feature = "parallel"))]
        if self.parallel {
            log::debug!("Built without the parallel feature, processing sequentially");
        }

        bundles.into_iter().map(run).collect()
    }

    /// Cloud mask, surface bands, DEM and energy balance for one acquisition
    fn process_bundle(&self, profile: &SensorProfile, bundle: SceneBundle) -> EtResult<Image> {
        let image = profile.to_image(bundle.id, bundle.acquired, bundle.grid, bundle.bands)?;
        let image = apply_cloud_mask(image, profile)?;
        let image = add_surface_bands(image, profile)?;
        let elevation = self.backend.elevation(&image.grid)?;
        self.energy_balance.apply(image, elevation)
    }

    fn composite_and_publish(
        &self,
        images: &[Image],
        sensor: Sensor,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EtResult<Option<EtRaster>> {
        let Some(reference) = images.first() else {
            return Ok(None);
        };
        let grid = reference.grid;

        let mut layers = Vec::with_capacity(images.len());
        for image in images {
            if image.grid.shape() != grid.shape() {
                log::warn!(
                    "{} is on a {:?} grid, composite uses {:?}; left out of the median",
                    image.id,
                    image.grid.shape(),
                    grid.shape()
                );
                continue;
            }
            layers.push(image.band(Band::Et, "composite")?);
        }

        let data = median_composite(&layers)?;
        let name = format!("et_{}_{}_{}", sensor, start, end).to_lowercase();
        let handle = self.backend.publish(&PublishRequest {
            name: &name,
            grid: &grid,
            data: &data,
            style: &self.style,
        })?;
        log::info!("Published median ET raster as {}", handle);

        Ok(Some(EtRaster {
            handle,
            grid,
            data,
            style: self.style.clone(),
            source_images: layers.len(),
        }))
    }
}

/// Inner join on acquisition time: a primary scene survives only when every
/// other collection has a scene with the same timestamp
fn join_on_acquired(primary: Vec<Scene>, others: Vec<Vec<Scene>>) -> Vec<SceneBundle> {
    let mut lookups: Vec<HashMap<DateTime<Utc>, Scene>> = others
        .into_iter()
        .map(|scenes| {
            let mut by_time = HashMap::with_capacity(scenes.len());
            for scene in scenes {
                by_time.entry(scene.acquired).or_insert(scene);
            }
            by_time
        })
        .collect();

    let total = primary.len();
    let bundles: Vec<SceneBundle> = primary
        .into_iter()
        .filter_map(|scene| {
            if !lookups.iter().all(|l| l.contains_key(&scene.acquired)) {
                log::debug!("{} has no partner at {}, excluded", scene.id, scene.acquired);
                return None;
            }
            let mut bands = scene.bands;
            for lookup in lookups.iter_mut() {
                if let Some(partner) = lookup.remove(&scene.acquired) {
                    bands.extend(partner.bands);
                }
            }
            Some(SceneBundle {
                id: scene.id,
                acquired: scene.acquired,
                grid: scene.grid,
                bands,
            })
        })
        .collect();

    if bundles.len() < total {
        log::info!("Join kept {} of {} primary scenes", bundles.len(), total);
    }
    bundles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use chrono::TimeZone;

    fn scene(id: &str, hour: u32, band: &str) -> Scene {
        let mut bands = HashMap::new();
        bands.insert(band.to_string(), Raster::zeros((1, 1)));
        Scene {
            id: id.to_string(),
            collection: "c".to_string(),
            acquired: Utc.with_ymd_and_hms(2023, 1, 1, hour, 0, 0).unwrap(),
            grid: GridSpec { transform: GeoTransform::north_up(0.0, 0.0, 1.0), rows: 1, cols: 1 },
            bands,
        }
    }

    #[test]
    fn test_join_is_inner() {
        let primary = vec![scene("lst-a", 1, "LST"), scene("lst-b", 2, "LST")];
        let reflectance = vec![scene("sr-b", 2, "SR"), scene("sr-c", 3, "SR")];

        let bundles = join_on_acquired(primary, vec![reflectance]);
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].id, "lst-b");
        assert!(bundles[0].bands.contains_key("LST"));
        assert!(bundles[0].bands.contains_key("SR"));
    }

    #[test]
    fn test_join_without_partners_keeps_primary() {
        let primary = vec![scene("a", 1, "B"), scene("b", 2, "B")];
        assert_eq!(join_on_acquired(primary, Vec::new()).len(), 2);
    }
}
