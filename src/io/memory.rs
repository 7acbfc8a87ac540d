use crate::io::backend::{PublishRequest, RasterBackend, RasterHandle, Scene, SceneQuery};
use crate::types::{EtError, EtResult, GridSpec, Raster};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Where the in-memory backend gets elevation from
#[derive(Debug, Clone)]
pub enum ElevationSource {
    /// Same height everywhere
    Uniform(f32),
    /// Returned as-is regardless of the requested grid
    Raster(Raster),
}

/// Published raster retained by [`MemoryBackend`]
#[derive(Debug, Clone)]
pub struct PublishedRaster {
    pub handle: RasterHandle,
    pub name: String,
    pub grid: GridSpec,
    pub data: Raster,
}

/// In-process scene catalog.
///
/// Serves tests, demos and offline runs with the same contract as the remote
/// service. Date filtering is inclusive on both ends.
#[derive(Debug)]
pub struct MemoryBackend {
    scenes: Vec<Scene>,
    elevation: ElevationSource,
    outage: Option<String>,
    published: Mutex<Vec<PublishedRaster>>,
    search_calls: AtomicUsize,
    elevation_calls: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            scenes: Vec::new(),
            elevation: ElevationSource::Uniform(0.0),
            outage: None,
            published: Mutex::new(Vec::new()),
            search_calls: AtomicUsize::new(0),
            elevation_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_scene(mut self, scene: Scene) -> Self {
        self.scenes.push(scene);
        self
    }

    pub fn with_scenes(mut self, scenes: impl IntoIterator<Item = Scene>) -> Self {
        self.scenes.extend(scenes);
        self
    }

    pub fn with_elevation(mut self, elevation: ElevationSource) -> Self {
        self.elevation = elevation;
        self
    }

    /// Every call fails with a backend error carrying `message`
    pub fn with_outage(mut self, message: impl Into<String>) -> Self {
        self.outage = Some(message.into());
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn elevation_calls(&self) -> usize {
        self.elevation_calls.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<PublishedRaster> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn check_available(&self) -> EtResult<()> {
        match &self.outage {
            Some(message) => Err(EtError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

impl RasterBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn search(&self, query: &SceneQuery) -> EtResult<Vec<Scene>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut matches: Vec<Scene> = self
            .scenes
            .iter()
            .filter(|scene| scene.collection == query.collection)
            .filter(|scene| {
                let date = scene.acquired.date_naive();
                date >= query.start && date <= query.end
            })
            .filter(|scene| scene.bounds().intersects(&query.bounds))
            .map(|scene| {
                let mut scene = scene.clone();
                if !query.bands.is_empty() {
                    scene.bands.retain(|name, _| query.bands.contains(name));
                }
                scene
            })
            .collect();
        matches.sort_by_key(|scene| scene.acquired);

        log::debug!(
            "memory backend: {} scenes of {} between {} and {}",
            matches.len(),
            query.collection,
            query.start,
            query.end
        );
        Ok(matches)
    }

    fn elevation(&self, grid: &GridSpec) -> EtResult<Raster> {
        self.elevation_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        Ok(match &self.elevation {
            ElevationSource::Uniform(z) => Raster::from_elem(grid.shape(), *z),
            ElevationSource::Raster(dem) => dem.clone(),
        })
    }

    fn publish(&self, request: &PublishRequest<'_>) -> EtResult<RasterHandle> {
        self.check_available()?;

        let mut published = self
            .published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let handle = RasterHandle(format!("memory://rasters/{}/{}", published.len(), request.name));
        published.push(PublishedRaster {
            handle: handle.clone(),
            name: request.name.to_string(),
            grid: *request.grid,
            data: request.data.clone(),
        });
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::presentation::MapStyle;
    use crate::types::{BoundingBox, GeoTransform};
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::HashMap;

    fn scene(collection: &str, day: u32, lon: f64) -> Scene {
        let mut bands = HashMap::new();
        bands.insert("LST_Day_1km".to_string(), Raster::from_elem((2, 2), 15000.0));
        bands.insert("QC_Day".to_string(), Raster::zeros((2, 2)));
        Scene {
            id: format!("{}-{}", collection, day),
            collection: collection.to_string(),
            acquired: Utc.with_ymd_and_hms(2023, 1, day, 0, 0, 0).unwrap(),
            grid: GridSpec {
                transform: GeoTransform::north_up(lon, 31.6, 0.01),
                rows: 2,
                cols: 2,
            },
            bands,
        }
    }

    fn query(start: u32, end: u32) -> SceneQuery {
        SceneQuery {
            collection: "thermal".to_string(),
            start: NaiveDate::from_ymd_opt(2023, 1, start).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 1, end).unwrap(),
            bounds: BoundingBox { min_lon: 48.30, max_lon: 48.31, min_lat: 31.58, max_lat: 31.59 },
            scale_m: 1000.0,
            bands: vec!["LST_Day_1km".to_string()],
        }
    }

    #[test]
    fn test_search_filters() {
        let backend = MemoryBackend::new().with_scenes(vec![
            scene("thermal", 20, 48.3),
            scene("thermal", 5, 48.3),
            scene("thermal", 31, 48.3),
            scene("reflectance", 6, 48.3),
            scene("thermal", 7, 10.0),
        ]);

        let found = backend.search(&query(1, 20)).unwrap();
        let ids: Vec<_> = found.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["thermal-5", "thermal-20"]);
        assert!(found.iter().all(|s| s.bands.len() == 1));
        assert_eq!(backend.search_calls(), 1);

        assert!(backend.search(&query(21, 30)).unwrap().is_empty());
    }

    #[test]
    fn test_outage() {
        let backend = MemoryBackend::new().with_outage("quota exceeded");
        let err = backend.search(&query(1, 31)).unwrap_err();
        assert!(matches!(err, EtError::Backend(ref m) if m == "quota exceeded"));
    }

    #[test]
    fn test_publish_and_elevation() {
        let backend = MemoryBackend::new().with_elevation(ElevationSource::Uniform(12.5));
        let grid = scene("thermal", 1, 48.3).grid;

        let dem = backend.elevation(&grid).unwrap();
        assert_eq!(dem.dim(), (2, 2));
        assert_eq!(dem[[1, 1]], 12.5);

        let data = Raster::from_elem((2, 2), 3.0);
        let style = MapStyle::default();
        let handle = backend
            .publish(&PublishRequest { name: "et", grid: &grid, data: &data, style: &style })
            .unwrap();
        assert_eq!(handle.0, "memory://rasters/0/et");
        assert_eq!(backend.published().len(), 1);
    }
}
