use crate::io::backend::{PublishRequest, RasterBackend, RasterHandle, Scene, SceneQuery};
use crate::types::{EtResult, GridSpec, Raster};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

fn grid_key(grid: &GridSpec) -> String {
    let t = &grid.transform;
    format!(
        "{:x}:{:x}:{:x}:{:x}:{:x}:{:x}|{}x{}",
        t.top_left_x.to_bits(),
        t.pixel_width.to_bits(),
        t.rotation_x.to_bits(),
        t.top_left_y.to_bits(),
        t.rotation_y.to_bits(),
        t.pixel_height.to_bits(),
        grid.rows,
        grid.cols
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Memoizes scene searches and elevation grids for the life of the process.
///
/// Keys are exact: a query that differs in any float bit is a new entry.
/// Errors are not cached. Publishing always goes to the inner backend.
#[derive(Debug)]
pub struct CachedBackend<B> {
    inner: B,
    scenes: Mutex<HashMap<String, Vec<Scene>>>,
    elevation: Mutex<HashMap<String, Raster>>,
}

impl<B: RasterBackend> CachedBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            scenes: Mutex::new(HashMap::new()),
            elevation: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn cached_queries(&self) -> usize {
        lock(&self.scenes).len()
    }

    pub fn clear(&self) {
        lock(&self.scenes).clear();
        lock(&self.elevation).clear();
    }
}

impl<B: RasterBackend> RasterBackend for CachedBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn search(&self, query: &SceneQuery) -> EtResult<Vec<Scene>> {
        let key = query.cache_key();
        if let Some(hit) = lock(&self.scenes).get(&key) {
            log::debug!("Scene cache hit for {}", query.collection);
            return Ok(hit.clone());
        }

        // Not held across the fetch; a concurrent miss fetches twice
        let scenes = self.inner.search(query)?;
        lock(&self.scenes).insert(key, scenes.clone());
        Ok(scenes)
    }

    fn elevation(&self, grid: &GridSpec) -> EtResult<Raster> {
        let key = grid_key(grid);
        if let Some(hit) = lock(&self.elevation).get(&key) {
            return Ok(hit.clone());
        }

        let dem = self.inner.elevation(grid)?;
        lock(&self.elevation).insert(key, dem.clone());
        Ok(dem)
    }

    fn publish(&self, request: &PublishRequest<'_>) -> EtResult<RasterHandle> {
        self.inner.publish(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::MemoryBackend;
    use crate::types::{BoundingBox, GeoTransform};
    use chrono::NaiveDate;

    fn query(max_lat: f64) -> SceneQuery {
        SceneQuery {
            collection: "LANDSAT/LC08/C02/T1_L2".to_string(),
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 3, 1).unwrap(),
            bounds: BoundingBox { min_lon: 48.3, max_lon: 48.4, min_lat: 31.5, max_lat },
            scale_m: 30.0,
            bands: Vec::new(),
        }
    }

    #[test]
    fn test_search_memoized_per_exact_query() {
        let cached = CachedBackend::new(MemoryBackend::new());

        cached.search(&query(31.6)).unwrap();
        cached.search(&query(31.6)).unwrap();
        assert_eq!(cached.inner().search_calls(), 1);

        cached.search(&query(31.600000001)).unwrap();
        assert_eq!(cached.inner().search_calls(), 2);
        assert_eq!(cached.cached_queries(), 2);

        cached.clear();
        cached.search(&query(31.6)).unwrap();
        assert_eq!(cached.inner().search_calls(), 3);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cached = CachedBackend::new(MemoryBackend::new().with_outage("down"));
        assert!(cached.search(&query(31.6)).is_err());
        assert!(cached.search(&query(31.6)).is_err());
        assert_eq!(cached.inner().search_calls(), 2);
        assert_eq!(cached.cached_queries(), 0);
    }

    #[test]
    fn test_elevation_memoized_per_grid() {
        let cached = CachedBackend::new(MemoryBackend::new());
        let grid = GridSpec { transform: GeoTransform::north_up(48.3, 31.6, 0.01), rows: 3, cols: 3 };
        let other = GridSpec { rows: 4, ..grid };

        cached.elevation(&grid).unwrap();
        cached.elevation(&grid).unwrap();
        assert_eq!(cached.inner().elevation_calls(), 1);
        assert_eq!(cached.elevation(&other).unwrap().dim(), (4, 3));
        assert_eq!(cached.inner().elevation_calls(), 2);
    }
}
