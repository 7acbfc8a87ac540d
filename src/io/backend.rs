use crate::core::presentation::MapStyle;
use crate::types::{BoundingBox, EtResult, GridSpec, Raster};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Scene search filter: one collection, an inclusive date range and the AOI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneQuery {
    pub collection: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub bounds: BoundingBox,
    /// Requested output pixel size in meters
    pub scale_m: f64,
    pub bands: Vec<String>,
}

impl SceneQuery {
    /// Exact key for memoization; float fields are compared bit for bit
    pub fn cache_key(&self) -> String {
        let b = self.bounds.to_array().map(f64::to_bits);
        format!(
            "{}|{}|{}|{:x}:{:x}:{:x}:{:x}|{:x}|{}",
            self.collection,
            self.start,
            self.end,
            b[0],
            b[1],
            b[2],
            b[3],
            self.scale_m.to_bits(),
            self.bands.join(",")
        )
    }
}

/// Raw scene returned by a backend, bands keyed by native name
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub collection: String,
    pub acquired: DateTime<Utc>,
    pub grid: GridSpec,
    pub bands: HashMap<String, Raster>,
}

impl Scene {
    pub fn bounds(&self) -> BoundingBox {
        let (x0, y0) = (self.grid.transform.top_left_x, self.grid.transform.top_left_y);
        let x1 = x0 + self.grid.cols as f64 * self.grid.transform.pixel_width;
        let y1 = y0 + self.grid.rows as f64 * self.grid.transform.pixel_height;
        BoundingBox {
            min_lon: x0.min(x1),
            max_lon: x0.max(x1),
            min_lat: y0.min(y1),
            max_lat: y0.max(y1),
        }
    }
}

/// Opaque reference to a raster held by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RasterHandle(pub String);

impl std::fmt::Display for RasterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raster to be stored by the backend for map rendering
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub name: &'a str,
    pub grid: &'a GridSpec,
    pub data: &'a Raster,
    pub style: &'a MapStyle,
}

/// Remote raster processing capability the ET pipeline runs against
pub trait RasterBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Scenes of one collection in the date range intersecting the bounds,
    /// resampled to `query.scale_m`
    fn search(&self, query: &SceneQuery) -> EtResult<Vec<Scene>>;

    /// Elevation (m) on exactly this grid
    fn elevation(&self, grid: &GridSpec) -> EtResult<Raster>;

    fn publish(&self, request: &PublishRequest<'_>) -> EtResult<RasterHandle>;
}

impl<B: RasterBackend + ?Sized> RasterBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn search(&self, query: &SceneQuery) -> EtResult<Vec<Scene>> {
        (**self).search(query)
    }

    fn elevation(&self, grid: &GridSpec) -> EtResult<Raster> {
        (**self).elevation(grid)
    }

    fn publish(&self, request: &PublishRequest<'_>) -> EtResult<RasterHandle> {
        (**self).publish(request)
    }
}

impl<B: RasterBackend + ?Sized> RasterBackend for Arc<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn search(&self, query: &SceneQuery) -> EtResult<Vec<Scene>> {
        (**self).search(query)
    }

    fn elevation(&self, grid: &GridSpec) -> EtResult<Raster> {
        (**self).elevation(grid)
    }

    fn publish(&self, request: &PublishRequest<'_>) -> EtResult<RasterHandle> {
        (**self).publish(request)
    }
}
