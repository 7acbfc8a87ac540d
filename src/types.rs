use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Sentinel stored in every band for masked or undefined pixels
pub const NODATA: f32 = -9999.0;

/// 2D single-band raster (rows x cols)
pub type Raster = Array2<f32>;

/// Returns true when a pixel value carries data
#[inline]
pub fn is_valid(value: f32) -> bool {
    value != NODATA && value.is_finite()
}

/// Supported satellite sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    #[serde(rename = "MODIS")]
    Modis,
    #[serde(rename = "Landsat")]
    Landsat,
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sensor::Modis => write!(f, "MODIS"),
            Sensor::Landsat => write!(f, "Landsat"),
        }
    }
}

impl FromStr for Sensor {
    type Err = EtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MODIS" => Ok(Sensor::Modis),
            "LANDSAT" => Ok(Sensor::Landsat),
            _ => Err(EtError::UnsupportedSensor(s.to_string())),
        }
    }
}

/// Logical bands carried by an [`Image`] as it moves through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Band {
    // Surface reflectance
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
    Swir2,
    /// MODIS band 5 (1230-1250 nm), only used for albedo
    Swir5,
    /// Raw thermal DN
    Thermal,
    /// Bit-packed quality flags
    Quality,
    // Derived
    Albedo,
    Ndvi,
    Lst,
    Elevation,
    NetRadiation,
    SoilHeatFlux,
    SensibleHeatFlux,
    LatentHeatFlux,
    Et,
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Band::Blue => "blue",
            Band::Green => "green",
            Band::Red => "red",
            Band::Nir => "nir",
            Band::Swir1 => "swir1",
            Band::Swir2 => "swir2",
            Band::Swir5 => "swir5",
            Band::Thermal => "thermal",
            Band::Quality => "quality",
            Band::Albedo => "albedo",
            Band::Ndvi => "NDVI",
            Band::Lst => "LST",
            Band::Elevation => "elevation",
            Band::NetRadiation => "Rn",
            Band::SoilHeatFlux => "G",
            Band::SensibleHeatFlux => "H",
            Band::LatentHeatFlux => "LE",
            Band::Et => "ET",
        };
        f.write_str(name)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    /// `[min_lon, min_lat, max_lon, max_lat]`, the order used on the wire
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels of `pixel_size` degrees
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// Lon/lat of the centre of pixel `(row, col)`
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let x = col as f64 + 0.5;
        let y = row as f64 + 0.5;
        (
            self.top_left_x + x * self.pixel_width + y * self.rotation_x,
            self.top_left_y + x * self.rotation_y + y * self.pixel_height,
        )
    }

    /// Pixel containing `(lon, lat)`, ignoring rotation terms
    pub fn pixel_of(&self, lon: f64, lat: f64) -> Option<(isize, isize)> {
        if self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return None;
        }
        let col = ((lon - self.top_left_x) / self.pixel_width).floor();
        let row = ((lat - self.top_left_y) / self.pixel_height).floor();
        if col.is_finite() && row.is_finite() {
            Some((row as isize, col as isize))
        } else {
            None
        }
    }
}

/// Georeferenced pixel grid shared by all bands of an image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
}

impl GridSpec {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Index of the pixel containing `(lon, lat)` if it falls on the grid
    pub fn index_of(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        let (row, col) = self.transform.pixel_of(lon, lat)?;
        if row < 0 || col < 0 || row as usize >= self.rows || col as usize >= self.cols {
            return None;
        }
        Some((row as usize, col as usize))
    }
}

/// Multi-band raster snapshot at one acquisition time
#[derive(Debug, Clone)]
pub struct Image {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub grid: GridSpec,
    bands: BTreeMap<Band, Raster>,
}

impl Image {
    pub fn new(id: impl Into<String>, acquired: DateTime<Utc>, grid: GridSpec) -> Self {
        Self {
            id: id.into(),
            acquired,
            grid,
            bands: BTreeMap::new(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.acquired.date_naive()
    }

    pub fn has_band(&self, band: Band) -> bool {
        self.bands.contains_key(&band)
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Borrow a band, failing with `MissingBand` attributed to `stage`
    pub fn band(&self, band: Band, stage: &'static str) -> EtResult<&Raster> {
        self.bands
            .get(&band)
            .ok_or(EtError::MissingBand { band, stage })
    }

    /// Attach a band; its shape must match the image grid
    pub fn insert_band(&mut self, band: Band, data: Raster) -> EtResult<()> {
        if data.dim() != self.grid.shape() {
            return Err(EtError::ShapeMismatch {
                expected: self.grid.shape(),
                found: data.dim(),
            });
        }
        self.bands.insert(band, data);
        Ok(())
    }

    pub fn with_band(mut self, band: Band, data: Raster) -> EtResult<Self> {
        self.insert_band(band, data)?;
        Ok(self)
    }

    pub(crate) fn bands_mut(&mut self) -> impl Iterator<Item = (&Band, &mut Raster)> {
        self.bands.iter_mut()
    }
}

/// Error types for ET processing
#[derive(Debug, thiserror::Error)]
pub enum EtError {
    #[error("Missing band '{band}' required by stage '{stage}'")]
    MissingBand { band: Band, stage: &'static str },

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Raster backend error: {0}")]
    Backend(String),

    #[error("Unsupported sensor: '{0}' (expected MODIS or Landsat)")]
    UnsupportedSensor(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtError {
    /// Errors that only invalidate the image being processed
    pub fn is_per_image(&self) -> bool {
        matches!(
            self,
            EtError::MissingBand { .. } | EtError::ShapeMismatch { .. } | EtError::Processing(_)
        )
    }
}

impl From<reqwest::Error> for EtError {
    fn from(err: reqwest::Error) -> Self {
        EtError::Backend(err.to_string())
    }
}

/// Result type for ET operations
pub type EtResult<T> = Result<T, EtError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn grid(rows: usize, cols: usize) -> GridSpec {
        GridSpec {
            transform: GeoTransform::north_up(30.0, -20.0, 0.01),
            rows,
            cols,
        }
    }

    #[test]
    fn test_sensor_parsing() {
        assert_eq!("MODIS".parse::<Sensor>().unwrap(), Sensor::Modis);
        assert_eq!("Landsat".parse::<Sensor>().unwrap(), Sensor::Landsat);
        assert_eq!("landsat".parse::<Sensor>().unwrap(), Sensor::Landsat);

        let err = "Sentinel-2".parse::<Sensor>().unwrap_err();
        assert!(matches!(err, EtError::UnsupportedSensor(ref s) if s == "Sentinel-2"));
    }

    #[test]
    fn test_grid_index_of() {
        let g = grid(10, 10);
        assert_eq!(g.index_of(30.005, -20.005), Some((0, 0)));
        assert_eq!(g.index_of(30.095, -20.095), Some((9, 9)));
        assert_eq!(g.index_of(29.99, -20.005), None);
        assert_eq!(g.index_of(30.005, -20.2), None);

        let (lon, lat) = g.transform.pixel_center(2, 3);
        assert_eq!(g.index_of(lon, lat), Some((2, 3)));
    }

    #[test]
    fn test_image_band_contract() {
        let acquired = Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap();
        let mut image = Image::new("scene", acquired, grid(2, 3));

        let err = image.band(Band::NetRadiation, "soil_heat_flux").unwrap_err();
        assert!(matches!(err, EtError::MissingBand { band: Band::NetRadiation, .. }));

        let err = image.insert_band(Band::Red, Raster::zeros((3, 2))).unwrap_err();
        assert!(matches!(err, EtError::ShapeMismatch { .. }));

        image.insert_band(Band::Red, Raster::zeros((2, 3))).unwrap();
        assert!(image.has_band(Band::Red));
        assert_eq!(image.date(), NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
    }

    #[test]
    fn test_per_image_classification() {
        assert!(EtError::Processing("x".into()).is_per_image());
        assert!(!EtError::Backend("down".into()).is_per_image());
        assert!(!EtError::UnsupportedSensor("x".into()).is_per_image());
    }
}
