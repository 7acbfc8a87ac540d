//! Farm geometries (lon/lat, WGS84)

use crate::types::{BoundingBox, EtError, EtResult};
use geo::{BoundingRect, Centroid, Intersects, MultiPolygon, Point, Polygon};
use geojson::GeoJson;

/// Spatial region identifying a farm
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Geometry {
    pub fn point(lon: f64, lat: f64) -> Self {
        Geometry::Point(Point::new(lon, lat))
    }

    /// Polygon from an exterior ring of `(lon, lat)` pairs
    pub fn polygon(exterior: Vec<(f64, f64)>) -> EtResult<Self> {
        if exterior.len() < 3 {
            return Err(EtError::InvalidGeometry(format!(
                "polygon needs at least 3 vertices, got {}",
                exterior.len()
            )));
        }
        Ok(Geometry::Polygon(Polygon::new(exterior.into(), vec![])))
    }

    /// Parse a GeoJSON geometry, feature, or the first feature of a collection
    pub fn from_geojson_str(content: &str) -> EtResult<Self> {
        let geojson: GeoJson = content
            .parse()
            .map_err(|e| EtError::InvalidGeometry(format!("Failed to parse GeoJSON: {}", e)))?;

        let geometry = match geojson {
            GeoJson::Geometry(g) => g,
            GeoJson::Feature(f) => f
                .geometry
                .ok_or_else(|| EtError::InvalidGeometry("feature has no geometry".to_string()))?,
            GeoJson::FeatureCollection(fc) => fc
                .features
                .into_iter()
                .find_map(|f| f.geometry)
                .ok_or_else(|| {
                    EtError::InvalidGeometry("feature collection has no geometry".to_string())
                })?,
        };

        let geometry: geo::Geometry<f64> = geometry
            .try_into()
            .map_err(|e: geojson::Error| EtError::InvalidGeometry(e.to_string()))?;

        match geometry {
            geo::Geometry::Point(p) => Ok(Geometry::Point(p)),
            geo::Geometry::Polygon(p) => Ok(Geometry::Polygon(p)),
            geo::Geometry::MultiPolygon(mp) => Ok(Geometry::MultiPolygon(mp)),
            _ => Err(EtError::InvalidGeometry(
                "only Point, Polygon and MultiPolygon farms are supported".to_string(),
            )),
        }
    }

    pub fn from_geojson_file<P: AsRef<std::path::Path>>(path: P) -> EtResult<Self> {
        log::debug!("Reading farm geometry from {}", path.as_ref().display());
        let content = std::fs::read_to_string(path)?;
        Self::from_geojson_str(&content)
    }

    pub fn bounds(&self) -> EtResult<BoundingBox> {
        let rect = match self {
            Geometry::Point(p) => Some(p.bounding_rect()),
            Geometry::Polygon(p) => p.bounding_rect(),
            Geometry::MultiPolygon(mp) => mp.bounding_rect(),
        }
        .ok_or_else(|| EtError::InvalidGeometry("geometry has no extent".to_string()))?;

        Ok(BoundingBox {
            min_lon: rect.min().x,
            max_lon: rect.max().x,
            min_lat: rect.min().y,
            max_lat: rect.max().y,
        })
    }

    /// Centroid, used when no pixel centre falls inside a small polygon
    pub fn representative_point(&self) -> Option<(f64, f64)> {
        let centroid = match self {
            Geometry::Point(p) => Some(*p),
            Geometry::Polygon(p) => p.centroid(),
            Geometry::MultiPolygon(mp) => mp.centroid(),
        }?;
        Some((centroid.x(), centroid.y()))
    }

    /// Boundary-inclusive containment test
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        let point = Point::new(lon, lat);
        match self {
            Geometry::Point(p) => *p == point,
            Geometry::Polygon(p) => p.intersects(&point),
            Geometry::MultiPolygon(mp) => mp.intersects(&point),
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, Geometry::Point(_))
    }
}
