use crate::geometry::Geometry;
use crate::types::{is_valid, GridSpec, Raster};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One ET observation for a farm; `et` is `None` when the day had no
/// clear-sky value at the farm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EtSample {
    pub date: NaiveDate,
    pub et: Option<f64>,
}

/// ET samples ordered by date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EtTimeSeries {
    pub samples: Vec<EtSample>,
}

impl EtTimeSeries {
    /// Build from unordered samples; ties keep their input order
    pub fn from_samples(mut samples: Vec<EtSample>) -> Self {
        samples.sort_by_key(|s| s.date);
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Non-null values in date order
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().filter_map(|s| s.et).collect()
    }

    pub fn null_count(&self) -> usize {
        self.samples.iter().filter(|s| s.et.is_none()).count()
    }
}

/// First-value reduction of `raster` over `geometry`.
///
/// A point reads the pixel that contains it. A polygon reads the first valid
/// pixel (row-major) whose centre it covers; polygons smaller than one pixel
/// fall back to the pixel under their centroid.
pub fn sample_first_valid(raster: &Raster, grid: &GridSpec, geometry: &Geometry) -> Option<f64> {
    let read = |row: usize, col: usize| {
        let v = raster[[row, col]];
        is_valid(v).then_some(v as f64)
    };

    if !geometry.is_point() {
        for ((row, col), value) in raster.indexed_iter() {
            if !is_valid(*value) {
                continue;
            }
            let (lon, lat) = grid.transform.pixel_center(row, col);
            if geometry.covers(lon, lat) {
                return Some(*value as f64);
            }
        }
        let any_centre_inside = (0..grid.rows).any(|row| {
            (0..grid.cols).any(|col| {
                let (lon, lat) = grid.transform.pixel_center(row, col);
                geometry.covers(lon, lat)
            })
        });
        if any_centre_inside {
            return None;
        }
    }

    let (lon, lat) = geometry.representative_point()?;
    let (row, col) = grid.index_of(lon, lat)?;
    read(row, col)
}

/// Trend of ET over the period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    #[serde(rename = "increasing")]
    Increasing,
    #[serde(rename = "decreasing")]
    Decreasing,
    #[serde(rename = "stable")]
    Stable,
    #[serde(rename = "insufficient data")]
    InsufficientData,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::Stable => "stable",
            Trend::InsufficientData => "insufficient data",
        };
        f.write_str(label)
    }
}

/// Thresholds of the trend analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendParams {
    /// |slope| (mm/day per sample) above which the series trends
    pub slope_threshold: f64,
    /// Values below `stress_fraction * max` count as water-stress days
    pub stress_fraction: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            slope_threshold: 0.05,
            stress_fraction: 0.5,
        }
    }
}

/// Aggregate statistics of one ET series. All fields are `None` together when
/// the series holds no values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub mean_et: Option<f64>,
    pub max_et: Option<f64>,
    pub min_et: Option<f64>,
    pub trend: Option<Trend>,
    pub water_stress_days: Option<usize>,
}

impl TrendSummary {
    pub fn is_empty(&self) -> bool {
        self.mean_et.is_none()
    }
}

/// Ordinary least-squares slope of `values` against their index
pub fn ols_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = values.iter().sum::<f64>() / n as f64;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    Some(sxy / sxx)
}

/// Computes trend summaries from ET series
#[derive(Debug, Clone, Default)]
pub struct TrendAnalyzer {
    params: TrendParams,
}

impl TrendAnalyzer {
    pub fn new(params: TrendParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TrendParams {
        &self.params
    }

    /// Threshold comparison is strict on both sides
    pub fn classify_slope(&self, slope: f64) -> Trend {
        if slope > self.params.slope_threshold {
            Trend::Increasing
        } else if slope < -self.params.slope_threshold {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }

    pub fn trend(&self, values: &[f64]) -> Trend {
        match ols_slope(values) {
            Some(slope) => self.classify_slope(slope),
            None => Trend::InsufficientData,
        }
    }

    /// Count of values below `stress_fraction` of the period maximum
    pub fn water_stress_days(&self, values: &[f64]) -> Option<usize> {
        let max = values.iter().copied().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |m| m.max(v)))
        })?;
        let threshold = max * self.params.stress_fraction;
        Some(values.iter().filter(|v| **v < threshold).count())
    }

    pub fn summarize(&self, series: &EtTimeSeries) -> TrendSummary {
        let values = series.values();
        if values.is_empty() {
            return TrendSummary::default();
        }

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let trend = self.trend(&values);

        log::debug!(
            "ET summary over {} values ({} null): mean {:.3}, trend {}",
            values.len(),
            series.null_count(),
            mean,
            trend
        );

        TrendSummary {
            mean_et: Some(mean),
            max_et: Some(max),
            min_et: Some(min),
            trend: Some(trend),
            water_stress_days: self.water_stress_days(&values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, NODATA};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 3, d).unwrap()
    }

    fn series(values: &[Option<f64>]) -> EtTimeSeries {
        EtTimeSeries::from_samples(
            values
                .iter()
                .enumerate()
                .map(|(i, et)| EtSample { date: day(i as u32 + 1), et: *et })
                .collect(),
        )
    }

    #[test]
    fn test_slope_threshold_is_exclusive() {
        let analyzer = TrendAnalyzer::default();
        assert_eq!(analyzer.classify_slope(0.05), Trend::Stable);
        assert_eq!(analyzer.classify_slope(0.0501), Trend::Increasing);
        assert_eq!(analyzer.classify_slope(-0.05), Trend::Stable);
        assert_eq!(analyzer.classify_slope(-0.0501), Trend::Decreasing);
    }

    #[test]
    fn test_ols_slope() {
        assert_abs_diff_eq!(ols_slope(&[1.0, 3.0, 5.0, 7.0]).unwrap(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ols_slope(&[4.0, 4.0, 4.0]).unwrap(), 0.0, epsilon = 1e-12);
        assert_eq!(ols_slope(&[1.0]), None);
    }

    #[test]
    fn test_increasing_and_flat_series() {
        let analyzer = TrendAnalyzer::default();
        let rising: Vec<f64> = (0..12).map(|i| 1.0 + 0.3 * i as f64).collect();
        assert_eq!(analyzer.trend(&rising), Trend::Increasing);

        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        assert_eq!(analyzer.trend(&falling), Trend::Decreasing);

        assert_eq!(analyzer.trend(&[3.2; 10]), Trend::Stable);
        assert_eq!(analyzer.trend(&[3.2]), Trend::InsufficientData);
    }

    #[test]
    fn test_all_equal_series_has_no_stress() {
        let summary = TrendAnalyzer::default().summarize(&series(&[Some(5.0); 5]));
        assert_eq!(summary.water_stress_days, Some(0));
        assert_eq!(summary.max_et, Some(5.0));
        assert_eq!(summary.mean_et, Some(5.0));
        assert_eq!(summary.min_et, Some(5.0));
        assert_eq!(summary.trend, Some(Trend::Stable));
    }

    #[test]
    fn test_stress_days_and_nulls() {
        let s = series(&[Some(4.0), None, Some(1.5), Some(2.0), None, Some(3.0)]);
        assert_eq!(s.len(), 6);
        assert_eq!(s.null_count(), 2);

        let summary = TrendAnalyzer::default().summarize(&s);
        // below 2.0: only 1.5
        assert_eq!(summary.water_stress_days, Some(1));
        assert_eq!(summary.min_et, Some(1.5));
        assert_abs_diff_eq!(summary.mean_et.unwrap(), 2.625, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_or_all_null_summary() {
        let analyzer = TrendAnalyzer::default();
        assert_eq!(analyzer.summarize(&EtTimeSeries::default()), TrendSummary::default());
        assert!(analyzer.summarize(&series(&[None, None])).is_empty());
        assert_eq!(analyzer.water_stress_days(&[]), None);
    }

    #[test]
    fn test_single_value_is_insufficient() {
        let summary = TrendAnalyzer::default().summarize(&series(&[Some(2.0)]));
        assert_eq!(summary.trend, Some(Trend::InsufficientData));
        assert_eq!(summary.water_stress_days, Some(0));
    }

    #[test]
    fn test_series_sorted_by_date() {
        let s = EtTimeSeries::from_samples(vec![
            EtSample { date: day(9), et: Some(1.0) },
            EtSample { date: day(2), et: None },
            EtSample { date: day(5), et: Some(2.0) },
        ]);
        let dates: Vec<_> = s.samples.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![day(2), day(5), day(9)]);
        assert_eq!(s.values(), vec![2.0, 1.0]);
    }

    #[test]
    fn test_sample_first_valid() {
        // 3x3 grid of 0.01° pixels starting at (10.0, 5.0)
        let grid = GridSpec {
            transform: GeoTransform::north_up(10.0, 5.0, 0.01),
            rows: 3,
            cols: 3,
        };
        let raster = array![
            [NODATA, 2.0f32, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 9.0]
        ];

        let point = Geometry::point(10.015, 4.985);
        assert_eq!(sample_first_valid(&raster, &grid, &point), Some(5.0));

        let outside = Geometry::point(11.0, 4.985);
        assert_eq!(sample_first_valid(&raster, &grid, &outside), None);

        // covers the centres of (0,0), (0,1), (1,0), (1,1); (0,0) is nodata
        let polygon = Geometry::polygon(vec![
            (10.0, 5.0),
            (10.02, 5.0),
            (10.02, 4.98),
            (10.0, 4.98),
        ])
        .unwrap();
        assert_eq!(sample_first_valid(&raster, &grid, &polygon), Some(2.0));

        // smaller than one pixel, centroid in (2,2)
        let tiny = Geometry::polygon(vec![
            (10.021, 4.979),
            (10.023, 4.979),
            (10.023, 4.977),
            (10.021, 4.977),
        ])
        .unwrap();
        assert_eq!(sample_first_valid(&raster, &grid, &tiny), Some(9.0));
    }
}
