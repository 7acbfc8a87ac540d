//! Adapters consumed by the dashboard: map styling, stress gauge and
//! irrigation recommendation text.

use crate::core::timeseries::{Trend, TrendSummary};
use crate::types::is_valid;
use serde::{Deserialize, Serialize};

/// Colour ramp for ET map layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapStyle {
    pub min: f64,
    pub max: f64,
    pub palette: Vec<String>,
}

impl Default for MapStyle {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 10.0,
            // dry to wet
            palette: ["#d7191c", "#fdae61", "#ffffbf", "#abd9e9", "#2c7bb6"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl MapStyle {
    /// Palette entry for an ET value, clamped into `[min, max]`
    pub fn color_for(&self, value: f32) -> Option<&str> {
        if !is_valid(value) || self.palette.is_empty() || self.max <= self.min {
            return None;
        }
        let t = ((value as f64 - self.min) / (self.max - self.min)).clamp(0.0, 1.0);
        let idx = ((t * self.palette.len() as f64) as usize).min(self.palette.len() - 1);
        Some(self.palette[idx].as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StressLevel {
    Low,
    Moderate,
    High,
}

/// Share of observed days under water stress
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressGauge {
    pub percent: f64,
    pub level: StressLevel,
}

impl StressGauge {
    pub fn from_counts(stress_days: usize, observed_days: usize) -> Option<Self> {
        if observed_days == 0 {
            return None;
        }
        let percent = stress_days as f64 / observed_days as f64 * 100.0;
        let level = if percent < 20.0 {
            StressLevel::Low
        } else if percent < 50.0 {
            StressLevel::Moderate
        } else {
            StressLevel::High
        };
        Some(Self { percent, level })
    }
}

/// Irrigation advice for a farm.
///
/// `has_imagery` tells apart a range with no usable scenes from one whose
/// scenes were processed but never saw the farm under clear sky.
pub fn recommendation(
    summary: &TrendSummary,
    gauge: Option<&StressGauge>,
    has_imagery: bool,
) -> String {
    let (Some(mean), Some(trend)) = (summary.mean_et, summary.trend) else {
        let text = if has_imagery {
            "No clear-sky observation at the farm in the selected range; widen the date range or switch sensor."
        } else {
            "No cloud-free imagery in the selected range; widen the date range or switch sensor."
        };
        return text.to_string();
    };

    let level = gauge.map(|g| g.level);
    let mut text = match (trend, level) {
        (Trend::Decreasing, Some(StressLevel::High)) => {
            "ET is falling and most days show water stress: schedule irrigation now and inspect the furrows for blockages."
        }
        (_, Some(StressLevel::High)) => {
            "Most observed days show water stress: increase irrigation frequency."
        }
        (Trend::Decreasing, _) => {
            "ET is declining: check soil moisture and plan the next irrigation cycle early."
        }
        (Trend::Increasing, _) => {
            "ET is rising with crop demand: keep irrigation in step with canopy growth."
        }
        (Trend::Stable, Some(StressLevel::Moderate)) => {
            "ET is steady but some days show stress: review irrigation intervals."
        }
        (Trend::Stable, _) => "ET is steady: maintain the current irrigation schedule.",
        (Trend::InsufficientData, _) => {
            "Too few clear-sky observations to judge a trend: re-check after the next overpass."
        }
    }
    .to_string();

    text.push_str(&format!(" Mean ET {:.2} mm/day.", mean));
    text
}
