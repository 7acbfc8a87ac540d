use crate::core::energy_balance::EnergyBalanceParams;
use crate::core::timeseries::TrendParams;
use crate::types::{EtError, EtResult};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Environment variable that overrides the backend token
pub const TOKEN_ENV_VAR: &str = "CANE_ET_BACKEND_TOKEN";

/// Connection settings for the remote raster service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
    /// Extra attempts after the first failure
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further retry
    pub retry_backoff_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            token: None,
            timeout_secs: 120,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Top-level settings; every field falls back to its default when absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtConfig {
    pub energy_balance: EnergyBalanceParams,
    pub trend: TrendParams,
    pub backend: BackendConfig,
    /// Process images on the rayon pool (needs the `parallel` feature)
    pub parallel: bool,
}

impl Default for EtConfig {
    fn default() -> Self {
        Self {
            energy_balance: EnergyBalanceParams::default(),
            trend: TrendParams::default(),
            backend: BackendConfig::default(),
            parallel: true,
        }
    }
}

impl EtConfig {
    pub fn from_json_str(content: &str) -> EtResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> EtResult<Self> {
        let path = path.as_ref();
        log::debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// `<config_dir>/cane-et/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cane-et").join("config.json"))
    }

    /// Read the default config file if it exists, then apply the environment
    pub fn load_default() -> EtResult<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => {
                log::debug!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                log::debug!("Backend token taken from {}", TOKEN_ENV_VAR);
                self.backend.token = Some(token);
            }
        }
    }

    pub fn validate(&self) -> EtResult<()> {
        let eb = &self.energy_balance;
        if eb.aerodynamic_resistance <= 0.0 {
            return Err(EtError::Config(format!(
                "aerodynamic_resistance must be positive, got {}",
                eb.aerodynamic_resistance
            )));
        }
        if eb.latent_heat_vaporization <= 0.0 {
            return Err(EtError::Config(format!(
                "latent_heat_vaporization must be positive, got {}",
                eb.latent_heat_vaporization
            )));
        }
        if self.trend.slope_threshold < 0.0 {
            return Err(EtError::Config(format!(
                "slope_threshold must not be negative, got {}",
                self.trend.slope_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.trend.stress_fraction) {
            return Err(EtError::Config(format!(
                "stress_fraction must lie in [0, 1], got {}",
                self.trend.stress_fraction
            )));
        }
        if self.backend.url.trim().is_empty() {
            return Err(EtError::Config("backend url is empty".to_string()));
        }
        Ok(())
    }
}

fn iso_date_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").ok())
        .as_ref()
}

/// Parse a strict `YYYY-MM-DD` date
pub fn parse_iso_date(input: &str) -> EtResult<NaiveDate> {
    let pattern = iso_date_pattern()
        .ok_or_else(|| EtError::Config("date pattern failed to compile".to_string()))?;
    if !pattern.is_match(input) {
        return Err(EtError::InvalidDate(format!(
            "'{}' is not in YYYY-MM-DD form",
            input
        )));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| EtError::InvalidDate(format!("'{}': {}", input, e)))
}
