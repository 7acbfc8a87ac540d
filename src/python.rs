//! Python bindings for the farm dashboard

use crate::config::EtConfig;
use crate::core::pipeline::{EtPipeline, EtReport};
use crate::geometry::Geometry;
use crate::io::{CachedBackend, HttpBackend};
use crate::types::EtError;
use numpy::ToPyArray;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

fn to_py_err(error: EtError) -> PyErr {
    match error {
        EtError::UnsupportedSensor(_)
        | EtError::InvalidDate(_)
        | EtError::InvalidGeometry(_)
        | EtError::Config(_) => PyValueError::new_err(error.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

/// Python wrapper for EtReport
#[pyclass(name = "EtReport")]
struct PyEtReport {
    inner: EtReport,
}

#[pymethods]
impl PyEtReport {
    #[getter]
    fn status(&self) -> String {
        format!("{:?}", self.inner.status)
    }

    #[getter]
    fn sensor(&self) -> String {
        self.inner.sensor.to_string()
    }

    #[getter]
    fn image_count(&self) -> usize {
        self.inner.image_count
    }

    #[getter]
    fn raster_handle(&self) -> Option<String> {
        self.inner.raster.as_ref().map(|r| r.handle.to_string())
    }

    /// (date, et) rows, et is None for days without a clear-sky value
    #[getter]
    fn series(&self) -> Vec<(String, Option<f64>)> {
        self.inner
            .series
            .samples
            .iter()
            .map(|s| (s.date.format("%Y-%m-%d").to_string(), s.et))
            .collect()
    }

    #[getter]
    fn summary(&self, py: Python) -> PyResult<PyObject> {
        let summary = &self.inner.summary;
        let dict = PyDict::new(py);
        dict.set_item("mean_et", summary.mean_et)?;
        dict.set_item("max_et", summary.max_et)?;
        dict.set_item("min_et", summary.min_et)?;
        dict.set_item("trend", summary.trend.map(|t| t.to_string()))?;
        dict.set_item("water_stress_days", summary.water_stress_days)?;
        Ok(dict.into())
    }

    #[getter]
    fn stress_percent(&self) -> Option<f64> {
        self.inner.stress.map(|g| g.percent)
    }

    #[getter]
    fn recommendation(&self) -> String {
        self.inner.recommendation.clone()
    }

    /// Median ET raster (mm/day, nodata = -9999) or None
    fn et_raster(&self, py: Python) -> Option<PyObject> {
        self.inner
            .computation
            .et_raster
            .as_ref()
            .map(|r| r.data.to_pyarray(py).into())
    }

    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner).map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    fn __repr__(&self) -> String {
        format!(
            "EtReport(sensor={}, status={:?}, images={})",
            self.inner.sensor, self.inner.status, self.inner.image_count
        )
    }
}

/// Backend connection and pipeline held for the life of the dashboard
#[pyclass(name = "EtSession")]
struct PyEtSession {
    pipeline: EtPipeline<CachedBackend<HttpBackend>>,
}

#[pymethods]
impl PyEtSession {
    #[new]
    #[pyo3(signature = (config_path = None))]
    fn new(config_path: Option<&str>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => {
                let mut config = EtConfig::from_file(path).map_err(to_py_err)?;
                config.apply_env();
                config
            }
            None => EtConfig::load_default().map_err(to_py_err)?,
        };
        let backend = HttpBackend::connect(config.backend.clone()).map_err(to_py_err)?;
        Ok(Self {
            pipeline: EtPipeline::new(CachedBackend::new(backend), &config),
        })
    }

    /// Run the full ET analysis for one farm
    #[pyo3(signature = (start, end, sensor = "MODIS", geojson = None, point = None))]
    fn analyze_farm(
        &self,
        py: Python,
        start: &str,
        end: &str,
        sensor: &str,
        geojson: Option<&str>,
        point: Option<(f64, f64)>,
    ) -> PyResult<PyEtReport> {
        let geometry = match (geojson, point) {
            (Some(content), _) => Geometry::from_geojson_str(content).map_err(to_py_err)?,
            (None, Some((lon, lat))) => Geometry::point(lon, lat),
            (None, None) => {
                return Err(PyValueError::new_err("either geojson or point is required"))
            }
        };

        let report = py.allow_threads(|| self.pipeline.analyze_str(&geometry, start, end, sensor));
        Ok(PyEtReport { inner: report.map_err(to_py_err)? })
    }

    /// Drop memoized scene searches and elevation grids
    fn clear_cache(&self) {
        self.pipeline.backend().clear();
    }
}

#[pymodule]
fn cane_et(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyEtSession>()?;
    m.add_class::<PyEtReport>()?;
    Ok(())
}
