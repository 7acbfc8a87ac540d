use crate::config::BackendConfig;
use crate::core::presentation::MapStyle;
use crate::io::backend::{PublishRequest, RasterBackend, RasterHandle, Scene, SceneQuery};
use crate::types::{is_valid, EtError, EtResult, GridSpec, Raster, NODATA};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    collection: &'a str,
    start: NaiveDate,
    end: NaiveDate,
    /// [min_lon, min_lat, max_lon, max_lat]
    bbox: [f64; 4],
    scale_m: f64,
    bands: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    scenes: Vec<SceneRecord>,
}

/// Scene on the wire; band values are row-major with `null` for nodata
#[derive(Debug, Deserialize)]
struct SceneRecord {
    id: String,
    collection: String,
    acquired: DateTime<Utc>,
    grid: GridSpec,
    bands: HashMap<String, Vec<Option<f32>>>,
}

#[derive(Debug, Serialize)]
struct ElevationRequest<'a> {
    grid: &'a GridSpec,
}

#[derive(Debug, Deserialize)]
struct RasterRecord {
    rows: usize,
    cols: usize,
    data: Vec<Option<f32>>,
}

#[derive(Debug, Serialize)]
struct PublishBody<'a> {
    name: &'a str,
    grid: &'a GridSpec,
    data: Vec<Option<f32>>,
    style: &'a MapStyle,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    handle: RasterHandle,
}

fn decode_raster(rows: usize, cols: usize, values: Vec<Option<f32>>, what: &str) -> EtResult<Raster> {
    if values.len() != rows * cols {
        return Err(EtError::Backend(format!(
            "{}: expected {}x{} = {} values, got {}",
            what,
            rows,
            cols,
            rows * cols,
            values.len()
        )));
    }
    let data = values
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()).unwrap_or(NODATA))
        .collect();
    Raster::from_shape_vec((rows, cols), data)
        .map_err(|e| EtError::Backend(format!("{}: {}", what, e)))
}

fn encode_raster(raster: &Raster) -> Vec<Option<f32>> {
    raster.iter().map(|v| is_valid(*v).then_some(*v)).collect()
}

impl SceneRecord {
    fn into_scene(self) -> EtResult<Scene> {
        let (rows, cols) = self.grid.shape();
        let mut bands = HashMap::with_capacity(self.bands.len());
        for (name, values) in self.bands {
            let what = format!("scene {} band {}", self.id, name);
            let raster = decode_raster(rows, cols, values, &what)?;
            bands.insert(name, raster);
        }
        Ok(Scene {
            id: self.id,
            collection: self.collection,
            acquired: self.acquired,
            grid: self.grid,
            bands,
        })
    }
}

/// Outcome of one request attempt
enum Attempt<T> {
    Done(T),
    Retry(EtError),
    Fail(EtError),
}

/// JSON-over-HTTP raster service client
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> EtResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("cane-et/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EtError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build the client and confirm the service answers
    pub fn connect(config: BackendConfig) -> EtResult<Self> {
        let backend = Self::new(config)?;
        backend.health()?;
        log::info!("Connected to raster backend at {}", backend.config.url);
        Ok(backend)
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn health(&self) -> EtResult<()> {
        let url = self.endpoint("/v1/health");
        self.with_retry("health", || self.authorized(self.client.get(&url)), |_| Ok(()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        body: &Req,
    ) -> EtResult<Resp> {
        let url = self.endpoint(path);
        self.with_retry(
            operation,
            || self.authorized(self.client.post(&url).json(body)),
            |response| response.json::<Resp>().map_err(EtError::from),
        )
    }

    fn with_retry<T>(
        &self,
        operation: &str,
        build: impl Fn() -> RequestBuilder,
        parse: impl Fn(reqwest::blocking::Response) -> EtResult<T>,
    ) -> EtResult<T> {
        let attempts = self.config.max_retries + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            log::debug!("{} attempt {} of {}", operation, attempt, attempts);

            match Self::attempt_once(build(), &parse) {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fail(e) => return Err(e),
                Attempt::Retry(e) => {
                    if attempt < attempts {
                        let delay = self.backoff(attempt);
                        log::warn!(
                            "{} attempt {} failed ({}), retrying in {} ms",
                            operation,
                            attempt,
                            e,
                            delay.as_millis()
                        );
                        std::thread::sleep(delay);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            EtError::Backend(format!("{} failed after all retries", operation))
        }))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << (attempt - 1).min(16);
        Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(factor))
    }

    fn attempt_once<T>(
        request: RequestBuilder,
        parse: &impl Fn(reqwest::blocking::Response) -> EtResult<T>,
    ) -> Attempt<T> {
        let response = match request.send() {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(EtError::Backend(format!("HTTP request failed: {}", e))),
        };

        let status = response.status();
        if status.is_success() {
            return match parse(response) {
                Ok(value) => Attempt::Done(value),
                Err(e) => Attempt::Fail(e),
            };
        }

        let body = response.text().unwrap_or_default();
        let error = EtError::Backend(format!(
            "HTTP {} {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            body.trim()
        ));
        if is_retryable(status) {
            Attempt::Retry(error)
        } else {
            Attempt::Fail(error)
        }
    }
}

/// Server faults are retried; auth, quota and other client errors are not
fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
}

impl RasterBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn search(&self, query: &SceneQuery) -> EtResult<Vec<Scene>> {
        let body = SearchRequest {
            collection: &query.collection,
            start: query.start,
            end: query.end,
            bbox: query.bounds.to_array(),
            scale_m: query.scale_m,
            bands: &query.bands,
        };
        let response: SearchResponse = self.post_json("search", "/v1/scenes/search", &body)?;
        log::debug!("{} returned {} scenes", query.collection, response.scenes.len());

        response.scenes.into_iter().map(SceneRecord::into_scene).collect()
    }

    fn elevation(&self, grid: &GridSpec) -> EtResult<Raster> {
        let record: RasterRecord = self.post_json("elevation", "/v1/elevation", &ElevationRequest { grid })?;
        if (record.rows, record.cols) != grid.shape() {
            return Err(EtError::ShapeMismatch {
                expected: grid.shape(),
                found: (record.rows, record.cols),
            });
        }
        decode_raster(record.rows, record.cols, record.data, "elevation")
    }

    fn publish(&self, request: &PublishRequest<'_>) -> EtResult<RasterHandle> {
        let body = PublishBody {
            name: request.name,
            grid: request.grid,
            data: encode_raster(request.data),
            style: request.style,
        };
        let response: PublishResponse = self.post_json("publish", "/v1/rasters", &body)?;
        Ok(response.handle)
    }
}
