pub mod backend;
pub mod cache;
pub mod http;
pub mod memory;

pub use backend::{PublishRequest, RasterBackend, RasterHandle, Scene, SceneQuery};
pub use cache::CachedBackend;
pub use http::HttpBackend;
pub use memory::{ElevationSource, MemoryBackend, PublishedRaster};
