//! Core library for gavc: coordinate parsing, version resolution, the local
//! artifact cache, the retrying transport, and the query/download/delete and
//! upload engines. Used by the CLI binary; embedders use the `Gavc`, `Cache`
//! and `Upload` surfaces.

pub mod cache;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod gavc;
pub mod http_client;
pub mod integrity;
pub mod resolver;
pub mod surface;
pub mod transport;
pub mod upload;
pub mod version;

#[cfg(test)]
mod test_support;

// Re-export main API for CLI
pub use cache::{ArtifactCache, CacheEntry, CacheKey};
pub use config::{string_to_bool, GavcConfig, Param, Params, Surface};
pub use coordinate::{Coordinate, VersionSpec};
pub use error::{ErrorKind, GavcError, Result, OK};
pub use gavc::{GavcEngine, GavcOutcome};
pub use http_client::HttpTransport;
pub use resolver::{resolve, Mode, Resolution, ResolvedVersion};
pub use surface::{Cache, Gavc, Upload};
pub use transport::{RetryPolicy, RetryingTransport, Transport, TransportError};
pub use upload::{UploadEngine, UploadOutcome, UploadSpec};
pub use version::{compare_versions, VersionRange};
