use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with how a map is set up. Reported immediately, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported projection: {0}")]
    UnsupportedProjection(String),

    #[error("tile size must be non-zero, got {width}x{height}")]
    InvalidTileSize { width: u32, height: u32 },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Failure of a single tile download.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("could not decode image from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Failure of the on-disk tile cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not encode tile for {path}: {message}")]
    Encode { path: PathBuf, message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewportError {
    #[error("already animating")]
    AlreadyAnimating,
}
