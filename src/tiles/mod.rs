//! Tiled raster imagery: URL scheme, download, memory and disk caching,
//! and the drawable that paints tiles into a frame.

mod cache;
mod decode;
mod disk;
mod fetch;
mod map;
mod placeholder;
mod source;

pub use cache::{CacheStats, TileCache};
pub use decode::decode_tile;
pub use disk::PersistentCache;
pub use fetch::{FetchFuture, HttpFetcher, TileFetcher};
pub use map::{tiles_covering, TileMap, TileRange};
pub use placeholder::Placeholders;
pub use source::{GoogleLayer, TileSource, DEFAULT_INVERSION_BASE};

use std::sync::Arc;
use tiny_skia::Pixmap;

/// Cache identity of a tile: resolved URL plus requested pixel size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl TileKey {
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
        }
    }

    /// Stable file-safe name: size prefix and blake3 hash of the URL
    pub fn digest(&self) -> String {
        format!(
            "{}x{}_{}",
            self.width,
            self.height,
            blake3::hash(self.url.as_bytes()).to_hex()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    Cached,
    Loading,
    Failed,
}

/// What `get_image` hands back: the real tile or a placeholder.
///
/// `pixmap` is always set for a cached tile. It is `None` only for a
/// placeholder whose size cannot be allocated.
#[derive(Clone)]
pub struct TileImage {
    pub pixmap: Option<Arc<Pixmap>>,
    pub status: TileStatus,
}

impl TileImage {
    pub fn is_cached(&self) -> bool {
        self.status == TileStatus::Cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_depends_on_url_and_size() {
        let a = TileKey::new("http://t/1/0/0.png", 256, 256);
        let b = TileKey::new("http://t/1/0/1.png", 256, 256);
        let c = TileKey::new("http://t/1/0/0.png", 512, 512);
        assert_ne!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest(), a.clone().digest());
        assert_eq!(a.digest().len(), "256x256_".len() + 64);
    }
}
