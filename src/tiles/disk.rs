use super::TileKey;
use crate::error::CacheError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tiny_skia::Pixmap;
use tracing::{debug, trace};

/// Flat on-disk tile store: one PNG per key, named by the key digest.
///
/// No index or manifest. Age is judged from the file's mtime when it is
/// looked up, and stale files are deleted on the spot.
#[derive(Debug, Clone)]
pub struct PersistentCache {
    dir: PathBuf,
    max_age: Option<Duration>,
}

impl PersistentCache {
    pub fn new(dir: impl Into<PathBuf>, max_age: Option<Duration>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir, max_age })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &TileKey) -> PathBuf {
        self.dir.join(format!("{}.png", key.digest()))
    }

    /// Raw bytes for `key`, or `None` if absent or expired
    pub fn load(&self, key: &TileKey) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key);
        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };

        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };

        if let Some(max_age) = self.max_age {
            let modified = meta.modified().map_err(io_err)?;
            // A clock behind the file's mtime counts as fresh
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO);
            if age >= max_age {
                debug!(path = %path.display(), age_s = age.as_secs(), "Removing expired tile");
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(io_err(e)),
                }
                return Ok(None);
            }
        }

        match fs::read(&path) {
            Ok(bytes) => {
                trace!(path = %path.display(), bytes = bytes.len(), "Tile read from disk");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }

    /// Encode and write a tile. Readers never see a partial file.
    pub fn store(&self, key: &TileKey, pixmap: &Pixmap) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let png = pixmap.encode_png().map_err(|e| CacheError::Encode {
            path: path.clone(),
            message: e.to_string(),
        })?;

        // Write atomically via temp file
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, png).map_err(|source| CacheError::Io {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, &path).map_err(|source| CacheError::Io { path, source })
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.path_for(key).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Color;

    fn key() -> TileKey {
        TileKey::new("http://tile.example/1/0/0.png", 256, 256)
    }

    fn pixmap() -> Pixmap {
        let mut p = Pixmap::new(256, 256).unwrap();
        p.fill(Color::from_rgba8(1, 2, 3, 255));
        p
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::new(dir.path(), None).unwrap();
        assert!(cache.load(&key()).unwrap().is_none());

        cache.store(&key(), &pixmap()).unwrap();
        assert!(cache.contains(&key()));
        let bytes = cache.load(&key()).unwrap().unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));
    }

    #[test]
    fn test_store_leaves_only_the_final_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::new(dir.path(), None).unwrap();
        cache.store(&key(), &pixmap()).unwrap();
        cache.store(&key(), &pixmap()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(Some(names[0].as_os_str()), cache.path_for(&key()).file_name());
    }

    #[test]
    fn test_file_named_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::new(dir.path(), None).unwrap();
        let name = cache.path_for(&key());
        let file = name.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file.starts_with("256x256_"));
        assert!(file.ends_with(".png"));
    }

    #[test]
    fn test_expired_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::new(dir.path(), Some(Duration::ZERO)).unwrap();
        cache.store(&key(), &pixmap()).unwrap();

        assert!(cache.load(&key()).unwrap().is_none());
        assert!(!cache.contains(&key()));
    }
}
