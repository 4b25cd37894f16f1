use super::decode::decode_tile;
use super::disk::PersistentCache;
use super::fetch::TileFetcher;
use super::placeholder::Placeholders;
use super::{TileImage, TileKey, TileStatus};
use crate::config::TileCacheConfig;
use crate::error::{CacheError, FetchError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiny_skia::Pixmap;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

type UpdateListener = Box<dyn Fn(&TileKey) + Send + Sync>;

/// A download in progress for one key
struct InFlight {
    id: u64,
    /// Report arrival to listeners. False for prefetch-only requests.
    notify: bool,
    task: Option<AbortHandle>,
}

#[derive(Default)]
struct CacheState {
    images: HashMap<TileKey, Arc<Pixmap>>,
    in_flight: HashMap<TileKey, InFlight>,
    failed: HashMap<TileKey, Instant>,
}

struct Inner {
    runtime: Handle,
    fetcher: Arc<dyn TileFetcher>,
    disk: Option<PersistentCache>,
    failed_expiry: Duration,
    placeholders: Placeholders,
    state: Mutex<CacheState>,
    listeners: RwLock<Vec<UpdateListener>>,
    next_id: AtomicU64,
    fetches: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cached: usize,
    pub in_flight: usize,
    pub failed: usize,
    pub fetches_started: u64,
}

/// Memory and disk tile cache with de-duplicated asynchronous fetching.
///
/// Per key: unknown, then fetching, then cached or failed. A failed key
/// serves the failed placeholder until the back-off window lapses and is
/// then fetched again. Cached images stay until [`clear`](Self::clear).
///
/// `get_image` never waits on the network. Arrivals are announced to
/// [`on_update`](Self::on_update) listeners unless only prefetched;
/// failures always are.
/// Cloning yields another handle to the same cache.
#[derive(Clone)]
pub struct TileCache {
    inner: Arc<Inner>,
}

impl TileCache {
    pub fn new(
        fetcher: Arc<dyn TileFetcher>,
        config: &TileCacheConfig,
        runtime: Handle,
    ) -> Result<Self, CacheError> {
        let disk = config
            .cache_dir
            .as_ref()
            .map(|dir| PersistentCache::new(dir, config.max_age()))
            .transpose()?;
        Ok(Self::with_parts(fetcher, disk, config.failed_expiry(), runtime))
    }

    pub fn with_parts(
        fetcher: Arc<dyn TileFetcher>,
        disk: Option<PersistentCache>,
        failed_expiry: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runtime,
                fetcher,
                disk,
                failed_expiry,
                placeholders: Placeholders::default(),
                state: Mutex::new(CacheState::default()),
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                fetches: AtomicU64::new(0),
            }),
        }
    }

    /// Register a callback for tile arrivals and failures.
    ///
    /// Callbacks run on runtime threads and must not register listeners.
    pub fn on_update<F>(&self, listener: F)
    where
        F: Fn(&TileKey) + Send + Sync + 'static,
    {
        self.inner.listeners.write().push(Box::new(listener));
    }

    /// The tile if known, otherwise a placeholder and a background fetch
    pub fn get_image(&self, key: &TileKey) -> TileImage {
        self.lookup(key, true)
    }

    /// Like `get_image` but arrival is not announced
    pub fn prefetch(&self, key: &TileKey) -> TileImage {
        self.lookup(key, false)
    }

    fn lookup(&self, key: &TileKey, notify: bool) -> TileImage {
        {
            let mut state = self.inner.state.lock();

            if let Some(pending) = state.in_flight.get_mut(key) {
                if notify && !pending.notify {
                    trace!(url = %key.url, "Prefetch promoted to visible request");
                    pending.notify = true;
                }
                return self.placeholder(key, TileStatus::Loading);
            }

            if let Some(pixmap) = state.images.get(key) {
                return TileImage {
                    pixmap: Some(pixmap.clone()),
                    status: TileStatus::Cached,
                };
            }

            if let Some(failed_at) = state.failed.get(key).copied() {
                if failed_at.elapsed() < self.inner.failed_expiry {
                    return self.placeholder(key, TileStatus::Failed);
                }
                debug!(url = %key.url, "Failure back-off elapsed, retrying");
                state.failed.remove(key);
            }
        }

        if let Some(pixmap) = self.load_from_disk(key) {
            let pixmap = self
                .inner
                .state
                .lock()
                .images
                .entry(key.clone())
                .or_insert_with(|| Arc::new(pixmap))
                .clone();
            return TileImage {
                pixmap: Some(pixmap),
                status: TileStatus::Cached,
            };
        }

        self.start_fetch(key, notify);
        self.placeholder(key, TileStatus::Loading)
    }

    fn placeholder(&self, key: &TileKey, status: TileStatus) -> TileImage {
        let pixmap = match status {
            TileStatus::Failed => self.inner.placeholders.failed(key.width, key.height),
            _ => self.inner.placeholders.loading(key.width, key.height),
        };
        TileImage { pixmap, status }
    }

    fn load_from_disk(&self, key: &TileKey) -> Option<Pixmap> {
        let disk = self.inner.disk.as_ref()?;
        let bytes = match disk.load(key) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(url = %key.url, error = %e, "Persistent cache read failed");
                return None;
            }
        };
        match decode_tile(&bytes, key.width, key.height, &key.url) {
            Ok(pixmap) => {
                trace!(url = %key.url, "Tile served from persistent cache");
                Some(pixmap)
            }
            Err(e) => {
                warn!(url = %key.url, error = %e, "Discarding unreadable cached tile");
                None
            }
        }
    }

    fn start_fetch(&self, key: &TileKey, notify: bool) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.inner.state.lock();
            // Another caller may have started or finished this key since the first check
            if state.images.contains_key(key) {
                return;
            }
            if let Some(pending) = state.in_flight.get_mut(key) {
                pending.notify |= notify;
                return;
            }
            state.in_flight.insert(
                key.clone(),
                InFlight {
                    id,
                    notify,
                    task: None,
                },
            );
        }

        self.inner.fetches.fetch_add(1, Ordering::Relaxed);
        trace!(url = %key.url, id, notify, "Tile fetch scheduled");

        let cache = self.clone();
        let task_key = key.clone();
        let handle = self
            .inner
            .runtime
            .spawn(async move { cache.run_fetch(task_key, id).await });

        let mut state = self.inner.state.lock();
        match state.in_flight.get_mut(key) {
            Some(pending) if pending.id == id => pending.task = Some(handle.abort_handle()),
            // Aborted or already completed in the meantime
            _ => handle.abort(),
        }
    }

    async fn run_fetch(self, key: TileKey, id: u64) {
        let result = match self.inner.fetcher.fetch(&key.url).await {
            Ok(bytes) => {
                let disk = self.inner.disk.clone();
                let blocking_key = key.clone();
                tokio::task::spawn_blocking(move || {
                    decode_and_persist(&blocking_key, &bytes, disk.as_ref())
                })
                .await
                .unwrap_or_else(|e| {
                    Err(FetchError::Decode {
                        url: key.url.clone(),
                        message: e.to_string(),
                    })
                })
            }
            Err(e) => Err(e),
        };
        self.complete(&key, id, result);
    }

    fn complete(&self, key: &TileKey, id: u64, result: Result<Pixmap, FetchError>) {
        let notify = {
            let mut state = self.inner.state.lock();
            let current = state.in_flight.get(key).map(|p| p.id);
            if current != Some(id) {
                trace!(url = %key.url, id, "Dropping result of aborted request");
                return;
            }
            // Failures are announced even for prefetches
            let notify = state.in_flight.remove(key).is_some_and(|p| p.notify) || result.is_err();

            match result {
                Ok(pixmap) => {
                    state.images.insert(key.clone(), Arc::new(pixmap));
                    debug!(url = %key.url, cached = state.images.len(), "Tile cached");
                }
                Err(e) => {
                    warn!(url = %key.url, error = %e, "Tile fetch failed");
                    state.failed.insert(key.clone(), Instant::now());
                }
            }
            notify
        };

        if notify {
            for listener in self.inner.listeners.read().iter() {
                listener(key);
            }
        }
    }

    /// Cancel every in-flight request and forget recorded failures.
    /// Completions racing this call are discarded.
    pub fn abort_all(&self) {
        let drained: Vec<InFlight> = {
            let mut state = self.inner.state.lock();
            state.failed.clear();
            state.in_flight.drain().map(|(_, pending)| pending).collect()
        };

        let count = drained.len();
        for pending in drained {
            if let Some(task) = pending.task {
                task.abort();
            }
        }
        if count > 0 {
            info!(aborted = count, "Aborted in-flight tile requests");
        }
    }

    /// Drop every in-memory tile and cancel pending work
    pub fn clear(&self) {
        self.abort_all();
        self.inner.state.lock().images.clear();
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    pub fn cached_count(&self) -> usize {
        self.inner.state.lock().images.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            cached: state.images.len(),
            in_flight: state.in_flight.len(),
            failed: state.failed.len(),
            fetches_started: self.inner.fetches.load(Ordering::Relaxed),
        }
    }
}

/// Decode downloaded bytes and write them through to disk. A failed disk
/// write is logged but does not fail the tile.
fn decode_and_persist(
    key: &TileKey,
    bytes: &[u8],
    disk: Option<&PersistentCache>,
) -> Result<Pixmap, FetchError> {
    let pixmap = decode_tile(bytes, key.width, key.height, &key.url)?;
    if let Some(disk) = disk {
        if let Err(e) = disk.store(key, &pixmap) {
            warn!(url = %key.url, error = %e, "Could not persist tile");
        }
    }
    Ok(pixmap)
}
