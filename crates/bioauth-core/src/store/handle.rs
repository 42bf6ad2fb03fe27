//! Process-wide store handle with guarded lazy initialization
//!
//! The fast path reads the memoized reference without taking any lock. The
//! slow path takes the init lock, checks again and opens the store at most
//! once. The lock covers construction only; callers use the returned
//! reference without holding it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info, warn};

use super::file::PreferenceFileStore;
use crate::error::Result;

/// Slot holding at most one opened store for the life of the process
pub struct StoreHandle<S: ?Sized> {
    slot: OnceLock<Arc<S>>,
    init: Mutex<()>,
}

impl<S: ?Sized> StoreHandle<S> {
    /// Create an empty handle
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    /// The memoized store, if it has been opened
    pub fn get(&self) -> Option<Arc<S>> {
        self.slot.get().cloned()
    }

    /// Whether the store has been opened
    pub fn is_initialized(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Return the store, opening it on first use.
    ///
    /// `produce_path` and `open` run only on the call that performs the
    /// initialization. Concurrent first callers wait for it and receive the
    /// same instance. A failed open is returned to the caller and leaves the
    /// slot empty so a later call can try again.
    pub fn get_or_open<P, O>(&self, produce_path: P, open: O) -> Result<Arc<S>>
    where
        P: FnOnce() -> PathBuf,
        O: FnOnce(&Path) -> Result<Arc<S>>,
    {
        if let Some(store) = self.slot.get() {
            return Ok(Arc::clone(store));
        }

        // The guarded data is `()`, so a poisoned lock carries no broken state
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(store) = self.slot.get() {
            debug!("Store opened by a concurrent caller");
            return Ok(Arc::clone(store));
        }

        let path = produce_path();
        let store = match open(&path) {
            Ok(store) => store,
            Err(e) => {
                warn!("Failed to open store at {:?}: {}", path, e);
                return Err(e);
            }
        };

        if self.slot.set(Arc::clone(&store)).is_err() {
            unreachable!("store slot written outside the init lock");
        }
        info!("Store opened at {:?}", path);
        Ok(store)
    }
}

impl<S: ?Sized> Default for StoreHandle<S> {
    fn default() -> Self {
        Self::new()
    }
}

static PREFERENCE_STORE: StoreHandle<PreferenceFileStore> = StoreHandle::new();

/// Get the process-wide preference store, opening it on first use.
///
/// `produce_path` is evaluated only by the call that opens the store; later
/// calls return the same instance whatever path they would produce.
pub fn get_store<P>(produce_path: P) -> Result<Arc<PreferenceFileStore>>
where
    P: FnOnce() -> PathBuf,
{
    PREFERENCE_STORE.get_or_open(produce_path, |path| {
        PreferenceFileStore::open_at(path).map(Arc::new)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BioauthError;
    use crate::store::file::PREFERENCES_FILE_NAME;
    use crate::store::PreferenceStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn open_file_store(path: &Path) -> Result<Arc<PreferenceFileStore>> {
        PreferenceFileStore::open_at(path).map(Arc::new)
    }

    #[test]
    fn test_concurrent_first_access_opens_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(PREFERENCES_FILE_NAME);
        let handle = Arc::new(StoreHandle::<PreferenceFileStore>::new());
        let opens = Arc::new(AtomicUsize::new(0));
        let paths_produced = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                let opens = opens.clone();
                let paths_produced = paths_produced.clone();
                let barrier = barrier.clone();
                let path = path.clone();
                thread::spawn(move || {
                    barrier.wait();
                    handle
                        .get_or_open(
                            || {
                                paths_produced.fetch_add(1, Ordering::SeqCst);
                                path
                            },
                            |p| {
                                opens.fetch_add(1, Ordering::SeqCst);
                                // Widen the window for racing callers
                                thread::sleep(Duration::from_millis(20));
                                open_file_store(p)
                            },
                        )
                        .unwrap()
                })
            })
            .collect();

        let stores: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(paths_produced.load(Ordering::SeqCst), 1);
        for store in &stores {
            assert!(Arc::ptr_eq(store, &stores[0]));
        }
        assert!(Arc::ptr_eq(&handle.get().unwrap(), &stores[0]));
    }

    #[test]
    fn test_failed_open_is_not_memoized() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let handle = StoreHandle::<PreferenceFileStore>::new();

        let result = handle.get_or_open(|| blocker.join(PREFERENCES_FILE_NAME), open_file_store);
        assert!(matches!(result, Err(BioauthError::StoreOpen { .. })));
        assert!(!handle.is_initialized());

        let good = temp_dir.path().join(PREFERENCES_FILE_NAME);
        let store = handle.get_or_open(|| good.clone(), open_file_store).unwrap();
        assert_eq!(store.location(), good.as_path());
        assert!(handle.is_initialized());
    }

    #[test]
    fn test_fast_path_skips_producer() {
        let temp_dir = TempDir::new().unwrap();
        let handle = StoreHandle::<PreferenceFileStore>::new();
        let first = handle
            .get_or_open(|| temp_dir.path().join(PREFERENCES_FILE_NAME), open_file_store)
            .unwrap();

        let second = handle
            .get_or_open(
                || panic!("path must not be produced twice"),
                |_| panic!("store must not be opened twice"),
            )
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_works_with_trait_objects() {
        let temp_dir = TempDir::new().unwrap();
        let handle = StoreHandle::<dyn PreferenceStore>::new();

        let store = handle
            .get_or_open(
                || temp_dir.path().join(PREFERENCES_FILE_NAME),
                |p| Ok(Arc::new(PreferenceFileStore::open_at(p)?) as Arc<dyn PreferenceStore>),
            )
            .unwrap();

        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_process_wide_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(PREFERENCES_FILE_NAME);

        let first = get_store(|| path.clone()).unwrap();
        let second = get_store(|| temp_dir.path().join("elsewhere.json")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.location(), path.as_path());
    }
}
