//! Pattern library holder with optional file-system hot reload.
//!
//! Readers take an `Arc` snapshot via [`PatternStore::current`], so a
//! classification run always sees one consistent library even if a reload
//! lands mid-run. A reload that fails to parse or compile keeps the
//! previous library and logs a warning.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use super::{CompiledLibrary, PatternError};

/// Shared, swappable compiled pattern library.
pub struct PatternStore {
    current: RwLock<Arc<CompiledLibrary>>,
    /// Library file, when loaded from disk.
    path: Option<PathBuf>,
    /// File watcher handle (kept alive to maintain notifications).
    _watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for PatternStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternStore")
            .field("path", &self.path)
            .field("version", &self.current().version)
            .finish()
    }
}

impl PatternStore {
    /// Wrap an already compiled library. No file backing, no reload.
    pub fn fixed(library: CompiledLibrary) -> Self {
        Self {
            current: RwLock::new(Arc::new(library)),
            path: None,
            _watcher: None,
        }
    }

    /// Load a library file without watching it.
    ///
    /// # Errors
    ///
    /// Returns the [`PatternError`] from the initial load; startup must not
    /// proceed without a valid library.
    pub fn load(path: &Path) -> Result<Self, PatternError> {
        let library = CompiledLibrary::from_path(path)?;
        info!(path = %path.display(), version = %library.version, "pattern library loaded");
        Ok(Self {
            current: RwLock::new(Arc::new(library)),
            path: Some(path.to_path_buf()),
            _watcher: None,
        })
    }

    /// Load a library file and reload it whenever it changes on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial load fails or the watcher cannot be
    /// started.
    pub fn watch(path: &Path) -> anyhow::Result<Arc<Self>> {
        let library = CompiledLibrary::from_path(path)?;
        let (tx, rx) = std::sync::mpsc::channel();

        let mut watcher =
            notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
                if let Ok(evt) = event {
                    if evt.kind.is_modify() || evt.kind.is_create() {
                        if let Err(e) = tx.send(()) {
                            warn!(error = %e, "failed to send pattern watcher event");
                        }
                    }
                }
            })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;

        let store = Arc::new(Self {
            current: RwLock::new(Arc::new(library)),
            path: Some(path.to_path_buf()),
            _watcher: Some(watcher),
        });

        let store_for_thread = Arc::clone(&store);
        std::thread::spawn(move || {
            while rx.recv().is_ok() {
                debug!("pattern library change detected");
                if let Err(e) = store_for_thread.reload() {
                    warn!(error = %e, "pattern library reload failed; keeping previous version");
                }
            }
        });

        info!(path = %path.display(), version = %store.current().version, "watching pattern library");
        Ok(store)
    }

    /// Snapshot of the active library.
    pub fn current(&self) -> Arc<CompiledLibrary> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-read the backing file and swap in the new library.
    ///
    /// A store built with [`PatternStore::fixed`] has nothing to reload and
    /// returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the [`PatternError`] if the file no longer parses or
    /// compiles. The previous library stays active.
    pub fn reload(&self) -> Result<(), PatternError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let library = CompiledLibrary::from_path(path)?;
        let version = library.version.clone();
        self.replace(library);
        info!(version = %version, "pattern library reloaded");
        Ok(())
    }

    /// Swap in a new library.
    pub fn replace(&self, library: CompiledLibrary) {
        match self.current.write() {
            Ok(mut guard) => *guard = Arc::new(library),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(library),
        }
    }
}
