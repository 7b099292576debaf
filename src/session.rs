//! A browsing session over one game directory
//!
//! [`SessionCore`] owns the engine, catalog, key registry and settings and
//! exposes every operation synchronously. [`Session`] wraps it for use from
//! a front end: long-running work is submitted to a single-slot [`Worker`]
//! and runs against the core one unit at a time.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::batch::{export_data, Batch, BatchItem, BatchReport};
use crate::cancel::CancellationToken;
use crate::catalog::ArchiveCatalog;
use crate::dispatch::{AssetDispatcher, DispatchOptions, DispatchResult, Message};
use crate::error::{Error, Result};
use crate::keys::{KeyEntry, KeyRegistry, KeySet};
use crate::mount::{MountReport, VfsMountCoordinator};
use crate::provider::{ArchiveEngine, DirectoryProvider};
use crate::settings::UserSettings;
use crate::surface::{HeadlessSurface, PresentationSurface};
use crate::tree::AssetFolder;
use crate::utils::file_name;
use crate::worker::{TaskHandle, Worker};

/// Source of published keys for a game
pub trait RemoteKeySource: Send + Sync {
    /// `Ok(None)` when the source has nothing for `game`
    fn fetch_keys(&self, game: &str) -> Result<Option<KeySet>>;
}

/// Keys read from a JSON file laid out like the persisted key set
#[derive(Debug, Clone)]
pub struct FileKeySource {
    path: PathBuf,
}

impl FileKeySource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RemoteKeySource for FileKeySource {
    fn fetch_keys(&self, _game: &str) -> Result<Option<KeySet>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

pub struct SessionCore {
    engine: Box<dyn ArchiveEngine>,
    surface: Box<dyn PresentationSurface>,
    settings: UserSettings,
    settings_path: PathBuf,
    catalog: ArchiveCatalog,
    registry: KeyRegistry,
    /// Settings entry the key set is read from and written back to
    key_set_name: String,
    game_name: String,
    overwrite_material: bool,
}

impl SessionCore {
    pub fn new(
        engine: Box<dyn ArchiveEngine>,
        surface: Box<dyn PresentationSurface>,
        settings: UserSettings,
        settings_path: PathBuf,
    ) -> Self {
        Self {
            engine,
            surface,
            settings,
            settings_path,
            catalog: ArchiveCatalog::new(),
            registry: KeyRegistry::default(),
            key_set_name: String::new(),
            game_name: String::new(),
            overwrite_material: false,
        }
    }

    /// Scan the game directory, catalog its archives and load its keys.
    ///
    /// A cancelled scan leaves the catalog and the key list empty.
    pub fn initialize(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.catalog.clear();
        self.registry = KeyRegistry::default();
        self.engine.initialize(cancel)?;
        self.catalog = ArchiveCatalog::discover(self.engine.as_ref(), cancel)?;
        self.game_name = self.engine.game_name();
        self.key_set_name = self.game_name.clone();
        self.load_registry();

        info!(
            game = %self.game_name,
            archives = self.catalog.len(),
            keys = self.registry.entries().len(),
            "Session initialized"
        );
        Ok(())
    }

    fn load_registry(&mut self) {
        let key_set = self.settings.key_set(&self.key_set_name);
        self.registry = KeyRegistry::initialize(key_set, self.catalog.entries());
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut UserSettings {
        &mut self.settings
    }

    pub fn catalog(&self) -> &ArchiveCatalog {
        &self.catalog
    }

    pub fn key_entries(&self) -> &[KeyEntry] {
        self.registry.entries()
    }

    pub fn key_set_name(&self) -> &str {
        &self.key_set_name
    }

    pub fn game_name(&self) -> &str {
        &self.game_name
    }

    pub fn is_dirty(&self) -> bool {
        self.registry.is_dirty()
    }

    pub fn edit_key(&mut self, index: usize, raw: &str) -> Result<bool> {
        self.registry.edit_key(index, raw)
    }

    /// Route material instances to the viewer's overwrite slot
    pub fn set_overwrite_material(&mut self, enabled: bool) {
        self.overwrite_material = enabled;
    }

    /// Unmount everything
    pub fn clear_provider(&mut self) {
        self.engine.unmount_all();
        self.catalog.deactivate_all();
    }

    /// Remount with the current keys when launching or when a key changed.
    ///
    /// The key set is written back to the settings file and the dirty flag
    /// cleared. Returns `None` when there was nothing to do.
    pub fn update_provider(
        &mut self,
        is_launch: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<MountReport>> {
        if !is_launch && !self.registry.is_dirty() {
            debug!("Keys unchanged, skipping remount");
            return Ok(None);
        }

        self.clear_provider();
        let report = VfsMountCoordinator::new(self.engine.as_mut(), &mut self.catalog)
            .remount(&self.registry, cancel)?;
        self.game_name = report.game_name.clone();

        self.settings
            .set_key_set(&self.key_set_name, self.registry.key_set().clone());
        self.settings.save(&self.settings_path)?;
        self.registry.mark_clean();

        Ok(Some(report))
    }

    /// Replace the stored keys with the ones published by `source`
    pub fn refresh_keys(&mut self, source: &dyn RemoteKeySource) -> Message {
        let fetched = match source.fetch_keys(&self.key_set_name) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Could not fetch keys: {}", e);
                return Message::warning(format!("Could not fetch keys: {}", e));
            }
        };

        let Some(key_set) = fetched.filter(|k| !k.primary_key.is_empty() || k.dynamic_keys.is_some())
        else {
            warn!(game = %self.key_set_name, "No keys available");
            return Message::warning(format!("No keys available for '{}'", self.key_set_name));
        };

        let count = 1 + key_set.dynamic_keys.as_ref().map_or(0, Vec::len);
        self.settings.set_key_set(&self.key_set_name, key_set);
        self.load_registry();
        info!(game = %self.key_set_name, keys = count, "Refreshed keys");
        Message::info(format!("Refreshed {} key(s) for '{}'", count, self.key_set_name))
    }

    pub fn files(&self) -> Vec<String> {
        self.engine.files()
    }

    pub fn tree(&self) -> AssetFolder {
        AssetFolder::from_paths(self.engine.files())
    }

    fn options(&self) -> DispatchOptions {
        let mut options = DispatchOptions::from_settings(&self.settings);
        options.overwrite_material = self.overwrite_material;
        options
    }

    fn batch<'a>(&self, cancel: &CancellationToken) -> Batch<'a> {
        Batch::new(cancel.clone())
            .with_delay(std::time::Duration::from_millis(self.settings.batch_delay_ms))
    }

    fn folder(&self, path: &str) -> Result<AssetFolder> {
        self.tree()
            .find(path)
            .cloned()
            .ok_or_else(|| Error::EntryNotFound(path.to_string()))
    }

    /// Dispatch one path; a failure becomes an error message on the result
    pub fn dispatch(&mut self, path: &str) -> DispatchResult {
        let options = self.options();
        let mut dispatcher =
            AssetDispatcher::new(self.engine.as_mut(), self.surface.as_mut(), &options);
        match dispatcher.dispatch(path, false) {
            Ok(result) => result,
            Err(e) => {
                error!(path, "Dispatch failed: {}", e);
                DispatchResult::failed(path, format!("Could not open '{}': {}", file_name(path), e))
            }
        }
    }

    pub fn export_data(&mut self, path: &str) -> Result<Vec<PathBuf>> {
        let options = self.options();
        export_data(self.engine.as_mut(), &options, path)
    }

    pub fn extract_folder(&mut self, folder: &str, cancel: &CancellationToken) -> Result<BatchReport> {
        self.extract_folder_with(folder, cancel, |_| {})
    }

    /// [`SessionCore::extract_folder`] reporting each finished item
    pub fn extract_folder_with(
        &mut self,
        folder: &str,
        cancel: &CancellationToken,
        on_item: impl FnMut(&BatchItem),
    ) -> Result<BatchReport> {
        let folder = self.folder(folder)?;
        let options = self.options();
        let mut batch = self.batch(cancel).on_item(on_item);
        let mut dispatcher =
            AssetDispatcher::new(self.engine.as_mut(), self.surface.as_mut(), &options);
        batch.extract_folder(&mut dispatcher, &folder)
    }

    pub fn save_folder(&mut self, folder: &str, cancel: &CancellationToken) -> Result<BatchReport> {
        let folder = self.folder(folder)?;
        let options = self.options();
        let mut batch = self.batch(cancel);
        let mut dispatcher =
            AssetDispatcher::new(self.engine.as_mut(), self.surface.as_mut(), &options);
        batch.save_folder(&mut dispatcher, &folder)
    }

    pub fn export_folder(&mut self, folder: &str, cancel: &CancellationToken) -> Result<BatchReport> {
        self.export_folder_with(folder, cancel, |_| {})
    }

    pub fn export_folder_with(
        &mut self,
        folder: &str,
        cancel: &CancellationToken,
        on_item: impl FnMut(&BatchItem),
    ) -> Result<BatchReport> {
        let folder = self.folder(folder)?;
        let options = self.options();
        let mut batch = self.batch(cancel).on_item(on_item);
        batch.export_folder(self.engine.as_mut(), &options, &folder)
    }

    pub fn extract_selected(
        &mut self,
        paths: &[String],
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let options = self.options();
        let mut batch = self.batch(cancel);
        let mut dispatcher =
            AssetDispatcher::new(self.engine.as_mut(), self.surface.as_mut(), &options);
        batch.extract_selected(&mut dispatcher, paths)
    }
}

/// A session whose long-running work runs on a background worker
pub struct Session {
    core: Arc<Mutex<SessionCore>>,
    worker: Worker,
}

impl Session {
    pub fn new(core: SessionCore) -> Self {
        Self {
            core: Arc::new(Mutex::new(core)),
            worker: Worker::new(),
        }
    }

    /// Open a game directory with headless presentation.
    ///
    /// Fails when the directory does not exist or the settings file is
    /// malformed.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(game_dir: P, settings_path: Q) -> Result<Self> {
        let engine = DirectoryProvider::new(game_dir)?;
        let settings_path = settings_path.as_ref().to_path_buf();
        let settings = UserSettings::load(&settings_path)?;
        Ok(Self::new(SessionCore::new(
            Box::new(engine),
            Box::new(HeadlessSurface),
            settings,
            settings_path,
        )))
    }

    /// Run `f` against the core on the calling thread
    pub fn with_core<T>(&self, f: impl FnOnce(&mut SessionCore) -> T) -> T {
        let mut core = self
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut core)
    }

    /// Run `work` on the worker, cancelling whatever is in flight
    pub fn submit<T, F>(&mut self, label: &str, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SessionCore, &CancellationToken) -> Result<T> + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        self.worker.submit(label, move |token| {
            let mut core = core
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            work(&mut core, token)
        })
    }

    /// Background directory scan, see [`SessionCore::initialize`]
    pub fn initialize(&mut self) -> TaskHandle<()> {
        self.submit("initialize", |core, token| core.initialize(token))
    }

    /// Background remount, see [`SessionCore::update_provider`]
    pub fn update_provider(&mut self, is_launch: bool) -> TaskHandle<Option<MountReport>> {
        self.submit("update provider", move |core, token| {
            core.update_provider(is_launch, token)
        })
    }

    pub fn extract_folder(&mut self, folder: &str) -> TaskHandle<BatchReport> {
        let folder = folder.to_string();
        self.submit("extract folder", move |core, token| {
            core.extract_folder(&folder, token)
        })
    }

    pub fn export_folder(&mut self, folder: &str) -> TaskHandle<BatchReport> {
        let folder = folder.to_string();
        self.submit("export folder", move |core, token| {
            core.export_folder(&folder, token)
        })
    }

    pub fn save_folder(&mut self, folder: &str) -> TaskHandle<BatchReport> {
        let folder = folder.to_string();
        self.submit("save folder", move |core, token| core.save_folder(&folder, token))
    }

    pub fn cancel(&mut self) {
        self.worker.cancel_current();
    }

    pub fn is_busy(&self) -> bool {
        self.worker.is_busy()
    }
}
