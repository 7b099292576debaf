//! Archive engine: the mountable virtual file system behind a game directory
//!
//! [`ArchiveEngine`] is the seam between mounting/dispatch logic and the
//! concrete container format. [`DirectoryProvider`] implements it over a
//! directory of `.pak` and `.utoc` files.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::crypto::AesKey;
use crate::error::{Error, Result};
use crate::exports::{parse_package, Export};
use crate::guid::Guid;
use crate::iostore::IoStoreToc;
use crate::pak::PakFile;
use crate::utils::collect_files;

/// An archive known to the engine but not mounted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadedArchive {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub guid: Guid,
    pub is_encrypted: bool,
    /// Set for IoStore containers
    pub toc_entry_count: Option<u32>,
}

/// An archive whose entries are visible in the virtual file system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedArchive {
    pub name: String,
    pub guid: Guid,
    pub mount_point: String,
    pub file_count: usize,
}

/// Result of a mount pass
#[derive(Debug, Clone, Default)]
pub struct MountSets {
    pub mounted: Vec<MountedArchive>,
    pub unmounted: Vec<UnloadedArchive>,
}

/// The archive engine consumed by the mount coordinator and dispatcher
pub trait ArchiveEngine: Send {
    /// Scan for archives; all start unloaded
    fn initialize(&mut self, cancel: &CancellationToken) -> Result<()>;

    fn unloaded(&self) -> Vec<UnloadedArchive>;

    fn mounted(&self) -> Vec<MountedArchive>;

    /// Register the key for a GUID, replacing any previous one
    fn submit_key(&mut self, guid: Guid, key: &str) -> Result<()>;

    /// Mount every archive whose key is now available
    fn mount(&mut self, cancel: &CancellationToken) -> Result<MountSets>;

    /// Unmount everything and forget submitted keys
    fn unmount_all(&mut self);

    /// Virtual paths of all mounted files, sorted
    fn files(&self) -> Vec<String>;

    fn contains(&self, path: &str) -> bool;

    fn read_raw(&mut self, path: &str) -> Result<Vec<u8>>;

    /// Parse a structured package into its exports
    fn load_exports(&mut self, path: &str) -> Result<Vec<Export>> {
        let data = self.read_raw(path)?;
        parse_package(&data)
    }

    /// Identifier of the active game, resolved after mounting
    fn game_name(&self) -> String;
}

enum ArchiveSource {
    Pak(PakFile),
    IoStore(IoStoreToc),
}

struct ArchiveSlot {
    source: ArchiveSource,
    mounted: bool,
}

impl ArchiveSlot {
    fn name(&self) -> String {
        match &self.source {
            ArchiveSource::Pak(pak) => pak.name(),
            ArchiveSource::IoStore(toc) => toc.name(),
        }
    }

    fn to_unloaded(&self) -> UnloadedArchive {
        match &self.source {
            ArchiveSource::Pak(pak) => UnloadedArchive {
                name: pak.name(),
                path: pak.path().to_path_buf(),
                size: pak.file_size(),
                guid: pak.encryption_key_guid(),
                is_encrypted: pak.is_encrypted(),
                toc_entry_count: None,
            },
            ArchiveSource::IoStore(toc) => UnloadedArchive {
                name: toc.name(),
                path: toc.path().to_path_buf(),
                size: toc.file_size(),
                guid: toc.header().encryption_key_guid,
                is_encrypted: toc.header().is_encrypted(),
                toc_entry_count: Some(toc.header().toc_entry_count),
            },
        }
    }

    fn to_mounted(&self) -> Option<MountedArchive> {
        match &self.source {
            ArchiveSource::Pak(pak) if self.mounted => Some(MountedArchive {
                name: pak.name(),
                guid: pak.encryption_key_guid(),
                mount_point: pak.mount_point().to_string(),
                file_count: pak.len(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct FileLocation {
    display_path: String,
    archive: usize,
    entry_name: String,
}

/// Join a mount point and an entry name into a virtual path
pub fn virtual_path(mount_point: &str, entry_name: &str) -> String {
    let mut mount = mount_point.replace('\\', "/");
    while let Some(rest) = mount.strip_prefix("../") {
        mount = rest.to_string();
    }
    let joined = format!("{}{}", mount, entry_name.replace('\\', "/"));
    joined.trim_start_matches('/').to_string()
}

/// Archive engine over a game directory
pub struct DirectoryProvider {
    root: PathBuf,
    archives: Vec<ArchiveSlot>,
    keys: HashMap<Guid, AesKey>,
    /// Lowercased virtual path → location; later mounts override earlier
    files: BTreeMap<String, FileLocation>,
}

impl DirectoryProvider {
    /// Create a provider for `root`. Fails when `root` is not a directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::ProviderInit(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        Ok(Self {
            root,
            archives: Vec::new(),
            keys: HashMap::new(),
            files: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn register_files(&mut self, index: usize) {
        let ArchiveSource::Pak(pak) = &self.archives[index].source else {
            return;
        };
        let mount_point = pak.mount_point().to_string();
        let names: Vec<String> = pak.entry_names().map(str::to_string).collect();
        for entry_name in names {
            let display_path = virtual_path(&mount_point, &entry_name);
            self.files.insert(
                display_path.to_lowercase(),
                FileLocation {
                    display_path,
                    archive: index,
                    entry_name,
                },
            );
        }
    }

    /// Game name from the directory layout: the folder holding `Content`,
    /// else the root folder name
    fn game_name_from_path(&self) -> String {
        let components: Vec<String> = self
            .root
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        if let Some(pos) = components
            .iter()
            .position(|c| c.eq_ignore_ascii_case("Content"))
        {
            if pos > 0 {
                return components[pos - 1].clone();
            }
        }

        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl ArchiveEngine for DirectoryProvider {
    fn initialize(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.unmount_all();
        self.archives.clear();

        let mut paths = collect_files(&self.root)?;
        paths.sort();

        for path in paths {
            if let Err(e) = cancel.check() {
                self.archives.clear();
                return Err(e);
            }

            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            let source = match extension.as_str() {
                "pak" => PakFile::open(&path).map(ArchiveSource::Pak),
                "utoc" => IoStoreToc::open(&path).map(ArchiveSource::IoStore),
                _ => continue,
            };

            match source {
                Ok(source) => self.archives.push(ArchiveSlot {
                    source,
                    mounted: false,
                }),
                Err(e) => warn!(archive = %path.display(), "Skipping unreadable archive: {}", e),
            }
        }

        info!(
            root = %self.root.display(),
            archives = self.archives.len(),
            "Initialized provider"
        );
        Ok(())
    }

    fn unloaded(&self) -> Vec<UnloadedArchive> {
        self.archives
            .iter()
            .filter(|slot| !slot.mounted)
            .map(ArchiveSlot::to_unloaded)
            .collect()
    }

    fn mounted(&self) -> Vec<MountedArchive> {
        self.archives
            .iter()
            .filter_map(ArchiveSlot::to_mounted)
            .collect()
    }

    fn submit_key(&mut self, guid: Guid, key: &str) -> Result<()> {
        let key = AesKey::parse(key)?;
        self.keys.insert(guid, key);
        Ok(())
    }

    fn mount(&mut self, cancel: &CancellationToken) -> Result<MountSets> {
        for index in 0..self.archives.len() {
            cancel.check()?;

            let slot = &mut self.archives[index];
            if slot.mounted {
                continue;
            }
            let ArchiveSource::Pak(pak) = &mut slot.source else {
                continue;
            };

            if pak.is_encrypted() {
                let Some(key) = self.keys.get(&pak.encryption_key_guid()).copied() else {
                    debug!(archive = %pak.name(), "No key submitted");
                    continue;
                };
                if let Err(e) = pak.set_key(key) {
                    debug!(archive = %pak.name(), "Key rejected: {}", e);
                    continue;
                }
            }

            slot.mounted = true;
            self.register_files(index);
        }

        let sets = MountSets {
            mounted: self.mounted(),
            unmounted: self.unloaded(),
        };
        info!(
            mounted = sets.mounted.len(),
            unmounted = sets.unmounted.len(),
            files = self.files.len(),
            "Mount pass complete"
        );
        Ok(sets)
    }

    fn unmount_all(&mut self) {
        for slot in &mut self.archives {
            slot.mounted = false;
        }
        self.keys.clear();
        self.files.clear();
    }

    fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .files
            .values()
            .map(|location| location.display_path.clone())
            .collect();
        files.sort();
        files
    }

    fn contains(&self, path: &str) -> bool {
        self.files.contains_key(&path.to_lowercase())
    }

    fn read_raw(&mut self, path: &str) -> Result<Vec<u8>> {
        let location = self
            .files
            .get(&path.to_lowercase())
            .ok_or_else(|| Error::EntryNotFound(path.to_string()))?;

        match &mut self.archives[location.archive].source {
            ArchiveSource::Pak(pak) => pak.extract(&location.entry_name),
            ArchiveSource::IoStore(_) => Err(Error::EntryNotFound(path.to_string())),
        }
    }

    fn game_name(&self) -> String {
        self.archives
            .iter()
            .filter(|slot| slot.mounted)
            .find_map(|slot| match &slot.source {
                ArchiveSource::Pak(pak) if !pak.header().project_name.is_empty() => {
                    Some(pak.header().project_name.clone())
                }
                _ => None,
            })
            .unwrap_or_else(|| self.game_name_from_path())
    }
}
