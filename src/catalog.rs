//! Catalog of the archives discovered for a game directory

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::guid::Guid;
use crate::provider::{ArchiveEngine, MountedArchive, UnloadedArchive};

/// Archives of this size or smaller hold no entries worth listing
pub const MIN_ARCHIVE_SIZE: u64 = 364;

static ARCHIVE_EXTENSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^.+(pak|utoc)$").expect("valid archive extension regex"));

static OPTIONAL_CHUNK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^pakchunk.+optional-").expect("valid optional chunk regex")
});

/// Whether an archive name belongs to the shippable set: ends in `pak` or
/// `utoc`, and is neither a `global` container nor an optional chunk
pub fn is_shippable_archive(name: &str) -> bool {
    let lower = name.to_lowercase();
    !lower.starts_with("global")
        && !OPTIONAL_CHUNK_RE.is_match(name)
        && ARCHIVE_EXTENSION_RE.is_match(name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size: u64,
    pub guid: Guid,
    pub is_encrypted: bool,
    pub is_enabled: bool,
    /// Empty until mounted
    pub mount_point: String,
    /// −1 until known
    pub file_count: i64,
    /// Normalized key text, or empty
    pub key: String,
}

impl ArchiveEntry {
    fn from_unloaded(archive: &UnloadedArchive) -> Self {
        Self {
            name: archive.name.clone(),
            path: archive.path.clone(),
            size: archive.size,
            guid: archive.guid,
            is_encrypted: archive.is_encrypted,
            is_enabled: false,
            mount_point: String::new(),
            file_count: -1,
            key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveCatalog {
    entries: Vec<ArchiveEntry>,
}

impl ArchiveCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog every unloaded archive that is large enough and passes the
    /// shippable-archive filter, in engine order
    pub fn discover<E: ArchiveEngine + ?Sized>(
        engine: &E,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let mut entries = Vec::new();
        for archive in engine.unloaded() {
            cancel.check()?;
            if archive.size > MIN_ARCHIVE_SIZE && is_shippable_archive(&archive.name) {
                entries.push(ArchiveEntry::from_unloaded(&archive));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Record the key text on every archive sharing `guid`
    pub fn set_key(&mut self, guid: Guid, key: &str) {
        for entry in self.entries.iter_mut().filter(|entry| entry.guid == guid) {
            entry.key = key.to_string();
        }
    }

    /// Clear every enabled flag
    pub fn deactivate_all(&mut self) {
        for entry in &mut self.entries {
            entry.is_enabled = false;
        }
    }

    /// Copy mount state back onto the catalog
    pub fn reconcile_after_mount(
        &mut self,
        mounted: &[MountedArchive],
        unmounted: &[UnloadedArchive],
    ) {
        for entry in &mut self.entries {
            if let Some(archive) = mounted.iter().find(|m| m.name == entry.name) {
                entry.is_enabled = true;
                entry.mount_point = archive.mount_point.clone();
                entry.file_count = archive.file_count as i64;
                continue;
            }

            entry.is_enabled = false;
            entry.mount_point.clear();
            entry.file_count = unmounted
                .iter()
                .find(|u| u.name == entry.name)
                .and_then(|u| u.toc_entry_count)
                .map(|count| count as i64 - 1)
                .unwrap_or(-1);
        }
    }

    pub fn enabled_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_enabled).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::provider::MountSets;

    struct FakeEngine {
        unloaded: Vec<UnloadedArchive>,
    }

    impl ArchiveEngine for FakeEngine {
        fn initialize(&mut self, _cancel: &CancellationToken) -> Result<()> {
            Ok(())
        }
        fn unloaded(&self) -> Vec<UnloadedArchive> {
            self.unloaded.clone()
        }
        fn mounted(&self) -> Vec<MountedArchive> {
            Vec::new()
        }
        fn submit_key(&mut self, _guid: Guid, _key: &str) -> Result<()> {
            Ok(())
        }
        fn mount(&mut self, _cancel: &CancellationToken) -> Result<MountSets> {
            Ok(MountSets::default())
        }
        fn unmount_all(&mut self) {}
        fn files(&self) -> Vec<String> {
            Vec::new()
        }
        fn contains(&self, _path: &str) -> bool {
            false
        }
        fn read_raw(&mut self, path: &str) -> Result<Vec<u8>> {
            Err(Error::EntryNotFound(path.to_string()))
        }
        fn game_name(&self) -> String {
            String::new()
        }
    }

    fn unloaded(name: &str, size: u64, toc: Option<u32>) -> UnloadedArchive {
        UnloadedArchive {
            name: name.to_string(),
            path: PathBuf::from(name),
            size,
            guid: Guid::ZERO,
            is_encrypted: false,
            toc_entry_count: toc,
        }
    }

    #[test]
    fn test_shippable_archive_filter() {
        assert!(is_shippable_archive("pakchunk0-Windows.pak"));
        assert!(is_shippable_archive("pakchunk0-Windows.UTOC"));
        assert!(!is_shippable_archive("global.utoc"));
        assert!(!is_shippable_archive("Global.pak"));
        assert!(!is_shippable_archive("pakchunk10optional-Windows.pak"));
        assert!(!is_shippable_archive("pakchunk0-Windows.ucas"));
        assert!(!is_shippable_archive("pak"));
        assert!(is_shippable_archive("pakchunkoptional-Windows.pak"));
    }

    #[test]
    fn test_discover_filters_size_and_name() {
        let engine = FakeEngine {
            unloaded: vec![
                unloaded("tiny.pak", 364, None),
                unloaded("big.pak", 365, None),
                unloaded("global.utoc", 10_000, Some(3)),
                unloaded("pakchunk1-Windows.utoc", 10_000, Some(3)),
            ],
        };
        let catalog = ArchiveCatalog::discover(&engine, &CancellationToken::new()).unwrap();
        let names: Vec<&str> = catalog.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["big.pak", "pakchunk1-Windows.utoc"]);
        assert!(catalog.iter().all(|e| e.file_count == -1 && !e.is_enabled));
    }

    #[test]
    fn test_discover_observes_cancellation() {
        let engine = FakeEngine {
            unloaded: vec![unloaded("a.pak", 1000, None), unloaded("b.pak", 1000, None)],
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            ArchiveCatalog::discover(&engine, &cancel),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_reconcile_after_mount() {
        let engine = FakeEngine {
            unloaded: vec![
                unloaded("a.pak", 1000, None),
                unloaded("b.pak", 1000, None),
                unloaded("c.utoc", 1000, Some(11)),
            ],
        };
        let mut catalog = ArchiveCatalog::discover(&engine, &CancellationToken::new()).unwrap();

        let mounted = vec![MountedArchive {
            name: "a.pak".to_string(),
            guid: Guid::ZERO,
            mount_point: "../../../Game/".to_string(),
            file_count: 7,
        }];
        let unmounted = vec![unloaded("b.pak", 1000, None), unloaded("c.utoc", 1000, Some(11))];
        catalog.reconcile_after_mount(&mounted, &unmounted);

        let a = catalog.get("a.pak").unwrap();
        assert!(a.is_enabled);
        assert_eq!(a.mount_point, "../../../Game/");
        assert_eq!(a.file_count, 7);

        let b = catalog.get("b.pak").unwrap();
        assert!(!b.is_enabled);
        assert_eq!(b.file_count, -1);

        let c = catalog.get("c.utoc").unwrap();
        assert!(!c.is_enabled);
        assert_eq!(c.file_count, 10);
        assert_eq!(catalog.enabled_count(), 1);

        catalog.deactivate_all();
        catalog.deactivate_all();
        assert_eq!(catalog.enabled_count(), 0);
    }
}
