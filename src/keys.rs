//! AES key registry
//!
//! Holds the per-game [`KeySet`] loaded from settings, exposes one editable
//! [`KeyEntry`] per distinct archive GUID, and tracks whether any edit
//! changed a key since the set was loaded.
//!
//! The dirty flag is sticky: once raised it stays raised even if a later
//! edit restores the original value. It is only cleared by
//! [`KeyRegistry::mark_clean`] after the keys were mounted and persisted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ArchiveEntry;
use crate::error::{Error, Result};
use crate::guid::Guid;

/// Normalize key text: empty stays empty, otherwise `0x` + uppercase hex.
///
/// Leading/trailing whitespace is dropped and a leading `0x` (any case) is
/// stripped before re-prefixing, so the function is idempotent.
pub fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    format!("0x{}", digits.trim().to_uppercase())
}

/// A key bound to a non-primary archive GUID, as persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicKey {
    pub key: String,
    pub file_name: String,
    /// Canonical GUID string; compared textually
    pub guid: String,
}

/// Persisted keys of one game
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySet {
    #[serde(default)]
    pub primary_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_keys: Option<Vec<DynamicKey>>,
}

impl KeySet {
    pub fn find_dynamic(&self, guid: &str) -> Option<&DynamicKey> {
        self.dynamic_keys
            .as_ref()
            .and_then(|keys| keys.iter().find(|k| k.guid == guid))
    }
}

/// One editable key slot shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntry {
    pub guid: Guid,
    /// Archive the GUID was first seen on; empty for the primary key
    pub file_name: String,
    pub key: String,
}

impl KeyEntry {
    pub fn is_primary(&self) -> bool {
        self.guid.is_zero()
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    key_set: KeySet,
    entries: Vec<KeyEntry>,
    dirty: bool,
}

impl KeyRegistry {
    /// Build the entry list: the primary key first, then one entry per
    /// distinct non-zero archive GUID in discovery order
    pub fn initialize(key_set: KeySet, archives: &[ArchiveEntry]) -> Self {
        let mut entries = vec![KeyEntry {
            guid: Guid::ZERO,
            file_name: String::new(),
            key: normalize_key(&key_set.primary_key),
        }];

        for archive in archives {
            if archive.guid.is_zero() || entries.iter().any(|e| e.guid == archive.guid) {
                continue;
            }
            let key = key_set
                .find_dynamic(&archive.guid.to_string())
                .map(|dynamic| normalize_key(&dynamic.key))
                .unwrap_or_default();
            entries.push(KeyEntry {
                guid: archive.guid,
                file_name: archive.name.clone(),
                key,
            });
        }

        debug!(entries = entries.len(), "Initialized key registry");

        Self {
            key_set,
            entries,
            dirty: false,
        }
    }

    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    pub fn key_set(&self) -> &KeySet {
        &self.key_set
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Apply an edit to entry `index` and return the dirty state
    pub fn edit_key(&mut self, index: usize, raw: &str) -> Result<bool> {
        let key = normalize_key(raw);
        let entry = self
            .entries
            .get_mut(index)
            .ok_or_else(|| Error::InvalidKey(format!("no key entry at index {}", index)))?;
        entry.key = key.clone();

        if index == 0 {
            if !self.dirty {
                self.dirty = normalize_key(&self.key_set.primary_key) != key;
            }
            self.key_set.primary_key = key;
            return Ok(self.dirty);
        }

        let guid = entry.guid.to_string();
        let file_name = entry.file_name.clone();
        let dynamic_keys = self.key_set.dynamic_keys.get_or_insert_with(Vec::new);

        match dynamic_keys.iter_mut().find(|k| k.guid == guid) {
            Some(existing) => {
                if !self.dirty {
                    self.dirty = normalize_key(&existing.key) != key;
                }
                existing.key = key;
            }
            None => {
                dynamic_keys.push(DynamicKey {
                    key,
                    file_name,
                    guid,
                });
                self.dirty = true;
            }
        }

        Ok(self.dirty)
    }

    /// `(guid, key)` pairs in entry order, for submission to the engine
    pub fn submissions(&self) -> Vec<(Guid, String)> {
        self.entries
            .iter()
            .map(|entry| (entry.guid, entry.key.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn archive(name: &str, guid: Guid) -> ArchiveEntry {
        ArchiveEntry {
            name: name.to_string(),
            path: PathBuf::from(name),
            size: 1000,
            guid,
            is_encrypted: !guid.is_zero(),
            is_enabled: false,
            mount_point: String::new(),
            file_count: -1,
            key: String::new(),
        }
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(""), "");
        assert_eq!(normalize_key("   "), "");
        assert_eq!(normalize_key("0xabc"), "0xABC");
        assert_eq!(normalize_key("ABC"), "0xABC");
        assert_eq!(normalize_key("0Xabc"), "0xABC");
        assert_eq!(normalize_key("  0xab cd "), "0xAB CD");
        assert_eq!(normalize_key("€"), "0x€");
        assert_eq!(normalize_key("a€"), "0xA€");
        assert_eq!(normalize_key("0x€abc"), "0x€ABC");

        for raw in ["", "0xabc", "abc", "0x0xab", " 0X12 ", "0x", "€", "a€", "€abc", "ß"] {
            let once = normalize_key(raw);
            assert_eq!(normalize_key(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_initialize_dedupes_and_orders() {
        let a = Guid::new(0xA, 0, 0, 0);
        let b = Guid::new(0xB, 0, 0, 0);
        let archives = vec![
            archive("base.pak", Guid::ZERO),
            archive("a1.pak", a),
            archive("b.pak", b),
            archive("a2.pak", a),
        ];
        let key_set = KeySet {
            primary_key: "deadbeef".to_string(),
            dynamic_keys: Some(vec![DynamicKey {
                key: "0xbeef".to_string(),
                file_name: "b.pak".to_string(),
                guid: b.to_string(),
            }]),
        };

        let registry = KeyRegistry::initialize(key_set, &archives);
        let entries = registry.entries();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_primary());
        assert_eq!(entries[0].key, "0xDEADBEEF");
        assert_eq!(entries[1].guid, a);
        assert_eq!(entries[1].file_name, "a1.pak");
        assert_eq!(entries[1].key, "");
        assert_eq!(entries[2].key, "0xBEEF");
        assert!(!registry.is_dirty());
    }

    #[test]
    fn test_empty_primary_with_one_dynamic_guid() {
        let a = Guid::new(1, 2, 3, 4);
        let registry = KeyRegistry::initialize(
            KeySet::default(),
            &[archive("a.pak", a), archive("base.pak", Guid::ZERO)],
        );
        assert_eq!(registry.entries().len(), 2);
        assert_eq!(registry.entries()[0].key, "");
        assert_eq!(registry.entries()[1].guid, a);
        assert_eq!(registry.entries()[1].key, "");
    }

    #[test]
    fn test_primary_edit_is_sticky_dirty() {
        let mut registry = KeyRegistry::initialize(
            KeySet {
                primary_key: "0xAA".to_string(),
                dynamic_keys: None,
            },
            &[],
        );

        assert!(!registry.edit_key(0, "aa").unwrap());
        assert!(registry.edit_key(0, "0xBB").unwrap());
        // Restoring the loaded value never clears the flag
        assert!(registry.edit_key(0, "0xAA").unwrap());
        assert_eq!(registry.key_set().primary_key, "0xAA");

        registry.mark_clean();
        assert!(!registry.is_dirty());
    }

    #[test]
    fn test_dynamic_edit_creates_collection() {
        let a = Guid::new(9, 9, 9, 9);
        let mut registry = KeyRegistry::initialize(KeySet::default(), &[archive("a.pak", a)]);

        assert!(registry.edit_key(1, "0x12").unwrap());
        let dynamic = registry.key_set().dynamic_keys.as_ref().unwrap();
        assert_eq!(dynamic.len(), 1);
        assert_eq!(dynamic[0].guid, a.to_string());
        assert_eq!(dynamic[0].file_name, "a.pak");
        assert_eq!(dynamic[0].key, "0x12");
    }

    #[test]
    fn test_dynamic_edit_appends_when_missing() {
        let a = Guid::new(1, 0, 0, 0);
        let b = Guid::new(2, 0, 0, 0);
        let key_set = KeySet {
            primary_key: String::new(),
            dynamic_keys: Some(vec![DynamicKey {
                key: "0x01".to_string(),
                file_name: "a.pak".to_string(),
                guid: a.to_string(),
            }]),
        };
        let mut registry =
            KeyRegistry::initialize(key_set, &[archive("a.pak", a), archive("b.pak", b)]);

        assert!(registry.edit_key(2, "").unwrap());
        assert_eq!(registry.key_set().dynamic_keys.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_dynamic_edit_updates_in_place() {
        let a = Guid::new(1, 0, 0, 0);
        let key_set = KeySet {
            primary_key: String::new(),
            dynamic_keys: Some(vec![DynamicKey {
                key: "0xab".to_string(),
                file_name: "a.pak".to_string(),
                guid: a.to_string(),
            }]),
        };
        let mut registry = KeyRegistry::initialize(key_set, &[archive("a.pak", a)]);

        assert!(!registry.edit_key(1, "AB").unwrap());
        assert!(registry.edit_key(1, "CD").unwrap());
        assert!(registry.edit_key(1, "AB").unwrap());
        let dynamic = registry.key_set().dynamic_keys.as_ref().unwrap();
        assert_eq!(dynamic.len(), 1);
        assert_eq!(dynamic[0].key, "0xAB");
    }

    #[test]
    fn test_edit_out_of_range() {
        let mut registry = KeyRegistry::initialize(KeySet::default(), &[]);
        assert!(registry.edit_key(3, "0x1").is_err());
    }

    #[test]
    fn test_key_set_json_layout() {
        let key_set = KeySet {
            primary_key: "0xAA".to_string(),
            dynamic_keys: Some(vec![DynamicKey {
                key: "0xBB".to_string(),
                file_name: "a.pak".to_string(),
                guid: "0000000100000000000000000000000".to_string(),
            }]),
        };
        let json = serde_json::to_value(&key_set).unwrap();
        assert_eq!(json["primaryKey"], "0xAA");
        assert_eq!(json["dynamicKeys"][0]["fileName"], "a.pak");

        let absent: KeySet = serde_json::from_str(r#"{"primaryKey": ""}"#).unwrap();
        assert!(absent.dynamic_keys.is_none());
        assert!(serde_json::to_value(&absent).unwrap().get("dynamicKeys").is_none());
    }
}
