//! User settings persisted as JSON

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::keys::KeySet;

/// Owner-path directories whose material instances are never previewed
pub const DEFAULT_MATERIAL_EXCLUSIONS: &[&str] =
    &["MI_OfferImages", "RenderSwitch_Materials", "MI_BPTile"];

pub const DEFAULT_BATCH_DELAY_MS: u64 = 10;

/// Which sound data a sound export should yield
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioMode {
    #[default]
    PlayDecompressed,
    PlayCompressed,
}

impl AudioMode {
    pub fn prefers_compressed(self) -> bool {
        self == AudioMode::PlayCompressed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub output_directory: PathBuf,
    pub model_directory: PathBuf,
    pub keep_directory_structure: bool,
    pub is_auto_open_sounds: bool,
    pub compressed_audio_mode: AudioMode,

    pub preview_static_meshes: bool,
    pub preview_skeletal_meshes: bool,
    pub preview_materials: bool,

    pub save_static_meshes: bool,
    pub save_skeletal_meshes: bool,
    pub save_materials: bool,
    pub save_skeletons: bool,
    pub save_animations: bool,

    pub material_preview_exclusions: Vec<String>,
    pub batch_delay_ms: u64,

    /// Keys per game name
    pub aes_keys: BTreeMap<String, KeySet>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("Output"),
            model_directory: PathBuf::from("Output").join("Exports"),
            keep_directory_structure: true,
            is_auto_open_sounds: false,
            compressed_audio_mode: AudioMode::default(),
            preview_static_meshes: true,
            preview_skeletal_meshes: true,
            preview_materials: true,
            save_static_meshes: false,
            save_skeletal_meshes: false,
            save_materials: false,
            save_skeletons: false,
            save_animations: false,
            material_preview_exclusions: DEFAULT_MATERIAL_EXCLUSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            aes_keys: BTreeMap::new(),
        }
    }
}

impl UserSettings {
    /// Load settings from `path`. A missing file yields defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&content)?;
        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Write settings to `path`, replacing the file atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        debug!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Keys stored for `game`, or an empty set
    pub fn key_set(&self, game: &str) -> KeySet {
        self.aes_keys.get(game).cloned().unwrap_or_default()
    }

    pub fn set_key_set(&mut self, game: &str, key_set: KeySet) {
        self.aes_keys.insert(game.to_string(), key_set);
    }
}
