//! Asset dispatch
//!
//! A virtual path is first classified by extension ([`AssetClass`]). Packages
//! are then walked export by export through an ordered rule list; the first
//! rule whose predicate accepts an export runs, and the walk stops at the
//! first export a rule reports as handled.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::creator::InfoCard;
use crate::error::{Error, Result};
use crate::exports::{decode_sound, decode_texture, exports_to_json, Export, ExportKind};
use crate::formats::wwise::WwiseMedia;
use crate::formats::{
    AssetRegistryHeader, LocMeta, LocRes, OodleDictionaryHeader, ShaderArchive, WwiseBank,
    WwisePackage,
};
use crate::media::{decode_image, rasterize_svg};
use crate::provider::ArchiveEngine;
use crate::settings::{AudioMode, UserSettings};
use crate::surface::PresentationSurface;
use crate::utils::{extension, file_name, output_path, strip_extension};

/// Extensions whose payload is shown as plain text
pub const TEXT_EXTENSIONS: &[&str] = &[
    "ini", "txt", "log", "po", "bat", "dat", "cfg", "ide", "ipl", "zon", "xml", "h", "uproject",
    "uplugin", "upluginmanifest", "csv", "json", "archive", "manifest",
];

/// Format tag of Wwise media artifacts
pub const WEM_FORMAT: &str = "WEM";

/// Extension-level classification of a virtual path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Package,
    Text,
    LocMeta,
    LocRes,
    AssetRegistry,
    SoundBank,
    SoundPackage,
    WwiseMedia,
    OodleDictionary,
    Image,
    Svg,
    Font,
    ShaderArchive,
    Unknown,
}

impl AssetClass {
    pub fn of(path: &str) -> Self {
        let ext = extension(path);
        match ext.as_str() {
            "uasset" | "umap" => AssetClass::Package,
            "locmeta" => AssetClass::LocMeta,
            "locres" => AssetClass::LocRes,
            "bin" if file_name(path).contains("AssetRegistry") => AssetClass::AssetRegistry,
            "bnk" => AssetClass::SoundBank,
            "pck" => AssetClass::SoundPackage,
            "wem" => AssetClass::WwiseMedia,
            "udic" => AssetClass::OodleDictionary,
            "png" | "jpg" | "bmp" => AssetClass::Image,
            "svg" => AssetClass::Svg,
            "ufont" | "otf" | "ttf" => AssetClass::Font,
            "ushaderbytecode" | "ushadercode" => AssetClass::ShaderArchive,
            ext if TEXT_EXTENSIONS.contains(&ext) => AssetClass::Text,
            _ => AssetClass::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContentKind {
    Document,
    Image,
    Preview,
    Audio,
    Binary,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// A short user-facing outcome line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub level: Level,
    pub text: String,
}

impl Message {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: Level::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            text: text.into(),
        }
    }
}

/// Secondary output of a dispatch, such as a sound pulled out of a bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Virtual path without extension
    pub name: String,
    pub format: String,
    pub data: Vec<u8>,
}

impl Artifact {
    pub fn extension(&self) -> String {
        self.format.to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Text,
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub path: String,
    pub kind: ContentKind,
    pub document: Option<String>,
    pub document_format: DocumentFormat,
    pub image: Option<RgbaImage>,
    /// Sampling hint for pixel-art textures
    pub nearest_neighbor: bool,
    pub artifacts: Vec<Artifact>,
    /// Files written to disk while dispatching
    pub saved: Vec<PathBuf>,
    pub messages: Vec<Message>,
}

impl DispatchResult {
    fn new(path: &str, kind: ContentKind) -> Self {
        Self {
            path: path.to_string(),
            kind,
            document: None,
            document_format: DocumentFormat::Json,
            image: None,
            nearest_neighbor: false,
            artifacts: Vec::new(),
            saved: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Result of a dispatch that failed before producing content
    pub fn failed(path: &str, reason: impl Into<String>) -> Self {
        let mut result = Self::new(path, ContentKind::Unknown);
        result.messages.push(Message::error(reason));
        result
    }
}

/// Preferences consulted while dispatching
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub output_directory: PathBuf,
    pub model_directory: PathBuf,
    pub keep_directory_structure: bool,
    pub auto_open_sounds: bool,
    pub audio_mode: AudioMode,
    pub preview_static_meshes: bool,
    pub preview_skeletal_meshes: bool,
    pub preview_materials: bool,
    /// The model viewer is replacing a material rather than opening one
    pub overwrite_material: bool,
    pub save_static_meshes: bool,
    pub save_skeletal_meshes: bool,
    pub save_materials: bool,
    pub save_skeletons: bool,
    pub save_animations: bool,
    pub material_preview_exclusions: Vec<String>,
}

impl DispatchOptions {
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            output_directory: settings.output_directory.clone(),
            model_directory: settings.model_directory.clone(),
            keep_directory_structure: settings.keep_directory_structure,
            auto_open_sounds: settings.is_auto_open_sounds,
            audio_mode: settings.compressed_audio_mode,
            preview_static_meshes: settings.preview_static_meshes,
            preview_skeletal_meshes: settings.preview_skeletal_meshes,
            preview_materials: settings.preview_materials,
            overwrite_material: false,
            save_static_meshes: settings.save_static_meshes,
            save_skeletal_meshes: settings.save_skeletal_meshes,
            save_materials: settings.save_materials,
            save_skeletons: settings.save_skeletons,
            save_animations: settings.save_animations,
            material_preview_exclusions: settings.material_preview_exclusions.clone(),
        }
    }

    /// Whether a material instance lives in one of the excluded owner
    /// directories, compared case-insensitively as `/<dir>/<export name>`
    pub fn is_excluded_material(&self, export: &Export) -> bool {
        let Some(owner) = &export.owner else {
            return false;
        };
        let owner = owner.to_lowercase();
        self.material_preview_exclusions.iter().any(|dir| {
            owner.ends_with(&format!("/{}/{}", dir, export.name).to_lowercase())
        })
    }

    fn previews(&self, export: &Export) -> bool {
        match export.kind() {
            ExportKind::StaticMesh => self.preview_static_meshes,
            ExportKind::SkeletalMesh => self.preview_skeletal_meshes,
            ExportKind::MaterialInstance => {
                self.preview_materials
                    && !self.overwrite_material
                    && !self.is_excluded_material(export)
            }
            _ => false,
        }
    }

    fn saves(&self, export: &Export) -> bool {
        match export.kind() {
            ExportKind::StaticMesh => self.save_static_meshes,
            ExportKind::SkeletalMesh => self.save_skeletal_meshes,
            ExportKind::MaterialInstance => self.save_materials,
            ExportKind::Skeleton => self.save_skeletons,
            ExportKind::AnimSequence => self.save_animations,
            _ => false,
        }
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from_settings(&UserSettings::default())
    }
}

type Predicate = fn(&DispatchOptions, &Export) -> bool;
type Action = fn(&mut AssetDispatcher<'_>, &Export, &mut DispatchResult) -> Result<bool>;

/// One export rule; the action returns whether the export was handled
struct ExportRule {
    name: &'static str,
    applies: Predicate,
    run: Action,
}

const EXPORT_RULES: &[ExportRule] = &[
    ExportRule {
        name: "texture",
        applies: |_, export| export.kind() == ExportKind::Texture2D,
        run: |dispatcher, export, result| dispatcher.show_texture(export, result),
    },
    ExportRule {
        name: "sound",
        applies: |_, export| {
            matches!(
                export.kind(),
                ExportKind::SoundWave | ExportKind::AkMediaAssetData
            )
        },
        run: |dispatcher, export, result| dispatcher.emit_sound(export, result),
    },
    ExportRule {
        name: "preview",
        applies: |options, export| options.previews(export),
        run: |dispatcher, export, result| dispatcher.preview_model(export, result),
    },
    ExportRule {
        name: "overwrite material",
        applies: |options, export| {
            export.kind() == ExportKind::MaterialInstance && options.overwrite_material
        },
        run: |dispatcher, export, result| dispatcher.overwrite_material(export, result),
    },
    ExportRule {
        name: "save",
        applies: |options, export| options.saves(export),
        run: |dispatcher, export, result| dispatcher.save_export(export, result),
    },
    ExportRule {
        name: "creator",
        applies: |_, _| true,
        run: |dispatcher, export, result| dispatcher.draw_info_card(export, result),
    },
];

/// Decode text the way a byte-order-mark aware reader would
fn decode_text(data: &[u8]) -> String {
    let utf16 = |bytes: &[u8], le: bool| {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| {
                if le {
                    u16::from_le_bytes([c[0], c[1]])
                } else {
                    u16::from_be_bytes([c[0], c[1]])
                }
            })
            .collect();
        String::from_utf16_lossy(&units)
    };

    match data {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        [0xFF, 0xFE, rest @ ..] => utf16(rest, true),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, false),
        _ => String::from_utf8_lossy(data).into_owned(),
    }
}

/// Directory part of a virtual path including the trailing slash
fn directory_with_slash(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..=pos],
        None => "",
    }
}

fn wwise_artifacts(path: &str, media: Vec<WwiseMedia>) -> Vec<Artifact> {
    let dir = directory_with_slash(path);
    media
        .into_iter()
        .map(|m| Artifact {
            name: format!("{}{}", dir, strip_extension(&m.name)),
            format: WEM_FORMAT.to_string(),
            data: m.data,
        })
        .collect()
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    Ok(())
}

pub struct AssetDispatcher<'a> {
    engine: &'a mut dyn ArchiveEngine,
    surface: &'a mut dyn PresentationSurface,
    options: &'a DispatchOptions,
}

impl<'a> AssetDispatcher<'a> {
    pub fn new(
        engine: &'a mut dyn ArchiveEngine,
        surface: &'a mut dyn PresentationSurface,
        options: &'a DispatchOptions,
    ) -> Self {
        Self {
            engine,
            surface,
            options,
        }
    }

    /// Decode `path` and route it to its viewer.
    ///
    /// With `bulk_save`, documents are written under `<output>/Saved`
    /// and package exports are not walked.
    pub fn dispatch(&mut self, path: &str, bulk_save: bool) -> Result<DispatchResult> {
        let class = AssetClass::of(path);
        let name = file_name(path);
        debug!(path, ?class, "Dispatching");

        let mut result = match class {
            AssetClass::Package => {
                let exports = self.engine.load_exports(path)?;
                let mut result = DispatchResult::new(path, ContentKind::Document);
                result.document = Some(exports_to_json(&exports)?);
                if !bulk_save {
                    self.walk_exports(&exports, &mut result)?;
                }
                result
            }
            AssetClass::Text => {
                let data = self.engine.read_raw(path)?;
                let mut result = DispatchResult::new(path, ContentKind::Document);
                result.document = Some(decode_text(&data));
                result.document_format = DocumentFormat::Text;
                result
            }
            AssetClass::LocMeta => {
                let data = self.engine.read_raw(path)?;
                self.document(path, &LocMeta::parse(&data)?)?
            }
            AssetClass::LocRes => {
                let data = self.engine.read_raw(path)?;
                self.document(path, &LocRes::parse(&data)?)?
            }
            AssetClass::AssetRegistry => {
                let data = self.engine.read_raw(path)?;
                self.document(path, &AssetRegistryHeader::parse(&data)?)?
            }
            AssetClass::SoundBank => {
                let data = self.engine.read_raw(path)?;
                let bank = WwiseBank::parse(&data)?;
                let mut result = self.document(path, &bank)?;
                for artifact in wwise_artifacts(path, bank.media) {
                    self.save_and_play_sound(artifact, &mut result)?;
                }
                result
            }
            AssetClass::SoundPackage => {
                let data = self.engine.read_raw(path)?;
                let package = WwisePackage::parse(&data)?;
                let mut result = self.document(path, &package)?;
                for artifact in wwise_artifacts(path, package.media) {
                    self.save_and_play_sound(artifact, &mut result)?;
                }
                result
            }
            AssetClass::WwiseMedia => {
                let data = self.engine.read_raw(path)?;
                let mut result = DispatchResult::new(path, ContentKind::Audio);
                let artifact = Artifact {
                    name: strip_extension(path).to_string(),
                    format: WEM_FORMAT.to_string(),
                    data,
                };
                self.save_and_play_sound(artifact, &mut result)?;
                result
            }
            AssetClass::OodleDictionary => {
                let data = self.engine.read_raw(path)?;
                self.document(path, &OodleDictionaryHeader::parse(&data)?)?
            }
            AssetClass::Image => {
                let data = self.engine.read_raw(path)?;
                let mut result = DispatchResult::new(path, ContentKind::Image);
                result.image = Some(decode_image(&data)?);
                result
            }
            AssetClass::Svg => {
                let data = self.engine.read_raw(path)?;
                let mut result = DispatchResult::new(path, ContentKind::Image);
                result.image = Some(rasterize_svg(&data)?);
                result
            }
            AssetClass::Font => {
                let mut result = DispatchResult::new(path, ContentKind::Unknown);
                let text = format!(
                    "Export '{}' raw data and change its extension if you want it to be an installable font file",
                    name
                );
                warn!("{}", text);
                result.messages.push(Message::warning(text));
                result
            }
            AssetClass::ShaderArchive => {
                let data = self.engine.read_raw(path)?;
                self.document(path, &ShaderArchive::parse(&data)?)?
            }
            AssetClass::Unknown => {
                let mut result = DispatchResult::new(path, ContentKind::Unknown);
                let text = format!("The package '{}' is of an unknown type.", name);
                warn!("{}", text);
                result.messages.push(Message::warning(text));
                result
            }
        };

        if bulk_save {
            self.save_document(&mut result)?;
        }
        Ok(result)
    }

    fn document<T: Serialize>(&self, path: &str, value: &T) -> Result<DispatchResult> {
        let mut result = DispatchResult::new(path, ContentKind::Document);
        result.document = Some(serde_json::to_string_pretty(value)?);
        Ok(result)
    }

    fn walk_exports(&mut self, exports: &[Export], result: &mut DispatchResult) -> Result<()> {
        for export in exports {
            let Some(rule) = EXPORT_RULES
                .iter()
                .find(|rule| (rule.applies)(self.options, export))
            else {
                continue;
            };

            let handled = (rule.run)(self, export, result)?;
            debug!(export = %export.name, rule = rule.name, handled, "Export rule ran");
            if handled {
                break;
            }
        }
        Ok(())
    }

    fn show_texture(&mut self, export: &Export, result: &mut DispatchResult) -> Result<bool> {
        let texture = decode_texture(export)?;
        result.kind = ContentKind::Image;
        result.image = Some(texture.image);
        result.nearest_neighbor = texture.nearest_neighbor;
        Ok(true)
    }

    /// Sounds never stop the walk; later exports may still preview
    fn emit_sound(&mut self, export: &Export, result: &mut DispatchResult) -> Result<bool> {
        let sound = decode_sound(export, self.options.audio_mode.prefers_compressed())?;
        let (Some(format), Some(data)) = (sound.format, sound.data) else {
            return Ok(false);
        };
        if export.owner.is_none() {
            return Ok(false);
        }

        result.kind = ContentKind::Audio;
        let artifact = Artifact {
            name: strip_extension(&result.path).to_string(),
            format,
            data,
        };
        self.save_and_play_sound(artifact, result)?;
        Ok(false)
    }

    fn preview_model(&mut self, export: &Export, result: &mut DispatchResult) -> Result<bool> {
        self.surface.load_model(export)?;
        result.kind = ContentKind::Preview;
        Ok(true)
    }

    fn overwrite_material(&mut self, export: &Export, result: &mut DispatchResult) -> Result<bool> {
        self.surface.overwrite_material(export)?;
        result.kind = ContentKind::Preview;
        Ok(true)
    }

    /// Write the export next to its owning package under the model directory
    fn save_export(&mut self, export: &Export, result: &mut DispatchResult) -> Result<bool> {
        let package = export
            .owner
            .as_deref()
            .unwrap_or_else(|| strip_extension(&result.path));
        let relative = format!("{}{}.json", directory_with_slash(package), export.name);
        let target = output_path(
            &self.options.model_directory,
            &relative,
            self.options.keep_directory_structure,
        );

        let written = serde_json::to_vec_pretty(export)
            .map_err(Error::from)
            .and_then(|json| write_file(&target, &json));
        let saved_name = file_name(&relative);
        match written {
            Ok(()) => {
                info!(path = %target.display(), "Successfully saved {}", saved_name);
                result
                    .messages
                    .push(Message::info(format!("Successfully saved {}", saved_name)));
                result.saved.push(target);
                result.kind = ContentKind::Binary;
            }
            Err(e) => {
                error!(path = %target.display(), "{} could not be saved: {}", saved_name, e);
                result
                    .messages
                    .push(Message::error(format!("Could not save '{}'", saved_name)));
            }
        }
        Ok(true)
    }

    fn draw_info_card(&mut self, export: &Export, result: &mut DispatchResult) -> Result<bool> {
        let Some(card) = InfoCard::for_export(export) else {
            return Ok(false);
        };
        result.kind = ContentKind::Image;
        result.image = Some(card.render());
        Ok(true)
    }

    /// Write a sound under `<output>/Sounds`, or hand it to the audio
    /// surface when sounds open automatically
    fn save_and_play_sound(&mut self, artifact: Artifact, result: &mut DispatchResult) -> Result<()> {
        if self.options.auto_open_sounds {
            self.surface.play_audio(&artifact)?;
        } else {
            let relative = format!("{}.{}", artifact.name, artifact.extension());
            let target = output_path(
                &self.options.output_directory.join("Sounds"),
                &relative,
                self.options.keep_directory_structure,
            );
            write_file(&target, &artifact.data)?;
            debug!(path = %target.display(), "Saved sound");
            result.saved.push(target);
        }
        result.artifacts.push(artifact);
        Ok(())
    }

    fn save_document(&self, result: &mut DispatchResult) -> Result<()> {
        let Some(document) = &result.document else {
            return Ok(());
        };
        let relative = match result.document_format {
            DocumentFormat::Json => format!("{}.json", strip_extension(&result.path)),
            DocumentFormat::Text => result.path.clone(),
        };
        let target = output_path(
            &self.options.output_directory.join("Saved"),
            &relative,
            self.options.keep_directory_structure,
        );
        write_file(&target, document.as_bytes())?;
        info!(path = %target.display(), "Saved document");
        result.saved.push(target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::wwise::tests::sample_bank;
    use crate::provider::tests::MemoryEngine;
    use crate::surface::tests::{RecordingSurface, SurfaceCall};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde_json::json;

    fn package(exports: &[Export]) -> Vec<u8> {
        serde_json::to_vec(exports).unwrap()
    }

    fn texture() -> Export {
        Export::new("Texture2D", "T_Rock")
            .with_property("SizeX", 1)
            .with_property("SizeY", 1)
            .with_property("PixelFormat", "PF_R8G8B8A8")
            .with_property("bRenderNearestNeighbor", true)
            .with_property("Data", STANDARD.encode([1u8, 2, 3, 4]))
    }

    fn options(dir: &Path) -> DispatchOptions {
        DispatchOptions {
            output_directory: dir.join("Output"),
            model_directory: dir.join("Models"),
            ..DispatchOptions::default()
        }
    }

    fn run(
        engine: &mut MemoryEngine,
        options: &DispatchOptions,
        path: &str,
    ) -> (Result<DispatchResult>, RecordingSurface) {
        let mut surface = RecordingSurface::default();
        let result = AssetDispatcher::new(engine, &mut surface, options).dispatch(path, false);
        (result, surface)
    }

    #[test]
    fn test_classification_is_total() {
        let cases = [
            ("Game/A.uasset", AssetClass::Package),
            ("Game/Maps/A.UMAP", AssetClass::Package),
            ("Game/Config/DefaultGame.ini", AssetClass::Text),
            ("Game/Game.uproject", AssetClass::Text),
            ("Game/Localization/en/Game.locres", AssetClass::LocRes),
            ("Game/Localization/Game.locmeta", AssetClass::LocMeta),
            ("Game/AssetRegistry.bin", AssetClass::AssetRegistry),
            ("Game/Other.bin", AssetClass::Unknown),
            ("Game/WwiseAudio/Init.bnk", AssetClass::SoundBank),
            ("Game/WwiseAudio/sfx.pck", AssetClass::SoundPackage),
            ("Game/WwiseAudio/1.wem", AssetClass::WwiseMedia),
            ("Game/Oodle.udic", AssetClass::OodleDictionary),
            ("Game/a.png", AssetClass::Image),
            ("Game/a.svg", AssetClass::Svg),
            ("Game/Fonts/a.ttf", AssetClass::Font),
            ("Game/ShaderArchive-Global.ushaderbytecode", AssetClass::ShaderArchive),
            ("Game/README", AssetClass::Unknown),
            ("", AssetClass::Unknown),
        ];
        for (path, class) in cases {
            assert_eq!(AssetClass::of(path), class, "{}", path);
            assert_eq!(AssetClass::of(path), AssetClass::of(path));
        }
    }

    #[test]
    fn test_text_document() {
        let mut engine = MemoryEngine::with_files(&[
            ("Game/a.ini", b"[Core]\nx=1"),
            ("Game/bom.txt", b"\xEF\xBB\xBFhello"),
            ("Game/wide.txt", b"\xFF\xFEh\x00i\x00"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path());

        let (result, _) = run(&mut engine, &options, "Game/a.ini");
        let result = result.unwrap();
        assert_eq!(result.kind, ContentKind::Document);
        assert_eq!(result.document.as_deref(), Some("[Core]\nx=1"));

        let (result, _) = run(&mut engine, &options, "Game/bom.txt");
        assert_eq!(result.unwrap().document.as_deref(), Some("hello"));
        let (result, _) = run(&mut engine, &options, "Game/wide.txt");
        assert_eq!(result.unwrap().document.as_deref(), Some("hi"));
    }

    #[test]
    fn test_font_and_unknown_warn() {
        let mut engine = MemoryEngine::default();
        let options = DispatchOptions::default();

        let (result, _) = run(&mut engine, &options, "Game/Fonts/Burbank.ufont");
        let result = result.unwrap();
        assert_eq!(result.kind, ContentKind::Unknown);
        assert_eq!(result.messages[0].level, Level::Warning);
        assert!(result.messages[0].text.starts_with("Export 'Burbank.ufont' raw data"));

        let (result, _) = run(&mut engine, &options, "Game/thing.xyz");
        let result = result.unwrap();
        assert_eq!(
            result.messages,
            vec![Message::warning("The package 'thing.xyz' is of an unknown type.")]
        );
        assert!(engine.reads.is_empty());
    }

    #[test]
    fn test_rule_table_order() {
        let names: Vec<_> = EXPORT_RULES.iter().map(|rule| rule.name).collect();
        assert_eq!(
            names,
            vec!["texture", "sound", "preview", "overwrite material", "save", "creator"]
        );
    }

    #[test]
    fn test_texture_claims_package_before_save() {
        let exports = [texture(), Export::new("MaterialInstanceConstant", "MI_Rock")];
        let data = package(&exports);
        let mut engine = MemoryEngine::with_files(&[("Game/T_Rock.uasset", &data)]);
        let dir = tempfile::tempdir().unwrap();
        let mut options = options(dir.path());
        options.preview_materials = false;
        options.overwrite_material = false;
        options.save_materials = true;
        assert!(options.saves(&exports[1]));

        let (result, surface) = run(&mut engine, &options, "Game/T_Rock.uasset");
        let result = result.unwrap();
        assert_eq!(result.kind, ContentKind::Image);
        assert!(result.nearest_neighbor);
        assert_eq!(result.image.unwrap().get_pixel(0, 0).0, [1, 2, 3, 4]);
        assert!(result.saved.is_empty());
        assert!(!dir.path().join("Models").exists());
        assert!(surface.calls.is_empty());

        // The same save flag claims the package when the material comes first
        let exports = [Export::new("MaterialInstanceConstant", "MI_Rock"), texture()];
        let data = package(&exports);
        let mut engine = MemoryEngine::with_files(&[("Game/T_Rock.uasset", &data)]);
        let (result, _) = run(&mut engine, &options, "Game/T_Rock.uasset");
        let result = result.unwrap();
        assert_eq!(result.kind, ContentKind::Binary);
        assert_eq!(result.saved.len(), 1);
        assert!(result.image.is_none());
    }

    #[test]
    fn test_first_handled_export_stops_walk() {
        let exports = [
            Export::new("StaticMesh", "SM_A"),
            Export::new("SkeletalMesh", "SK_B"),
        ];
        let data = package(&exports);
        let mut engine = MemoryEngine::with_files(&[("Game/M.uasset", &data)]);
        let options = DispatchOptions::default();

        let (result, surface) = run(&mut engine, &options, "Game/M.uasset");
        assert_eq!(result.unwrap().kind, ContentKind::Preview);
        assert_eq!(surface.calls, vec![SurfaceCall::LoadModel("SM_A".to_string())]);
    }

    #[test]
    fn test_sound_is_not_handled_and_walk_continues() {
        let exports = [
            Export::new("SoundWave", "Boom")
                .with_owner("/Game/Sounds/Boom")
                .with_property("Format", "OGG")
                .with_property("Data", STANDARD.encode(b"OggS")),
            Export::new("StaticMesh", "SM_A"),
        ];
        let data = package(&exports);
        let mut engine = MemoryEngine::with_files(&[("Game/Sounds/Boom.uasset", &data)]);
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path());

        let (result, surface) = run(&mut engine, &options, "Game/Sounds/Boom.uasset");
        let result = result.unwrap();
        assert_eq!(result.artifacts.len(), 1);
        assert_eq!(result.artifacts[0].name, "Game/Sounds/Boom");
        assert_eq!(result.artifacts[0].format, "OGG");
        assert_eq!(surface.calls, vec![SurfaceCall::LoadModel("SM_A".to_string())]);

        let saved = dir
            .path()
            .join("Output")
            .join("Sounds")
            .join("Game")
            .join("Sounds")
            .join("Boom.ogg");
        assert_eq!(fs::read(&saved).unwrap(), b"OggS");
    }

    #[test]
    fn test_sound_without_owner_or_data_is_skipped() {
        let exports = [
            Export::new("SoundWave", "NoOwner")
                .with_property("Format", "OGG")
                .with_property("Data", STANDARD.encode(b"OggS")),
            Export::new("AkMediaAssetData", "Empty").with_owner("/Game/Empty"),
        ];
        let data = package(&exports);
        let mut engine = MemoryEngine::with_files(&[("Game/S.uasset", &data)]);
        let options = DispatchOptions::default();

        let (result, surface) = run(&mut engine, &options, "Game/S.uasset");
        let result = result.unwrap();
        assert!(result.artifacts.is_empty());
        assert_eq!(result.kind, ContentKind::Document);
        assert!(surface.calls.is_empty());
    }

    #[test]
    fn test_auto_open_sounds_use_audio_surface() {
        let mut engine = MemoryEngine::with_files(&[("Game/Audio/42.wem", b"RIFF")]);
        let dir = tempfile::tempdir().unwrap();
        let mut options = options(dir.path());
        options.auto_open_sounds = true;

        let (result, surface) = run(&mut engine, &options, "Game/Audio/42.wem");
        let result = result.unwrap();
        assert_eq!(result.kind, ContentKind::Audio);
        assert!(result.saved.is_empty());
        assert_eq!(surface.calls, vec![SurfaceCall::PlayAudio("Game/Audio/42".to_string())]);
        assert!(!dir.path().join("Output").exists());
    }

    #[test]
    fn test_sound_bank_emits_wem_artifacts() {
        let bank = sample_bank();
        let mut engine = MemoryEngine::with_files(&[("Game/Wwise/Init.bnk", &bank)]);
        let dir = tempfile::tempdir().unwrap();
        let mut options = options(dir.path());
        options.keep_directory_structure = false;

        let (result, _) = run(&mut engine, &options, "Game/Wwise/Init.bnk");
        let result = result.unwrap();
        assert_eq!(result.kind, ContentKind::Document);
        let names: Vec<&str> = result.artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Game/Wwise/1001", "Game/Wwise/1002"]);
        assert!(result.artifacts.iter().all(|a| a.format == WEM_FORMAT));
        let flat = dir.path().join("Output").join("Sounds").join("1001.wem");
        assert_eq!(fs::read(flat).unwrap(), b"RIFF");
    }

    #[test]
    fn test_material_preview_exclusions() {
        let excluded = Export::new("MaterialInstanceConstant", "MI_Offer")
            .with_owner("/Game/UI/mi_offerimages/MI_Offer");
        let regular =
            Export::new("MaterialInstanceConstant", "MI_Rock").with_owner("/Game/Env/MI_Rock");
        let options = DispatchOptions::default();
        assert!(options.is_excluded_material(&excluded));
        assert!(!options.is_excluded_material(&regular));

        let data = package(&[excluded.clone()]);
        let mut engine = MemoryEngine::with_files(&[("Game/UI/MI_Offer.uasset", &data)]);
        let (result, surface) = run(&mut engine, &options, "Game/UI/MI_Offer.uasset");
        assert_eq!(result.unwrap().kind, ContentKind::Document);
        assert!(surface.calls.is_empty());
    }

    #[test]
    fn test_overwrite_material_mode() {
        let data = package(&[
            Export::new("MaterialInstanceConstant", "MI_Rock").with_owner("/Game/Env/MI_Rock")
        ]);
        let mut engine = MemoryEngine::with_files(&[("Game/Env/MI_Rock.uasset", &data)]);
        let mut options = DispatchOptions::default();
        options.overwrite_material = true;

        let (result, surface) = run(&mut engine, &options, "Game/Env/MI_Rock.uasset");
        assert_eq!(result.unwrap().kind, ContentKind::Preview);
        assert_eq!(
            surface.calls,
            vec![SurfaceCall::OverwriteMaterial("MI_Rock".to_string())]
        );
    }

    #[test]
    fn test_save_rule_writes_export() {
        let data = package(&[Export::new("AnimSequence", "Run").with_owner("/Game/Anims/Run")]);
        let mut engine = MemoryEngine::with_files(&[("Game/Anims/Run.uasset", &data)]);
        let dir = tempfile::tempdir().unwrap();
        let mut options = options(dir.path());
        options.save_animations = true;

        let (result, _) = run(&mut engine, &options, "Game/Anims/Run.uasset");
        let result = result.unwrap();
        assert_eq!(result.kind, ContentKind::Binary);
        let target = dir.path().join("Models").join("Game").join("Anims").join("Run.json");
        assert_eq!(result.saved, vec![target.clone()]);
        assert_eq!(result.messages, vec![Message::info("Successfully saved Run.json")]);
        let saved: Export = serde_json::from_slice(&fs::read(target).unwrap()).unwrap();
        assert_eq!(saved.name, "Run");
    }

    #[test]
    fn test_creator_fallback() {
        let data = package(&[
            Export::new("Blueprint", "BP"),
            Export::new("AthenaPickaxeItemDefinition", "Pick")
                .with_property("DisplayName", "Pick")
                .with_property("Rarity", json!("EFortRarity::Rare")),
        ]);
        let mut engine = MemoryEngine::with_files(&[("Game/Items/Pick.uasset", &data)]);
        let options = DispatchOptions::default();

        let (result, _) = run(&mut engine, &options, "Game/Items/Pick.uasset");
        let result = result.unwrap();
        assert_eq!(result.kind, ContentKind::Image);
        assert_eq!(result.image.unwrap().width(), crate::creator::CARD_SIZE);
    }

    #[test]
    fn test_bulk_save_writes_documents_and_skips_exports() {
        let data = package(&[texture()]);
        let mut engine = MemoryEngine::with_files(&[
            ("Game/T_Rock.uasset", &data),
            ("Game/Config/a.ini", b"x=1"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path());
        let mut surface = RecordingSurface::default();
        let mut dispatcher = AssetDispatcher::new(&mut engine, &mut surface, &options);

        let result = dispatcher.dispatch("Game/T_Rock.uasset", true).unwrap();
        assert_eq!(result.kind, ContentKind::Document);
        assert!(result.image.is_none());
        let saved = dir.path().join("Output").join("Saved").join("Game").join("T_Rock.json");
        assert_eq!(result.saved, vec![saved.clone()]);
        assert!(fs::read_to_string(saved).unwrap().contains("T_Rock"));

        let result = dispatcher.dispatch("Game/Config/a.ini", true).unwrap();
        let saved = dir
            .path()
            .join("Output")
            .join("Saved")
            .join("Game")
            .join("Config")
            .join("a.ini");
        assert_eq!(fs::read(&saved).unwrap(), b"x=1");
        assert_eq!(result.saved, vec![saved]);
    }

    #[test]
    fn test_corrupt_package_is_an_error() {
        let mut engine = MemoryEngine::with_files(&[("Game/Bad.uasset", b"\x00\x01")]);
        let options = DispatchOptions::default();
        let (result, _) = run(&mut engine, &options, "Game/Bad.uasset");
        assert!(result.is_err());
    }
}
