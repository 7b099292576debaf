//! Structured package exports
//!
//! A `uasset`/`umap` package decodes to an ordered list of exports. Each
//! export has a runtime class, a name, an optional owning package path and a
//! bag of properties. Binary payloads (texture mips, sound data) are stored
//! as base64 strings.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Export {
    #[serde(rename = "Type")]
    pub class: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Owner", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(rename = "Properties", default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

/// The closed set of export classes the dispatcher treats specially
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportKind {
    Texture2D,
    SoundWave,
    AkMediaAssetData,
    StaticMesh,
    SkeletalMesh,
    MaterialInstance,
    Skeleton,
    AnimSequence,
    Other,
}

impl ExportKind {
    pub fn from_class(class: &str) -> Self {
        match class {
            // UTexture2D and its subclasses; cubes and arrays are not 2D textures
            "Texture2D" | "LightMapTexture2D" | "ShadowMapTexture2D" | "VirtualTexture2D" => {
                ExportKind::Texture2D
            }
            "SoundWave" => ExportKind::SoundWave,
            "AkMediaAssetData" => ExportKind::AkMediaAssetData,
            "StaticMesh" => ExportKind::StaticMesh,
            "SkeletalMesh" => ExportKind::SkeletalMesh,
            "MaterialInstance" | "MaterialInstanceConstant" | "MaterialInstanceDynamic" => {
                ExportKind::MaterialInstance
            }
            "Skeleton" => ExportKind::Skeleton,
            "AnimSequence" => ExportKind::AnimSequence,
            _ => ExportKind::Other,
        }
    }
}

impl Export {
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            owner: None,
            properties: Map::new(),
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> ExportKind {
        ExportKind::from_class(&self.class)
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(Value::as_str)
    }

    pub fn property_bool(&self, key: &str) -> bool {
        self.property(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn property_u32(&self, key: &str) -> Option<u32> {
        self.property(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    /// Decode a base64 property; `Ok(None)` when absent
    pub fn property_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.property_str(key) {
            None => Ok(None),
            Some(text) => STANDARD
                .decode(text)
                .map(Some)
                .map_err(|e| Error::decode("export property", format!("{}: {}", key, e))),
        }
    }
}

/// Parse a package payload into its exports
pub fn parse_package(data: &[u8]) -> Result<Vec<Export>> {
    serde_json::from_slice(data).map_err(|e| Error::decode("package", e.to_string()))
}

/// Render exports as indented JSON
pub fn exports_to_json(exports: &[Export]) -> Result<String> {
    Ok(serde_json::to_string_pretty(exports)?)
}

/// A decoded texture and its sampling hint
#[derive(Debug, Clone)]
pub struct DecodedTexture {
    pub image: RgbaImage,
    pub nearest_neighbor: bool,
}

/// Decode the first mip of a texture export
pub fn decode_texture(export: &Export) -> Result<DecodedTexture> {
    let width = export
        .property_u32("SizeX")
        .ok_or_else(|| Error::decode("texture", "missing SizeX"))?;
    let height = export
        .property_u32("SizeY")
        .ok_or_else(|| Error::decode("texture", "missing SizeY"))?;
    let format = export.property_str("PixelFormat").unwrap_or("PF_B8G8R8A8");
    let data = export
        .property_bytes("Data")?
        .ok_or_else(|| Error::decode("texture", "missing Data"))?;

    let pixels = width as usize * height as usize;
    let rgba = match format {
        "PF_B8G8R8A8" => {
            expect_len(&data, pixels * 4)?;
            data[..pixels * 4]
                .chunks_exact(4)
                .flat_map(|p| [p[2], p[1], p[0], p[3]])
                .collect()
        }
        "PF_R8G8B8A8" => {
            expect_len(&data, pixels * 4)?;
            data[..pixels * 4].to_vec()
        }
        "PF_G8" => {
            expect_len(&data, pixels)?;
            data[..pixels].iter().flat_map(|&g| [g, g, g, 255]).collect()
        }
        other => {
            return Err(Error::decode(
                "texture",
                format!("unsupported pixel format {}", other),
            ))
        }
    };

    let image = RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| Error::decode("texture", "pixel buffer size mismatch"))?;

    Ok(DecodedTexture {
        image,
        nearest_neighbor: export.property_bool("bRenderNearestNeighbor"),
    })
}

fn expect_len(data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(Error::decode(
            "texture",
            format!("expected {} bytes of pixel data, got {}", expected, data.len()),
        ));
    }
    Ok(())
}

/// Decoded sound payload; either part may be missing
#[derive(Debug, Clone, Default)]
pub struct DecodedSound {
    pub format: Option<String>,
    pub data: Option<Vec<u8>>,
}

/// Extract the playable payload of a sound export.
///
/// With `prefer_compressed`, the still-compressed stream is returned when
/// present. Media asset data is always Wwise media.
pub fn decode_sound(export: &Export, prefer_compressed: bool) -> Result<DecodedSound> {
    let format = match export.kind() {
        ExportKind::AkMediaAssetData => Some(
            export
                .property_str("Format")
                .unwrap_or("WEM")
                .to_string(),
        ),
        _ => export.property_str("Format").map(str::to_string),
    };

    let data = if prefer_compressed {
        match export.property_bytes("CompressedData")? {
            Some(data) => Some(data),
            None => export.property_bytes("Data")?,
        }
    } else {
        export.property_bytes("Data")?
    };

    Ok(DecodedSound {
        format: format.filter(|f| !f.is_empty()),
        data: data.filter(|d| !d.is_empty()),
    })
}
