//! Info cards for item-like exports that have no dedicated viewer

use image::{Rgba, RgbaImage};
use serde_json::Value;

use crate::exports::Export;

pub const CARD_SIZE: u32 = 512;
const BORDER_WIDTH: u32 = 8;
/// Height of the darker description band at the bottom of the card
const FOOTER_HEIGHT: u32 = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rarity {
    Common,
    #[default]
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Mythic,
}

impl Rarity {
    /// Parse `Rare` or a scoped enum value like `EItemRarity::Rare`
    pub fn parse(text: &str) -> Self {
        let name = text.rsplit("::").next().unwrap_or(text);
        match name.to_ascii_lowercase().as_str() {
            "common" => Rarity::Common,
            "rare" => Rarity::Rare,
            "epic" => Rarity::Epic,
            "legendary" => Rarity::Legendary,
            "mythic" => Rarity::Mythic,
            _ => Rarity::Uncommon,
        }
    }

    /// Background gradient (top, bottom)
    fn background(self) -> ([u8; 3], [u8; 3]) {
        match self {
            Rarity::Common => ([0x6D, 0x6D, 0x6D], [0x33, 0x33, 0x33]),
            Rarity::Uncommon => ([0x5E, 0xBC, 0x36], [0x30, 0x5C, 0x15]),
            Rarity::Rare => ([0x36, 0x69, 0xBB], [0x13, 0x32, 0x54]),
            Rarity::Epic => ([0x81, 0x38, 0xC2], [0x35, 0x15, 0x5C]),
            Rarity::Legendary => ([0xC0, 0x6A, 0x38], [0x5C, 0x28, 0x14]),
            Rarity::Mythic => ([0xBA, 0x9C, 0x36], [0x59, 0x44, 0x15]),
        }
    }

    fn border(self) -> [u8; 3] {
        match self {
            Rarity::Common => [0x9E, 0x9E, 0x9E],
            Rarity::Uncommon => [0x74, 0xEF, 0x52],
            Rarity::Rare => [0x5C, 0xF2, 0xF3],
            Rarity::Epic => [0xC3, 0x59, 0xFF],
            Rarity::Legendary => [0xEC, 0x9C, 0x4D],
            Rarity::Mythic => [0xFF, 0xDB, 0x67],
        }
    }
}

/// Text of a display property: plain string or a localized text object
fn text_property(export: &Export, key: &str) -> Option<String> {
    match export.property(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => ["LocalizedString", "SourceString"]
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// Summary card for an item export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoCard {
    pub display_name: String,
    pub description: String,
    pub rarity: Rarity,
}

impl InfoCard {
    /// Build a card for `export`, or `None` when the class has no creator
    pub fn for_export(export: &Export) -> Option<Self> {
        let class = export.class.as_str();
        if !class.ends_with("ItemDefinition") && class != "CustomCharacterPart" {
            return None;
        }

        let display_name = text_property(export, "DisplayName")?;
        Some(Self {
            display_name,
            description: text_property(export, "Description").unwrap_or_default(),
            rarity: export
                .property_str("Rarity")
                .map(Rarity::parse)
                .unwrap_or_default(),
        })
    }

    pub fn render(&self) -> RgbaImage {
        let (top, bottom) = self.rarity.background();
        let border = self.rarity.border();
        let inner_end = CARD_SIZE - BORDER_WIDTH;
        let footer_start = CARD_SIZE - BORDER_WIDTH - FOOTER_HEIGHT;

        RgbaImage::from_fn(CARD_SIZE, CARD_SIZE, |x, y| {
            if x < BORDER_WIDTH || y < BORDER_WIDTH || x >= inner_end || y >= inner_end {
                return Rgba([border[0], border[1], border[2], 255]);
            }
            if y >= footer_start {
                return Rgba([0, 0, 0, 160]);
            }

            let t = (y - BORDER_WIDTH) as f32 / (footer_start - BORDER_WIDTH) as f32;
            let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
            Rgba([mix(top[0], bottom[0]), mix(top[1], bottom[1]), mix(top[2], bottom[2]), 255])
        })
    }
}
