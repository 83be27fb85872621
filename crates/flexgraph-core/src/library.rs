//! # Content Library
//!
//! Registry of image assets, output buffers and palettes, plus the focus
//! pointer. Each entry bridges a string id to an engine-numeric id.
//!
//! The library only stores records. Operations that also touch the engine
//! or the graph (registration, cascading removal) live on `Session`.

use crate::node::PixelFormat;
use crate::primitives::{MAX_DIMENSION, PALETTE_CAPACITY, RGBA_BYTES};
use crate::{ContentId, EngineImageId, FlexError, PaletteId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// CONTENT ITEMS
// =============================================================================

/// Whether an entry is an importable image or a renderable output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentKind {
    Image,
    Output,
}

impl ContentKind {
    #[must_use]
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::Image => "img",
            Self::Output => "out",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// A content library entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: ContentId,
    pub kind: ContentKind,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub engine_image_id: EngineImageId,
    /// RGBA8 pixels. Empty after a restore that lost the asset.
    pub pixels: Option<Vec<u8>>,
    /// Encoding of `native_data`, when the asset was imported pre-encoded.
    pub native_format: Option<PixelFormat>,
    pub native_data: Option<Vec<u8>>,
    pub palette: Option<PaletteId>,
    pub is_nine_patch: bool,
}

impl ContentItem {
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.kind == ContentKind::Image
    }

    #[must_use]
    pub fn is_output(&self) -> bool {
        self.kind == ContentKind::Output
    }

    /// Whether any pixel payload (RGBA or native) is held.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        self.pixels.as_ref().is_some_and(|p| !p.is_empty())
            || self.native_data.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// Byte length of an RGBA8 buffer for this item.
    #[must_use]
    pub fn rgba_len(&self) -> usize {
        rgba_len(self.width, self.height)
    }
}

/// Byte length of a `width` x `height` RGBA8 buffer.
#[must_use]
pub fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * RGBA_BYTES
}

/// Validate user-entered dimensions: positive integers up to `MAX_DIMENSION`.
pub fn parse_dimensions(width: &str, height: &str) -> Result<(u32, u32), FlexError> {
    let parse = |s: &str| -> Result<u32, FlexError> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| FlexError::InvalidDimensions(format!("'{s}' is not a positive integer")))?;
        check_dimension(value)
    };
    Ok((parse(width)?, parse(height)?))
}

/// Check one already-numeric dimension.
pub fn check_dimension(value: u32) -> Result<u32, FlexError> {
    if value == 0 || value > MAX_DIMENSION {
        return Err(FlexError::InvalidDimensions(format!(
            "{value} is outside 1..={MAX_DIMENSION}"
        )));
    }
    Ok(value)
}

// =============================================================================
// PALETTES
// =============================================================================

/// A color table used by indexed pixel formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    pub id: PaletteId,
    pub name: String,
    pub color_count: usize,
    /// `color_count` RGBA8 entries.
    pub colors: Vec<u8>,
    pub engine_image_id: EngineImageId,
}

/// Built-in palettes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PalettePreset {
    Grayscale256,
    WebSafe216,
    Basic8,
}

impl PalettePreset {
    pub const ALL: [PalettePreset; 3] = [
        PalettePreset::Grayscale256,
        PalettePreset::WebSafe216,
        PalettePreset::Basic8,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Grayscale256 => "Grayscale 256",
            Self::WebSafe216 => "Web Safe 216",
            Self::Basic8 => "8-color",
        }
    }

    /// Generate the RGBA8 color table; its length is `count * 4`.
    #[must_use]
    pub fn colors(self) -> Vec<u8> {
        let mut table = Vec::with_capacity(PALETTE_CAPACITY * RGBA_BYTES);
        match self {
            Self::Grayscale256 => {
                for i in 0..=255u8 {
                    table.extend_from_slice(&[i, i, i, 255]);
                }
            }
            Self::WebSafe216 => {
                for r in 0..6u8 {
                    for g in 0..6u8 {
                        for b in 0..6u8 {
                            table.extend_from_slice(&[r * 51, g * 51, b * 51, 255]);
                        }
                    }
                }
            }
            Self::Basic8 => {
                const BASIC: [[u8; 3]; 8] = [
                    [0, 0, 0],
                    [255, 0, 0],
                    [0, 255, 0],
                    [0, 0, 255],
                    [255, 255, 0],
                    [255, 0, 255],
                    [0, 255, 255],
                    [255, 255, 255],
                ];
                for [r, g, b] in BASIC {
                    table.extend_from_slice(&[r, g, b, 255]);
                }
            }
        }
        table
    }
}

impl FromStr for PalettePreset {
    type Err = FlexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        match key.as_str() {
            "grayscale" | "grayscale256" | "grayscale 256" => Ok(Self::Grayscale256),
            "websafe" | "websafe216" | "web safe 216" => Ok(Self::WebSafe216),
            "basic8" | "8-color" | "8color" => Ok(Self::Basic8),
            _ => Err(FlexError::PaletteNotFound(PaletteId::new(s))),
        }
    }
}

// =============================================================================
// LIBRARY
// =============================================================================

/// Exclusively owns content items and palettes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentLibrary {
    items: Vec<ContentItem>,
    palettes: Vec<Palette>,
    focus: Option<ContentId>,
}

impl ContentLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn images(&self) -> impl Iterator<Item = &ContentItem> {
        self.items.iter().filter(|c| c.is_image())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &ContentItem> {
        self.items.iter().filter(|c| c.is_output())
    }

    #[must_use]
    pub fn get(&self, id: &ContentId) -> Option<&ContentItem> {
        self.items.iter().find(|c| &c.id == id)
    }

    pub fn get_mut(&mut self, id: &ContentId) -> Option<&mut ContentItem> {
        self.items.iter_mut().find(|c| &c.id == id)
    }

    /// Look up an item and require it to be of `kind`.
    pub fn expect_kind(&self, id: &ContentId, kind: ContentKind) -> Result<&ContentItem, FlexError> {
        let item = self
            .get(id)
            .ok_or_else(|| FlexError::ContentNotFound(id.clone()))?;
        if item.kind != kind {
            return Err(FlexError::WrongContentKind {
                id: id.clone(),
                expected: match kind {
                    ContentKind::Image => "image",
                    ContentKind::Output => "output",
                },
            });
        }
        Ok(item)
    }

    /// The first image flagged as nine-patch.
    #[must_use]
    pub fn first_nine_patch(&self) -> Option<&ContentItem> {
        self.images().find(|c| c.is_nine_patch)
    }

    pub fn insert(&mut self, item: ContentItem) {
        tracing::debug!(content = %item.id, kind = %item.kind, "Registering content");
        self.items.push(item);
    }

    /// Remove an item record. Clears focus if it pointed at the item.
    pub fn take(&mut self, id: &ContentId) -> Option<ContentItem> {
        let index = self.items.iter().position(|c| &c.id == id)?;
        let item = self.items.remove(index);
        if self.focus.as_ref() == Some(id) {
            self.focus = None;
        }
        Some(item)
    }

    #[must_use]
    pub fn focus(&self) -> Option<&ContentId> {
        self.focus.as_ref()
    }

    /// Point focus at an existing item. Unknown ids clear focus.
    pub fn set_focus(&mut self, id: Option<ContentId>) {
        self.focus = id.filter(|id| self.get(id).is_some());
    }

    /// Focus the first remaining Output, or nothing.
    pub fn refocus_first_output(&mut self) {
        let first = self.outputs().next().map(|c| c.id.clone());
        self.focus = first;
    }

    #[must_use]
    pub fn palettes(&self) -> &[Palette] {
        &self.palettes
    }

    #[must_use]
    pub fn palette(&self, id: &PaletteId) -> Option<&Palette> {
        self.palettes.iter().find(|p| &p.id == id)
    }

    pub fn insert_palette(&mut self, palette: Palette) {
        tracing::debug!(palette = %palette.id, colors = palette.color_count, "Registering palette");
        self.palettes.push(palette);
    }

    pub fn take_palette(&mut self, id: &PaletteId) -> Option<Palette> {
        let index = self.palettes.iter().position(|p| &p.id == id)?;
        Some(self.palettes.remove(index))
    }

    /// Every engine image id in use, items first then palettes.
    pub fn engine_ids(&self) -> impl Iterator<Item = EngineImageId> + '_ {
        self.items
            .iter()
            .map(|c| c.engine_image_id)
            .chain(self.palettes.iter().map(|p| p.engine_image_id))
    }
}

// =============================================================================
// TESTS
// =============================================================================
