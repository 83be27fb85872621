//! # Snapshot Schema
//!
//! The versioned `PersistedState` record both storage tiers carry.
//!
//! - Durable: every record complete, binary payloads embedded as base64.
//! - Shareable: content records stripped to id, kind, name, dimensions and
//!   engine id; everything else identical.

use crate::graph::Connection;
use crate::ids::{IdAllocator, Namespace};
use crate::library::{ContentItem, ContentKind, Palette};
use crate::node::{GraphNode, PixelFormat};
use crate::primitives::STATE_VERSION;
use crate::session::{CanvasSettings, Session, TileSettings};
use crate::{ContentId, EngineImageId, PaletteId};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn is_false(b: &bool) -> bool {
    !*b
}

// =============================================================================
// RECORDS
// =============================================================================

/// One content library entry as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub id: ContentId,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub engine_image_id: EngineImageId,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_nine_patch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_format: Option<PixelFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette_id: Option<PaletteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_data_base64: Option<String>,
    /// RGBA8 pixels. Only Image items carry them; Outputs are regenerated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixels_base64: Option<String>,
}

impl ContentRecord {
    fn from_item(item: &ContentItem) -> Self {
        let pixels_base64 = match item.kind {
            ContentKind::Image => item
                .pixels
                .as_ref()
                .filter(|p| !p.is_empty())
                .map(|p| STANDARD.encode(p)),
            ContentKind::Output => None,
        };
        Self {
            id: item.id.clone(),
            kind: item.kind,
            name: item.name.clone(),
            width: item.width,
            height: item.height,
            engine_image_id: item.engine_image_id,
            is_nine_patch: item.is_nine_patch,
            native_format: item.native_format,
            palette_id: item.palette.clone(),
            native_data_base64: item.native_data.as_ref().map(|d| STANDARD.encode(d)),
            pixels_base64,
        }
    }

    /// Whether this record embeds any pixel payload.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        self.pixels_base64.is_some() || self.native_data_base64.is_some()
    }

    /// Identifying metadata only.
    #[must_use]
    pub fn stripped(&self) -> Self {
        Self {
            id: self.id.clone(),
            kind: self.kind,
            name: self.name.clone(),
            width: self.width,
            height: self.height,
            engine_image_id: self.engine_image_id,
            is_nine_patch: false,
            native_format: None,
            palette_id: None,
            native_data_base64: None,
            pixels_base64: None,
        }
    }

    /// Fill payload and encoding fields from a durable record of the same id.
    pub fn merge_payload_from(&mut self, durable: &Self) {
        self.pixels_base64.clone_from(&durable.pixels_base64);
        self.native_data_base64.clone_from(&durable.native_data_base64);
        self.native_format = self.native_format.or(durable.native_format);
        if self.palette_id.is_none() {
            self.palette_id.clone_from(&durable.palette_id);
        }
        self.is_nine_patch |= durable.is_nine_patch;
    }
}

/// One palette as persisted. Palettes are small and travel in both tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteRecord {
    pub id: PaletteId,
    pub name: String,
    pub color_count: usize,
    pub engine_image_id: EngineImageId,
    pub rgba8_data_base64: String,
}

impl PaletteRecord {
    fn from_palette(palette: &Palette) -> Self {
        Self {
            id: palette.id.clone(),
            name: palette.name.clone(),
            color_count: palette.color_count,
            engine_image_id: palette.engine_image_id,
            rgba8_data_base64: STANDARD.encode(&palette.colors),
        }
    }
}

/// Allocator counters, one field per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NextIds {
    pub content: u64,
    pub engine_image: u64,
    pub palette: u64,
    pub source_node: u64,
    pub filter_node: u64,
    pub composite_node: u64,
    pub matte_node: u64,
    pub distributor_node: u64,
    pub affine_node: u64,
    pub nine_patch_node: u64,
    pub sink_node: u64,
}

impl NextIds {
    fn slot(&mut self, ns: Namespace) -> &mut u64 {
        match ns {
            Namespace::Content => &mut self.content,
            Namespace::EngineImage => &mut self.engine_image,
            Namespace::Palette => &mut self.palette,
            Namespace::SourceNode => &mut self.source_node,
            Namespace::FilterNode => &mut self.filter_node,
            Namespace::CompositeNode => &mut self.composite_node,
            Namespace::MatteNode => &mut self.matte_node,
            Namespace::DistributorNode => &mut self.distributor_node,
            Namespace::AffineNode => &mut self.affine_node,
            Namespace::NinePatchNode => &mut self.nine_patch_node,
            Namespace::SinkNode => &mut self.sink_node,
        }
    }

    #[must_use]
    pub fn from_allocator(ids: &IdAllocator) -> Self {
        let mut next = Self::default();
        for (ns, value) in ids.counters() {
            *next.slot(ns) = value;
        }
        next
    }

    #[must_use]
    pub fn to_counters(mut self) -> BTreeMap<Namespace, u64> {
        Namespace::ALL
            .iter()
            .map(|&ns| (ns, *self.slot(ns)))
            .collect()
    }
}

// =============================================================================
// PERSISTED STATE
// =============================================================================

/// A full editor snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub version: u32,
    #[serde(rename = "timestamp")]
    pub saved_at: u64,
    pub canvas: CanvasSettings,
    #[serde(default)]
    pub tile: TileSettings,
    pub content_library: Vec<ContentRecord>,
    #[serde(default)]
    pub focused_content_id: Option<ContentId>,
    pub nodes: Vec<GraphNode>,
    pub connections: Vec<Connection>,
    pub next_ids: NextIds,
    #[serde(default)]
    pub palette_library: Vec<PaletteRecord>,
}

impl PersistedState {
    /// Capture the durable form of `session`, stamped `saved_at` (ms).
    #[must_use]
    pub fn capture(session: &Session, saved_at: u64) -> Self {
        let library = session.library();
        Self {
            version: STATE_VERSION,
            saved_at,
            canvas: *session.canvas(),
            tile: *session.tile(),
            content_library: library.items().iter().map(ContentRecord::from_item).collect(),
            focused_content_id: library.focus().cloned(),
            nodes: session.graph().nodes().to_vec(),
            connections: session.graph().connections().to_vec(),
            next_ids: NextIds::from_allocator(session.ids()),
            palette_library: library
                .palettes()
                .iter()
                .map(PaletteRecord::from_palette)
                .collect(),
        }
    }

    /// The shareable form: content payloads stripped.
    #[must_use]
    pub fn shareable(&self) -> Self {
        Self {
            content_library: self
                .content_library
                .iter()
                .map(ContentRecord::stripped)
                .collect(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn record(&self, id: &ContentId) -> Option<&ContentRecord> {
        self.content_library.iter().find(|r| &r.id == id)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HeadlessEngine;
    use crate::library::rgba_len;

    fn session_with_image() -> Session {
        let mut s = Session::new(Box::new(HeadlessEngine::new()));
        s.add_image("pic", 2, 2, vec![7; rgba_len(2, 2)], true)
            .expect("image");
        s
    }

    #[test]
    fn capture_embeds_image_pixels_only() {
        let s = session_with_image();
        let state = PersistedState::capture(&s, 42);
        assert_eq!(state.version, STATE_VERSION);
        let img = state.record(&ContentId::new("img-3")).expect("image record");
        assert!(img.pixels_base64.is_some());
        assert!(img.is_nine_patch);
        let out = state.record(&ContentId::new("out-1")).expect("output record");
        assert!(!out.has_payload());
        assert_eq!(state.next_ids.content, 4);
        assert_eq!(state.next_ids.engine_image, 4);
    }

    #[test]
    fn shareable_strips_payloads() {
        let s = session_with_image();
        let share = PersistedState::capture(&s, 1).shareable();
        assert!(share.content_library.iter().all(|r| !r.has_payload()));
        assert!(share.content_library.iter().all(|r| !r.is_nine_patch));
        assert_eq!(share.nodes.len(), 1);

        let json = serde_json::to_value(&share.content_library[2]).expect("json");
        let keys: Vec<_> = json.as_object().expect("object").keys().cloned().collect();
        assert_eq!(keys, ["id", "type", "name", "width", "height", "engineImageId"]);
    }

    #[test]
    fn merge_restores_payload_fields() {
        let s = session_with_image();
        let durable = PersistedState::capture(&s, 1);
        let full = durable.record(&ContentId::new("img-3")).expect("record");
        let mut stripped = full.stripped();
        stripped.merge_payload_from(full);
        assert_eq!(&stripped, full);
    }

    #[test]
    fn next_ids_round_trip_through_counters() {
        let mut ids = IdAllocator::new();
        ids.observe(Namespace::MatteNode, 4);
        let next = NextIds::from_allocator(&ids);
        assert_eq!(next.matte_node, 5);
        let back = IdAllocator::from_counters(&next.to_counters());
        assert_eq!(back.peek(Namespace::MatteNode), 5);
    }
}
