//! # Session
//!
//! The explicitly constructed state object of one editor lifetime: id
//! allocator, content library, graph store, canvas settings and the engine
//! handle. Every mutation goes through a `Session` method, and no method
//! returns with a violated invariant (port cardinality, Renderer
//! existence, Sink-to-Output reference).
//!
//! ## Requests
//!
//! Mutations never schedule work themselves. They record a save and/or
//! evaluate request after all cascades have completed; the driver drains
//! them with [`Session::take_requests`] and feeds its debouncer and frame
//! throttle.

use crate::bridge::{self, EvalOutcome};
use crate::engine::Engine;
use crate::graph::{Endpoint, Graph};
use crate::ids::{IdAllocator, Namespace};
use crate::library::{
    ContentItem, ContentKind, ContentLibrary, Palette, PalettePreset, check_dimension, rgba_len,
};
use crate::mutation::Topology;
use crate::node::{AffineTransform, GraphNode, NodeKind, PixelFormat};
use crate::primitives::{
    DEFAULT_OUTPUTS, DEFAULT_VIRTUAL_HEIGHT, DEFAULT_VIRTUAL_WIDTH, MAX_VIRTUAL_DIMENSION,
    RGBA_BYTES,
};
use crate::{ContentId, EngineImageId, FlexError, NodeId, PaletteId, Point, PortId};
use serde::{Deserialize, Serialize};

// =============================================================================
// SETTINGS
// =============================================================================

/// Renderer-facing canvas settings plus the preview view state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSettings {
    pub width: u32,
    pub height: u32,
    pub origin: Point,
    pub scale: f64,
    pub scroll_ratio: Point,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIRTUAL_WIDTH,
            height: DEFAULT_VIRTUAL_HEIGHT,
            origin: Point::center_of(DEFAULT_VIRTUAL_WIDTH, DEFAULT_VIRTUAL_HEIGHT),
            scale: 1.0,
            scroll_ratio: Point::new(0.5, 0.5),
        }
    }
}

/// Tiled evaluation settings. Zero means untiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSettings {
    pub width: u32,
    pub height: u32,
    pub debug_checkerboard: bool,
}

/// Work requested by mutations since the last drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requests {
    pub save: bool,
    pub evaluate: bool,
}

impl Requests {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.save && !self.evaluate
    }
}

/// Result of [`Session::remove_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// No item with that id; nothing changed.
    NotFound,
    /// The Image is used by this many nodes and consent was not given;
    /// nothing changed.
    NeedsConsent { references: usize },
    /// The item was removed along with these nodes.
    Removed { nodes: Vec<NodeId> },
}

// =============================================================================
// SESSION
// =============================================================================

/// One editor lifetime's state.
#[derive(Debug)]
pub struct Session {
    ids: IdAllocator,
    library: ContentLibrary,
    graph: Graph,
    canvas: CanvasSettings,
    tile: TileSettings,
    engine: Box<dyn Engine>,
    requests: Requests,
}

impl Session {
    /// Default state: two LCD outputs, a Renderer, focus on the first output.
    pub fn new(engine: Box<dyn Engine>) -> Self {
        let mut session = Self::empty(engine);
        let canvas = session.canvas;
        session
            .graph
            .insert_node(Topology::renderer_node(&canvas, &session.tile));
        for (name, width, height) in DEFAULT_OUTPUTS {
            let id = session.ids.allocate(Namespace::Content);
            let Ok(engine_id) = session.allocate_engine_id() else {
                tracing::error!("Engine image ids exhausted while creating default outputs");
                break;
            };
            session.library.insert(ContentItem {
                id: content_id(ContentKind::Output, id),
                kind: ContentKind::Output,
                name: name.to_string(),
                width,
                height,
                engine_image_id: engine_id,
                pixels: None,
                native_format: None,
                native_data: None,
                palette: None,
                is_nine_patch: false,
            });
        }
        session.library.refocus_first_output();
        session.push_renderer_settings();
        session
    }

    fn empty(engine: Box<dyn Engine>) -> Self {
        Self {
            ids: IdAllocator::new(),
            library: ContentLibrary::new(),
            graph: Graph::new(),
            canvas: CanvasSettings::default(),
            tile: TileSettings::default(),
            engine,
            requests: Requests::default(),
        }
    }

    /// Assemble a session from restored parts. The caller has already
    /// registered every buffer with `engine` and pushes renderer settings
    /// once the remaining engine state has been re-applied.
    pub(crate) fn from_restored(
        ids: IdAllocator,
        library: ContentLibrary,
        graph: Graph,
        canvas: CanvasSettings,
        tile: TileSettings,
        engine: Box<dyn Engine>,
    ) -> Self {
        let mut session = Self {
            ids,
            library,
            graph,
            canvas,
            tile,
            engine,
            requests: Requests::default(),
        };
        Topology::ensure_renderer(&mut session.graph, &session.canvas, &session.tile);
        session.sync_from_renderer();
        session
    }

    /// Give the engine back, ending this lifetime.
    #[must_use]
    pub fn into_engine(self) -> Box<dyn Engine> {
        self.engine
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[must_use]
    pub fn library(&self) -> &ContentLibrary {
        &self.library
    }

    #[must_use]
    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    #[must_use]
    pub fn canvas(&self) -> &CanvasSettings {
        &self.canvas
    }

    #[must_use]
    pub fn tile(&self) -> &TileSettings {
        &self.tile
    }

    #[must_use]
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn Engine {
        self.engine.as_mut()
    }

    pub(crate) fn bridge_parts(&mut self) -> (&Graph, &mut ContentLibrary, &mut dyn Engine) {
        (&self.graph, &mut self.library, self.engine.as_mut())
    }

    /// Drain pending requests.
    pub fn take_requests(&mut self) -> Requests {
        std::mem::take(&mut self.requests)
    }

    #[must_use]
    pub fn pending_requests(&self) -> Requests {
        self.requests
    }

    fn touched(&mut self) {
        self.requests.save = true;
        self.requests.evaluate = true;
    }

    fn allocate_engine_id(&mut self) -> Result<EngineImageId, FlexError> {
        EngineImageId::from_counter(self.ids.allocate(Namespace::EngineImage))
    }

    // -------------------------------------------------------------------------
    // Content library
    // -------------------------------------------------------------------------

    /// Register an RGBA8 image.
    pub fn add_image(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        rgba: Vec<u8>,
        is_nine_patch: bool,
    ) -> Result<ContentId, FlexError> {
        check_dimension(width)?;
        check_dimension(height)?;
        let expected = rgba_len(width, height);
        if rgba.len() != expected {
            return Err(FlexError::InvalidPixelData {
                expected,
                actual: rgba.len(),
            });
        }
        let engine_id = self.allocate_engine_id()?;
        self.engine.store_image(engine_id, &rgba, width, height)?;
        let id = content_id(ContentKind::Image, self.ids.allocate(Namespace::Content));
        self.library.insert(ContentItem {
            id: id.clone(),
            kind: ContentKind::Image,
            name: name.to_string(),
            width,
            height,
            engine_image_id: engine_id,
            pixels: Some(rgba),
            native_format: None,
            native_data: None,
            palette: None,
            is_nine_patch,
        });
        tracing::info!(content = %id, width, height, "Image added");
        self.touched();
        Ok(id)
    }

    /// Register bytes already encoded in `format`.
    ///
    /// A palette id that does not exist is ignored. For non-RGBA8 formats
    /// the RGBA preview is pulled back from the engine.
    pub fn add_native_image(
        &mut self,
        name: &str,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        palette: Option<PaletteId>,
    ) -> Result<ContentId, FlexError> {
        check_dimension(width)?;
        check_dimension(height)?;
        let expected = format.buffer_len(width, height);
        if data.len() < expected {
            return Err(FlexError::InvalidPixelData {
                expected,
                actual: data.len(),
            });
        }
        let engine_id = self.allocate_engine_id()?;
        self.engine
            .store_native_image(engine_id, &data, width, height, format)?;

        let palette = palette.and_then(|pid| match self.library.palette(&pid) {
            Some(pal) => {
                let pal_engine = pal.engine_image_id;
                match self.engine.set_image_palette(engine_id, pal_engine) {
                    Ok(()) => Some(pid),
                    Err(e) => {
                        tracing::warn!(palette = %pid, error = %e, "Palette association failed");
                        None
                    }
                }
            }
            None => {
                tracing::warn!(palette = %pid, "Ignoring unknown palette");
                None
            }
        });

        let pixels = if format == PixelFormat::Rgba8Straight {
            Some(data[..expected].to_vec())
        } else {
            self.engine.image_as_rgba8(engine_id)
        };

        let id = content_id(ContentKind::Image, self.ids.allocate(Namespace::Content));
        self.library.insert(ContentItem {
            id: id.clone(),
            kind: ContentKind::Image,
            name: name.to_string(),
            width,
            height,
            engine_image_id: engine_id,
            pixels,
            native_format: Some(format),
            native_data: Some(data),
            palette,
            is_nine_patch: false,
        });
        tracing::info!(content = %id, %format, "Native image added");
        self.touched();
        Ok(id)
    }

    /// Create an Output buffer and focus it.
    pub fn add_output(&mut self, name: &str, width: u32, height: u32) -> Result<ContentId, FlexError> {
        check_dimension(width)?;
        check_dimension(height)?;
        let engine_id = self.allocate_engine_id()?;
        let id = content_id(ContentKind::Output, self.ids.allocate(Namespace::Content));
        self.library.insert(ContentItem {
            id: id.clone(),
            kind: ContentKind::Output,
            name: name.to_string(),
            width,
            height,
            engine_image_id: engine_id,
            pixels: None,
            native_format: None,
            native_data: None,
            palette: None,
            is_nine_patch: false,
        });
        self.library.set_focus(Some(id.clone()));
        tracing::info!(content = %id, width, height, "Output added");
        self.touched();
        Ok(id)
    }

    /// Add an Output together with its Sink. Without a name the Output is
    /// called `LCD #k`, `k` counting the new output.
    pub fn create_output(
        &mut self,
        name: Option<&str>,
        width: u32,
        height: u32,
    ) -> Result<(ContentId, NodeId), FlexError> {
        let default_name = format!("LCD #{}", self.library.outputs().count() + 1);
        let output = self.add_output(name.unwrap_or(&default_name), width, height)?;
        let sink = self.add_sink(&output)?;
        Ok((output, sink))
    }

    /// Remove a content item.
    ///
    /// - Image used by nodes: requires `consent`; with it, those nodes and
    ///   their connections go first.
    /// - Output: its Sink goes too, and focus moves to the first remaining
    ///   Output if it pointed here.
    pub fn remove_content(&mut self, id: &ContentId, consent: bool) -> Removal {
        let Some(item) = self.library.get(id) else {
            return Removal::NotFound;
        };
        let kind = item.kind;
        let engine_id = item.engine_image_id;

        let referencing: Vec<NodeId> = self
            .graph
            .nodes_referencing(id)
            .map(|n| n.id.clone())
            .collect();
        if kind == ContentKind::Image && !referencing.is_empty() && !consent {
            return Removal::NeedsConsent {
                references: referencing.len(),
            };
        }

        for node in &referencing {
            // Content-referencing nodes are never the Renderer.
            if let Err(e) = self.graph.remove_node(node) {
                tracing::warn!(node = %node, error = %e, "Cascade removal skipped");
            }
        }
        let had_focus = self.library.focus() == Some(id);
        self.library.take(id);
        self.engine.release_image(engine_id);
        if kind == ContentKind::Output && had_focus {
            self.library.refocus_first_output();
        }
        tracing::info!(content = %id, nodes_removed = referencing.len(), "Content removed");
        self.touched();
        Removal::Removed { nodes: referencing }
    }

    pub fn set_focus(&mut self, id: Option<ContentId>) {
        self.library.set_focus(id);
        self.touched();
    }

    // -------------------------------------------------------------------------
    // Palettes
    // -------------------------------------------------------------------------

    /// Add one of the built-in palettes.
    pub fn add_palette_preset(&mut self, preset: PalettePreset) -> Result<PaletteId, FlexError> {
        let colors = preset.colors();
        let count = colors.len() / RGBA_BYTES;
        let engine_id = self.allocate_engine_id()?;
        self.engine
            .store_image(engine_id, &colors, count as u32, 1)?;
        let id = PaletteId::new(format!("pal-{}", self.ids.allocate(Namespace::Palette)));
        self.library.insert_palette(Palette {
            id: id.clone(),
            name: preset.name().to_string(),
            color_count: count,
            colors,
            engine_image_id: engine_id,
        });
        self.requests.save = true;
        Ok(id)
    }

    /// Remove a palette and every association to it.
    pub fn remove_palette(&mut self, id: &PaletteId) -> bool {
        let Some(palette) = self.library.take_palette(id) else {
            return false;
        };
        let mut cleared = Vec::new();
        for node in self.graph.nodes().to_vec() {
            if let NodeKind::Source {
                content,
                palette: Some(pid),
                ..
            } = &node.kind
                && pid == id
            {
                cleared.push((node.id.clone(), content.clone()));
            }
        }
        for (node_id, content) in cleared {
            if let Some(NodeKind::Source { palette, .. }) =
                self.graph.node_mut(&node_id).map(|n| &mut n.kind)
            {
                *palette = None;
            }
            if let Some(item) = self.library.get(&content) {
                self.engine.clear_image_palette(item.engine_image_id);
            }
        }
        let items: Vec<ContentId> = self
            .library
            .items()
            .iter()
            .filter(|c| c.palette.as_ref() == Some(id))
            .map(|c| c.id.clone())
            .collect();
        for cid in items {
            if let Some(item) = self.library.get_mut(&cid) {
                item.palette = None;
                let engine_id = item.engine_image_id;
                self.engine.clear_image_palette(engine_id);
            }
        }
        self.engine.release_image(palette.engine_image_id);
        tracing::info!(palette = %id, "Palette removed");
        self.touched();
        true
    }

    /// Associate (or clear) the palette of a Source node.
    pub fn set_source_palette(
        &mut self,
        node: &NodeId,
        palette: Option<PaletteId>,
    ) -> Result<(), FlexError> {
        let pal_engine = match &palette {
            Some(pid) => Some(
                self.library
                    .palette(pid)
                    .ok_or_else(|| FlexError::PaletteNotFound(pid.clone()))?
                    .engine_image_id,
            ),
            None => None,
        };
        let (content, format) = match &self.node_or_err(node)?.kind {
            NodeKind::Source {
                content, format, ..
            } => (content.clone(), *format),
            _ => {
                return Err(FlexError::WrongNodeKind {
                    node: node.clone(),
                    expected: "source",
                });
            }
        };

        if let Some(item) = self.library.get(&content)
            && format.is_indexed()
        {
            match pal_engine {
                Some(pal) => self.engine.set_image_palette(item.engine_image_id, pal)?,
                None => self.engine.clear_image_palette(item.engine_image_id),
            }
        }
        if let Some(NodeKind::Source { palette: slot, .. }) =
            self.graph.node_mut(node).map(|n| &mut n.kind)
        {
            *slot = palette;
        }
        self.touched();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------------

    fn node_or_err(&self, id: &NodeId) -> Result<&GraphNode, FlexError> {
        self.graph
            .node(id)
            .ok_or_else(|| FlexError::NodeNotFound(id.clone()))
    }

    /// Insert a node of `kind`, allocate its id and auto-wire it.
    ///
    /// Content references are checked: Source and NinePatch need an Image,
    /// Sink an Output.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        title: Option<String>,
        position: Option<Point>,
    ) -> Result<NodeId, FlexError> {
        let Some((namespace, prefix)) = kind.id_scheme() else {
            return Err(FlexError::RendererExists(self.graph.renderer_id()));
        };
        if let Some(content) = kind.content_ref() {
            let expected = if kind.is_sink() {
                ContentKind::Output
            } else {
                ContentKind::Image
            };
            self.library.expect_kind(content, expected)?;
        }
        let id = NodeId::new(format!("{prefix}-{}", self.ids.allocate(namespace)));
        let position = position.unwrap_or_else(|| Topology::next_position(&self.graph));
        let title = title.unwrap_or_else(|| kind.default_title());
        self.graph
            .insert_node(GraphNode::new(id.clone(), title, position, kind));
        Topology::autowire(&mut self.graph, &id);
        self.touched();
        Ok(id)
    }

    /// Add a Source showing an Image.
    pub fn add_source(&mut self, content: &ContentId) -> Result<NodeId, FlexError> {
        let item = self.library.expect_kind(content, ContentKind::Image)?;
        let kind = NodeKind::source(content.clone(), item.width, item.height);
        let title = item.name.clone();
        self.add_node(kind, Some(title), None)
    }

    /// Add a NinePatch over `content`, or over the first nine-patch Image.
    pub fn add_nine_patch(&mut self, content: Option<&ContentId>) -> Result<NodeId, FlexError> {
        let item = match content {
            Some(id) => self.library.expect_kind(id, ContentKind::Image)?,
            None => self
                .library
                .first_nine_patch()
                .ok_or(FlexError::NoNinePatchContent)?,
        };
        let kind = NodeKind::nine_patch(item.id.clone(), item.width, item.height);
        self.add_node(kind, None, None)
    }

    /// Add the Sink for an Output. Returns the existing Sink if there is one.
    pub fn add_sink(&mut self, output: &ContentId) -> Result<NodeId, FlexError> {
        let item = self.library.expect_kind(output, ContentKind::Output)?;
        if let Some(existing) = Topology::sink_for(&self.graph, output) {
            return Ok(existing);
        }
        let kind = NodeKind::sink(output.clone(), item.width, item.height);
        let title = item.name.clone();
        self.add_node(kind, Some(title), None)
    }

    /// Remove a node and its connections. Removing a Sink also removes its
    /// Output. The Renderer is protected and an unknown id is a no-op.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<bool, FlexError> {
        let Some(removed) = self.graph.remove_node(id)? else {
            return Ok(false);
        };
        if let NodeKind::Sink { content, .. } = &removed.kind {
            self.remove_content(content, true);
        }
        self.touched();
        Ok(true)
    }

    pub fn connect(&mut self, from: Endpoint, to: Endpoint) -> Result<(), FlexError> {
        self.graph.connect(from, to)?;
        self.touched();
        Ok(())
    }

    pub fn disconnect(&mut self, from: &Endpoint, to: &Endpoint) -> bool {
        let removed = self.graph.disconnect(from, to);
        if removed {
            self.touched();
        }
        removed
    }

    /// Add an input to a Composite or an output to a Distributor.
    pub fn grow_ports(&mut self, id: &NodeId) -> Result<PortId, FlexError> {
        let port = self.graph.grow_ports(id)?;
        self.touched();
        Ok(port)
    }

    pub fn move_node(&mut self, id: &NodeId, position: Point) -> Result<(), FlexError> {
        let node = self
            .graph
            .node_mut(id)
            .ok_or_else(|| FlexError::NodeNotFound(id.clone()))?;
        node.position = position;
        self.requests.save = true;
        Ok(())
    }

    /// Set a declared filter parameter.
    pub fn set_filter_param(&mut self, id: &NodeId, name: &str, value: f64) -> Result<(), FlexError> {
        let node = self
            .graph
            .node_mut(id)
            .ok_or_else(|| FlexError::NodeNotFound(id.clone()))?;
        let NodeKind::Filter { filter, params } = &mut node.kind else {
            return Err(FlexError::WrongNodeKind {
                node: id.clone(),
                expected: "filter",
            });
        };
        if !filter.params().iter().any(|(p, _)| *p == name) {
            return Err(FlexError::UnknownParameter {
                filter: filter.name().to_string(),
                name: name.to_string(),
            });
        }
        params.insert(name.to_string(), value);
        self.touched();
        Ok(())
    }

    /// Set the transform of an Affine node, or the placement of any node
    /// that carries one.
    pub fn set_transform(&mut self, id: &NodeId, transform: AffineTransform) -> Result<(), FlexError> {
        let node = self
            .graph
            .node_mut(id)
            .ok_or_else(|| FlexError::NodeNotFound(id.clone()))?;
        match &mut node.kind {
            NodeKind::Affine { transform: t }
            | NodeKind::Source { placement: t, .. }
            | NodeKind::Composite { placement: t, .. }
            | NodeKind::Distributor { placement: t, .. }
            | NodeKind::NinePatch { placement: t, .. }
            | NodeKind::Sink { placement: t, .. } => *t = transform,
            _ => {
                return Err(FlexError::WrongNodeKind {
                    node: id.clone(),
                    expected: "transformable",
                });
            }
        }
        self.touched();
        Ok(())
    }

    /// Change the pixel format a Source presents to the engine.
    ///
    /// An item with neither native bytes nor RGBA pixels is left alone and
    /// `Ok(false)` is returned.
    pub fn set_source_format(&mut self, id: &NodeId, format: PixelFormat) -> Result<bool, FlexError> {
        let (content, previous, palette) = match &self.node_or_err(id)?.kind {
            NodeKind::Source {
                content,
                format,
                palette,
                ..
            } => (content.clone(), *format, palette.clone()),
            _ => {
                return Err(FlexError::WrongNodeKind {
                    node: id.clone(),
                    expected: "source",
                });
            }
        };
        let Some(item) = self.library.get(&content) else {
            return Ok(false);
        };
        let engine_id = item.engine_image_id;

        match (&item.native_data, &item.pixels) {
            (Some(native), _) if format.is_byte_per_pixel() && !native.is_empty() => {
                self.engine
                    .store_native_image(engine_id, native, item.width, item.height, format)?;
            }
            (_, Some(pixels)) if !pixels.is_empty() => {
                self.engine.store_image_with_format(
                    engine_id,
                    pixels,
                    item.width,
                    item.height,
                    format,
                )?;
            }
            _ => {
                tracing::debug!(node = %id, "No pixel data to convert; format unchanged");
                return Ok(false);
            }
        }

        if previous.is_indexed() && !format.is_indexed() {
            self.engine.clear_image_palette(engine_id);
        } else if format.is_indexed()
            && let Some(pal) = palette.as_ref().and_then(|p| self.library.palette(p))
        {
            let pal_engine = pal.engine_image_id;
            if let Err(e) = self.engine.set_image_palette(engine_id, pal_engine) {
                tracing::warn!(node = %id, error = %e, "Palette re-association failed");
            }
        }

        if let Some(NodeKind::Source { format: slot, .. }) =
            self.graph.node_mut(id).map(|n| &mut n.kind)
        {
            *slot = format;
        }
        self.touched();
        Ok(true)
    }

    /// Change the format a Sink writes.
    pub fn set_sink_format(&mut self, id: &NodeId, format: PixelFormat) -> Result<(), FlexError> {
        if format.sink_disabled() {
            return Err(FlexError::UnsupportedSinkFormat(format));
        }
        let node = self
            .graph
            .node_mut(id)
            .ok_or_else(|| FlexError::NodeNotFound(id.clone()))?;
        let NodeKind::Sink { format: slot, .. } = &mut node.kind else {
            return Err(FlexError::WrongNodeKind {
                node: id.clone(),
                expected: "sink",
            });
        };
        *slot = format;
        self.engine.set_sink_format(id, format);
        self.touched();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Renderer and canvas
    // -------------------------------------------------------------------------

    /// Resize the Renderer's virtual screen.
    pub fn set_virtual_screen(&mut self, width: u32, height: u32) -> Result<(), FlexError> {
        for v in [width, height] {
            if v == 0 || v > MAX_VIRTUAL_DIMENSION {
                return Err(FlexError::InvalidDimensions(format!(
                    "{v} is outside 1..={MAX_VIRTUAL_DIMENSION}"
                )));
            }
        }
        self.update_renderer(|kind| {
            if let NodeKind::Renderer {
                virtual_width,
                virtual_height,
                ..
            } = kind
            {
                *virtual_width = width;
                *virtual_height = height;
            }
        });
        Ok(())
    }

    pub fn set_renderer_pivot(&mut self, pivot: Point) {
        self.update_renderer(|kind| {
            if let NodeKind::Renderer { pivot: p, .. } = kind {
                *p = pivot;
            }
        });
    }

    pub fn set_tile(&mut self, tile: TileSettings) {
        self.update_renderer(|kind| {
            if let NodeKind::Renderer {
                tile_width,
                tile_height,
                debug_checkerboard,
                ..
            } = kind
            {
                *tile_width = tile.width;
                *tile_height = tile.height;
                *debug_checkerboard = tile.debug_checkerboard;
            }
        });
    }

    /// Preview zoom and scroll position. Saved, never evaluated.
    pub fn set_view(&mut self, scale: f64, scroll_ratio: Point) {
        self.canvas.scale = scale;
        self.canvas.scroll_ratio = scroll_ratio;
        self.requests.save = true;
    }

    fn update_renderer(&mut self, edit: impl FnOnce(&mut NodeKind)) {
        Topology::ensure_renderer(&mut self.graph, &self.canvas, &self.tile);
        if let Some(node) = self.graph.renderer_mut() {
            edit(&mut node.kind);
        }
        self.sync_from_renderer();
        self.push_renderer_settings();
        self.touched();
    }

    /// Recreate a missing Renderer. Returns true if one was created.
    pub fn refresh_layout(&mut self) -> bool {
        let created = Topology::ensure_renderer(&mut self.graph, &self.canvas, &self.tile);
        if created {
            self.push_renderer_settings();
            self.touched();
        }
        created
    }

    /// Copy the Renderer's settings into the canvas and tile settings.
    fn sync_from_renderer(&mut self) {
        if let Some(GraphNode {
            kind:
                NodeKind::Renderer {
                    virtual_width,
                    virtual_height,
                    pivot,
                    tile_width,
                    tile_height,
                    debug_checkerboard,
                },
            ..
        }) = self.graph.renderer()
        {
            self.canvas.width = *virtual_width;
            self.canvas.height = *virtual_height;
            self.canvas.origin = *pivot;
            self.tile = TileSettings {
                width: *tile_width,
                height: *tile_height,
                debug_checkerboard: *debug_checkerboard,
            };
        }
    }

    /// Push canvas and tile settings to the engine.
    pub(crate) fn push_renderer_settings(&mut self) {
        self.engine
            .set_canvas_size(self.canvas.width, self.canvas.height);
        self.engine.set_dst_origin(self.canvas.origin);
        self.engine.set_tile_size(self.tile.width, self.tile.height);
        self.engine
            .set_debug_checkerboard(self.tile.debug_checkerboard);
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    /// Run one evaluation pass through the bridge.
    pub fn evaluate(&mut self) -> EvalOutcome {
        let outcome = bridge::evaluate(self);
        if matches!(outcome, EvalOutcome::Completed { .. }) {
            self.requests.save = true;
        }
        outcome
    }
}

/// `img-N` / `out-N`.
pub(crate) fn content_id(kind: ContentKind, n: u64) -> ContentId {
    ContentId::new(format!("{}-{n}", kind.id_prefix()))
}

// =============================================================================
// TESTS
// =============================================================================
