//! # Persistence Manager
//!
//! Two-tier snapshot protocol around a [`Session`]:
//!
//! - **Durable tier**: complete snapshot in a [`DurableStore`], written on
//!   a debounced schedule and once more at teardown.
//! - **Shareable tier**: compact snapshot for the `state` parameter. Image
//!   payloads are recovered by id from the durable tier on restore.
//!
//! ## Restore priority
//!
//! 1. A shareable snapshot, if present and version-valid.
//! 2. The durable snapshot, if present and version-valid.
//! 3. The default state.
//!
//! A version mismatch discards the whole snapshot. Nothing in a restore
//! escapes as an error: damaged records are dropped with a warning and
//! unrecoverable images are listed in [`RestoreReport::missing_assets`].

use crate::engine::Engine;
use crate::formats::{self, ContentRecord, PaletteRecord, PersistedState};
use crate::graph::Graph;
use crate::ids::{IdAllocator, Namespace};
use crate::library::{
    ContentItem, ContentKind, ContentLibrary, Palette, check_dimension, rgba_len,
};
use crate::node::{GraphNode, NodeKind};
use crate::primitives::{AUTO_SAVE_DEBOUNCE, RGBA_BYTES};
use crate::scheduler::Debouncer;
use crate::session::Session;
use crate::storage::DurableStore;
use crate::{ContentId, EngineImageId, FlexError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeSet;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// RESTORE REPORT
// =============================================================================

/// Which tier a session was restored from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    Shareable,
    Durable,
    Default,
}

/// Result of [`PersistenceManager::restore`].
#[derive(Debug)]
pub struct RestoreReport {
    pub session: Session,
    pub source: RestoreSource,
    /// Names of Image items whose pixel data could not be recovered.
    pub missing_assets: Vec<String>,
    /// True when records had to be dropped or repaired, so the restored
    /// state differs from the snapshot and should be saved again.
    pub repaired: bool,
}

// =============================================================================
// PERSISTENCE MANAGER
// =============================================================================

/// Owns the durable store and the auto-save schedule.
#[derive(Debug)]
pub struct PersistenceManager<S: DurableStore> {
    store: S,
    debouncer: Debouncer,
    resetting: bool,
    last_saved_at: Option<u64>,
}

impl<S: DurableStore> PersistenceManager<S> {
    /// Manager with the default 500 ms debounce window.
    pub fn new(store: S) -> Self {
        Self::with_debounce(store, AUTO_SAVE_DEBOUNCE)
    }

    pub fn with_debounce(store: S, window: Duration) -> Self {
        Self {
            store,
            debouncer: Debouncer::new(window),
            resetting: false,
            last_saved_at: None,
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    #[must_use]
    pub fn is_resetting(&self) -> bool {
        self.resetting
    }

    /// When the pending auto-save is due, if one is pending.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Timestamp (ms) of the last successful durable write.
    #[must_use]
    pub fn last_saved_at(&self) -> Option<u64> {
        self.last_saved_at
    }

    // -------------------------------------------------------------------------
    // Write scheduling
    // -------------------------------------------------------------------------

    /// Start or restart the quiescence window.
    pub fn request_save(&mut self, now: Instant) {
        if self.resetting {
            return;
        }
        self.debouncer.schedule(now);
    }

    /// Save if the window has elapsed. Returns true if a write happened.
    pub fn poll(&mut self, now: Instant, session: &Session) -> bool {
        if self.debouncer.poll(now) {
            return self.save_now(session);
        }
        false
    }

    /// Write the durable snapshot immediately.
    ///
    /// Failures are logged and reported as `false`; the previous snapshot
    /// stays in place.
    pub fn save_now(&mut self, session: &Session) -> bool {
        if self.resetting {
            tracing::debug!("Reset in progress; save skipped");
            return false;
        }
        let saved_at = now_millis();
        let state = PersistedState::capture(session, saved_at);
        let result = formats::encode_durable(&state).and_then(|text| {
            let len = text.len();
            self.store.store(&text).map(|()| len)
        });
        match result {
            Ok(bytes) => {
                self.last_saved_at = Some(saved_at);
                tracing::info!(
                    bytes,
                    nodes = state.nodes.len(),
                    content = state.content_library.len(),
                    "Durable state saved"
                );
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to save durable state");
                false
            }
        }
    }

    /// Final save before the session ends, unless a reset is in progress.
    pub fn teardown(&mut self, session: &Session) -> bool {
        self.debouncer.cancel();
        if self.resetting {
            tracing::info!("Reset in progress; teardown save suppressed");
            return false;
        }
        self.save_now(session)
    }

    /// Clear the durable tier and suppress every later save of this
    /// lifetime, including the teardown save.
    pub fn reset(&mut self) -> bool {
        self.resetting = true;
        self.debouncer.cancel();
        match self.store.clear() {
            Ok(()) => {
                tracing::info!("Durable state cleared");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to clear durable state");
                false
            }
        }
    }

    /// Encode the shareable form of `session`.
    pub fn share(&self, session: &Session) -> Result<String, FlexError> {
        formats::encode_shareable(&PersistedState::capture(session, now_millis()))
    }

    // -------------------------------------------------------------------------
    // Restore
    // -------------------------------------------------------------------------

    /// The durable snapshot, if one is stored and version-valid.
    pub fn load_durable(&self) -> Option<PersistedState> {
        let text = match self.store.load() {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read durable state");
                return None;
            }
        };
        match formats::decode_durable(&text) {
            Ok(state) => Some(state),
            Err(FlexError::VersionMismatch { found, expected }) => {
                tracing::warn!(found, expected, "Durable state version mismatch; discarded");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Corrupt durable state; discarded");
                None
            }
        }
    }

    /// Build the session for a new lifetime.
    ///
    /// `share` is the shareable parameter, if the page was opened with one.
    pub fn restore(&self, share: Option<&str>, engine: Box<dyn Engine>) -> RestoreReport {
        let durable = self.load_durable();

        let shared = share.and_then(|param| match formats::decode_shareable(param) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring invalid shareable state");
                None
            }
        });

        let (state, source) = match (shared, durable.as_ref()) {
            (Some(state), _) => (state, RestoreSource::Shareable),
            (None, Some(state)) => (state.clone(), RestoreSource::Durable),
            (None, None) => {
                tracing::info!("No saved state; starting from defaults");
                return RestoreReport {
                    session: Session::new(engine),
                    source: RestoreSource::Default,
                    missing_assets: Vec::new(),
                    repaired: false,
                };
            }
        };

        let backup = match source {
            RestoreSource::Shareable => durable.as_ref(),
            _ => None,
        };
        let report = rebuild(state, backup, engine, source);
        tracing::info!(
            source = ?report.source,
            nodes = report.session.graph().node_count(),
            missing = report.missing_assets.len(),
            "Session restored"
        );
        report
    }
}

// =============================================================================
// REBUILD
// =============================================================================

/// Tracks engine ids handed out during one restore.
struct EngineIds<'a> {
    ids: &'a mut IdAllocator,
    used: BTreeSet<EngineImageId>,
}

impl EngineIds<'_> {
    /// `wanted` if it is still free, otherwise a fresh id. `None` once the
    /// 32-bit id space is used up.
    fn claim(&mut self, wanted: EngineImageId, owner: &str) -> Option<(EngineImageId, bool)> {
        if self.used.insert(wanted) {
            return Some((wanted, false));
        }
        let fresh = match EngineImageId::from_counter(self.ids.allocate(Namespace::EngineImage)) {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!(owner, %wanted, error = %e, "Engine id collision; dropping item");
                return None;
            }
        };
        tracing::warn!(owner, %wanted, %fresh, "Engine id collision; reassigned");
        self.used.insert(fresh);
        Some((fresh, true))
    }
}

fn decode_b64(field: Option<&str>) -> Option<Vec<u8>> {
    let text = field?;
    match STANDARD.decode(text) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(error = %e, "Undecodable base64 payload");
            None
        }
    }
}

/// Raise every counter past the ids present in `state`.
fn observe_ids(ids: &mut IdAllocator, state: &PersistedState) {
    for record in &state.content_library {
        if let Some(n) = record.id.numeric_suffix() {
            ids.observe(Namespace::Content, n);
        }
        ids.observe(Namespace::EngineImage, record.engine_image_id.value() as u64);
    }
    for record in &state.palette_library {
        if let Some(n) = record.id.numeric_suffix() {
            ids.observe(Namespace::Palette, n);
        }
        ids.observe(Namespace::EngineImage, record.engine_image_id.value() as u64);
    }
    for node in &state.nodes {
        if let (Some((ns, _)), Some(n)) = (node.kind.id_scheme(), node.id.numeric_suffix()) {
            ids.observe(ns, n);
        }
    }
}

fn restore_palette(
    record: &PaletteRecord,
    engine_ids: &mut EngineIds<'_>,
    engine: &mut dyn Engine,
) -> Option<(Palette, bool)> {
    let colors = decode_b64(Some(&record.rgba8_data_base64))?;
    let count = colors.len() / RGBA_BYTES;
    if count == 0 || colors.len() % RGBA_BYTES != 0 {
        tracing::warn!(palette = %record.id, "Palette color table has invalid length; dropped");
        return None;
    }
    if count != record.color_count {
        tracing::warn!(palette = %record.id, stored = record.color_count, count, "Palette color count corrected");
    }
    let (engine_id, reassigned) = engine_ids.claim(record.engine_image_id, record.id.as_str())?;
    if let Err(e) = engine.store_image(engine_id, &colors, count as u32, 1) {
        tracing::warn!(palette = %record.id, error = %e, "Palette registration failed; dropped");
        return None;
    }
    let palette = Palette {
        id: record.id.clone(),
        name: record.name.clone(),
        color_count: count,
        colors,
        engine_image_id: engine_id,
    };
    Some((palette, reassigned || count != record.color_count))
}

/// Outcome of restoring one content record.
struct RestoredContent {
    item: ContentItem,
    missing: bool,
    reassigned: bool,
}

fn restore_content(
    record: &ContentRecord,
    library: &ContentLibrary,
    engine_ids: &mut EngineIds<'_>,
    engine: &mut dyn Engine,
) -> Option<RestoredContent> {
    if let Err(e) = check_dimension(record.width).and(check_dimension(record.height)) {
        tracing::warn!(content = %record.id, error = %e, "Content record has invalid size; dropped");
        return None;
    }
    let (engine_id, reassigned) = engine_ids.claim(record.engine_image_id, record.id.as_str())?;
    let (width, height) = (record.width, record.height);

    let mut item = ContentItem {
        id: record.id.clone(),
        kind: record.kind,
        name: record.name.clone(),
        width,
        height,
        engine_image_id: engine_id,
        pixels: None,
        native_format: None,
        native_data: None,
        palette: None,
        is_nine_patch: record.is_nine_patch,
    };
    if record.kind == ContentKind::Output {
        return Some(RestoredContent {
            item,
            missing: false,
            reassigned,
        });
    }

    let pixels = decode_b64(record.pixels_base64.as_deref())
        .filter(|p| p.len() == rgba_len(width, height));
    let native = record
        .native_format
        .zip(decode_b64(record.native_data_base64.as_deref()))
        .filter(|(format, data)| data.len() >= format.buffer_len(width, height));

    let registered = match (&native, &pixels) {
        (Some((format, data)), _) => engine
            .store_native_image(engine_id, data, width, height, *format)
            .map(|()| true),
        (None, Some(rgba)) => engine.store_image(engine_id, rgba, width, height).map(|()| true),
        (None, None) => Ok(false),
    };
    let registered = registered.unwrap_or_else(|e| {
        tracing::warn!(content = %record.id, error = %e, "Image registration failed");
        false
    });

    if registered {
        if let Some((format, data)) = native {
            item.pixels = pixels.or_else(|| engine.image_as_rgba8(engine_id));
            item.native_format = Some(format);
            item.native_data = Some(data);
        } else {
            item.pixels = pixels;
        }
        if let Some(pid) = &record.palette_id {
            match library.palette(pid) {
                Some(pal) if item.native_format.is_some_and(|f| f.is_indexed()) => {
                    match engine.set_image_palette(engine_id, pal.engine_image_id) {
                        Ok(()) => item.palette = Some(pid.clone()),
                        Err(e) => tracing::warn!(content = %record.id, error = %e, "Palette association failed"),
                    }
                }
                Some(_) => item.palette = Some(pid.clone()),
                None => tracing::warn!(content = %record.id, palette = %pid, "Dropping stale palette reference"),
            }
        }
    } else {
        tracing::warn!(content = %record.id, name = %record.name, "Image data unrecoverable");
    }

    Some(RestoredContent {
        item,
        missing: !registered,
        reassigned,
    })
}

/// Nodes that may be restored: one Renderer, no duplicate ids, at most one
/// Sink per existing Output.
fn filter_nodes(nodes: Vec<GraphNode>, library: &ContentLibrary) -> (Vec<GraphNode>, bool) {
    let total = nodes.len();
    let mut seen = BTreeSet::new();
    let mut sinks = BTreeSet::new();
    let mut renderer = false;
    let kept: Vec<GraphNode> = nodes
        .into_iter()
        .filter(|node| {
            if !seen.insert(node.id.clone()) {
                tracing::warn!(node = %node.id, "Dropping duplicate node id");
                return false;
            }
            match &node.kind {
                NodeKind::Renderer { .. } if renderer => {
                    tracing::warn!(node = %node.id, "Dropping extra renderer");
                    false
                }
                NodeKind::Renderer { .. } => {
                    renderer = true;
                    true
                }
                NodeKind::Sink { content, .. } => {
                    let valid = library.get(content).is_some_and(ContentItem::is_output)
                        && sinks.insert(content.clone());
                    if !valid {
                        tracing::warn!(node = %node.id, %content, "Dropping sink without a unique output");
                    }
                    valid
                }
                _ => true,
            }
        })
        .collect();
    let dropped = kept.len() != total;
    (kept, dropped)
}

/// Rebuild a session from a version-valid snapshot.
///
/// `backup` is the durable snapshot consulted for Image payloads the
/// shareable snapshot does not carry.
fn rebuild(
    mut state: PersistedState,
    backup: Option<&PersistedState>,
    mut engine: Box<dyn Engine>,
    source: RestoreSource,
) -> RestoreReport {
    let mut repaired = false;

    if let Some(backup) = backup {
        for record in &mut state.content_library {
            if record.kind != ContentKind::Image || record.has_payload() {
                continue;
            }
            if let Some(full) = backup.record(&record.id).filter(|r| r.kind == ContentKind::Image) {
                record.merge_payload_from(full);
            }
        }
    }

    let mut ids = IdAllocator::from_counters(&state.next_ids.to_counters());
    observe_ids(&mut ids, &state);

    let mut library = ContentLibrary::new();
    let mut missing_assets = Vec::new();
    {
        let mut engine_ids = EngineIds {
            ids: &mut ids,
            used: BTreeSet::new(),
        };
        for record in &state.palette_library {
            match restore_palette(record, &mut engine_ids, engine.as_mut()) {
                Some((palette, fixed)) => {
                    repaired |= fixed;
                    library.insert_palette(palette);
                }
                None => repaired = true,
            }
        }
        let mut seen: BTreeSet<ContentId> = BTreeSet::new();
        for record in &state.content_library {
            if !seen.insert(record.id.clone()) {
                tracing::warn!(content = %record.id, "Dropping duplicate content id");
                repaired = true;
                continue;
            }
            let Some(restored) =
                restore_content(record, &library, &mut engine_ids, engine.as_mut())
            else {
                repaired = true;
                continue;
            };
            if restored.missing {
                missing_assets.push(restored.item.name.clone());
            }
            repaired |= restored.reassigned;
            library.insert(restored.item);
        }
    }

    library.set_focus(state.focused_content_id.clone());
    if library.focus().is_none() {
        library.refocus_first_output();
    }

    let (nodes, dropped) = filter_nodes(std::mem::take(&mut state.nodes), &library);
    repaired |= dropped;
    let connection_total = state.connections.len();
    let graph = Graph::from_parts(nodes, std::mem::take(&mut state.connections));
    repaired |= graph.connection_count() != connection_total;
    repaired |= graph.renderer().is_none();

    let mut session =
        Session::from_restored(ids, library, graph, state.canvas, state.tile, engine);
    reapply_engine_state(&mut session);
    session.push_renderer_settings();
    session.take_requests();

    RestoreReport {
        session,
        source,
        missing_assets,
        repaired,
    }
}

/// Push per-node encodings back into the engine: Source formats and
/// palettes, then Sink output formats.
fn reapply_engine_state(session: &mut Session) {
    let nodes: Vec<GraphNode> = session.graph().nodes().to_vec();
    for node in &nodes {
        match &node.kind {
            NodeKind::Source {
                format, palette, ..
            } => {
                if !format.is_default()
                    && let Err(e) = session.set_source_format(&node.id, *format)
                {
                    tracing::warn!(node = %node.id, error = %e, "Source format not re-applied");
                }
                if palette.is_some()
                    && let Err(e) = session.set_source_palette(&node.id, palette.clone())
                {
                    tracing::warn!(node = %node.id, error = %e, "Source palette not re-applied");
                }
            }
            NodeKind::Sink { format, .. } if !format.is_default() => {
                if let Err(e) = session.set_sink_format(&node.id, *format) {
                    tracing::warn!(node = %node.id, error = %e, "Sink format not re-applied");
                }
            }
            _ => {}
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
