//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::{EditCommand, PaletteAction, Position};
use crate::config::Config;
use crate::shell;
use flexgraph_core::formats::{share_param_from, share_query};
use flexgraph_core::library::parse_dimensions;
use flexgraph_core::{
    AffineTransform, ContentId, Endpoint, EvalOutcome, FlexError, HeadlessEngine, ImportBatch,
    ImportReport, NodeId, NodeKind, PaletteId, PalettePreset, PersistenceManager, PixelFormat,
    Point, RedbStore, Removal, RestoreSource, Session, TileSettings,
};
use std::path::PathBuf;

// =============================================================================
// CONTEXT
// =============================================================================

/// Resolved global options.
#[derive(Debug, Clone)]
pub struct Context {
    pub database: PathBuf,
    /// Raw `--state` argument.
    pub share: Option<String>,
    pub json_mode: bool,
    pub config: Config,
}

// =============================================================================
// PAGE LIFETIME
// =============================================================================

/// One editor lifetime: a restored session and its persistence manager.
#[derive(Debug)]
pub struct Page {
    pub session: Session,
    pub persistence: PersistenceManager<RedbStore>,
    pub source: RestoreSource,
    pub missing_assets: Vec<String>,
}

impl Page {
    /// Open the store and restore the session.
    pub fn open(ctx: &Context) -> Result<Self, FlexError> {
        let store = RedbStore::open(&ctx.database)?;
        let persistence = PersistenceManager::with_debounce(store, ctx.config.debounce());
        let share = ctx.share.as_deref().and_then(share_param_from);
        let report = persistence.restore(share, Box::new(HeadlessEngine::new()));

        tracing::debug!(source = ?report.source, database = %ctx.database.display(), "Page opened");
        for name in &report.missing_assets {
            tracing::warn!(asset = %name, "Image data could not be recovered; re-import it");
        }

        let mut page = Self {
            session: report.session,
            persistence,
            source: report.source,
            missing_assets: report.missing_assets,
        };
        if report.repaired {
            page.persistence.save_now(&page.session);
        }
        Ok(page)
    }

    /// Run the evaluation the pending edits asked for, if any.
    pub fn settle(&mut self) -> Option<EvalOutcome> {
        if !self.session.take_requests().evaluate {
            return None;
        }
        Some(self.evaluate())
    }

    /// One evaluation pass; failures are logged.
    pub fn evaluate(&mut self) -> EvalOutcome {
        let outcome = self.session.evaluate();
        if let Some(notice) = outcome.user_notice() {
            tracing::warn!("{}", notice);
        }
        outcome
    }

    /// Teardown save. Returns whether the state was written.
    pub fn close(mut self) -> bool {
        self.persistence.teardown(&self.session)
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Show library and graph summary.
pub fn cmd_status(ctx: &Context) -> Result<(), FlexError> {
    let page = Page::open(ctx)?;
    let session = &page.session;
    let library = session.library();
    let graph = session.graph();
    let focus = library.focus().map(|c| c.as_str().to_string());

    if ctx.json_mode {
        let output = serde_json::json!({
            "database": ctx.database.display().to_string(),
            "source": source_name(page.source),
            "images": library.images().count(),
            "outputs": library.outputs().count(),
            "palettes": library.palettes().len(),
            "nodes": graph.node_count(),
            "connections": graph.connection_count(),
            "focus": focus,
            "missing_assets": page.missing_assets,
            "canvas": session.canvas(),
            "tile": session.tile(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!("Database: {}", ctx.database.display());
        println!("Restored from: {}", source_name(page.source));
        println!("Images: {}", library.images().count());
        println!("Outputs: {}", library.outputs().count());
        println!("Palettes: {}", library.palettes().len());
        println!("Nodes: {}", graph.node_count());
        println!("Connections: {}", graph.connection_count());
        println!("Focus: {}", focus.as_deref().unwrap_or("-"));
        for item in library.items() {
            println!(
                "  {} {} \"{}\" {}x{}{}",
                item.id,
                item.kind,
                item.name,
                item.width,
                item.height,
                if item.has_payload() { "" } else { " (no data)" }
            );
        }
        for node in graph.nodes() {
            println!("  [{}] {} \"{}\"", node.kind.type_name(), node.id, node.title);
        }
        if !page.missing_assets.is_empty() {
            println!("Missing assets: {}", page.missing_assets.join(", "));
        }
    }
    page.close();
    Ok(())
}

/// Save, then print the shareable query.
pub fn cmd_share(ctx: &Context) -> Result<(), FlexError> {
    let mut page = Page::open(ctx)?;
    page.persistence.save_now(&page.session);
    let query = share_query(&page.persistence.share(&page.session)?);

    if ctx.json_mode {
        let output = serde_json::json!({ "query": query, "length": query.len() });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!("{query}");
    }
    page.close();
    Ok(())
}

/// Clear the durable store. The teardown save is suppressed afterwards.
pub fn cmd_reset(ctx: &Context) -> Result<(), FlexError> {
    let mut page = Page::open(ctx)?;
    let cleared = page.persistence.reset();
    page.close();
    if !cleared {
        return Err(FlexError::IoError("Failed to clear saved state".to_string()));
    }
    report(ctx, "State cleared; the next start uses defaults");
    Ok(())
}

/// Run one evaluation pass.
pub fn cmd_evaluate(ctx: &Context) -> Result<(), FlexError> {
    let mut page = Page::open(ctx)?;
    let outcome = page.evaluate();
    page.close();
    report(ctx, &outcome_summary(&outcome));
    Ok(())
}

/// Apply one edit, evaluate if it asked for it, save on exit.
pub fn cmd_edit(ctx: &Context, edit: EditCommand) -> Result<(), FlexError> {
    let mut page = Page::open(ctx)?;
    let result = apply_edit(&mut page.session, edit);
    if let Some(outcome) = page.settle() {
        tracing::debug!("{}", outcome_summary(&outcome));
    }
    page.close();
    report(ctx, &result?);
    Ok(())
}

/// Interactive shell over the restored page.
pub async fn cmd_shell(ctx: &Context) -> Result<(), FlexError> {
    let page = Page::open(ctx)?;
    shell::run(page, ctx.config.frame_interval()).await
}

// =============================================================================
// EDITS
// =============================================================================

/// Apply `edit` to `session` and describe what changed.
pub fn apply_edit(session: &mut Session, edit: EditCommand) -> Result<String, FlexError> {
    match edit {
        EditCommand::Import { paths } => {
            let report = ImportBatch::decode(&paths).apply(session);
            Ok(import_summary(&report))
        }
        EditCommand::Output {
            width,
            height,
            name,
        } => {
            let (width, height) = parse_dimensions(&width, &height)?;
            let (content, sink) = session.create_output(name.as_deref(), width, height)?;
            Ok(format!("Created {content} ({width}x{height}) with {sink}"))
        }
        EditCommand::Add {
            kind,
            content,
            title,
            at,
        } => {
            let id = add_node(session, &kind, content.map(ContentId::new), title, at)?;
            Ok(format!("Added {id}"))
        }
        EditCommand::Remove { node } => {
            let id = NodeId::new(node);
            if session.remove_node(&id)? {
                Ok(format!("Removed {id}"))
            } else {
                Ok(format!("No node {id}"))
            }
        }
        EditCommand::Connect { from, to } => {
            session.connect(endpoint(&from)?, endpoint(&to)?)?;
            Ok(format!("Connected {from} -> {to}"))
        }
        EditCommand::Disconnect { from, to } => {
            if session.disconnect(&endpoint(&from)?, &endpoint(&to)?) {
                Ok(format!("Disconnected {from} -> {to}"))
            } else {
                Ok(format!("No connection {from} -> {to}"))
            }
        }
        EditCommand::Grow { node } => {
            let port = session.grow_ports(&NodeId::new(node.clone()))?;
            Ok(format!("Added port {node}.{port}"))
        }
        EditCommand::Move { node, at } => {
            let id = NodeId::new(node);
            let current = session
                .graph()
                .node(&id)
                .ok_or_else(|| FlexError::NodeNotFound(id.clone()))?
                .position;
            let target = Point::new(at.x.unwrap_or(current.x), at.y.unwrap_or(current.y));
            session.move_node(&id, target)?;
            Ok(format!("Moved {id} to ({}, {})", target.x, target.y))
        }
        EditCommand::Param { node, name, value } => {
            session.set_filter_param(&NodeId::new(node.clone()), &name, value)?;
            Ok(format!("Set {node}.{name} = {value}"))
        }
        EditCommand::Transform {
            node,
            tx,
            ty,
            rotation,
            sx,
            sy,
        } => {
            let transform = AffineTransform::Parametric {
                tx,
                ty,
                rotation_deg: rotation,
                sx,
                sy,
            };
            session.set_transform(&NodeId::new(node.clone()), transform)?;
            Ok(format!("Transform of {node} updated"))
        }
        EditCommand::DeleteContent { id, yes } => {
            let id = ContentId::new(id);
            match session.remove_content(&id, yes) {
                Removal::NotFound => Err(FlexError::ContentNotFound(id)),
                Removal::NeedsConsent { references } => Ok(format!(
                    "{id} is used by {references} node(s); pass --yes to remove them too"
                )),
                Removal::Removed { nodes } if nodes.is_empty() => Ok(format!("Removed {id}")),
                Removal::Removed { nodes } => Ok(format!(
                    "Removed {id} and {}",
                    nodes
                        .iter()
                        .map(NodeId::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            }
        }
        EditCommand::Focus { id } => {
            let id = id.map(ContentId::new);
            if let Some(id) = &id
                && session.library().get(id).is_none()
            {
                return Err(FlexError::ContentNotFound(id.clone()));
            }
            let message = match &id {
                Some(id) => format!("Focused {id}"),
                None => "Focus cleared".to_string(),
            };
            session.set_focus(id);
            Ok(message)
        }
        EditCommand::Palette { action } => apply_palette(session, action),
        EditCommand::Format { node, format } => {
            let id = NodeId::new(node);
            let format: PixelFormat = format.parse()?;
            let is_source = matches!(
                session
                    .graph()
                    .node(&id)
                    .ok_or_else(|| FlexError::NodeNotFound(id.clone()))?
                    .kind,
                NodeKind::Source { .. }
            );
            if is_source {
                return if session.set_source_format(&id, format)? {
                    Ok(format!("{id} now presents {format}"))
                } else {
                    Ok(format!("{id} has no image data to convert"))
                };
            }
            session.set_sink_format(&id, format)?;
            Ok(format!("{id} now writes {format}"))
        }
        EditCommand::Screen { width, height } => {
            session.set_virtual_screen(width, height)?;
            Ok(format!("Virtual screen is {width}x{height}"))
        }
        EditCommand::Tile {
            width,
            height,
            checkerboard,
        } => {
            session.set_tile(TileSettings {
                width,
                height,
                debug_checkerboard: checkerboard,
            });
            Ok(format!("Tile is {width}x{height}"))
        }
    }
}

fn apply_palette(session: &mut Session, action: PaletteAction) -> Result<String, FlexError> {
    match action {
        PaletteAction::Add { preset } => {
            let preset: PalettePreset = preset.parse()?;
            let id = session.add_palette_preset(preset)?;
            Ok(format!("Added {id} ({})", preset.name()))
        }
        PaletteAction::Remove { id } => {
            let id = PaletteId::new(id);
            if session.remove_palette(&id) {
                Ok(format!("Removed {id}"))
            } else {
                Err(FlexError::PaletteNotFound(id))
            }
        }
        PaletteAction::Assign { node, palette } => {
            let palette = palette.map(PaletteId::new);
            let message = match &palette {
                Some(p) => format!("{node} uses {p}"),
                None => format!("{node} has no palette"),
            };
            session.set_source_palette(&NodeId::new(node), palette)?;
            Ok(message)
        }
    }
}

/// Dispatch `add <kind>` to the session constructor for that kind.
fn add_node(
    session: &mut Session,
    kind: &str,
    content: Option<ContentId>,
    title: Option<String>,
    at: Position,
) -> Result<NodeId, FlexError> {
    let needs_content = || FlexError::MissingContent(kind.to_string());
    let id = match kind {
        "source" => session.add_source(&content.ok_or_else(needs_content)?)?,
        "ninepatch" => session.add_nine_patch(content.as_ref())?,
        "sink" => session.add_sink(&content.ok_or_else(needs_content)?)?,
        other => {
            let position = match (at.x, at.y) {
                (None, None) => None,
                (x, y) => Some(Point::new(x.unwrap_or(0.0), y.unwrap_or(0.0))),
            };
            return session.add_node(NodeKind::parse_standalone(other)?, title, position);
        }
    };
    if at.x.is_some() || at.y.is_some() {
        apply_edit(
            session,
            EditCommand::Move {
                node: id.as_str().to_string(),
                at,
            },
        )?;
    }
    Ok(id)
}

/// Parse `node.port`.
pub fn endpoint(text: &str) -> Result<Endpoint, FlexError> {
    Endpoint::parse(text).ok_or_else(|| FlexError::InvalidEndpoint(text.to_string()))
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn report(ctx: &Context, message: &str) {
    if ctx.json_mode {
        let output = serde_json::json!({ "ok": true, "message": message });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!("{message}");
    }
}

pub fn source_name(source: RestoreSource) -> &'static str {
    match source {
        RestoreSource::Shareable => "shareable",
        RestoreSource::Durable => "durable",
        RestoreSource::Default => "default",
    }
}

pub fn import_summary(report: &ImportReport) -> String {
    let mut summary = format!("Imported {} image(s)", report.imported.len());
    if !report.skipped.is_empty() {
        summary.push_str(&format!(", skipped {}", report.skipped.len()));
    }
    for (file, reason) in &report.failed {
        summary.push_str(&format!("\n  {file}: {reason}"));
    }
    summary
}

pub fn outcome_summary(outcome: &EvalOutcome) -> String {
    match outcome {
        EvalOutcome::Skipped { .. } => "Nothing to evaluate: no sink targets an output".to_string(),
        EvalOutcome::Completed { updated, metrics } => format!(
            "Evaluated {} output(s); pool hits {} misses {}",
            updated.len(),
            metrics.pool_hits,
            metrics.pool_misses
        ),
        other => other
            .user_notice()
            .unwrap_or_else(|| "Evaluation failed".to_string()),
    }
}
