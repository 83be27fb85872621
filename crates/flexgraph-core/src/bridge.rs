//! # Evaluation Bridge
//!
//! Translates the graph store and content library into the engine's
//! submission contract, runs one evaluation and writes Sink results back
//! into their Output items.
//!
//! ## Pass
//!
//! 1. Collect Sinks whose Output still exists; with none, skip and let the
//!    caller redraw the focused item.
//! 2. Translate every node. Nodes whose content reference is stale are
//!    left out together with their connections.
//! 3. Submit, then pre-allocate one destination per Sink.
//! 4. Evaluate. A cycle aborts the pass before any buffer is read back; on
//!    success each Sink's buffer overwrites its Output's pixels. This is the
//!    only path that mutates Output pixel data.
//!
//! Engine failures never leave this module; they become an [`EvalOutcome`].

use crate::engine::{EngineNode, EngineOp, EvalStatus, PerfMetrics, SinkPreview, Submission};
use crate::graph::Graph;
use crate::library::{ContentKind, ContentLibrary};
use crate::node::NodeKind;
use crate::session::Session;
use crate::{ContentId, EngineImageId, NodeId};
use std::collections::BTreeSet;

/// A Sink and the Output buffer it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTarget {
    pub sink: NodeId,
    pub content: ContentId,
    pub image: EngineImageId,
    pub width: u32,
    pub height: u32,
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    /// No Sink targets an existing Output. Carries the item to redraw.
    Skipped { focus: Option<ContentId> },
    /// The engine found a cycle; no buffer was touched.
    CycleDetected,
    /// The engine call itself failed; no buffer was touched.
    EngineFailed { reason: String },
    /// Output items whose pixels were replaced.
    Completed {
        updated: Vec<ContentId>,
        metrics: PerfMetrics,
    },
}

impl EvalOutcome {
    /// Message for the user, if the pass needs one.
    #[must_use]
    pub fn user_notice(&self) -> Option<String> {
        match self {
            Self::CycleDetected => {
                Some("Evaluation failed: the graph contains a cycle".to_string())
            }
            Self::EngineFailed { reason } => Some(format!("Evaluation failed: {reason}")),
            _ => None,
        }
    }
}

/// Sinks whose referenced Output exists, in graph order.
#[must_use]
pub fn collect_sinks(graph: &Graph, library: &ContentLibrary) -> Vec<SinkTarget> {
    graph
        .nodes()
        .iter()
        .filter_map(|node| {
            let NodeKind::Sink { content, .. } = &node.kind else {
                return None;
            };
            let item = library.get(content).filter(|c| c.is_output())?;
            Some(SinkTarget {
                sink: node.id.clone(),
                content: content.clone(),
                image: item.engine_image_id,
                width: item.width,
                height: item.height,
            })
        })
        .collect()
}

/// Translate one node, or `None` if its content reference is stale or
/// points at an image whose data was never recovered.
fn translate(kind: &NodeKind, library: &ContentLibrary) -> Option<EngineOp> {
    let resolve = |content: &ContentId, expected: ContentKind| {
        library.get(content).filter(|c| {
            c.kind == expected && (expected != ContentKind::Image || c.has_payload())
        })
    };
    let op = match kind {
        NodeKind::Source {
            content,
            pivot,
            bilinear,
            placement,
            ..
        } => EngineOp::Source {
            image: resolve(content, ContentKind::Image)?.engine_image_id,
            pivot: *pivot,
            matrix: placement.to_matrix(),
            bilinear: *bilinear,
        },
        NodeKind::NinePatch {
            content,
            output_width,
            output_height,
            pivot,
            bilinear,
            placement,
        } => EngineOp::NinePatch {
            image: resolve(content, ContentKind::Image)?.engine_image_id,
            output_width: *output_width,
            output_height: *output_height,
            pivot: *pivot,
            matrix: placement.to_matrix(),
            bilinear: *bilinear,
        },
        NodeKind::Sink {
            content,
            pivot,
            format,
            placement,
        } => {
            let item = resolve(content, ContentKind::Output)?;
            EngineOp::Sink {
                image: item.engine_image_id,
                width: item.width,
                height: item.height,
                pivot: *pivot,
                format: *format,
                matrix: placement.to_matrix(),
            }
        }
        NodeKind::Filter { filter, params } => EngineOp::Filter {
            filter: *filter,
            params: filter.flatten(params),
        },
        NodeKind::Affine { transform } => EngineOp::Affine {
            matrix: transform.to_matrix(),
        },
        NodeKind::Composite { inputs, placement } => EngineOp::Composite {
            inputs: inputs.clone(),
            matrix: (!placement.is_identity()).then(|| placement.to_matrix()),
        },
        NodeKind::Matte => EngineOp::Matte,
        NodeKind::Distributor { outputs, placement } => EngineOp::Distributor {
            outputs: outputs.clone(),
            matrix: (!placement.is_identity()).then(|| placement.to_matrix()),
        },
        NodeKind::Renderer {
            virtual_width,
            virtual_height,
            pivot,
            tile_width,
            tile_height,
            ..
        } => EngineOp::Renderer {
            virtual_width: *virtual_width,
            virtual_height: *virtual_height,
            pivot: *pivot,
            tile_width: *tile_width,
            tile_height: *tile_height,
        },
    };
    Some(op)
}

/// Build the engine submission for the current graph.
#[must_use]
pub fn build_submission(graph: &Graph, library: &ContentLibrary) -> Submission {
    let mut omitted = BTreeSet::new();
    let mut nodes = Vec::with_capacity(graph.node_count());
    for node in graph.nodes() {
        match translate(&node.kind, library) {
            Some(op) => nodes.push(EngineNode {
                id: node.id.clone(),
                op,
            }),
            None => {
                tracing::warn!(node = %node.id, "Omitting node with stale content or missing image data");
                omitted.insert(node.id.clone());
            }
        }
    }
    let connections = graph
        .connections()
        .iter()
        .filter(|c| !omitted.contains(&c.from_node) && !omitted.contains(&c.to_node))
        .cloned()
        .collect();
    Submission { nodes, connections }
}

/// Run one evaluation pass against the session's engine.
pub fn evaluate(session: &mut Session) -> EvalOutcome {
    let (graph, library, engine) = session.bridge_parts();

    let sinks = collect_sinks(graph, library);
    if sinks.is_empty() {
        tracing::debug!("No sinks; skipping evaluation");
        return EvalOutcome::Skipped {
            focus: library.focus().cloned(),
        };
    }

    let submission = build_submission(graph, library);
    engine.submit(&submission);
    for target in &sinks {
        engine.allocate_image(target.image, target.width, target.height);
    }

    match engine.evaluate() {
        Ok(EvalStatus::Success) => {}
        Ok(EvalStatus::CycleDetected) => {
            tracing::warn!("Cycle detected; evaluation aborted");
            return EvalOutcome::CycleDetected;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Engine evaluation failed");
            return EvalOutcome::EngineFailed {
                reason: e.to_string(),
            };
        }
    }

    let mut updated = Vec::with_capacity(sinks.len());
    for target in &sinks {
        let Some(pixels) = engine.image(target.image) else {
            tracing::warn!(sink = %target.sink, "Engine returned no buffer for sink");
            continue;
        };
        if let Some(item) = library.get_mut(&target.content) {
            item.pixels = Some(pixels);
            updated.push(target.content.clone());
        }
    }
    let metrics = engine.perf_metrics();
    tracing::info!(sinks = sinks.len(), updated = updated.len(), "Evaluation completed");
    EvalOutcome::Completed { updated, metrics }
}

/// Lightweight previews of what each live Sink wrote.
#[must_use]
pub fn sink_previews(session: &Session) -> Vec<(NodeId, SinkPreview)> {
    collect_sinks(session.graph(), session.library())
        .into_iter()
        .filter_map(|t| {
            let preview = session.engine().sink_preview(&t.sink)?;
            Some((t.sink, preview))
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HeadlessEngine;
    use crate::graph::Endpoint;
    use crate::library::rgba_len;
    use crate::node::{AffineTransform, FilterKind};

    fn session() -> Session {
        Session::new(Box::new(HeadlessEngine::new()))
    }

    #[test]
    fn no_sinks_skips_and_reports_focus() {
        let mut s = session();
        assert_eq!(
            s.evaluate(),
            EvalOutcome::Skipped {
                focus: Some(ContentId::new("out-1"))
            }
        );
    }

    #[test]
    fn completed_pass_updates_only_sink_outputs() {
        let mut s = session();
        s.add_sink(&ContentId::new("out-1")).expect("sink");
        let EvalOutcome::Completed { updated, .. } = s.evaluate() else {
            unreachable!("evaluation should complete");
        };
        assert_eq!(updated, [ContentId::new("out-1")]);
        let out1 = s.library().get(&ContentId::new("out-1")).expect("out-1");
        assert_eq!(out1.pixels.as_ref().map(Vec::len), Some(rgba_len(320, 240)));
        let out2 = s.library().get(&ContentId::new("out-2")).expect("out-2");
        assert!(out2.pixels.is_none());
    }

    #[test]
    fn cycle_leaves_buffers_untouched() {
        let mut s = session();
        let sink = s.add_sink(&ContentId::new("out-1")).expect("sink");
        let a = s
            .add_node(NodeKind::filter(FilterKind::Grayscale), None, None)
            .expect("a");
        let b = s
            .add_node(NodeKind::filter(FilterKind::Alpha), None, None)
            .expect("b");
        s.connect(Endpoint::new(a.clone(), "out"), Endpoint::new(b.clone(), "in"))
            .expect("a->b");
        s.connect(Endpoint::new(b.clone(), "out"), Endpoint::new(a, "in"))
            .expect("b->a");
        s.connect(Endpoint::new(b, "out"), Endpoint::new(sink, "in"))
            .expect("b->sink");

        assert_eq!(s.evaluate(), EvalOutcome::CycleDetected);
        let out1 = s.library().get(&ContentId::new("out-1")).expect("out-1");
        assert!(out1.pixels.is_none());
        assert!(EvalOutcome::CycleDetected.user_notice().is_some());
    }

    #[test]
    fn stale_nodes_are_omitted_with_their_edges() {
        let mut s = session();
        let img = s
            .add_image("pic", 2, 2, vec![0; rgba_len(2, 2)], false)
            .expect("image");
        let src = s.add_source(&img).expect("source");
        let (graph, library, _) = s.bridge_parts();
        let mut library = library.clone();
        library.take(&img);

        let submission = build_submission(graph, &library);
        assert!(submission.node(&src).is_none());
        assert!(submission.node(&NodeId::new("renderer")).is_some());
        assert!(submission.connections.is_empty());
    }

    #[test]
    fn submission_flattens_filters_and_reduces_transforms() {
        let mut s = session();
        let f = s
            .add_node(NodeKind::filter(FilterKind::VerticalBlur), None, None)
            .expect("filter");
        s.set_filter_param(&f, "passes", 2.0).expect("param");
        let affine = s.add_node(NodeKind::affine(), None, None).expect("affine");
        s.set_transform(
            &affine,
            AffineTransform::Parametric {
                tx: 5.0,
                ty: 0.0,
                rotation_deg: 0.0,
                sx: 2.0,
                sy: 2.0,
            },
        )
        .expect("transform");
        let comp = s.add_node(NodeKind::composite(), None, None).expect("comp");

        let submission = build_submission(s.graph(), s.library());
        assert!(matches!(
            &submission.node(&f).expect("filter").op,
            EngineOp::Filter { params, .. } if params == &[5.0, 2.0]
        ));
        assert!(matches!(
            submission.node(&affine).expect("affine").op,
            EngineOp::Affine { matrix } if matrix.a == 2.0 && matrix.tx == 5.0
        ));
        assert!(matches!(
            submission.node(&comp).expect("comp").op,
            EngineOp::Composite { matrix: None, .. }
        ));
    }
}
