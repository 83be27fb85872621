//! # Topology Rules
//!
//! Invariant-preserving helpers shared by every graph edit:
//! - auto-wiring of freshly added nodes to the Renderer
//! - Renderer recreation during layout refresh
//! - Sink lookup for an Output
//!
//! All rules are deterministic and applied uniformly; none of them
//! rejects an edit the graph store would accept.

use crate::graph::{Connection, Endpoint, Graph};
use crate::node::{GraphNode, NodeKind};
use crate::primitives::RENDERER_NODE_ID;
use crate::session::{CanvasSettings, TileSettings};
use crate::{ContentId, NodeId, Point};

/// Where a recreated Renderer is placed on the canvas.
pub const RENDERER_POSITION: Point = Point::new(700.0, 550.0);

/// Stateless topology rules.
pub struct Topology;

impl Topology {
    /// Wire a freshly added node into the Renderer when the matching
    /// Renderer port is free.
    ///
    /// - Source-capable nodes: `node.out -> renderer.in`
    /// - Sinks: `renderer.out -> node.in`
    ///
    /// Returns the connection made, if any. Branching graphs are never
    /// disturbed: an occupied Renderer port means no wiring.
    pub fn autowire(graph: &mut Graph, node: &NodeId) -> Option<Connection> {
        let kind = &graph.node(node)?.kind;
        let renderer = graph.renderer_id();
        let (from, to) = if kind.is_source_capable() {
            (
                Endpoint::new(node.clone(), "out"),
                Endpoint::new(renderer, "in"),
            )
        } else if kind.is_sink() {
            (
                Endpoint::new(renderer, "out"),
                Endpoint::new(node.clone(), "in"),
            )
        } else {
            return None;
        };

        let renderer_port_busy = if kind.is_sink() {
            graph.outbound(&from).is_some()
        } else {
            graph.inbound(&to).is_some()
        };
        if renderer_port_busy {
            return None;
        }

        match graph.connect(from.clone(), to.clone()) {
            Ok(()) => {
                tracing::debug!(node = %node, "Auto-wired node to renderer");
                Some(Connection::new(from, to))
            }
            Err(e) => {
                tracing::debug!(node = %node, error = %e, "Auto-wiring skipped");
                None
            }
        }
    }

    /// Recreate the Renderer from canvas settings if it is missing.
    ///
    /// Returns true when a Renderer had to be created.
    pub fn ensure_renderer(graph: &mut Graph, canvas: &CanvasSettings, tile: &TileSettings) -> bool {
        if graph.renderer().is_some() {
            return false;
        }
        tracing::warn!("Renderer node missing; recreating it");
        graph.insert_node(Self::renderer_node(canvas, tile));
        true
    }

    /// A Renderer node carrying the given canvas and tile settings.
    #[must_use]
    pub fn renderer_node(canvas: &CanvasSettings, tile: &TileSettings) -> GraphNode {
        let kind = NodeKind::Renderer {
            virtual_width: canvas.width,
            virtual_height: canvas.height,
            pivot: canvas.origin,
            tile_width: tile.width,
            tile_height: tile.height,
            debug_checkerboard: tile.debug_checkerboard,
        };
        let title = kind.default_title();
        GraphNode::new(NodeId::new(RENDERER_NODE_ID), title, RENDERER_POSITION, kind)
    }

    /// The Sink writing into `output`, if any.
    #[must_use]
    pub fn sink_for(graph: &Graph, output: &ContentId) -> Option<NodeId> {
        graph
            .nodes()
            .iter()
            .find(|n| n.kind.is_sink() && n.kind.content_ref() == Some(output))
            .map(|n| n.id.clone())
    }

    /// Staggered placement for a new node so successive adds do not stack.
    #[must_use]
    pub fn next_position(graph: &Graph) -> Point {
        let step = (graph.node_count() % 10) as f64;
        Point::new(100.0 + step * 40.0, 100.0 + step * 30.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FilterKind;

    fn base() -> Graph {
        let mut g = Graph::new();
        g.insert_node(Topology::renderer_node(
            &CanvasSettings::default(),
            &TileSettings::default(),
        ));
        g
    }

    fn add(g: &mut Graph, id: &str, kind: NodeKind) -> NodeId {
        let id = NodeId::new(id);
        g.insert_node(GraphNode::new(id.clone(), id.as_str(), Point::default(), kind));
        id
    }

    #[test]
    fn source_wires_into_free_renderer_input() {
        let mut g = base();
        let src = add(&mut g, "image-node-1", NodeKind::source(ContentId::new("img-1"), 4, 4));
        let conn = Topology::autowire(&mut g, &src).expect("wired");
        assert_eq!(conn.to_node, NodeId::new("renderer"));

        // Second source leaves the existing wire alone.
        let other = add(&mut g, "image-node-2", NodeKind::source(ContentId::new("img-1"), 4, 4));
        assert!(Topology::autowire(&mut g, &other).is_none());
        assert_eq!(g.connection_count(), 1);
        assert_eq!(g.connections()[0].from_node, src);
    }

    #[test]
    fn sink_takes_free_renderer_output() {
        let mut g = base();
        let s1 = add(&mut g, "sink-1", NodeKind::sink(ContentId::new("out-1"), 2, 2));
        let s2 = add(&mut g, "sink-2", NodeKind::sink(ContentId::new("out-2"), 2, 2));
        assert!(Topology::autowire(&mut g, &s1).is_some());
        assert!(Topology::autowire(&mut g, &s2).is_none());
        assert_eq!(Topology::sink_for(&g, &ContentId::new("out-2")), Some(s2));
    }

    #[test]
    fn filters_are_not_autowired() {
        let mut g = base();
        let f = add(&mut g, "independent-filter-1", NodeKind::filter(FilterKind::Alpha));
        assert!(Topology::autowire(&mut g, &f).is_none());
    }

    #[test]
    fn ensure_renderer_recreates_once() {
        let mut g = Graph::new();
        let canvas = CanvasSettings::default();
        let tile = TileSettings::default();
        assert!(Topology::ensure_renderer(&mut g, &canvas, &tile));
        assert!(!Topology::ensure_renderer(&mut g, &canvas, &tile));
        assert_eq!(g.nodes().iter().filter(|n| n.kind.is_renderer()).count(), 1);
    }
}
