//! # Graph Store
//!
//! Nodes and directed port-to-port connections.
//!
//! Nodes and connections are kept in authored order (`Vec`), which is the
//! order they are persisted and submitted in.
//!
//! ## Cardinality
//!
//! Every input endpoint is the target of at most one connection and every
//! output endpoint the source of at most one. `connect` enforces this by
//! atomic replacement, never by rejection.

use crate::node::GraphNode;
use crate::primitives::RENDERER_NODE_ID;
use crate::{ContentId, FlexError, NodeId, PortId};
use serde::{Deserialize, Serialize};

// =============================================================================
// CONNECTIONS
// =============================================================================

/// One side of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub node: NodeId,
    pub port: PortId,
}

impl Endpoint {
    #[must_use]
    pub fn new(node: impl Into<NodeId>, port: impl Into<PortId>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }

    /// Parse `node.port`. The port is everything after the last dot.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (node, port) = s.rsplit_once('.')?;
        if node.is_empty() || port.is_empty() {
            return None;
        }
        Some(Self::new(node, port))
    }
}

/// A directed edge from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from_node: NodeId,
    pub from_port: PortId,
    pub to_node: NodeId,
    pub to_port: PortId,
}

impl Connection {
    #[must_use]
    pub fn new(from: Endpoint, to: Endpoint) -> Self {
        Self {
            from_node: from.node,
            from_port: from.port,
            to_node: to.node,
            to_port: to.port,
        }
    }

    #[must_use]
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.from_node == node || &self.to_node == node
    }

    fn starts_at(&self, ep: &Endpoint) -> bool {
        self.from_node == ep.node && self.from_port == ep.port
    }

    fn ends_at(&self, ep: &Endpoint) -> bool {
        self.to_node == ep.node && self.to_port == ep.port
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// The graph store. Exclusively owns nodes and connections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    connections: Vec<Connection>,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from restored parts.
    ///
    /// Connections whose endpoints do not resolve to existing ports are
    /// dropped, and later duplicates of an already-used endpoint lose.
    #[must_use]
    pub fn from_parts(nodes: Vec<GraphNode>, connections: Vec<Connection>) -> Self {
        let mut graph = Self {
            nodes,
            connections: Vec::with_capacity(connections.len()),
        };
        for conn in connections {
            let from = Endpoint::new(conn.from_node.clone(), conn.from_port.clone());
            let to = Endpoint::new(conn.to_node.clone(), conn.to_port.clone());
            if graph.validate(&from, &to).is_err() {
                tracing::warn!(?conn, "Dropping restored connection with unknown endpoint");
                continue;
            }
            if graph.outbound(&from).is_some() || graph.inbound(&to).is_some() {
                tracing::warn!(?conn, "Dropping restored connection on an occupied port");
                continue;
            }
            graph.connections.push(conn);
        }
        graph
    }

    #[must_use]
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    /// The Renderer node, if present.
    #[must_use]
    pub fn renderer(&self) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.kind.is_renderer())
    }

    pub fn renderer_mut(&mut self) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.kind.is_renderer())
    }

    #[must_use]
    pub fn renderer_id(&self) -> NodeId {
        self.renderer()
            .map(|n| n.id.clone())
            .unwrap_or_else(|| NodeId::new(RENDERER_NODE_ID))
    }

    /// Insert a node, replacing any node with the same id in place.
    pub fn insert_node(&mut self, node: GraphNode) {
        tracing::debug!(node = %node.id, kind = node.kind.type_name(), "Inserting node");
        match self.nodes.iter_mut().find(|n| n.id == node.id) {
            Some(slot) => *slot = node,
            None => self.nodes.push(node),
        }
    }

    /// Remove a node and every connection touching it.
    ///
    /// The Renderer cannot be removed. Removing an unknown id is a no-op.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<Option<GraphNode>, FlexError> {
        let Some(index) = self.nodes.iter().position(|n| &n.id == id) else {
            return Ok(None);
        };
        if self.nodes[index].kind.is_renderer() {
            return Err(FlexError::ProtectedNode(id.clone()));
        }
        let removed = self.nodes.remove(index);
        let before = self.connections.len();
        self.connections.retain(|c| !c.touches(id));
        tracing::debug!(
            node = %id,
            connections_removed = before - self.connections.len(),
            "Removed node"
        );
        Ok(Some(removed))
    }

    /// Check that `from` is an output port and `to` an input port.
    pub fn validate(&self, from: &Endpoint, to: &Endpoint) -> Result<(), FlexError> {
        let source = self
            .node(&from.node)
            .ok_or_else(|| FlexError::NodeNotFound(from.node.clone()))?;
        let target = self
            .node(&to.node)
            .ok_or_else(|| FlexError::NodeNotFound(to.node.clone()))?;
        if !source.ports().has_output(&from.port) {
            return Err(FlexError::PortNotFound {
                node: from.node.clone(),
                port: from.port.clone(),
            });
        }
        if !target.ports().has_input(&to.port) {
            return Err(FlexError::PortNotFound {
                node: to.node.clone(),
                port: to.port.clone(),
            });
        }
        Ok(())
    }

    /// Connect `from` (an output) to `to` (an input).
    ///
    /// Any edge already leaving `from` is removed first. An edge already
    /// arriving at `to` is replaced in place, keeping its position.
    pub fn connect(&mut self, from: Endpoint, to: Endpoint) -> Result<(), FlexError> {
        self.validate(&from, &to)?;
        self.connections.retain(|c| !c.starts_at(&from));
        let conn = Connection::new(from, to);
        match self
            .connections
            .iter_mut()
            .find(|c| c.to_node == conn.to_node && c.to_port == conn.to_port)
        {
            Some(existing) => *existing = conn,
            None => self.connections.push(conn),
        }
        Ok(())
    }

    /// Remove the exact edge `from -> to`. Returns whether one existed.
    pub fn disconnect(&mut self, from: &Endpoint, to: &Endpoint) -> bool {
        let before = self.connections.len();
        self.connections
            .retain(|c| !(c.starts_at(from) && c.ends_at(to)));
        before != self.connections.len()
    }

    /// The edge arriving at an input endpoint.
    #[must_use]
    pub fn inbound(&self, to: &Endpoint) -> Option<&Connection> {
        self.connections.iter().find(|c| c.ends_at(to))
    }

    /// The edge leaving an output endpoint.
    #[must_use]
    pub fn outbound(&self, from: &Endpoint) -> Option<&Connection> {
        self.connections.iter().find(|c| c.starts_at(from))
    }

    /// Append a port to a Composite (input) or Distributor (output).
    pub fn grow_ports(&mut self, id: &NodeId) -> Result<PortId, FlexError> {
        let node = self
            .node_mut(id)
            .ok_or_else(|| FlexError::NodeNotFound(id.clone()))?;
        node.kind.grow_port().ok_or_else(|| FlexError::WrongNodeKind {
            node: id.clone(),
            expected: "composite or distributor",
        })
    }

    /// Nodes whose kind references `content`.
    pub fn nodes_referencing<'a>(
        &'a self,
        content: &'a ContentId,
    ) -> impl Iterator<Item = &'a GraphNode> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.kind.content_ref() == Some(content))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{FilterKind, NodeKind};
    use crate::Point;

    fn node(id: &str, kind: NodeKind) -> GraphNode {
        GraphNode::new(NodeId::new(id), id, Point::default(), kind)
    }

    fn sample() -> Graph {
        let mut g = Graph::new();
        g.insert_node(node("renderer", NodeKind::renderer()));
        g.insert_node(node("a", NodeKind::source(ContentId::new("img-1"), 4, 4)));
        g.insert_node(node("c", NodeKind::source(ContentId::new("img-2"), 4, 4)));
        g.insert_node(node("b", NodeKind::filter(FilterKind::Grayscale)));
        g.insert_node(node("m", NodeKind::composite()));
        g
    }

    #[test]
    fn connect_replaces_inbound_edge() {
        let mut g = sample();
        g.connect(Endpoint::new("a", "out"), Endpoint::new("b", "in"))
            .expect("connect");
        g.connect(Endpoint::new("c", "out"), Endpoint::new("b", "in"))
            .expect("connect");

        assert_eq!(g.connection_count(), 1);
        let conn = g.inbound(&Endpoint::new("b", "in")).expect("inbound");
        assert_eq!(conn.from_node, NodeId::new("c"));
    }

    #[test]
    fn connect_moves_outbound_edge() {
        let mut g = sample();
        g.connect(Endpoint::new("a", "out"), Endpoint::new("m", "in1"))
            .expect("connect");
        g.connect(Endpoint::new("a", "out"), Endpoint::new("m", "in2"))
            .expect("connect");

        assert_eq!(g.connection_count(), 1);
        assert!(g.inbound(&Endpoint::new("m", "in1")).is_none());
        assert!(g.inbound(&Endpoint::new("m", "in2")).is_some());
    }

    #[test]
    fn replacement_keeps_position() {
        let mut g = sample();
        g.connect(Endpoint::new("a", "out"), Endpoint::new("m", "in1"))
            .expect("connect");
        g.connect(Endpoint::new("b", "out"), Endpoint::new("m", "in2"))
            .expect("connect");
        g.connect(Endpoint::new("c", "out"), Endpoint::new("m", "in1"))
            .expect("connect");

        assert_eq!(g.connections()[0].from_node, NodeId::new("c"));
        assert_eq!(g.connections()[1].from_node, NodeId::new("b"));
    }

    #[test]
    fn connect_to_unknown_port_is_rejected_without_mutation() {
        let mut g = sample();
        g.connect(Endpoint::new("a", "out"), Endpoint::new("b", "in"))
            .expect("connect");
        let before = g.clone();

        let err = g
            .connect(Endpoint::new("c", "out"), Endpoint::new("b", "in7"))
            .expect_err("bad port");
        assert!(matches!(err, FlexError::PortNotFound { .. }));
        let err = g
            .connect(Endpoint::new("ghost", "out"), Endpoint::new("b", "in"))
            .expect_err("bad node");
        assert!(matches!(err, FlexError::NodeNotFound(_)));
        // An input used as a source is not an output port.
        assert!(g
            .connect(Endpoint::new("b", "in"), Endpoint::new("m", "in1"))
            .is_err());
        assert_eq!(g, before);
    }

    #[test]
    fn remove_node_cascades_connections() {
        let mut g = sample();
        g.connect(Endpoint::new("a", "out"), Endpoint::new("b", "in"))
            .expect("connect");
        g.connect(Endpoint::new("b", "out"), Endpoint::new("renderer", "in"))
            .expect("connect");
        g.connect(Endpoint::new("c", "out"), Endpoint::new("m", "in1"))
            .expect("connect");

        let removed = g.remove_node(&NodeId::new("b")).expect("remove");
        assert!(removed.is_some());
        assert_eq!(g.connection_count(), 1);
        assert!(g.connections().iter().all(|c| !c.touches(&NodeId::new("b"))));
    }

    #[test]
    fn renderer_is_protected() {
        let mut g = sample();
        let err = g.remove_node(&NodeId::new("renderer")).expect_err("protected");
        assert!(matches!(err, FlexError::ProtectedNode(_)));
        assert!(g.renderer().is_some());
        assert!(g
            .remove_node(&NodeId::new("nope"))
            .expect("no-op")
            .is_none());
    }

    #[test]
    fn disconnect_removes_exact_edge_only() {
        let mut g = sample();
        g.connect(Endpoint::new("a", "out"), Endpoint::new("b", "in"))
            .expect("connect");
        assert!(!g.disconnect(&Endpoint::new("c", "out"), &Endpoint::new("b", "in")));
        assert!(g.disconnect(&Endpoint::new("a", "out"), &Endpoint::new("b", "in")));
        assert_eq!(g.connection_count(), 0);
    }

    #[test]
    fn grow_ports_keeps_existing_connections() {
        let mut g = sample();
        g.connect(Endpoint::new("a", "out"), Endpoint::new("m", "in1"))
            .expect("connect");
        let port = g.grow_ports(&NodeId::new("m")).expect("grow");
        assert_eq!(port, PortId::new("in3"));
        assert!(g.inbound(&Endpoint::new("m", "in1")).is_some());
        assert!(matches!(
            g.grow_ports(&NodeId::new("b")),
            Err(FlexError::WrongNodeKind { .. })
        ));
    }

    #[test]
    fn from_parts_drops_invalid_and_duplicate_edges() {
        let g = sample();
        let nodes = g.nodes().to_vec();
        let good = Connection::new(Endpoint::new("a", "out"), Endpoint::new("b", "in"));
        let dup = Connection::new(Endpoint::new("c", "out"), Endpoint::new("b", "in"));
        let bad = Connection::new(Endpoint::new("a", "out"), Endpoint::new("zzz", "in"));
        let restored = Graph::from_parts(nodes, vec![good.clone(), dup, bad]);
        assert_eq!(restored.connections(), [good]);
    }

    #[test]
    fn endpoint_parse() {
        assert_eq!(
            Endpoint::parse("image-node-1.out"),
            Some(Endpoint::new("image-node-1", "out"))
        );
        assert_eq!(Endpoint::parse("nodot"), None);
        assert_eq!(Endpoint::parse(".out"), None);
    }
}
