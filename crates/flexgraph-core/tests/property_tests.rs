//! # Property-Based Tests
//!
//! Topology and allocator invariants under random edit sequences.

#![allow(clippy::unwrap_used, clippy::panic)]

use flexgraph_core::{
    ContentId, Endpoint, FilterKind, HeadlessEngine, IdAllocator, MemoryStore, Namespace, NodeId,
    NodeKind, PersistedState, PersistenceManager, Session,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

// =============================================================================
// EDIT SCRIPT
// =============================================================================

#[derive(Debug, Clone)]
enum Edit {
    AddFilter,
    AddComposite,
    AddMatte,
    AddDistributor,
    AddSink(u8),
    Grow(u8),
    Connect(u8, u8, u8, u8),
    RemoveNode(u8),
    RemoveRenderer,
    RefreshLayout,
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        Just(Edit::AddFilter),
        Just(Edit::AddComposite),
        Just(Edit::AddMatte),
        Just(Edit::AddDistributor),
        any::<u8>().prop_map(Edit::AddSink),
        any::<u8>().prop_map(Edit::Grow),
        (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>())
            .prop_map(|(a, b, c, d)| Edit::Connect(a, b, c, d)),
        any::<u8>().prop_map(Edit::RemoveNode),
        Just(Edit::RemoveRenderer),
        Just(Edit::RefreshLayout),
    ]
}

fn pick(session: &Session, n: u8) -> Option<NodeId> {
    let nodes = session.graph().nodes();
    if nodes.is_empty() {
        return None;
    }
    Some(nodes[n as usize % nodes.len()].id.clone())
}

fn apply(session: &mut Session, edit: &Edit) {
    match *edit {
        Edit::AddFilter => {
            let _ = session.add_node(NodeKind::filter(FilterKind::Brightness), None, None);
        }
        Edit::AddComposite => {
            let _ = session.add_node(NodeKind::composite(), None, None);
        }
        Edit::AddMatte => {
            let _ = session.add_node(NodeKind::Matte, None, None);
        }
        Edit::AddDistributor => {
            let _ = session.add_node(NodeKind::distributor(), None, None);
        }
        Edit::AddSink(n) => {
            let outputs: Vec<ContentId> =
                session.library().outputs().map(|c| c.id.clone()).collect();
            if !outputs.is_empty() {
                let _ = session.add_sink(&outputs[n as usize % outputs.len()]);
            }
        }
        Edit::Grow(n) => {
            if let Some(id) = pick(session, n) {
                let _ = session.grow_ports(&id);
            }
        }
        Edit::Connect(a, pa, b, pb) => {
            let (Some(from), Some(to)) = (pick(session, a), pick(session, b)) else {
                return;
            };
            let outs = session.graph().node(&from).unwrap().ports().outputs;
            let ins = session.graph().node(&to).unwrap().ports().inputs;
            if outs.is_empty() || ins.is_empty() {
                return;
            }
            let fp = outs[pa as usize % outs.len()].id.clone();
            let tp = ins[pb as usize % ins.len()].id.clone();
            let _ = session.connect(Endpoint::new(from, fp), Endpoint::new(to, tp));
        }
        Edit::RemoveNode(n) => {
            if let Some(id) = pick(session, n) {
                let _ = session.remove_node(&id);
            }
        }
        Edit::RemoveRenderer => {
            let _ = session.remove_node(&NodeId::new("renderer"));
        }
        Edit::RefreshLayout => {
            session.refresh_layout();
        }
    }
}

fn assert_invariants(session: &Session) -> Result<(), TestCaseError> {
    let graph = session.graph();
    let mut inputs = BTreeSet::new();
    let mut outputs = BTreeSet::new();
    for conn in graph.connections() {
        prop_assert!(inputs.insert((conn.to_node.clone(), conn.to_port.clone())));
        prop_assert!(outputs.insert((conn.from_node.clone(), conn.from_port.clone())));
        prop_assert!(graph.contains(&conn.from_node));
        prop_assert!(graph.contains(&conn.to_node));
    }
    let renderers = graph.nodes().iter().filter(|n| n.kind.is_renderer()).count();
    prop_assert_eq!(renderers, 1);
    for node in graph.nodes() {
        if let NodeKind::Sink { content, .. } = &node.kind {
            prop_assert!(session.library().get(content).is_some_and(|c| c.is_output()));
        }
    }
    Ok(())
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Port cardinality, a single Renderer and live Sink references hold
    /// after every edit.
    #[test]
    fn invariants_hold_after_every_edit(edits in prop::collection::vec(edit(), 1..60)) {
        let mut session = Session::new(Box::new(HeadlessEngine::new()));
        for e in &edits {
            apply(&mut session, e);
            assert_invariants(&session)?;
        }
    }

    /// Replaying the same script yields the same graph.
    #[test]
    fn edits_are_deterministic(edits in prop::collection::vec(edit(), 1..40)) {
        let mut a = Session::new(Box::new(HeadlessEngine::new()));
        let mut b = Session::new(Box::new(HeadlessEngine::new()));
        for e in &edits {
            apply(&mut a, e);
            apply(&mut b, e);
        }
        prop_assert_eq!(a.graph(), b.graph());
    }

    /// A durable round trip after any edit script reproduces the snapshot.
    #[test]
    fn durable_round_trip_after_edits(edits in prop::collection::vec(edit(), 1..30)) {
        let mut session = Session::new(Box::new(HeadlessEngine::new()));
        for e in &edits {
            apply(&mut session, e);
        }
        let mut pm = PersistenceManager::new(MemoryStore::new());
        prop_assert!(pm.save_now(&session));
        let restored = pm.restore(None, Box::new(HeadlessEngine::new())).session;
        prop_assert_eq!(
            PersistedState::capture(&session, 0),
            PersistedState::capture(&restored, 0)
        );
    }

    /// The allocator never hands out an id at or below one it has seen.
    #[test]
    fn allocator_stays_above_observed_ids(
        observed in prop::collection::vec(0u64..10_000, 0..20),
        allocations in 1usize..20,
    ) {
        let mut ids = IdAllocator::new();
        for &id in &observed {
            ids.observe(Namespace::Content, id);
        }
        let floor = observed.iter().copied().max().unwrap_or(0);
        let mut last = 0;
        for _ in 0..allocations {
            let id = ids.allocate(Namespace::Content);
            prop_assert!(id > floor);
            prop_assert!(id > last);
            last = id;
        }
    }
}
