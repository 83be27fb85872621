//! # Identifier Allocator
//!
//! Monotonic per-namespace counters.
//!
//! Freed ids are never handed out again, not even within one session: the
//! allocator is a set of counters, not a free-list. On restore every counter
//! resumes above the largest id that was persisted or observed.

use std::collections::BTreeMap;

/// A counter namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    /// Content library ids (`img-N`, `out-N`).
    Content,
    /// Engine-numeric image ids (images, outputs, palettes).
    EngineImage,
    /// Palette ids (`pal-N`).
    Palette,
    SourceNode,
    FilterNode,
    CompositeNode,
    MatteNode,
    DistributorNode,
    AffineNode,
    NinePatchNode,
    SinkNode,
}

impl Namespace {
    /// Every namespace, in persisted order.
    pub const ALL: [Namespace; 11] = [
        Namespace::Content,
        Namespace::EngineImage,
        Namespace::Palette,
        Namespace::SourceNode,
        Namespace::FilterNode,
        Namespace::CompositeNode,
        Namespace::MatteNode,
        Namespace::DistributorNode,
        Namespace::AffineNode,
        Namespace::NinePatchNode,
        Namespace::SinkNode,
    ];
}

/// Strictly increasing counters, one per namespace.
///
/// Every counter starts at 1.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdAllocator {
    next: BTreeMap<Namespace, u64>,
}

impl IdAllocator {
    /// Create an allocator with every counter at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next id in `ns`.
    pub fn allocate(&mut self, ns: Namespace) -> u64 {
        let slot = self.next.entry(ns).or_insert(1);
        let id = *slot;
        *slot = slot.saturating_add(1);
        id
    }

    /// The id `allocate(ns)` would return next.
    #[must_use]
    pub fn peek(&self, ns: Namespace) -> u64 {
        self.next.get(&ns).copied().unwrap_or(1)
    }

    /// Record that `id` is in use so it is never allocated again.
    pub fn observe(&mut self, ns: Namespace, id: u64) {
        let slot = self.next.entry(ns).or_insert(1);
        if id >= *slot {
            *slot = id.saturating_add(1);
        }
    }

    /// Snapshot of every counter's next value.
    #[must_use]
    pub fn counters(&self) -> BTreeMap<Namespace, u64> {
        Namespace::ALL
            .iter()
            .map(|&ns| (ns, self.peek(ns)))
            .collect()
    }

    /// Rebuild an allocator from persisted "next" values.
    ///
    /// A persisted value below 1 is treated as 1. Callers then `observe` every
    /// id actually present in the restored data.
    #[must_use]
    pub fn from_counters(counters: &BTreeMap<Namespace, u64>) -> Self {
        let next = counters
            .iter()
            .map(|(&ns, &value)| (ns, value.max(1)))
            .collect();
        Self { next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_strictly_increasing_per_namespace() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocate(Namespace::Content), 1);
        assert_eq!(ids.allocate(Namespace::Content), 2);
        assert_eq!(ids.allocate(Namespace::Palette), 1);
        assert_eq!(ids.allocate(Namespace::Content), 3);
    }

    #[test]
    fn observe_moves_counter_past_restored_ids() {
        let mut ids = IdAllocator::new();
        ids.observe(Namespace::EngineImage, 9);
        assert_eq!(ids.allocate(Namespace::EngineImage), 10);

        // Observing a smaller id never moves the counter back.
        ids.observe(Namespace::EngineImage, 3);
        assert_eq!(ids.allocate(Namespace::EngineImage), 11);
    }

    #[test]
    fn counters_round_trip() {
        let mut ids = IdAllocator::new();
        ids.allocate(Namespace::SinkNode);
        ids.allocate(Namespace::SinkNode);
        let restored = IdAllocator::from_counters(&ids.counters());
        assert_eq!(restored.peek(Namespace::SinkNode), 3);
        assert_eq!(restored.peek(Namespace::MatteNode), 1);
    }

    #[test]
    fn zero_counter_is_clamped() {
        let mut counters = BTreeMap::new();
        counters.insert(Namespace::Content, 0);
        let mut ids = IdAllocator::from_counters(&counters);
        assert_eq!(ids.allocate(Namespace::Content), 1);
    }
}
