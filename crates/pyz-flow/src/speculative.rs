//! Speculative-mode tracking.
//!
//! Some walks must not leave a trace: the exceptional pass over a `finally`
//! suite computes types under a closed gate that will be recomputed with the
//! gate open, and the evaluator makes hypothetical evaluations of its own.
//! While a speculative region is active, every flow-cache write is recorded
//! here; leaving the region removes exactly the entries written inside it.
//!
//! A separate speculative-type map, keyed by AST node and an optional
//! expected type, lets the evaluator memoise across repeated re-entries
//! within the same region.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use pyz_binder::FlowNodeId;
use pyz_common::NodeId;
use pyz_solver::TypeId;

use crate::cache::FlowNodeTypeCache;

/// A per-reference flow cache shared between the analyzer and the tracker.
pub type SharedFlowCache = Rc<RefCell<FlowNodeTypeCache>>;

#[derive(Default)]
struct RegionFrame {
    /// Index into `tracked` at region entry.
    tracked_mark: usize,
    /// Speculative-type keys added inside this region.
    type_keys: Vec<(NodeId, Option<TypeId>)>,
}

/// Tracks flow-cache writes made inside speculative regions.
#[derive(Default)]
pub struct SpeculativeTracker {
    regions: RefCell<Vec<RegionFrame>>,
    tracked: RefCell<Vec<(SharedFlowCache, FlowNodeId)>>,
    speculative_types: RefCell<FxHashMap<(NodeId, Option<TypeId>), TypeId>>,
}

impl SpeculativeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.regions.borrow().is_empty()
    }

    pub fn enter_region(&self) {
        let mark = self.tracked.borrow().len();
        self.regions.borrow_mut().push(RegionFrame {
            tracked_mark: mark,
            type_keys: Vec::new(),
        });
    }

    /// Leave the innermost region, deleting every cache entry written while
    /// it was active.
    pub fn leave_region(&self) {
        let frame = self
            .regions
            .borrow_mut()
            .pop()
            .expect("leave_region without a matching enter_region");
        let mut tracked = self.tracked.borrow_mut();
        for (cache, node) in tracked.drain(frame.tracked_mark..) {
            cache.borrow_mut().delete(node);
        }
        drop(tracked);
        let mut types = self.speculative_types.borrow_mut();
        for key in frame.type_keys {
            types.remove(&key);
        }
    }

    /// Record that `node`'s entry in `cache` was written inside the current
    /// region. No-op outside a region.
    pub fn track_entry(&self, cache: &SharedFlowCache, node: FlowNodeId) {
        if self.is_active() {
            self.tracked.borrow_mut().push((Rc::clone(cache), node));
        }
    }

    /// Memoise a speculative evaluation of `node` under an optional
    /// expected type. Dropped when the current region exits; ignored
    /// outside a region.
    pub fn add_speculative_type(&self, node: NodeId, expected: Option<TypeId>, ty: TypeId) {
        let mut regions = self.regions.borrow_mut();
        let Some(frame) = regions.last_mut() else {
            return;
        };
        frame.type_keys.push((node, expected));
        self.speculative_types
            .borrow_mut()
            .insert((node, expected), ty);
    }

    pub fn get_speculative_type(&self, node: NodeId, expected: Option<TypeId>) -> Option<TypeId> {
        self.speculative_types.borrow().get(&(node, expected)).copied()
    }
}
