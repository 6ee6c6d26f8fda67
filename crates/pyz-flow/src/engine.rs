//! The code-flow engine.
//!
//! One engine exists per checked file. It owns the state that outlives a
//! single query: the monotonic generation counter that validates incomplete
//! cache reads, the never-returning-call and context-manager caches, and
//! the speculative tracker. Per-query state (the per-reference caches)
//! lives in `FlowAnalyzer` objects created by `create_analyzer`.
//!
//! Everything runs on one thread; interior mutability is `Cell`/`RefCell`
//! throughout and the graph itself is immutable shared input.

use std::cell::{Cell, RefCell};

use rustc_hash::{FxHashMap, FxHashSet};

use pyz_binder::{FlowArena, FlowNodeId};
use pyz_common::NodeId;
use pyz_solver::TypeInterner;

use crate::analyzer::FlowAnalyzer;
use crate::evaluator::TypeEvaluator;
use crate::speculative::SpeculativeTracker;

pub struct CodeFlowEngine<'a> {
    pub(crate) graph: &'a FlowArena,
    pub(crate) types: &'a TypeInterner,
    pub(crate) evaluator: &'a dyn TypeEvaluator,
    /// Monotonic generation; see `bump_generation`.
    pub(crate) generation: Cell<u64>,
    /// Never-returning-call results by call node.
    pub(crate) no_return_cache: RefCell<FxHashMap<NodeId, bool>>,
    pub(crate) no_return_depth: Cell<u32>,
    /// Exception-suppression results by (manager expression, is_async).
    pub(crate) context_manager_cache: RefCell<FxHashMap<(NodeId, bool), bool>>,
    pub(crate) context_manager_depth: Cell<u32>,
    /// Reachability queries currently on the stack, to bound re-entry from
    /// recursive callers.
    pub(crate) reachability_in_progress: RefCell<FxHashSet<FlowNodeId>>,
    speculative: SpeculativeTracker,
}

impl<'a> CodeFlowEngine<'a> {
    pub fn new(
        graph: &'a FlowArena,
        types: &'a TypeInterner,
        evaluator: &'a dyn TypeEvaluator,
    ) -> Self {
        Self {
            graph,
            types,
            evaluator,
            generation: Cell::new(0),
            no_return_cache: RefCell::new(FxHashMap::default()),
            no_return_depth: Cell::new(0),
            context_manager_cache: RefCell::new(FxHashMap::default()),
            context_manager_depth: Cell::new(0),
            reachability_in_progress: RefCell::new(FxHashSet::default()),
            speculative: SpeculativeTracker::new(),
        }
    }

    /// Create an analyzer for one top-level query. The analyzer owns the
    /// per-reference caches; callers drop it when the query completes.
    pub fn create_analyzer<'e>(&'e self) -> FlowAnalyzer<'e, 'a> {
        FlowAnalyzer::new(self)
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Advance the generation. Called when an entry transitions to complete
    /// or an incomplete entry materially changes; any incomplete read taken
    /// at an earlier generation is invalid afterwards.
    pub(crate) fn bump_generation(&self) -> u64 {
        let next = self.generation.get() + 1;
        self.generation.set(next);
        next
    }

    /// The speculative-mode hook shared with the evaluator.
    pub fn speculative(&self) -> &SpeculativeTracker {
        &self.speculative
    }
}
