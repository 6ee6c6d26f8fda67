//! Per-reference flow-node caches.
//!
//! One cache exists per (reference key, symbol id) under analysis, mapping
//! flow-node ids to cached results. The pending set detects recursion: a
//! node in it is currently on the walker's stack for this reference, and a
//! re-entry must answer with a sentinel instead of recursing.
//!
//! Entry life cycle: absent -> pending -> incomplete -> complete, where
//! `complete` is terminal and `pending -> absent` happens on unwind so a
//! cancelled walk leaves no stale markers.

use rustc_hash::{FxHashMap, FxHashSet};

use pyz_binder::FlowNodeId;
use pyz_solver::TypeId;

use crate::result::IncompleteSubtype;

/// A cached walk result for one flow node.
#[derive(Clone, Debug)]
pub(crate) struct CacheEntry {
    pub ty: Option<TypeId>,
    pub is_incomplete: bool,
    /// Generation at which `ty` was last valid. Only meaningful while
    /// `is_incomplete` is set; completed entries never go stale.
    pub generation: u64,
    /// Loop headers only: one slot per antecedent.
    pub incomplete_subtypes: Vec<IncompleteSubtype>,
}

/// The cache for one reference under analysis.
#[derive(Debug, Default)]
pub struct FlowNodeTypeCache {
    entries: FxHashMap<FlowNodeId, CacheEntry>,
    pending: FxHashSet<FlowNodeId>,
    /// Loop-header visit counts for this query, for the forced-completion
    /// safety valve.
    visit_counts: FxHashMap<FlowNodeId, u32>,
}

impl FlowNodeTypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, node: FlowNodeId) -> Option<&CacheEntry> {
        self.entries.get(&node)
    }

    pub(crate) fn get_mut(&mut self, node: FlowNodeId) -> Option<&mut CacheEntry> {
        self.entries.get_mut(&node)
    }

    pub(crate) fn insert(&mut self, node: FlowNodeId, entry: CacheEntry) {
        debug_assert!(
            !self
                .entries
                .get(&node)
                .is_some_and(|existing| !existing.is_incomplete && entry.is_incomplete),
            "a completed entry must not regress to incomplete"
        );
        self.entries.insert(node, entry);
    }

    /// Remove a node's entry. Finally-gate results are context-dependent on
    /// the gate bit and are deleted rather than memoised.
    pub fn delete(&mut self, node: FlowNodeId) {
        self.entries.remove(&node);
    }

    pub fn is_pending(&self, node: FlowNodeId) -> bool {
        self.pending.contains(&node)
    }

    pub fn mark_pending(&mut self, node: FlowNodeId) {
        self.pending.insert(node);
    }

    pub fn clear_pending(&mut self, node: FlowNodeId) {
        self.pending.remove(&node);
    }

    /// Bump and return the visit count for a loop header.
    pub(crate) fn increment_visit_count(&mut self, node: FlowNodeId) -> u32 {
        let count = self.visit_counts.entry(node).or_insert(0);
        *count += 1;
        *count
    }
}
