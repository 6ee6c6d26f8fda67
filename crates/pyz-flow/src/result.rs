//! Flow-type results.
//!
//! Every walk produces a `FlowTypeResult`. `ty: None` means the path is
//! statically dead for the query; `is_incomplete` means the answer was
//! computed along an unresolved cycle and may still change. Incomplete
//! results carry the generation at which they were valid so stale reads can
//! be detected.

use pyz_solver::TypeId;

/// Per-query walk options.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlowTypeOptions {
    /// The caller's `type_at_start` is itself still being computed.
    pub is_type_at_start_incomplete: bool,
    /// Treat every call as returning; used while the never-returning-call
    /// analysis itself is walking a graph.
    pub skip_no_return_analysis: bool,
    /// Ignore conditional tests; assignments still apply.
    pub skip_conditional_narrowing: bool,
}

/// One antecedent slot of a loop header's incomplete cache entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncompleteSubtype {
    pub ty: Option<TypeId>,
    pub is_incomplete: bool,
    /// A walker frame is currently resolving this antecedent.
    pub is_pending: bool,
    pub evaluation_count: u32,
}

/// The result of walking the flow graph for one query point.
#[derive(Clone, Debug)]
pub struct FlowTypeResult {
    /// `None` when no type flows to the query point (the path is dead).
    pub ty: Option<TypeId>,
    pub is_incomplete: bool,
    /// For incomplete results, the generation at which `ty` was computed.
    pub generation: Option<u64>,
    /// For incomplete loop-header results, the per-antecedent slots as of
    /// this read.
    pub incomplete_subtypes: Vec<IncompleteSubtype>,
}

impl FlowTypeResult {
    pub fn complete(ty: Option<TypeId>) -> Self {
        Self {
            ty,
            is_incomplete: false,
            generation: None,
            incomplete_subtypes: Vec::new(),
        }
    }

    pub fn incomplete(ty: Option<TypeId>, generation: u64) -> Self {
        Self {
            ty,
            is_incomplete: true,
            generation: Some(generation),
            incomplete_subtypes: Vec::new(),
        }
    }

    /// The sentinel returned on a pending re-entry: an incomplete unknown
    /// that lets the caller make progress without recursing further.
    pub fn incomplete_unknown() -> Self {
        Self {
            ty: Some(TypeId::INCOMPLETE_UNKNOWN),
            is_incomplete: true,
            generation: None,
            incomplete_subtypes: Vec::new(),
        }
    }

    /// Whether the query point is reachable, for reachability-style queries
    /// (a reference-less walk reports a type iff some path reaches Start).
    pub fn is_reachable(&self) -> bool {
        self.ty.is_some()
    }
}
