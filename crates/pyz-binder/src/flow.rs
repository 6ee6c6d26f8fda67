//! Flow nodes and the flow-node arena.
//!
//! Every vertex of the control-flow graph is a `FlowNode`: a `u32` flags
//! bitset identifying its kind plus a tagged payload. The bitset is the fast
//! dispatch path for walkers that treat several kinds identically (the
//! reachability walker passes through six of them with one mask test); the
//! `FlowNodeKind` payload is authoritative for everything else.
//!
//! Antecedents are stored as ids into the owning `FlowArena`, never as
//! references, because the graph is irreducible: loop headers have edges
//! both into and out of the cycle they head.

use std::cell::Cell;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use pyz_common::NodeId;

use crate::reference::{ReferenceExpr, ReferenceKey, SymbolId};

/// Index of a flow node in its `FlowArena`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct FlowNodeId(pub u32);

impl FlowNodeId {
    pub const NONE: FlowNodeId = FlowNodeId(u32::MAX);

    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

impl std::fmt::Display for FlowNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Flow node kind flags.
///
/// Exactly one primary kind flag is set per node; `UNBIND` and
/// `POST_CONTEXT_MANAGER` are modifiers. The composite masks at the bottom
/// group kinds that share handling in the walkers.
pub mod flow_flags {
    pub const UNREACHABLE: u32 = 1 << 0;
    pub const START: u32 = 1 << 1;
    pub const ASSIGNMENT: u32 = 1 << 2;
    pub const ASSIGNMENT_ALIAS: u32 = 1 << 3;
    pub const TRUE_CONDITION: u32 = 1 << 4;
    pub const FALSE_CONDITION: u32 = 1 << 5;
    pub const LOOP_LABEL: u32 = 1 << 6;
    pub const BRANCH_LABEL: u32 = 1 << 7;
    pub const CALL: u32 = 1 << 8;
    pub const PRE_FINALLY_GATE: u32 = 1 << 9;
    pub const POST_FINALLY: u32 = 1 << 10;
    pub const VARIABLE_ANNOTATION: u32 = 1 << 11;
    pub const WILDCARD_IMPORT: u32 = 1 << 12;
    pub const TRUE_NEVER_CONDITION: u32 = 1 << 13;
    pub const FALSE_NEVER_CONDITION: u32 = 1 << 14;
    pub const NARROW_FOR_PATTERN: u32 = 1 << 15;
    pub const EXHAUSTED_MATCH: u32 = 1 << 16;

    /// Modifier on `ASSIGNMENT`: the target is deleted (`del x`), not bound.
    pub const UNBIND: u32 = 1 << 17;
    /// Modifier on `BRANCH_LABEL`: the label follows a `with` suite and
    /// carries context-manager expressions.
    pub const POST_CONTEXT_MANAGER: u32 = 1 << 18;

    pub const CONDITION: u32 = TRUE_CONDITION | FALSE_CONDITION;
    pub const NEVER_CONDITION: u32 = TRUE_NEVER_CONDITION | FALSE_NEVER_CONDITION;
    pub const LABEL: u32 = BRANCH_LABEL | LOOP_LABEL;
}

/// A call site recorded on a `Call` flow node.
#[derive(Clone, Debug)]
pub struct CallSite {
    /// The call expression itself.
    pub node: NodeId,
    /// The callee sub-expression.
    pub callee: NodeId,
    /// Whether the call appears directly under an `await`.
    pub is_awaited: bool,
}

/// Context-manager metadata attached to a post-`with` branch label.
#[derive(Clone, Debug)]
pub struct PostContextManagerInfo {
    /// The context-manager expressions of the `with` statement.
    pub expressions: Vec<NodeId>,
    /// Whether this is an `async with`.
    pub is_async: bool,
    /// The label models the exceptional path out of the `with` body iff this
    /// bit is set; the edge is live only when suppression agreement holds.
    pub activate_if_swallows: bool,
}

/// Payload of a flow node. One variant per kind; modifiers live in the
/// node's flags.
#[derive(Debug)]
pub enum FlowNodeKind {
    /// Entry of an execution scope.
    Start,
    /// Sink for statically dead code.
    Unreachable,
    /// A bare annotation (`x: T`). Pass-through.
    VariableAnnotation { node: NodeId, antecedent: FlowNodeId },
    /// A binding (or, with the `UNBIND` flag, a `del`) of a target.
    Assignment {
        target: ReferenceExpr,
        target_symbol_id: SymbolId,
        antecedent: FlowNodeId,
    },
    /// Pass-through that retargets the walker's symbol id: downstream of
    /// this node, narrowing on `target_symbol_id` continues as
    /// `alias_symbol_id`.
    AssignmentAlias {
        antecedent: FlowNodeId,
        target_symbol_id: SymbolId,
        alias_symbol_id: SymbolId,
    },
    /// A call; terminates the walk when the callee cannot return.
    Call { call: CallSite, antecedent: FlowNodeId },
    /// The true or false edge of a test (polarity in flags). Narrows a
    /// reference that the test mentions.
    Condition { test: NodeId, antecedent: FlowNodeId },
    /// Like `Condition`, but the test mentions `reference`, which is not the
    /// reference under analysis; used only to rule out edges where that
    /// other reference collapses to Never.
    NeverCondition {
        test: NodeId,
        reference: ReferenceExpr,
        antecedent: FlowNodeId,
    },
    /// Join point. `pre_branch_antecedent` is the flow just before the
    /// branch opened; `affected_expressions` holds the keys of every
    /// reference the branch narrows or assigns.
    BranchLabel {
        antecedents: SmallVec<[FlowNodeId; 4]>,
        pre_branch_antecedent: Option<FlowNodeId>,
        affected_expressions: FxHashSet<ReferenceKey>,
        post_context_manager: Option<PostContextManagerInfo>,
    },
    /// Loop header. Antecedent 0 is by convention the edge entering from
    /// outside the loop.
    LoopLabel {
        antecedents: SmallVec<[FlowNodeId; 4]>,
        affected_expressions: FxHashSet<ReferenceKey>,
    },
    /// A `from m import *` edge introducing `names`.
    WildcardImport {
        node: NodeId,
        names: Vec<String>,
        antecedent: FlowNodeId,
    },
    /// The point after a `match` statement whose cases are exhaustive.
    ExhaustedMatch {
        node: NodeId,
        subject: NodeId,
        antecedent: FlowNodeId,
    },
    /// Narrowing introduced by a `case` pattern or match head. `type_source`
    /// is the node whose evaluated type is the narrowed subject type.
    NarrowForPattern {
        subject: ReferenceExpr,
        type_source: NodeId,
        antecedent: FlowNodeId,
    },
    /// Open/closed gate in front of a `finally` suite. The suite is walked
    /// twice: gate open models the try body completing, gate closed models
    /// it raising. The bit is mutated only in a scoped save/restore.
    PreFinallyGate {
        antecedent: FlowNodeId,
        gate_closed: Cell<bool>,
    },
    /// Exit of a `finally` suite; paired with exactly one `PreFinallyGate`.
    PostFinally {
        antecedent: FlowNodeId,
        pre_finally_gate: FlowNodeId,
        finally_node: NodeId,
    },
}

/// A vertex of the control-flow graph.
#[derive(Debug)]
pub struct FlowNode {
    pub id: FlowNodeId,
    pub flags: u32,
    pub kind: FlowNodeKind,
}

impl FlowNode {
    /// Check if any of the given flags is set on this node.
    pub const fn has_any_flags(&self, flags: u32) -> bool {
        (self.flags & flags) != 0
    }

    /// The single antecedent of a non-label node, `None` for labels,
    /// `Start`, and `Unreachable`.
    pub fn single_antecedent(&self) -> Option<FlowNodeId> {
        match &self.kind {
            FlowNodeKind::Start | FlowNodeKind::Unreachable => None,
            FlowNodeKind::VariableAnnotation { antecedent, .. }
            | FlowNodeKind::Assignment { antecedent, .. }
            | FlowNodeKind::AssignmentAlias { antecedent, .. }
            | FlowNodeKind::Call { antecedent, .. }
            | FlowNodeKind::Condition { antecedent, .. }
            | FlowNodeKind::NeverCondition { antecedent, .. }
            | FlowNodeKind::WildcardImport { antecedent, .. }
            | FlowNodeKind::ExhaustedMatch { antecedent, .. }
            | FlowNodeKind::NarrowForPattern { antecedent, .. }
            | FlowNodeKind::PreFinallyGate { antecedent, .. }
            | FlowNodeKind::PostFinally { antecedent, .. } => Some(*antecedent),
            FlowNodeKind::BranchLabel { .. } | FlowNodeKind::LoopLabel { .. } => None,
        }
    }

    /// The antecedent list of a label node; empty for all other kinds.
    pub fn label_antecedents(&self) -> &[FlowNodeId] {
        match &self.kind {
            FlowNodeKind::BranchLabel { antecedents, .. }
            | FlowNodeKind::LoopLabel { antecedents, .. } => antecedents,
            _ => &[],
        }
    }
}

/// Arena storage for the flow nodes of one execution scope.
///
/// Immutable once the binder finishes a scope; walkers share it by
/// reference. The only interior mutability is the finally-gate bit, which is
/// flipped under a scoped save/restore during analysis.
#[derive(Debug, Default)]
pub struct FlowArena {
    nodes: Vec<FlowNode>,
}

impl FlowArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node, returning its id. `flags` must contain the primary
    /// kind flag matching `kind`; modifiers may be or'ed in.
    pub fn alloc(&mut self, flags: u32, kind: FlowNodeKind) -> FlowNodeId {
        let id = FlowNodeId(self.nodes.len() as u32);
        self.nodes.push(FlowNode { id, flags, kind });
        id
    }

    pub fn get(&self, id: FlowNodeId) -> Option<&FlowNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: FlowNodeId) -> Option<&mut FlowNode> {
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.iter()
    }

    /// The gate bit of a `PreFinallyGate` node.
    pub fn is_gate_closed(&self, gate: FlowNodeId) -> bool {
        match self.get(gate).map(|n| &n.kind) {
            Some(FlowNodeKind::PreFinallyGate { gate_closed, .. }) => gate_closed.get(),
            _ => false,
        }
    }

    /// Set the gate bit of a `PreFinallyGate` node, returning the previous
    /// value. Callers must restore the previous value when they are done.
    pub fn set_gate_closed(&self, gate: FlowNodeId, closed: bool) -> bool {
        match self.get(gate).map(|n| &n.kind) {
            Some(FlowNodeKind::PreFinallyGate { gate_closed, .. }) => gate_closed.replace(closed),
            _ => false,
        }
    }
}
