//! Flow graph construction.
//!
//! The binder drives one `FlowGraphBuilder` per execution scope while it
//! walks the scope's statements. Labels are allocated before the branches
//! that feed them, so their antecedent lists and affected-expression sets
//! grow after allocation; everything else is immutable on creation.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use pyz_common::NodeId;

use crate::flow::{
    CallSite, FlowArena, FlowNodeId, FlowNodeKind, PostContextManagerInfo, flow_flags,
};
use crate::reference::{ReferenceExpr, ReferenceKey, SymbolId};

pub struct FlowGraphBuilder {
    arena: FlowArena,
}

impl FlowGraphBuilder {
    pub fn new() -> Self {
        Self {
            arena: FlowArena::new(),
        }
    }

    /// Consume the builder, returning the finished graph.
    pub fn finish(self) -> FlowArena {
        self.arena
    }

    pub fn arena(&self) -> &FlowArena {
        &self.arena
    }

    pub fn start(&mut self) -> FlowNodeId {
        self.arena.alloc(flow_flags::START, FlowNodeKind::Start)
    }

    pub fn unreachable(&mut self) -> FlowNodeId {
        self.arena
            .alloc(flow_flags::UNREACHABLE, FlowNodeKind::Unreachable)
    }

    pub fn variable_annotation(&mut self, node: NodeId, antecedent: FlowNodeId) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::VARIABLE_ANNOTATION,
            FlowNodeKind::VariableAnnotation { node, antecedent },
        )
    }

    pub fn assignment(
        &mut self,
        target: ReferenceExpr,
        target_symbol_id: SymbolId,
        antecedent: FlowNodeId,
    ) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::ASSIGNMENT,
            FlowNodeKind::Assignment {
                target,
                target_symbol_id,
                antecedent,
            },
        )
    }

    /// An `ASSIGNMENT` node with the `UNBIND` modifier: `del target`.
    pub fn unbind(
        &mut self,
        target: ReferenceExpr,
        target_symbol_id: SymbolId,
        antecedent: FlowNodeId,
    ) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::ASSIGNMENT | flow_flags::UNBIND,
            FlowNodeKind::Assignment {
                target,
                target_symbol_id,
                antecedent,
            },
        )
    }

    pub fn assignment_alias(
        &mut self,
        antecedent: FlowNodeId,
        target_symbol_id: SymbolId,
        alias_symbol_id: SymbolId,
    ) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::ASSIGNMENT_ALIAS,
            FlowNodeKind::AssignmentAlias {
                antecedent,
                target_symbol_id,
                alias_symbol_id,
            },
        )
    }

    pub fn call(&mut self, call: CallSite, antecedent: FlowNodeId) -> FlowNodeId {
        self.arena
            .alloc(flow_flags::CALL, FlowNodeKind::Call { call, antecedent })
    }

    pub fn true_condition(&mut self, test: NodeId, antecedent: FlowNodeId) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::TRUE_CONDITION,
            FlowNodeKind::Condition { test, antecedent },
        )
    }

    pub fn false_condition(&mut self, test: NodeId, antecedent: FlowNodeId) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::FALSE_CONDITION,
            FlowNodeKind::Condition { test, antecedent },
        )
    }

    pub fn true_never_condition(
        &mut self,
        test: NodeId,
        reference: ReferenceExpr,
        antecedent: FlowNodeId,
    ) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::TRUE_NEVER_CONDITION,
            FlowNodeKind::NeverCondition {
                test,
                reference,
                antecedent,
            },
        )
    }

    pub fn false_never_condition(
        &mut self,
        test: NodeId,
        reference: ReferenceExpr,
        antecedent: FlowNodeId,
    ) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::FALSE_NEVER_CONDITION,
            FlowNodeKind::NeverCondition {
                test,
                reference,
                antecedent,
            },
        )
    }

    /// A join point. Antecedents are added as branch arms close.
    pub fn branch_label(&mut self, pre_branch_antecedent: Option<FlowNodeId>) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::BRANCH_LABEL,
            FlowNodeKind::BranchLabel {
                antecedents: SmallVec::new(),
                pre_branch_antecedent,
                affected_expressions: FxHashSet::default(),
                post_context_manager: None,
            },
        )
    }

    /// A join point that follows a `with` suite.
    pub fn post_context_manager_label(
        &mut self,
        pre_branch_antecedent: Option<FlowNodeId>,
        expressions: Vec<NodeId>,
        is_async: bool,
        activate_if_swallows: bool,
    ) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::BRANCH_LABEL | flow_flags::POST_CONTEXT_MANAGER,
            FlowNodeKind::BranchLabel {
                antecedents: SmallVec::new(),
                pre_branch_antecedent,
                affected_expressions: FxHashSet::default(),
                post_context_manager: Some(PostContextManagerInfo {
                    expressions,
                    is_async,
                    activate_if_swallows,
                }),
            },
        )
    }

    /// A loop header. The first antecedent added must be the edge entering
    /// from outside the loop.
    pub fn loop_label(&mut self) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::LOOP_LABEL,
            FlowNodeKind::LoopLabel {
                antecedents: SmallVec::new(),
                affected_expressions: FxHashSet::default(),
            },
        )
    }

    /// Append an antecedent to a label node.
    pub fn add_antecedent(&mut self, label: FlowNodeId, antecedent: FlowNodeId) {
        let node = self.arena.get_mut(label).expect("label node");
        match &mut node.kind {
            FlowNodeKind::BranchLabel { antecedents, .. }
            | FlowNodeKind::LoopLabel { antecedents, .. } => antecedents.push(antecedent),
            _ => panic!("add_antecedent on non-label flow node {label}"),
        }
    }

    /// Record that a branch feeding `label` narrows or assigns `key`.
    pub fn add_affected_expression(&mut self, label: FlowNodeId, key: ReferenceKey) {
        let node = self.arena.get_mut(label).expect("label node");
        match &mut node.kind {
            FlowNodeKind::BranchLabel {
                affected_expressions,
                ..
            }
            | FlowNodeKind::LoopLabel {
                affected_expressions,
                ..
            } => {
                affected_expressions.insert(key);
            }
            _ => panic!("add_affected_expression on non-label flow node {label}"),
        }
    }

    pub fn wildcard_import(
        &mut self,
        node: NodeId,
        names: Vec<String>,
        antecedent: FlowNodeId,
    ) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::WILDCARD_IMPORT,
            FlowNodeKind::WildcardImport {
                node,
                names,
                antecedent,
            },
        )
    }

    pub fn exhausted_match(
        &mut self,
        node: NodeId,
        subject: NodeId,
        antecedent: FlowNodeId,
    ) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::EXHAUSTED_MATCH,
            FlowNodeKind::ExhaustedMatch {
                node,
                subject,
                antecedent,
            },
        )
    }

    pub fn narrow_for_pattern(
        &mut self,
        subject: ReferenceExpr,
        type_source: NodeId,
        antecedent: FlowNodeId,
    ) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::NARROW_FOR_PATTERN,
            FlowNodeKind::NarrowForPattern {
                subject,
                type_source,
                antecedent,
            },
        )
    }

    pub fn pre_finally_gate(&mut self, antecedent: FlowNodeId) -> FlowNodeId {
        self.arena.alloc(
            flow_flags::PRE_FINALLY_GATE,
            FlowNodeKind::PreFinallyGate {
                antecedent,
                gate_closed: std::cell::Cell::new(false),
            },
        )
    }

    /// The exit of a `finally` suite. `pre_finally_gate` must name a
    /// `PreFinallyGate` node; the pair shares the gate bit.
    pub fn post_finally(
        &mut self,
        antecedent: FlowNodeId,
        pre_finally_gate: FlowNodeId,
        finally_node: NodeId,
    ) -> FlowNodeId {
        debug_assert!(
            matches!(
                self.arena.get(pre_finally_gate).map(|n| &n.kind),
                Some(FlowNodeKind::PreFinallyGate { .. })
            ),
            "post_finally must pair with a PreFinallyGate node"
        );
        self.arena.alloc(
            flow_flags::POST_FINALLY,
            FlowNodeKind::PostFinally {
                antecedent,
                pre_finally_gate,
                finally_node,
            },
        )
    }
}

impl Default for FlowGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
