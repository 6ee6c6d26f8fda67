//! Boolean reachability over the flow graph.
//!
//! The same backwards edge semantics as the type walker, without any type
//! computation: a node is reachable if some antecedent path leads to Start
//! (or to a requested source node) without crossing a dead edge. Most node
//! kinds are pass-through here and share one flags-mask dispatch.

use rustc_hash::FxHashSet;

use pyz_binder::{FlowNodeId, FlowNodeKind, flow_flags};
use pyz_common::limits::MAX_REACHABILITY_RECURSION_DEPTH;

use crate::engine::CodeFlowEngine;

/// Kinds that neither terminate nor fork the reachability walk.
const PASS_THROUGH_FLAGS: u32 = flow_flags::VARIABLE_ANNOTATION
    | flow_flags::ASSIGNMENT
    | flow_flags::ASSIGNMENT_ALIAS
    | flow_flags::WILDCARD_IMPORT
    | flow_flags::NARROW_FOR_PATTERN
    | flow_flags::EXHAUSTED_MATCH
    | flow_flags::CONDITION
    | flow_flags::NEVER_CONDITION;

impl CodeFlowEngine<'_> {
    /// Whether `flow_node` is reachable from Start, or from `source` when
    /// one is given. `ignore_no_return` treats every call as returning.
    pub fn is_flow_node_reachable(
        &self,
        flow_node: FlowNodeId,
        source: Option<FlowNodeId>,
        ignore_no_return: bool,
    ) -> bool {
        // A recursive caller asking about a node already under query gets a
        // conservative "reachable" instead of unbounded re-entry.
        if !self.reachability_in_progress.borrow_mut().insert(flow_node) {
            return true;
        }
        let mut visited: FxHashSet<FlowNodeId> = FxHashSet::default();
        let result =
            self.is_reachable_recursive(flow_node, source, ignore_no_return, &mut visited, 0);
        self.reachability_in_progress.borrow_mut().remove(&flow_node);
        result
    }

    fn is_reachable_recursive(
        &self,
        flow_node: FlowNodeId,
        source: Option<FlowNodeId>,
        ignore_no_return: bool,
        visited: &mut FxHashSet<FlowNodeId>,
        recursion_depth: u32,
    ) -> bool {
        if recursion_depth > MAX_REACHABILITY_RECURSION_DEPTH {
            // Too deep to decide; err on the side of reachable.
            return true;
        }

        let mut cur = flow_node;
        loop {
            // Each node contributes at most once per query.
            if !visited.insert(cur) {
                return false;
            }
            let Some(node) = self.graph.get(cur) else {
                debug_assert!(false, "flow graph has no node {cur}");
                return false;
            };

            if node.has_any_flags(flow_flags::UNREACHABLE) {
                return false;
            }
            if Some(cur) == source {
                return true;
            }

            if node.has_any_flags(PASS_THROUGH_FLAGS) {
                let Some(antecedent) = node.single_antecedent() else {
                    return false;
                };
                cur = antecedent;
                continue;
            }

            match &node.kind {
                FlowNodeKind::Start => {
                    return source.is_none();
                }

                FlowNodeKind::Call { call, antecedent } => {
                    if !ignore_no_return && self.is_call_no_return(call) {
                        return false;
                    }
                    cur = *antecedent;
                }

                FlowNodeKind::PreFinallyGate {
                    antecedent,
                    gate_closed,
                } => {
                    if gate_closed.get() {
                        return false;
                    }
                    cur = *antecedent;
                }

                FlowNodeKind::PostFinally {
                    antecedent,
                    pre_finally_gate,
                    ..
                } => {
                    let was_closed = self.graph.set_gate_closed(*pre_finally_gate, true);
                    let result = self.is_reachable_recursive(
                        *antecedent,
                        source,
                        ignore_no_return,
                        visited,
                        recursion_depth + 1,
                    );
                    self.graph.set_gate_closed(*pre_finally_gate, was_closed);
                    return result;
                }

                FlowNodeKind::BranchLabel {
                    antecedents,
                    post_context_manager,
                    ..
                } => {
                    if let Some(pcm) = post_context_manager {
                        let swallows = pcm
                            .expressions
                            .iter()
                            .any(|&expr| self.is_exception_context_manager(expr, pcm.is_async));
                        if swallows != pcm.activate_if_swallows {
                            return false;
                        }
                    }
                    for &antecedent in antecedents {
                        if self.is_reachable_recursive(
                            antecedent,
                            source,
                            ignore_no_return,
                            visited,
                            recursion_depth + 1,
                        ) {
                            return true;
                        }
                    }
                    return false;
                }

                FlowNodeKind::LoopLabel { antecedents, .. } => {
                    for &antecedent in antecedents {
                        if self.is_reachable_recursive(
                            antecedent,
                            source,
                            ignore_no_return,
                            visited,
                            recursion_depth + 1,
                        ) {
                            return true;
                        }
                    }
                    return false;
                }

                FlowNodeKind::Unreachable => {
                    return false;
                }

                other => {
                    debug_assert!(false, "kind not covered by pass-through mask: {other:?}");
                    return false;
                }
            }
        }
    }
}
