//! Debug rendering of a flow graph.
//!
//! Renders the reverse CFG from a node, one line per reachable node, for
//! diagnostics and test failure output. The walk follows antecedents, so
//! the dump shows exactly the portion of the graph a backwards walker from
//! that node can observe.

use std::fmt::Write as _;

use rustc_hash::FxHashSet;

use crate::flow::{FlowArena, FlowNodeId, FlowNodeKind};

/// Render the reverse flow graph from `from`, one node per line.
pub fn dump_flow_graph(arena: &FlowArena, from: FlowNodeId) -> String {
    let mut out = String::new();
    let mut visited: FxHashSet<FlowNodeId> = FxHashSet::default();
    let mut stack = vec![from];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = arena.get(id) else {
            let _ = writeln!(out, "{id}: <missing>");
            continue;
        };

        match &node.kind {
            FlowNodeKind::Start => {
                let _ = writeln!(out, "{id}: Start");
            }
            FlowNodeKind::Unreachable => {
                let _ = writeln!(out, "{id}: Unreachable");
            }
            FlowNodeKind::VariableAnnotation { node, antecedent } => {
                let _ = writeln!(out, "{id}: Annotation({node}) <- {antecedent}");
                stack.push(*antecedent);
            }
            FlowNodeKind::Assignment {
                target,
                target_symbol_id,
                antecedent,
            } => {
                let op = if node.has_any_flags(crate::flow_flags::UNBIND) {
                    "Unbind"
                } else {
                    "Assign"
                };
                let _ = writeln!(
                    out,
                    "{id}: {op}({target}, sym={}) <- {antecedent}",
                    target_symbol_id.0
                );
                stack.push(*antecedent);
            }
            FlowNodeKind::AssignmentAlias {
                antecedent,
                target_symbol_id,
                alias_symbol_id,
            } => {
                let _ = writeln!(
                    out,
                    "{id}: Alias(sym={} -> sym={}) <- {antecedent}",
                    target_symbol_id.0, alias_symbol_id.0
                );
                stack.push(*antecedent);
            }
            FlowNodeKind::Call { call, antecedent } => {
                let awaited = if call.is_awaited { " await" } else { "" };
                let _ = writeln!(out, "{id}: Call({}{awaited}) <- {antecedent}", call.node);
                stack.push(*antecedent);
            }
            FlowNodeKind::Condition { test, antecedent } => {
                let polarity = if node.has_any_flags(crate::flow_flags::TRUE_CONDITION) {
                    "True"
                } else {
                    "False"
                };
                let _ = writeln!(out, "{id}: {polarity}Condition({test}) <- {antecedent}");
                stack.push(*antecedent);
            }
            FlowNodeKind::NeverCondition {
                test,
                reference,
                antecedent,
            } => {
                let polarity = if node.has_any_flags(crate::flow_flags::TRUE_NEVER_CONDITION) {
                    "True"
                } else {
                    "False"
                };
                let _ = writeln!(
                    out,
                    "{id}: {polarity}NeverCondition({test}, ref={reference}) <- {antecedent}"
                );
                stack.push(*antecedent);
            }
            FlowNodeKind::BranchLabel {
                antecedents,
                pre_branch_antecedent,
                affected_expressions,
                post_context_manager,
            } => {
                let mut detail = String::new();
                if let Some(pre) = pre_branch_antecedent {
                    let _ = write!(detail, " pre={pre}");
                }
                if !affected_expressions.is_empty() {
                    let mut keys: Vec<&str> =
                        affected_expressions.iter().map(|k| k.as_str()).collect();
                    keys.sort_unstable();
                    let _ = write!(detail, " affected={{{}}}", keys.join(", "));
                }
                if let Some(pcm) = post_context_manager {
                    let _ = write!(
                        detail,
                        " post_with(activate_if_swallows={})",
                        pcm.activate_if_swallows
                    );
                }
                let _ = writeln!(out, "{id}: BranchLabel{detail} <- {}", render_ids(antecedents));
                stack.extend(antecedents.iter().copied());
                if let Some(pre) = pre_branch_antecedent {
                    stack.push(*pre);
                }
            }
            FlowNodeKind::LoopLabel { antecedents, .. } => {
                let _ = writeln!(out, "{id}: LoopLabel <- {}", render_ids(antecedents));
                stack.extend(antecedents.iter().copied());
            }
            FlowNodeKind::WildcardImport {
                node: import_node,
                names,
                antecedent,
            } => {
                let _ = writeln!(
                    out,
                    "{id}: WildcardImport({import_node}, names=[{}]) <- {antecedent}",
                    names.join(", ")
                );
                stack.push(*antecedent);
            }
            FlowNodeKind::ExhaustedMatch {
                node: match_node,
                antecedent,
                ..
            } => {
                let _ = writeln!(out, "{id}: ExhaustedMatch({match_node}) <- {antecedent}");
                stack.push(*antecedent);
            }
            FlowNodeKind::NarrowForPattern {
                subject,
                antecedent,
                ..
            } => {
                let _ = writeln!(out, "{id}: NarrowForPattern({subject}) <- {antecedent}");
                stack.push(*antecedent);
            }
            FlowNodeKind::PreFinallyGate {
                antecedent,
                gate_closed,
            } => {
                let state = if gate_closed.get() { "closed" } else { "open" };
                let _ = writeln!(out, "{id}: PreFinallyGate({state}) <- {antecedent}");
                stack.push(*antecedent);
            }
            FlowNodeKind::PostFinally {
                antecedent,
                pre_finally_gate,
                ..
            } => {
                let _ = writeln!(
                    out,
                    "{id}: PostFinally(gate={pre_finally_gate}) <- {antecedent}"
                );
                stack.push(*antecedent);
            }
        }
    }

    out
}

fn render_ids(ids: &[FlowNodeId]) -> String {
    let rendered: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}
