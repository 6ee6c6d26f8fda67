mod support;

use pyz_binder::{CallSite, FlowGraphBuilder, SymbolId};
use pyz_common::NodeId;
use pyz_flow::{CodeFlowEngine, TypeResult};
use pyz_solver::{FunctionDef, TypeId, TypeInterner};
use support::{ScriptedEvaluator, name_ref};

fn never_fn(types: &TypeInterner) -> TypeId {
    types.function(FunctionDef {
        name: "exit".to_string(),
        declared_return: Some(TypeId::NEVER),
        flags: 0,
        body_end: None,
    })
}

#[test]
fn test_linear_chain_is_reachable() {
    let types = TypeInterner::new();
    let evaluator = ScriptedEvaluator::new();
    let mut builder = FlowGraphBuilder::new();
    let start = builder.start();
    let assign = builder.assignment(name_ref(1, "x"), SymbolId(0), start);
    let cond = builder.true_condition(NodeId(2), assign);
    let arena = builder.finish();

    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);
    assert!(engine.is_flow_node_reachable(cond, None, false));
    assert!(engine.is_flow_node_reachable(start, None, false));
}

#[test]
fn test_unreachable_sink_is_not_reachable() {
    let types = TypeInterner::new();
    let evaluator = ScriptedEvaluator::new();
    let mut builder = FlowGraphBuilder::new();
    let dead = builder.unreachable();
    let after = builder.variable_annotation(NodeId(1), dead);
    let arena = builder.finish();

    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);
    assert!(!engine.is_flow_node_reachable(after, None, false));
}

#[test]
fn test_no_return_call_blocks_reachability() {
    let types = TypeInterner::new();
    let exit_fn = never_fn(&types);
    let evaluator = ScriptedEvaluator::new();
    let mut builder = FlowGraphBuilder::new();
    let start = builder.start();
    let call = builder.call(
        CallSite {
            node: NodeId(10),
            callee: NodeId(11),
            is_awaited: false,
        },
        start,
    );
    let after = builder.variable_annotation(NodeId(12), call);
    let arena = builder.finish();

    evaluator.set_declared_expression_type(NodeId(11), TypeResult::complete(exit_fn));

    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);
    assert!(!engine.is_flow_node_reachable(after, None, false));
    assert!(engine.is_flow_node_reachable(after, None, true), "ignore_no_return walks past the call");
}

#[test]
fn test_source_node_query() {
    let types = TypeInterner::new();
    let evaluator = ScriptedEvaluator::new();
    let mut builder = FlowGraphBuilder::new();
    let start = builder.start();
    let a = builder.assignment(name_ref(1, "x"), SymbolId(0), start);
    let b = builder.assignment(name_ref(2, "y"), SymbolId(1), a);
    let arena = builder.finish();

    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);
    // b is reachable from a, but a is not reachable from b.
    assert!(engine.is_flow_node_reachable(b, Some(a), false));
    assert!(!engine.is_flow_node_reachable(a, Some(b), false));
    // With a source requested, reaching Start is not success.
    assert!(!engine.is_flow_node_reachable(a, Some(b), true));
}

#[test]
fn test_branch_reachable_through_any_antecedent() {
    let types = TypeInterner::new();
    let evaluator = ScriptedEvaluator::new();
    let mut builder = FlowGraphBuilder::new();
    let start = builder.start();
    let dead = builder.unreachable();
    let join = builder.branch_label(None);
    builder.add_antecedent(join, dead);
    builder.add_antecedent(join, start);
    let arena = builder.finish();

    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);
    assert!(engine.is_flow_node_reachable(join, None, false));
}

#[test]
fn test_branch_with_only_dead_antecedents_is_unreachable() {
    let types = TypeInterner::new();
    let evaluator = ScriptedEvaluator::new();
    let mut builder = FlowGraphBuilder::new();
    let dead_a = builder.unreachable();
    let dead_b = builder.unreachable();
    let join = builder.branch_label(None);
    builder.add_antecedent(join, dead_a);
    builder.add_antecedent(join, dead_b);
    let arena = builder.finish();

    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);
    assert!(!engine.is_flow_node_reachable(join, None, false));
}

#[test]
fn test_post_context_manager_label_gating() {
    let types = TypeInterner::new();
    let suppress = types.declare_class("suppress");
    let exit_fn = types.function(FunctionDef {
        name: "__exit__".to_string(),
        declared_return: Some(types.bool_instance()),
        flags: 0,
        body_end: None,
    });
    types.add_class_member(suppress, "__exit__", exit_fn);
    let manager = types.instance(suppress);

    let evaluator = ScriptedEvaluator::new();
    let manager_expr = NodeId(30);
    evaluator.set_declared_expression_type(manager_expr, TypeResult::complete(manager));

    let mut builder = FlowGraphBuilder::new();
    let start = builder.start();
    // The exceptional path after a `with` body: live only if a manager
    // swallows the exception.
    let except_label = builder.post_context_manager_label(None, vec![manager_expr], false, true);
    builder.add_antecedent(except_label, start);
    // The mirror label, live only if no manager swallows.
    let clean_label = builder.post_context_manager_label(None, vec![manager_expr], false, false);
    builder.add_antecedent(clean_label, start);
    let arena = builder.finish();

    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);
    assert!(engine.is_flow_node_reachable(except_label, None, false));
    assert!(!engine.is_flow_node_reachable(clean_label, None, false));
}

#[test]
fn test_closed_gate_blocks_reachability_and_is_restored() {
    let types = TypeInterner::new();
    let evaluator = ScriptedEvaluator::new();
    let mut builder = FlowGraphBuilder::new();
    let start = builder.start();
    let gate = builder.pre_finally_gate(start);
    let finally_body = builder.variable_annotation(NodeId(1), gate);
    let post = builder.post_finally(finally_body, gate, NodeId(2));
    let arena = builder.finish();

    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);

    // Walking through PostFinally closes the gate for the duration of the
    // walk, so the only path (through the gate) is blocked.
    assert!(!engine.is_flow_node_reachable(post, None, false));
    assert!(!arena.is_gate_closed(gate), "the gate must be restored");

    // Queried directly (gate open) the finally body is reachable.
    assert!(engine.is_flow_node_reachable(finally_body, None, false));
}

#[test]
fn test_diamond_visits_each_node_once() {
    let types = TypeInterner::new();
    let evaluator = ScriptedEvaluator::new();
    let mut builder = FlowGraphBuilder::new();
    let start = builder.start();
    let t_edge = builder.true_condition(NodeId(1), start);
    let f_edge = builder.false_condition(NodeId(1), start);
    let join = builder.branch_label(Some(start));
    builder.add_antecedent(join, t_edge);
    builder.add_antecedent(join, f_edge);
    let arena = builder.finish();

    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);
    assert!(engine.is_flow_node_reachable(join, None, false));
}

#[test]
fn test_loop_header_reachability() {
    let types = TypeInterner::new();
    let evaluator = ScriptedEvaluator::new();
    let mut builder = FlowGraphBuilder::new();
    let start = builder.start();
    let header = builder.loop_label();
    builder.add_antecedent(header, start);
    let body = builder.variable_annotation(NodeId(1), header);
    builder.add_antecedent(header, body);
    let arena = builder.finish();

    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);
    assert!(engine.is_flow_node_reachable(header, None, false));
    assert!(engine.is_flow_node_reachable(body, None, false));
}

#[test]
fn test_adding_an_edge_preserves_reachability() {
    // Reachability is monotone: a graph extended with one more antecedent
    // cannot lose a reachable verdict.
    let types = TypeInterner::new();
    let evaluator = ScriptedEvaluator::new();

    let mut builder = FlowGraphBuilder::new();
    let start = builder.start();
    let join = builder.branch_label(None);
    builder.add_antecedent(join, start);
    let arena = builder.finish();
    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);
    assert!(engine.is_flow_node_reachable(join, None, false));

    let mut builder = FlowGraphBuilder::new();
    let start = builder.start();
    let dead = builder.unreachable();
    let join = builder.branch_label(None);
    builder.add_antecedent(join, start);
    builder.add_antecedent(join, dead);
    let arena = builder.finish();
    let engine = CodeFlowEngine::new(&arena, &types, &evaluator);
    assert!(engine.is_flow_node_reachable(join, None, false));
}
