//! Shared test support: a scriptable `TypeEvaluator` plus small helpers for
//! assembling flow graphs and types.
//!
//! Tests register per-node answers up front; every trait method falls back
//! to a neutral "don't know" so unscripted edges behave like edges the real
//! evaluator cannot interpret.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};

use pyz_binder::{DeclId, IndexKey, ReferenceExpr, SymbolId};
use pyz_common::{CancellationToken, Cancelled, NodeId};
use pyz_flow::{
    IsinstanceGuard, NarrowingCallback, SymbolLookup, TypeEvaluator, TypeResult, eval_flags,
};
use pyz_solver::TypeId;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
});

type NarrowingFn = Rc<dyn Fn(TypeId) -> Option<TypeId>>;

/// A `TypeEvaluator` whose answers are scripted per test.
#[derive(Default)]
pub struct ScriptedEvaluator {
    /// Answers for `eval_type_for_subnode`, consumed in order; the last
    /// entry repeats. An empty script means "no answer".
    subnode_types: RefCell<FxHashMap<NodeId, Vec<TypeResult>>>,
    expression_types: RefCell<FxHashMap<NodeId, TypeResult>>,
    declared_expression_types: RefCell<FxHashMap<NodeId, TypeResult>>,
    declared_symbol_types: RefCell<FxHashMap<SymbolId, TypeId>>,
    inferred_decl_types: RefCell<FxHashMap<(SymbolId, DeclId), TypeId>>,
    symbol_lookups: RefCell<FxHashMap<(NodeId, String), SymbolLookup>>,
    narrowing_callbacks: RefCell<FxHashMap<(String, NodeId, bool), NarrowingFn>>,
    isinstance_guards: RefCell<FxHashMap<NodeId, IsinstanceGuard>>,
    overload_returns: RefCell<FxHashMap<NodeId, TypeId>>,
    mapping_narrowing: RefCell<FxHashMap<(TypeId, IndexKey), TypeId>>,
    asymmetric_assignments: RefCell<FxHashSet<NodeId>>,
    unreachable_after: RefCell<FxHashSet<NodeId>>,
    alias_placeholders: RefCell<FxHashSet<TypeId>>,

    pub cancellation: CancellationToken,
    /// When set, cancel after this many cancellation checks.
    pub cancel_after_checks: Cell<Option<u32>>,

    // Instrumentation.
    pub subnode_eval_calls: Cell<u32>,
    pub statement_eval_calls: Cell<u32>,
    pub expression_eval_calls: Cell<u32>,
    pub speculative_regions: Cell<u32>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Lazy::force(&TRACING);
        Self::default()
    }

    pub fn set_subnode_type(&self, node: NodeId, result: TypeResult) {
        self.subnode_types.borrow_mut().insert(node, vec![result]);
    }

    /// Script a sequence of answers for repeated evaluations of one node.
    pub fn set_subnode_type_sequence(&self, node: NodeId, results: Vec<TypeResult>) {
        self.subnode_types.borrow_mut().insert(node, results);
    }

    pub fn set_expression_type(&self, node: NodeId, result: TypeResult) {
        self.expression_types.borrow_mut().insert(node, result);
    }

    pub fn set_declared_expression_type(&self, node: NodeId, result: TypeResult) {
        self.declared_expression_types
            .borrow_mut()
            .insert(node, result);
    }

    pub fn set_declared_symbol_type(&self, symbol: SymbolId, ty: TypeId) {
        self.declared_symbol_types.borrow_mut().insert(symbol, ty);
    }

    pub fn set_inferred_decl_type(&self, symbol: SymbolId, decl: DeclId, ty: TypeId) {
        self.inferred_decl_types
            .borrow_mut()
            .insert((symbol, decl), ty);
    }

    pub fn set_symbol_lookup(&self, node: NodeId, name: &str, lookup: SymbolLookup) {
        self.symbol_lookups
            .borrow_mut()
            .insert((node, name.to_string()), lookup);
    }

    /// Script the narrowing callback for (reference key, test node,
    /// polarity).
    pub fn set_narrowing(
        &self,
        reference: &ReferenceExpr,
        test: NodeId,
        is_positive: bool,
        callback: impl Fn(TypeId) -> Option<TypeId> + 'static,
    ) {
        self.narrowing_callbacks.borrow_mut().insert(
            (reference.key().as_str().to_string(), test, is_positive),
            Rc::new(callback),
        );
    }

    pub fn set_isinstance_guard(&self, test: NodeId, guard: IsinstanceGuard) {
        self.isinstance_guards.borrow_mut().insert(test, guard);
    }

    pub fn set_overload_return(&self, call: NodeId, ty: TypeId) {
        self.overload_returns.borrow_mut().insert(call, ty);
    }

    pub fn set_mapping_narrowing(&self, base: TypeId, key: IndexKey, narrowed: TypeId) {
        self.mapping_narrowing
            .borrow_mut()
            .insert((base, key), narrowed);
    }

    pub fn set_asymmetric_assignment(&self, node: NodeId) {
        self.asymmetric_assignments.borrow_mut().insert(node);
    }

    pub fn set_unreachable_after(&self, node: NodeId) {
        self.unreachable_after.borrow_mut().insert(node);
    }

    pub fn set_alias_placeholder(&self, ty: TypeId) {
        self.alias_placeholders.borrow_mut().insert(ty);
    }
}

impl TypeEvaluator for ScriptedEvaluator {
    fn eval_types_for_statement(&self, _node: NodeId) {
        self.statement_eval_calls
            .set(self.statement_eval_calls.get() + 1);
    }

    fn eval_type_for_subnode(&self, node: NodeId) -> Option<TypeResult> {
        self.subnode_eval_calls
            .set(self.subnode_eval_calls.get() + 1);
        let mut scripts = self.subnode_types.borrow_mut();
        let results = scripts.get_mut(&node)?;
        if results.len() > 1 {
            Some(results.remove(0))
        } else {
            results.first().copied()
        }
    }

    fn get_type_of_expression(&self, node: NodeId, flags: u32) -> Option<TypeResult> {
        self.expression_eval_calls
            .set(self.expression_eval_calls.get() + 1);
        if flags & eval_flags::DECLARED_TYPE_ONLY != 0 {
            return self.declared_expression_types.borrow().get(&node).copied();
        }
        if let Some(result) = self.expression_types.borrow().get(&node).copied() {
            return Some(result);
        }
        self.declared_expression_types.borrow().get(&node).copied()
    }

    fn get_declared_type_of_symbol(&self, symbol: SymbolId) -> Option<TypeId> {
        self.declared_symbol_types.borrow().get(&symbol).copied()
    }

    fn get_inferred_type_of_declaration(&self, symbol: SymbolId, decl: DeclId) -> Option<TypeId> {
        self.inferred_decl_types
            .borrow()
            .get(&(symbol, decl))
            .copied()
    }

    fn lookup_symbol_recursive(
        &self,
        node: NodeId,
        name: &str,
        _honor_code_flow: bool,
    ) -> Option<SymbolLookup> {
        self.symbol_lookups
            .borrow()
            .get(&(node, name.to_string()))
            .copied()
    }

    fn is_asymmetric_descriptor_assignment(&self, node: NodeId) -> bool {
        self.asymmetric_assignments.borrow().contains(&node)
    }

    fn is_after_node_reachable(&self, node: NodeId) -> bool {
        !self.unreachable_after.borrow().contains(&node)
    }

    fn use_speculative_mode(&self, _root: NodeId, body: &mut dyn FnMut()) {
        self.speculative_regions
            .set(self.speculative_regions.get() + 1);
        body();
    }

    fn check_for_cancellation(&self) -> Result<(), Cancelled> {
        if let Some(remaining) = self.cancel_after_checks.get() {
            if remaining == 0 {
                return Err(Cancelled);
            }
            self.cancel_after_checks.set(Some(remaining - 1));
        }
        self.cancellation.check()
    }

    fn get_type_narrowing_callback(
        &self,
        reference: &ReferenceExpr,
        test: NodeId,
        is_positive: bool,
    ) -> Option<NarrowingCallback<'_>> {
        let callback = self
            .narrowing_callbacks
            .borrow()
            .get(&(reference.key().as_str().to_string(), test, is_positive))
            .cloned()?;
        Some(Box::new(move |ty| callback(ty)))
    }

    fn get_isinstance_guard(&self, test: NodeId) -> Option<IsinstanceGuard> {
        self.isinstance_guards.borrow().get(&test).copied()
    }

    fn resolve_overload_return(&self, call: NodeId, _callee: TypeId) -> Option<TypeId> {
        self.overload_returns.borrow().get(&call).copied()
    }

    fn narrow_for_mapping_key_assignment(&self, base: TypeId, key: &IndexKey) -> Option<TypeId> {
        self.mapping_narrowing
            .borrow()
            .get(&(base, key.clone()))
            .copied()
    }

    fn is_type_alias_placeholder(&self, ty: TypeId) -> bool {
        self.alias_placeholders.borrow().contains(&ty)
    }
}

/// Shorthand for a simple name reference.
pub fn name_ref(node: u32, name: &str) -> ReferenceExpr {
    ReferenceExpr::name(NodeId(node), name)
}
