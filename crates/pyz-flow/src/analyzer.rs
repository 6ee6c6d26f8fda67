//! The flow walker.
//!
//! `FlowAnalyzer::get_type_from_code_flow` answers "what is the type of this
//! reference at this flow node". The walker moves backwards from the query
//! node along antecedents: assignments terminate the walk with the assigned
//! type, conditional edges narrow the type flowing through them, join points
//! union their antecedents, and loop headers iterate to a fixed point using
//! the incomplete-type protocol.
//!
//! Recursion through the irreducible graph is tamed by three devices that
//! work together:
//! - a pending set per reference cache: a node already on the walker stack
//!   answers with an incomplete-unknown sentinel instead of recursing;
//! - incomplete cache entries: partial answers along a cycle, readable only
//!   while the engine generation they were written at is still current;
//! - the generation counter: bumped whenever an entry completes or an
//!   incomplete entry materially changes, which invalidates every stale
//!   incomplete read that depended on it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::trace;

use pyz_binder::{
    FlowNodeId, FlowNodeKind, IndexKey, ReferenceExpr, ReferenceKey, SymbolId, flow_flags,
};
use pyz_common::Cancelled;
use pyz_common::limits::{MAX_FLOW_INVOCATIONS_PER_LOOP, MAX_FLOW_NODE_VISIT_COUNT};
use pyz_solver::TypeId;

use crate::cache::{CacheEntry, FlowNodeTypeCache};
use crate::engine::CodeFlowEngine;
use crate::result::{FlowTypeOptions, FlowTypeResult, IncompleteSubtype};
use crate::speculative::SharedFlowCache;

type CacheKey = (Option<ReferenceKey>, Option<SymbolId>);

/// Per-query analyzer. Owns one flow-node cache per reference under
/// analysis; the caches die with the analyzer when the top-level query
/// completes.
pub struct FlowAnalyzer<'e, 'a> {
    engine: &'e CodeFlowEngine<'a>,
    caches: RefCell<FxHashMap<CacheKey, SharedFlowCache>>,
    call_count: Cell<u32>,
}

impl<'e, 'a> FlowAnalyzer<'e, 'a> {
    pub(crate) fn new(engine: &'e CodeFlowEngine<'a>) -> Self {
        Self {
            engine,
            caches: RefCell::new(FxHashMap::default()),
            call_count: Cell::new(0),
        }
    }

    /// The statically known type of `reference` at `flow_node`.
    ///
    /// With `reference == None` this is a reachability-style query: a
    /// non-`None` result type (conventionally `type_at_start`) means the
    /// point is reachable.
    pub fn get_type_from_code_flow(
        &self,
        flow_node: FlowNodeId,
        reference: Option<&ReferenceExpr>,
        target_symbol_id: Option<SymbolId>,
        type_at_start: TypeId,
        options: FlowTypeOptions,
    ) -> Result<FlowTypeResult, Cancelled> {
        let cache = self.cache_for(reference, target_symbol_id);
        let sub_keys = reference.map(|r| r.sub_reference_keys()).unwrap_or_default();
        let walk = FlowWalk {
            analyzer: self,
            cache,
            reference,
            sub_keys,
            type_at_start,
            options,
        };
        walk.get_type_from_flow_node(flow_node, target_symbol_id)
    }

    /// Walker invocations made through this analyzer so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.get()
    }

    /// The shared flow cache for a reference, for speculative-entry
    /// tracking by the evaluator.
    pub fn cache_for(
        &self,
        reference: Option<&ReferenceExpr>,
        symbol: Option<SymbolId>,
    ) -> SharedFlowCache {
        let key = (reference.map(|r| r.key()), symbol);
        Rc::clone(
            self.caches
                .borrow_mut()
                .entry(key)
                .or_insert_with(|| Rc::new(RefCell::new(FlowNodeTypeCache::new()))),
        )
    }
}

/// One walk over the graph: a query's reference, options, and the cache it
/// reads and writes. The target symbol id is threaded as a parameter
/// because alias edges substitute it mid-walk.
struct FlowWalk<'w, 'e, 'a> {
    analyzer: &'w FlowAnalyzer<'e, 'a>,
    cache: SharedFlowCache,
    reference: Option<&'w ReferenceExpr>,
    /// Keys of the reference and all of its bases, for the branch-skip test.
    sub_keys: Vec<ReferenceKey>,
    type_at_start: TypeId,
    options: FlowTypeOptions,
}

impl<'e, 'a> FlowWalk<'_, 'e, 'a> {
    fn engine(&self) -> &'e CodeFlowEngine<'a> {
        self.analyzer.engine
    }

    fn get_type_from_flow_node(
        &self,
        flow_node: FlowNodeId,
        mut target_symbol: Option<SymbolId>,
    ) -> Result<FlowTypeResult, Cancelled> {
        let engine = self.engine();
        let mut cur = flow_node;

        loop {
            engine.evaluator.check_for_cancellation()?;
            self.analyzer
                .call_count
                .set(self.analyzer.call_count.get() + 1);

            {
                let cache = self.cache.borrow();
                if cache.is_pending(cur) {
                    return Ok(FlowTypeResult::incomplete_unknown());
                }
                if let Some(entry) = cache.get(cur) {
                    if !entry.is_incomplete {
                        return Ok(FlowTypeResult::complete(entry.ty));
                    }
                    if entry.generation == engine.generation() {
                        // A valid partial answer; strip cycle dust so it does
                        // not pollute the caller's union.
                        let ty = entry.ty.map(|t| engine.types.remove_incomplete_unknown(t));
                        return Ok(FlowTypeResult::incomplete(ty, entry.generation));
                    }
                    // Stale incomplete read: something it depended on has
                    // changed. Fall through and re-evaluate the node.
                }
            }

            let Some(node) = engine.graph.get(cur) else {
                debug_assert!(false, "flow graph has no node {cur}");
                return Ok(FlowTypeResult::complete(None));
            };

            match &node.kind {
                FlowNodeKind::Unreachable => {
                    return Ok(self.set_cache_entry(cur, None, false));
                }

                FlowNodeKind::Start => {
                    // The caller supplies the Start edge's answer; nothing
                    // may override it, so it is never cached.
                    return Ok(FlowTypeResult {
                        ty: Some(self.type_at_start),
                        is_incomplete: self.options.is_type_at_start_incomplete,
                        generation: None,
                        incomplete_subtypes: Vec::new(),
                    });
                }

                FlowNodeKind::VariableAnnotation { antecedent, .. } => {
                    cur = *antecedent;
                }

                FlowNodeKind::AssignmentAlias {
                    antecedent,
                    target_symbol_id,
                    alias_symbol_id,
                } => {
                    if target_symbol == Some(*target_symbol_id) {
                        target_symbol = Some(*alias_symbol_id);
                    }
                    cur = *antecedent;
                }

                FlowNodeKind::Call { call, antecedent } => {
                    if !self.options.skip_no_return_analysis && engine.is_call_no_return(call) {
                        trace!(call = %call.node, "call cannot return; path is dead");
                        return Ok(self.set_cache_entry(cur, None, false));
                    }
                    cur = *antecedent;
                }

                FlowNodeKind::Assignment {
                    target,
                    target_symbol_id,
                    antecedent,
                } => {
                    let Some(reference) = self.reference else {
                        cur = *antecedent;
                        continue;
                    };

                    let symbol_matches =
                        target_symbol.is_none() || target_symbol == Some(*target_symbol_id);
                    if symbol_matches && target.matches(reference) {
                        if node.has_any_flags(flow_flags::UNBIND) {
                            return Ok(self.set_cache_entry(cur, Some(TypeId::UNBOUND), false));
                        }
                        return self.eval_assignment(cur, target);
                    }

                    // Assignment into a literal key of the reference itself
                    // (`x["k"] = ...` while tracking `x`) refines the base's
                    // mapping type in place.
                    if let ReferenceExpr::Index { base, key, .. } = target {
                        if !matches!(key, IndexKey::Dynamic(_)) && base.matches(reference) {
                            return self.narrow_for_mapping_key(cur, *antecedent, key, target_symbol);
                        }
                    }

                    if target.matches_base_of(reference) {
                        // The write rebinds a prefix of the reference; all
                        // prior narrowing is invalidated.
                        return Ok(self.set_cache_entry(
                            cur,
                            Some(self.type_at_start),
                            self.options.is_type_at_start_incomplete,
                        ));
                    }

                    cur = *antecedent;
                }

                FlowNodeKind::Condition { test, antecedent } => {
                    let antecedent_id = *antecedent;
                    if self.options.skip_conditional_narrowing {
                        cur = antecedent_id;
                        continue;
                    }
                    let Some(reference) = self.reference else {
                        cur = antecedent_id;
                        continue;
                    };
                    let is_positive = node.has_any_flags(flow_flags::TRUE_CONDITION);
                    let Some(callback) =
                        engine
                            .evaluator
                            .get_type_narrowing_callback(reference, *test, is_positive)
                    else {
                        cur = antecedent_id;
                        continue;
                    };
                    let node_id = cur;
                    return self.with_pending(node_id, || {
                        let result = self.get_type_from_flow_node(antecedent_id, target_symbol)?;
                        let Some(ty) = result.ty else {
                            return Ok(self.set_cache_entry(node_id, None, result.is_incomplete));
                        };
                        let narrowed = callback(ty).unwrap_or(ty);
                        Ok(self.set_cache_entry(node_id, Some(narrowed), result.is_incomplete))
                    });
                }

                FlowNodeKind::NeverCondition {
                    test,
                    reference: other,
                    antecedent,
                } => {
                    let node_id = cur;
                    let antecedent_id = *antecedent;
                    let is_positive = node.has_any_flags(flow_flags::TRUE_NEVER_CONDITION);
                    let cut = self.with_pending(node_id, || {
                        Ok(self.never_condition_cuts_edge(other, *test, is_positive))
                    })?;
                    if cut {
                        return Ok(self.set_cache_entry(node_id, None, false));
                    }
                    cur = antecedent_id;
                }

                FlowNodeKind::BranchLabel {
                    antecedents,
                    pre_branch_antecedent,
                    affected_expressions,
                    post_context_manager,
                } => {
                    if let Some(pcm) = post_context_manager {
                        let swallows = pcm
                            .expressions
                            .iter()
                            .any(|&expr| engine.is_exception_context_manager(expr, pcm.is_async));
                        if swallows != pcm.activate_if_swallows {
                            // The label models the other outcome; this edge
                            // cannot be taken.
                            return Ok(self.set_cache_entry(cur, None, false));
                        }
                    }

                    // If no part of the reference is touched by the branch
                    // and the pre-branch point feeds this label, the whole
                    // branch is transparent for this query.
                    if self.reference.is_some() {
                        if let Some(pre) = pre_branch_antecedent {
                            let unaffected = !self
                                .sub_keys
                                .iter()
                                .any(|key| affected_expressions.contains(key));
                            if unaffected && engine.is_flow_node_reachable(cur, Some(*pre), false) {
                                cur = *pre;
                                continue;
                            }
                        }
                    }

                    return self.get_type_from_branch_node(cur, antecedents, target_symbol);
                }

                FlowNodeKind::LoopLabel { antecedents, .. } => {
                    return self.get_type_from_loop_node(cur, antecedents, target_symbol);
                }

                FlowNodeKind::WildcardImport {
                    node: import_node,
                    names,
                    antecedent,
                } => {
                    if let Some(name) = self.reference.and_then(|r| r.as_name()) {
                        if names.iter().any(|n| n == name) {
                            let node_id = cur;
                            let import_node = *import_node;
                            return self.with_pending(node_id, || {
                                let ty = engine
                                    .evaluator
                                    .lookup_symbol_recursive(import_node, name, false)
                                    .and_then(|lookup| {
                                        let decl = lookup.decl?;
                                        engine
                                            .evaluator
                                            .get_inferred_type_of_declaration(lookup.symbol, decl)
                                    })
                                    .unwrap_or(TypeId::UNKNOWN);
                                Ok(self.set_cache_entry(node_id, Some(ty), false))
                            });
                        }
                    }
                    cur = *antecedent;
                }

                FlowNodeKind::ExhaustedMatch {
                    node: match_node,
                    antecedent,
                    ..
                } => {
                    let node_id = cur;
                    let antecedent_id = *antecedent;
                    let match_node = *match_node;
                    let result = self.with_pending(node_id, || {
                        engine.evaluator.eval_types_for_statement(match_node);
                        Ok(engine.evaluator.eval_type_for_subnode(match_node))
                    })?;
                    if let Some(r) = result {
                        if engine.types.is_never(r.ty) {
                            // Every case consumed the subject; control
                            // cannot fall past the match.
                            return Ok(self.set_cache_entry(node_id, None, r.is_incomplete));
                        }
                    }
                    cur = antecedent_id;
                }

                FlowNodeKind::NarrowForPattern {
                    subject,
                    type_source,
                    antecedent,
                } => {
                    let antecedent_id = *antecedent;
                    let applies = match self.reference {
                        Some(reference) => subject.matches(reference),
                        None => true,
                    };
                    if !applies {
                        cur = antecedent_id;
                        continue;
                    }
                    let node_id = cur;
                    let type_source = *type_source;
                    let result = self.with_pending(node_id, || {
                        engine.evaluator.eval_types_for_statement(type_source);
                        Ok(engine.evaluator.eval_type_for_subnode(type_source))
                    })?;
                    if let Some(r) = result {
                        if engine.types.is_never(r.ty) {
                            return Ok(self.set_cache_entry(node_id, None, r.is_incomplete));
                        }
                        if self.reference.is_some() {
                            return Ok(self.set_cache_entry(node_id, Some(r.ty), r.is_incomplete));
                        }
                    }
                    cur = antecedent_id;
                }

                FlowNodeKind::PreFinallyGate {
                    antecedent,
                    gate_closed,
                } => {
                    if gate_closed.get() {
                        // The exceptional pass: nothing flows through, and
                        // nothing is recorded (invariant: no cache entry for
                        // a closed gate).
                        return Ok(FlowTypeResult::complete(None));
                    }
                    let node_id = cur;
                    let antecedent_id = *antecedent;
                    let result = self
                        .with_pending(node_id, || {
                            self.get_type_from_flow_node(antecedent_id, target_symbol)
                        });
                    // The answer depends on the gate bit, which other walks
                    // flip; it must never be memoised.
                    self.cache.borrow_mut().delete(node_id);
                    return result;
                }

                FlowNodeKind::PostFinally {
                    antecedent,
                    pre_finally_gate,
                    finally_node,
                } => {
                    let node_id = cur;
                    let antecedent_id = *antecedent;
                    let gate = *pre_finally_gate;
                    let finally_node = *finally_node;

                    let was_closed = engine.graph.set_gate_closed(gate, true);
                    let walk_result = {
                        let mut inner: Option<Result<FlowTypeResult, Cancelled>> = None;
                        engine.speculative().enter_region();
                        engine.evaluator.use_speculative_mode(finally_node, &mut || {
                            inner = Some(self.with_pending(node_id, || {
                                self.get_type_from_flow_node(antecedent_id, target_symbol)
                            }));
                        });
                        engine.speculative().leave_region();
                        inner.expect("speculative region must invoke its body")
                    };
                    engine.graph.set_gate_closed(gate, was_closed);

                    let result = walk_result?;
                    if result.is_incomplete {
                        // Computed speculatively; do not persist.
                        return Ok(result);
                    }
                    return Ok(self.set_cache_entry(node_id, result.ty, false));
                }
            }
        }
    }

    // =========================================================================
    // Node-kind helpers
    // =========================================================================

    /// Evaluate the right-hand side of an assignment that writes exactly the
    /// reference.
    fn eval_assignment(
        &self,
        node_id: FlowNodeId,
        target: &ReferenceExpr,
    ) -> Result<FlowTypeResult, Cancelled> {
        let engine = self.engine();
        self.with_pending(node_id, || {
            engine.evaluator.eval_types_for_statement(target.node());
            match engine.evaluator.eval_type_for_subnode(target.node()) {
                Some(result) => {
                    let mut ty = Some(result.ty);
                    if engine.evaluator.is_type_alias_placeholder(result.ty) {
                        ty = None;
                    }
                    if matches!(target, ReferenceExpr::Member { .. })
                        && engine
                            .evaluator
                            .is_asymmetric_descriptor_assignment(target.node())
                    {
                        // The setter's accepted type says nothing about what
                        // a subsequent read returns.
                        ty = None;
                    }
                    Ok(self.set_cache_entry(node_id, ty, result.is_incomplete))
                }
                // The evaluator refused (the statement is unreachable or in
                // error); no type flows from this binding.
                None => Ok(self.set_cache_entry(node_id, None, false)),
            }
        })
    }

    /// `x["k"] = ...` (or `x[0] = ...`) while tracking `x`: walk past the
    /// assignment for the base's type, then refine its mapping entry.
    fn narrow_for_mapping_key(
        &self,
        node_id: FlowNodeId,
        antecedent: FlowNodeId,
        key: &IndexKey,
        target_symbol: Option<SymbolId>,
    ) -> Result<FlowTypeResult, Cancelled> {
        let engine = self.engine();
        let key = key.clone();
        self.with_pending(node_id, || {
            let result = self.get_type_from_flow_node(antecedent, target_symbol)?;
            let Some(base_ty) = result.ty else {
                return Ok(self.set_cache_entry(node_id, None, result.is_incomplete));
            };
            let ty = engine
                .evaluator
                .narrow_for_mapping_key_assignment(base_ty, &key)
                .unwrap_or(base_ty);
            Ok(self.set_cache_entry(node_id, Some(ty), result.is_incomplete))
        })
    }

    /// Whether a never-condition edge is dead: the test collapses its other
    /// reference to `Never`. Only declared types are consulted, so this can
    /// never trigger unbounded inference.
    fn never_condition_cuts_edge(
        &self,
        other: &ReferenceExpr,
        test: pyz_common::NodeId,
        is_positive: bool,
    ) -> bool {
        let engine = self.engine();
        let Some(name) = other.as_name() else {
            return false;
        };
        let Some(lookup) = engine
            .evaluator
            .lookup_symbol_recursive(other.node(), name, false)
        else {
            return false;
        };
        let Some(declared) = engine.evaluator.get_declared_type_of_symbol(lookup.symbol) else {
            return false;
        };
        let Some(callback) = engine
            .evaluator
            .get_type_narrowing_callback(other, test, is_positive)
        else {
            return false;
        };
        let narrowed = callback(declared).unwrap_or(declared);
        engine.types.is_never(narrowed)
    }

    /// Union the types flowing into a join point.
    fn get_type_from_branch_node(
        &self,
        branch: FlowNodeId,
        antecedents: &[FlowNodeId],
        target_symbol: Option<SymbolId>,
    ) -> Result<FlowTypeResult, Cancelled> {
        let engine = self.engine();
        self.with_pending(branch, || {
            let mut member_types: Vec<TypeId> = Vec::new();
            let mut saw_incomplete = false;
            for &antecedent in antecedents {
                let result = self.get_type_from_flow_node(antecedent, target_symbol)?;
                if result.is_incomplete {
                    saw_incomplete = true;
                }
                if let Some(ty) = result.ty {
                    if self.reference.is_none() {
                        // Reachability-only: one live antecedent settles it.
                        return Ok(self.set_cache_entry(
                            branch,
                            Some(self.type_at_start),
                            result.is_incomplete,
                        ));
                    }
                    member_types.push(ty);
                }
            }
            let ty = if member_types.is_empty() {
                None
            } else {
                Some(engine.types.union(member_types))
            };
            Ok(self.set_cache_entry(branch, ty, saw_incomplete))
        })
    }

    /// Iterate a loop header to a fixed point. See the module comment for
    /// the incomplete/pending/generation protocol this implements.
    fn get_type_from_loop_node(
        &self,
        loop_node: FlowNodeId,
        antecedents: &[FlowNodeId],
        target_symbol: Option<SymbolId>,
    ) -> Result<FlowTypeResult, Cancelled> {
        let engine = self.engine();
        let antecedent_count = antecedents.len();

        let existing = self.cache.borrow().get(loop_node).cloned();
        match existing {
            Some(entry) => {
                if entry.incomplete_subtypes.len() == antecedent_count
                    && entry.incomplete_subtypes.iter().any(|s| s.is_pending)
                {
                    // Another frame is mid-iteration on this header; report
                    // its current aggregate and let it finish.
                    return Ok(FlowTypeResult {
                        ty: entry.ty,
                        is_incomplete: true,
                        generation: Some(entry.generation),
                        incomplete_subtypes: entry.incomplete_subtypes,
                    });
                }
            }
            None => {
                self.set_cache_entry(loop_node, None, true);
            }
        }

        let visit_count = self.cache.borrow_mut().increment_visit_count(loop_node);
        let calls_at_start = self.analyzer.call_count.get();
        let mut attempt_count: usize = 0;

        loop {
            let mut saw_incomplete = false;
            let mut saw_pending = false;
            let mut first_antecedent_is_incomplete = false;
            let mut proven_reachable = self.reference.is_none()
                && self
                    .cache
                    .borrow()
                    .get(loop_node)
                    .is_some_and(|e| e.incomplete_subtypes.iter().any(|s| s.ty.is_some()));

            for (index, &antecedent) in antecedents.iter().enumerate() {
                if self.reference.is_none() && proven_reachable {
                    break;
                }
                let slot = self
                    .cache
                    .borrow()
                    .get(loop_node)
                    .and_then(|e| e.incomplete_subtypes.get(index).cloned());
                match slot {
                    Some(ref s) if s.is_pending => {
                        saw_pending = true;
                    }
                    Some(ref s) if !s.is_incomplete => {
                        // Resolved on an earlier pass; nothing to redo.
                    }
                    slot => {
                        let eval_count = slot.map_or(0, |s| s.evaluation_count);
                        self.set_incomplete_subtype(
                            loop_node,
                            index,
                            IncompleteSubtype {
                                ty: None,
                                is_incomplete: true,
                                is_pending: true,
                                evaluation_count: eval_count,
                            },
                        );
                        let walked = self.get_type_from_flow_node(antecedent, target_symbol);
                        let result = match walked {
                            Ok(result) => result,
                            Err(err) => {
                                // Never leave a pending mark behind on the
                                // unwind path.
                                self.set_incomplete_subtype(
                                    loop_node,
                                    index,
                                    IncompleteSubtype {
                                        ty: None,
                                        is_incomplete: true,
                                        is_pending: false,
                                        evaluation_count: eval_count + 1,
                                    },
                                );
                                return Err(err);
                            }
                        };
                        if result.is_incomplete {
                            saw_incomplete = true;
                            if index == 0 {
                                first_antecedent_is_incomplete = true;
                            }
                        }
                        // Promote a missing type to incomplete-unknown so
                        // the cycle keeps making progress.
                        let slot_ty = match result.ty {
                            Some(ty) => Some(ty),
                            None if result.is_incomplete => Some(TypeId::INCOMPLETE_UNKNOWN),
                            None => None,
                        };
                        self.set_incomplete_subtype(
                            loop_node,
                            index,
                            IncompleteSubtype {
                                ty: slot_ty,
                                is_incomplete: result.is_incomplete,
                                is_pending: false,
                                evaluation_count: eval_count + 1,
                            },
                        );
                    }
                }
                if self.reference.is_none()
                    && self
                        .cache
                        .borrow()
                        .get(loop_node)
                        .is_some_and(|e| e.ty.is_some())
                {
                    proven_reachable = true;
                }
            }
            attempt_count += 1;

            if proven_reachable {
                if saw_pending {
                    // An outer frame owns the entry; answer without
                    // overwriting it.
                    return Ok(FlowTypeResult::complete(Some(self.type_at_start)));
                }
                return Ok(self.set_cache_entry(loop_node, Some(self.type_at_start), false));
            }

            let entry = self
                .cache
                .borrow()
                .get(loop_node)
                .cloned()
                .expect("loop header cache entry");
            let aggregate = entry.ty;

            let walker_calls = self
                .analyzer
                .call_count
                .get()
                .saturating_sub(calls_at_start);
            if walker_calls >= MAX_FLOW_INVOCATIONS_PER_LOOP {
                // Pathological recursion; declare the current answer final.
                trace!(node = %loop_node, walker_calls, "loop walker-call cap hit");
                let ty = aggregate.map(|t| engine.types.remove_incomplete_unknown(t));
                return Ok(self.set_cache_entry(loop_node, ty, false));
            }
            if visit_count >= MAX_FLOW_NODE_VISIT_COUNT {
                // Termination traded for precision. Antecedent 0 enters
                // from outside the loop and dominates the incompleteness
                // decision.
                trace!(node = %loop_node, visit_count, "loop visit cap hit");
                let ty = aggregate.map(|t| engine.types.remove_incomplete_unknown(t));
                if first_antecedent_is_incomplete || saw_pending {
                    return Ok(FlowTypeResult::incomplete(ty, entry.generation));
                }
                return Ok(self.set_cache_entry(loop_node, ty, false));
            }

            if !saw_incomplete || attempt_count >= antecedent_count.max(1) {
                let has_dust =
                    aggregate.is_some_and(|t| engine.types.contains_incomplete_unknown(t));
                if !saw_pending && !has_dust {
                    trace!(node = %loop_node, passes = attempt_count, "loop header converged");
                    return Ok(self.set_cache_entry(loop_node, aggregate, false));
                }
                let ty = aggregate.map(|t| engine.types.remove_incomplete_unknown(t));
                return Ok(FlowTypeResult {
                    ty,
                    is_incomplete: true,
                    generation: Some(entry.generation),
                    incomplete_subtypes: entry.incomplete_subtypes,
                });
            }
        }
    }

    // =========================================================================
    // Cache plumbing
    // =========================================================================

    /// Run `body` with `node` marked pending, clearing the mark on both the
    /// normal and the cancellation path.
    fn with_pending<T>(
        &self,
        node: FlowNodeId,
        body: impl FnOnce() -> Result<T, Cancelled>,
    ) -> Result<T, Cancelled> {
        self.cache.borrow_mut().mark_pending(node);
        let result = body();
        self.cache.borrow_mut().clear_pending(node);
        result
    }

    /// Record a walk result for `node`. Completions advance the generation;
    /// incomplete entries are stamped with the current one.
    fn set_cache_entry(
        &self,
        node: FlowNodeId,
        ty: Option<TypeId>,
        is_incomplete: bool,
    ) -> FlowTypeResult {
        let engine = self.engine();
        let generation = if is_incomplete {
            engine.generation()
        } else {
            engine.bump_generation()
        };
        engine.speculative().track_entry(&self.cache, node);
        self.cache.borrow_mut().insert(
            node,
            CacheEntry {
                ty,
                is_incomplete,
                generation,
                incomplete_subtypes: Vec::new(),
            },
        );
        FlowTypeResult {
            ty,
            is_incomplete,
            generation: Some(generation),
            incomplete_subtypes: Vec::new(),
        }
    }

    /// Update one antecedent slot of a loop header's incomplete entry and
    /// recompute its aggregate type. The generation advances only when
    /// something materially changed.
    fn set_incomplete_subtype(&self, node: FlowNodeId, index: usize, subtype: IncompleteSubtype) {
        let engine = self.engine();
        let mut cache = self.cache.borrow_mut();
        let entry = cache
            .get_mut(node)
            .expect("incomplete subtype on a missing entry");
        assert!(
            entry.is_incomplete,
            "incomplete subtype on a completed entry"
        );
        debug_assert!(index <= entry.incomplete_subtypes.len());

        let mut changed = match entry.incomplete_subtypes.get(index) {
            Some(prev) => {
                prev.ty != subtype.ty
                    || prev.is_incomplete != subtype.is_incomplete
                    || prev.is_pending != subtype.is_pending
            }
            None => true,
        };
        if index == entry.incomplete_subtypes.len() {
            entry.incomplete_subtypes.push(subtype);
        } else {
            entry.incomplete_subtypes[index] = subtype;
        }

        let resolved: Vec<TypeId> = entry
            .incomplete_subtypes
            .iter()
            .filter_map(|s| s.ty)
            .collect();
        let aggregate = if resolved.is_empty() {
            None
        } else {
            Some(engine.types.union(resolved))
        };
        if aggregate != entry.ty {
            entry.ty = aggregate;
            changed = true;
        }
        if changed {
            entry.generation = engine.bump_generation();
        }
    }
}
