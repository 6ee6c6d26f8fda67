//! Never-returning call analysis.
//!
//! Given a call site, decide (best-effort) whether the call cannot return
//! normally. Only declared types are consulted; full inference is off
//! limits here because the call being analysed may sit on the very flow
//! path the evaluator would need to walk, and the resulting cycle would
//! never bottom out. The one exception is an opt-in body check for
//! unannotated functions, which asks the evaluator a single reachability
//! question.
//!
//! Results are cached per call node for the life of the engine. While a
//! call is being analysed its cache slot is pre-seeded with `false` so a
//! recursive arrival sees "assume it returns".

use tracing::debug;

use pyz_binder::CallSite;
use pyz_common::limits::MAX_NO_RETURN_ANALYSIS_DEPTH;
use pyz_solver::{FunctionDef, TypeId, TypeKind, function_flags};

use crate::engine::CodeFlowEngine;
use crate::evaluator::eval_flags;

impl CodeFlowEngine<'_> {
    /// Whether the call at this site can never return.
    pub fn is_call_no_return(&self, call: &CallSite) -> bool {
        if let Some(&cached) = self.no_return_cache.borrow().get(&call.node) {
            return cached;
        }
        if self.no_return_depth.get() >= MAX_NO_RETURN_ANALYSIS_DEPTH {
            return false;
        }

        self.no_return_depth.set(self.no_return_depth.get() + 1);
        // Pre-seed so recursive analysis of the callee assumes a return.
        self.no_return_cache.borrow_mut().insert(call.node, false);
        let result = self.is_call_no_return_inner(call);
        self.no_return_depth.set(self.no_return_depth.get() - 1);
        self.no_return_cache.borrow_mut().insert(call.node, result);

        if result {
            debug!(call = %call.node, "callee declared to never return");
        }
        result
    }

    fn is_call_no_return_inner(&self, call: &CallSite) -> bool {
        let Some(callee) = self
            .evaluator
            .get_type_of_expression(call.callee, eval_flags::DECLARED_TYPE_ONLY)
        else {
            return false;
        };

        let mut subtype_count = 0usize;
        let mut no_return_count = 0usize;
        for subtype in self.types.union_members(callee.ty) {
            subtype_count += 1;
            if self.is_callee_subtype_no_return(subtype, call) {
                no_return_count += 1;
            }
        }
        subtype_count > 0 && no_return_count == subtype_count
    }

    fn is_callee_subtype_no_return(&self, subtype: TypeId, call: &CallSite) -> bool {
        match self.types.kind(subtype) {
            TypeKind::Class(class) => {
                // A user-defined metaclass `__call__` can do anything;
                // assume the instantiation returns.
                if self.types.class_has_metaclass_call(class) {
                    return false;
                }
                let constructor = self
                    .types
                    .lookup_member(class, "__init__")
                    .or_else(|| self.types.lookup_member(class, "__new__"));
                match constructor {
                    Some(ctor) => self.is_callable_type_no_return(ctor, call),
                    None => false,
                }
            }
            TypeKind::Instance { class, .. } => match self.types.lookup_member(class, "__call__") {
                Some(dunder_call) => self.is_callable_type_no_return(dunder_call, call),
                None => false,
            },
            TypeKind::Function(_) | TypeKind::Overloaded(_) => {
                self.is_callable_type_no_return(subtype, call)
            }
            _ => false,
        }
    }

    fn is_callable_type_no_return(&self, callable: TypeId, call: &CallSite) -> bool {
        if let Some(def) = self.types.as_function(callable) {
            return self.is_function_no_return(&def, call);
        }
        if let Some(overloads) = self.types.as_overloaded(callable) {
            let no_return_overloads = overloads
                .iter()
                .filter(|&&overload| {
                    self.types
                        .as_function(overload)
                        .is_some_and(|def| self.is_function_no_return(&def, call))
                })
                .count();
            if no_return_overloads == 0 {
                return false;
            }
            if no_return_overloads == overloads.len() {
                return true;
            }
            // Mixed overloads: resolve against the actual arguments.
            return self
                .evaluator
                .resolve_overload_return(call.node, callable)
                .is_some_and(|ret| self.types.is_never(ret));
        }
        false
    }

    fn is_function_no_return(&self, def: &FunctionDef, call: &CallSite) -> bool {
        match def.declared_return {
            Some(declared) => {
                if !self.types.is_never(declared) {
                    return false;
                }
                if def.flags & function_flags::ASYNC != 0 {
                    // An un-awaited coroutine call returns the coroutine
                    // object regardless of its value type.
                    call.is_awaited
                } else {
                    true
                }
            }
            None => {
                // Opt-in inference from the body shape. Generators return
                // their generator object; abstract/stub bodies and
                // NotImplementedError placeholders say nothing about real
                // implementations.
                let excluded = function_flags::GENERATOR
                    | function_flags::ABSTRACT
                    | function_flags::STUB_DEFINITION
                    | function_flags::RAISES_NOT_IMPLEMENTED;
                if def.flags & excluded != 0 {
                    return false;
                }
                match def.body_end {
                    Some(end) => !self.evaluator.is_after_node_reachable(end),
                    None => false,
                }
            }
        }
    }
}
