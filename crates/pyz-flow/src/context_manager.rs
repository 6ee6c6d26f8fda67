//! Exception-suppression analysis of context managers.
//!
//! A `with` body that raises still reaches the code after the statement if
//! some manager's exit hook returns a truthy value. The check is
//! best-effort over declared types: the manager swallows exceptions iff its
//! `__exit__` (or `__aexit__` for `async with`) declares a `bool` return
//! whose literal value is unspecified or `True`. A `-> Literal[False]` or
//! `-> None` exit never suppresses.

use tracing::debug;

use pyz_common::NodeId;
use pyz_common::limits::MAX_CONTEXT_MANAGER_ANALYSIS_DEPTH;
use pyz_solver::{LiteralValue, TypeKind};

use crate::engine::CodeFlowEngine;
use crate::evaluator::eval_flags;

impl CodeFlowEngine<'_> {
    /// Whether the context-manager expression `expr` may suppress an
    /// in-flight exception.
    pub fn is_exception_context_manager(&self, expr: NodeId, is_async: bool) -> bool {
        if let Some(&cached) = self.context_manager_cache.borrow().get(&(expr, is_async)) {
            return cached;
        }
        if self.context_manager_depth.get() >= MAX_CONTEXT_MANAGER_ANALYSIS_DEPTH {
            return false;
        }

        self.context_manager_depth
            .set(self.context_manager_depth.get() + 1);
        let result = self.is_exception_context_manager_inner(expr, is_async);
        self.context_manager_depth
            .set(self.context_manager_depth.get() - 1);
        self.context_manager_cache
            .borrow_mut()
            .insert((expr, is_async), result);

        if result {
            debug!(manager = %expr, "context manager may swallow exceptions");
        }
        result
    }

    fn is_exception_context_manager_inner(&self, expr: NodeId, is_async: bool) -> bool {
        let Some(manager) = self
            .evaluator
            .get_type_of_expression(expr, eval_flags::DECLARED_TYPE_ONLY)
        else {
            return false;
        };

        let exit_name = if is_async { "__aexit__" } else { "__exit__" };
        self.types.union_members(manager.ty).iter().any(|&subtype| {
            // A class used as the manager expression stands for an instance
            // of it.
            let class = match self.types.kind(subtype) {
                TypeKind::Instance { class, .. } | TypeKind::Class(class) => class,
                _ => return false,
            };
            let Some(exit_method) = self.types.lookup_member(class, exit_name) else {
                return false;
            };
            let Some(def) = self.types.as_function(exit_method) else {
                return false;
            };
            let Some(declared) = def.declared_return else {
                return false;
            };
            match self.types.as_instance(declared) {
                Some((ret_class, literal)) if ret_class == self.types.bool_class() => {
                    matches!(literal, None | Some(LiteralValue::Bool(true)))
                }
                _ => false,
            }
        })
    }
}
