//! The evaluator interface consumed by the flow engine.
//!
//! The engine never evaluates syntax itself. Whenever a walk crosses an edge
//! whose meaning depends on an expression (an assignment's right-hand side, a
//! conditional test, a pattern, a wildcard import), it calls back into the
//! type evaluator through this trait. The checker's evaluator implements it
//! against the real AST; tests implement it with scripted answers.
//!
//! Missing information is modelled as `None`/neutral answers, never as
//! errors: an edge the evaluator cannot interpret simply does not narrow.

use pyz_binder::{DeclId, IndexKey, ReferenceExpr, SymbolId};
use pyz_common::{Cancelled, NodeId};
use pyz_solver::TypeId;

/// A type paired with the incompleteness of the computation that produced
/// it. Incomplete types may still change while a cycle is being resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeResult {
    pub ty: TypeId,
    pub is_incomplete: bool,
}

impl TypeResult {
    pub const fn complete(ty: TypeId) -> Self {
        Self {
            ty,
            is_incomplete: false,
        }
    }

    pub const fn incomplete(ty: TypeId) -> Self {
        Self {
            ty,
            is_incomplete: true,
        }
    }
}

/// Evaluation flags for `TypeEvaluator::get_type_of_expression`.
pub mod eval_flags {
    pub const NONE: u32 = 0;
    /// Resolve from declarations only; never run inference. Used by the
    /// call and context-manager analyses, which must not trigger circular
    /// evaluation.
    pub const DECLARED_TYPE_ONLY: u32 = 1 << 0;
}

/// A narrowing function for one conditional edge: maps the type flowing
/// into the edge to the type on the other side of the test. `None` means
/// the test cannot refine this input.
pub type NarrowingCallback<'a> = Box<dyn Fn(TypeId) -> Option<TypeId> + 'a>;

/// Result of a scope-aware symbol lookup.
#[derive(Clone, Copy, Debug)]
pub struct SymbolLookup {
    pub symbol: SymbolId,
    /// The declaration to infer from, when one exists.
    pub decl: Option<DeclId>,
}

/// A test expression of the exact shape `isinstance(x, C)`, decomposed
/// syntactically.
#[derive(Clone, Copy, Debug)]
pub struct IsinstanceGuard {
    /// The first argument expression.
    pub argument: NodeId,
    /// The class expression being tested against.
    pub class_expr: NodeId,
}

/// Everything the flow engine consumes from the type evaluator.
///
/// All methods are best-effort; `None` degrades to "no narrowing" or
/// "assume the benign outcome" at the call site.
pub trait TypeEvaluator {
    /// Force evaluation of the statement containing `node` into the
    /// evaluator's own cache.
    fn eval_types_for_statement(&self, node: NodeId);

    /// The cached type of an AST sub-expression, if its statement has been
    /// evaluated.
    fn eval_type_for_subnode(&self, node: NodeId) -> Option<TypeResult>;

    /// Compute the type of an expression. `flags` is a bitset of
    /// [`eval_flags`] values.
    fn get_type_of_expression(&self, node: NodeId, flags: u32) -> Option<TypeResult>;

    /// Non-inferring type lookup for a symbol.
    fn get_declared_type_of_symbol(&self, symbol: SymbolId) -> Option<TypeId>;

    /// Inference for aliases and cross-scope reads only.
    fn get_inferred_type_of_declaration(&self, symbol: SymbolId, decl: DeclId) -> Option<TypeId>;

    /// Scope resolution starting at `node`.
    fn lookup_symbol_recursive(
        &self,
        node: NodeId,
        name: &str,
        honor_code_flow: bool,
    ) -> Option<SymbolLookup>;

    /// Whether the assignment at `node` writes through a descriptor whose
    /// setter accepts a different type than its getter returns. Narrowing
    /// from such a write would be unsound.
    fn is_asymmetric_descriptor_assignment(&self, node: NodeId) -> bool;

    /// Whether control flow can proceed past `node`. Used to infer
    /// never-returning behaviour of unannotated functions from their body.
    fn is_after_node_reachable(&self, node: NodeId) -> bool;

    /// Run `body` inside a speculative region rooted at `root`: type-cache
    /// writes made by the evaluator during `body` are discarded when the
    /// region exits.
    fn use_speculative_mode(&self, root: NodeId, body: &mut dyn FnMut());

    /// Cooperative yield point; polled on every walker entry.
    fn check_for_cancellation(&self) -> Result<(), Cancelled>;

    /// A narrowing function implementing the semantics of `test` with
    /// respect to `reference`, for the given test polarity. `None` when the
    /// test cannot narrow the reference.
    fn get_type_narrowing_callback(
        &self,
        reference: &ReferenceExpr,
        test: NodeId,
        is_positive: bool,
    ) -> Option<NarrowingCallback<'_>>;

    /// Decompose `test` if it is literally an `isinstance(x, C)` call.
    fn get_isinstance_guard(&self, test: NodeId) -> Option<IsinstanceGuard>;

    /// Resolve an overloaded callee against the call's actual arguments and
    /// return the matched overload's return type.
    fn resolve_overload_return(&self, call: NodeId, callee: TypeId) -> Option<TypeId>;

    /// Narrow a structural mapping type after an assignment to one of its
    /// literal keys (`x["k"] = ...`, `x[0] = ...`). `None` when `base` is
    /// not a mapping type that declares `key`.
    fn narrow_for_mapping_key_assignment(&self, base: TypeId, key: &IndexKey) -> Option<TypeId>;

    /// Whether `ty` is a placeholder for a type alias that is still being
    /// evaluated. Assignments producing one carry no usable flow type.
    fn is_type_alias_placeholder(&self, _ty: TypeId) -> bool {
        false
    }
}
