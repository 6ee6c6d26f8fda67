//! Code-flow type narrowing engine for the pyz Python type checker.
//!
//! Given a control-flow graph produced by the binder and a reference
//! expression, the engine computes the statically known type of that
//! reference at a chosen program point, accounting for assignments,
//! conditional tests, pattern matches, context managers, wildcard imports,
//! and calls that never return. It also answers reachability queries and
//! narrows constrained type variables along a path.
//!
//! Entry points:
//! - [`CodeFlowEngine::create_analyzer`] then
//!   [`FlowAnalyzer::get_type_from_code_flow`] for type queries
//! - [`CodeFlowEngine::is_flow_node_reachable`] for reachability
//! - [`CodeFlowEngine::narrow_constrained_type_var`] for constrained
//!   type variables
//!
//! The engine computes nothing about syntax itself; everything
//! expression-shaped is delegated to a [`TypeEvaluator`] implementation.

pub mod evaluator;
pub use evaluator::{
    IsinstanceGuard, NarrowingCallback, SymbolLookup, TypeEvaluator, TypeResult, eval_flags,
};

pub mod result;
pub use result::{FlowTypeOptions, FlowTypeResult, IncompleteSubtype};

pub mod cache;
pub use cache::FlowNodeTypeCache;

pub mod speculative;
pub use speculative::{SharedFlowCache, SpeculativeTracker};

pub mod engine;
pub use engine::CodeFlowEngine;

pub mod analyzer;
pub use analyzer::FlowAnalyzer;

mod constrained_type_var;
mod context_manager;
mod no_return;
mod reachability;
