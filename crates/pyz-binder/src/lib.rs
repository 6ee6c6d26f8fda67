//! Binder output model for the pyz Python type checker.
//!
//! The binder walks a module's AST and produces, per execution scope, a
//! control-flow graph of tagged flow nodes plus per-scope metadata. This
//! crate defines that model:
//! - `FlowNode` / `FlowNodeKind` / `flow_flags` - tagged CFG vertices
//! - `FlowArena` - arena storage with stable `FlowNodeId` handles
//! - `ReferenceExpr` - the shape of a trackable reference (name, attribute
//!   access, subscript) and its cache keys
//! - `FlowGraphBuilder` - construction helpers shared by the binder and by
//!   tests that assemble graphs directly
//!
//! The graph is immutable once built; the flow engine walks it backwards
//! from a query point through each node's antecedents.

pub mod flow;
pub use flow::{CallSite, FlowArena, FlowNode, FlowNodeId, FlowNodeKind, PostContextManagerInfo, flow_flags};

pub mod reference;
pub use reference::{DeclId, IndexKey, ReferenceExpr, ReferenceKey, SymbolId};

pub mod builder;
pub use builder::FlowGraphBuilder;

pub mod dump;
pub use dump::dump_flow_graph;
