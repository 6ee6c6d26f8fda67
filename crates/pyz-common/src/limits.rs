//! Centralized limits and thresholds for the pyz checker.
//!
//! This module provides shared constants for recursion depths and operation
//! counts used throughout the codebase. Centralizing these values:
//! - Prevents duplicate definitions with inconsistent values
//! - Makes it easy to tune limits for different environments
//! - Documents the rationale for each limit
//!
//! # Categories
//!
//! - **Recursion Depths**: Limits to prevent stack overflow or unbounded
//!   re-entry in recursive analyses
//! - **Operation Counts**: Limits to prevent pathological non-termination in
//!   iterative algorithms
//!
//! These are safety valves, not timeouts: when a cap is hit the affected
//! analysis degrades to a sound-but-imprecise answer instead of failing.

// =============================================================================
// Operation Count Limits (Flow Engine)
// =============================================================================

/// Maximum number of times the flow walker will visit a single loop header.
///
/// Loop headers are re-entered while the incomplete-type protocol converges
/// on a fixed point. Almost all loops converge within a handful of passes;
/// a graph that has not converged after this many visits is forced to a
/// completed answer so checking terminates.
pub const MAX_FLOW_NODE_VISIT_COUNT: u32 = 64;

/// Maximum number of flow-walker invocations attributable to one loop header
/// within a single top-level query.
///
/// Degenerate graphs (deeply nested loops over many interdependent
/// references) can trigger exponential re-walking. When a loop header
/// observes this many walker calls since it started iterating, it declares
/// its current answer complete rather than continuing.
pub const MAX_FLOW_INVOCATIONS_PER_LOOP: u32 = 16 * 1024;

// =============================================================================
// Recursion Depth Limits (Flow Engine)
// =============================================================================

/// Maximum recursion depth for the boolean reachability walker.
///
/// Reachability recursion is bounded by the branch-nesting depth of the
/// scope, which is small in real code. At the cap the walker conservatively
/// reports "reachable".
pub const MAX_REACHABILITY_RECURSION_DEPTH: u32 = 64;

/// Maximum recursion depth for the never-returning-call analysis.
///
/// Deciding whether a call returns can require walking the callee's own
/// flow graph, which can in turn contain calls. Beyond this depth the
/// analysis assumes the call returns.
pub const MAX_NO_RETURN_ANALYSIS_DEPTH: u32 = 4;

/// Maximum recursion depth for the exception-suppression analysis of
/// context managers. Beyond this depth the analysis assumes the manager
/// does not suppress exceptions.
pub const MAX_CONTEXT_MANAGER_ANALYSIS_DEPTH: u32 = 4;
