//! Common types and utilities for the pyz Python type checker.
//!
//! This crate provides foundational types used across all pyz crates:
//! - AST node handles (`NodeId`)
//! - Centralized limits and thresholds
//! - Cooperative cancellation (`CancellationToken`, `Cancelled`)

// AST node handles - Shared so the binder and checker agree on identities
pub mod node;
pub use node::NodeId;

// Centralized limits and thresholds
pub mod limits;

// Cooperative cancellation
pub mod cancellation;
pub use cancellation::{CancellationToken, Cancelled};
