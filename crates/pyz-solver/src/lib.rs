//! Type representation for the pyz Python type checker.
//!
//! This crate provides:
//! - `TypeId` - interned type handles with well-known sentinels
//! - `TypeInterner` - type storage plus the algebra the checker consumes
//!   (union combination, union membership, incomplete-unknown hygiene)
//! - Class, function, and type-variable shapes sufficient for call and
//!   member-resolution queries
//!
//! Subtyping and assignability live in a later layer; nothing here depends
//! on them.

pub mod types;
pub use types::{
    ClassId, FunctionDef, FunctionId, LiteralValue, TypeId, TypeInterner, TypeKind, TypeVarId,
    function_flags,
};
