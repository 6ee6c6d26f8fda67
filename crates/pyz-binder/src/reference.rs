//! Reference expressions.
//!
//! A reference is the expression whose type the flow engine tracks: a simple
//! name, an attribute access rooted at a name, or a subscript of such with a
//! literal key. References are compared structurally; AST node ids are
//! carried for evaluator callbacks but never participate in matching.

use pyz_common::NodeId;

/// Index of a symbol in the binder's symbol arena.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub const NONE: SymbolId = SymbolId(u32::MAX);

    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

/// Index of a declaration attached to a symbol.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct DeclId(pub u32);

/// Subscript key of an index reference.
///
/// Only literal string and integer keys produce narrowable references;
/// a `Dynamic` key never matches another key.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum IndexKey {
    Str(String),
    Int(i64),
    /// A computed subscript. Identified by its AST node so distinct
    /// subscript expressions get distinct cache keys.
    Dynamic(NodeId),
}

/// Canonical key identifying a reference expression.
///
/// Used to select per-reference caches and to test membership in a label's
/// affected-expression set.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReferenceKey(String);

impl ReferenceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A trackable reference expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceExpr {
    /// A simple name: `x`
    Name { node: NodeId, name: String },
    /// An attribute access: `x.y`
    Member {
        node: NodeId,
        base: Box<ReferenceExpr>,
        attr: String,
    },
    /// A subscript: `x["k"]`, `x[0]`, `x[i]`
    Index {
        node: NodeId,
        base: Box<ReferenceExpr>,
        key: IndexKey,
    },
}

impl ReferenceExpr {
    pub fn name(node: NodeId, name: impl Into<String>) -> Self {
        ReferenceExpr::Name {
            node,
            name: name.into(),
        }
    }

    pub fn member(node: NodeId, base: ReferenceExpr, attr: impl Into<String>) -> Self {
        ReferenceExpr::Member {
            node,
            base: Box::new(base),
            attr: attr.into(),
        }
    }

    pub fn index(node: NodeId, base: ReferenceExpr, key: IndexKey) -> Self {
        ReferenceExpr::Index {
            node,
            base: Box::new(base),
            key,
        }
    }

    /// The AST node this reference was built from.
    pub fn node(&self) -> NodeId {
        match self {
            ReferenceExpr::Name { node, .. }
            | ReferenceExpr::Member { node, .. }
            | ReferenceExpr::Index { node, .. } => *node,
        }
    }

    /// The name, if this is a simple name reference.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            ReferenceExpr::Name { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The immediate base expression, if any.
    pub fn base(&self) -> Option<&ReferenceExpr> {
        match self {
            ReferenceExpr::Name { .. } => None,
            ReferenceExpr::Member { base, .. } | ReferenceExpr::Index { base, .. } => Some(base),
        }
    }

    /// Structural equality ignoring node ids. Dynamic subscript keys never
    /// match, including against themselves.
    pub fn matches(&self, other: &ReferenceExpr) -> bool {
        match (self, other) {
            (ReferenceExpr::Name { name: a, .. }, ReferenceExpr::Name { name: b, .. }) => a == b,
            (
                ReferenceExpr::Member {
                    base: ab, attr: aa, ..
                },
                ReferenceExpr::Member {
                    base: bb, attr: ba, ..
                },
            ) => aa == ba && ab.matches(bb),
            (
                ReferenceExpr::Index {
                    base: ab, key: ak, ..
                },
                ReferenceExpr::Index {
                    base: bb, key: bk, ..
                },
            ) => {
                let keys_match = match (ak, bk) {
                    (IndexKey::Str(a), IndexKey::Str(b)) => a == b,
                    (IndexKey::Int(a), IndexKey::Int(b)) => a == b,
                    _ => false,
                };
                keys_match && ab.matches(bb)
            }
            _ => false,
        }
    }

    /// Whether `self` matches a proper base of `reference`.
    ///
    /// An assignment to `a` partially matches the reference `a.b`: the write
    /// rebinds a prefix of the reference and invalidates its narrowing.
    pub fn matches_base_of(&self, reference: &ReferenceExpr) -> bool {
        let mut base = reference.base();
        while let Some(expr) = base {
            if self.matches(expr) {
                return true;
            }
            base = expr.base();
        }
        false
    }

    /// Canonical cache key for this reference.
    pub fn key(&self) -> ReferenceKey {
        ReferenceKey(self.render_key())
    }

    /// Keys for this reference and every base it is built from, outermost
    /// first. A branch label affects the reference if any of these keys is
    /// in its affected-expression set.
    pub fn sub_reference_keys(&self) -> Vec<ReferenceKey> {
        let mut keys = vec![self.key()];
        let mut base = self.base();
        while let Some(expr) = base {
            keys.push(expr.key());
            base = expr.base();
        }
        keys
    }

    fn render_key(&self) -> String {
        match self {
            ReferenceExpr::Name { name, .. } => name.clone(),
            ReferenceExpr::Member { base, attr, .. } => {
                format!("{}.{}", base.render_key(), attr)
            }
            ReferenceExpr::Index { base, key, .. } => match key {
                IndexKey::Str(s) => format!("{}[\"{}\"]", base.render_key(), s),
                IndexKey::Int(i) => format!("{}[{}]", base.render_key(), i),
                IndexKey::Dynamic(node) => format!("{}[{}]", base.render_key(), node),
            },
        }
    }
}

impl std::fmt::Display for ReferenceExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render_key())
    }
}
