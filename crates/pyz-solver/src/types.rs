//! Interned types.
//!
//! Types are immutable values deduplicated behind `u32` handles. The first
//! few handles are reserved for sentinels so hot comparisons (`is Never`,
//! `is incomplete Unknown`) are integer equality checks.
//!
//! The interner hands out ids with `&self`; all storage sits behind
//! `RefCell`. The checker is single-threaded per file, so this is safe and
//! keeps call sites free of `&mut` plumbing.

use std::cell::RefCell;

use rustc_hash::{FxHashMap, FxHashSet};

use pyz_common::NodeId;

/// Interned type handle.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct TypeId(pub u32);

impl TypeId {
    /// The empty type; no value inhabits it.
    pub const NEVER: TypeId = TypeId(0);
    /// An unknown type (implicit `Any` from missing information).
    pub const UNKNOWN: TypeId = TypeId(1);
    /// An unknown that is still being computed along a cycle. Flow analysis
    /// introduces these while iterating and strips them from finished
    /// answers.
    pub const INCOMPLETE_UNKNOWN: TypeId = TypeId(2);
    /// Explicit `Any`.
    pub const ANY: TypeId = TypeId(3);
    /// The type of a name that is not bound to any value.
    pub const UNBOUND: TypeId = TypeId(4);
}

/// Index of a class in the interner's class table.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ClassId(pub u32);

/// Index of a function in the interner's function table.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct FunctionId(pub u32);

/// Index of a type variable in the interner's type-var table.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct TypeVarId(pub u32);

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum LiteralValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

/// The shape of an interned type.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum TypeKind {
    Never,
    Unknown { incomplete: bool },
    Any,
    Unbound,
    /// The class object itself (what `type[C]` describes).
    Class(ClassId),
    /// An instance of a class, optionally narrowed to a literal value.
    Instance {
        class: ClassId,
        literal: Option<LiteralValue>,
    },
    Function(FunctionId),
    /// An overloaded function; members are `Function` types.
    Overloaded(Vec<TypeId>),
    Union(Vec<TypeId>),
    TypeVar(TypeVarId),
}

/// Declaration-level facts about a function, as far as call analysis needs
/// them.
#[derive(Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    /// Declared return type; `None` when the signature is unannotated. For
    /// an `async def` this is the awaited value type.
    pub declared_return: Option<TypeId>,
    pub flags: u32,
    /// Last node of the function body, for fall-off-the-end reachability
    /// queries on unannotated functions.
    pub body_end: Option<NodeId>,
}

/// Function declaration flags.
pub mod function_flags {
    pub const ASYNC: u32 = 1 << 0;
    pub const GENERATOR: u32 = 1 << 1;
    pub const ABSTRACT: u32 = 1 << 2;
    /// Declared in a stub file or synthesized from one.
    pub const STUB_DEFINITION: u32 = 1 << 3;
    /// The only non-docstring statement of the body is
    /// `raise NotImplementedError(...)`.
    pub const RAISES_NOT_IMPLEMENTED: u32 = 1 << 4;
}

#[derive(Debug)]
struct ClassDef {
    name: String,
    members: FxHashMap<String, TypeId>,
    /// The class's metaclass defines a custom `__call__`.
    has_metaclass_call: bool,
}

#[derive(Clone, Debug)]
struct TypeVarDef {
    name: String,
    constraints: Vec<TypeId>,
}

/// Type storage and the small algebra the checker consumes.
pub struct TypeInterner {
    kinds: RefCell<Vec<TypeKind>>,
    dedup: RefCell<FxHashMap<TypeKind, TypeId>>,
    classes: RefCell<Vec<ClassDef>>,
    functions: RefCell<Vec<FunctionDef>>,
    type_vars: RefCell<Vec<TypeVarDef>>,
    bool_class: ClassId,
}

impl TypeInterner {
    pub fn new() -> Self {
        let interner = Self {
            kinds: RefCell::new(Vec::new()),
            dedup: RefCell::new(FxHashMap::default()),
            classes: RefCell::new(Vec::new()),
            functions: RefCell::new(Vec::new()),
            type_vars: RefCell::new(Vec::new()),
            bool_class: ClassId(0),
        };
        // Reserve the sentinel ids in declaration order.
        let never = interner.intern(TypeKind::Never);
        let unknown = interner.intern(TypeKind::Unknown { incomplete: false });
        let incomplete = interner.intern(TypeKind::Unknown { incomplete: true });
        let any = interner.intern(TypeKind::Any);
        let unbound = interner.intern(TypeKind::Unbound);
        debug_assert_eq!(never, TypeId::NEVER);
        debug_assert_eq!(unknown, TypeId::UNKNOWN);
        debug_assert_eq!(incomplete, TypeId::INCOMPLETE_UNKNOWN);
        debug_assert_eq!(any, TypeId::ANY);
        debug_assert_eq!(unbound, TypeId::UNBOUND);

        let bool_class = interner.declare_class("bool");
        debug_assert_eq!(bool_class, interner.bool_class);
        interner
    }

    fn intern(&self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.dedup.borrow().get(&kind) {
            return id;
        }
        let mut kinds = self.kinds.borrow_mut();
        let id = TypeId(kinds.len() as u32);
        kinds.push(kind.clone());
        self.dedup.borrow_mut().insert(kind, id);
        id
    }

    /// The shape of a type. Cloned out so callers never hold a borrow of
    /// the interner across further interning calls.
    pub fn kind(&self, id: TypeId) -> TypeKind {
        self.kinds.borrow()[id.0 as usize].clone()
    }

    // =========================================================================
    // Classes
    // =========================================================================

    pub fn declare_class(&self, name: impl Into<String>) -> ClassId {
        let mut classes = self.classes.borrow_mut();
        let id = ClassId(classes.len() as u32);
        classes.push(ClassDef {
            name: name.into(),
            members: FxHashMap::default(),
            has_metaclass_call: false,
        });
        id
    }

    pub fn add_class_member(&self, class: ClassId, name: impl Into<String>, ty: TypeId) {
        self.classes.borrow_mut()[class.0 as usize]
            .members
            .insert(name.into(), ty);
    }

    pub fn set_metaclass_call(&self, class: ClassId) {
        self.classes.borrow_mut()[class.0 as usize].has_metaclass_call = true;
    }

    pub fn class_has_metaclass_call(&self, class: ClassId) -> bool {
        self.classes.borrow()[class.0 as usize].has_metaclass_call
    }

    pub fn class_name(&self, class: ClassId) -> String {
        self.classes.borrow()[class.0 as usize].name.clone()
    }

    pub fn lookup_member(&self, class: ClassId, name: &str) -> Option<TypeId> {
        self.classes.borrow()[class.0 as usize]
            .members
            .get(name)
            .copied()
    }

    /// The class object type (`type[C]`).
    pub fn class_type(&self, class: ClassId) -> TypeId {
        self.intern(TypeKind::Class(class))
    }

    /// The plain instance type of a class.
    pub fn instance(&self, class: ClassId) -> TypeId {
        self.intern(TypeKind::Instance {
            class,
            literal: None,
        })
    }

    pub fn literal_instance(&self, class: ClassId, literal: LiteralValue) -> TypeId {
        self.intern(TypeKind::Instance {
            class,
            literal: Some(literal),
        })
    }

    pub fn bool_class(&self) -> ClassId {
        self.bool_class
    }

    pub fn bool_instance(&self) -> TypeId {
        self.instance(self.bool_class)
    }

    pub fn literal_bool(&self, value: bool) -> TypeId {
        self.literal_instance(self.bool_class, LiteralValue::Bool(value))
    }

    // =========================================================================
    // Functions, overloads, type variables
    // =========================================================================

    pub fn function(&self, def: FunctionDef) -> TypeId {
        let mut functions = self.functions.borrow_mut();
        let id = FunctionId(functions.len() as u32);
        functions.push(def);
        drop(functions);
        self.intern(TypeKind::Function(id))
    }

    pub fn function_def(&self, id: FunctionId) -> FunctionDef {
        self.functions.borrow()[id.0 as usize].clone()
    }

    pub fn overloaded(&self, members: Vec<TypeId>) -> TypeId {
        debug_assert!(
            members
                .iter()
                .all(|&m| matches!(self.kind(m), TypeKind::Function(_))),
            "overload members must be function types"
        );
        self.intern(TypeKind::Overloaded(members))
    }

    pub fn type_var(&self, name: impl Into<String>, constraints: Vec<TypeId>) -> TypeId {
        let mut type_vars = self.type_vars.borrow_mut();
        let id = TypeVarId(type_vars.len() as u32);
        type_vars.push(TypeVarDef {
            name: name.into(),
            constraints,
        });
        drop(type_vars);
        self.intern(TypeKind::TypeVar(id))
    }

    pub fn type_var_name(&self, id: TypeVarId) -> String {
        self.type_vars.borrow()[id.0 as usize].name.clone()
    }

    pub fn type_var_constraints(&self, id: TypeVarId) -> Vec<TypeId> {
        self.type_vars.borrow()[id.0 as usize].constraints.clone()
    }

    // =========================================================================
    // Union algebra
    // =========================================================================

    /// Combine types into a union: flatten nested unions, drop `Never`,
    /// deduplicate preserving first-seen order. An empty result is `Never`;
    /// a single member collapses to itself.
    pub fn union(&self, types: Vec<TypeId>) -> TypeId {
        let mut members: Vec<TypeId> = Vec::new();
        let mut seen: FxHashSet<TypeId> = FxHashSet::default();
        let mut push = |id: TypeId, members: &mut Vec<TypeId>| {
            if id != TypeId::NEVER && seen.insert(id) {
                members.push(id);
            }
        };
        for ty in types {
            match self.kind(ty) {
                TypeKind::Union(inner) => {
                    for member in inner {
                        push(member, &mut members);
                    }
                }
                _ => push(ty, &mut members),
            }
        }
        match members.len() {
            0 => TypeId::NEVER,
            1 => members[0],
            _ => self.intern(TypeKind::Union(members)),
        }
    }

    /// The members of a union, or the type itself for non-unions.
    pub fn union_members(&self, ty: TypeId) -> Vec<TypeId> {
        match self.kind(ty) {
            TypeKind::Union(members) => members,
            _ => vec![ty],
        }
    }

    pub fn is_never(&self, ty: TypeId) -> bool {
        ty == TypeId::NEVER
    }

    /// Whether the type is, or contains as a union member, the
    /// incomplete-unknown sentinel.
    pub fn contains_incomplete_unknown(&self, ty: TypeId) -> bool {
        if ty == TypeId::INCOMPLETE_UNKNOWN {
            return true;
        }
        match self.kind(ty) {
            TypeKind::Union(members) => members.contains(&TypeId::INCOMPLETE_UNKNOWN),
            _ => false,
        }
    }

    /// Strip incomplete-unknown members left behind by cycle iteration.
    /// A bare incomplete unknown (or a union with nothing else) decays to
    /// plain `Unknown`.
    pub fn remove_incomplete_unknown(&self, ty: TypeId) -> TypeId {
        if ty == TypeId::INCOMPLETE_UNKNOWN {
            return TypeId::UNKNOWN;
        }
        match self.kind(ty) {
            TypeKind::Union(members) if members.contains(&TypeId::INCOMPLETE_UNKNOWN) => {
                let remaining: Vec<TypeId> = members
                    .into_iter()
                    .filter(|&m| m != TypeId::INCOMPLETE_UNKNOWN)
                    .collect();
                if remaining.is_empty() {
                    TypeId::UNKNOWN
                } else {
                    self.union(remaining)
                }
            }
            _ => ty,
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    pub fn as_class(&self, ty: TypeId) -> Option<ClassId> {
        match self.kind(ty) {
            TypeKind::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_instance(&self, ty: TypeId) -> Option<(ClassId, Option<LiteralValue>)> {
        match self.kind(ty) {
            TypeKind::Instance { class, literal } => Some((class, literal)),
            _ => None,
        }
    }

    pub fn as_function(&self, ty: TypeId) -> Option<FunctionDef> {
        match self.kind(ty) {
            TypeKind::Function(id) => Some(self.function_def(id)),
            _ => None,
        }
    }

    pub fn as_overloaded(&self, ty: TypeId) -> Option<Vec<TypeId>> {
        match self.kind(ty) {
            TypeKind::Overloaded(members) => Some(members),
            _ => None,
        }
    }

    pub fn as_type_var(&self, ty: TypeId) -> Option<TypeVarId> {
        match self.kind(ty) {
            TypeKind::TypeVar(id) => Some(id),
            _ => None,
        }
    }

    /// Render a type for diagnostics and test output.
    pub fn type_repr(&self, ty: TypeId) -> String {
        match self.kind(ty) {
            TypeKind::Never => "Never".to_string(),
            TypeKind::Unknown { incomplete: false } => "Unknown".to_string(),
            TypeKind::Unknown { incomplete: true } => "Unknown(incomplete)".to_string(),
            TypeKind::Any => "Any".to_string(),
            TypeKind::Unbound => "Unbound".to_string(),
            TypeKind::Class(class) => format!("type[{}]", self.class_name(class)),
            TypeKind::Instance {
                class,
                literal: None,
            } => self.class_name(class),
            TypeKind::Instance {
                literal: Some(value),
                ..
            } => {
                let rendered = match value {
                    LiteralValue::Bool(true) => "True".to_string(),
                    LiteralValue::Bool(false) => "False".to_string(),
                    LiteralValue::Int(i) => i.to_string(),
                    LiteralValue::Str(s) => format!("'{s}'"),
                };
                format!("Literal[{rendered}]")
            }
            TypeKind::Function(id) => format!("def {}", self.function_def(id).name),
            TypeKind::Overloaded(members) => format!("overloaded[{}]", members.len()),
            TypeKind::Union(members) => {
                let rendered: Vec<String> =
                    members.iter().map(|&m| self.type_repr(m)).collect();
                rendered.join(" | ")
            }
            TypeKind::TypeVar(id) => self.type_var_name(id),
        }
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}
