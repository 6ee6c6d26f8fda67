use pyz_solver::{FunctionDef, LiteralValue, TypeId, TypeInterner, TypeKind, function_flags};

#[test]
fn test_sentinels_are_stable() {
    let types = TypeInterner::new();
    assert!(matches!(types.kind(TypeId::NEVER), TypeKind::Never));
    assert!(matches!(
        types.kind(TypeId::UNKNOWN),
        TypeKind::Unknown { incomplete: false }
    ));
    assert!(matches!(
        types.kind(TypeId::INCOMPLETE_UNKNOWN),
        TypeKind::Unknown { incomplete: true }
    ));
    assert!(matches!(types.kind(TypeId::ANY), TypeKind::Any));
    assert!(matches!(types.kind(TypeId::UNBOUND), TypeKind::Unbound));
}

#[test]
fn test_instance_interning_dedups() {
    let types = TypeInterner::new();
    let int = types.declare_class("int");
    assert_eq!(types.instance(int), types.instance(int));
    assert_eq!(
        types.literal_instance(int, LiteralValue::Int(1)),
        types.literal_instance(int, LiteralValue::Int(1))
    );
    assert_ne!(
        types.literal_instance(int, LiteralValue::Int(1)),
        types.literal_instance(int, LiteralValue::Int(2))
    );
    assert_ne!(types.instance(int), types.class_type(int));
}

#[test]
fn test_union_flattens_dedups_and_drops_never() {
    let types = TypeInterner::new();
    let int = types.instance(types.declare_class("int"));
    let none = types.instance(types.declare_class("None"));

    assert_eq!(types.union(vec![]), TypeId::NEVER);
    assert_eq!(types.union(vec![int]), int);
    assert_eq!(types.union(vec![int, TypeId::NEVER]), int);
    assert_eq!(types.union(vec![int, int]), int);

    let u = types.union(vec![int, none]);
    assert_eq!(types.union_members(u), vec![int, none]);

    // Nested unions flatten; re-unioning the same members is a no-op.
    let nested = types.union(vec![u, int]);
    assert_eq!(nested, u);
}

#[test]
fn test_incomplete_unknown_hygiene() {
    let types = TypeInterner::new();
    let int = types.instance(types.declare_class("int"));

    let dusty = types.union(vec![int, TypeId::INCOMPLETE_UNKNOWN]);
    assert!(types.contains_incomplete_unknown(dusty));
    assert_eq!(types.remove_incomplete_unknown(dusty), int);

    assert_eq!(
        types.remove_incomplete_unknown(TypeId::INCOMPLETE_UNKNOWN),
        TypeId::UNKNOWN
    );
    assert!(!types.contains_incomplete_unknown(int));
    assert_eq!(types.remove_incomplete_unknown(int), int);
}

#[test]
fn test_bool_literals() {
    let types = TypeInterner::new();
    let true_literal = types.literal_bool(true);
    let (class, literal) = types.as_instance(true_literal).expect("instance");
    assert_eq!(class, types.bool_class());
    assert_eq!(literal, Some(LiteralValue::Bool(true)));
    assert_eq!(types.type_repr(true_literal), "Literal[True]");
    assert_eq!(types.type_repr(types.bool_instance()), "bool");
}

#[test]
fn test_function_and_overload_shapes() {
    let types = TypeInterner::new();
    let f = types.function(FunctionDef {
        name: "exit".to_string(),
        declared_return: Some(TypeId::NEVER),
        flags: 0,
        body_end: None,
    });
    let def = types.as_function(f).expect("function");
    assert_eq!(def.name, "exit");
    assert_eq!(def.declared_return, Some(TypeId::NEVER));

    let g = types.function(FunctionDef {
        name: "gen".to_string(),
        declared_return: None,
        flags: function_flags::GENERATOR,
        body_end: None,
    });
    let overload = types.overloaded(vec![f, g]);
    assert_eq!(types.as_overloaded(overload), Some(vec![f, g]));
}

#[test]
fn test_member_lookup() {
    let types = TypeInterner::new();
    let cm = types.declare_class("suppress");
    let exit = types.function(FunctionDef {
        name: "__exit__".to_string(),
        declared_return: Some(types.bool_instance()),
        flags: 0,
        body_end: None,
    });
    types.add_class_member(cm, "__exit__", exit);

    assert_eq!(types.lookup_member(cm, "__exit__"), Some(exit));
    assert_eq!(types.lookup_member(cm, "__aexit__"), None);
}

#[test]
fn test_type_var_constraints() {
    let types = TypeInterner::new();
    let int = types.instance(types.declare_class("int"));
    let str_t = types.instance(types.declare_class("str"));
    let tv = types.type_var("AnyStr", vec![int, str_t]);
    let id = types.as_type_var(tv).expect("type var");
    assert_eq!(types.type_var_constraints(id), vec![int, str_t]);
    assert_eq!(types.type_var_name(id), "AnyStr");
}
