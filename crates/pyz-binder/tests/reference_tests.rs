use pyz_binder::{IndexKey, ReferenceExpr};
use pyz_common::NodeId;

fn name(id: u32, s: &str) -> ReferenceExpr {
    ReferenceExpr::name(NodeId(id), s)
}

#[test]
fn test_simple_name_matching() {
    let a = name(1, "x");
    let b = name(9, "x");
    let c = name(2, "y");
    assert!(a.matches(&b), "node ids must not affect matching");
    assert!(!a.matches(&c));
}

#[test]
fn test_member_access_matching() {
    let a = ReferenceExpr::member(NodeId(3), name(1, "a"), "b");
    let b = ReferenceExpr::member(NodeId(30), name(10, "a"), "b");
    let c = ReferenceExpr::member(NodeId(4), name(1, "a"), "c");
    assert!(a.matches(&b));
    assert!(!a.matches(&c));
    assert!(!a.matches(&name(1, "a")));
}

#[test]
fn test_index_matching_literal_keys() {
    let base = || name(1, "m");
    let s1 = ReferenceExpr::index(NodeId(2), base(), IndexKey::Str("k".into()));
    let s2 = ReferenceExpr::index(NodeId(8), base(), IndexKey::Str("k".into()));
    let s3 = ReferenceExpr::index(NodeId(9), base(), IndexKey::Str("j".into()));
    let i1 = ReferenceExpr::index(NodeId(4), base(), IndexKey::Int(0));
    let i2 = ReferenceExpr::index(NodeId(5), base(), IndexKey::Int(0));

    assert!(s1.matches(&s2));
    assert!(!s1.matches(&s3));
    assert!(i1.matches(&i2));
    assert!(!s1.matches(&i1));
}

#[test]
fn test_dynamic_index_never_matches() {
    let d1 = ReferenceExpr::index(NodeId(2), name(1, "m"), IndexKey::Dynamic(NodeId(7)));
    let d2 = ReferenceExpr::index(NodeId(2), name(1, "m"), IndexKey::Dynamic(NodeId(7)));
    assert!(!d1.matches(&d2), "computed subscripts are never narrowable");
}

#[test]
fn test_partial_matching() {
    let a = name(1, "a");
    let a_b = ReferenceExpr::member(NodeId(2), name(1, "a"), "b");
    let a_b_c = ReferenceExpr::member(NodeId(3), a_b.clone(), "c");

    // An assignment to `a` rebinds a prefix of `a.b` and of `a.b.c`.
    assert!(a.matches_base_of(&a_b));
    assert!(a.matches_base_of(&a_b_c));
    assert!(a_b.matches_base_of(&a_b_c));
    // The full reference is not a *proper* base of itself.
    assert!(!a_b.matches_base_of(&a_b));
    // And the inverse direction does not hold.
    assert!(!a_b.matches_base_of(&a));
}

#[test]
fn test_reference_keys() {
    let a_b = ReferenceExpr::member(NodeId(2), name(1, "a"), "b");
    assert_eq!(a_b.key().as_str(), "a.b");

    let sub = ReferenceExpr::index(NodeId(3), a_b.clone(), IndexKey::Str("k".into()));
    assert_eq!(sub.key().as_str(), "a.b[\"k\"]");

    let keys: Vec<String> = sub
        .sub_reference_keys()
        .iter()
        .map(|k| k.as_str().to_string())
        .collect();
    assert_eq!(keys, vec!["a.b[\"k\"]", "a.b", "a"]);
}
