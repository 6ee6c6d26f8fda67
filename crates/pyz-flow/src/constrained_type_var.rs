//! Narrowing of constrained type variables along a flow path.
//!
//! A type variable constrained to a finite set of classes can sometimes be
//! pinned to exactly one of them by the `isinstance` guards dominating a
//! program point. This walker filters the constraint set backwards through
//! the graph: positive `isinstance(x, C)` tests keep only constraints of
//! class `C`, negative tests drop them, joins union the surviving sets.
//! The result is a constraint only when exactly one survives.

use rustc_hash::FxHashSet;

use pyz_binder::{FlowNodeId, FlowNodeKind, flow_flags};
use pyz_solver::TypeId;

use crate::engine::CodeFlowEngine;
use crate::evaluator::eval_flags;

impl CodeFlowEngine<'_> {
    /// Narrow a constrained type variable to a single constraint, if the
    /// guards on every path to `flow_node` agree on one. Returns `None`
    /// when no single constraint survives or when any constraint is not a
    /// class instance.
    pub fn narrow_constrained_type_var(
        &self,
        flow_node: FlowNodeId,
        type_var: TypeId,
    ) -> Option<TypeId> {
        let tv = self.types.as_type_var(type_var)?;
        let constraints = self.types.type_var_constraints(tv);
        if constraints.is_empty() {
            return None;
        }
        for &constraint in &constraints {
            self.types.as_instance(constraint)?;
        }

        let mut visited: FxHashSet<FlowNodeId> = FxHashSet::default();
        let narrowed =
            self.narrow_constrained_recursive(flow_node, type_var, &constraints, &mut visited);
        if narrowed.len() == 1 {
            Some(narrowed[0])
        } else {
            None
        }
    }

    /// `visited` holds the nodes on the current path only: every recursive
    /// call walks with its own copy, so a node shared by sibling branches
    /// of a join is recomputed per branch and only a true cycle within one
    /// path terminates early.
    fn narrow_constrained_recursive(
        &self,
        flow_node: FlowNodeId,
        type_var: TypeId,
        starting: &[TypeId],
        visited: &mut FxHashSet<FlowNodeId>,
    ) -> Vec<TypeId> {
        let mut cur = flow_node;
        loop {
            if !visited.insert(cur) {
                return starting.to_vec();
            }
            let Some(node) = self.graph.get(cur) else {
                return starting.to_vec();
            };

            if node.has_any_flags(flow_flags::CONDITION) {
                let FlowNodeKind::Condition { test, antecedent } = &node.kind else {
                    return starting.to_vec();
                };
                let is_positive = node.has_any_flags(flow_flags::TRUE_CONDITION);
                if let Some(filter_class) = self.isinstance_filter_class(*test, type_var) {
                    let mut path_visited = visited.clone();
                    let inner = self.narrow_constrained_recursive(
                        *antecedent,
                        type_var,
                        starting,
                        &mut path_visited,
                    );
                    return inner
                        .into_iter()
                        .filter(|&constraint| {
                            let same_class = self
                                .types
                                .as_instance(constraint)
                                .map(|(class, _)| class)
                                == Some(filter_class);
                            same_class == is_positive
                        })
                        .collect();
                }
                cur = *antecedent;
                continue;
            }

            match &node.kind {
                FlowNodeKind::BranchLabel { antecedents, .. }
                | FlowNodeKind::LoopLabel { antecedents, .. } => {
                    let mut surviving: FxHashSet<TypeId> = FxHashSet::default();
                    for &antecedent in antecedents {
                        let mut branch_visited = visited.clone();
                        for constraint in self.narrow_constrained_recursive(
                            antecedent,
                            type_var,
                            starting,
                            &mut branch_visited,
                        ) {
                            surviving.insert(constraint);
                        }
                    }
                    // Keep the canonical constraint order; the result is
                    // always a subset of the starting set.
                    return starting
                        .iter()
                        .copied()
                        .filter(|c| surviving.contains(c))
                        .collect();
                }

                FlowNodeKind::Start | FlowNodeKind::Unreachable => {
                    return starting.to_vec();
                }

                // Every other edge kind is pass-through for this walk,
                // including the finally gates and exits.
                other => match node.single_antecedent() {
                    Some(antecedent) => {
                        cur = antecedent;
                    }
                    None => {
                        debug_assert!(false, "kind without antecedent: {other:?}");
                        return starting.to_vec();
                    }
                },
            }
        }
    }

    /// If `test` is `isinstance(x, C)` where `x` is compatible with the
    /// constrained type variable and `C` resolves to a class, the class.
    fn isinstance_filter_class(
        &self,
        test: pyz_common::NodeId,
        type_var: TypeId,
    ) -> Option<pyz_solver::ClassId> {
        let guard = self.evaluator.get_isinstance_guard(test)?;
        let argument = self
            .evaluator
            .get_type_of_expression(guard.argument, eval_flags::NONE)?;
        if !self.is_compatible_with_constrained_type_var(argument.ty, type_var) {
            return None;
        }
        let class_type = self
            .evaluator
            .get_type_of_expression(guard.class_expr, eval_flags::NONE)?;
        self.types.as_class(class_type.ty)
    }

    /// Every subtype of `ty` is the type variable itself or an instance of
    /// one of its constraint classes.
    fn is_compatible_with_constrained_type_var(&self, ty: TypeId, type_var: TypeId) -> bool {
        let Some(tv) = self.types.as_type_var(type_var) else {
            return false;
        };
        let constraint_classes: Vec<_> = self
            .types
            .type_var_constraints(tv)
            .iter()
            .filter_map(|&c| self.types.as_instance(c).map(|(class, _)| class))
            .collect();
        self.types.union_members(ty).iter().all(|&member| {
            member == type_var
                || self
                    .types
                    .as_instance(member)
                    .is_some_and(|(class, _)| constraint_classes.contains(&class))
        })
    }
}
