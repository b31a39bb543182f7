//! Identifier extraction over expression trees.
//!
//! Given an expression and a role hint, [`describe_expr`] yields the ordered
//! list of identifier references with the role each occupies. This is the
//! single source of truth for def/use derivation; instruction constructors
//! and the lowering pass never walk expressions themselves.

use std::collections::BTreeSet;

use bitflags::bitflags;

use crate::ast::{Expr, Identifier};

bitflags! {
    /// Role an identifier reference plays, combinable for `inout` ports.
    ///
    /// Port directions reuse this type with the caller's perspective: an
    /// input port is something the caller *defines* (`DEF`) and the callee
    /// uses; `Role::empty()` encodes an unresolved direction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Role: u8 {
        const DEF = 0b01;
        const USE = 0b10;
    }
}

/// One identifier reference produced by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdDesc {
    pub name: Identifier,
    pub role: Role,
}

/// Extract identifier references from `expr` under the given role hint.
///
/// The extractor is pure and idempotent; two walks over the same node yield
/// the same list. `procs` is the set of declared task/function names of the
/// enclosing module; calls to procedures not in it are recorded in
/// `unresolved` and contribute nothing (the conservative choice the caller
/// surfaces as a semantic warning).
pub fn describe_expr(
    expr: &Expr,
    hint: Role,
    procs: &BTreeSet<Identifier>,
    unresolved: &mut BTreeSet<Identifier>,
    out: &mut Vec<IdDesc>,
) {
    match expr {
        Expr::Id(name) => out.push(IdDesc {
            name: name.clone(),
            role: hint,
        }),
        Expr::Selected(parts) => {
            for name in parts {
                out.push(IdDesc {
                    name: name.clone(),
                    role: hint,
                });
            }
        }
        Expr::Literal(_) => {}
        Expr::Index { base, index } => {
            describe_expr(base, hint, procs, unresolved, out);
            describe_expr(index, Role::USE, procs, unresolved, out);
        }
        Expr::Range { base, msb, lsb } => {
            describe_expr(base, hint, procs, unresolved, out);
            describe_expr(msb, Role::USE, procs, unresolved, out);
            describe_expr(lsb, Role::USE, procs, unresolved, out);
        }
        Expr::Concat(elems) => {
            for elem in elems {
                describe_expr(elem, hint, procs, unresolved, out);
            }
        }
        Expr::Replicate { count, elems } => {
            describe_expr(count, Role::USE, procs, unresolved, out);
            for elem in elems {
                describe_expr(elem, hint, procs, unresolved, out);
            }
        }
        Expr::Unary { operand, .. } => describe_expr(operand, hint, procs, unresolved, out),
        Expr::Binary { left, right, .. } => {
            describe_expr(left, hint, procs, unresolved, out);
            describe_expr(right, hint, procs, unresolved, out);
        }
        Expr::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            describe_expr(condition, Role::USE, procs, unresolved, out);
            describe_expr(then_expr, hint, procs, unresolved, out);
            describe_expr(else_expr, hint, procs, unresolved, out);
        }
        Expr::FuncCall { name, args } => {
            if !procs.contains(name) {
                unresolved.insert(name.clone());
                return;
            }
            // All arguments are conservatively read; return-value flow
            // through the callee body is not tracked.
            for arg in args {
                describe_expr(arg, Role::USE, procs, unresolved, out);
            }
        }
        Expr::SystemCall { args, .. } => {
            // The function name is not an identifier.
            for arg in args {
                describe_expr(arg, Role::USE, procs, unresolved, out);
            }
        }
    }
}

/// Collect just the identifier names of `expr`, in set form.
pub fn collect_ids(
    expr: &Expr,
    procs: &BTreeSet<Identifier>,
    unresolved: &mut BTreeSet<Identifier>,
) -> BTreeSet<Identifier> {
    let mut descs = Vec::new();
    describe_expr(expr, Role::USE, procs, unresolved, &mut descs);
    descs.into_iter().map(|desc| desc.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, UnaryOp};

    fn extract(expr: &Expr, hint: Role) -> Vec<(String, Role)> {
        let procs = BTreeSet::from(["f".to_string()]);
        let mut unresolved = BTreeSet::new();
        let mut out = Vec::new();
        describe_expr(expr, hint, &procs, &mut unresolved, &mut out);
        out.into_iter().map(|d| (d.name, d.role)).collect()
    }

    fn id(name: &str) -> Expr {
        Expr::Id(name.to_string())
    }

    #[test]
    fn leaf_inherits_hint() {
        assert_eq!(extract(&id("a"), Role::DEF), vec![("a".into(), Role::DEF)]);
        assert_eq!(extract(&id("a"), Role::USE), vec![("a".into(), Role::USE)]);
    }

    #[test]
    fn index_base_keeps_hint_index_forced_use() {
        let expr = Expr::Index {
            base: Box::new(id("mem")),
            index: Box::new(id("addr")),
        };
        assert_eq!(
            extract(&expr, Role::DEF),
            vec![("mem".into(), Role::DEF), ("addr".into(), Role::USE)]
        );
    }

    #[test]
    fn ternary_condition_forced_use() {
        let expr = Expr::Ternary {
            condition: Box::new(id("s")),
            then_expr: Box::new(id("x")),
            else_expr: Box::new(id("y")),
        };
        assert_eq!(
            extract(&expr, Role::USE),
            vec![
                ("s".into(), Role::USE),
                ("x".into(), Role::USE),
                ("y".into(), Role::USE)
            ]
        );
    }

    #[test]
    fn binary_and_unary_inherit() {
        let expr = Expr::Binary {
            op: BinaryOp::BitOr,
            left: Box::new(id("a")),
            right: Box::new(Expr::Unary {
                op: UnaryOp::BitNot,
                operand: Box::new(id("b")),
            }),
        };
        assert_eq!(
            extract(&expr, Role::USE),
            vec![("a".into(), Role::USE), ("b".into(), Role::USE)]
        );
    }

    #[test]
    fn replication_count_forced_use() {
        let expr = Expr::Replicate {
            count: Box::new(id("n")),
            elems: vec![id("a")],
        };
        assert_eq!(
            extract(&expr, Role::DEF),
            vec![("n".into(), Role::USE), ("a".into(), Role::DEF)]
        );
    }

    #[test]
    fn literals_emit_nothing() {
        assert_eq!(extract(&Expr::Literal("8'hFF".into()), Role::USE), vec![]);
    }

    #[test]
    fn known_function_call_reads_arguments() {
        let expr = Expr::FuncCall {
            name: "f".into(),
            args: vec![id("x"), id("y")],
        };
        assert_eq!(
            extract(&expr, Role::DEF),
            vec![("x".into(), Role::USE), ("y".into(), Role::USE)]
        );
    }

    #[test]
    fn unknown_function_call_is_recorded_and_silent() {
        let procs = BTreeSet::new();
        let mut unresolved = BTreeSet::new();
        let mut out = Vec::new();
        let expr = Expr::FuncCall {
            name: "ghost".into(),
            args: vec![id("x")],
        };
        describe_expr(&expr, Role::USE, &procs, &mut unresolved, &mut out);
        assert!(out.is_empty());
        assert!(unresolved.contains("ghost"));
    }

    #[test]
    fn extractor_is_idempotent() {
        let expr = Expr::Concat(vec![id("a"), id("b")]);
        assert_eq!(extract(&expr, Role::USE), extract(&expr, Role::USE));
    }

    #[test]
    fn inout_role_combines() {
        let both = Role::DEF | Role::USE;
        assert!(both.contains(Role::DEF));
        assert!(both.contains(Role::USE));
        assert!(Role::empty().is_empty());
    }
}
