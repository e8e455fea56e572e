//! Generic traversal and rewriting of expression DAGs.
//!
//! Extraction walks every node in post-order and collects what a predicate selects, deduplicated
//! in first-visit order. Rewriting goes bottom-up: operands are mapped first, the node is
//! rebuilt only when an operand actually changed, and the rule gets the rebuilt node last. Rules
//! return `None` to mean "leave this node alone", which keeps sub-DAGs shared wherever nothing
//! below them changed.

use std::collections::{HashMap, HashSet};

use wfl_core::expr::Expr;
use wfl_core::registry::TypeCode;

/// All nodes satisfying `select`, deduplicated in first-visit order.
pub fn extract_matching(expr: &Expr, select: impl Fn(&Expr) -> bool) -> Vec<Expr> {
    let mut found: Vec<Expr> = Vec::new();
    for node in expr.post_order_iter() {
        if select(node) && !found.contains(node) {
            found.push(node.clone());
        }
    }
    found
}

/// All distinct terminals of the expression.
pub fn extract_terminals(expr: &Expr) -> Vec<Expr> {
    extract_matching(expr, Expr::is_terminal)
}

/// All distinct arguments, sorted by argument number.
pub fn extract_arguments(expr: &Expr) -> Vec<Expr> {
    let mut arguments = extract_matching(expr, |e| e.argument_number().is_some());
    arguments.sort_by_key(|a| a.argument_number());
    arguments
}

/// All distinct coefficients, sorted by count.
pub fn extract_coefficients(expr: &Expr) -> Vec<Expr> {
    let mut coefficients = extract_matching(expr, |e| e.coefficient_count().is_some());
    coefficients.sort_by_key(|c| c.coefficient_count());
    coefficients
}

/// All distinct arguments and coefficients, arguments first.
pub fn extract_arguments_and_coefficients(expr: &Expr) -> Vec<Expr> {
    let mut functions = extract_arguments(expr);
    functions.extend(extract_coefficients(expr));
    functions
}

/// The set of typecodes occurring anywhere in the expression.
pub fn extract_type_codes(expr: &Expr) -> HashSet<TypeCode> {
    expr.post_order_iter().map(Expr::type_code).collect()
}

/// Rewrites an expression bottom-up. `rule` sees each node after its operands were mapped and
/// returns the replacement, or `None` to keep the node. Untouched sub-DAGs stay shared.
pub fn map_expr(expr: &Expr, rule: &mut impl FnMut(&Expr) -> Option<Expr>) -> Expr {
    let operands = expr.operands();
    if operands.is_empty() {
        return rule(expr).unwrap_or_else(|| expr.clone());
    }
    let mapped: Vec<Expr> = operands.iter().map(|op| map_expr(op, rule)).collect();
    let unchanged = mapped.iter().zip(&operands).all(|(new, old)| new.ptr_eq(old));
    let rebuilt = if unchanged {
        expr.clone()
    } else {
        expr.reconstruct(mapped)
    };
    rule(&rebuilt).unwrap_or(rebuilt)
}

/// Substitutes whole sub-expressions according to `replacements`, bottom-up.
pub fn replace(expr: &Expr, replacements: &HashMap<Expr, Expr>) -> Expr {
    map_expr(expr, &mut |node| replacements.get(node).cloned())
}
