//! Derivative expansion.
//!
//! Gradients of compound expressions are rewritten into gradients of terminals by applying the
//! usual differentiation rules bottom-up: linearity through sums, negations and restrictions,
//! the product rule, the quotient rule. Gradients of constant values collapse to zero tensors
//! immediately, and the zero-pruning constructors below keep those zeros from spreading through
//! the rewritten tree. After expansion no `Grad` node wraps arithmetic: what remain are
//! gradients of terminals and of shaping operations (indexing, transposition), which are left
//! for the discretization to resolve.

use wfl_core::expr::{Expr, ExprData};
use wfl_core::form::Form;

use crate::traversal::map_expr;

/// Returns true for nodes that are zero by construction.
fn is_trivially_zero(expr: &Expr) -> bool {
    match expr.data() {
        ExprData::Zero { .. } => true,
        ExprData::ScalarValue(v) => *v == 0.0,
        _ => false,
    }
}

/// `a + b`, dropping zero summands.
fn pruned_add(a: Expr, b: Expr) -> Expr {
    if is_trivially_zero(&a) {
        b
    } else if is_trivially_zero(&b) {
        a
    } else {
        a + b
    }
}

/// `a * b`, collapsing to a zero of the product's shape when either factor is zero.
fn pruned_mul(a: Expr, b: Expr) -> Expr {
    if is_trivially_zero(&a) || is_trivially_zero(&b) {
        let shape_a = a.shape();
        let shape = if shape_a.is_empty() { b.shape() } else { shape_a };
        Expr::zero_with_shape(shape)
    } else {
        a * b
    }
}

fn pruned_neg(a: Expr) -> Expr {
    if is_trivially_zero(&a) {
        a
    } else {
        -a
    }
}

/// The shape of `grad(expr)` over a space of geometric dimension `gdim`.
fn grad_shape(expr: &Expr, gdim: Option<usize>) -> Vec<usize> {
    let mut shape = expr.shape();
    if let Some(gdim) = gdim {
        shape.push(gdim);
    }
    shape
}

/// Differentiates `expr` once with respect to the spatial coordinate, distributing the gradient
/// through the arithmetic operators. Gradients of terminals and of shaping operations stay
/// explicit. `expr` itself must already be free of compound `Grad` nodes.
fn apply_grad(expr: &Expr, gdim: Option<usize>) -> Expr {
    if expr.is_constant() {
        return Expr::zero_with_shape(grad_shape(expr, gdim));
    }
    match expr.data() {
        ExprData::Sum(a, b) => pruned_add(apply_grad(a, gdim), apply_grad(b, gdim)),
        ExprData::Negated(a) => pruned_neg(apply_grad(a, gdim)),
        ExprData::Restricted { operand, side } => {
            let inner = apply_grad(operand, gdim);
            if is_trivially_zero(&inner) {
                inner
            } else {
                Expr::restricted(inner, *side)
            }
        }
        ExprData::Product(a, b) => pruned_add(
            pruned_mul(apply_grad(a, gdim), b.clone()),
            pruned_mul(a.clone(), apply_grad(b, gdim)),
        ),
        ExprData::Division(a, b) => {
            let numerator = pruned_add(
                pruned_mul(apply_grad(a, gdim), b.clone()),
                pruned_neg(pruned_mul(a.clone(), apply_grad(b, gdim))),
            );
            if is_trivially_zero(&numerator) {
                Expr::zero_with_shape(grad_shape(expr, gdim))
            } else {
                numerator / (b.clone() * b.clone())
            }
        }
        // Gradients of terminals and shaping operations are left for the discretization.
        _ => Expr::grad(expr.clone()),
    }
}

/// Expands every `Grad` node over arithmetic into gradients of terminals and shaping
/// operations. Zeros produced by collapsed gradients are pruned out of the surrounding
/// arithmetic in the same pass.
pub fn expand_derivatives(expr: &Expr) -> Expr {
    let gdim = expr.domain().map(|d| d.geometric_dimension());
    map_expr(expr, &mut |node| match node.data() {
        // Operands were mapped first, so `operand` contains no compound gradients.
        ExprData::Grad(operand) => Some(apply_grad(
            operand,
            gdim.or_else(|| operand.domain().map(|d| d.geometric_dimension())),
        )),
        ExprData::Sum(a, b) if is_trivially_zero(a) || is_trivially_zero(b) => {
            Some(pruned_add(a.clone(), b.clone()))
        }
        ExprData::Product(a, b) if is_trivially_zero(a) || is_trivially_zero(b) => {
            Some(pruned_mul(a.clone(), b.clone()))
        }
        ExprData::Division(a, _) if is_trivially_zero(a) => {
            Some(Expr::zero_with_shape(node.shape()))
        }
        ExprData::Negated(a) if is_trivially_zero(a) => Some(a.clone()),
        _ => None,
    })
}

/// Expands derivatives in every integrand of the form.
pub fn expand_form_derivatives(form: &Form) -> Form {
    let integrals = form
        .integrals()
        .iter()
        .map(|integral| integral.reconstruct_integrand(expand_derivatives(integral.integrand())))
        .collect();
    Form::new(integrals)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wfl_core::element::FiniteElement;
    use wfl_core::expr::Side;
    use wfl_core::geometry::{Cell, Domain};
    use super::*;

    fn triangle() -> Domain {
        Domain::new("mesh", Cell::Triangle)
    }

    fn p1() -> FiniteElement {
        FiniteElement::new("CG", Some(triangle()), Some(1)).unwrap()
    }

    #[test]
    fn gradient_distributes_over_sums() {
        let u = Expr::argument(p1(), 0);
        let w = Expr::coefficient(p1());
        let expanded = expand_derivatives(&Expr::grad(u.clone() + w.clone()));
        assert_eq!(expanded, Expr::grad(u) + Expr::grad(w));
    }

    #[test]
    fn gradient_of_constant_is_zero() {
        let expanded = expand_derivatives(&Expr::grad(Expr::scalar(3.0)));
        assert!(matches!(
            expanded.data(),
            wfl_core::expr::ExprData::Zero { .. },
        ));
    }

    #[test]
    fn product_rule_prunes_constant_factors() {
        // grad(2 * w) has a zero branch grad(2) * w which must not survive.
        let w = Expr::coefficient(p1());
        let expanded = expand_derivatives(&Expr::grad(Expr::scalar(2.0) * w.clone()));
        assert_eq!(expanded, Expr::scalar(2.0) * Expr::grad(w));
    }

    #[test]
    fn coefficient_can_vanish_from_an_integrand() {
        // v * grad(c) with constant c collapses to a zero without the argument surviving
        // as a factor.
        let v = Expr::argument(p1(), 0);
        let expanded = expand_derivatives(&(v * Expr::grad(Expr::scalar(1.0))));
        assert!(is_trivially_zero(&expanded));
    }

    #[test]
    fn quotient_rule() {
        let w = Expr::coefficient(p1());
        let u = Expr::coefficient(p1());
        let expanded = expand_derivatives(&Expr::grad(w.clone() / u.clone()));
        let expected = (Expr::grad(w.clone()) * u.clone()
            + (-(w.clone() * Expr::grad(u.clone()))))
            / (u.clone() * u);
        assert_eq!(expanded, expected);
    }

    #[test]
    fn gradient_passes_through_restrictions() {
        let w = Expr::coefficient(p1());
        let expanded =
            expand_derivatives(&Expr::grad(Expr::restricted(w.clone(), Side::Plus)));
        assert_eq!(expanded, Expr::restricted(Expr::grad(w), Side::Plus));
    }

    #[test]
    fn nested_gradients_expand_inside_out() {
        let w = Expr::coefficient(p1());
        // grad(grad(w) * w) needs the inner gradient kept and the product rule applied.
        let expanded = expand_derivatives(&Expr::grad(Expr::grad(w.clone()) * w.clone()));
        let expected = Expr::grad(Expr::grad(w.clone())) * w.clone()
            + Expr::grad(w.clone()) * Expr::grad(w);
        assert_eq!(expanded, expected);
    }

    #[test]
    fn gradients_of_shaping_operations_stay_explicit() {
        let w = Expr::coefficient(p1());
        let e = Expr::grad(Expr::transposed(Expr::grad(w)));
        let expanded = expand_derivatives(&e);
        assert_eq!(expanded, e);
    }

    #[test]
    fn expansion_is_idempotent() {
        let u = Expr::argument(p1(), 0);
        let w = Expr::coefficient(p1());
        let once = expand_derivatives(&Expr::grad((u + w.clone()) * w));
        let twice = expand_derivatives(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn form_expansion_rewrites_every_integrand() {
        use wfl_core::form::{Integral, IntegralType, SubdomainId};
        let v = Expr::argument(p1(), 0);
        let form = Form::new(vec![Integral::new(
            Expr::grad(Expr::scalar(5.0) + Expr::coefficient(p1())) * Expr::grad(v.clone()),
            triangle(),
            IntegralType::Cell,
            SubdomainId::Everywhere,
        )]);
        let expanded = expand_form_derivatives(&form);
        let integrand = expanded.integrals()[0].integrand();
        // The constant summand is gone.
        assert!(!integrand
            .post_order_iter()
            .any(|n| matches!(n.data(), wfl_core::expr::ExprData::ScalarValue(v) if *v == 5.0)));
    }
}
