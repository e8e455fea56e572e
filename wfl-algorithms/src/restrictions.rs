//! Restriction propagation.
//!
//! On an interior facet every quantity has two candidate values, one from each adjacent cell,
//! and the integrand must pick a side for each terminal. Users restrict whole sub-expressions;
//! this pass pushes those markers down to the terminals, so later stages see restrictions only
//! directly above terminal nodes. Constants are single-valued and lose their markers. A terminal
//! left without a side in an interior facet integrand is an error, as is a sub-expression
//! restricted to both sides at once.

use wfl_core::expr::{Expr, ExprData, Side};
use wfl_core::form::{Form, IntegralType};

use crate::error::FormError;

fn propagate(expr: &Expr, side: Option<Side>) -> Result<Expr, FormError> {
    match expr.data() {
        ExprData::Restricted { operand, side: inner } => {
            match side {
                // Same side twice collapses to one marker.
                Some(outer) if outer != *inner => {
                    Err(FormError::ContradictoryRestriction(operand.to_string()))
                }
                _ => propagate(operand, Some(*inner)),
            }
        }
        _ if expr.is_terminal() => {
            if expr.is_constant() {
                // Single-valued on both sides; the marker is dropped.
                Ok(expr.clone())
            } else {
                match side {
                    Some(side) => Ok(Expr::restricted(expr.clone(), side)),
                    None => Err(FormError::MissingRestriction(expr.to_string())),
                }
            }
        }
        _ => {
            let operands = expr
                .operands()
                .into_iter()
                .map(|op| propagate(op, side))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(expr.reconstruct(operands))
        }
    }
}

/// Pushes restriction markers down to terminals in every interior facet integrand. Integrals of
/// other types pass through unchanged.
pub fn propagate_restrictions(form: &Form) -> Result<Form, FormError> {
    let mut integrals = Vec::with_capacity(form.integrals().len());
    for integral in form.integrals() {
        let integral = if integral.integral_type() == IntegralType::InteriorFacet {
            integral.reconstruct_integrand(propagate(integral.integrand(), None)?)
        } else {
            integral.clone()
        };
        integrals.push(integral);
    }
    Ok(Form::new(integrals))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wfl_core::element::FiniteElement;
    use wfl_core::form::{Integral, SubdomainId};
    use wfl_core::geometry::{Cell, Domain};
    use super::*;

    fn triangle() -> Domain {
        Domain::new("mesh", Cell::Triangle)
    }

    fn p1() -> FiniteElement {
        FiniteElement::new("DG", Some(triangle()), Some(1)).unwrap()
    }

    fn interior(integrand: Expr) -> Form {
        Form::new(vec![Integral::new(
            integrand,
            triangle(),
            IntegralType::InteriorFacet,
            SubdomainId::Everywhere,
        )])
    }

    #[test]
    fn restriction_is_pushed_to_terminals() {
        let u = Expr::argument(p1(), 0);
        let w = Expr::coefficient(p1());
        let form = interior(Expr::restricted(u.clone() * w.clone(), Side::Plus));
        let propagated = propagate_restrictions(&form).unwrap();
        assert_eq!(
            *propagated.integrals()[0].integrand(),
            Expr::restricted(u, Side::Plus) * Expr::restricted(w, Side::Plus),
        );
    }

    #[test]
    fn nested_equal_sides_collapse() {
        let w = Expr::coefficient(p1());
        let form = interior(Expr::restricted(
            Expr::restricted(w.clone(), Side::Minus),
            Side::Minus,
        ));
        let propagated = propagate_restrictions(&form).unwrap();
        assert_eq!(
            *propagated.integrals()[0].integrand(),
            Expr::restricted(w, Side::Minus),
        );
    }

    #[test]
    fn contradictory_sides_fail() {
        let w = Expr::coefficient(p1());
        let form = interior(Expr::restricted(
            Expr::restricted(w, Side::Minus),
            Side::Plus,
        ));
        assert!(matches!(
            propagate_restrictions(&form),
            Err(FormError::ContradictoryRestriction(_)),
        ));
    }

    #[test]
    fn constants_lose_their_markers() {
        let w = Expr::coefficient(p1());
        let form = interior(Expr::restricted(Expr::scalar(2.0) * w.clone(), Side::Plus));
        let propagated = propagate_restrictions(&form).unwrap();
        assert_eq!(
            *propagated.integrals()[0].integrand(),
            Expr::scalar(2.0) * Expr::restricted(w, Side::Plus),
        );
    }

    #[test]
    fn unrestricted_terminal_in_interior_facet_fails() {
        let form = interior(Expr::coefficient(p1()));
        assert!(matches!(
            propagate_restrictions(&form),
            Err(FormError::MissingRestriction(_)),
        ));
    }

    #[test]
    fn other_integral_types_pass_through() {
        let w = Expr::coefficient(p1());
        let form = Form::new(vec![Integral::new(
            w.clone(),
            triangle(),
            IntegralType::Cell,
            SubdomainId::Everywhere,
        )]);
        let propagated = propagate_restrictions(&form).unwrap();
        assert_eq!(*propagated.integrals()[0].integrand(), w);
    }
}
