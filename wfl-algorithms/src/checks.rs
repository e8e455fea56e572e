//! Validity checks run on the preprocessed form.
//!
//! Each check is a standalone pass over the form or its grouped integrals, and each failure maps
//! to one [`FormError`] variant. Checks run late in the pipeline, after derivative expansion and
//! restriction propagation, so they see the form the assembler would see.

use wfl_core::expr::{with_registry, Expr, ExprData};
use wfl_core::form::Form;

use crate::analysis::unique_tuple;
use crate::domain_analysis::IntegralData;
use crate::error::FormError;
use crate::traversal::{extract_arguments_and_coefficients, extract_type_codes};

/// Verifies all domains of the form agree on one geometric dimension and returns it.
pub fn check_geometric_dimension(form: &Form) -> Result<usize, FormError> {
    let mut dimensions: Vec<usize> = form
        .domains()
        .iter()
        .map(|d| d.geometric_dimension())
        .collect();
    for function in extract_functions(form) {
        if let Some(domain) = function.element().and_then(|e| e.domain()) {
            dimensions.push(domain.geometric_dimension());
        }
    }
    let dimensions = unique_tuple(&dimensions);
    match dimensions.as_slice() {
        [dimension] => Ok(*dimension),
        _ => Err(FormError::AmbiguousGeometricDimension(dimensions)),
    }
}

fn extract_functions(form: &Form) -> Vec<Expr> {
    let mut functions = Vec::new();
    for integral in form.integrals() {
        for function in extract_arguments_and_coefficients(integral.integrand()) {
            if !functions.contains(&function) {
                functions.push(function);
            }
        }
    }
    functions
}

/// Verifies every argument and coefficient carries a complete element.
pub fn check_elements(form: &Form) -> Result<(), FormError> {
    for function in extract_functions(form) {
        match function.element() {
            Some(element) if element.is_complete() => {}
            Some(element) => return Err(FormError::IncompleteElement(element.to_string())),
            None => {}
        }
    }
    Ok(())
}

/// Verifies facet-only geometric quantities appear in facet integrals only.
pub fn check_facet_geometry(integral_data: &[IntegralData]) -> Result<(), FormError> {
    for data in integral_data {
        if data.integral_type.is_facet() {
            continue;
        }
        for integral in &data.integrals {
            for code in extract_type_codes(integral.integrand()) {
                let facet_only = with_registry(|r| {
                    r.is_subkind(code, wfl_core::expr::kinds().geometric_facet_quantity)
                });
                if facet_only {
                    let kind = with_registry(|r| r.record(code).name);
                    return Err(FormError::IllegalFacetGeometry {
                        integral_type: data.integral_type,
                        kind: kind.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Splits an integrand into its top-level additive terms.
fn top_level_terms(expr: &Expr) -> Vec<&Expr> {
    match expr.data() {
        ExprData::Sum(a, b) => {
            let mut terms = top_level_terms(a);
            terms.extend(top_level_terms(b));
            terms
        }
        ExprData::Negated(a) => top_level_terms(a),
        _ => vec![expr],
    }
}

/// Verifies every additive term of every integrand involves the same argument tuple, so the
/// form has one well-defined arity.
pub fn check_form_arity(form: &Form) -> Result<(), FormError> {
    let mut tuples: Vec<Vec<usize>> = Vec::new();
    for integral in form.integrals() {
        for term in top_level_terms(integral.integrand()) {
            let mut numbers: Vec<usize> = term
                .post_order_iter()
                .filter_map(Expr::argument_number)
                .collect();
            numbers.sort_unstable();
            numbers.dedup();
            if !tuples.contains(&numbers) {
                tuples.push(numbers);
            }
        }
    }
    if tuples.len() > 1 {
        return Err(FormError::MixedArity(tuples));
    }
    Ok(())
}
