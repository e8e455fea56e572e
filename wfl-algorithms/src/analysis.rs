//! Element extraction and renumbering helpers.

use std::collections::HashMap;

use wfl_core::element::FiniteElement;
use wfl_core::expr::Expr;
use wfl_core::form::Form;

/// Deduplicates while keeping first-occurrence order.
pub fn unique_tuple<T: PartialEq + Clone>(items: &[T]) -> Vec<T> {
    let mut unique: Vec<T> = Vec::new();
    for item in items {
        if !unique.contains(item) {
            unique.push(item.clone());
        }
    }
    unique
}

fn elements_of(functions: &[Expr]) -> Vec<FiniteElement> {
    functions
        .iter()
        .filter_map(|f| f.element().cloned())
        .collect()
}

/// The elements of the form's arguments, in argument-number order.
pub fn extract_argument_elements(form: &Form) -> Vec<FiniteElement> {
    elements_of(&form.arguments())
}

/// The elements of the form's coefficients, in count order.
pub fn extract_coefficient_elements(form: &Form) -> Vec<FiniteElement> {
    elements_of(&form.coefficients())
}

/// All elements of the form: argument elements first, then coefficient elements.
pub fn extract_elements(form: &Form) -> Vec<FiniteElement> {
    let mut elements = extract_argument_elements(form);
    elements.extend(extract_coefficient_elements(form));
    elements
}

/// Each element followed by its sub-elements, recursively.
pub fn extract_sub_elements(elements: &[FiniteElement]) -> Vec<FiniteElement> {
    let mut all = Vec::new();
    for element in elements {
        all.push(element.clone());
        all.extend(extract_sub_elements(element.sub_elements()));
    }
    all
}

/// Maps each coefficient to a copy with a contiguous count `0..n` and its completed element.
/// `coefficients` must be sorted by original count; the new counts follow that order.
pub fn build_coefficient_replace_map(
    coefficients: &[Expr],
    element_replace_map: &HashMap<FiniteElement, FiniteElement>,
) -> HashMap<Expr, Expr> {
    let mut map = HashMap::new();
    for (new_count, coefficient) in coefficients.iter().enumerate() {
        let element = coefficient
            .element()
            .map(|e| element_replace_map.get(e).unwrap_or(e).clone());
        if let Some(element) = element {
            map.insert(
                coefficient.clone(),
                Expr::coefficient_with_count(element, new_count),
            );
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wfl_core::form::{Integral, IntegralType, SubdomainId};
    use wfl_core::geometry::{Cell, Domain};
    use super::*;

    fn triangle() -> Domain {
        Domain::new("mesh", Cell::Triangle)
    }

    fn p1() -> FiniteElement {
        FiniteElement::new("CG", Some(triangle()), Some(1)).unwrap()
    }

    fn cell_form(integrand: Expr) -> Form {
        Form::new(vec![Integral::new(
            integrand,
            triangle(),
            IntegralType::Cell,
            SubdomainId::Everywhere,
        )])
    }

    #[test]
    fn unique_tuple_keeps_order() {
        assert_eq!(unique_tuple(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }

    #[test]
    fn elements_come_arguments_first() {
        let rt = FiniteElement::new("RT", Some(triangle()), Some(1)).unwrap();
        let v = Expr::argument(p1(), 0);
        let sigma = Expr::coefficient(rt.clone());
        let form = cell_form(Expr::grad(v.clone()) * sigma);
        assert_eq!(extract_elements(&form), vec![p1(), rt]);
    }

    #[test]
    fn sub_elements_follow_their_parent() {
        let rt = FiniteElement::new("RT", Some(triangle()), Some(1)).unwrap();
        let dg = FiniteElement::new("DG", Some(triangle()), Some(0)).unwrap();
        let mixed = FiniteElement::mixed(vec![rt.clone(), dg.clone()]);
        let subs = extract_sub_elements(&[mixed.clone()]);
        assert_eq!(subs, vec![mixed, rt, dg]);
    }

    #[test]
    fn coefficient_counts_are_renumbered_contiguously() {
        let w5 = Expr::coefficient_with_count(p1(), 105);
        let w9 = Expr::coefficient_with_count(p1(), 109);
        let map = build_coefficient_replace_map(&[w5.clone(), w9.clone()], &HashMap::new());
        assert_eq!(map[&w5].coefficient_count(), Some(0));
        assert_eq!(map[&w9].coefficient_count(), Some(1));
    }
}
