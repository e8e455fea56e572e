//! Form preprocessing.
//!
//! [`compute_form_data`] turns a user-written [`Form`] into the [`FormData`] an assembler
//! consumes. The stages run in a fixed order: determine the geometric dimension, complete
//! partial elements against the rest of the form, expand derivatives, propagate restrictions,
//! drop coefficients that vanished during rewriting, group integrals by measure, rebuild the
//! preprocessed form from the groups, and finally validate what is left. The input form is
//! never modified; `FormData` carries both the original and the preprocessed form plus the
//! replacement maps connecting their functions.

use std::collections::HashMap;

use log::{debug, info};

use wfl_core::element::FiniteElement;
use wfl_core::expr::Expr;
use wfl_core::form::{Form, IntegralType, SubdomainId};

use crate::ad::expand_form_derivatives;
use crate::analysis::{
    build_coefficient_replace_map, extract_elements, extract_sub_elements, unique_tuple,
};
use crate::checks::{
    check_elements, check_facet_geometry, check_form_arity, check_geometric_dimension,
};
use crate::domain_analysis::{
    build_integral_data, reconstruct_form_from_integral_data, IntegralData,
};
use crate::error::FormError;
use crate::restrictions::propagate_restrictions;
use crate::traversal::replace;

/// Everything an assembler needs to know about a preprocessed form.
#[derive(Debug)]
pub struct FormData {
    /// The form as the user wrote it.
    pub original_form: Form,

    /// Number of arguments, i.e. 0 for a functional, 1 for a linear form, 2 for a bilinear form.
    pub rank: usize,

    pub geometric_dimension: usize,

    /// Original elements, mixed sub-elements included, to their completed versions.
    pub element_replace_map: HashMap<FiniteElement, FiniteElement>,

    /// Original arguments and surviving coefficients to their completed, renumbered versions.
    pub function_replace_map: HashMap<Expr, Expr>,

    /// One entry per (integral type, subdomain id) pair, in first-occurrence order. Each
    /// group's `integral_coefficients` are the form's original coefficient nodes, comparable
    /// with `reduced_coefficients`; renaming happens through `function_replace_map`.
    pub integral_data: Vec<IntegralData>,

    /// The coefficients still present after preprocessing, in original count order.
    pub reduced_coefficients: Vec<Expr>,

    pub num_coefficients: usize,

    /// For each reduced coefficient, its position in the original form's coefficient list.
    pub original_coefficient_positions: Vec<usize>,

    /// Completed elements of the arguments, in argument-number order.
    pub argument_elements: Vec<FiniteElement>,

    /// Completed elements of the reduced coefficients, in count order.
    pub coefficient_elements: Vec<FiniteElement>,

    /// Argument elements followed by coefficient elements.
    pub elements: Vec<FiniteElement>,

    pub unique_elements: Vec<FiniteElement>,

    /// Every element followed by its sub-elements, recursively.
    pub sub_elements: Vec<FiniteElement>,

    pub unique_sub_elements: Vec<FiniteElement>,

    /// Highest subdomain count per integral type; `Everywhere` alone counts as zero.
    pub num_sub_domains: HashMap<IntegralType, usize>,

    pub preprocessed_form: Form,
}

/// Picks the degree used to complete elements that were declared without one: the maximum
/// declared degree across the form, floored at one; one if nothing declares a degree.
fn auto_select_degree(elements: &[FiniteElement]) -> usize {
    elements
        .iter()
        .filter_map(FiniteElement::degree)
        .max()
        .unwrap_or(1)
        .max(1)
}

/// Completes every element of the form, sub-elements of mixed elements included, against the
/// form's domain and the auto-selected degree. The form must have exactly one domain only when
/// some element is actually missing its own.
fn compute_element_mapping(
    form: &Form,
) -> Result<HashMap<FiniteElement, FiniteElement>, FormError> {
    let elements = unique_tuple(&extract_sub_elements(&extract_elements(form)));
    let common_degree = auto_select_degree(&elements);

    let common_domain = if elements.iter().any(|e| e.domain().is_none()) {
        let domains = form.domains();
        if domains.len() != 1 {
            return Err(FormError::AmbiguousDomain(domains.len()));
        }
        Some(domains[0].clone())
    } else {
        None
    };

    let mut mapping = HashMap::new();
    for element in elements {
        let completed = element.reconstruct(common_domain.as_ref(), Some(common_degree));
        if let (None, Some(domain)) = (element.domain(), &common_domain) {
            info!("adjusting missing domain of element {element} to {domain}");
        }
        if element.degree().is_none() {
            info!("adjusting missing degree of element {element} to {common_degree}");
        }
        if !completed.is_complete() {
            return Err(FormError::IncompleteElement(completed.to_string()));
        }
        mapping.insert(element, completed);
    }
    Ok(mapping)
}

/// Highest subdomain count per integral type. A subdomain id `k` means at least `k + 1`
/// subdomains exist; `Everywhere` says nothing about markers.
fn compute_num_sub_domains(form: &Form) -> HashMap<IntegralType, usize> {
    let mut num_sub_domains: HashMap<IntegralType, usize> = HashMap::new();
    for integral in form.integrals() {
        let count = match integral.subdomain_id() {
            SubdomainId::Everywhere => 0,
            SubdomainId::Id(id) => id + 1,
        };
        let entry = num_sub_domains.entry(integral.integral_type()).or_insert(0);
        *entry = (*entry).max(count);
    }
    num_sub_domains
}

/// Preprocesses a form for assembly.
pub fn compute_form_data(form: &Form) -> Result<FormData, FormError> {
    let original_form = form.clone();

    let geometric_dimension = check_geometric_dimension(form)?;

    let element_replace_map = compute_element_mapping(form)?;
    debug!("completed {} distinct elements", element_replace_map.len());

    // Rewrite before reducing coefficients: differentiation can erase a coefficient (its only
    // occurrence may sit under a gradient that collapses to zero).
    let expanded = expand_form_derivatives(form);
    let rewritten = propagate_restrictions(&expanded)?;

    let original_coefficients = original_form.coefficients();
    let reduced_coefficients = rewritten.coefficients();
    let original_coefficient_positions = reduced_coefficients
        .iter()
        .map(|c| {
            original_coefficients
                .iter()
                .position(|o| o == c)
                .expect("preprocessing introduced a coefficient absent from the original form")
        })
        .collect();
    if reduced_coefficients.len() < original_coefficients.len() {
        debug!(
            "{} of {} coefficients survive preprocessing",
            reduced_coefficients.len(),
            original_coefficients.len(),
        );
    }

    // Group before renaming so each group's coefficient set stays comparable with the
    // reduced list.
    let integral_data = build_integral_data(&rewritten, &reduced_coefficients);

    let arguments = original_form.arguments();
    let mut function_replace_map =
        build_coefficient_replace_map(&reduced_coefficients, &element_replace_map);
    for argument in &arguments {
        if let (Some(element), Some(number)) = (argument.element(), argument.argument_number()) {
            let completed = element_replace_map.get(element).unwrap_or(element).clone();
            function_replace_map.insert(argument.clone(), Expr::argument(completed, number));
        }
    }

    // The assembler-facing form is rebuilt from the integral groups and carries the completed,
    // renumbered functions.
    let preprocessed_form = Form::new(
        reconstruct_form_from_integral_data(&integral_data)
            .integrals()
            .iter()
            .map(|integral| {
                integral.reconstruct_integrand(replace(
                    integral.integrand(),
                    &function_replace_map,
                ))
            })
            .collect(),
    );

    check_elements(&preprocessed_form)?;
    check_form_arity(&preprocessed_form)?;
    check_facet_geometry(&integral_data)?;

    let argument_elements: Vec<FiniteElement> = arguments
        .iter()
        .filter_map(|a| {
            let element = a.element()?;
            Some(element_replace_map.get(element).unwrap_or(element).clone())
        })
        .collect();
    let coefficient_elements: Vec<FiniteElement> = reduced_coefficients
        .iter()
        .filter_map(|c| {
            let element = c.element()?;
            Some(element_replace_map.get(element).unwrap_or(element).clone())
        })
        .collect();
    let mut elements = argument_elements.clone();
    elements.extend(coefficient_elements.clone());
    let unique_elements = unique_tuple(&elements);
    let sub_elements = extract_sub_elements(&elements);
    let unique_sub_elements = unique_tuple(&sub_elements);

    Ok(FormData {
        rank: arguments.len(),
        geometric_dimension,
        num_coefficients: reduced_coefficients.len(),
        num_sub_domains: compute_num_sub_domains(&preprocessed_form),
        original_form,
        element_replace_map,
        function_replace_map,
        integral_data,
        reduced_coefficients,
        original_coefficient_positions,
        argument_elements,
        coefficient_elements,
        elements,
        unique_elements,
        sub_elements,
        unique_sub_elements,
        preprocessed_form,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wfl_core::form::Integral;
    use wfl_core::geometry::{Cell, Domain};
    use super::*;

    fn triangle() -> Domain {
        Domain::new("mesh", Cell::Triangle)
    }

    fn p1() -> FiniteElement {
        FiniteElement::new("CG", Some(triangle()), Some(1)).unwrap()
    }

    fn cell_integral(integrand: Expr) -> Integral {
        Integral::new(
            integrand,
            triangle(),
            IntegralType::Cell,
            SubdomainId::Everywhere,
        )
    }

    #[test]
    fn poisson_like_form() {
        // a(u, v) = grad(u) . grad(v) dx + f u v ds(1), with f on an incomplete element.
        let v = Expr::argument(p1(), 0);
        let u = Expr::argument(p1(), 1);
        let partial = FiniteElement::new("CG", None, None).unwrap();
        let f = Expr::coefficient(partial.clone());

        let form = Form::new(vec![
            cell_integral(Expr::grad(u.clone()) * Expr::grad(v.clone())),
            Integral::new(
                f * (u * v),
                triangle(),
                IntegralType::ExteriorFacet,
                SubdomainId::Id(1),
            ),
        ]);

        let data = compute_form_data(&form).unwrap();
        assert_eq!(data.rank, 2);
        assert_eq!(data.geometric_dimension, 2);
        assert_eq!(data.num_coefficients, 1);
        assert_eq!(data.original_coefficient_positions, vec![0]);

        // The partial element was completed with the form's domain and max declared degree.
        let completed = &data.element_replace_map[&partial];
        assert!(completed.is_complete());
        assert_eq!(completed.domain(), Some(&triangle()));
        assert_eq!(completed.degree(), Some(1));
        assert_eq!(data.coefficient_elements, vec![completed.clone()]);

        assert_eq!(data.integral_data.len(), 2);
        assert_eq!(data.num_sub_domains[&IntegralType::ExteriorFacet], 2);
        assert_eq!(data.num_sub_domains[&IntegralType::Cell], 0);
    }

    #[test]
    fn coefficient_erased_by_differentiation_is_reduced() {
        let v = Expr::argument(p1(), 0);
        let kept = Expr::coefficient(p1());
        // Declared after `kept`, appears only under a gradient that collapses.
        let erased = Expr::coefficient_with_count(p1(), kept.coefficient_count().unwrap() + 1);

        let form = Form::new(vec![cell_integral(
            kept.clone() * v.clone() + Expr::grad(Expr::scalar(2.0)) * (erased * v),
        )]);

        let data = compute_form_data(&form).unwrap();
        assert_eq!(data.original_form.coefficients().len(), 2);
        assert_eq!(data.reduced_coefficients, vec![kept.clone()]);
        assert_eq!(data.original_coefficient_positions, vec![0]);
        // The surviving coefficient is renumbered to zero.
        assert_eq!(
            data.function_replace_map[&kept].coefficient_count(),
            Some(0),
        );
    }

    #[test]
    fn shared_coefficient_enables_both_groups() {
        let v = Expr::argument(p1(), 0);
        let w = Expr::coefficient(p1());
        let form = Form::new(vec![
            cell_integral(w.clone() * v.clone()),
            Integral::new(
                w * v,
                triangle(),
                IntegralType::ExteriorFacet,
                SubdomainId::Everywhere,
            ),
        ]);

        let data = compute_form_data(&form).unwrap();
        assert_eq!(data.num_coefficients, 1);
        assert_eq!(data.integral_data.len(), 2);
        assert_eq!(data.integral_data[0].enabled_coefficients, vec![true]);
        assert_eq!(data.integral_data[1].enabled_coefficients, vec![true]);
    }

    #[test]
    fn incomplete_element_with_two_meshes_is_ambiguous() {
        // f's element has no domain, and two candidate meshes leave nothing to complete it with.
        let v = Expr::argument(p1(), 0);
        let f = Expr::coefficient(FiniteElement::new("CG", None, Some(1)).unwrap());
        let other = Domain::new("other", Cell::Triangle);
        let form = Form::new(vec![
            cell_integral(f * v.clone()),
            Integral::new(v, other, IntegralType::Cell, SubdomainId::Everywhere),
        ]);
        assert!(matches!(
            compute_form_data(&form),
            Err(FormError::AmbiguousDomain(2)),
        ));
    }

    #[test]
    fn two_meshes_with_complete_elements_preprocess() {
        // With nothing to complete, multiple meshes of one geometric dimension are fine.
        let v = Expr::argument(p1(), 0);
        let other = Domain::new("other", Cell::Triangle);
        let form = Form::new(vec![
            cell_integral(v.clone()),
            Integral::new(v, other, IntegralType::Cell, SubdomainId::Everywhere),
        ]);
        let data = compute_form_data(&form).unwrap();
        assert_eq!(data.rank, 1);
        assert_eq!(data.geometric_dimension, 2);
    }

    #[test]
    fn facet_geometry_in_cell_integral_is_rejected() {
        let v = Expr::argument(p1(), 0);
        let form = Form::new(vec![cell_integral(Expr::facet_area(triangle()) * v)]);
        assert!(matches!(
            compute_form_data(&form),
            Err(FormError::IllegalFacetGeometry { .. }),
        ));
    }

    #[test]
    fn preprocessed_form_is_rebuilt_from_the_groups() {
        let v = Expr::argument(p1(), 0);
        let w = Expr::coefficient(p1());
        // Two integrals over the same measure collapse into a single preprocessed integral.
        let form = Form::new(vec![
            cell_integral(w.clone() * v.clone()),
            cell_integral(v.clone()),
        ]);
        let data = compute_form_data(&form).unwrap();
        assert_eq!(data.integral_data.len(), 1);
        assert_eq!(data.preprocessed_form.integrals().len(), 1);

        let renamed_v = data.function_replace_map[&v].clone();
        let renamed_w = data.function_replace_map[&w].clone();
        assert_eq!(
            *data.preprocessed_form.integrals()[0].integrand(),
            renamed_w * renamed_v.clone() + renamed_v,
        );
    }

    #[test]
    fn group_coefficients_match_the_reduced_list() {
        let v = Expr::argument(p1(), 0);
        let w = Expr::coefficient(p1());
        let form = Form::new(vec![cell_integral(w.clone() * v)]);
        let data = compute_form_data(&form).unwrap();
        assert_eq!(
            data.integral_data[0].integral_coefficients,
            data.reduced_coefficients,
        );
        assert_eq!(data.integral_data[0].integral_coefficients, vec![w]);
    }

    #[test]
    fn mixed_sub_elements_enter_the_element_mapping() {
        let velocity = FiniteElement::new("RT", Some(triangle()), Some(1)).unwrap();
        let pressure = FiniteElement::new("DG", Some(triangle()), Some(0)).unwrap();
        let mixed = FiniteElement::mixed(vec![velocity.clone(), pressure.clone()]);

        let v = Expr::argument(p1(), 0);
        let w = Expr::coefficient(mixed.clone());
        let flux = w.indexed(vec![wfl_core::index::IndexItem::Fixed(0)]).unwrap();
        let form = Form::new(vec![cell_integral(flux * v)]);

        let data = compute_form_data(&form).unwrap();
        assert!(data.element_replace_map.contains_key(&mixed));
        assert_eq!(data.element_replace_map[&velocity], velocity);
        assert_eq!(data.element_replace_map[&pressure], pressure);
    }

    #[test]
    fn preprocessed_form_carries_renumbered_functions() {
        let v = Expr::argument(p1(), 0);
        let w = Expr::coefficient_with_count(p1(), 40);
        let form = Form::new(vec![cell_integral(w * v)]);
        let data = compute_form_data(&form).unwrap();
        let coefficients = data.preprocessed_form.coefficients();
        assert_eq!(coefficients.len(), 1);
        assert_eq!(coefficients[0].coefficient_count(), Some(0));
    }
}
