//! Grouping of integrals for assembly.
//!
//! Assembly wants one work item per (integral type, subdomain id) pair, not one per integral as
//! written: a form may mention the same measure several times and the integrands then simply
//! add. [`build_integral_data`] performs that grouping, sums the integrands of each group, and
//! records which of the form's coefficients each group actually uses so assemblers can skip
//! gathering the rest.

use wfl_core::expr::Expr;
use wfl_core::form::{Form, Integral, IntegralType, SubdomainId};

use crate::traversal::extract_coefficients;

/// One assembly work item: all integrals sharing a measure, merged.
#[derive(Debug, Clone)]
pub struct IntegralData {
    pub integral_type: IntegralType,
    pub subdomain_id: SubdomainId,

    /// The merged integral carrying the summed integrand.
    pub integrals: Vec<Integral>,

    /// The coefficients appearing in this group, sorted by count.
    pub integral_coefficients: Vec<Expr>,

    /// For each coefficient of the whole form (in reduced order), whether this group uses it.
    pub enabled_coefficients: Vec<bool>,
}

/// Groups the form's integrals by (integral type, subdomain id) in first-occurrence order,
/// summing integrands within each group. `form_coefficients` is the form's full coefficient
/// list, used to compute the per-group enabled mask.
pub fn build_integral_data(form: &Form, form_coefficients: &[Expr]) -> Vec<IntegralData> {
    let mut groups: Vec<((IntegralType, SubdomainId), Vec<&Integral>)> = Vec::new();
    for integral in form.integrals() {
        let key = (integral.integral_type(), integral.subdomain_id());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(integral),
            None => groups.push((key, vec![integral])),
        }
    }

    groups
        .into_iter()
        .map(|((integral_type, subdomain_id), members)| {
            let mut summed = members[0].integrand().clone();
            for member in &members[1..] {
                summed = summed + member.integrand().clone();
            }
            let merged = members[0].reconstruct_integrand(summed);

            let integral_coefficients = extract_coefficients(merged.integrand());
            let enabled_coefficients = form_coefficients
                .iter()
                .map(|c| integral_coefficients.contains(c))
                .collect();

            IntegralData {
                integral_type,
                subdomain_id,
                integrals: vec![merged],
                integral_coefficients,
                enabled_coefficients,
            }
        })
        .collect()
}

/// Rebuilds a form from grouped integral data, preserving group order.
pub fn reconstruct_form_from_integral_data(integral_data: &[IntegralData]) -> Form {
    let integrals = integral_data
        .iter()
        .flat_map(|data| data.integrals.iter().cloned())
        .collect();
    Form::new(integrals)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wfl_core::element::FiniteElement;
    use wfl_core::geometry::{Cell, Domain};
    use super::*;

    fn triangle() -> Domain {
        Domain::new("mesh", Cell::Triangle)
    }

    fn p1() -> FiniteElement {
        FiniteElement::new("CG", Some(triangle()), Some(1)).unwrap()
    }

    #[test]
    fn integrals_with_equal_measures_merge() {
        let v = Expr::argument(p1(), 0);
        let w = Expr::coefficient(p1());
        let form = Form::new(vec![
            Integral::new(v.clone(), triangle(), IntegralType::Cell, SubdomainId::Everywhere),
            Integral::new(
                w.clone() * v.clone(),
                triangle(),
                IntegralType::Cell,
                SubdomainId::Everywhere,
            ),
            Integral::new(v.clone(), triangle(), IntegralType::Cell, SubdomainId::Id(1)),
        ]);

        let data = build_integral_data(&form, &[w.clone()]);
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].integrals.len(), 1);
        assert_eq!(
            *data[0].integrals[0].integrand(),
            v.clone() + w.clone() * v.clone(),
        );
        assert_eq!(data[0].enabled_coefficients, vec![true]);
        assert_eq!(data[1].subdomain_id, SubdomainId::Id(1));
        assert_eq!(data[1].enabled_coefficients, vec![false]);
    }

    #[test]
    fn groups_keep_first_occurrence_order() {
        let v = Expr::argument(p1(), 0);
        let form = Form::new(vec![
            Integral::new(v.clone(), triangle(), IntegralType::ExteriorFacet, SubdomainId::Id(3)),
            Integral::new(v.clone(), triangle(), IntegralType::Cell, SubdomainId::Everywhere),
            Integral::new(v.clone(), triangle(), IntegralType::ExteriorFacet, SubdomainId::Id(3)),
        ]);
        let data = build_integral_data(&form, &[]);
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].integral_type, IntegralType::ExteriorFacet);
        assert_eq!(data[1].integral_type, IntegralType::Cell);

        let rebuilt = reconstruct_form_from_integral_data(&data);
        assert_eq!(rebuilt.integrals().len(), 2);
    }

    #[test]
    fn grouping_round_trips_integrand_sums() {
        let v = Expr::argument(p1(), 0);
        let w = Expr::coefficient(p1());
        let form = Form::new(vec![
            Integral::new(v.clone(), triangle(), IntegralType::Cell, SubdomainId::Everywhere),
            Integral::new(
                w.clone() * v.clone(),
                triangle(),
                IntegralType::Cell,
                SubdomainId::Everywhere,
            ),
            Integral::new(
                v.clone(),
                triangle(),
                IntegralType::ExteriorFacet,
                SubdomainId::Everywhere,
            ),
        ]);

        // One integral per group, each carrying the sum of its members' integrands.
        let rebuilt = reconstruct_form_from_integral_data(&build_integral_data(&form, &[]));
        assert_eq!(rebuilt.integrals().len(), 2);
        assert_eq!(*rebuilt.integrals()[0].integrand(), v.clone() + w * v.clone());
        assert_eq!(*rebuilt.integrals()[1].integrand(), v);

        // Grouping an already grouped form changes nothing.
        let again = reconstruct_form_from_integral_data(&build_integral_data(&rebuilt, &[]));
        assert_eq!(again, rebuilt);
    }
}
