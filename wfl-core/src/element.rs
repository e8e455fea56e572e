//! Finite element descriptions.
//!
//! A [`FiniteElement`] describes the function space an argument or coefficient lives in: family,
//! domain, polynomial degree, value shape. The mathematical definitions of the families are an
//! external concern; this module only resolves family names against a small canonical table
//! ([`canonical_element_description`]) and tracks which parts of a description are still missing.
//! Elements are immutable: completing a partial element goes through [`FiniteElement::reconstruct`],
//! which returns a new value. Completed elements are compared and hashed by value.

use std::fmt;
use thiserror::Error;

use crate::geometry::{Cell, Domain};

/// The finite element families known to the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementFamily {
    Lagrange,
    DiscontinuousLagrange,
    RaviartThomas,
    NedelecFirstKind,
    /// A product of sub-elements; has no entry in the resolver table.
    Mixed,
}

impl ElementFamily {
    pub fn name(self) -> &'static str {
        match self {
            Self::Lagrange => "Lagrange",
            Self::DiscontinuousLagrange => "Discontinuous Lagrange",
            Self::RaviartThomas => "Raviart-Thomas",
            Self::NedelecFirstKind => "Nedelec 1st kind H(curl)",
            Self::Mixed => "Mixed",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Self::Lagrange => "CG",
            Self::DiscontinuousLagrange => "DG",
            Self::RaviartThomas => "RT",
            Self::NedelecFirstKind => "N1curl",
            Self::Mixed => "Mixed",
        }
    }

    /// Returns true if elements of this family are vector valued on their cell.
    fn is_vector_valued(self) -> bool {
        matches!(self, Self::RaviartThomas | Self::NedelecFirstKind)
    }
}

/// The Sobolev space the family's shape functions conform to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SobolevSpace {
    H1,
    L2,
    HDiv,
    HCurl,
}

/// How reference values map to physical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mapping {
    Identity,
    ContravariantPiola,
    CovariantPiola,
}

/// The family/cell combination is not in the resolver table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown finite element family `{family}` on cell `{cell}`")]
pub struct UnknownFamilyError {
    pub family: String,
    pub cell: String,
}

/// The canonical description of a simple (non-mixed) element, as produced by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDescription {
    pub family: ElementFamily,
    pub short_name: &'static str,
    pub degree: Option<usize>,
    pub value_shape: Vec<usize>,
    pub reference_value_shape: Vec<usize>,
    pub sobolev_space: SobolevSpace,
    pub mapping: Mapping,
}

fn value_shape_for(family: ElementFamily, cell: Option<Cell>) -> Vec<usize> {
    match cell {
        Some(cell) if family.is_vector_valued() => vec![cell.geometric_dimension()],
        _ => Vec::new(),
    }
}

/// Resolves a family name against the canonical table.
///
/// Accepts both long and short family names. `degree` and `form_degree` pass through unchanged;
/// a missing degree stays missing and is filled in later by element mapping. Vector-valued
/// families require a simplex cell; unrecognized combinations fail with [`UnknownFamilyError`].
pub fn canonical_element_description(
    family: &str,
    cell: Option<Cell>,
    degree: Option<usize>,
    _form_degree: Option<usize>,
) -> Result<ElementDescription, UnknownFamilyError> {
    let unknown = || UnknownFamilyError {
        family: family.to_string(),
        cell: cell.map_or_else(|| "undefined".to_string(), |c| c.to_string()),
    };

    let (resolved, sobolev_space, mapping) = match family {
        "Lagrange" | "CG" | "P" => (ElementFamily::Lagrange, SobolevSpace::H1, Mapping::Identity),
        "Discontinuous Lagrange" | "DG" => (
            ElementFamily::DiscontinuousLagrange,
            SobolevSpace::L2,
            Mapping::Identity,
        ),
        "Raviart-Thomas" | "RT" => (
            ElementFamily::RaviartThomas,
            SobolevSpace::HDiv,
            Mapping::ContravariantPiola,
        ),
        "Nedelec 1st kind H(curl)" | "N1curl" => (
            ElementFamily::NedelecFirstKind,
            SobolevSpace::HCurl,
            Mapping::CovariantPiola,
        ),
        _ => return Err(unknown()),
    };

    if resolved.is_vector_valued() {
        match cell {
            Some(cell) if cell.is_simplex() && cell.topological_dimension() >= 2 => {}
            _ => return Err(unknown()),
        }
    }

    let value_shape = value_shape_for(resolved, cell);
    Ok(ElementDescription {
        family: resolved,
        short_name: resolved.short_name(),
        degree,
        value_shape: value_shape.clone(),
        reference_value_shape: value_shape,
        sobolev_space,
        mapping,
    })
}

/// Description of a finite-dimensional function space attached to arguments and coefficients.
///
/// Domain and degree are optional on construction; an element with both present is *complete*.
/// Equality and hashing are by value, so a completed element can key replacement maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiniteElement {
    family: ElementFamily,
    domain: Option<Domain>,
    degree: Option<usize>,
    value_shape: Vec<usize>,
    sub_elements: Vec<FiniteElement>,
}

impl FiniteElement {
    /// Creates a simple element, resolving the family name against the canonical table.
    pub fn new(
        family: &str,
        domain: Option<Domain>,
        degree: Option<usize>,
    ) -> Result<Self, UnknownFamilyError> {
        let cell = domain.as_ref().map(|d| d.cell());
        let description = canonical_element_description(family, cell, degree, None)?;
        Ok(Self {
            family: description.family,
            domain,
            degree: description.degree,
            value_shape: description.value_shape,
            sub_elements: Vec::new(),
        })
    }

    /// Creates a mixed element from sub-elements. The domain is the common sub-element domain
    /// when all agree, the degree the maximum declared sub-element degree.
    pub fn mixed(sub_elements: Vec<FiniteElement>) -> Self {
        let domain = match sub_elements.first() {
            Some(first) if sub_elements.iter().all(|e| e.domain == first.domain) => {
                first.domain.clone()
            }
            _ => None,
        };
        let degree = sub_elements.iter().filter_map(|e| e.degree).max();
        let components: usize = sub_elements
            .iter()
            .map(|e| e.value_shape.iter().product::<usize>().max(1))
            .sum();
        Self {
            family: ElementFamily::Mixed,
            domain,
            degree,
            value_shape: vec![components],
            sub_elements,
        }
    }

    pub fn family(&self) -> ElementFamily {
        self.family
    }

    pub fn domain(&self) -> Option<&Domain> {
        self.domain.as_ref()
    }

    pub fn degree(&self) -> Option<usize> {
        self.degree
    }

    pub fn value_shape(&self) -> &[usize] {
        &self.value_shape
    }

    pub fn sub_elements(&self) -> &[FiniteElement] {
        &self.sub_elements
    }

    pub fn is_mixed(&self) -> bool {
        self.family == ElementFamily::Mixed
    }

    /// Returns true if nothing is missing from the description.
    pub fn is_complete(&self) -> bool {
        self.domain.is_some()
            && self.degree.is_some()
            && self.sub_elements.iter().all(FiniteElement::is_complete)
    }

    /// Returns a copy with missing domain and degree filled in from the given values. Present
    /// fields keep their value; for mixed elements the substitution recurses into sub-elements.
    /// The value shape is recomputed in case the new domain changes it.
    pub fn reconstruct(&self, domain: Option<&Domain>, degree: Option<usize>) -> FiniteElement {
        let new_domain = self.domain.clone().or_else(|| domain.cloned());
        let new_degree = self.degree.or(degree);
        if self.is_mixed() {
            let sub_elements = self
                .sub_elements
                .iter()
                .map(|e| e.reconstruct(domain, degree))
                .collect();
            let mut rebuilt = Self::mixed(sub_elements);
            rebuilt.domain = rebuilt.domain.or(new_domain);
            return rebuilt;
        }
        let cell = new_domain.as_ref().map(|d| d.cell());
        Self {
            family: self.family,
            value_shape: value_shape_for(self.family, cell),
            domain: new_domain,
            degree: new_degree,
            sub_elements: Vec::new(),
        }
    }
}

impl fmt::Display for FiniteElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let degree = self
            .degree
            .map_or_else(|| "?".to_string(), |d| d.to_string());
        match &self.domain {
            Some(domain) => write!(
                f,
                "<{}{} on a {}>",
                self.family.short_name(),
                degree,
                domain.cell(),
            ),
            None => write!(f, "<{}{} on an undefined domain>", self.family.short_name(), degree),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use super::*;

    fn triangle() -> Domain {
        Domain::new("mesh", Cell::Triangle)
    }

    #[test]
    fn resolves_short_and_long_names() {
        let cg = canonical_element_description("CG", Some(Cell::Triangle), Some(1), None).unwrap();
        let lagrange =
            canonical_element_description("Lagrange", Some(Cell::Triangle), Some(1), None).unwrap();
        assert_eq!(cg.family, lagrange.family);
        assert_eq!(cg.sobolev_space, SobolevSpace::H1);
        assert_eq!(cg.value_shape, Vec::<usize>::new());
    }

    #[test]
    fn vector_families_get_vector_value_shape() {
        let rt = canonical_element_description("RT", Some(Cell::Triangle), Some(1), None).unwrap();
        assert_eq!(rt.value_shape, vec![2]);
        assert_eq!(rt.mapping, Mapping::ContravariantPiola);
    }

    #[test]
    fn unknown_family_fails() {
        let err = canonical_element_description("Bogus", Some(Cell::Triangle), Some(1), None)
            .unwrap_err();
        assert_eq!(err.family, "Bogus");
    }

    #[test]
    fn vector_family_on_non_simplex_fails() {
        assert!(canonical_element_description("RT", Some(Cell::Quadrilateral), Some(1), None)
            .is_err());
        assert!(canonical_element_description("N1curl", None, Some(1), None).is_err());
    }

    #[test]
    fn reconstruct_fills_missing_fields_only() {
        let partial = FiniteElement::new("CG", None, None).unwrap();
        assert!(!partial.is_complete());

        let completed = partial.reconstruct(Some(&triangle()), Some(2));
        assert!(completed.is_complete());
        assert_eq!(completed.degree(), Some(2));

        // A present degree survives reconstruction with a different value.
        let fixed_degree = FiniteElement::new("CG", None, Some(3)).unwrap();
        let completed = fixed_degree.reconstruct(Some(&triangle()), Some(1));
        assert_eq!(completed.degree(), Some(3));
    }

    #[test]
    fn mixed_element_takes_common_domain_and_max_degree() {
        let velocity = FiniteElement::new("RT", Some(triangle()), Some(2)).unwrap();
        let pressure = FiniteElement::new("DG", Some(triangle()), Some(1)).unwrap();
        let taylor_hood = FiniteElement::mixed(vec![velocity, pressure]);
        assert_eq!(taylor_hood.domain(), Some(&triangle()));
        assert_eq!(taylor_hood.degree(), Some(2));
        assert_eq!(taylor_hood.value_shape(), &[3]);
        assert!(taylor_hood.is_mixed());
    }

    #[test]
    fn complete_elements_are_equal_by_value() {
        let a = FiniteElement::new("CG", Some(triangle()), Some(1)).unwrap();
        let b = FiniteElement::new("CG", Some(triangle()), Some(1)).unwrap();
        assert_eq!(a, b);
    }
}
