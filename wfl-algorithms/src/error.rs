//! Errors raised while analyzing a form.

use thiserror::Error;

use wfl_core::form::IntegralType;

/// A form that cannot be preprocessed. Each variant names the analysis stage that rejected it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    /// More than one integration domain was found where exactly one was needed.
    #[error("found {0} domains, cannot infer a unique domain for the form")]
    AmbiguousDomain(usize),

    /// The form's domains disagree on the geometric dimension.
    #[error("inconsistent geometric dimensions across the form: {0:?}")]
    AmbiguousGeometricDimension(Vec<usize>),

    /// An argument or coefficient element is still missing its domain after element mapping.
    #[error("element `{0}` is missing its domain after completion")]
    IncompleteElement(String),

    /// A facet-only geometric quantity was used in a non-facet integral.
    #[error("`{kind}` is only defined on facets, but appears in a {integral_type} integral")]
    IllegalFacetGeometry {
        integral_type: IntegralType,
        kind: String,
    },

    /// The top-level terms of an integrand do not all involve the same arguments.
    #[error("form terms have differing argument tuples: {0:?}")]
    MixedArity(Vec<Vec<usize>>),

    /// A quantity was restricted to both sides of an interior facet at once.
    #[error("contradictory restriction of `{0}`")]
    ContradictoryRestriction(String),

    /// A terminal in an interior facet integral was never restricted to a side.
    #[error("discontinuous quantity `{0}` must be restricted in an interior facet integral")]
    MissingRestriction(String),
}
