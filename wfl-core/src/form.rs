//! Integrals and forms.
//!
//! A [`Form`] is a sum of [`Integral`]s, each pairing a scalar integrand expression with a
//! measure: the [`IntegralType`] (cell, facet, ...), the [`Domain`] integrated over, and the
//! [`SubdomainId`] selecting which marked part of it. Forms are immutable like expressions;
//! adding two forms concatenates their integral lists without touching the integrands.

use std::fmt;

use crate::expr::Expr;
use crate::geometry::Domain;

/// Where on the mesh an integral is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntegralType {
    /// Over cell interiors, `dx`.
    Cell,
    /// Over boundary facets, `ds`.
    ExteriorFacet,
    /// Over facets shared by two cells, `dS`.
    InteriorFacet,
    /// At discrete points, `dP`.
    Point,
    /// Over a caller-supplied quadrature rule, `dQ`.
    Quadrature,
}

impl IntegralType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Cell => "cell",
            Self::ExteriorFacet => "exterior_facet",
            Self::InteriorFacet => "interior_facet",
            Self::Point => "point",
            Self::Quadrature => "quadrature",
        }
    }

    pub fn is_facet(self) -> bool {
        matches!(self, Self::ExteriorFacet | Self::InteriorFacet)
    }
}

impl fmt::Display for IntegralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which marked part of the domain an integral covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubdomainId {
    /// The whole domain, including unmarked parts.
    Everywhere,
    /// The part carrying this marker value.
    Id(usize),
}

impl fmt::Display for SubdomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Everywhere => write!(f, "everywhere"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// One integral: a scalar integrand paired with its measure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Integral {
    integrand: Expr,
    domain: Domain,
    integral_type: IntegralType,
    subdomain_id: SubdomainId,
}

impl Integral {
    pub fn new(
        integrand: Expr,
        domain: Domain,
        integral_type: IntegralType,
        subdomain_id: SubdomainId,
    ) -> Self {
        Self {
            integrand,
            domain,
            integral_type,
            subdomain_id,
        }
    }

    pub fn integrand(&self) -> &Expr {
        &self.integrand
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn integral_type(&self) -> IntegralType {
        self.integral_type
    }

    pub fn subdomain_id(&self) -> SubdomainId {
        self.subdomain_id
    }

    /// A copy with a new integrand under the same measure.
    pub fn reconstruct_integrand(&self, integrand: Expr) -> Integral {
        Integral {
            integrand,
            ..self.clone()
        }
    }
}

impl fmt::Display for Integral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ {} }} * d{}({}[{}])",
            self.integrand, self.integral_type, self.domain, self.subdomain_id,
        )
    }
}

/// A sum of integrals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    integrals: Vec<Integral>,
}

impl Form {
    pub fn new(integrals: Vec<Integral>) -> Self {
        Self { integrals }
    }

    pub fn integrals(&self) -> &[Integral] {
        &self.integrals
    }

    pub fn is_empty(&self) -> bool {
        self.integrals.is_empty()
    }

    /// The distinct domains integrated over, in first-occurrence order.
    pub fn domains(&self) -> Vec<&Domain> {
        let mut domains: Vec<&Domain> = Vec::new();
        for integral in &self.integrals {
            if !domains.contains(&integral.domain()) {
                domains.push(integral.domain());
            }
        }
        domains
    }

    /// The distinct arguments appearing in any integrand, sorted by argument number.
    pub fn arguments(&self) -> Vec<Expr> {
        let mut arguments: Vec<Expr> = Vec::new();
        for integral in &self.integrals {
            for node in integral.integrand().post_order_iter() {
                if node.argument_number().is_some() && !arguments.contains(node) {
                    arguments.push(node.clone());
                }
            }
        }
        arguments.sort_by_key(|a| a.argument_number());
        arguments
    }

    /// The distinct coefficients appearing in any integrand, sorted by count.
    pub fn coefficients(&self) -> Vec<Expr> {
        let mut coefficients: Vec<Expr> = Vec::new();
        for integral in &self.integrals {
            for node in integral.integrand().post_order_iter() {
                if node.coefficient_count().is_some() && !coefficients.contains(node) {
                    coefficients.push(node.clone());
                }
            }
        }
        coefficients.sort_by_key(|c| c.coefficient_count());
        coefficients
    }
}

impl std::ops::Add for Form {
    type Output = Form;

    fn add(mut self, rhs: Form) -> Form {
        self.integrals.extend(rhs.integrals);
        self
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.integrals.iter();
        if let Some(integral) = iter.next() {
            write!(f, "{integral}")?;
            for integral in iter {
                write!(f, "\n  + {integral}")?;
            }
        }
        Ok(())
    }
}
