//! Cells and integration domains.
//!
//! A [`Domain`] is the mesh-level description an [`Integral`](crate::form::Integral) is taken
//! over: a reference cell plus the geometric dimension of the space the mesh is embedded in. The
//! pipeline never looks at actual mesh data; it only compares domains by value and reads their
//! geometric dimension.

use std::fmt;

/// The reference cell a finite element or integration domain is defined on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cell {
    Interval,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
}

impl Cell {
    /// The canonical lowercase name of the cell.
    pub fn cellname(self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Triangle => "triangle",
            Self::Quadrilateral => "quadrilateral",
            Self::Tetrahedron => "tetrahedron",
            Self::Hexahedron => "hexahedron",
        }
    }

    /// The dimension of the cell itself.
    pub fn topological_dimension(self) -> usize {
        match self {
            Self::Interval => 1,
            Self::Triangle | Self::Quadrilateral => 2,
            Self::Tetrahedron | Self::Hexahedron => 3,
        }
    }

    /// The dimension of the space the cell is embedded in, which equals the topological
    /// dimension unless overridden on the [`Domain`].
    pub fn geometric_dimension(self) -> usize {
        self.topological_dimension()
    }

    /// Returns true if the cell is a simplex.
    pub fn is_simplex(self) -> bool {
        matches!(self, Self::Interval | Self::Triangle | Self::Tetrahedron)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cellname())
    }
}

/// A geometric integration domain: a labeled mesh abstraction with a reference cell.
///
/// Two domains compare equal when their label, cell and geometric dimension all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain {
    label: String,
    cell: Cell,
    geometric_dimension: usize,
}

impl Domain {
    /// Creates a domain whose geometric dimension is the cell's own dimension.
    pub fn new(label: impl Into<String>, cell: Cell) -> Self {
        Self {
            label: label.into(),
            cell,
            geometric_dimension: cell.geometric_dimension(),
        }
    }

    /// Creates a domain embedded in a higher-dimensional space, e.g. a triangle mesh in 3D.
    pub fn with_geometric_dimension(
        label: impl Into<String>,
        cell: Cell,
        geometric_dimension: usize,
    ) -> Self {
        Self {
            label: label.into(),
            cell,
            geometric_dimension,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cell(&self) -> Cell {
        self.cell
    }

    pub fn geometric_dimension(&self) -> usize {
        self.geometric_dimension
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} mesh `{}`>", self.cell, self.label)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use super::*;

    #[test]
    fn cell_dimensions() {
        assert_eq!(Cell::Interval.topological_dimension(), 1);
        assert_eq!(Cell::Triangle.topological_dimension(), 2);
        assert_eq!(Cell::Hexahedron.topological_dimension(), 3);
        assert!(Cell::Tetrahedron.is_simplex());
        assert!(!Cell::Quadrilateral.is_simplex());
    }

    #[test]
    fn embedded_domain() {
        let surface = Domain::with_geometric_dimension("surface", Cell::Triangle, 3);
        assert_eq!(surface.cell().topological_dimension(), 2);
        assert_eq!(surface.geometric_dimension(), 3);
    }

    #[test]
    fn domain_equality_is_by_value() {
        let a = Domain::new("mesh", Cell::Triangle);
        let b = Domain::new("mesh", Cell::Triangle);
        let c = Domain::new("other", Cell::Triangle);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
