//! The data model of the weak form language: expression trees, symbolic indices, finite element
//! descriptions, geometric domains, and forms.
//!
//! This crate defines what a variational form *is*; the analysis and lowering passes that turn a
//! form into assembly-ready data live in the `wfl-algorithms` crate. Everything here is
//! immutable after construction, compared by value, and safe to share between forms.
//!
//! The central type is [`Expr`](expr::Expr), a handle to a node in a shared expression DAG.
//! Node kinds are catalogued in the [`registry`], which assigns each kind a dense typecode and
//! resolves its traits (terminal-ness, arity, scalar-ness) at registration time, so generic
//! passes can dispatch on typecodes without matching concrete kinds.

pub mod element;
pub mod expr;
pub mod form;
pub mod geometry;
pub mod index;
pub mod registry;

pub use element::FiniteElement;
pub use expr::{Expr, ExprData, Side};
pub use form::{Form, Integral, IntegralType, SubdomainId};
pub use geometry::{Cell, Domain};
pub use index::{Index, IndexItem, MultiIndex};
pub use registry::TypeCode;
