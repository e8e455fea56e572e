//! Analysis and lowering passes for the weak form language.
//!
//! The entry point is [`formdata::compute_form_data`], which takes a form built from the
//! `wfl-core` types and produces the [`formdata::FormData`] an assembler consumes: completed
//! elements, rewritten integrands, integrals grouped by measure, and the surviving coefficients
//! renumbered contiguously. The individual passes are public and usable on their own.

pub mod ad;
pub mod analysis;
pub mod checks;
pub mod domain_analysis;
pub mod error;
pub mod formdata;
pub mod restrictions;
pub mod traversal;

pub use error::FormError;
pub use formdata::{compute_form_data, FormData};
