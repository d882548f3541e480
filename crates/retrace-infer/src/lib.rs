//! Type narrowing for recorded call sites.
//!
//! The instrumenter describes every numeric slot with a single placeholder
//! (`number`) that says nothing about width or integrality. This crate parses
//! the recorded descriptors into structural trees and replaces each
//! placeholder with a concrete kind (`i32`, `i64`, `f32`, `f64`) chosen from
//! the values actually observed at that position across many invocations.
//!
//! # Modules
//!
//! - [`descriptor`] -- TypeDesc parser and canonical printer
//! - [`samples`] -- Numeric leaf extraction from recorded values
//! - [`narrow`] -- NumberKind classification and tree resolution
//! - [`site`] -- Per-call-site aggregation over sample triples
//! - [`shapes`] -- Synthesized names for object-literal shapes
//! - [`error`] -- DescriptorError

pub mod descriptor;
pub mod error;
pub mod narrow;
pub mod samples;
pub mod shapes;
pub mod site;

pub use descriptor::{is_identifier, parse_descriptor, Property, TypeDesc, NUMBER_PLACEHOLDER};
pub use error::DescriptorError;
pub use narrow::{classify, narrow_descriptor, resolve, NumberKind};
pub use samples::collect_numbers;
pub use shapes::ShapeRegistry;
pub use site::{narrow_call_site, NarrowedSignature};
