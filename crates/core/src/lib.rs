//! # flatehr core
//!
//! Conversion engine for openEHR compositions.
//!
//! One clinical document has three equivalent forms under one template:
//! - **flat**: an ordered map from paths such as
//!   `vitals/body_temperature:0/any_event:0/temperature|magnitude` to literals
//! - **structured**: nested JSON grouped by node id, with `|attribute` keys
//! - **raw**: the canonical RM tree, as typed [`openehr::Composition`] values
//!
//! [`Converter`] is the entry point. It builds raw compositions from flat or structured input
//! (walking the compiled [`SchemaTree`] of the template) and extracts flat or structured output
//! from raw ones. Template compilation and structural validation are collaborators behind the
//! [`TemplateCompiler`] and [`StructuralValidator`] traits.
//!
//! **No transport concerns**: HTTP, CLI and persistence layers belong to the callers.

pub mod codec;
pub mod config;
pub mod constants;
pub mod context;
pub mod convert;
pub mod error;
pub mod fragment;
pub mod locale;
pub mod path;
pub mod payload;
pub mod schema;
pub mod terminology;
pub mod validation;

mod annotate;
mod build;
mod extract;
mod link;
mod meta;

pub use config::{zone_offset_from_value, ConverterConfig};
pub use context::{ContextKey, ConversionContext};
pub use convert::{Converter, SchemaSource};
pub use error::{ConversionError, ConversionResult, ErrorKind};
pub use locale::{LocaleConverter, StandardLocale};
pub use path::PathAddress;
pub use payload::{FlatComposition, Payload};
pub use schema::{
    CacheStats, DefinitionDirectory, SchemaCache, SchemaNode, SchemaTree, TemplateCompiler,
};
pub use validation::{StructuralValidator, ValidationIssue};
