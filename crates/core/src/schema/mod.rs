//! Compiled template trees, their loader and cache.

mod cache;
mod definition;
mod node;

pub use cache::{CacheStats, SchemaCache};
pub use definition::{parse_definition_json, parse_definition_yaml, DefinitionDirectory};
pub use node::{
    parse_rm_path, CodedOption, RmStep, SchemaNode, SchemaTree, UnitConstraint, ValueConstraint,
};

pub(crate) use node::split_steps;

use crate::ConversionResult;

/// Compiles a template into the schema tree the converter walks.
///
/// Implementations must be safe to call concurrently; the cache may ask for the same template
/// from several threads at once.
pub trait TemplateCompiler: Send + Sync {
    fn compile(&self, template_id: &str, default_language: &str) -> ConversionResult<SchemaTree>;
}
