#![allow(dead_code)]

use flatehr_core::schema::parse_definition_yaml;
use flatehr_core::{
    ConversionContext, Converter, ConverterConfig, DefinitionDirectory, FlatComposition,
    SchemaCache, SchemaSource,
};
use flatehr_types::Scalar;
use std::path::PathBuf;
use std::sync::Arc;

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Converter over the fixture directory, with `template_id` compiled into its cache.
pub fn converter(template_id: &str) -> (Converter, SchemaSource) {
    let text = std::fs::read_to_string(fixtures_dir().join(format!("{template_id}.yaml")))
        .expect("fixture should be readable");
    let tree = parse_definition_yaml(&text).expect("fixture should parse");
    let cache = Arc::new(SchemaCache::new());
    let source = SchemaSource::Compiled(cache.insert(tree));
    let converter = Converter::new(
        Arc::new(ConverterConfig::default()),
        cache,
        Arc::new(DefinitionDirectory::new(fixtures_dir())),
    );
    (converter, source)
}

pub fn flat(entries: &[(&str, Scalar)]) -> FlatComposition {
    entries
        .iter()
        .map(|(path, value)| (path.to_string(), value.clone()))
        .collect()
}

pub fn context() -> ConversionContext {
    ConversionContext::new()
}
