//! Conversion facade.
//!
//! [`Converter`] ties the pieces together: it fetches the schema tree (from the caller or the
//! injected [`SchemaCache`]), decodes the payload once, resolves the call defaults and runs the
//! builder or the extractor. Every operation either returns a complete document or the first
//! error it hit.

use crate::build::build_composition;
use crate::config::ConverterConfig;
use crate::context::{CallDefaults, ContextKey, ConversionContext};
use crate::extract::extract_composition;
use crate::fragment::Fragment;
use crate::locale::LocaleConverter;
use crate::payload::{FlatComposition, Payload};
use crate::schema::{SchemaCache, SchemaTree, TemplateCompiler};
use crate::ConversionResult;
use chrono::Utc;
use openehr::Composition;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Where an operation takes its schema tree from.
#[derive(Clone, Debug)]
pub enum SchemaSource {
    /// An already compiled tree.
    Compiled(Arc<SchemaTree>),
    /// A template identity, compiled on first use and cached per default language.
    Template(String),
}

impl From<Arc<SchemaTree>> for SchemaSource {
    fn from(tree: Arc<SchemaTree>) -> Self {
        SchemaSource::Compiled(tree)
    }
}

impl From<&str> for SchemaSource {
    fn from(template_id: &str) -> Self {
        SchemaSource::Template(template_id.to_string())
    }
}

/// Converts compositions between the flat, structured and raw forms.
///
/// A converter is cheap to clone and safe to share between threads.
#[derive(Clone)]
pub struct Converter {
    config: Arc<ConverterConfig>,
    cache: Arc<SchemaCache>,
    compiler: Arc<dyn TemplateCompiler>,
    locale: Option<Arc<dyn LocaleConverter>>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

impl Converter {
    pub fn new(
        config: Arc<ConverterConfig>,
        cache: Arc<SchemaCache>,
        compiler: Arc<dyn TemplateCompiler>,
    ) -> Self {
        Self {
            config,
            cache,
            compiler,
            locale: None,
        }
    }

    /// Uses `locale` for every call instead of the one named by `LOCALE` or the config.
    pub fn with_locale(mut self, locale: Arc<dyn LocaleConverter>) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    fn schema(
        &self,
        source: &SchemaSource,
        default_language: &str,
    ) -> ConversionResult<Arc<SchemaTree>> {
        match source {
            SchemaSource::Compiled(tree) => Ok(Arc::clone(tree)),
            SchemaSource::Template(template_id) => {
                self.cache
                    .get_or_compile(template_id, default_language, self.compiler.as_ref())
            }
        }
    }

    fn build(
        &self,
        tree: &SchemaTree,
        payload: &Payload,
        context: &ConversionContext,
    ) -> ConversionResult<Composition> {
        let defaults = CallDefaults::resolve(
            payload,
            context,
            &self.config,
            tree,
            Utc::now(),
            self.locale.clone(),
        )?;
        build_composition(tree, payload, &defaults)
    }

    fn extract(
        &self,
        tree: &SchemaTree,
        composition: &Composition,
        context: &ConversionContext,
    ) -> ConversionResult<Fragment> {
        let handler = context.flag(ContextKey::ActionToInstructionHandler);
        extract_composition(tree, composition, handler)
    }

    /// Builds the raw composition described by a flat composition.
    ///
    /// # Errors
    ///
    /// The first path resolution, coercion, vocabulary or link error in `flat`.
    #[tracing::instrument(skip_all, fields(template_id))]
    pub fn flat_to_raw(
        &self,
        source: &SchemaSource,
        default_language: &str,
        flat: &FlatComposition,
        context: &ConversionContext,
    ) -> ConversionResult<Composition> {
        let tree = self.schema(source, default_language)?;
        tracing::Span::current().record("template_id", tree.template_id.as_str());
        tracing::debug!(entries = flat.len(), "flat to raw");
        let payload = Payload::from_flat(flat)?;
        let composition = self.build(&tree, &payload, context)?;
        tracing::debug!(content = composition.content.len(), "built composition");
        Ok(composition)
    }

    /// Renders a raw composition as a flat composition.
    ///
    /// # Errors
    ///
    /// Fails when the composition is not an instance of the template.
    #[tracing::instrument(skip_all, fields(template_id))]
    pub fn raw_to_flat(
        &self,
        source: &SchemaSource,
        default_language: &str,
        composition: &Composition,
        context: &ConversionContext,
    ) -> ConversionResult<FlatComposition> {
        let tree = self.schema(source, default_language)?;
        tracing::Span::current().record("template_id", tree.template_id.as_str());
        tracing::debug!(content = composition.content.len(), "raw to flat");
        let fragment = self.extract(&tree, composition, context)?;
        let mut flat = FlatComposition::new();
        fragment.write_flat(&tree.root.id, &mut flat);
        tracing::debug!(entries = flat.len(), "extracted flat composition");
        Ok(flat)
    }

    /// Renders a raw composition as a structured composition.
    ///
    /// # Errors
    ///
    /// Fails when the composition is not an instance of the template.
    #[tracing::instrument(skip_all, fields(template_id))]
    pub fn raw_to_structured(
        &self,
        source: &SchemaSource,
        default_language: &str,
        composition: &Composition,
        context: &ConversionContext,
    ) -> ConversionResult<Value> {
        let tree = self.schema(source, default_language)?;
        tracing::Span::current().record("template_id", tree.template_id.as_str());
        tracing::debug!(content = composition.content.len(), "raw to structured");
        let fragment = self.extract(&tree, composition, context)?;
        let mut document = Map::new();
        document.insert(tree.root.id.clone(), fragment.to_structured());
        Ok(Value::Object(document))
    }

    /// Builds the raw composition described by a structured composition.
    ///
    /// # Errors
    ///
    /// [`ConversionError::Payload`](crate::ConversionError::Payload) when the document is not
    /// structured JSON, then the same errors as [`Converter::flat_to_raw`].
    #[tracing::instrument(skip_all, fields(template_id))]
    pub fn structured_to_raw(
        &self,
        source: &SchemaSource,
        default_language: &str,
        structured: &Value,
        context: &ConversionContext,
    ) -> ConversionResult<Composition> {
        let tree = self.schema(source, default_language)?;
        tracing::Span::current().record("template_id", tree.template_id.as_str());
        tracing::debug!("structured to raw");
        let payload = Payload::from_structured(structured)?;
        let composition = self.build(&tree, &payload, context)?;
        tracing::debug!(content = composition.content.len(), "built composition");
        Ok(composition)
    }

    /// Converts a structured composition to flat form through the raw tree.
    ///
    /// # Errors
    ///
    /// The errors of [`Converter::structured_to_raw`] and [`Converter::raw_to_flat`].
    #[tracing::instrument(skip_all, fields(template_id))]
    pub fn structured_to_flat(
        &self,
        source: &SchemaSource,
        default_language: &str,
        structured: &Value,
        context: &ConversionContext,
    ) -> ConversionResult<FlatComposition> {
        let tree = self.schema(source, default_language)?;
        tracing::Span::current().record("template_id", tree.template_id.as_str());
        let source = SchemaSource::Compiled(Arc::clone(&tree));
        let composition = self.structured_to_raw(&source, default_language, structured, context)?;
        self.raw_to_flat(&source, default_language, &composition, context)
    }
}
