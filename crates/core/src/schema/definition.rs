//! Template definition files.
//!
//! A definition is the compiled form of a template, written as YAML or JSON:
//!
//! ```yaml
//! template_id: vital_signs.v1
//! default_language: en
//! tree:
//!   id: vital_signs
//!   rm_type: COMPOSITION
//!   node_id: openEHR-EHR-COMPOSITION.encounter.v1
//!   children:
//!     - id: body_temperature
//!       rm_type: OBSERVATION
//!       path: content[openEHR-EHR-OBSERVATION.body_temperature.v2]
//!       max: -1
//! ```
//!
//! Nodes give either an absolute `aql_path` or a `path` relative to their parent. Standard RM
//! attribute nodes (language, composer, event time, ...) are added when a definition omits them.

use super::node::{
    parse_rm_path, CodedOption, SchemaNode, SchemaTree, UnitConstraint, ValueConstraint,
};
use super::TemplateCompiler;
use crate::constants::DEFINITION_EXTENSIONS;
use crate::{ConversionError, ConversionResult};
use flatehr_types::Scalar;
use indexmap::IndexMap;
use openehr::rm_1_1_0::constants::TERMINOLOGY_OPENEHR;
use openehr::RmType;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionWire {
    template_id: String,
    default_language: String,
    #[serde(default)]
    languages: Vec<String>,
    tree: NodeWire,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeWire {
    id: String,
    #[serde(default)]
    name: Option<String>,
    rm_type: String,
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    aql_path: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    min: u32,
    #[serde(default = "default_max")]
    max: i64,
    #[serde(default)]
    in_context: bool,
    #[serde(default)]
    children: Vec<NodeWire>,
    #[serde(default)]
    terminology: Option<String>,
    #[serde(default)]
    codes: Vec<CodeWire>,
    #[serde(default)]
    list_open: bool,
    #[serde(default)]
    units: Vec<UnitWire>,
    #[serde(default)]
    proportion_types: Vec<i64>,
    #[serde(default)]
    partial: bool,
    #[serde(default)]
    interval_of: Option<String>,
    #[serde(default)]
    name_constraint: Vec<CodeWire>,
    #[serde(default)]
    fixed: Option<FixedWire>,
}

fn default_max() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CodeWire {
    code: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    ordinal: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnitWire {
    unit: String,
    #[serde(default)]
    precision: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FixedWire {
    Bare(Scalar),
    Attributes(IndexMap<String, Scalar>),
}

/// Parse a template definition from YAML text.
///
/// # Errors
///
/// Returns [`ConversionError::Schema`] naming the failing field when the text does not match
/// the definition format, or when normalization fails.
pub fn parse_definition_yaml(text: &str) -> ConversionResult<SchemaTree> {
    let deserializer = serde_yaml::Deserializer::from_str(text);
    let wire = match serde_path_to_error::deserialize::<_, DefinitionWire>(deserializer) {
        Ok(wire) => wire,
        Err(err) => return Err(mismatch(err.path().to_string(), err.into_inner())),
    };
    normalize_definition(wire)
}

/// Parse a template definition from JSON text.
///
/// # Errors
///
/// See [`parse_definition_yaml`].
pub fn parse_definition_json(text: &str) -> ConversionResult<SchemaTree> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    let wire = match serde_path_to_error::deserialize::<_, DefinitionWire>(&mut deserializer) {
        Ok(wire) => wire,
        Err(err) => return Err(mismatch(err.path().to_string(), err.into_inner())),
    };
    normalize_definition(wire)
}

fn mismatch(path: String, source: impl std::fmt::Display) -> ConversionError {
    let path = if path.is_empty() || path == "." {
        "<root>".to_string()
    } else {
        path
    };
    ConversionError::Schema(format!("definition mismatch at {path}: {source}"))
}

fn normalize_definition(wire: DefinitionWire) -> ConversionResult<SchemaTree> {
    let template_id = wire.template_id.trim().to_string();
    if template_id.is_empty() {
        return Err(ConversionError::Schema("template_id cannot be empty".into()));
    }
    let default_language = wire.default_language.trim().to_string();
    if default_language.is_empty() {
        return Err(ConversionError::Schema("default_language cannot be empty".into()));
    }
    let mut languages = wire.languages;
    if !languages.contains(&default_language) {
        languages.insert(0, default_language.clone());
    }

    let root = normalize_node(wire.tree, None)?;
    if root.rm_type != RmType::Composition {
        return Err(ConversionError::Schema(format!(
            "root node '{}' must be a COMPOSITION, got {}",
            root.id, root.rm_type
        )));
    }
    if !root.is_archetype_root() {
        return Err(ConversionError::Schema(format!(
            "root node '{}' needs a COMPOSITION archetype id",
            root.id
        )));
    }

    Ok(SchemaTree {
        template_id,
        default_language,
        languages,
        root,
    })
}

fn normalize_node(wire: NodeWire, parent_aql: Option<&str>) -> ConversionResult<SchemaNode> {
    let id = wire.id.trim().to_string();
    if id.is_empty() || id.contains(['/', '|', ':']) {
        return Err(ConversionError::Schema(format!("invalid node id '{}'", wire.id)));
    }

    let rm_type: RmType = wire.rm_type.parse().map_err(|_| {
        ConversionError::Schema(format!(
            "node '{id}': unsupported RM type '{}'",
            wire.rm_type
        ))
    })?;

    let (aql_path, relative) = match parent_aql {
        None => (wire.aql_path.unwrap_or_else(|| "/".to_string()), None),
        Some(parent) => match (wire.aql_path, wire.path) {
            (Some(aql_path), _) => {
                let relative = relative_path(parent, &aql_path).ok_or_else(|| {
                    ConversionError::Schema(format!(
                        "node '{id}': path '{aql_path}' does not extend parent path '{parent}'"
                    ))
                })?;
                let relative = relative.to_string();
                (aql_path, Some(relative))
            }
            (None, Some(path)) => {
                let path = path.trim().trim_start_matches('/').to_string();
                (join_path(parent, &path), Some(path))
            }
            (None, None) => {
                return Err(ConversionError::Schema(format!("node '{id}' has no path")));
            }
        },
    };

    let rm_path = match &relative {
        Some(relative) => parse_rm_path(relative)?,
        None => Vec::new(),
    };
    if parent_aql.is_some() && rm_path.is_empty() {
        return Err(ConversionError::Schema(format!("node '{id}' has an empty path")));
    }

    let node_id = wire
        .node_id
        .or_else(|| rm_path.last().and_then(|step| step.node_id.clone()));

    let interval_of = match wire.interval_of {
        Some(raw) => Some(parse_rm_type(&id, &raw)?),
        None => generic_parameter(&wire.rm_type)
            .map(|raw| parse_rm_type(&id, raw))
            .transpose()?,
    };

    let max = match wire.max {
        m if m < 0 => None,
        m => Some(u32::try_from(m).map_err(|_| {
            ConversionError::Schema(format!("node '{id}': max {m} is out of range"))
        })?),
    };

    let fixed = wire.fixed.map(|fixed| match fixed {
        FixedWire::Bare(value) => IndexMap::from([(String::new(), value)]),
        FixedWire::Attributes(attributes) => attributes,
    });

    let mut node = SchemaNode {
        name: wire.name.unwrap_or_else(|| display_name(&id)),
        id,
        name_constraint: wire.name_constraint.into_iter().map(coded_option).collect(),
        rm_type,
        node_id,
        aql_path,
        rm_path,
        min: wire.min,
        max,
        in_context: wire.in_context,
        children: Vec::new(),
        constraint: ValueConstraint {
            terminology: wire.terminology,
            codes: wire.codes.into_iter().map(coded_option).collect(),
            list_open: wire.list_open,
            units: wire
                .units
                .into_iter()
                .map(|unit| UnitConstraint {
                    unit: unit.unit,
                    precision: unit.precision,
                })
                .collect(),
            proportion_types: wire.proportion_types,
            partial: wire.partial,
            interval_of,
        },
        fixed,
    };

    let mut seen = HashSet::new();
    for child in wire.children {
        let child = normalize_node(child, Some(&node.aql_path))?;
        if !seen.insert(child.id.clone()) {
            return Err(ConversionError::Schema(format!(
                "node '{}' declares child '{}' twice",
                node.id, child.id
            )));
        }
        node.children.push(child);
    }

    inject_attributes(&mut node);
    Ok(node)
}

fn parse_rm_type(id: &str, raw: &str) -> ConversionResult<RmType> {
    raw.parse()
        .map_err(|_| ConversionError::Schema(format!("node '{id}': unsupported RM type '{raw}'")))
}

fn generic_parameter(rm_type: &str) -> Option<&str> {
    let open = rm_type.find('<')?;
    rm_type[open + 1..].strip_suffix('>').map(str::trim)
}

fn coded_option(wire: CodeWire) -> CodedOption {
    CodedOption {
        label: wire.label.unwrap_or_else(|| wire.code.clone()),
        code: wire.code,
        ordinal: wire.ordinal,
    }
}

fn join_path(parent: &str, relative: &str) -> String {
    if parent.is_empty() || parent == "/" {
        format!("/{relative}")
    } else {
        format!("{parent}/{relative}")
    }
}

fn relative_path<'a>(parent: &str, child: &'a str) -> Option<&'a str> {
    let base = if parent == "/" { "" } else { parent };
    child
        .strip_prefix(base)?
        .strip_prefix('/')
        .filter(|rest| !rest.is_empty())
}

fn display_name(id: &str) -> String {
    let spaced = id.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

fn attribute_node(parent: &SchemaNode, id: &str, rm_type: RmType, in_context: bool) -> SchemaNode {
    let mut node = SchemaNode::new(id, display_name(id), rm_type);
    node.aql_path = join_path(&parent.aql_path, id);
    node.rm_path = vec![super::node::RmStep::new(id, None)];
    node.in_context = in_context;
    node
}

fn openehr_coded(mut node: SchemaNode) -> SchemaNode {
    node.constraint.terminology = Some(TERMINOLOGY_OPENEHR.to_string());
    node
}

fn missing(node: &SchemaNode, id: &str) -> bool {
    node.child(id).is_none()
}

fn prepend(node: &mut SchemaNode, mut front: Vec<SchemaNode>) {
    front.append(&mut node.children);
    node.children = front;
}

fn inject_attributes(node: &mut SchemaNode) {
    match node.rm_type {
        RmType::Composition => {
            let mut front = Vec::new();
            if missing(node, "category") {
                front.push(openehr_coded(attribute_node(node, "category", RmType::DvCodedText, true)));
            }
            if missing(node, "context") {
                let mut context = attribute_node(node, "context", RmType::EventContext, true);
                inject_attributes(&mut context);
                front.push(context);
            }
            prepend(node, front);
            for (id, rm_type) in [
                ("language", RmType::CodePhrase),
                ("territory", RmType::CodePhrase),
                ("composer", RmType::PartyProxy),
            ] {
                if missing(node, id) {
                    let child = attribute_node(node, id, rm_type, true);
                    node.children.push(child);
                }
            }
        }
        RmType::EventContext => {
            let mut front = Vec::new();
            if missing(node, "start_time") {
                front.push(attribute_node(node, "start_time", RmType::DvDateTime, true));
            }
            if missing(node, "end_time") {
                front.push(attribute_node(node, "end_time", RmType::DvDateTime, true));
            }
            if missing(node, "setting") {
                front.push(openehr_coded(attribute_node(node, "setting", RmType::DvCodedText, true)));
            }
            prepend(node, front);
        }
        RmType::Event | RmType::PointEvent | RmType::IntervalEvent => {
            if missing(node, "time") {
                let child = attribute_node(node, "time", RmType::DvDateTime, true);
                node.children.push(child);
            }
            if node.rm_type != RmType::PointEvent {
                if missing(node, "width") {
                    let child = attribute_node(node, "width", RmType::DvDuration, true);
                    node.children.push(child);
                }
                if missing(node, "math_function") {
                    let child = openehr_coded(attribute_node(
                        node,
                        "math_function",
                        RmType::DvCodedText,
                        true,
                    ));
                    node.children.push(child);
                }
            }
        }
        RmType::Instruction => {
            if missing(node, "narrative") {
                let child = attribute_node(node, "narrative", RmType::DvText, true);
                node.children.push(child);
            }
            if missing(node, "expiry_time") {
                let child = attribute_node(node, "expiry_time", RmType::DvDateTime, false);
                node.children.push(child);
            }
        }
        RmType::Activity => {
            if missing(node, "timing") {
                let child = attribute_node(node, "timing", RmType::DvParsable, true);
                node.children.push(child);
            }
            if missing(node, "action_archetype_id") {
                let child = attribute_node(node, "action_archetype_id", RmType::String, true);
                node.children.push(child);
            }
        }
        RmType::Action => {
            if missing(node, "time") {
                let child = attribute_node(node, "time", RmType::DvDateTime, true);
                node.children.push(child);
            }
            if missing(node, "ism_transition") {
                let child = attribute_node(node, "ism_transition", RmType::IsmTransition, false);
                node.children.push(child);
            }
            if let Some(ism) = node
                .children
                .iter_mut()
                .find(|child| child.rm_type == RmType::IsmTransition)
            {
                inject_attributes(ism);
            }
        }
        RmType::IsmTransition => {
            for id in ["current_state", "transition", "careflow_step"] {
                if missing(node, id) {
                    let mut child = attribute_node(node, id, RmType::DvCodedText, false);
                    if id != "careflow_step" {
                        child = openehr_coded(child);
                    }
                    node.children.push(child);
                }
            }
        }
        _ => {}
    }

    if node.rm_type.is_entry() {
        for (id, rm_type) in [
            ("language", RmType::CodePhrase),
            ("encoding", RmType::CodePhrase),
            ("subject", RmType::PartyProxy),
        ] {
            if missing(node, id) {
                let child = attribute_node(node, id, rm_type, true);
                node.children.push(child);
            }
        }
    }
}

/// Loads definitions from `<dir>/<template_id>.{yaml,yml,json}`.
#[derive(Clone, Debug)]
pub struct DefinitionDirectory {
    dir: PathBuf,
}

impl DefinitionDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn locate(&self, template_id: &str) -> Option<(PathBuf, &'static str)> {
        DEFINITION_EXTENSIONS.iter().find_map(|extension| {
            let candidate = self.dir.join(format!("{template_id}.{extension}"));
            candidate.is_file().then_some((candidate, *extension))
        })
    }
}

impl TemplateCompiler for DefinitionDirectory {
    fn compile(&self, template_id: &str, default_language: &str) -> ConversionResult<SchemaTree> {
        let template_id = template_id.trim();
        if template_id.is_empty()
            || template_id.contains(['/', '\\'])
            || template_id.contains("..")
        {
            return Err(ConversionError::Schema(format!(
                "invalid template id '{template_id}'"
            )));
        }

        let (path, extension) = self.locate(template_id).ok_or_else(|| {
            ConversionError::Schema(format!(
                "no definition for template '{template_id}' in {}",
                self.dir.display()
            ))
        })?;
        let text = std::fs::read_to_string(&path).map_err(|err| {
            ConversionError::Schema(format!("failed to read {}: {err}", path.display()))
        })?;

        let mut tree = if extension == "json" {
            parse_definition_json(&text)?
        } else {
            parse_definition_yaml(&text)?
        };

        if tree.template_id != template_id {
            return Err(ConversionError::Schema(format!(
                "{} defines template '{}', expected '{template_id}'",
                path.display(),
                tree.template_id
            )));
        }
        let default_language = default_language.trim();
        if !default_language.is_empty() {
            if !tree.languages.iter().any(|language| language == default_language) {
                return Err(ConversionError::Schema(format!(
                    "template '{template_id}' has no language '{default_language}'"
                )));
            }
            tree.default_language = default_language.to_string();
        }
        tracing::debug!(template_id, path = %path.display(), "loaded template definition");
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
template_id: minimal.v1
default_language: en
tree:
  id: minimal
  rm_type: COMPOSITION
  node_id: openEHR-EHR-COMPOSITION.encounter.v1
  children:
    - id: body_temperature
      rm_type: OBSERVATION
      path: content[openEHR-EHR-OBSERVATION.body_temperature.v2]
      max: -1
      children:
        - id: any_event
          rm_type: EVENT
          path: data[at0002]/events[at0003]
          max: -1
          children:
            - id: temperature
              rm_type: DV_QUANTITY
              path: data[at0001]/items[at0004]
              units:
                - unit: "°C"
                  precision: 1
"#;

    #[test]
    fn yaml_definition_is_normalized() {
        let tree = parse_definition_yaml(MINIMAL).expect("valid definition");
        assert_eq!(tree.template_id, "minimal.v1");
        assert_eq!(tree.languages, vec!["en".to_string()]);

        let ids: Vec<&str> = tree.root.children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["category", "context", "body_temperature", "language", "territory", "composer"]
        );

        let observation = tree.root.child("body_temperature").expect("observation");
        assert!(observation.is_multiple());
        assert_eq!(
            observation.aql_path,
            "/content[openEHR-EHR-OBSERVATION.body_temperature.v2]"
        );
        assert!(observation.child("subject").is_some());

        let event = observation.child("any_event").expect("event");
        assert_eq!(event.node_id.as_deref(), Some("at0003"));
        assert_eq!(event.rm_path.len(), 2);
        assert!(event.child("math_function").is_some());

        let temperature = event.child("temperature").expect("temperature");
        assert_eq!(temperature.constraint.units[0].precision, Some(1));
        assert!(temperature.is_element_value());
    }

    #[test]
    fn child_paths_must_extend_parent() {
        let text = r#"
template_id: broken.v1
default_language: en
tree:
  id: broken
  rm_type: COMPOSITION
  node_id: openEHR-EHR-COMPOSITION.encounter.v1
  children:
    - id: obs
      rm_type: OBSERVATION
      path: content[openEHR-EHR-OBSERVATION.x.v1]
      children:
        - id: value
          rm_type: DV_TEXT
          aql_path: /content[openEHR-EHR-OBSERVATION.y.v1]/data[at0001]/items[at0002]
"#;
        let err = parse_definition_yaml(text).expect_err("path mismatch");
        assert!(matches!(err, ConversionError::Schema(msg) if msg.contains("does not extend")));
    }

    #[test]
    fn duplicate_sibling_ids_are_rejected() {
        let text = r#"
template_id: dup.v1
default_language: en
tree:
  id: dup
  rm_type: COMPOSITION
  node_id: openEHR-EHR-COMPOSITION.encounter.v1
  children:
    - {id: a, rm_type: SECTION, path: "content[openEHR-EHR-SECTION.a.v1]"}
    - {id: a, rm_type: SECTION, path: "content[openEHR-EHR-SECTION.b.v1]"}
"#;
        let err = parse_definition_yaml(text).expect_err("duplicate");
        assert!(matches!(err, ConversionError::Schema(msg) if msg.contains("twice")));
    }

    #[test]
    fn unknown_fields_report_their_path() {
        let text = "template_id: x\ndefault_language: en\ncolour: red\ntree: {id: x, rm_type: COMPOSITION}\n";
        let err = parse_definition_yaml(text).expect_err("unknown field");
        assert!(matches!(err, ConversionError::Schema(msg) if msg.contains("colour")));
    }

    #[test]
    fn fixed_values_accept_bare_scalars_and_maps() {
        let text = r#"
{"template_id": "fixed.v1", "default_language": "en",
 "tree": {"id": "fixed", "rm_type": "COMPOSITION", "node_id": "openEHR-EHR-COMPOSITION.encounter.v1",
  "children": [{"id": "note", "rm_type": "EVALUATION", "path": "content[openEHR-EHR-EVALUATION.note.v1]",
   "children": [
     {"id": "kind", "rm_type": "DV_CODED_TEXT", "path": "data[at0001]/items[at0002]",
      "terminology": "local", "codes": [{"code": "at0003", "label": "Kind"}], "fixed": {"code": "at0003"}},
     {"id": "flag", "rm_type": "DV_BOOLEAN", "path": "data[at0001]/items[at0004]", "fixed": true}
   ]}]}}
"#;
        let tree = parse_definition_json(text).expect("valid json definition");
        let note = tree.root.child("note").expect("note");
        let kind = note.child("kind").expect("kind");
        assert_eq!(
            kind.fixed.as_ref().and_then(|f| f.get("code")),
            Some(&Scalar::text("at0003"))
        );
        let flag = note.child("flag").expect("flag");
        assert_eq!(flag.fixed.as_ref().and_then(|f| f.get("")), Some(&Scalar::Bool(true)));
    }

    #[test]
    fn directory_compiler_loads_by_template_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("minimal.v1.yaml"), MINIMAL).expect("write definition");
        let compiler = DefinitionDirectory::new(dir.path());

        let tree = compiler.compile("minimal.v1", "en").expect("compiled");
        assert_eq!(tree.root.id, "minimal");

        let err = compiler.compile("minimal.v1", "de").expect_err("missing language");
        assert!(matches!(err, ConversionError::Schema(_)));
        let err = compiler.compile("../minimal.v1", "en").expect_err("traversal");
        assert!(matches!(err, ConversionError::Schema(_)));
        let err = compiler.compile("absent.v1", "en").expect_err("absent");
        assert!(matches!(err, ConversionError::Schema(_)));
    }
}
