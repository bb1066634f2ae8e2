//! Raw composition to [`Fragment`] tree.
//!
//! Extraction walks the schema, not the composition: every schema child is looked up in the raw
//! object through its `rm_path`, matched by archetype node id (and by name when schema siblings
//! share a node id), and rendered with the value codecs and meta encoders. Raw objects no schema
//! node claims are logged and dropped.

mod raw;

use crate::annotate::encode_annotations;
use crate::codec::{encode_code_phrase, encode_party, encode_string, encode_value};
use crate::fragment::Fragment;
use crate::link::encode_details;
use crate::meta::{
    encode_entry, encode_health_care_facility, encode_locatable, encode_wf_definition,
};
use crate::schema::{SchemaNode, SchemaTree};
use crate::{ConversionError, ConversionResult};
use openehr::{Composition, ContentItem, Item, Locatable};
use raw::Raw;

/// Renders `composition` as a fragment of the template root.
///
/// With `link_handler` the instruction detail hints (`instruction_uid`, `instruction_index`,
/// `activity_index`) are derived back from the stored paths.
pub(crate) fn extract_composition(
    tree: &SchemaTree,
    composition: &Composition,
    link_handler: bool,
) -> ConversionResult<Fragment> {
    let root = &tree.root;
    let archetype = composition.locatable.archetype_node_id.as_str();
    if root.node_id.as_deref().is_some_and(|id| id != archetype) {
        return Err(ConversionError::Payload(format!(
            "composition '{archetype}' is not an instance of template '{}'",
            tree.template_id
        )));
    }
    let extractor = Extractor { link_handler };
    Ok(extractor.fragment(root, &Raw::Composition(composition)))
}

struct Extractor {
    link_handler: bool,
}

fn name_matches(locatable: &Locatable, name: &str) -> bool {
    let actual = locatable.name.value();
    actual == name
        || actual
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with(" #"))
}

impl Extractor {
    fn fragment(&self, schema: &SchemaNode, raw: &Raw<'_>) -> Fragment {
        match raw {
            Raw::Value(value) => {
                let mut out = Fragment::new();
                encode_value(value, &schema.constraint, &mut out);
                return out;
            }
            Raw::CodePhrase(phrase) => {
                let mut out = Fragment::new();
                encode_code_phrase(phrase, &mut out);
                return out;
            }
            Raw::Party(party) => {
                let mut out = Fragment::new();
                encode_party(party, &mut out);
                return out;
            }
            Raw::Text(text) => {
                let mut out = Fragment::new();
                encode_string(text, &mut out);
                return out;
            }
            Raw::Item(Item::Element(element)) if schema.is_element_value() => {
                let mut out = Fragment::new();
                if let Some(value) = &element.value {
                    encode_value(value, &schema.constraint, &mut out);
                }
                encode_annotations(element, &schema.constraint, &mut out);
                encode_locatable(&element.locatable, schema, &mut out);
                return out;
            }
            _ => {}
        }

        let mut out = Fragment::new();
        self.metas(schema, raw, &mut out);

        let mut claimed: Vec<*const Locatable> = Vec::new();
        for child in &schema.children {
            let shared = child.node_id.is_some()
                && schema
                    .children
                    .iter()
                    .filter(|sibling| sibling.node_id == child.node_id)
                    .count()
                    > 1;
            for found in self.find(raw, child, shared) {
                if let Some(locatable) = found.locatable() {
                    claimed.push(locatable);
                }
                let fragment = self.fragment(child, &found);
                if !fragment.is_empty() {
                    out.push_child(&child.id, child.is_multiple(), fragment);
                }
            }
        }
        for scope in scopes(schema, raw) {
            report_unclaimed(schema, &scope, &claimed);
        }
        out
    }

    /// Raw objects behind `child`, in document order.
    fn find<'r>(&self, raw: &Raw<'r>, child: &SchemaNode, shared: bool) -> Vec<Raw<'r>> {
        let candidates = match child.rm_path.as_slice() {
            [step] => raw.attribute(&step.attribute),
            [first, second] => raw
                .attribute(&first.attribute)
                .iter()
                .flat_map(|container| container.attribute(&second.attribute))
                .collect(),
            _ => Vec::new(),
        };
        candidates
            .into_iter()
            .filter(|candidate| {
                let Some(locatable) = candidate.locatable() else {
                    return true;
                };
                if child
                    .node_id
                    .as_deref()
                    .is_some_and(|node_id| node_id != locatable.archetype_node_id)
                {
                    return false;
                }
                !shared || name_matches(locatable, &child.name)
            })
            .collect()
    }

    fn metas(&self, schema: &SchemaNode, raw: &Raw<'_>, out: &mut Fragment) {
        if let Some(locatable) = raw.locatable() {
            encode_locatable(locatable, schema, out);
        }
        match raw {
            Raw::Content(item) => {
                if let Some(entry) = item.entry() {
                    encode_entry(entry, out);
                }
                match item {
                    ContentItem::Instruction(instruction) => {
                        if let Some(definition) = &instruction.wf_definition {
                            encode_wf_definition(definition, out);
                        }
                    }
                    ContentItem::Action(action) => {
                        if let Some(details) = &action.instruction_details {
                            encode_details(details, self.link_handler, out);
                        }
                    }
                    _ => {}
                }
            }
            Raw::Item(Item::Element(element)) => {
                encode_annotations(element, &schema.constraint, out);
            }
            Raw::Context(context) => {
                if let Some(facility) = &context.health_care_facility {
                    encode_health_care_facility(facility, out);
                }
            }
            _ => {}
        }
    }
}

/// `raw` plus the containers its children were reached through.
fn scopes<'r>(schema: &SchemaNode, raw: &Raw<'r>) -> Vec<Raw<'r>> {
    let mut scopes = vec![raw.clone()];
    for child in schema.children.iter().filter(|child| child.rm_path.len() == 2) {
        for container in raw.attribute(child.attribute()) {
            let Some(locatable) = container.locatable() else {
                continue;
            };
            let seen = scopes.iter().any(|scope| {
                scope
                    .locatable()
                    .is_some_and(|other| std::ptr::eq(other, locatable))
            });
            if !seen {
                scopes.push(container);
            }
        }
    }
    scopes
}

fn report_unclaimed(schema: &SchemaNode, scope: &Raw<'_>, claimed: &[*const Locatable]) {
    for locatable in scope.listed() {
        if !claimed.contains(&(locatable as *const Locatable)) {
            tracing::warn!(
                node = %schema.id,
                archetype_node_id = %locatable.archetype_node_id,
                name = locatable.name.value(),
                "raw node matches no template node; skipped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_composition;
    use crate::config::ConverterConfig;
    use crate::context::{CallDefaults, ConversionContext};
    use crate::payload::Payload;
    use crate::schema::parse_definition_yaml;
    use crate::FlatComposition;
    use chrono::{TimeZone, Utc};
    use flatehr_types::Scalar;
    use openehr::{DataValue, DvText};
    use pretty_assertions::assert_eq;

    const NOTE: &str = r#"
template_id: note.v1
default_language: en
tree:
  id: note
  rm_type: COMPOSITION
  node_id: openEHR-EHR-COMPOSITION.note.v1
  children:
    - id: finding
      name: Finding
      rm_type: EVALUATION
      path: content[openEHR-EHR-EVALUATION.finding.v1]
      max: -1
      children:
        - id: summary
          name: Summary
          rm_type: DV_TEXT
          path: data[at0001]/items[at0002]
        - id: comment
          name: Comment
          rm_type: DV_TEXT
          path: data[at0001]/items[at0003]
          max: -1
"#;

    fn tree() -> SchemaTree {
        parse_definition_yaml(NOTE).expect("note definition should parse")
    }

    fn flat(entries: &[(&str, &str)]) -> FlatComposition {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), Scalar::Text(value.to_string())))
            .collect()
    }

    fn build(tree: &SchemaTree, input: &[(&str, &str)]) -> Composition {
        let payload = Payload::from_flat(&flat(input)).expect("flat should parse");
        let now = Utc
            .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
            .single()
            .expect("valid instant");
        let defaults = CallDefaults::resolve(
            &payload,
            &ConversionContext::new(),
            &ConverterConfig::default(),
            tree,
            now,
            None,
        )
        .expect("defaults should resolve");
        build_composition(tree, &payload, &defaults).expect("composition should build")
    }

    fn round_trip(input: &[(&str, &str)]) -> FlatComposition {
        let tree = tree();
        let composition = build(&tree, input);
        let fragment = extract_composition(&tree, &composition, false).expect("should extract");
        let mut out = FlatComposition::new();
        fragment.write_flat(&tree.root.id, &mut out);
        out
    }

    #[test]
    fn element_values_come_back_under_their_paths() {
        let out = round_trip(&[
            ("note/finding:0/summary", "stable"),
            ("note/finding:0/comment:0", "first"),
            ("note/finding:0/comment:1", "second"),
        ]);
        assert_eq!(
            out.get("note/finding:0/summary"),
            Some(&Scalar::Text("stable".into()))
        );
        assert_eq!(
            out.get("note/finding:0/comment:1"),
            Some(&Scalar::Text("second".into()))
        );
        assert!(out.keys().all(|key| !key.contains("finding:1")));
    }

    #[test]
    fn pruned_gaps_are_renumbered() {
        let out = round_trip(&[
            ("note/finding:0/summary", "one"),
            ("note/finding:3/summary", "two"),
        ]);
        assert_eq!(
            out.get("note/finding:1/summary"),
            Some(&Scalar::Text("two".into()))
        );
        assert!(out.keys().all(|key| !key.contains("finding:3")));
    }

    #[test]
    fn unknown_raw_items_are_skipped() {
        let tree = tree();
        let mut composition = build(&tree, &[("note/finding:0/summary", "kept")]);
        if let Some(ContentItem::Evaluation(evaluation)) = composition.content.first_mut() {
            if let openehr::ItemStructure::Tree(tree) = &mut evaluation.data {
                let mut stray = openehr::Element::new(Locatable::new("at9999", "Stray"));
                stray.value = Some(DataValue::Text(DvText::new("ignored")));
                tree.items.push(Item::Element(stray));
            }
        }

        let fragment = extract_composition(&tree, &composition, false).expect("should extract");
        let mut out = FlatComposition::new();
        fragment.write_flat("note", &mut out);
        assert!(out.values().all(|value| value != &Scalar::Text("ignored".into())));
        assert_eq!(
            out.get("note/finding:0/summary"),
            Some(&Scalar::Text("kept".into()))
        );
    }

    #[test]
    fn foreign_compositions_are_rejected() {
        let tree = tree();
        let mut composition = build(&tree, &[("note/finding:0/summary", "x")]);
        composition.locatable.archetype_node_id = "openEHR-EHR-COMPOSITION.other.v1".into();

        let err = extract_composition(&tree, &composition, false).expect_err("should fail");
        assert!(matches!(err, ConversionError::Payload(_)));
    }
}
