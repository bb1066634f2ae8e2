//! Payload to raw composition.
//!
//! The builder walks the schema depth first in declared order. Every addressed instance of a
//! child is built before its parent; an instance that carries no literal of its own anywhere
//! below it is dropped. Fixed values fill children the payload does not address, and
//! [`CallDefaults`] fill the RM attributes nobody addressed. Instruction links are resolved
//! once the whole content tree exists.

mod assemble;
mod slots;

use self::slots::Slots;
use crate::annotate::Annotations;
use crate::codec::{codec_for, decode_code_phrase, decode_party, decode_string, decode_value};
use crate::constants::STRUCTURE_NODE_ID;
use crate::context::CallDefaults;
use crate::link::{LinkRequest, LinkResolver};
use crate::meta::{apply_locatable, check_metas};
use crate::path::{MetaKind, PathStack};
use crate::payload::{Payload, PayloadNode};
use crate::schema::{SchemaNode, SchemaTree};
use crate::{ConversionError, ConversionResult};
use indexmap::IndexMap;
use openehr::rm_1_1_0::constants::{
    RM_VERSION, TERMINOLOGY_CHARSET, TERMINOLOGY_LANGUAGE, TERMINOLOGY_LOCAL,
    TERMINOLOGY_TERRITORY,
};
use openehr::{
    Activity, ArchetypeIdValue, Archetyped, CodePhrase, Composition, ContentItem, DataValue,
    Element, Event, EventContext, History, IsmTransition, Item, Locatable, PartyProxy, RmType,
    TemplateId,
};

/// A built node instance, shaped for the slot its parent puts it in.
enum Built {
    Composition(Box<Composition>),
    Context(EventContext),
    Content(ContentItem),
    Activity(Activity),
    History(History),
    Event(Event),
    Item(Item),
    Ism(IsmTransition),
    Value(DataValue),
    CodePhrase(CodePhrase),
    Party(PartyProxy),
    Text(String),
}

struct Outcome {
    built: Option<Built>,
    /// Whether a literal of the payload ended up in this instance.
    content: bool,
}

struct PendingLink {
    path: String,
    action_archetype: String,
    request: LinkRequest,
}

struct Builder<'a> {
    tree: &'a SchemaTree,
    defaults: &'a CallDefaults,
    stack: PathStack,
    /// One entry per kept `ACTION`, in document order.
    pending: Vec<Option<PendingLink>>,
}

/// Builds the raw composition for `payload`.
///
/// # Errors
///
/// The first path, coercion, vocabulary or link error met; nothing is returned on failure.
pub(crate) fn build_composition(
    tree: &SchemaTree,
    payload: &Payload,
    defaults: &CallDefaults,
) -> ConversionResult<Composition> {
    let root = &tree.root;
    for name in payload.root.children.keys() {
        if *name != root.id {
            return Err(ConversionError::path_resolution(
                name.as_str(),
                format!("unknown root segment, expected '{}'", root.id),
            ));
        }
    }
    if let Some(instances) = payload.root.child(&root.id) {
        if let Some(index) = instances.keys().find(|index| **index > 0) {
            return Err(ConversionError::path_resolution(
                format!("{}:{index}", root.id),
                "the composition does not repeat",
            ));
        }
    }

    let empty = PayloadNode::default();
    let node = payload.root.first_child(&root.id).unwrap_or(&empty);
    let mut builder = Builder {
        tree,
        defaults,
        stack: PathStack::default(),
        pending: Vec::new(),
    };
    builder.stack.push(&root.id, None);
    let outcome = builder.build_structure(root, node)?;
    let Some(Built::Composition(composition)) = outcome.built else {
        return Err(ConversionError::Schema(format!(
            "root node '{}' did not build a composition",
            root.id
        )));
    };
    let mut composition = *composition;
    resolve_links(tree, defaults, builder.pending, &mut composition)?;
    Ok(composition)
}

fn resolve_links(
    tree: &SchemaTree,
    defaults: &CallDefaults,
    pending: Vec<Option<PendingLink>>,
    composition: &mut Composition,
) -> ConversionResult<()> {
    if pending.iter().all(Option::is_none) {
        return Ok(());
    }
    let resolved = {
        let resolver = LinkResolver::new(tree, composition, defaults.link_handler);
        pending
            .iter()
            .map(|link| {
                link.as_ref()
                    .map(|link| resolver.resolve(&link.path, &link.action_archetype, &link.request))
                    .transpose()
            })
            .collect::<ConversionResult<Vec<_>>>()?
    };
    let mut resolved = resolved.into_iter();
    composition.walk_content_mut(&mut |item| {
        if let ContentItem::Action(action) = item {
            if let Some(Some(details)) = resolved.next() {
                action.instruction_details = Some(details);
            }
        }
    });
    Ok(())
}

fn code_phrase_terminology(schema: &SchemaNode) -> &str {
    match schema.attribute() {
        "language" => TERMINOLOGY_LANGUAGE,
        "territory" => TERMINOLOGY_TERRITORY,
        "encoding" => TERMINOLOGY_CHARSET,
        _ => schema
            .constraint
            .terminology
            .as_deref()
            .unwrap_or(TERMINOLOGY_LOCAL),
    }
}

/// Rejects non-meta children of `node` outside `allowed`.
fn reject_unknown(path: &str, node: &PayloadNode, allowed: &[&str]) -> ConversionResult<()> {
    for name in node.children.keys() {
        if !name.starts_with('_') && !allowed.contains(&name.as_str()) {
            return Err(ConversionError::path_resolution(
                format!("{path}/{name}"),
                "unknown segment",
            ));
        }
    }
    Ok(())
}

impl<'a> Builder<'a> {
    fn build(&mut self, schema: &'a SchemaNode, node: &PayloadNode) -> ConversionResult<Outcome> {
        if schema.rm_type.is_leaf() {
            self.build_leaf(schema, node)
        } else {
            self.build_structure(schema, node)
        }
    }

    fn build_leaf(&mut self, schema: &SchemaNode, node: &PayloadNode) -> ConversionResult<Outcome> {
        let path = self.stack.current();
        if schema.is_element_value() {
            return self.build_element_value(schema, &path, node);
        }
        check_metas(&path, node, schema.rm_type)?;
        let children = codec_for(schema.rm_type).map_or(&[][..], |codec| codec.children());
        reject_unknown(&path, node, children)?;

        let built = match schema.rm_type {
            RmType::CodePhrase => {
                decode_code_phrase(&path, node, code_phrase_terminology(schema))?
                    .map(Built::CodePhrase)
            }
            RmType::PartyProxy => {
                decode_party(&path, node, self.defaults.party_defaults())?.map(Built::Party)
            }
            RmType::String => decode_string(&path, node)?.map(Built::Text),
            rm_type => decode_value(
                rm_type,
                &path,
                node,
                &schema.constraint,
                &self.defaults.codec_context(),
            )?
            .map(Built::Value),
        };
        Ok(Outcome {
            content: built.is_some(),
            built,
        })
    }

    /// A value node standing for an `ELEMENT`: the value plus the element's annotations.
    fn build_element_value(
        &mut self,
        schema: &SchemaNode,
        path: &str,
        node: &PayloadNode,
    ) -> ConversionResult<Outcome> {
        check_metas(path, node, RmType::Element)?;
        let codec = codec_for(schema.rm_type).ok_or_else(|| {
            ConversionError::Schema(format!("no value codec for {} at '{path}'", schema.rm_type))
        })?;
        reject_unknown(path, node, codec.children())?;

        let ctx = self.defaults.codec_context();
        let value = decode_value(schema.rm_type, path, node, &schema.constraint, &ctx)?;
        let annotations =
            Annotations::decode(path, node, value.as_ref(), &schema.constraint, &ctx)?;
        let content = value.is_some() || annotations.null_flavour.is_some();

        let mut element = Element::new(self.locatable(schema, path, node)?);
        annotations.apply(path, value, &mut element)?;
        Ok(Outcome {
            built: Some(Built::Item(Item::Element(element))),
            content,
        })
    }

    fn build_structure(
        &mut self,
        schema: &'a SchemaNode,
        node: &PayloadNode,
    ) -> ConversionResult<Outcome> {
        let path = self.stack.current();
        check_metas(&path, node, schema.rm_type)?;
        if let Some((attribute, literal)) = node.attrs.iter().next() {
            return Err(ConversionError::vocabulary(
                self.stack.with_attribute(attribute),
                literal.as_text(),
                format!("{} takes no literal values", schema.rm_type),
            ));
        }
        for name in node.children.keys() {
            if !name.starts_with('_') && schema.child(name).is_none() {
                return Err(ConversionError::path_resolution(
                    format!("{path}/{name}"),
                    format!("no node '{name}' under '{}'", schema.id),
                ));
            }
        }

        let mut slots = Slots::new(schema, path.clone());
        let mut content = false;
        for child in &schema.children {
            let mut kept = false;
            for (&index, instance) in node.child(&child.id).into_iter().flatten() {
                if index > 0 && !child.is_multiple() {
                    return Err(ConversionError::path_resolution(
                        format!("{path}/{}:{index}", child.id),
                        "node does not repeat",
                    ));
                }
                self.stack.push(&child.id, child.is_multiple().then_some(index));
                let mark = self.pending.len();
                let outcome = self.build(child, instance);
                let child_path = self.stack.current();
                self.stack.pop();
                let outcome = outcome?;

                if !outcome.content {
                    self.pending.truncate(mark);
                    tracing::trace!(path = %child_path, "instance without values pruned");
                    continue;
                }
                kept = true;
                content = true;
                if let Some(built) = outcome.built {
                    slots.push(child, built);
                }
            }

            if !kept && child.rm_type.is_leaf() {
                if let Some(fixed) = &child.fixed {
                    let fixed = PayloadNode {
                        attrs: fixed.clone(),
                        children: IndexMap::new(),
                    };
                    self.stack.push(&child.id, child.is_multiple().then_some(0));
                    let outcome = self.build(child, &fixed);
                    self.stack.pop();
                    if let Some(built) = outcome?.built {
                        slots.push(child, built);
                    }
                }
            }
        }

        if schema.rm_type == RmType::Element {
            content |= node
                .first_child(MetaKind::NullFlavour.name())
                .is_some_and(PayloadNode::has_values);
        }

        let built = self.assemble(schema, &path, node, slots)?;
        Ok(Outcome {
            built: Some(built),
            content,
        })
    }

    /// Locatable attributes of an instance: node id, declared name, archetype details and the
    /// `_uid`, `_name`, `_feeder_audit` and `_link` metas.
    fn locatable(
        &self,
        schema: &SchemaNode,
        path: &str,
        node: &PayloadNode,
    ) -> ConversionResult<Locatable> {
        let node_id = schema
            .node_id
            .clone()
            .unwrap_or_else(|| STRUCTURE_NODE_ID.to_string());
        let mut locatable = Locatable::new(node_id.as_str(), schema.name.as_str());
        if schema.is_archetype_root() {
            locatable.archetype_details = Some(Archetyped {
                class: Default::default(),
                archetype_id: ArchetypeIdValue::new(node_id),
                template_id: (schema.rm_type == RmType::Composition)
                    .then(|| TemplateId::new(self.tree.template_id.as_str())),
                rm_version: RM_VERSION.to_string(),
            });
        }
        apply_locatable(path, node, schema, &mut locatable, &self.defaults.codec_context())?;
        Ok(locatable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConverterConfig;
    use crate::context::ConversionContext;
    use crate::schema::parse_definition_yaml;
    use crate::FlatComposition;
    use chrono::{TimeZone, Utc};
    use flatehr_types::Scalar;

    const VITALS: &str = r#"
template_id: vitals.v1
default_language: en
tree:
  id: vitals
  name: Vitals
  rm_type: COMPOSITION
  node_id: openEHR-EHR-COMPOSITION.encounter.v1
  children:
    - id: body_temperature
      name: Body temperature
      rm_type: OBSERVATION
      path: content[openEHR-EHR-OBSERVATION.body_temperature.v2]
      max: -1
      children:
        - id: any_event
          name: Any event
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
            - id: febrile
              rm_type: DV_BOOLEAN
              path: data[at0001]/items[at0010]
        - id: method
          rm_type: DV_CODED_TEXT
          path: protocol[at0020]/items[at0021]
          terminology: local
          codes:
            - code: at0022
              label: Oral
          fixed:
            code: at0022
"#;

    fn tree() -> SchemaTree {
        parse_definition_yaml(VITALS).expect("valid definition")
    }

    fn build(pairs: &[(&str, Scalar)]) -> ConversionResult<Composition> {
        let flat: FlatComposition = pairs
            .iter()
            .map(|(path, value)| (path.to_string(), value.clone()))
            .collect();
        let payload = Payload::from_flat(&flat)?;
        let tree = tree();
        let now = Utc
            .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
            .single()
            .expect("valid instant");
        let defaults = CallDefaults::resolve(
            &payload,
            &ConversionContext::new(),
            &ConverterConfig::default(),
            &tree,
            now,
            None,
        )?;
        build_composition(&tree, &payload, &defaults)
    }

    fn observation(composition: &Composition) -> &openehr::Observation {
        match composition.content.first() {
            Some(ContentItem::Observation(observation)) => observation,
            other => panic!("expected an observation, got {other:?}"),
        }
    }

    #[test]
    fn builds_synthesized_containers_and_defaults() {
        let composition = build(&[(
            "vitals/body_temperature:0/any_event:0/temperature|magnitude",
            Scalar::Decimal(37.5),
        )])
        .expect("built");

        assert_eq!(composition.category.code(), "433");
        assert_eq!(composition.territory.code_string, "US");
        let context = composition.context.as_ref().expect("event context");
        assert_eq!(context.setting.value, "other care");
        let details = composition
            .locatable
            .archetype_details
            .as_ref()
            .expect("archetype details");
        assert_eq!(details.template_id.as_ref().map(|id| id.value.as_str()), Some("vitals.v1"));

        let observation = observation(&composition);
        assert_eq!(observation.data.locatable.archetype_node_id, "at0002");
        assert_eq!(observation.data.events.len(), 1);
        let Event::Point(event) = &observation.data.events[0] else {
            panic!("expected a point event");
        };
        assert_eq!(event.time.value, context.start_time.value);
        assert_eq!(event.data.locatable().archetype_node_id, "at0001");
        let Item::Element(element) = &event.data.items()[0] else {
            panic!("expected an element");
        };
        assert!(matches!(
            &element.value,
            Some(DataValue::Quantity(quantity)) if quantity.units == "°C" && quantity.magnitude == 37.5
        ));

        let protocol = observation.protocol.as_ref().expect("fixed protocol value");
        let Item::Element(method) = &protocol.items()[0] else {
            panic!("expected an element");
        };
        assert!(matches!(
            &method.value,
            Some(DataValue::CodedText(coded)) if coded.value == "Oral"
        ));
    }

    #[test]
    fn blank_instances_are_pruned() {
        let composition = build(&[
            (
                "vitals/body_temperature:0/any_event:0/temperature|magnitude",
                Scalar::text(""),
            ),
            (
                "vitals/body_temperature:1/any_event:0/temperature|magnitude",
                Scalar::Decimal(38.1),
            ),
        ])
        .expect("built");
        assert_eq!(composition.content.len(), 1);
        let observation = observation(&composition);
        assert!(matches!(
            observation.data.events[0].data().items()[0],
            Item::Element(ref element) if element.value.is_some()
        ));
    }

    #[test]
    fn null_flavour_element_has_no_value() {
        let composition = build(&[(
            "vitals/body_temperature:0/any_event:0/temperature/_null_flavour|code",
            Scalar::text("253"),
        )])
        .expect("built");
        let observation = observation(&composition);
        let Item::Element(element) = &observation.data.events[0].data().items()[0] else {
            panic!("expected an element");
        };
        assert!(element.value.is_none());
        assert_eq!(
            element.null_flavour.as_ref().map(|flavour| flavour.value.as_str()),
            Some("unknown")
        );
    }

    #[test]
    fn width_makes_an_interval_event() {
        let composition = build(&[
            (
                "vitals/body_temperature:0/any_event:0/temperature|magnitude",
                Scalar::Decimal(37.0),
            ),
            ("vitals/body_temperature:0/any_event:0/width", Scalar::text("PT1H")),
        ])
        .expect("built");
        let observation = observation(&composition);
        let Event::Interval(event) = &observation.data.events[0] else {
            panic!("expected an interval event");
        };
        assert_eq!(event.width.value, "PT1H");
        assert_eq!(event.math_function.code(), "640");
    }

    #[test]
    fn unknown_segments_and_repeats_fail() {
        let err = build(&[("vitals/body_temperature:0/pulse|magnitude", Scalar::Integer(60))])
            .expect_err("unknown segment");
        assert!(matches!(
            err,
            ConversionError::PathResolution { ref path, .. } if path == "vitals/body_temperature:0/pulse"
        ));

        let err = build(&[(
            "vitals/body_temperature:0/any_event:0/temperature:1|magnitude",
            Scalar::Decimal(37.0),
        )])
        .expect_err("temperature does not repeat");
        assert!(matches!(err, ConversionError::PathResolution { .. }));

        let err = build(&[(
            "vitals/body_temperature:0/_instruction_details|path",
            Scalar::text("/content"),
        )])
        .expect_err("observations carry no instruction details");
        assert!(matches!(err, ConversionError::PathResolution { .. }));
    }
}
