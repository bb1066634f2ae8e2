//! Per-class assembly of a node instance from its placed children.

use super::slots::Slots;
use super::{Builder, Built, PendingLink};
use crate::annotate::Annotations;
use crate::constants::{
    ANY_ACTION_ARCHETYPE, DEFAULT_CATEGORY_CODE, DEFAULT_EVENT_WIDTH, DEFAULT_MATH_FUNCTION_CODE,
    HISTORY_NAME, PERSISTENT_CATEGORY_CODE, STRUCTURE_NODE_ID, TREE_NAME,
};
use crate::link::LinkRequest;
use crate::meta::{apply_entry, decode_health_care_facility, decode_wf_definition};
use crate::path::MetaKind;
use crate::payload::PayloadNode;
use crate::schema::SchemaNode;
use crate::terminology::openehr_rubric;
use crate::{ConversionError, ConversionResult};
use openehr::rm_1_1_0::constants::TERMINOLOGY_OPENEHR;
use openehr::{
    Action, Activity, AdminEntry, Composition, ContentItem, DvCodedText, DvDuration, Element,
    EntryCore, Evaluation, Event, EventContext, History, Instruction, IntervalEvent, Item,
    IsmTransition, ItemStructure, Locatable, Observation, PointEvent, RmType, Section,
};

fn openehr_coded(code: &str) -> DvCodedText {
    DvCodedText::new(
        openehr_rubric(code).unwrap_or(code),
        TERMINOLOGY_OPENEHR,
        code,
    )
}

fn empty_tree() -> ItemStructure {
    ItemStructure::tree(Locatable::new(STRUCTURE_NODE_ID, TREE_NAME), Vec::new())
}

fn addressed(node: &PayloadNode, name: &str) -> bool {
    node.first_child(name).is_some_and(PayloadNode::has_values)
}

impl<'a> Builder<'a> {
    pub(super) fn assemble(
        &mut self,
        schema: &'a SchemaNode,
        path: &str,
        node: &PayloadNode,
        mut slots: Slots<'a>,
    ) -> ConversionResult<Built> {
        let built = match schema.rm_type {
            RmType::Composition => {
                Built::Composition(Box::new(self.composition(schema, path, node, &mut slots)?))
            }
            RmType::EventContext => Built::Context(self.event_context(path, node, &mut slots)?),
            RmType::Section => Built::Content(ContentItem::Section(Section {
                class: Default::default(),
                locatable: self.locatable(schema, path, node)?,
                items: slots.content("items")?,
            })),
            RmType::Observation => {
                let locatable = self.locatable(schema, path, node)?;
                let entry = self.entry(path, node, &mut slots)?;
                let origin = || self.defaults.origin();
                let data = slots.history("data", origin)?.unwrap_or_else(|| History {
                    class: Default::default(),
                    locatable: Locatable::new(STRUCTURE_NODE_ID, HISTORY_NAME),
                    origin: self.defaults.origin(),
                    events: Vec::new(),
                });
                let state = slots.history("state", || self.defaults.origin())?;
                Built::Content(ContentItem::Observation(Observation {
                    class: Default::default(),
                    locatable,
                    entry,
                    protocol: slots.structure("protocol")?,
                    data,
                    state,
                }))
            }
            RmType::Evaluation => Built::Content(ContentItem::Evaluation(Evaluation {
                class: Default::default(),
                locatable: self.locatable(schema, path, node)?,
                entry: self.entry(path, node, &mut slots)?,
                protocol: slots.structure("protocol")?,
                data: slots.structure("data")?.unwrap_or_else(empty_tree),
            })),
            RmType::Instruction => {
                let ctx = self.defaults.codec_context();
                Built::Content(ContentItem::Instruction(Instruction {
                    class: Default::default(),
                    locatable: self.locatable(schema, path, node)?,
                    entry: self.entry(path, node, &mut slots)?,
                    protocol: slots.structure("protocol")?,
                    narrative: slots
                        .text_value("narrative")?
                        .unwrap_or_else(|| self.defaults.narrative.clone()),
                    expiry_time: slots.date_time("expiry_time")?,
                    wf_definition: decode_wf_definition(path, node, &ctx)?,
                    activities: slots.activities()?,
                }))
            }
            RmType::Activity => Built::Activity(Activity {
                class: Default::default(),
                locatable: self.locatable(schema, path, node)?,
                description: slots.structure("description")?.unwrap_or_else(empty_tree),
                timing: Some(
                    slots
                        .parsable("timing")?
                        .unwrap_or_else(|| self.defaults.timing.clone()),
                ),
                action_archetype_id: slots
                    .text("action_archetype_id")?
                    .unwrap_or_else(|| ANY_ACTION_ARCHETYPE.to_string()),
            }),
            RmType::Action => {
                Built::Content(ContentItem::Action(self.action(schema, path, node, &mut slots)?))
            }
            RmType::AdminEntry => Built::Content(ContentItem::AdminEntry(AdminEntry {
                class: Default::default(),
                locatable: self.locatable(schema, path, node)?,
                entry: self.entry(path, node, &mut slots)?,
                data: slots.structure("data")?.unwrap_or_else(empty_tree),
            })),
            RmType::IsmTransition => Built::Ism(IsmTransition {
                class: Default::default(),
                current_state: slots
                    .coded("current_state")?
                    .unwrap_or_else(|| self.defaults.ism_state.clone()),
                transition: slots.coded("transition")?,
                careflow_step: slots.coded("careflow_step")?,
            }),
            RmType::History => Built::History(History {
                class: Default::default(),
                locatable: self.locatable(schema, path, node)?,
                origin: slots
                    .date_time("origin")?
                    .unwrap_or_else(|| self.defaults.origin()),
                events: slots.events()?,
            }),
            RmType::Event | RmType::PointEvent | RmType::IntervalEvent => {
                Built::Event(self.event(schema, path, node, &mut slots)?)
            }
            RmType::Cluster => Built::Item(Item::Cluster(openehr::Cluster {
                class: Default::default(),
                locatable: self.locatable(schema, path, node)?,
                items: slots.items("items")?,
            })),
            RmType::Element => {
                let value = slots.value("value")?;
                let ctx = self.defaults.codec_context();
                let annotations =
                    Annotations::decode(path, node, value.as_ref(), &schema.constraint, &ctx)?;
                let mut element = Element::new(self.locatable(schema, path, node)?);
                annotations.apply(path, value, &mut element)?;
                Built::Item(Item::Element(element))
            }
            other => {
                return Err(ConversionError::Schema(format!(
                    "node '{}' at '{path}': {other} is not a structural class",
                    schema.id
                )));
            }
        };
        slots.finish()?;
        Ok(built)
    }

    fn composition(
        &mut self,
        schema: &SchemaNode,
        path: &str,
        node: &PayloadNode,
        slots: &mut Slots<'a>,
    ) -> ConversionResult<Composition> {
        let defaults = self.defaults;
        let locatable = self.locatable(schema, path, node)?;
        let category = slots
            .coded("category")?
            .unwrap_or_else(|| openehr_coded(DEFAULT_CATEGORY_CODE));
        let context = match slots.context()? {
            Some(context) => Some(context),
            None if category.code() == PERSISTENT_CATEGORY_CODE => None,
            None => Some(EventContext {
                class: Default::default(),
                start_time: defaults.start_time.clone(),
                end_time: defaults.end_time.clone(),
                location: None,
                setting: defaults.setting.clone(),
                other_context: None,
                health_care_facility: defaults.health_care_facility.clone(),
            }),
        };
        Ok(Composition {
            class: Default::default(),
            locatable,
            language: slots
                .code_phrase("language")?
                .unwrap_or_else(|| defaults.language.clone()),
            territory: slots
                .code_phrase("territory")?
                .unwrap_or_else(|| defaults.territory.clone()),
            category,
            composer: slots
                .party("composer")?
                .unwrap_or_else(|| defaults.composer.clone()),
            context,
            content: slots.content("content")?,
        })
    }

    fn event_context(
        &mut self,
        path: &str,
        node: &PayloadNode,
        slots: &mut Slots<'a>,
    ) -> ConversionResult<EventContext> {
        let defaults = self.defaults;
        let health_care_facility =
            decode_health_care_facility(path, node, defaults.party_defaults())?
                .or_else(|| defaults.health_care_facility.clone());
        Ok(EventContext {
            class: Default::default(),
            start_time: slots
                .date_time("start_time")?
                .unwrap_or_else(|| defaults.start_time.clone()),
            end_time: slots
                .date_time("end_time")?
                .or_else(|| defaults.end_time.clone()),
            location: slots.text("location")?,
            setting: slots
                .coded("setting")?
                .unwrap_or_else(|| defaults.setting.clone()),
            other_context: slots.structure("other_context")?,
            health_care_facility,
        })
    }

    fn entry(
        &self,
        path: &str,
        node: &PayloadNode,
        slots: &mut Slots<'a>,
    ) -> ConversionResult<EntryCore> {
        let defaults = self.defaults;
        let mut entry = EntryCore {
            language: slots
                .code_phrase("language")?
                .unwrap_or_else(|| defaults.language.clone()),
            encoding: slots
                .code_phrase("encoding")?
                .unwrap_or_else(|| defaults.encoding.clone()),
            subject: slots.party("subject")?.unwrap_or_default(),
            provider: defaults.provider.clone(),
            workflow_id: None,
        };
        apply_entry(path, node, &mut entry, defaults.party_defaults())?;
        Ok(entry)
    }

    fn action(
        &mut self,
        schema: &SchemaNode,
        path: &str,
        node: &PayloadNode,
        slots: &mut Slots<'a>,
    ) -> ConversionResult<Action> {
        let defaults = self.defaults;
        let locatable = self.locatable(schema, path, node)?;
        let pending = match node.first_child(MetaKind::InstructionDetails.name()) {
            Some(details) => {
                let details_path = format!("{path}/{}", MetaKind::InstructionDetails.name());
                LinkRequest::decode(&details_path, details)?.map(|request| PendingLink {
                    path: details_path,
                    action_archetype: locatable.archetype_node_id.clone(),
                    request,
                })
            }
            None => None,
        };
        self.pending.push(pending);

        let time = match slots.date_time("time")? {
            Some(time) => time,
            None => defaults
                .action_time
                .clone()
                .unwrap_or_else(|| defaults.event_time()),
        };
        Ok(Action {
            class: Default::default(),
            entry: self.entry(path, node, slots)?,
            locatable,
            protocol: slots.structure("protocol")?,
            time,
            description: slots.structure("description")?.unwrap_or_else(empty_tree),
            ism_transition: slots.ism()?.unwrap_or_else(|| IsmTransition {
                class: Default::default(),
                current_state: defaults.ism_state.clone(),
                transition: None,
                careflow_step: None,
            }),
            instruction_details: None,
        })
    }

    /// `EVENT` becomes an interval event when the payload gives a width or math function.
    fn event(
        &mut self,
        schema: &SchemaNode,
        path: &str,
        node: &PayloadNode,
        slots: &mut Slots<'a>,
    ) -> ConversionResult<Event> {
        let defaults = self.defaults;
        let locatable = self.locatable(schema, path, node)?;
        let time = slots
            .date_time("time")?
            .unwrap_or_else(|| defaults.event_time());
        let width = slots.duration("width")?;
        let math_function = slots.coded("math_function")?;
        let data = slots.structure("data")?.unwrap_or_else(empty_tree);
        let state = slots.structure("state")?;

        let interval = match schema.rm_type {
            RmType::IntervalEvent => true,
            RmType::PointEvent => false,
            _ => addressed(node, "width") || addressed(node, "math_function"),
        };
        if !interval {
            return Ok(Event::Point(PointEvent {
                class: Default::default(),
                locatable,
                time,
                data,
                state,
            }));
        }
        Ok(Event::Interval(IntervalEvent {
            class: Default::default(),
            locatable,
            time,
            data,
            state,
            width: width.unwrap_or_else(|| DvDuration {
                class: Default::default(),
                value: DEFAULT_EVENT_WIDTH.to_string(),
            }),
            math_function: math_function
                .unwrap_or_else(|| openehr_coded(DEFAULT_MATH_FUNCTION_CODE)),
            sample_count: None,
        }))
    }
}
