//! Borrowed views of raw RM objects, addressed by RM attribute name.

use openehr::{
    Activity, CodePhrase, Composition, ContentItem, DataValue, Event, EventContext, History,
    IsmTransition, Item, ItemStructure, Locatable, PartyProxy,
};

/// One raw object the extractor can visit.
#[derive(Clone, Debug)]
pub(super) enum Raw<'r> {
    Composition(&'r Composition),
    Context(&'r EventContext),
    Content(&'r ContentItem),
    Activity(&'r Activity),
    History(&'r History),
    Event(&'r Event),
    Structure(&'r ItemStructure),
    Item(&'r Item),
    Ism(&'r IsmTransition),
    Value(DataValue),
    CodePhrase(&'r CodePhrase),
    Party(&'r PartyProxy),
    Text(&'r str),
}

impl<'r> Raw<'r> {
    pub(super) fn locatable(&self) -> Option<&'r Locatable> {
        match self {
            Raw::Composition(composition) => Some(&composition.locatable),
            Raw::Content(item) => Some(item.locatable()),
            Raw::Activity(activity) => Some(&activity.locatable),
            Raw::History(history) => Some(&history.locatable),
            Raw::Event(event) => Some(event.locatable()),
            Raw::Structure(structure) => Some(structure.locatable()),
            Raw::Item(item) => Some(item.locatable()),
            Raw::Context(_)
            | Raw::Ism(_)
            | Raw::Value(_)
            | Raw::CodePhrase(_)
            | Raw::Party(_)
            | Raw::Text(_) => None,
        }
    }

    /// Objects held by RM attribute `attribute`, in document order.
    pub(super) fn attribute(&self, attribute: &str) -> Vec<Raw<'r>> {
        match self {
            Raw::Composition(composition) => match attribute {
                "content" => composition.content.iter().map(Raw::Content).collect(),
                "context" => composition.context.iter().map(Raw::Context).collect(),
                "category" => vec![Raw::Value(DataValue::CodedText(composition.category.clone()))],
                "language" => vec![Raw::CodePhrase(&composition.language)],
                "territory" => vec![Raw::CodePhrase(&composition.territory)],
                "composer" => vec![Raw::Party(&composition.composer)],
                _ => Vec::new(),
            },
            Raw::Context(context) => match attribute {
                "start_time" => vec![Raw::Value(DataValue::DateTime(context.start_time.clone()))],
                "end_time" => context
                    .end_time
                    .iter()
                    .map(|time| Raw::Value(DataValue::DateTime(time.clone())))
                    .collect(),
                "setting" => vec![Raw::Value(DataValue::CodedText(context.setting.clone()))],
                "location" => context.location.iter().map(|l| Raw::Text(l)).collect(),
                "other_context" => context.other_context.iter().map(Raw::Structure).collect(),
                _ => Vec::new(),
            },
            Raw::Content(item) => content_attribute(item, attribute),
            Raw::Activity(activity) => match attribute {
                "description" => vec![Raw::Structure(&activity.description)],
                "timing" => activity
                    .timing
                    .iter()
                    .map(|timing| Raw::Value(DataValue::Parsable(timing.clone())))
                    .collect(),
                "action_archetype_id" => vec![Raw::Text(&activity.action_archetype_id)],
                _ => Vec::new(),
            },
            Raw::History(history) => match attribute {
                "events" => history.events.iter().map(Raw::Event).collect(),
                "origin" => vec![Raw::Value(DataValue::DateTime(history.origin.clone()))],
                _ => Vec::new(),
            },
            Raw::Event(event) => match (attribute, event) {
                ("time", _) => vec![Raw::Value(DataValue::DateTime(event.time().clone()))],
                ("data", _) => vec![Raw::Structure(event.data())],
                ("state", _) => event.state().into_iter().map(Raw::Structure).collect(),
                ("width", Event::Interval(interval)) => {
                    vec![Raw::Value(DataValue::Duration(interval.width.clone()))]
                }
                ("math_function", Event::Interval(interval)) => {
                    vec![Raw::Value(DataValue::CodedText(interval.math_function.clone()))]
                }
                _ => Vec::new(),
            },
            Raw::Structure(structure) => match attribute {
                "items" | "item" => structure.items().iter().map(Raw::Item).collect(),
                _ => Vec::new(),
            },
            Raw::Item(Item::Cluster(cluster)) => match attribute {
                "items" => cluster.items.iter().map(Raw::Item).collect(),
                _ => Vec::new(),
            },
            Raw::Item(Item::Element(element)) => match attribute {
                "value" => element.value.iter().cloned().map(Raw::Value).collect(),
                _ => Vec::new(),
            },
            Raw::Ism(ism) => match attribute {
                "current_state" => {
                    vec![Raw::Value(DataValue::CodedText(ism.current_state.clone()))]
                }
                "transition" => ism
                    .transition
                    .iter()
                    .map(|coded| Raw::Value(DataValue::CodedText(coded.clone())))
                    .collect(),
                "careflow_step" => ism
                    .careflow_step
                    .iter()
                    .map(|coded| Raw::Value(DataValue::CodedText(coded.clone())))
                    .collect(),
                _ => Vec::new(),
            },
            Raw::Value(_) | Raw::CodePhrase(_) | Raw::Party(_) | Raw::Text(_) => Vec::new(),
        }
    }

    /// Locatables listed in repeating attributes: the objects a schema node can claim.
    pub(super) fn listed(&self) -> Vec<&'r Locatable> {
        let structure_items = |structure: &'r ItemStructure| {
            structure.items().iter().map(Item::locatable).collect::<Vec<_>>()
        };
        match self {
            Raw::Composition(composition) => {
                composition.content.iter().map(ContentItem::locatable).collect()
            }
            Raw::Content(ContentItem::Section(section)) => {
                section.items.iter().map(ContentItem::locatable).collect()
            }
            Raw::Content(ContentItem::Instruction(instruction)) => instruction
                .activities
                .iter()
                .map(|activity| &activity.locatable)
                .collect(),
            Raw::History(history) => history.events.iter().map(Event::locatable).collect(),
            Raw::Structure(structure) => structure_items(structure),
            Raw::Item(Item::Cluster(cluster)) => {
                cluster.items.iter().map(Item::locatable).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn entry_attribute<'r>(item: &'r ContentItem, attribute: &str) -> Vec<Raw<'r>> {
    let Some(entry) = item.entry() else {
        return Vec::new();
    };
    match attribute {
        "language" => vec![Raw::CodePhrase(&entry.language)],
        "encoding" => vec![Raw::CodePhrase(&entry.encoding)],
        "subject" => vec![Raw::Party(&entry.subject)],
        _ => Vec::new(),
    }
}

fn content_attribute<'r>(item: &'r ContentItem, attribute: &str) -> Vec<Raw<'r>> {
    let found: Vec<Raw<'r>> = match item {
        ContentItem::Section(section) => match attribute {
            "items" => section.items.iter().map(Raw::Content).collect(),
            _ => Vec::new(),
        },
        ContentItem::Observation(observation) => match attribute {
            "data" => vec![Raw::History(&observation.data)],
            "state" => observation.state.iter().map(Raw::History).collect(),
            "protocol" => observation.protocol.iter().map(Raw::Structure).collect(),
            _ => Vec::new(),
        },
        ContentItem::Evaluation(evaluation) => match attribute {
            "data" => vec![Raw::Structure(&evaluation.data)],
            "protocol" => evaluation.protocol.iter().map(Raw::Structure).collect(),
            _ => Vec::new(),
        },
        ContentItem::Instruction(instruction) => match attribute {
            "narrative" => vec![Raw::Value(DataValue::Text(instruction.narrative.clone()))],
            "expiry_time" => instruction
                .expiry_time
                .iter()
                .map(|time| Raw::Value(DataValue::DateTime(time.clone())))
                .collect(),
            "activities" => instruction.activities.iter().map(Raw::Activity).collect(),
            "protocol" => instruction.protocol.iter().map(Raw::Structure).collect(),
            _ => Vec::new(),
        },
        ContentItem::Action(action) => match attribute {
            "time" => vec![Raw::Value(DataValue::DateTime(action.time.clone()))],
            "description" => vec![Raw::Structure(&action.description)],
            "ism_transition" => vec![Raw::Ism(&action.ism_transition)],
            "protocol" => action.protocol.iter().map(Raw::Structure).collect(),
            _ => Vec::new(),
        },
        ContentItem::AdminEntry(admin) => match attribute {
            "data" => vec![Raw::Structure(&admin.data)],
            _ => Vec::new(),
        },
    };
    if found.is_empty() {
        entry_attribute(item, attribute)
    } else {
        found
    }
}
