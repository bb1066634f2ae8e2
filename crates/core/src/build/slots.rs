//! Placement of built children into the RM attributes of their parent.
//!
//! A child's `rm_path` names where it goes: one step is a direct attribute (`time`,
//! `content[...]`, `activities[...]`), two steps go through an intermediate container that the
//! schema does not declare (`data[at0001]/events[at0002]`, `protocol[at0011]/items[at0012]`).

use super::Built;
use crate::constants::{HISTORY_NAME, STRUCTURE_NODE_ID, TREE_NAME};
use crate::schema::SchemaNode;
use crate::{ConversionError, ConversionResult};
use openehr::{
    Activity, CodePhrase, ContentItem, DataValue, DvCodedText, DvDateTime, DvDuration,
    DvParsable, DvText, Event, EventContext, History, IsmTransition, Item, ItemSingle,
    ItemStructure, Locatable, PartyProxy,
};

pub(super) struct Placed<'s> {
    pub schema: &'s SchemaNode,
    pub built: Built,
}

/// Children of one node instance waiting to be placed.
pub(super) struct Slots<'s> {
    owner: &'s SchemaNode,
    path: String,
    entries: Vec<Option<Placed<'s>>>,
}

fn mismatch(path: &str, schema: &SchemaNode, expected: &str) -> ConversionError {
    ConversionError::Schema(format!(
        "node '{}' at '{path}' is {} but its slot holds {expected}",
        schema.id, schema.rm_type
    ))
}

impl<'s> Slots<'s> {
    pub(super) fn new(owner: &'s SchemaNode, path: String) -> Self {
        Self {
            owner,
            path,
            entries: Vec::new(),
        }
    }

    pub(super) fn push(&mut self, schema: &'s SchemaNode, built: Built) {
        self.entries.push(Some(Placed { schema, built }));
    }

    /// Removes every entry whose path from the owner matches `pred`, in order.
    fn take(&mut self, pred: impl Fn(&SchemaNode) -> bool) -> Vec<Placed<'s>> {
        self.entries
            .iter_mut()
            .filter(|entry| matches!(entry, Some(placed) if pred(placed.schema)))
            .filter_map(Option::take)
            .collect()
    }

    fn direct(&mut self, attribute: &str) -> Vec<Placed<'s>> {
        self.take(|schema| schema.rm_path.len() == 1 && schema.attribute() == attribute)
    }

    fn nested(&mut self, attribute: &str) -> Vec<Placed<'s>> {
        self.take(|schema| schema.rm_path.len() == 2 && schema.attribute() == attribute)
    }

    pub(super) fn value(&mut self, attribute: &str) -> ConversionResult<Option<DataValue>> {
        let mut values = None;
        for placed in self.direct(attribute) {
            match placed.built {
                Built::Value(value) => {
                    values.get_or_insert(value);
                }
                _ => return Err(mismatch(&self.path, placed.schema, "a value")),
            }
        }
        Ok(values)
    }

    pub(super) fn coded(&mut self, attribute: &str) -> ConversionResult<Option<DvCodedText>> {
        match self.value(attribute)? {
            None => Ok(None),
            Some(DataValue::CodedText(coded)) => Ok(Some(coded)),
            Some(other) => Err(ConversionError::Schema(format!(
                "'{}/{attribute}' needs DV_CODED_TEXT, got {}",
                self.path,
                other.rm_class()
            ))),
        }
    }

    pub(super) fn date_time(&mut self, attribute: &str) -> ConversionResult<Option<DvDateTime>> {
        match self.value(attribute)? {
            None => Ok(None),
            Some(DataValue::DateTime(value)) => Ok(Some(value)),
            Some(other) => Err(ConversionError::Schema(format!(
                "'{}/{attribute}' needs DV_DATE_TIME, got {}",
                self.path,
                other.rm_class()
            ))),
        }
    }

    pub(super) fn duration(&mut self, attribute: &str) -> ConversionResult<Option<DvDuration>> {
        match self.value(attribute)? {
            None => Ok(None),
            Some(DataValue::Duration(value)) => Ok(Some(value)),
            Some(other) => Err(ConversionError::Schema(format!(
                "'{}/{attribute}' needs DV_DURATION, got {}",
                self.path,
                other.rm_class()
            ))),
        }
    }

    pub(super) fn parsable(&mut self, attribute: &str) -> ConversionResult<Option<DvParsable>> {
        match self.value(attribute)? {
            None => Ok(None),
            Some(DataValue::Parsable(value)) => Ok(Some(value)),
            Some(other) => Err(ConversionError::Schema(format!(
                "'{}/{attribute}' needs DV_PARSABLE, got {}",
                self.path,
                other.rm_class()
            ))),
        }
    }

    /// Plain text; a coded value keeps only its display text.
    pub(super) fn text_value(&mut self, attribute: &str) -> ConversionResult<Option<DvText>> {
        Ok(self.value(attribute)?.and_then(|value| match value {
            DataValue::Text(text) => Some(text),
            DataValue::CodedText(coded) => Some(DvText::new(coded.value)),
            _ => None,
        }))
    }

    pub(super) fn code_phrase(&mut self, attribute: &str) -> ConversionResult<Option<CodePhrase>> {
        let mut found = None;
        for placed in self.direct(attribute) {
            match placed.built {
                Built::CodePhrase(phrase) => {
                    found.get_or_insert(phrase);
                }
                _ => return Err(mismatch(&self.path, placed.schema, "a code phrase")),
            }
        }
        Ok(found)
    }

    pub(super) fn party(&mut self, attribute: &str) -> ConversionResult<Option<PartyProxy>> {
        let mut found = None;
        for placed in self.direct(attribute) {
            match placed.built {
                Built::Party(party) => {
                    found.get_or_insert(party);
                }
                _ => return Err(mismatch(&self.path, placed.schema, "a party")),
            }
        }
        Ok(found)
    }

    pub(super) fn text(&mut self, attribute: &str) -> ConversionResult<Option<String>> {
        let mut found = None;
        for placed in self.direct(attribute) {
            match placed.built {
                Built::Text(text) => {
                    found.get_or_insert(text);
                }
                _ => return Err(mismatch(&self.path, placed.schema, "a string")),
            }
        }
        Ok(found)
    }

    pub(super) fn context(&mut self) -> ConversionResult<Option<EventContext>> {
        let mut found = None;
        for placed in self.direct("context") {
            match placed.built {
                Built::Context(context) => {
                    found.get_or_insert(context);
                }
                _ => return Err(mismatch(&self.path, placed.schema, "an event context")),
            }
        }
        Ok(found)
    }

    pub(super) fn ism(&mut self) -> ConversionResult<Option<IsmTransition>> {
        let mut found = None;
        for placed in self.direct("ism_transition") {
            match placed.built {
                Built::Ism(ism) => {
                    found.get_or_insert(ism);
                }
                _ => return Err(mismatch(&self.path, placed.schema, "an ISM transition")),
            }
        }
        Ok(found)
    }

    pub(super) fn content(&mut self, attribute: &str) -> ConversionResult<Vec<ContentItem>> {
        self.direct(attribute)
            .into_iter()
            .map(|placed| match placed.built {
                Built::Content(item) => Ok(item),
                _ => Err(mismatch(&self.path, placed.schema, "content items")),
            })
            .collect()
    }

    pub(super) fn activities(&mut self) -> ConversionResult<Vec<Activity>> {
        self.direct("activities")
            .into_iter()
            .map(|placed| match placed.built {
                Built::Activity(activity) => Ok(activity),
                _ => Err(mismatch(&self.path, placed.schema, "activities")),
            })
            .collect()
    }

    pub(super) fn items(&mut self, attribute: &str) -> ConversionResult<Vec<Item>> {
        self.direct(attribute)
            .into_iter()
            .map(|placed| match placed.built {
                Built::Item(item) => Ok(item),
                _ => Err(mismatch(&self.path, placed.schema, "items")),
            })
            .collect()
    }

    /// The item structure behind `attribute`, synthesized from its nested items.
    pub(super) fn structure(&mut self, attribute: &str) -> ConversionResult<Option<ItemStructure>> {
        let placed = self.nested(attribute);
        let Some(first) = placed.first() else {
            return Ok(None);
        };
        let node_id = first.schema.rm_path[0]
            .node_id
            .clone()
            .unwrap_or_else(|| STRUCTURE_NODE_ID.to_string());
        let single = first.schema.rm_path[1].attribute == "item";
        let mut items = Vec::with_capacity(placed.len());
        for placed in placed {
            match placed.built {
                Built::Item(item) => items.push(item),
                _ => return Err(mismatch(&self.path, placed.schema, "items")),
            }
        }
        let locatable = Locatable::new(node_id, TREE_NAME);
        if single && items.len() == 1 {
            if let Some(item) = items.pop() {
                return Ok(Some(ItemStructure::Single(ItemSingle {
                    class: Default::default(),
                    locatable,
                    item,
                })));
            }
        }
        Ok(Some(ItemStructure::tree(locatable, items)))
    }

    /// The history behind `attribute`: a declared `HISTORY` child, or one synthesized around
    /// nested events with `origin`.
    pub(super) fn history(
        &mut self,
        attribute: &str,
        origin: impl FnOnce() -> DvDateTime,
    ) -> ConversionResult<Option<History>> {
        let mut declared = None;
        for placed in self.direct(attribute) {
            match placed.built {
                Built::History(history) => {
                    declared.get_or_insert(history);
                }
                _ => return Err(mismatch(&self.path, placed.schema, "a history")),
            }
        }
        let nested = self.nested(attribute);
        let Some(first) = nested.first() else {
            return Ok(declared);
        };
        let node_id = first.schema.rm_path[0]
            .node_id
            .clone()
            .unwrap_or_else(|| STRUCTURE_NODE_ID.to_string());
        let mut events = Vec::with_capacity(nested.len());
        for placed in nested {
            match placed.built {
                Built::Event(event) => events.push(event),
                _ => return Err(mismatch(&self.path, placed.schema, "events")),
            }
        }
        match declared {
            Some(mut history) => {
                history.events.extend(events);
                Ok(Some(history))
            }
            None => Ok(Some(History {
                class: Default::default(),
                locatable: Locatable::new(node_id, HISTORY_NAME),
                origin: origin(),
                events,
            })),
        }
    }

    pub(super) fn events(&mut self) -> ConversionResult<Vec<Event>> {
        self.direct("events")
            .into_iter()
            .map(|placed| match placed.built {
                Built::Event(event) => Ok(event),
                _ => Err(mismatch(&self.path, placed.schema, "events")),
            })
            .collect()
    }

    /// Fails on any child no slot took.
    pub(super) fn finish(self) -> ConversionResult<()> {
        match self.entries.into_iter().flatten().next() {
            None => Ok(()),
            Some(placed) => Err(ConversionError::Schema(format!(
                "node '{}' ({}) has no place under {} at '{}'",
                placed.schema.id, placed.schema.rm_type, self.owner.rm_type, self.path
            ))),
        }
    }
}
