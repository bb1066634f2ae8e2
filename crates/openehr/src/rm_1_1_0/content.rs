//! RM content items: sections and care entries.

use super::data_values::{DvCodedText, DvDateTime, DvParsable, DvText};
use super::structure::{History, ItemStructure};
use super::support::{impl_as_locatable, CodePhrase, Locatable, LocatableRef, ObjectRef, PartyProxy};
use super::tag;
use serde::{Deserialize, Serialize};

/// Attributes shared by every `ENTRY`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EntryCore {
    pub language: CodePhrase,
    pub encoding: CodePhrase,
    pub subject: PartyProxy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<PartyProxy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<ObjectRef>,
}

/// RM `OBSERVATION`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Observation {
    #[serde(rename = "_type", default)]
    pub class: tag::Observation,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(flatten)]
    pub entry: EntryCore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ItemStructure>,
    pub data: History,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<History>,
}

/// RM `EVALUATION`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Evaluation {
    #[serde(rename = "_type", default)]
    pub class: tag::Evaluation,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(flatten)]
    pub entry: EntryCore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ItemStructure>,
    pub data: ItemStructure,
}

/// RM `ACTIVITY`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Activity {
    #[serde(rename = "_type", default)]
    pub class: tag::Activity,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub description: ItemStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<DvParsable>,
    pub action_archetype_id: String,
}

/// RM `INSTRUCTION`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Instruction {
    #[serde(rename = "_type", default)]
    pub class: tag::Instruction,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(flatten)]
    pub entry: EntryCore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ItemStructure>,
    pub narrative: DvText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<DvDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wf_definition: Option<DvParsable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activities: Vec<Activity>,
}

/// RM `ISM_TRANSITION`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct IsmTransition {
    #[serde(rename = "_type", default)]
    pub class: tag::IsmTransition,
    pub current_state: DvCodedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<DvCodedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub careflow_step: Option<DvCodedText>,
}

/// RM `INSTRUCTION_DETAILS`: the link from an action back to the activity it carries out.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct InstructionDetails {
    #[serde(rename = "_type", default)]
    pub class: tag::InstructionDetails,
    pub instruction_id: LocatableRef,
    pub activity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wf_details: Option<ItemStructure>,
}

/// RM `ACTION`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Action {
    #[serde(rename = "_type", default)]
    pub class: tag::Action,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(flatten)]
    pub entry: EntryCore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ItemStructure>,
    pub time: DvDateTime,
    pub description: ItemStructure,
    pub ism_transition: IsmTransition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_details: Option<InstructionDetails>,
}

/// RM `ADMIN_ENTRY`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AdminEntry {
    #[serde(rename = "_type", default)]
    pub class: tag::AdminEntry,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(flatten)]
    pub entry: EntryCore,
    pub data: ItemStructure,
}

/// RM `SECTION`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Section {
    #[serde(rename = "_type", default)]
    pub class: tag::Section,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ContentItem>,
}

/// RM `CONTENT_ITEM`.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ContentItem {
    Section(Section),
    Observation(Observation),
    Evaluation(Evaluation),
    Instruction(Instruction),
    Action(Action),
    AdminEntry(AdminEntry),
}

rm_dispatch!(ContentItem, default: None, {
    "SECTION" => Section(Section),
    "OBSERVATION" => Observation(Observation),
    "EVALUATION" => Evaluation(Evaluation),
    "INSTRUCTION" => Instruction(Instruction),
    "ACTION" => Action(Action),
    "ADMIN_ENTRY" => AdminEntry(AdminEntry),
});

impl ContentItem {
    pub fn locatable(&self) -> &Locatable {
        match self {
            ContentItem::Section(item) => &item.locatable,
            ContentItem::Observation(item) => &item.locatable,
            ContentItem::Evaluation(item) => &item.locatable,
            ContentItem::Instruction(item) => &item.locatable,
            ContentItem::Action(item) => &item.locatable,
            ContentItem::AdminEntry(item) => &item.locatable,
        }
    }

    /// Entry attributes, or `None` for a section.
    pub fn entry(&self) -> Option<&EntryCore> {
        match self {
            ContentItem::Section(_) => None,
            ContentItem::Observation(item) => Some(&item.entry),
            ContentItem::Evaluation(item) => Some(&item.entry),
            ContentItem::Instruction(item) => Some(&item.entry),
            ContentItem::Action(item) => Some(&item.entry),
            ContentItem::AdminEntry(item) => Some(&item.entry),
        }
    }

    /// Visits this item and every nested content item depth-first, in document order.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a ContentItem)) {
        visit(self);
        if let ContentItem::Section(section) = self {
            for item in &section.items {
                item.walk(visit);
            }
        }
    }

    /// Mutable counterpart of [`ContentItem::walk`].
    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut ContentItem)) {
        visit(self);
        if let ContentItem::Section(section) = self {
            for item in &mut section.items {
                item.walk_mut(visit);
            }
        }
    }
}

impl_as_locatable!(Section, Observation, Evaluation, Instruction, Activity, Action, AdminEntry);
