//! RM `COMPOSITION` and `EVENT_CONTEXT`.

use super::content::ContentItem;
use super::data_values::{DvCodedText, DvDateTime};
use super::structure::ItemStructure;
use super::support::{impl_as_locatable, CodePhrase, Locatable, PartyIdentified, PartyProxy};
use super::tag;
use serde::{Deserialize, Serialize};

/// RM `EVENT_CONTEXT`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EventContext {
    #[serde(rename = "_type", default)]
    pub class: tag::EventContext,
    pub start_time: DvDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DvDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub setting: DvCodedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_context: Option<ItemStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_care_facility: Option<PartyIdentified>,
}

/// RM `COMPOSITION`, the root of every raw document.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Composition {
    #[serde(rename = "_type", default)]
    pub class: tag::Composition,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub language: CodePhrase,
    pub territory: CodePhrase,
    pub category: DvCodedText,
    pub composer: PartyProxy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<EventContext>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentItem>,
}

impl Composition {
    /// Visits every content item depth-first, in document order.
    pub fn walk_content<'a>(&'a self, visit: &mut dyn FnMut(&'a ContentItem)) {
        for item in &self.content {
            item.walk(visit);
        }
    }

    /// Mutable counterpart of [`Composition::walk_content`].
    pub fn walk_content_mut(&mut self, visit: &mut dyn FnMut(&mut ContentItem)) {
        for item in &mut self.content {
            item.walk_mut(visit);
        }
    }
}

impl_as_locatable!(Composition);
