//! RM data structures: item structures, clusters, elements, histories and events.

use super::data_values::{DataValue, DvCodedText, DvDateTime, DvDuration, DvText};
use super::support::{impl_as_locatable, Locatable};
use super::tag;
use serde::{Deserialize, Serialize};

/// RM `ELEMENT`.
///
/// `value` is always written, as `null` when the element carries a null flavour instead.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Element {
    #[serde(rename = "_type", default)]
    pub class: tag::Element,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default)]
    pub value: Option<DataValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_flavour: Option<DvCodedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_reason: Option<DvText>,
}

impl Element {
    /// An element without value, to be filled by the caller.
    pub fn new(locatable: Locatable) -> Self {
        Self {
            class: tag::Element,
            locatable,
            value: None,
            null_flavour: None,
            null_reason: None,
        }
    }
}

/// RM `CLUSTER`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Cluster {
    #[serde(rename = "_type", default)]
    pub class: tag::Cluster,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default)]
    pub items: Vec<Item>,
}

/// RM `ITEM`.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Item {
    Cluster(Cluster),
    Element(Element),
}

rm_dispatch!(Item, default: None, {
    "CLUSTER" => Cluster(Cluster),
    "ELEMENT" => Element(Element),
});

impl Item {
    pub fn locatable(&self) -> &Locatable {
        match self {
            Item::Cluster(cluster) => &cluster.locatable,
            Item::Element(element) => &element.locatable,
        }
    }
}

/// RM `ITEM_TREE`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ItemTree {
    #[serde(rename = "_type", default)]
    pub class: tag::ItemTree,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default)]
    pub items: Vec<Item>,
}

/// RM `ITEM_LIST`; items are elements only.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ItemList {
    #[serde(rename = "_type", default)]
    pub class: tag::ItemList,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default)]
    pub items: Vec<Item>,
}

/// RM `ITEM_SINGLE`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ItemSingle {
    #[serde(rename = "_type", default)]
    pub class: tag::ItemSingle,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub item: Item,
}

/// RM `ITEM_STRUCTURE`.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ItemStructure {
    Tree(ItemTree),
    List(ItemList),
    Single(ItemSingle),
}

rm_dispatch!(ItemStructure, default: Some("ITEM_TREE"), {
    "ITEM_TREE" => Tree(ItemTree),
    "ITEM_LIST" => List(ItemList),
    "ITEM_SINGLE" => Single(ItemSingle),
});

impl ItemStructure {
    /// An `ITEM_TREE` holding `items`.
    pub fn tree(locatable: Locatable, items: Vec<Item>) -> Self {
        ItemStructure::Tree(ItemTree {
            class: tag::ItemTree,
            locatable,
            items,
        })
    }

    pub fn locatable(&self) -> &Locatable {
        match self {
            ItemStructure::Tree(tree) => &tree.locatable,
            ItemStructure::List(list) => &list.locatable,
            ItemStructure::Single(single) => &single.locatable,
        }
    }

    /// Items held by the structure, regardless of its concrete class.
    pub fn items(&self) -> &[Item] {
        match self {
            ItemStructure::Tree(tree) => &tree.items,
            ItemStructure::List(list) => &list.items,
            ItemStructure::Single(single) => std::slice::from_ref(&single.item),
        }
    }
}

/// RM `HISTORY`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct History {
    #[serde(rename = "_type", default)]
    pub class: tag::History,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub origin: DvDateTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
}

/// RM `POINT_EVENT`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PointEvent {
    #[serde(rename = "_type", default)]
    pub class: tag::PointEvent,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub time: DvDateTime,
    pub data: ItemStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ItemStructure>,
}

/// RM `INTERVAL_EVENT`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct IntervalEvent {
    #[serde(rename = "_type", default)]
    pub class: tag::IntervalEvent,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub time: DvDateTime,
    pub data: ItemStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ItemStructure>,
    pub width: DvDuration,
    pub math_function: DvCodedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<i64>,
}

/// RM `EVENT`.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Event {
    Point(PointEvent),
    Interval(IntervalEvent),
}

rm_dispatch!(Event, default: None, {
    "POINT_EVENT" => Point(PointEvent),
    "INTERVAL_EVENT" => Interval(IntervalEvent),
});

impl Event {
    pub fn locatable(&self) -> &Locatable {
        match self {
            Event::Point(event) => &event.locatable,
            Event::Interval(event) => &event.locatable,
        }
    }

    pub fn time(&self) -> &DvDateTime {
        match self {
            Event::Point(event) => &event.time,
            Event::Interval(event) => &event.time,
        }
    }

    pub fn data(&self) -> &ItemStructure {
        match self {
            Event::Point(event) => &event.data,
            Event::Interval(event) => &event.data,
        }
    }

    pub fn state(&self) -> Option<&ItemStructure> {
        match self {
            Event::Point(event) => event.state.as_ref(),
            Event::Interval(event) => event.state.as_ref(),
        }
    }
}

impl_as_locatable!(Element, Cluster, History, PointEvent, IntervalEvent);
