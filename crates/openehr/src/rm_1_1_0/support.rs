//! RM support classes: identifiers, references, archetype details, feeder audit and links.

use super::data_values::{DvDateTime, DvEhrUri, DvIdentifier, DvText, TextValue};
use super::tag;
use serde::{Deserialize, Serialize};

/// Generic `{ "_type": ..., "value": ... }` identifier shape shared by several RM id classes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct IdValue<T> {
    #[serde(rename = "_type", default)]
    pub class: T,
    pub value: String,
}

impl<T: Default> IdValue<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            class: T::default(),
            value: value.into(),
        }
    }
}

pub type TerminologyId = IdValue<tag::TerminologyId>;
pub type ArchetypeIdValue = IdValue<tag::ArchetypeId>;
pub type TemplateId = IdValue<tag::TemplateId>;
pub type HierObjectId = IdValue<tag::HierObjectId>;
pub type ObjectVersionId = IdValue<tag::ObjectVersionId>;

/// RM `GENERIC_ID`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct GenericId {
    #[serde(rename = "_type", default)]
    pub class: tag::GenericId,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

/// RM `UID_BASED_ID`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum UidBasedId {
    HierObjectId(HierObjectId),
    ObjectVersionId(ObjectVersionId),
}

rm_dispatch!(UidBasedId, default: Some("HIER_OBJECT_ID"), {
    "HIER_OBJECT_ID" => HierObjectId(HierObjectId),
    "OBJECT_VERSION_ID" => ObjectVersionId(ObjectVersionId),
});

impl UidBasedId {
    pub fn value(&self) -> &str {
        match self {
            UidBasedId::HierObjectId(id) => &id.value,
            UidBasedId::ObjectVersionId(id) => &id.value,
        }
    }
}

/// RM `OBJECT_ID` in reference positions.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ObjectId {
    Generic(GenericId),
    HierObjectId(HierObjectId),
    ObjectVersionId(ObjectVersionId),
}

rm_dispatch!(ObjectId, default: Some("GENERIC_ID"), {
    "GENERIC_ID" => Generic(GenericId),
    "HIER_OBJECT_ID" => HierObjectId(HierObjectId),
    "OBJECT_VERSION_ID" => ObjectVersionId(ObjectVersionId),
});

impl ObjectId {
    pub fn value(&self) -> &str {
        match self {
            ObjectId::Generic(id) => &id.value,
            ObjectId::HierObjectId(id) => &id.value,
            ObjectId::ObjectVersionId(id) => &id.value,
        }
    }

    pub fn scheme(&self) -> Option<&str> {
        match self {
            ObjectId::Generic(id) => id.scheme.as_deref(),
            _ => None,
        }
    }
}

/// RM `CODE_PHRASE`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CodePhrase {
    #[serde(rename = "_type", default)]
    pub class: tag::CodePhrase,
    pub terminology_id: TerminologyId,
    pub code_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_term: Option<String>,
}

impl CodePhrase {
    pub fn new(terminology: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            class: tag::CodePhrase,
            terminology_id: TerminologyId::new(terminology),
            code_string: code.into(),
            preferred_term: None,
        }
    }

    pub fn terminology(&self) -> &str {
        &self.terminology_id.value
    }
}

/// RM `PARTY_REF`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PartyRef {
    #[serde(rename = "_type", default)]
    pub class: tag::PartyRef,
    pub id: ObjectId,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: String,
}

/// RM `OBJECT_REF`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ObjectRef {
    #[serde(rename = "_type", default)]
    pub class: tag::ObjectRef,
    pub id: ObjectId,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: String,
}

/// RM `LOCATABLE_REF`, used by `INSTRUCTION_DETAILS.instruction_id`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct LocatableRef {
    #[serde(rename = "_type", default)]
    pub class: tag::LocatableRef,
    pub id: ObjectVersionId,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// RM `PARTY_SELF`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PartySelf {
    #[serde(rename = "_type", default)]
    pub class: tag::PartySelf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<PartyRef>,
}

/// RM `PARTY_IDENTIFIED`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PartyIdentified {
    #[serde(rename = "_type", default)]
    pub class: tag::PartyIdentified,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<PartyRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<DvIdentifier>,
}

/// RM `PARTY_PROXY`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PartyProxy {
    Self_(PartySelf),
    Identified(PartyIdentified),
}

rm_dispatch!(PartyProxy, default: None, {
    "PARTY_SELF" => Self_(PartySelf),
    "PARTY_IDENTIFIED" => Identified(PartyIdentified),
});

impl Default for PartyProxy {
    fn default() -> Self {
        PartyProxy::Self_(PartySelf::default())
    }
}

/// RM `ARCHETYPED`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Archetyped {
    #[serde(rename = "_type", default)]
    pub class: tag::Archetyped,
    pub archetype_id: ArchetypeIdValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,
    pub rm_version: String,
}

/// RM `FEEDER_AUDIT_DETAILS`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FeederAuditDetails {
    #[serde(rename = "_type", default)]
    pub class: tag::FeederAuditDetails,
    pub system_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DvDateTime>,
}

/// RM `FEEDER_AUDIT`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FeederAudit {
    #[serde(rename = "_type", default)]
    pub class: tag::FeederAudit,
    pub originating_system_audit: FeederAuditDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feeder_system_audit: Option<FeederAuditDetails>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub originating_system_item_ids: Vec<DvIdentifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feeder_system_item_ids: Vec<DvIdentifier>,
}

/// RM `LINK`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Link {
    #[serde(rename = "_type", default)]
    pub class: tag::Link,
    pub meaning: DvText,
    #[serde(rename = "type")]
    pub type_: DvText,
    pub target: DvEhrUri,
}

/// Attributes every `LOCATABLE` carries.
///
/// Flattened into each concrete RM struct so that the JSON stays canonical.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Locatable {
    pub archetype_node_id: String,
    pub name: TextValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<UidBasedId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype_details: Option<Archetyped>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feeder_audit: Option<FeederAudit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

impl Locatable {
    pub fn new(archetype_node_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            archetype_node_id: archetype_node_id.into(),
            name: TextValue::Plain(DvText::new(name)),
            uid: None,
            archetype_details: None,
            feeder_audit: None,
            links: Vec::new(),
        }
    }

    /// Plain display value of the name, whether coded or not.
    pub fn name_value(&self) -> &str {
        self.name.value()
    }
}

/// Access to the shared `LOCATABLE` attributes of a concrete RM object.
pub trait AsLocatable {
    fn locatable(&self) -> &Locatable;
}

macro_rules! impl_as_locatable {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::rm_1_1_0::support::AsLocatable for $ty {
                fn locatable(&self) -> &$crate::rm_1_1_0::support::Locatable {
                    &self.locatable
                }
            }
        )+
    };
}

pub(crate) use impl_as_locatable;
