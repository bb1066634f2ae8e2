//! openEHR wire/boundary support.
//!
//! This crate owns the typed openEHR Reference Model (RM 1.1.0) tree used as the "raw"
//! composition representation, and translates it to and from canonical JSON where every
//! object carries a `_type` class discriminator.
//!
//! Conversion between the raw tree and the flat/structured formats lives in `flatehr-core`.
//! This crate handles the wire format and standards alignment only.

pub mod data_types;
pub mod rm_1_1_0;
pub mod rm_type;

pub use data_types::ArchetypeId;
pub use rm_1_1_0::composition::{Composition, EventContext};
pub use rm_1_1_0::content::{
    Action, Activity, AdminEntry, ContentItem, EntryCore, Evaluation, Instruction,
    InstructionDetails, IsmTransition, Observation, Section,
};
pub use rm_1_1_0::data_values::{
    DataValue, DvBoolean, DvCodedText, DvCount, DvDate, DvDateTime, DvDuration, DvEhrUri,
    DvIdentifier, DvInterval, DvMultimedia, DvOrdinal, DvParsable, DvProportion, DvQuantity,
    DvText, DvTime, DvUri, ReferenceRange, TermMapping, TextValue,
};
pub use rm_1_1_0::structure::{
    Cluster, Element, Event, History, IntervalEvent, Item, ItemList, ItemSingle, ItemStructure,
    ItemTree, PointEvent,
};
pub use rm_1_1_0::support::{
    Archetyped, ArchetypeIdValue, AsLocatable, CodePhrase, FeederAudit, FeederAuditDetails,
    GenericId, HierObjectId, Link, Locatable, LocatableRef, ObjectId, ObjectRef,
    ObjectVersionId, PartyIdentified, PartyProxy, PartyRef, PartySelf, TemplateId,
    TerminologyId, UidBasedId,
};
pub use rm_type::RmType;

use thiserror::Error;

/// Errors returned by the `openehr` boundary crate.
#[derive(Debug, Error)]
pub enum OpenEhrError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid archetype id: {0}")]
    InvalidArchetypeId(String),
}

pub type OpenEhrResult<T> = std::result::Result<T, OpenEhrError>;

/// Parse a raw RM 1.1.0 `COMPOSITION` from a JSON value.
///
/// This uses `serde_path_to_error` to surface a best-effort "path" (e.g.
/// `content[0].data.events[1].time`) to the failing field when the JSON does not match the
/// RM wire schema.
///
/// # Errors
///
/// Returns [`OpenEhrError::Translation`] naming the failing path.
pub fn composition_from_value(value: serde_json::Value) -> OpenEhrResult<Composition> {
    match serde_path_to_error::deserialize(value) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() || path == "." {
                "<root>"
            } else {
                path.as_str()
            };
            Err(OpenEhrError::Translation(format!(
                "COMPOSITION schema mismatch at {path}: {source}"
            )))
        }
    }
}

/// Read a raw RM 1.1.0 `COMPOSITION` from canonical JSON text.
///
/// # Errors
///
/// Returns [`OpenEhrError::InvalidJson`] for malformed JSON and
/// [`OpenEhrError::Translation`] when the JSON is not a composition.
pub fn read_composition_json(json: &str) -> OpenEhrResult<Composition> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    composition_from_value(value)
}

/// Write a raw RM 1.1.0 `COMPOSITION` as canonical JSON text.
pub fn write_composition_json(composition: &Composition) -> OpenEhrResult<String> {
    Ok(serde_json::to_string_pretty(composition)?)
}

/// Convert a raw composition into a canonical JSON value.
pub fn composition_to_value(composition: &Composition) -> OpenEhrResult<serde_json::Value> {
    Ok(serde_json::to_value(composition)?)
}
