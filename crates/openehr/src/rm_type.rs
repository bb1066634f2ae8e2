//! RM type names as they appear in compiled template definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::OpenEhrError;

/// RM class of a schema node.
///
/// Covers the locatable classes the converter builds, the data value classes it codes, and the
/// non-locatable attribute types (`CODE_PHRASE`, `PARTY_PROXY`, `STRING`) that appear as
/// context attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RmType {
    Composition,
    EventContext,
    Section,
    Observation,
    Evaluation,
    Instruction,
    Activity,
    Action,
    AdminEntry,
    IsmTransition,
    History,
    Event,
    PointEvent,
    IntervalEvent,
    Cluster,
    Element,
    DvText,
    DvCodedText,
    DvOrdinal,
    DvQuantity,
    DvCount,
    DvProportion,
    DvDuration,
    DvDate,
    DvTime,
    DvDateTime,
    DvBoolean,
    DvIdentifier,
    DvUri,
    DvEhrUri,
    DvMultimedia,
    DvParsable,
    DvInterval,
    CodePhrase,
    PartyProxy,
    String,
}

const NAMES: &[(RmType, &str)] = &[
    (RmType::Composition, "COMPOSITION"),
    (RmType::EventContext, "EVENT_CONTEXT"),
    (RmType::Section, "SECTION"),
    (RmType::Observation, "OBSERVATION"),
    (RmType::Evaluation, "EVALUATION"),
    (RmType::Instruction, "INSTRUCTION"),
    (RmType::Activity, "ACTIVITY"),
    (RmType::Action, "ACTION"),
    (RmType::AdminEntry, "ADMIN_ENTRY"),
    (RmType::IsmTransition, "ISM_TRANSITION"),
    (RmType::History, "HISTORY"),
    (RmType::Event, "EVENT"),
    (RmType::PointEvent, "POINT_EVENT"),
    (RmType::IntervalEvent, "INTERVAL_EVENT"),
    (RmType::Cluster, "CLUSTER"),
    (RmType::Element, "ELEMENT"),
    (RmType::DvText, "DV_TEXT"),
    (RmType::DvCodedText, "DV_CODED_TEXT"),
    (RmType::DvOrdinal, "DV_ORDINAL"),
    (RmType::DvQuantity, "DV_QUANTITY"),
    (RmType::DvCount, "DV_COUNT"),
    (RmType::DvProportion, "DV_PROPORTION"),
    (RmType::DvDuration, "DV_DURATION"),
    (RmType::DvDate, "DV_DATE"),
    (RmType::DvTime, "DV_TIME"),
    (RmType::DvDateTime, "DV_DATE_TIME"),
    (RmType::DvBoolean, "DV_BOOLEAN"),
    (RmType::DvIdentifier, "DV_IDENTIFIER"),
    (RmType::DvUri, "DV_URI"),
    (RmType::DvEhrUri, "DV_EHR_URI"),
    (RmType::DvMultimedia, "DV_MULTIMEDIA"),
    (RmType::DvParsable, "DV_PARSABLE"),
    (RmType::DvInterval, "DV_INTERVAL"),
    (RmType::CodePhrase, "CODE_PHRASE"),
    (RmType::PartyProxy, "PARTY_PROXY"),
    (RmType::String, "STRING"),
];

impl RmType {
    pub fn as_str(self) -> &'static str {
        NAMES
            .iter()
            .find(|(rm_type, _)| *rm_type == self)
            .map(|(_, name)| *name)
            .unwrap_or("UNKNOWN")
    }

    /// `true` for the `DV_*` classes.
    pub fn is_data_value(self) -> bool {
        self.as_str().starts_with("DV_")
    }

    /// `true` for `ENTRY` subclasses.
    pub fn is_entry(self) -> bool {
        matches!(
            self,
            RmType::Observation
                | RmType::Evaluation
                | RmType::Instruction
                | RmType::Action
                | RmType::AdminEntry
        )
    }

    /// `true` for classes that may sit in `COMPOSITION.content` or `SECTION.items`.
    pub fn is_content_item(self) -> bool {
        self == RmType::Section || self.is_entry()
    }

    /// `true` for the event classes, including the abstract `EVENT` used by templates.
    pub fn is_event(self) -> bool {
        matches!(
            self,
            RmType::Event | RmType::PointEvent | RmType::IntervalEvent
        )
    }

    /// `true` for value types a leaf node carries: data values and attribute types.
    pub fn is_leaf(self) -> bool {
        self.is_data_value()
            || matches!(self, RmType::CodePhrase | RmType::PartyProxy | RmType::String)
    }
}

impl fmt::Display for RmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RmType {
    type Err = OpenEhrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Generic parameters (`DV_INTERVAL<DV_QUANTITY>`) name the same class.
        let base = s.split('<').next().unwrap_or(s).trim();
        NAMES
            .iter()
            .find(|(_, name)| *name == base)
            .map(|(rm_type, _)| *rm_type)
            .ok_or_else(|| OpenEhrError::Translation(format!("unsupported RM type '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for (rm_type, name) in NAMES {
            assert_eq!(rm_type.as_str(), *name);
            assert_eq!(name.parse::<RmType>().expect("known name"), *rm_type);
        }
    }

    #[test]
    fn serde_uses_rm_names() {
        let json = serde_json::to_string(&RmType::DvDateTime).expect("serialize");
        assert_eq!(json, "\"DV_DATE_TIME\"");
        let back: RmType = serde_json::from_str("\"ISM_TRANSITION\"").expect("deserialize");
        assert_eq!(back, RmType::IsmTransition);
    }

    #[test]
    fn generic_interval_parses_as_interval() {
        let parsed: RmType = "DV_INTERVAL<DV_QUANTITY>".parse().expect("generic interval");
        assert_eq!(parsed, RmType::DvInterval);
    }

    #[test]
    fn classification() {
        assert!(RmType::DvQuantity.is_data_value());
        assert!(RmType::CodePhrase.is_leaf());
        assert!(RmType::Action.is_entry());
        assert!(RmType::Section.is_content_item());
        assert!(!RmType::Cluster.is_content_item());
        assert!(RmType::Event.is_event());
    }

    #[test]
    fn unknown_names_fail() {
        assert!("DV_SCALE".parse::<RmType>().is_err());
    }
}
