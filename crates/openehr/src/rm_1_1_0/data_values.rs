//! RM `DATA_VALUE` classes.
//!
//! [`DataValue`] is the closed set of value types an `ELEMENT` can carry. Text values used as
//! names or meanings are [`TextValue`], which only admits `DV_TEXT` and `DV_CODED_TEXT`.

use super::support::CodePhrase;
use super::tag;
use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

/// RM `DV_TEXT`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvText {
    #[serde(rename = "_type", default)]
    pub class: tag::DvText,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatting: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<TermMapping>,
}

impl DvText {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

/// RM `DV_CODED_TEXT`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvCodedText {
    #[serde(rename = "_type", default)]
    pub class: tag::DvCodedText,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatting: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<TermMapping>,
    pub defining_code: CodePhrase,
}

impl DvCodedText {
    pub fn new(
        value: impl Into<String>,
        terminology: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            defining_code: CodePhrase::new(terminology, code),
            ..Self::default()
        }
    }

    pub fn code(&self) -> &str {
        &self.defining_code.code_string
    }

    pub fn terminology(&self) -> &str {
        self.defining_code.terminology()
    }
}

/// RM `TERM_MAPPING`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TermMapping {
    #[serde(rename = "_type", default)]
    pub class: tag::TermMapping,
    #[serde(rename = "match")]
    pub match_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<DvCodedText>,
    pub target: CodePhrase,
}

/// Text in name or meaning positions: plain or coded.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TextValue {
    Plain(DvText),
    Coded(DvCodedText),
}

rm_dispatch!(TextValue, default: Some("DV_TEXT"), {
    "DV_TEXT" => Plain(DvText),
    "DV_CODED_TEXT" => Coded(DvCodedText),
});

impl TextValue {
    pub fn value(&self) -> &str {
        match self {
            TextValue::Plain(text) => &text.value,
            TextValue::Coded(text) => &text.value,
        }
    }

    pub fn coded(&self) -> Option<&DvCodedText> {
        match self {
            TextValue::Coded(text) => Some(text),
            TextValue::Plain(_) => None,
        }
    }
}

impl Default for TextValue {
    fn default() -> Self {
        TextValue::Plain(DvText::default())
    }
}

/// RM `DV_ORDINAL`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvOrdinal {
    #[serde(rename = "_type", default)]
    pub class: tag::DvOrdinal,
    pub value: i64,
    pub symbol: DvCodedText,
}

/// RM `DV_QUANTITY`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DvQuantity {
    #[serde(rename = "_type", default)]
    pub class: tag::DvQuantity,
    pub magnitude: f64,
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_is_percent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_status: Option<CodePhrase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_range: Option<DvInterval>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_reference_ranges: Vec<ReferenceRange>,
}

/// RM `DV_COUNT`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DvCount {
    #[serde(rename = "_type", default)]
    pub class: tag::DvCount,
    pub magnitude: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_is_percent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_status: Option<CodePhrase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_range: Option<DvInterval>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_reference_ranges: Vec<ReferenceRange>,
}

/// RM `DV_PROPORTION`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DvProportion {
    #[serde(rename = "_type", default)]
    pub class: tag::DvProportion,
    pub numerator: f64,
    pub denominator: f64,
    #[serde(rename = "type")]
    pub type_: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i64>,
}

/// RM `DV_DURATION`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvDuration {
    #[serde(rename = "_type", default)]
    pub class: tag::DvDuration,
    pub value: String,
}

/// RM `DV_DATE`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvDate {
    #[serde(rename = "_type", default)]
    pub class: tag::DvDate,
    pub value: String,
}

/// RM `DV_TIME`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvTime {
    #[serde(rename = "_type", default)]
    pub class: tag::DvTime,
    pub value: String,
}

/// RM `DV_DATE_TIME`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvDateTime {
    #[serde(rename = "_type", default)]
    pub class: tag::DvDateTime,
    pub value: String,
}

impl DvDateTime {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            class: tag::DvDateTime,
            value: value.into(),
        }
    }
}

/// RM `DV_BOOLEAN`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvBoolean {
    #[serde(rename = "_type", default)]
    pub class: tag::DvBoolean,
    pub value: bool,
}

/// RM `DV_IDENTIFIER`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvIdentifier {
    #[serde(rename = "_type", default)]
    pub class: tag::DvIdentifier,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigner: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// RM `DV_URI`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvUri {
    #[serde(rename = "_type", default)]
    pub class: tag::DvUri,
    pub value: String,
}

/// RM `DV_EHR_URI`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvEhrUri {
    #[serde(rename = "_type", default)]
    pub class: tag::DvEhrUri,
    pub value: String,
}

/// RM `DV_MULTIMEDIA`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvMultimedia {
    #[serde(rename = "_type", default)]
    pub class: tag::DvMultimedia,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<DvUri>,
    pub media_type: CodePhrase,
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_text: Option<String>,
}

/// RM `DV_PARSABLE`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvParsable {
    #[serde(rename = "_type", default)]
    pub class: tag::DvParsable,
    pub value: String,
    pub formalism: String,
}

impl DvParsable {
    pub fn new(value: impl Into<String>, formalism: impl Into<String>) -> Self {
        Self {
            class: tag::DvParsable,
            value: value.into(),
            formalism: formalism.into(),
        }
    }
}

/// RM `DV_INTERVAL<T>`; bounds hold ordered values of the same class.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DvInterval {
    #[serde(rename = "_type", default)]
    pub class: tag::DvInterval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<Box<DataValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<Box<DataValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_included: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_included: Option<bool>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub lower_unbounded: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub upper_unbounded: bool,
}

impl DvInterval {
    /// Builds an interval and derives the `*_unbounded` flags from the bounds present.
    pub fn new(lower: Option<DataValue>, upper: Option<DataValue>) -> Self {
        Self {
            class: tag::DvInterval,
            lower_unbounded: lower.is_none(),
            upper_unbounded: upper.is_none(),
            lower: lower.map(Box::new),
            upper: upper.map(Box::new),
            lower_included: None,
            upper_included: None,
        }
    }
}

/// RM `REFERENCE_RANGE`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ReferenceRange {
    #[serde(rename = "_type", default)]
    pub class: tag::ReferenceRange,
    pub meaning: TextValue,
    pub range: DvInterval,
}

/// Every value type an `ELEMENT` can carry.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum DataValue {
    Text(DvText),
    CodedText(DvCodedText),
    Ordinal(DvOrdinal),
    Quantity(DvQuantity),
    Count(DvCount),
    Proportion(DvProportion),
    Duration(DvDuration),
    Date(DvDate),
    Time(DvTime),
    DateTime(DvDateTime),
    Boolean(DvBoolean),
    Identifier(DvIdentifier),
    Uri(DvUri),
    EhrUri(DvEhrUri),
    Multimedia(DvMultimedia),
    Parsable(DvParsable),
    Interval(DvInterval),
}

rm_dispatch!(DataValue, default: None, {
    "DV_TEXT" => Text(DvText),
    "DV_CODED_TEXT" => CodedText(DvCodedText),
    "DV_ORDINAL" => Ordinal(DvOrdinal),
    "DV_QUANTITY" => Quantity(DvQuantity),
    "DV_COUNT" => Count(DvCount),
    "DV_PROPORTION" => Proportion(DvProportion),
    "DV_DURATION" => Duration(DvDuration),
    "DV_DATE" => Date(DvDate),
    "DV_TIME" => Time(DvTime),
    "DV_DATE_TIME" => DateTime(DvDateTime),
    "DV_BOOLEAN" => Boolean(DvBoolean),
    "DV_IDENTIFIER" => Identifier(DvIdentifier),
    "DV_URI" => Uri(DvUri),
    "DV_EHR_URI" => EhrUri(DvEhrUri),
    "DV_MULTIMEDIA" => Multimedia(DvMultimedia),
    "DV_PARSABLE" => Parsable(DvParsable),
    "DV_INTERVAL" => Interval(DvInterval),
});

impl DataValue {
    /// RM class name of the carried value.
    pub fn rm_class(&self) -> &'static str {
        match self {
            DataValue::Text(_) => tag::DvText::CLASS,
            DataValue::CodedText(_) => tag::DvCodedText::CLASS,
            DataValue::Ordinal(_) => tag::DvOrdinal::CLASS,
            DataValue::Quantity(_) => tag::DvQuantity::CLASS,
            DataValue::Count(_) => tag::DvCount::CLASS,
            DataValue::Proportion(_) => tag::DvProportion::CLASS,
            DataValue::Duration(_) => tag::DvDuration::CLASS,
            DataValue::Date(_) => tag::DvDate::CLASS,
            DataValue::Time(_) => tag::DvTime::CLASS,
            DataValue::DateTime(_) => tag::DvDateTime::CLASS,
            DataValue::Boolean(_) => tag::DvBoolean::CLASS,
            DataValue::Identifier(_) => tag::DvIdentifier::CLASS,
            DataValue::Uri(_) => tag::DvUri::CLASS,
            DataValue::EhrUri(_) => tag::DvEhrUri::CLASS,
            DataValue::Multimedia(_) => tag::DvMultimedia::CLASS,
            DataValue::Parsable(_) => tag::DvParsable::CLASS,
            DataValue::Interval(_) => tag::DvInterval::CLASS,
        }
    }

    /// Text content for values that are plain or coded text.
    pub fn as_text(&self) -> Option<TextValue> {
        match self {
            DataValue::Text(text) => Some(TextValue::Plain(text.clone())),
            DataValue::CodedText(text) => Some(TextValue::Coded(text.clone())),
            _ => None,
        }
    }
}

impl From<TextValue> for DataValue {
    fn from(value: TextValue) -> Self {
        match value {
            TextValue::Plain(text) => DataValue::Text(text),
            TextValue::Coded(text) => DataValue::CodedText(text),
        }
    }
}
