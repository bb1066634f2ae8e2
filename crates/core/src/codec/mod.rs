//! Per-datatype value codecs.
//!
//! Every RM value type has one [`ValueCodec`] that turns the attribute literals of a payload
//! node into a typed [`DataValue`] and back into literals. Codecs are stateless; the registry
//! hands out `'static` instances.

mod attribute;
mod interval;
mod quantity;
mod simple;
mod temporal;
mod text;

pub use attribute::{
    decode_code_phrase, decode_party, decode_string, encode_code_phrase, encode_party,
    encode_string, PartyDefaults, CODE_PHRASE_ATTRIBUTES, PARTY_ATTRIBUTES,
};
pub(crate) use interval::{decode_bounds, encode_bounds};
pub(crate) use temporal::date_time_literal;

use crate::fragment::Fragment;
use crate::locale::LocaleConverter;
use crate::payload::PayloadNode;
use crate::schema::ValueConstraint;
use crate::{ConversionError, ConversionResult};
use chrono::FixedOffset;
use flatehr_types::Scalar;
use openehr::{DataValue, RmType};

/// Locale and zone a codec decodes with.
#[derive(Clone, Copy)]
pub struct CodecContext<'a> {
    pub locale: &'a dyn LocaleConverter,
    pub zone: FixedOffset,
}

/// The literals of one payload node, as seen by a codec.
#[derive(Clone, Copy)]
pub struct LeafInput<'a> {
    path: &'a str,
    node: &'a PayloadNode,
    bare: Option<&'static str>,
}

impl<'a> LeafInput<'a> {
    pub fn new(path: &'a str, node: &'a PayloadNode, bare: Option<&'static str>) -> Self {
        Self { path, node, bare }
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    pub fn node(&self) -> &'a PayloadNode {
        self.node
    }

    /// Non-blank literal of `attribute`; the bare value stands in for the bare attribute.
    pub fn get(&self, attribute: &str) -> Option<&'a Scalar> {
        self.node.attr(attribute).or_else(|| {
            if self.bare == Some(attribute) {
                self.node.attr("")
            } else {
                None
            }
        })
    }

    /// Trimmed text of `attribute`.
    pub fn text(&self, attribute: &str) -> Option<String> {
        self.get(attribute)
            .and_then(Scalar::trimmed)
            .map(|value| value.into_owned())
    }

    /// Flat path of `attribute`, used in error messages.
    pub fn attribute_path(&self, attribute: &str) -> String {
        format!("{}|{}", self.path, attribute)
    }

    pub(crate) fn coercion(
        &self,
        attribute: &str,
        literal: &Scalar,
        rm_type: RmType,
        reason: &str,
    ) -> ConversionError {
        ConversionError::type_coercion(
            self.attribute_path(attribute),
            literal.as_text(),
            rm_type,
            reason,
        )
    }

    pub(crate) fn vocabulary(
        &self,
        attribute: &str,
        literal: &str,
        reason: &str,
    ) -> ConversionError {
        ConversionError::vocabulary(self.attribute_path(attribute), literal, reason)
    }

    /// Parses `attribute` as a boolean.
    pub(crate) fn boolean(
        &self,
        attribute: &str,
        rm_type: RmType,
    ) -> ConversionResult<Option<bool>> {
        let Some(literal) = self.get(attribute) else {
            return Ok(None);
        };
        match literal {
            Scalar::Bool(b) => Ok(Some(*b)),
            Scalar::Text(s) if s.trim().eq_ignore_ascii_case("true") => Ok(Some(true)),
            Scalar::Text(s) if s.trim().eq_ignore_ascii_case("false") => Ok(Some(false)),
            other => Err(self.coercion(attribute, other, rm_type, "boolean expected")),
        }
    }

    /// Parses `attribute` as an integer; decimals without a fraction are accepted.
    pub(crate) fn integer(
        &self,
        attribute: &str,
        rm_type: RmType,
    ) -> ConversionResult<Option<i64>> {
        let Some(literal) = self.get(attribute) else {
            return Ok(None);
        };
        let parsed = match literal {
            Scalar::Integer(i) => Some(*i),
            Scalar::Decimal(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
            Scalar::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|d| d.fract() == 0.0 && d.is_finite())
                        .map(|d| d as i64)
                })
            }
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| self.coercion(attribute, literal, rm_type, "numeric value expected"))
    }

    /// Parses `attribute` as a decimal, canonical form first, then the locale's form.
    pub(crate) fn decimal(
        &self,
        attribute: &str,
        rm_type: RmType,
        ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<f64>> {
        let Some(literal) = self.get(attribute) else {
            return Ok(None);
        };
        let parsed = match literal {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Decimal(d) => Some(*d),
            Scalar::Text(s) => {
                let s = s.trim();
                s.parse::<f64>()
                    .ok()
                    .filter(|d| d.is_finite())
                    .or_else(|| ctx.locale.decimal(s))
            }
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| self.coercion(attribute, literal, rm_type, "numeric value expected"))
    }
}

/// Literal ⇄ typed value marshaling for one RM value type.
pub trait ValueCodec: Send + Sync {
    fn rm_type(&self) -> RmType;

    /// Attribute names accepted on decode.
    fn attributes(&self) -> &'static [&'static str];

    /// Attribute a bare literal (`path` without `|attribute`) stands for.
    fn bare_attribute(&self) -> Option<&'static str>;

    /// Child segments accepted below the value node.
    fn children(&self) -> &'static [&'static str] {
        &[]
    }

    /// Decodes a value; `None` when no primary attribute carries a non-blank literal.
    fn decode(
        &self,
        input: &LeafInput<'_>,
        constraint: &ValueConstraint,
        ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>>;

    /// Writes the literals of `value` into `out`.
    fn encode(&self, value: &DataValue, constraint: &ValueConstraint, out: &mut Fragment);
}

static TEXT: text::TextCodec = text::TextCodec;
static CODED_TEXT: text::CodedTextCodec = text::CodedTextCodec;
static ORDINAL: text::OrdinalCodec = text::OrdinalCodec;
static QUANTITY: quantity::QuantityCodec = quantity::QuantityCodec;
static COUNT: quantity::CountCodec = quantity::CountCodec;
static PROPORTION: quantity::ProportionCodec = quantity::ProportionCodec;
static DURATION: temporal::DurationCodec = temporal::DurationCodec;
static DATE: temporal::DateCodec = temporal::DateCodec;
static TIME: temporal::TimeCodec = temporal::TimeCodec;
static DATE_TIME: temporal::DateTimeCodec = temporal::DateTimeCodec;
static BOOLEAN: simple::BooleanCodec = simple::BooleanCodec;
static IDENTIFIER: simple::IdentifierCodec = simple::IdentifierCodec;
static URI: simple::UriCodec = simple::UriCodec { ehr: false };
static EHR_URI: simple::UriCodec = simple::UriCodec { ehr: true };
static MULTIMEDIA: simple::MultimediaCodec = simple::MultimediaCodec;
static PARSABLE: simple::ParsableCodec = simple::ParsableCodec;
static INTERVAL: interval::IntervalCodec = interval::IntervalCodec;

/// Codec of a value type; `None` for structural and attribute types.
pub fn codec_for(rm_type: RmType) -> Option<&'static dyn ValueCodec> {
    let codec: &'static dyn ValueCodec = match rm_type {
        RmType::DvText => &TEXT,
        RmType::DvCodedText => &CODED_TEXT,
        RmType::DvOrdinal => &ORDINAL,
        RmType::DvQuantity => &QUANTITY,
        RmType::DvCount => &COUNT,
        RmType::DvProportion => &PROPORTION,
        RmType::DvDuration => &DURATION,
        RmType::DvDate => &DATE,
        RmType::DvTime => &TIME,
        RmType::DvDateTime => &DATE_TIME,
        RmType::DvBoolean => &BOOLEAN,
        RmType::DvIdentifier => &IDENTIFIER,
        RmType::DvUri => &URI,
        RmType::DvEhrUri => &EHR_URI,
        RmType::DvMultimedia => &MULTIMEDIA,
        RmType::DvParsable => &PARSABLE,
        RmType::DvInterval => &INTERVAL,
        _ => return None,
    };
    Some(codec)
}

/// RM type of a value.
pub fn value_type(value: &DataValue) -> RmType {
    match value {
        DataValue::Text(_) => RmType::DvText,
        DataValue::CodedText(_) => RmType::DvCodedText,
        DataValue::Ordinal(_) => RmType::DvOrdinal,
        DataValue::Quantity(_) => RmType::DvQuantity,
        DataValue::Count(_) => RmType::DvCount,
        DataValue::Proportion(_) => RmType::DvProportion,
        DataValue::Duration(_) => RmType::DvDuration,
        DataValue::Date(_) => RmType::DvDate,
        DataValue::Time(_) => RmType::DvTime,
        DataValue::DateTime(_) => RmType::DvDateTime,
        DataValue::Boolean(_) => RmType::DvBoolean,
        DataValue::Identifier(_) => RmType::DvIdentifier,
        DataValue::Uri(_) => RmType::DvUri,
        DataValue::EhrUri(_) => RmType::DvEhrUri,
        DataValue::Multimedia(_) => RmType::DvMultimedia,
        DataValue::Parsable(_) => RmType::DvParsable,
        DataValue::Interval(_) => RmType::DvInterval,
    }
}

/// Rejects attribute names outside `attributes`, and a bare literal when there is no bare
/// attribute.
pub(crate) fn check_attributes(
    path: &str,
    node: &PayloadNode,
    rm_type: RmType,
    attributes: &[&str],
    bare: Option<&str>,
) -> ConversionResult<()> {
    for (attribute, literal) in &node.attrs {
        let known = if attribute.is_empty() {
            bare.is_some()
        } else {
            attributes.contains(&attribute.as_str())
        };
        if !known {
            let path = if attribute.is_empty() {
                path.to_string()
            } else {
                format!("{path}|{attribute}")
            };
            return Err(ConversionError::vocabulary(
                path,
                literal.as_text(),
                format!("unknown attribute for type {rm_type}"),
            ));
        }
    }
    Ok(())
}

/// Validates the attributes of `node` and decodes it as `rm_type`.
///
/// # Errors
///
/// [`ConversionError::Vocabulary`] for unknown attributes or codes, and
/// [`ConversionError::TypeCoercion`] for literals the type cannot hold.
pub fn decode_value(
    rm_type: RmType,
    path: &str,
    node: &PayloadNode,
    constraint: &ValueConstraint,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<DataValue>> {
    let codec = codec_for(rm_type).ok_or_else(|| {
        ConversionError::Schema(format!("no value codec for {rm_type} at '{path}'"))
    })?;
    check_attributes(path, node, rm_type, codec.attributes(), codec.bare_attribute())?;
    let input = LeafInput::new(path, node, codec.bare_attribute());
    codec.decode(&input, constraint, ctx)
}

/// Writes the literals of `value` into `out` with the codec of its own type.
pub fn encode_value(value: &DataValue, constraint: &ValueConstraint, out: &mut Fragment) {
    if let Some(codec) = codec_for(value_type(value)) {
        out.bare_name = codec.bare_attribute();
        codec.encode(value, constraint, out);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::locale::StandardLocale;
    use chrono::{Offset, Utc};
    use indexmap::IndexMap;

    pub(crate) fn node(attrs: &[(&str, Scalar)]) -> PayloadNode {
        PayloadNode {
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<IndexMap<_, _>>(),
            children: IndexMap::new(),
        }
    }

    pub(crate) fn decode_with(
        rm_type: RmType,
        locale: &str,
        node: &PayloadNode,
        constraint: &ValueConstraint,
    ) -> ConversionResult<Option<DataValue>> {
        let locale = StandardLocale::for_tag(locale);
        let ctx = CodecContext {
            locale: &locale,
            zone: Utc.fix(),
        };
        decode_value(rm_type, "test/value", node, constraint, &ctx)
    }

    pub(crate) fn decode(
        rm_type: RmType,
        node: &PayloadNode,
        constraint: &ValueConstraint,
    ) -> ConversionResult<Option<DataValue>> {
        decode_with(rm_type, "en", node, constraint)
    }

    pub(crate) fn encode(value: &DataValue, constraint: &ValueConstraint) -> Fragment {
        let mut out = Fragment::new();
        encode_value(value, constraint, &mut out);
        out
    }
}
