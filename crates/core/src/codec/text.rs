use super::{CodecContext, LeafInput, ValueCodec};
use crate::constants::OTHER_CODE;
use crate::fragment::Fragment;
use crate::schema::ValueConstraint;
use crate::terminology;
use crate::ConversionResult;
use flatehr_types::Scalar;
use openehr::rm_1_1_0::constants::{TERMINOLOGY_LOCAL, TERMINOLOGY_OPENEHR};
use openehr::{DataValue, DvCodedText, DvOrdinal, DvText, RmType};

pub(crate) struct TextCodec;

pub(crate) struct CodedTextCodec;

pub(crate) struct OrdinalCodec;

fn terminology_of(input: &LeafInput<'_>, constraint: &ValueConstraint) -> String {
    input
        .text("terminology")
        .or_else(|| constraint.terminology.clone())
        .unwrap_or_else(|| TERMINOLOGY_LOCAL.to_string())
}

/// Resolves a coded text from any combination of code and display value.
pub(crate) fn resolve_coded(
    input: &LeafInput<'_>,
    constraint: &ValueConstraint,
    code: Option<String>,
    value: Option<String>,
) -> ConversionResult<DvCodedText> {
    let terminology = terminology_of(input, constraint);

    if !constraint.codes.is_empty() {
        let option = match (&code, &value) {
            (Some(code), _) => constraint
                .code(code)
                .ok_or_else(|| input.vocabulary("code", code, "code is not in the value set"))?,
            (None, Some(value)) => constraint
                .label(value)
                .or_else(|| constraint.code(value))
                .ok_or_else(|| {
                    input.vocabulary("value", value, "value is not in the value set")
                })?,
            (None, None) => return Err(input.vocabulary("code", "", "code or value required")),
        };
        let display = match (&code, value) {
            (Some(_), Some(value)) => value,
            _ => option.label.clone(),
        };
        return Ok(DvCodedText::new(display, terminology, option.code.clone()));
    }

    if terminology == TERMINOLOGY_OPENEHR {
        return match (code, value) {
            (Some(code), value) => {
                let rubric = terminology::openehr_rubric(&code).ok_or_else(|| {
                    input.vocabulary("code", &code, "unknown openehr terminology code")
                })?;
                Ok(DvCodedText::new(
                    value.unwrap_or_else(|| rubric.to_string()),
                    terminology,
                    code,
                ))
            }
            (None, Some(value)) => {
                let code = terminology::openehr_code(&value).ok_or_else(|| {
                    input.vocabulary("value", &value, "unknown openehr terminology rubric")
                })?;
                Ok(DvCodedText::new(value, terminology, code))
            }
            (None, None) => Err(input.vocabulary("code", "", "code or value required")),
        };
    }

    match (code, value) {
        (Some(code), value) => {
            let display = value.unwrap_or_else(|| code.clone());
            Ok(DvCodedText::new(display, terminology, code))
        }
        (None, Some(value)) => Err(input.vocabulary(
            "value",
            &value,
            "a code is required for an unconstrained coded text",
        )),
        (None, None) => Err(input.vocabulary("code", "", "code or value required")),
    }
}

fn encode_coded(text: &DvCodedText, constraint: &ValueConstraint, out: &mut Fragment) {
    if constraint.list_open && text.code() == OTHER_CODE && text.terminology() == TERMINOLOGY_LOCAL
    {
        out.set("other", text.value.as_str());
        return;
    }
    out.set("code", text.code());
    out.set("value", text.value.as_str());
    out.set("terminology", text.terminology());
    if let Some(formatting) = &text.formatting {
        out.set("formatting", formatting.as_str());
    }
}

impl ValueCodec for TextCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvText
    }

    fn attributes(&self) -> &'static [&'static str] {
        &["value", "code", "terminology", "formatting"]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        Some("value")
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        constraint: &ValueConstraint,
        _ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let value = input.text("value");
        let code = input.text("code");
        if value.is_none() && code.is_none() {
            return Ok(None);
        }
        let formatting = input.text("formatting");

        if code.is_some() {
            let mut coded = resolve_coded(input, constraint, code, value)?;
            coded.formatting = formatting;
            return Ok(Some(DataValue::CodedText(coded)));
        }

        let mut text = DvText::new(value.unwrap_or_default());
        text.formatting = formatting;
        Ok(Some(DataValue::Text(text)))
    }

    fn encode(&self, value: &DataValue, constraint: &ValueConstraint, out: &mut Fragment) {
        match value {
            DataValue::Text(text) => {
                out.bare(text.value.as_str());
                if let Some(formatting) = &text.formatting {
                    out.set("formatting", formatting.as_str());
                }
            }
            DataValue::CodedText(text) => encode_coded(text, constraint, out),
            _ => {}
        }
    }
}

impl ValueCodec for CodedTextCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvCodedText
    }

    fn attributes(&self) -> &'static [&'static str] {
        &["code", "value", "terminology", "other", "formatting"]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        Some("value")
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        constraint: &ValueConstraint,
        _ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let code = input.text("code");
        let value = input.text("value");
        let other = input.text("other");
        if code.is_none() && value.is_none() && other.is_none() {
            return Ok(None);
        }

        if let (Some(other), None) = (&other, &code) {
            if !constraint.list_open {
                return Err(input.vocabulary(
                    "other",
                    other,
                    "free text is not allowed for this coded text",
                ));
            }
            return Ok(Some(DataValue::CodedText(DvCodedText::new(
                other.as_str(),
                TERMINOLOGY_LOCAL,
                OTHER_CODE,
            ))));
        }

        let mut coded = resolve_coded(input, constraint, code, value)?;
        coded.formatting = input.text("formatting");
        Ok(Some(DataValue::CodedText(coded)))
    }

    fn encode(&self, value: &DataValue, constraint: &ValueConstraint, out: &mut Fragment) {
        match value {
            DataValue::CodedText(text) => encode_coded(text, constraint, out),
            DataValue::Text(text) => out.bare(text.value.as_str()),
            _ => {}
        }
    }
}

impl ValueCodec for OrdinalCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvOrdinal
    }

    fn attributes(&self) -> &'static [&'static str] {
        &["code", "value", "ordinal", "terminology"]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        None
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        constraint: &ValueConstraint,
        _ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let code = input.text("code");
        let value = input.text("value");
        let ordinal = input.integer("ordinal", RmType::DvOrdinal)?;
        if code.is_none() && value.is_none() && ordinal.is_none() {
            return Ok(None);
        }
        let terminology = terminology_of(input, constraint);

        if constraint.codes.is_empty() {
            return match (code, value, ordinal) {
                (Some(code), Some(value), Some(ordinal)) => Ok(Some(DataValue::Ordinal(DvOrdinal {
                    value: ordinal,
                    symbol: DvCodedText::new(value, terminology, code),
                    ..DvOrdinal::default()
                }))),
                (code, _, _) => Err(input.vocabulary(
                    "code",
                    code.as_deref().unwrap_or_default(),
                    "an unconstrained ordinal needs code, value and ordinal",
                )),
            };
        }

        let option = if let Some(code) = &code {
            constraint
                .code(code)
                .ok_or_else(|| input.vocabulary("code", code, "code is not in the value set"))?
        } else if let Some(ordinal) = ordinal {
            constraint
                .codes
                .iter()
                .find(|option| option.ordinal == Some(ordinal))
                .ok_or_else(|| {
                    input.vocabulary(
                        "ordinal",
                        &ordinal.to_string(),
                        "ordinal is not in the value set",
                    )
                })?
        } else {
            let value = value.as_deref().unwrap_or_default();
            constraint
                .label(value)
                .ok_or_else(|| input.vocabulary("value", value, "value is not in the value set"))?
        };

        let ordinal_value = option.ordinal.or(ordinal).ok_or_else(|| {
            input.vocabulary("ordinal", &option.code, "value set entry has no ordinal")
        })?;
        Ok(Some(DataValue::Ordinal(DvOrdinal {
            value: ordinal_value,
            symbol: DvCodedText::new(option.label.as_str(), terminology, option.code.as_str()),
            ..DvOrdinal::default()
        })))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        if let DataValue::Ordinal(ordinal) = value {
            out.set("code", ordinal.symbol.code());
            out.set("value", ordinal.symbol.value.as_str());
            out.set("ordinal", Scalar::Integer(ordinal.value));
            out.set("terminology", ordinal.symbol.terminology());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{decode, encode, node};
    use super::*;
    use crate::schema::CodedOption;
    use crate::ConversionError;

    fn value_set(list_open: bool) -> ValueConstraint {
        ValueConstraint {
            terminology: Some("local".into()),
            codes: vec![
                CodedOption {
                    code: "at0005".into(),
                    label: "Mild".into(),
                    ordinal: Some(1),
                },
                CodedOption {
                    code: "at0006".into(),
                    label: "Severe".into(),
                    ordinal: Some(3),
                },
            ],
            list_open,
            ..ValueConstraint::default()
        }
    }

    fn coded(value: Option<DataValue>) -> DvCodedText {
        match value {
            Some(DataValue::CodedText(coded)) => coded,
            other => panic!("expected DV_CODED_TEXT, got {other:?}"),
        }
    }

    #[test]
    fn code_alone_looks_up_the_label() {
        let input = node(&[("code", Scalar::text("at0006"))]);
        let text = coded(decode(RmType::DvCodedText, &input, &value_set(false)).expect("decoded"));
        assert_eq!(text.value, "Severe");
        assert_eq!(text.code(), "at0006");
        assert_eq!(text.terminology(), "local");
    }

    #[test]
    fn value_alone_looks_up_the_code() {
        let input = node(&[("value", Scalar::text("mild"))]);
        let text = coded(decode(RmType::DvCodedText, &input, &value_set(false)).expect("decoded"));
        assert_eq!(text.code(), "at0005");
    }

    #[test]
    fn unknown_code_is_a_vocabulary_error() {
        let input = node(&[("code", Scalar::text("at9999"))]);
        let err = decode(RmType::DvCodedText, &input, &value_set(false)).expect_err("unknown code");
        assert!(matches!(err, ConversionError::Vocabulary { literal, .. } if literal == "at9999"));
    }

    #[test]
    fn other_requires_an_open_list() {
        let input = node(&[("other", Scalar::text("Moderate-ish"))]);
        let err = decode(RmType::DvCodedText, &input, &value_set(false)).expect_err("closed list");
        assert!(matches!(err, ConversionError::Vocabulary { .. }));

        let text = coded(decode(RmType::DvCodedText, &input, &value_set(true)).expect("open list"));
        assert_eq!(text.code(), "other");
        assert_eq!(text.terminology(), "local");

        let out = encode(&DataValue::CodedText(text), &value_set(true));
        assert_eq!(out.attrs.get("other"), Some(&Scalar::text("Moderate-ish")));
    }

    #[test]
    fn openehr_terminology_without_value_set() {
        let constraint = ValueConstraint {
            terminology: Some("openehr".into()),
            ..ValueConstraint::default()
        };
        let input = node(&[("code", Scalar::text("238"))]);
        let text = coded(decode(RmType::DvCodedText, &input, &constraint).expect("decoded"));
        assert_eq!(text.value, "other care");

        let input = node(&[("value", Scalar::text("event"))]);
        let text = coded(decode(RmType::DvCodedText, &input, &constraint).expect("decoded"));
        assert_eq!(text.code(), "433");
    }

    #[test]
    fn plain_text_with_code_becomes_coded() {
        let input = node(&[
            ("", Scalar::text("Headache")),
            ("code", Scalar::text("25064002")),
            ("terminology", Scalar::text("SNOMED-CT")),
        ]);
        let text = coded(decode(RmType::DvText, &input, &ValueConstraint::default()).expect("decoded"));
        assert_eq!(text.value, "Headache");
        assert_eq!(text.terminology(), "SNOMED-CT");

        let input = node(&[("", Scalar::text("Just text"))]);
        let value = decode(RmType::DvText, &input, &ValueConstraint::default()).expect("decoded");
        assert!(matches!(value, Some(DataValue::Text(t)) if t.value == "Just text"));
    }

    #[test]
    fn ordinal_lookup_by_any_attribute() {
        for attrs in [
            vec![("code", Scalar::text("at0006"))],
            vec![("ordinal", Scalar::Integer(3))],
            vec![("value", Scalar::text("Severe"))],
        ] {
            let input = node(&attrs);
            let value = decode(RmType::DvOrdinal, &input, &value_set(false)).expect("decoded");
            let Some(DataValue::Ordinal(ordinal)) = value else {
                panic!("expected DV_ORDINAL");
            };
            assert_eq!(ordinal.value, 3);
            assert_eq!(ordinal.symbol.code(), "at0006");
        }
    }
}
