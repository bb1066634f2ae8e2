//! Element annotations: null flavour, term mappings and reference ranges.
//!
//! Annotations live in `_`-prefixed children of an element's payload node, next to the value
//! literals. They are decoded after the value, because reference ranges take the value's type,
//! and folded into the `ELEMENT` together with it.

use crate::codec::{
    self, check_attributes, decode_code_phrase, decode_value, encode_code_phrase, encode_value,
    CodecContext, LeafInput,
};
use crate::constants::DEFAULT_MAPPING_MATCH;
use crate::fragment::Fragment;
use crate::path::MetaKind;
use crate::payload::PayloadNode;
use crate::schema::ValueConstraint;
use crate::terminology::{null_flavour_code, null_flavour_rubric};
use crate::{ConversionError, ConversionResult};
use openehr::rm_1_1_0::constants::TERMINOLOGY_OPENEHR;
use openehr::{
    DataValue, DvCodedText, DvInterval, DvText, Element, ReferenceRange, RmType, TermMapping,
};

const MAPPING_MATCHES: &[&str] = &["=", "<", ">", "?"];

const NULL_FLAVOUR_ATTRIBUTES: &[&str] = &["code", "value", "terminology"];

const RANGE_ATTRIBUTES: &[&str] = &["lower_included", "upper_included", "unit"];

/// Annotations decoded from one element node.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Annotations {
    pub null_flavour: Option<DvCodedText>,
    pub null_reason: Option<DvText>,
    pub mappings: Vec<TermMapping>,
    pub normal_range: Option<DvInterval>,
    pub other_ranges: Vec<ReferenceRange>,
}

fn meta_path(path: &str, kind: MetaKind, index: Option<usize>) -> String {
    match index {
        Some(index) => format!("{path}/{}:{index}", kind.name()),
        None => format!("{path}/{}", kind.name()),
    }
}

fn decode_null_flavour(path: &str, node: &PayloadNode) -> ConversionResult<Option<DvCodedText>> {
    check_attributes(path, node, RmType::DvCodedText, NULL_FLAVOUR_ATTRIBUTES, Some("value"))?;
    let input = LeafInput::new(path, node, Some("value"));
    if let Some(terminology) = input.text("terminology") {
        if terminology != TERMINOLOGY_OPENEHR {
            return Err(input.vocabulary(
                "terminology",
                &terminology,
                "null flavours are coded in the openehr terminology",
            ));
        }
    }
    let (code, rubric) = match (input.text("code"), input.text("value")) {
        (Some(code), value) => {
            let rubric = null_flavour_rubric(&code)
                .ok_or_else(|| input.vocabulary("code", &code, "unknown null flavour"))?;
            (code, value.unwrap_or_else(|| rubric.to_string()))
        }
        (None, Some(value)) => {
            let code = null_flavour_code(&value)
                .ok_or_else(|| input.vocabulary("value", &value, "unknown null flavour"))?;
            (code.to_string(), value)
        }
        (None, None) => return Ok(None),
    };
    Ok(Some(DvCodedText::new(rubric, TERMINOLOGY_OPENEHR, code)))
}

fn reject_unknown_children(path: &str, node: &PayloadNode, known: &[&str]) -> ConversionResult<()> {
    match node.children.keys().find(|name| !known.contains(&name.as_str())) {
        Some(name) => Err(ConversionError::path_resolution(
            format!("{path}/{name}"),
            "unknown child of an element annotation",
        )),
        None => Ok(()),
    }
}

fn decode_mapping(
    path: &str,
    node: &PayloadNode,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<TermMapping>> {
    check_attributes(path, node, RmType::DvText, &[], None)?;
    reject_unknown_children(path, node, &["match", "target", "purpose"])?;

    let target = match node.first_child("target") {
        Some(target) => decode_code_phrase(&format!("{path}/target"), target, "")?,
        None => None,
    };
    let Some(target) = target else {
        if node.has_values() {
            return Err(ConversionError::vocabulary(
                format!("{path}/target|code"),
                "",
                "a term mapping needs a target code",
            ));
        }
        return Ok(None);
    };
    if target.terminology().is_empty() {
        return Err(ConversionError::vocabulary(
            format!("{path}/target|terminology"),
            target.code_string.as_str(),
            "a term mapping target needs a terminology",
        ));
    }

    let match_ = match node.first_child("match") {
        Some(literal) => {
            let match_path = format!("{path}/match");
            let input = LeafInput::new(&match_path, literal, Some("value"));
            input.text("value")
        }
        None => None,
    }
    .unwrap_or_else(|| DEFAULT_MAPPING_MATCH.to_string());
    if !MAPPING_MATCHES.contains(&match_.as_str()) {
        return Err(ConversionError::vocabulary(
            format!("{path}/match"),
            match_,
            "mapping match must be one of =, <, > or ?",
        ));
    }

    let purpose = match node.first_child("purpose") {
        Some(purpose) => {
            let purpose_path = format!("{path}/purpose");
            let code = purpose.attr("code").filter(|code| !code.is_blank());
            let display = purpose.attr("value").filter(|value| !value.is_blank());
            if let (Some(code), None) = (code, display) {
                return Err(ConversionError::vocabulary(
                    format!("{purpose_path}|value"),
                    code.as_text(),
                    "a mapping purpose code needs a display value",
                ));
            }
            match decode_value(
                RmType::DvCodedText,
                &purpose_path,
                purpose,
                &ValueConstraint::default(),
                ctx,
            )? {
                Some(DataValue::CodedText(coded)) => Some(coded),
                _ => None,
            }
        }
        None => None,
    };

    Ok(Some(TermMapping {
        class: Default::default(),
        match_,
        purpose,
        target,
    }))
}

fn decode_range(
    path: &str,
    node: &PayloadNode,
    base: RmType,
    constraint: &ValueConstraint,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<DvInterval>> {
    check_attributes(path, node, RmType::DvInterval, RANGE_ATTRIBUTES, None)?;
    let input = LeafInput::new(path, node, None);
    codec::decode_bounds(base, &input, constraint, ctx)
}

fn decode_reference_range(
    path: &str,
    node: &PayloadNode,
    base: RmType,
    constraint: &ValueConstraint,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<ReferenceRange>> {
    reject_unknown_children(path, node, &["meaning", "lower", "upper"])?;
    let meaning = match node.first_child("meaning") {
        Some(meaning) => decode_value(
            RmType::DvText,
            &format!("{path}/meaning"),
            meaning,
            &ValueConstraint::default(),
            ctx,
        )?
        .and_then(|value| value.as_text()),
        None => None,
    };

    let mut bounds = node.clone();
    bounds.children.shift_remove("meaning");
    let range = decode_range(path, &bounds, base, constraint, ctx)?;

    match (meaning, range) {
        (Some(meaning), Some(range)) => Ok(Some(ReferenceRange {
            class: Default::default(),
            meaning,
            range,
        })),
        (None, None) => Ok(None),
        (None, Some(_)) => Err(ConversionError::vocabulary(
            format!("{path}/meaning"),
            "",
            "a reference range needs a meaning",
        )),
        (Some(meaning), None) => Err(ConversionError::vocabulary(
            format!("{path}/lower"),
            meaning.value(),
            "a reference range needs a bound",
        )),
    }
}

impl Annotations {
    /// Reads the annotation children of an element node. `value` is the already decoded value,
    /// whose type reference ranges use.
    pub(crate) fn decode(
        path: &str,
        node: &PayloadNode,
        value: Option<&DataValue>,
        constraint: &ValueConstraint,
        ctx: &CodecContext<'_>,
    ) -> ConversionResult<Self> {
        let mut annotations = Annotations::default();
        let base = value.map(codec::value_type).unwrap_or(RmType::DvQuantity);

        if let Some(node) = node.first_child(MetaKind::NullFlavour.name()) {
            let path = meta_path(path, MetaKind::NullFlavour, None);
            annotations.null_flavour = decode_null_flavour(&path, node)?;
        }
        if let Some(node) = node.first_child(MetaKind::NullReason.name()) {
            let path = meta_path(path, MetaKind::NullReason, None);
            check_attributes(&path, node, RmType::DvText, &["value"], Some("value"))?;
            annotations.null_reason = LeafInput::new(&path, node, Some("value"))
                .text("value")
                .map(DvText::new);
        }
        if let Some(instances) = node.child(MetaKind::Mapping.name()) {
            for (index, node) in instances {
                let path = meta_path(path, MetaKind::Mapping, Some(*index));
                annotations.mappings.extend(decode_mapping(&path, node, ctx)?);
            }
        }
        if let Some(node) = node.first_child(MetaKind::NormalRange.name()) {
            let path = meta_path(path, MetaKind::NormalRange, None);
            annotations.normal_range = decode_range(&path, node, base, constraint, ctx)?;
        }
        if let Some(instances) = node.child(MetaKind::OtherReferenceRanges.name()) {
            for (index, node) in instances {
                let path = meta_path(path, MetaKind::OtherReferenceRanges, Some(*index));
                annotations
                    .other_ranges
                    .extend(decode_reference_range(&path, node, base, constraint, ctx)?);
            }
        }
        Ok(annotations)
    }

    fn has_value_annotations(&self) -> bool {
        !self.mappings.is_empty() || self.normal_range.is_some() || !self.other_ranges.is_empty()
    }

    /// Folds the annotations and `value` into `element`. A null flavour wins over a value.
    ///
    /// # Errors
    ///
    /// [`ConversionError::Vocabulary`] when mappings annotate a non-text value or reference
    /// ranges annotate a value that cannot carry them.
    pub(crate) fn apply(
        self,
        path: &str,
        value: Option<DataValue>,
        element: &mut Element,
    ) -> ConversionResult<()> {
        if let Some(null_flavour) = self.null_flavour {
            if value.is_some() {
                tracing::warn!(path, "null flavour given together with a value; value dropped");
            }
            element.value = None;
            element.null_flavour = Some(null_flavour);
            element.null_reason = self.null_reason;
            return Ok(());
        }
        if self.null_reason.is_some() {
            tracing::debug!(path, "null reason without null flavour ignored");
        }

        let Some(mut value) = value else {
            if self.has_value_annotations() {
                tracing::trace!(path, "annotations without a value ignored");
            }
            element.value = None;
            return Ok(());
        };

        if !self.mappings.is_empty() {
            match &mut value {
                DataValue::Text(text) => text.mappings.extend(self.mappings),
                DataValue::CodedText(text) => text.mappings.extend(self.mappings),
                other => {
                    return Err(ConversionError::vocabulary(
                        meta_path(path, MetaKind::Mapping, Some(0)),
                        other.rm_class(),
                        "term mappings only annotate text values",
                    ));
                }
            }
        }

        if self.normal_range.is_some() || !self.other_ranges.is_empty() {
            let (normal_range, other_ranges) = match &mut value {
                DataValue::Quantity(quantity) => {
                    (&mut quantity.normal_range, &mut quantity.other_reference_ranges)
                }
                DataValue::Count(count) => {
                    (&mut count.normal_range, &mut count.other_reference_ranges)
                }
                other => {
                    return Err(ConversionError::vocabulary(
                        meta_path(path, MetaKind::NormalRange, None),
                        other.rm_class(),
                        "reference ranges only annotate quantities and counts",
                    ));
                }
            };
            if self.normal_range.is_some() {
                *normal_range = self.normal_range;
            }
            other_ranges.extend(self.other_ranges);
        }

        element.value = Some(value);
        element.null_flavour = None;
        element.null_reason = None;
        Ok(())
    }
}

fn encode_coded(coded: &DvCodedText, out: &mut Fragment) {
    out.set("code", coded.code());
    out.set("value", coded.value.as_str());
    out.set("terminology", coded.terminology());
}

fn encode_mapping(mapping: &TermMapping) -> Fragment {
    let mut out = Fragment::new();
    let mut match_ = Fragment::with_bare_name(Some("value"));
    match_.bare(mapping.match_.as_str());
    out.push_child("match", false, match_);

    let mut target = Fragment::new();
    encode_code_phrase(&mapping.target, &mut target);
    out.push_child("target", false, target);

    if let Some(purpose) = &mapping.purpose {
        let mut fragment = Fragment::new();
        encode_coded(purpose, &mut fragment);
        out.push_child("purpose", false, fragment);
    }
    out
}

fn encode_range(range: &DvInterval, constraint: &ValueConstraint) -> Fragment {
    let mut out = Fragment::new();
    codec::encode_bounds(range, constraint, &mut out);
    out
}

/// Writes the annotations of `element` as `_` children of `out`.
pub(crate) fn encode_annotations(
    element: &Element,
    constraint: &ValueConstraint,
    out: &mut Fragment,
) {
    if let Some(null_flavour) = &element.null_flavour {
        let mut fragment = Fragment::new();
        encode_coded(null_flavour, &mut fragment);
        out.push_child(MetaKind::NullFlavour.name(), false, fragment);
        if let Some(reason) = &element.null_reason {
            let mut fragment = Fragment::with_bare_name(Some("value"));
            fragment.bare(reason.value.as_str());
            out.push_child(MetaKind::NullReason.name(), false, fragment);
        }
    }

    let Some(value) = &element.value else {
        return;
    };
    let mappings = match value {
        DataValue::Text(text) => text.mappings.as_slice(),
        DataValue::CodedText(text) => text.mappings.as_slice(),
        _ => &[],
    };
    for mapping in mappings {
        out.push_child(MetaKind::Mapping.name(), true, encode_mapping(mapping));
    }

    let (normal_range, other_ranges) = match value {
        DataValue::Quantity(quantity) => {
            (&quantity.normal_range, quantity.other_reference_ranges.as_slice())
        }
        DataValue::Count(count) => (&count.normal_range, count.other_reference_ranges.as_slice()),
        _ => return,
    };
    if let Some(range) = normal_range {
        out.push_child(
            MetaKind::NormalRange.name(),
            false,
            encode_range(range, constraint),
        );
    }
    for range in other_ranges {
        let mut fragment = Fragment::new();
        let mut meaning = Fragment::new();
        encode_value(
            &DataValue::from(range.meaning.clone()),
            &ValueConstraint::default(),
            &mut meaning,
        );
        fragment.push_child("meaning", false, meaning);
        codec::encode_bounds(&range.range, constraint, &mut fragment);
        out.push_child(MetaKind::OtherReferenceRanges.name(), true, fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::test_support::node;
    use crate::locale::StandardLocale;
    use chrono::{Offset, Utc};
    use flatehr_types::Scalar;
    use indexmap::IndexMap;
    use openehr::{DvQuantity, Locatable};
    use std::collections::BTreeMap;

    fn with_children(children: &[(&str, usize, PayloadNode)]) -> PayloadNode {
        let mut map: IndexMap<String, BTreeMap<usize, PayloadNode>> = IndexMap::new();
        for (name, index, child) in children {
            map.entry(name.to_string())
                .or_default()
                .insert(*index, child.clone());
        }
        PayloadNode {
            attrs: IndexMap::new(),
            children: map,
        }
    }

    fn decode(node: &PayloadNode, value: Option<&DataValue>) -> ConversionResult<Annotations> {
        let locale = StandardLocale::for_tag("en");
        let ctx = CodecContext {
            locale: &locale,
            zone: Utc.fix(),
        };
        Annotations::decode("obs/element", node, value, &ValueConstraint::default(), &ctx)
    }

    fn blank_element() -> Element {
        Element::new(Locatable::new("at0004", "Temperature"))
    }

    fn temperature() -> DataValue {
        DataValue::Quantity(DvQuantity {
            magnitude: 37.2,
            units: "°C".into(),
            ..DvQuantity::default()
        })
    }

    #[test]
    fn null_flavour_by_code_or_rubric() {
        for attrs in [
            vec![("code", Scalar::text("271"))],
            vec![("value", Scalar::text("no information"))],
        ] {
            let input = with_children(&[("_null_flavour", 0, node(&attrs))]);
            let annotations = decode(&input, None).expect("decoded");
            let flavour = annotations.null_flavour.expect("null flavour");
            assert_eq!(flavour.code(), "271");
            assert_eq!(flavour.value, "no information");
        }

        let input = with_children(&[("_null_flavour", 0, node(&[("code", Scalar::text("433"))]))]);
        let err = decode(&input, None).expect_err("not a null flavour");
        assert!(matches!(err, ConversionError::Vocabulary { .. }));
    }

    #[test]
    fn null_flavour_wins_over_value() {
        let input = with_children(&[("_null_flavour", 0, node(&[("code", Scalar::text("253"))]))]);
        let value = temperature();
        let annotations = decode(&input, Some(&value)).expect("decoded");
        let mut element = blank_element();
        annotations
            .apply("obs/element", Some(value), &mut element)
            .expect("applied");
        assert!(element.value.is_none());
        assert_eq!(element.null_flavour.as_ref().map(|f| f.code()), Some("253"));
    }

    #[test]
    fn mappings_only_on_text() {
        let mapping = with_children(&[
            ("target", 0, node(&[("code", Scalar::text("386661006")), ("terminology", Scalar::text("SNOMED-CT"))])),
            ("match", 0, node(&[("", Scalar::text("="))])),
        ]);
        let input = with_children(&[("_mapping", 0, mapping)]);

        let text = DataValue::Text(DvText::new("Fever"));
        let annotations = decode(&input, Some(&text)).expect("decoded");
        let mut element = blank_element();
        annotations
            .clone()
            .apply("obs/element", Some(text), &mut element)
            .expect("applied");
        let Some(DataValue::Text(text)) = &element.value else {
            panic!("expected text value");
        };
        assert_eq!(text.mappings.len(), 1);
        assert_eq!(text.mappings[0].match_, "=");

        let err = annotations
            .apply("obs/element", Some(temperature()), &mut blank_element())
            .expect_err("mapping on a quantity");
        assert!(matches!(err, ConversionError::Vocabulary { .. }));
    }

    #[test]
    fn mapping_purpose_code_needs_a_display_value() {
        let target = node(&[
            ("code", Scalar::text("386661006")),
            ("terminology", Scalar::text("SNOMED-CT")),
        ]);
        let text = DataValue::Text(DvText::new("Fever"));

        let bare_code = with_children(&[(
            "_mapping",
            0,
            with_children(&[
                ("target", 0, target.clone()),
                (
                    "purpose",
                    0,
                    node(&[
                        ("code", Scalar::text("999")),
                        ("terminology", Scalar::text("local")),
                    ]),
                ),
            ]),
        )]);
        let err = decode(&bare_code, Some(&text)).expect_err("purpose without display value");
        assert!(matches!(
            err,
            ConversionError::Vocabulary { ref path, ref literal, .. }
                if path == "obs/element/_mapping:0/purpose|value" && literal == "999"
        ));

        let labelled = with_children(&[(
            "_mapping",
            0,
            with_children(&[
                ("target", 0, target),
                (
                    "purpose",
                    0,
                    node(&[
                        ("code", Scalar::text("999")),
                        ("value", Scalar::text("Billing")),
                        ("terminology", Scalar::text("local")),
                    ]),
                ),
            ]),
        )]);
        let annotations = decode(&labelled, Some(&text)).expect("decoded");
        let purpose = annotations.mappings[0].purpose.as_ref().expect("purpose");
        assert_eq!(purpose.value, "Billing");
        assert_eq!(purpose.code(), "999");
    }

    #[test]
    fn normal_range_round_trip() {
        let range = PayloadNode {
            attrs: [("unit".to_string(), Scalar::text("°C"))].into_iter().collect(),
            children: with_children(&[
                ("lower", 0, node(&[("magnitude", Scalar::Decimal(36.0))])),
                ("upper", 0, node(&[("magnitude", Scalar::Decimal(37.5))])),
            ])
            .children,
        };
        let input = with_children(&[("_normal_range", 0, range)]);
        let value = temperature();
        let annotations = decode(&input, Some(&value)).expect("decoded");
        let mut element = blank_element();
        annotations
            .apply("obs/element", Some(value), &mut element)
            .expect("applied");

        let mut out = Fragment::new();
        encode_annotations(&element, &ValueConstraint::default(), &mut out);
        let range = &out.children["_normal_range"].instances[0];
        assert_eq!(
            range.children["upper"].instances[0].attrs.get("magnitude"),
            Some(&Scalar::Decimal(37.5))
        );
    }
}
