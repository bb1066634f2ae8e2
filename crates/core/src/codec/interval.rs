use super::{codec_for, decode_value, encode_value, CodecContext, LeafInput, ValueCodec};
use crate::fragment::Fragment;
use crate::schema::ValueConstraint;
use crate::{ConversionError, ConversionResult};
use openehr::{DataValue, DvInterval, RmType};

pub(crate) struct IntervalCodec;

const BOUNDS: &[&str] = &["lower", "upper"];

fn decode_bound(
    base: RmType,
    input: &LeafInput<'_>,
    bound: &str,
    constraint: &ValueConstraint,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<DataValue>> {
    let Some(node) = input.node().first_child(bound) else {
        return Ok(None);
    };
    let path = format!("{}/{bound}", input.path());

    let shared_unit = input.get("unit").filter(|_| node.attr("unit").is_none());
    let accepts_unit = codec_for(base).is_some_and(|codec| codec.attributes().contains(&"unit"));
    match shared_unit {
        Some(unit) if accepts_unit => {
            let mut node = node.clone();
            node.attrs.insert("unit".to_string(), unit.clone());
            decode_value(base, &path, &node, constraint, ctx)
        }
        _ => decode_value(base, &path, node, constraint, ctx),
    }
}

/// Decodes the `lower` and `upper` children of `input` as an interval of `base` values.
pub(crate) fn decode_bounds(
    base: RmType,
    input: &LeafInput<'_>,
    constraint: &ValueConstraint,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<DvInterval>> {
    if let Some((name, _)) = input
        .node()
        .children
        .iter()
        .find(|(name, _)| !name.starts_with('_') && !BOUNDS.contains(&name.as_str()))
    {
        return Err(ConversionError::path_resolution(
            format!("{}/{name}", input.path()),
            "intervals only have lower and upper bounds",
        ));
    }

    let lower = decode_bound(base, input, "lower", constraint, ctx)?;
    let upper = decode_bound(base, input, "upper", constraint, ctx)?;
    if lower.is_none() && upper.is_none() {
        return Ok(None);
    }

    let lower_included = input
        .boolean("lower_included", RmType::DvInterval)?
        .or(lower.is_some().then_some(true));
    let upper_included = input
        .boolean("upper_included", RmType::DvInterval)?
        .or(upper.is_some().then_some(true));
    let mut interval = DvInterval::new(lower, upper);
    interval.lower_included = lower_included;
    interval.upper_included = upper_included;
    Ok(Some(interval))
}

/// Writes the bounds of `interval` as `lower` and `upper` children of `out`.
pub(crate) fn encode_bounds(
    interval: &DvInterval,
    constraint: &ValueConstraint,
    out: &mut Fragment,
) {
    for (name, bound, included) in [
        ("lower", &interval.lower, interval.lower_included),
        ("upper", &interval.upper, interval.upper_included),
    ] {
        let Some(bound) = bound else {
            continue;
        };
        let mut child = Fragment::new();
        encode_value(bound, constraint, &mut child);
        out.push_child(name, false, child);
        if included != Some(true) {
            out.set_opt(&format!("{name}_included"), included);
        }
    }
}

impl ValueCodec for IntervalCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvInterval
    }

    fn attributes(&self) -> &'static [&'static str] {
        &["lower_included", "upper_included", "unit"]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        None
    }

    fn children(&self) -> &'static [&'static str] {
        BOUNDS
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        constraint: &ValueConstraint,
        ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let base = constraint.interval_of.unwrap_or(RmType::DvQuantity);
        Ok(decode_bounds(base, input, constraint, ctx)?.map(DataValue::Interval))
    }

    fn encode(&self, value: &DataValue, constraint: &ValueConstraint, out: &mut Fragment) {
        if let DataValue::Interval(interval) = value {
            encode_bounds(interval, constraint, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{decode, encode, node};
    use super::*;
    use crate::payload::PayloadNode;
    use crate::schema::UnitConstraint;
    use flatehr_types::Scalar;
    use indexmap::IndexMap;
    use std::collections::BTreeMap;

    fn range(lower: f64, upper: f64, unit: &str) -> PayloadNode {
        let mut children = IndexMap::new();
        for (name, magnitude) in [("lower", lower), ("upper", upper)] {
            let mut instances = BTreeMap::new();
            instances.insert(0, node(&[("magnitude", Scalar::Decimal(magnitude))]));
            children.insert(name.to_string(), instances);
        }
        PayloadNode {
            attrs: [("unit".to_string(), Scalar::text(unit))].into_iter().collect(),
            children,
        }
    }

    #[test]
    fn shared_unit_reaches_both_bounds() {
        let constraint = ValueConstraint {
            interval_of: Some(RmType::DvQuantity),
            units: vec![UnitConstraint {
                unit: "mmol/l".into(),
                precision: None,
            }],
            ..ValueConstraint::default()
        };
        let value = decode(RmType::DvInterval, &range(3.5, 5.5, "mmol/l"), &constraint)
            .expect("decoded")
            .expect("interval");
        let DataValue::Interval(interval) = &value else {
            panic!("expected DV_INTERVAL");
        };
        assert!(matches!(
            interval.upper.as_deref(),
            Some(DataValue::Quantity(q)) if q.magnitude == 5.5 && q.units == "mmol/l"
        ));
        assert_eq!(interval.lower_included, Some(true));

        let out = encode(&value, &constraint);
        assert_eq!(out.children["lower"].instances.len(), 1);
        assert!(out.attrs.get("lower_included").is_none());
    }

    #[test]
    fn unknown_child_is_rejected() {
        let mut input = range(1.0, 2.0, "mmol/l");
        input.children.insert("middle".into(), BTreeMap::new());
        let err = decode(RmType::DvInterval, &input, &ValueConstraint::default())
            .expect_err("unknown child");
        assert!(matches!(err, ConversionError::PathResolution { .. }));
    }
}
