use super::{CodecContext, LeafInput, ValueCodec};
use crate::fragment::Fragment;
use crate::schema::ValueConstraint;
use crate::ConversionResult;
use flatehr_types::Scalar;
use openehr::rm_1_1_0::constants::TERMINOLOGY_NORMAL_STATUS;
use openehr::{CodePhrase, DataValue, DvCount, DvProportion, DvQuantity, RmType};

pub(crate) struct QuantityCodec;

pub(crate) struct CountCodec;

pub(crate) struct ProportionCodec;

const MAGNITUDE_STATUSES: &[&str] = &["=", "<", ">", "<=", ">=", "~"];

const NORMAL_STATUSES: &[&str] = &["HHH", "HH", "H", "N", "L", "LL", "LLL"];

/// Accuracy and status attributes shared by quantities and counts.
struct Qualifiers {
    magnitude_status: Option<String>,
    accuracy: Option<f64>,
    accuracy_is_percent: Option<bool>,
    normal_status: Option<CodePhrase>,
}

fn qualifiers(
    input: &LeafInput<'_>,
    rm_type: RmType,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Qualifiers> {
    let magnitude_status = input.text("magnitude_status");
    if let Some(status) = &magnitude_status {
        if !MAGNITUDE_STATUSES.contains(&status.as_str()) {
            return Err(input.vocabulary("magnitude_status", status, "unknown magnitude status"));
        }
    }
    let normal_status = match input.text("normal_status") {
        Some(code) if NORMAL_STATUSES.contains(&code.as_str()) => {
            Some(CodePhrase::new(TERMINOLOGY_NORMAL_STATUS, code))
        }
        Some(code) => {
            return Err(input.vocabulary("normal_status", &code, "unknown normal status"));
        }
        None => None,
    };
    Ok(Qualifiers {
        magnitude_status,
        accuracy: input.decimal("accuracy", rm_type, ctx)?,
        accuracy_is_percent: input.boolean("accuracy_is_percent", rm_type)?,
        normal_status,
    })
}

fn encode_qualifiers(
    out: &mut Fragment,
    magnitude_status: &Option<String>,
    accuracy: Option<f64>,
    accuracy_is_percent: Option<bool>,
    normal_status: &Option<CodePhrase>,
) {
    out.set_opt("magnitude_status", magnitude_status.as_deref());
    out.set_opt("accuracy", accuracy);
    out.set_opt("accuracy_is_percent", accuracy_is_percent);
    out.set_opt(
        "normal_status",
        normal_status.as_ref().map(|status| status.code_string.as_str()),
    );
}

impl ValueCodec for QuantityCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvQuantity
    }

    fn attributes(&self) -> &'static [&'static str] {
        &[
            "magnitude",
            "unit",
            "precision",
            "units_system",
            "units_display_name",
            "magnitude_status",
            "accuracy",
            "accuracy_is_percent",
            "normal_status",
        ]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        Some("magnitude")
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        constraint: &ValueConstraint,
        ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let Some(magnitude) = input.decimal("magnitude", RmType::DvQuantity, ctx)? else {
            return Ok(None);
        };

        let units = match input.text("unit") {
            Some(unit) => {
                if !constraint.units.is_empty() && constraint.unit(&unit).is_none() {
                    return Err(input.vocabulary("unit", &unit, "unit is not allowed here"));
                }
                unit
            }
            None => match constraint.units.as_slice() {
                [only] => only.unit.clone(),
                _ => return Err(input.vocabulary("unit", "", "unit required")),
            },
        };

        let precision = match input.integer("precision", RmType::DvQuantity)? {
            Some(precision) => Some(precision),
            None => constraint.unit(&units).and_then(|unit| unit.precision),
        };
        let qualifiers = qualifiers(input, RmType::DvQuantity, ctx)?;

        Ok(Some(DataValue::Quantity(DvQuantity {
            magnitude,
            units,
            precision,
            units_system: input.text("units_system"),
            units_display_name: input.text("units_display_name"),
            magnitude_status: qualifiers.magnitude_status,
            accuracy: qualifiers.accuracy,
            accuracy_is_percent: qualifiers.accuracy_is_percent,
            normal_status: qualifiers.normal_status,
            ..DvQuantity::default()
        })))
    }

    fn encode(&self, value: &DataValue, constraint: &ValueConstraint, out: &mut Fragment) {
        let DataValue::Quantity(quantity) = value else {
            return;
        };
        out.set("magnitude", quantity.magnitude);
        out.set("unit", quantity.units.as_str());
        let implied = constraint
            .unit(&quantity.units)
            .and_then(|unit| unit.precision);
        if quantity.precision != implied {
            out.set_opt("precision", quantity.precision);
        }
        out.set_opt("units_system", quantity.units_system.as_deref());
        out.set_opt("units_display_name", quantity.units_display_name.as_deref());
        encode_qualifiers(
            out,
            &quantity.magnitude_status,
            quantity.accuracy,
            quantity.accuracy_is_percent,
            &quantity.normal_status,
        );
    }
}

impl ValueCodec for CountCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvCount
    }

    fn attributes(&self) -> &'static [&'static str] {
        &[
            "magnitude",
            "magnitude_status",
            "accuracy",
            "accuracy_is_percent",
            "normal_status",
        ]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        Some("magnitude")
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        _constraint: &ValueConstraint,
        ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let Some(magnitude) = input.integer("magnitude", RmType::DvCount)? else {
            return Ok(None);
        };
        let qualifiers = qualifiers(input, RmType::DvCount, ctx)?;
        Ok(Some(DataValue::Count(DvCount {
            magnitude,
            magnitude_status: qualifiers.magnitude_status,
            accuracy: qualifiers.accuracy,
            accuracy_is_percent: qualifiers.accuracy_is_percent,
            normal_status: qualifiers.normal_status,
            ..DvCount::default()
        })))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        let DataValue::Count(count) = value else {
            return;
        };
        out.bare(Scalar::Integer(count.magnitude));
        encode_qualifiers(
            out,
            &count.magnitude_status,
            count.accuracy,
            count.accuracy_is_percent,
            &count.normal_status,
        );
    }
}

impl ValueCodec for ProportionCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvProportion
    }

    fn attributes(&self) -> &'static [&'static str] {
        &["numerator", "denominator", "type", "precision"]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        None
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        constraint: &ValueConstraint,
        ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let numerator = input.decimal("numerator", RmType::DvProportion, ctx)?;
        let denominator = input.decimal("denominator", RmType::DvProportion, ctx)?;
        let (numerator, denominator) = match (numerator, denominator) {
            (None, None) => return Ok(None),
            (Some(numerator), Some(denominator)) => (numerator, denominator),
            (Some(numerator), None) => {
                return Err(input.coercion(
                    "denominator",
                    &Scalar::Decimal(numerator),
                    RmType::DvProportion,
                    "numerator and denominator are required together",
                ));
            }
            (None, Some(denominator)) => {
                return Err(input.coercion(
                    "numerator",
                    &Scalar::Decimal(denominator),
                    RmType::DvProportion,
                    "numerator and denominator are required together",
                ));
            }
        };

        let type_ = match input.integer("type", RmType::DvProportion)? {
            Some(type_) => {
                if !constraint.proportion_types.is_empty()
                    && !constraint.proportion_types.contains(&type_)
                {
                    return Err(input.vocabulary(
                        "type",
                        &type_.to_string(),
                        "proportion kind is not allowed here",
                    ));
                }
                type_
            }
            None => constraint.proportion_types.first().copied().unwrap_or(0),
        };

        Ok(Some(DataValue::Proportion(DvProportion {
            numerator,
            denominator,
            type_,
            precision: input.integer("precision", RmType::DvProportion)?,
            ..DvProportion::default()
        })))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        let DataValue::Proportion(proportion) = value else {
            return;
        };
        out.set("numerator", proportion.numerator);
        out.set("denominator", proportion.denominator);
        out.set("type", Scalar::Integer(proportion.type_));
        out.set_opt("precision", proportion.precision.map(Scalar::Integer));
    }
}
