use super::{CodecContext, LeafInput, ValueCodec};
use crate::fragment::Fragment;
use crate::schema::ValueConstraint;
use crate::ConversionResult;
use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc,
};
use flatehr_types::{Scalar, Temporal};
use openehr::{DataValue, DvDate, DvDateTime, DvDuration, DvTime, RmType};
use regex::Regex;
use std::sync::OnceLock;

pub(crate) struct DurationCodec;

pub(crate) struct DateCodec;

pub(crate) struct TimeCodec;

pub(crate) struct DateTimeCodec;

const DURATION_PARTS: &[(&str, &str)] = &[
    ("year", "Y"),
    ("month", "M"),
    ("week", "W"),
    ("day", "D"),
    ("hour", "H"),
    ("minute", "M"),
    ("second", "S"),
];

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^-?P(\d+Y)?(\d+M)?(\d+W)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$",
        )
        .expect("duration pattern compiles")
    })
}

fn partial_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}(-\d{2})?$").expect("partial date pattern compiles"))
}

fn partial_date_time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4}(-\d{2}(-\d{2}(T\d{2})?)?)?$").expect("partial date-time pattern compiles")
    })
}

fn partial_time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{2}$").expect("partial time pattern compiles"))
}

/// `true` for an ISO 8601 duration with at least one component.
pub(crate) fn is_iso_duration(literal: &str) -> bool {
    let Some(captures) = duration_pattern().captures(literal) else {
        return false;
    };
    let designators = [1, 2, 3, 4, 6, 7, 8];
    let any = designators.iter().any(|&i| captures.get(i).is_some());
    let empty_time = captures.get(5).is_some()
        && captures.get(6).is_none()
        && captures.get(7).is_none()
        && captures.get(8).is_none();
    any && !empty_time
}

fn format_date_time(value: DateTime<FixedOffset>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

fn localize(value: NaiveDateTime, zone: FixedOffset) -> Option<DateTime<FixedOffset>> {
    zone.from_local_datetime(&value).single()
}

fn from_epoch_millis(millis: i64, zone: FixedOffset) -> Option<DateTime<FixedOffset>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|utc| utc.with_timezone(&zone))
}

const LOCAL_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];

fn parse_date_time(literal: &str, zone: FixedOffset) -> Option<DateTime<FixedOffset>> {
    if let Ok(value) = DateTime::parse_from_rfc3339(literal) {
        return Some(value);
    }
    for format in OFFSET_DATE_TIME_FORMATS {
        if let Ok(value) = DateTime::parse_from_str(literal, format) {
            return Some(value);
        }
    }
    LOCAL_DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(literal, format).ok())
        .and_then(|value| localize(value, zone))
}

impl ValueCodec for DurationCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvDuration
    }

    fn attributes(&self) -> &'static [&'static str] {
        &[
            "value", "year", "month", "week", "day", "hour", "minute", "second",
        ]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        Some("value")
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        _constraint: &ValueConstraint,
        ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        if let Some(literal) = input.get("value") {
            let text = literal.as_text();
            let text = text.trim();
            if !is_iso_duration(text) {
                return Err(input.coercion(
                    "value",
                    literal,
                    RmType::DvDuration,
                    "ISO 8601 duration expected",
                ));
            }
            return Ok(Some(DataValue::Duration(DvDuration {
                value: text.to_string(),
                ..DvDuration::default()
            })));
        }

        let mut date = String::new();
        let mut time = String::new();
        for (index, (attribute, designator)) in DURATION_PARTS.iter().enumerate() {
            let amount = if *attribute == "second" {
                input
                    .decimal(attribute, RmType::DvDuration, ctx)?
                    .map(|seconds| seconds.to_string())
            } else {
                input
                    .integer(attribute, RmType::DvDuration)?
                    .map(|amount| amount.to_string())
            };
            let Some(amount) = amount else {
                continue;
            };
            if amount.starts_with('-') {
                return Err(input.coercion(
                    attribute,
                    &Scalar::text(amount.as_str()),
                    RmType::DvDuration,
                    "duration components must not be negative",
                ));
            }
            let target = if index < 4 { &mut date } else { &mut time };
            target.push_str(&amount);
            target.push_str(designator);
        }
        if date.is_empty() && time.is_empty() {
            return Ok(None);
        }
        let value = if time.is_empty() {
            format!("P{date}")
        } else {
            format!("P{date}T{time}")
        };
        Ok(Some(DataValue::Duration(DvDuration {
            value,
            ..DvDuration::default()
        })))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        if let DataValue::Duration(duration) = value {
            out.bare(duration.value.as_str());
        }
    }
}

impl ValueCodec for DateCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvDate
    }

    fn attributes(&self) -> &'static [&'static str] {
        &["value"]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        Some("value")
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        constraint: &ValueConstraint,
        ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let Some(literal) = input.get("value") else {
            return Ok(None);
        };
        let date = match literal {
            Scalar::Temporal(Temporal::Date(date)) => Some(*date),
            Scalar::Temporal(Temporal::DateTime(value)) => Some(value.date_naive()),
            Scalar::Temporal(Temporal::LocalDateTime(value)) => Some(value.date()),
            Scalar::Integer(year) if constraint.partial && (1000..=9999).contains(year) => {
                return Ok(Some(DataValue::Date(DvDate {
                    value: year.to_string(),
                    ..DvDate::default()
                })));
            }
            Scalar::Integer(millis) => from_epoch_millis(*millis, ctx.zone).map(|v| v.date_naive()),
            Scalar::Text(text) => {
                let text = text.trim();
                if constraint.partial && partial_date_pattern().is_match(text) {
                    return Ok(Some(DataValue::Date(DvDate {
                        value: text.to_string(),
                        ..DvDate::default()
                    })));
                }
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .or_else(|| parse_date_time(text, ctx.zone).map(|v| v.date_naive()))
                    .or_else(|| ctx.locale.date(text))
            }
            _ => None,
        };
        let date = date.ok_or_else(|| {
            input.coercion("value", literal, RmType::DvDate, "ISO 8601 date expected")
        })?;
        Ok(Some(DataValue::Date(DvDate {
            value: date.format("%Y-%m-%d").to_string(),
            ..DvDate::default()
        })))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        if let DataValue::Date(date) = value {
            out.bare(date.value.as_str());
        }
    }
}

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S%.f").to_string()
}

/// Splits a trailing `Z` or `±hh:mm` zone designator off a time literal.
fn split_zone(literal: &str) -> (&str, &str) {
    if let Some(stripped) = literal.strip_suffix('Z') {
        return (stripped, "Z");
    }
    match literal.rfind(['+', '-']) {
        Some(at) if at > 0 => literal.split_at(at),
        _ => (literal, ""),
    }
}

impl ValueCodec for TimeCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvTime
    }

    fn attributes(&self) -> &'static [&'static str] {
        &["value"]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        Some("value")
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        constraint: &ValueConstraint,
        ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let Some(literal) = input.get("value") else {
            return Ok(None);
        };
        let value = match literal {
            Scalar::Temporal(Temporal::Time(time)) => Some(format_time(*time)),
            Scalar::Temporal(Temporal::DateTime(value)) => Some(format_time(value.time())),
            Scalar::Temporal(Temporal::LocalDateTime(value)) => Some(format_time(value.time())),
            Scalar::Integer(millis) => {
                from_epoch_millis(*millis, ctx.zone).map(|v| format_time(v.time()))
            }
            Scalar::Text(text) => {
                let text = text.trim();
                let (clock, zone) = split_zone(text);
                let zone_ok = zone.is_empty()
                    || zone == "Z"
                    || DateTime::parse_from_str(
                        &format!("2000-01-01T00:00:00{zone}"),
                        "%Y-%m-%dT%H:%M:%S%:z",
                    )
                    .is_ok();
                let parsed = TIME_FORMATS
                    .iter()
                    .find_map(|format| NaiveTime::parse_from_str(clock, format).ok());
                match parsed {
                    Some(time) if zone_ok => Some(format!("{}{zone}", format_time(time))),
                    None if constraint.partial && partial_time_pattern().is_match(text) => {
                        Some(text.to_string())
                    }
                    _ => None,
                }
            }
            _ => None,
        };
        let value = value.ok_or_else(|| {
            input.coercion("value", literal, RmType::DvTime, "ISO 8601 time expected")
        })?;
        Ok(Some(DataValue::Time(DvTime {
            value,
            ..DvTime::default()
        })))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        if let DataValue::Time(time) = value {
            out.bare(time.value.as_str());
        }
    }
}

/// Canonical `DV_DATE_TIME` literal for a scalar, with `zone` applied to zone-less input.
pub(crate) fn date_time_literal(
    literal: &Scalar,
    partial: bool,
    ctx: &CodecContext<'_>,
) -> Option<String> {
    let midnight = NaiveTime::MIN;
    match literal {
        Scalar::Temporal(Temporal::DateTime(value)) => Some(format_date_time(*value)),
        Scalar::Temporal(Temporal::LocalDateTime(value)) => {
            localize(*value, ctx.zone).map(format_date_time)
        }
        Scalar::Temporal(Temporal::Date(date)) => {
            localize(date.and_time(midnight), ctx.zone).map(format_date_time)
        }
        Scalar::Integer(millis) => from_epoch_millis(*millis, ctx.zone).map(format_date_time),
        Scalar::Text(text) => {
            let text = text.trim();
            if let Some(value) = parse_date_time(text, ctx.zone) {
                return Some(format_date_time(value));
            }
            if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
                if partial {
                    return Some(text.to_string());
                }
                return localize(date.and_time(midnight), ctx.zone).map(format_date_time);
            }
            if partial && partial_date_time_pattern().is_match(text) {
                return Some(text.to_string());
            }
            ctx.locale
                .date_time(text)
                .and_then(|value| localize(value, ctx.zone))
                .map(format_date_time)
        }
        _ => None,
    }
}

impl ValueCodec for DateTimeCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvDateTime
    }

    fn attributes(&self) -> &'static [&'static str] {
        &["value"]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        Some("value")
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        constraint: &ValueConstraint,
        ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let Some(literal) = input.get("value") else {
            return Ok(None);
        };
        let value = date_time_literal(literal, constraint.partial, ctx).ok_or_else(|| {
            input.coercion(
                "value",
                literal,
                RmType::DvDateTime,
                "ISO 8601 date-time expected",
            )
        })?;
        Ok(Some(DataValue::DateTime(DvDateTime::new(value))))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        if let DataValue::DateTime(date_time) = value {
            out.bare(date_time.value.as_str());
        }
    }
}
