use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

/// A native temporal value handed over by a programmatic caller.
///
/// JSON payloads carry dates and times as strings; callers building payloads in Rust can pass
/// chrono values directly and skip the literal parsing step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Temporal {
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<FixedOffset>),
    /// A date-time without an offset; the converter applies the context zone.
    LocalDateTime(NaiveDateTime),
}

impl fmt::Display for Temporal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Temporal::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Temporal::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            Temporal::DateTime(dt) => {
                write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, false))
            }
            Temporal::LocalDateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

/// A single loosely-typed payload literal.
///
/// Flat compositions map paths to scalars and structured compositions end in scalars, so this
/// is the only shape of input value the converter deals with below the JSON boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(f64),
    Text(String),
    Temporal(Temporal),
}

impl Scalar {
    /// Returns `true` for `null` and for text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Literal form of the value, as it would appear in a flat JSON string.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Scalar::Null => Cow::Borrowed(""),
            Scalar::Bool(b) => Cow::Owned(b.to_string()),
            Scalar::Integer(i) => Cow::Owned(i.to_string()),
            Scalar::Decimal(d) => Cow::Owned(d.to_string()),
            Scalar::Text(s) => Cow::Borrowed(s.as_str()),
            Scalar::Temporal(t) => Cow::Owned(t.to_string()),
        }
    }

    /// Text value with surrounding whitespace removed, or `None` when blank.
    pub fn trimmed(&self) -> Option<Cow<'_, str>> {
        if self.is_blank() {
            return None;
        }
        match self.as_text() {
            Cow::Borrowed(s) => Some(Cow::Borrowed(s.trim())),
            Cow::Owned(s) => Some(Cow::Owned(s.trim().to_string())),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Decimal(value)
    }
}

impl Serialize for Scalar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Integer(i) => serializer.serialize_i64(*i),
            Scalar::Decimal(d) => serializer.serialize_f64(*d),
            Scalar::Text(s) => serializer.serialize_str(s),
            Scalar::Temporal(t) => serializer.collect_str(t),
        }
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = Scalar;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean or null")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Scalar, E> {
        Ok(Scalar::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Scalar, E> {
        Ok(Scalar::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Scalar, E> {
        match i64::try_from(v) {
            Ok(i) => Ok(Scalar::Integer(i)),
            Err(_) => Ok(Scalar::Decimal(v as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Scalar, E> {
        Ok(Scalar::Decimal(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Scalar, E> {
        Ok(Scalar::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Scalar, E> {
        Ok(Scalar::Text(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Scalar, E> {
        Ok(Scalar::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Scalar, E> {
        Ok(Scalar::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Scalar, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection() {
        assert!(Scalar::Null.is_blank());
        assert!(Scalar::text("   ").is_blank());
        assert!(!Scalar::text("0").is_blank());
        assert!(!Scalar::Bool(false).is_blank());
    }

    #[test]
    fn deserializes_json_scalars() {
        let values: Vec<Scalar> =
            serde_json::from_str(r#"[null, true, 3, 37.7, "text"]"#).expect("scalar array");
        assert_eq!(
            values,
            vec![
                Scalar::Null,
                Scalar::Bool(true),
                Scalar::Integer(3),
                Scalar::Decimal(37.7),
                Scalar::text("text"),
            ]
        );
    }

    #[test]
    fn rejects_nested_values() {
        assert!(serde_json::from_str::<Scalar>(r#"{"a": 1}"#).is_err());
        assert!(serde_json::from_str::<Scalar>("[1]").is_err());
    }

    #[test]
    fn temporal_literals_are_iso() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
        assert_eq!(Scalar::Temporal(Temporal::Date(date)).as_text(), "2024-02-29");

        let dt = DateTime::parse_from_rfc3339("2024-02-29T10:15:00+01:00").expect("valid");
        assert_eq!(
            Scalar::Temporal(Temporal::DateTime(dt)).as_text(),
            "2024-02-29T10:15:00+01:00"
        );
    }

    #[test]
    fn decimal_literal_drops_trailing_zero() {
        assert_eq!(Scalar::Decimal(37.0).as_text(), "37");
        assert_eq!(Scalar::Decimal(37.5).as_text(), "37.5");
    }
}
