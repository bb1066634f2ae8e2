//! Converter runtime configuration.
//!
//! Configuration is resolved once at start-up and passed into the [`Converter`]. Conversion
//! calls never read process-wide environment variables, which keeps results reproducible in
//! multi-threaded runtimes and test harnesses.
//!
//! [`Converter`]: crate::Converter

use crate::constants::{DEFAULT_LOCALE, DEFAULT_TERRITORY};
use crate::{ConversionError, ConversionResult};
use chrono::{FixedOffset, Offset, Utc};

/// Engine-wide fallbacks, consulted after the payload `ctx/*` entries and the call context.
#[derive(Clone, Debug)]
pub struct ConverterConfig {
    default_territory: String,
    default_zone: FixedOffset,
    default_locale: String,
    default_composer_name: Option<String>,
}

impl ConverterConfig {
    /// Create a new `ConverterConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::InvalidConfig`] if the territory is not a two-letter code or
    /// the locale tag is empty.
    pub fn new(
        default_territory: impl Into<String>,
        default_zone: FixedOffset,
        default_locale: impl Into<String>,
        default_composer_name: Option<String>,
    ) -> ConversionResult<Self> {
        let default_territory = default_territory.into().trim().to_string();
        if default_territory.len() != 2
            || !default_territory.bytes().all(|b| b.is_ascii_alphabetic())
        {
            return Err(ConversionError::InvalidConfig(format!(
                "default_territory must be a two-letter code, got '{default_territory}'"
            )));
        }

        let default_locale = default_locale.into().trim().to_string();
        if default_locale.is_empty() {
            return Err(ConversionError::InvalidConfig(
                "default_locale cannot be empty".into(),
            ));
        }

        let default_composer_name = default_composer_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(Self {
            default_territory: default_territory.to_ascii_uppercase(),
            default_zone,
            default_locale,
            default_composer_name,
        })
    }

    pub fn default_territory(&self) -> &str {
        &self.default_territory
    }

    pub fn default_zone(&self) -> FixedOffset {
        self.default_zone
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn default_composer_name(&self) -> Option<&str> {
        self.default_composer_name.as_deref()
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            default_territory: DEFAULT_TERRITORY.to_string(),
            default_zone: utc(),
            default_locale: DEFAULT_LOCALE.to_string(),
            default_composer_name: None,
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Parse the default zone offset from an optional string value.
///
/// Accepts `Z`, `+01:00`, `-0530` and `+02`. If `value` is `None` or empty/whitespace,
/// returns UTC.
pub fn zone_offset_from_value(value: Option<String>) -> ConversionResult<FixedOffset> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let Some(value) = value else {
        return Ok(utc());
    };

    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return Ok(utc());
    }

    let invalid = || ConversionError::InvalidConfig(format!("invalid zone offset '{value}'"));

    let (sign, digits) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.len() {
        2 => (&digits[..2], "0"),
        4 => (&digits[..2], &digits[2..]),
        _ => return Err(invalid()),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 18 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
