//! Locale plug-point for numeric and date literals.
//!
//! Canonical literals (`37.5`, `2024-02-29`, ISO date-times) are always accepted by the codecs.
//! A [`LocaleConverter`] only handles the locale-formatted forms on top of those.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Parses locale-formatted literals.
pub trait LocaleConverter: Send + Sync {
    /// Locale tag, e.g. `en` or `de-AT`.
    fn tag(&self) -> &str;

    /// Parses a decimal number written with the locale's separators.
    fn decimal(&self, literal: &str) -> Option<f64>;

    /// Parses a date written in the locale's conventional order.
    fn date(&self, literal: &str) -> Option<NaiveDate>;

    /// Parses a date followed by a time, written in the locale's conventional order.
    fn date_time(&self, literal: &str) -> Option<NaiveDateTime>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DateOrder {
    DayMonthYear,
    MonthDayYear,
}

/// Separator and date-order conventions derived from a locale tag.
#[derive(Clone, Debug)]
pub struct StandardLocale {
    tag: String,
    decimal_separator: char,
    group_separator: char,
    date_order: DateOrder,
}

const DECIMAL_COMMA_LANGUAGES: &[&str] = &[
    "de", "fr", "es", "it", "pt", "nl", "sl", "hr", "sr", "cs", "sk", "pl", "ru", "uk", "da",
    "nb", "nn", "no", "sv", "fi", "tr", "el", "hu", "ro", "bg", "id",
];

impl StandardLocale {
    /// Conventions for `tag`: language decides the decimal separator, and only `en-US`
    /// (and plain `en`) writes dates month first.
    pub fn for_tag(tag: &str) -> Self {
        let normalized = tag.trim().replace('_', "-");
        let mut parts = normalized.split('-');
        let language = parts.next().unwrap_or_default().to_ascii_lowercase();
        let region = parts.next().map(|r| r.to_ascii_uppercase());

        let decimal_comma = DECIMAL_COMMA_LANGUAGES.contains(&language.as_str());
        let month_first = language == "en" && matches!(region.as_deref(), None | Some("US"));

        Self {
            tag: normalized,
            decimal_separator: if decimal_comma { ',' } else { '.' },
            group_separator: if decimal_comma { '.' } else { ',' },
            date_order: if month_first {
                DateOrder::MonthDayYear
            } else {
                DateOrder::DayMonthYear
            },
        }
    }

    fn split_date(&self, literal: &str) -> Option<NaiveDate> {
        let parts: Vec<&str> = literal.split(['.', '/', '-']).map(str::trim).collect();
        let [first, second, year] = parts.as_slice() else {
            return None;
        };
        let (day, month) = match self.date_order {
            DateOrder::DayMonthYear => (first, second),
            DateOrder::MonthDayYear => (second, first),
        };
        let day: u32 = day.parse().ok()?;
        let month: u32 = month.parse().ok()?;
        let year: i32 = year.parse().ok()?;
        if year < 100 {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

impl LocaleConverter for StandardLocale {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn decimal(&self, literal: &str) -> Option<f64> {
        let literal = literal.trim();
        if literal.is_empty() {
            return None;
        }
        let canonical: String = literal
            .chars()
            .filter(|c| *c != self.group_separator && *c != ' ' && *c != '\u{a0}')
            .map(|c| if c == self.decimal_separator { '.' } else { c })
            .collect();
        canonical.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    fn date(&self, literal: &str) -> Option<NaiveDate> {
        self.split_date(literal.trim())
    }

    fn date_time(&self, literal: &str) -> Option<NaiveDateTime> {
        let literal = literal.trim();
        let (date, time) = literal.split_once([' ', 'T'])?;
        let date = self.split_date(date)?;
        let time = time.trim();
        let time = NaiveTime::parse_from_str(time, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
            .ok()?;
        Some(date.and_time(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_uses_dot_decimal_and_month_first() {
        let locale = StandardLocale::for_tag("en");
        assert_eq!(locale.decimal("1,234.5"), Some(1234.5));
        assert_eq!(
            locale.date("02/29/2024"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }

    #[test]
    fn british_english_is_day_first() {
        let locale = StandardLocale::for_tag("en_GB");
        assert_eq!(locale.tag(), "en-GB");
        assert_eq!(
            locale.date("29/02/2024"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }

    #[test]
    fn german_uses_comma_decimal() {
        let locale = StandardLocale::for_tag("de-AT");
        assert_eq!(locale.decimal("37,5"), Some(37.5));
        assert_eq!(locale.decimal("1.234,5"), Some(1234.5));
        let dt = locale.date_time("29.02.2024 10:15").expect("date time");
        assert_eq!(dt.to_string(), "2024-02-29 10:15:00");
    }

    #[test]
    fn rejects_garbage() {
        let locale = StandardLocale::for_tag("de");
        assert_eq!(locale.decimal("warm"), None);
        assert_eq!(locale.date("31.02.2024"), None);
        assert_eq!(locale.date("1.2.24"), None);
    }
}
