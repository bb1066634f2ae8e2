//! Call context and the defaults a conversion call resolves from it.
//!
//! Every attribute the builder fills without payload input comes from [`CallDefaults`], which
//! is resolved once per call with the precedence: payload `ctx/*` entry, then the call's
//! [`ConversionContext`], then [`ConverterConfig`], then the engine default.

use crate::codec::{
    date_time_literal, decode_party, decode_value, CodecContext, PartyDefaults,
};
use crate::config::ConverterConfig;
use crate::constants::{
    DEFAULT_ENCODING, DEFAULT_ISM_STATE_CODE, DEFAULT_NARRATIVE, DEFAULT_SETTING_CODE,
    DEFAULT_TIMING, TIMING_FORMALISM,
};
use crate::locale::{LocaleConverter, StandardLocale};
use crate::meta::into_identified;
use crate::payload::{Payload, PayloadNode};
use crate::schema::{SchemaTree, ValueConstraint};
use crate::{ConversionError, ConversionResult};
use chrono::{DateTime, FixedOffset, Utc};
use flatehr_types::{Scalar, Temporal};
use openehr::rm_1_1_0::constants::{
    TERMINOLOGY_CHARSET, TERMINOLOGY_LANGUAGE, TERMINOLOGY_OPENEHR, TERMINOLOGY_TERRITORY,
};
use openehr::{
    CodePhrase, DataValue, DvCodedText, DvDateTime, DvParsable, DvText, PartyIdentified,
    PartyProxy, PartySelf, RmType,
};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Keys a caller may set on a [`ConversionContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextKey {
    Language,
    Territory,
    ComposerName,
    IdScheme,
    IdNamespace,
    Locale,
    /// Explicit instruction and activity index hints win over count-based resolution, and
    /// extraction derives the hints back from the link path.
    ActionToInstructionHandler,
}

const KEY_NAMES: &[(ContextKey, &str)] = &[
    (ContextKey::Language, "LANGUAGE"),
    (ContextKey::Territory, "TERRITORY"),
    (ContextKey::ComposerName, "COMPOSER_NAME"),
    (ContextKey::IdScheme, "ID_SCHEME"),
    (ContextKey::IdNamespace, "ID_NAMESPACE"),
    (ContextKey::Locale, "LOCALE"),
    (ContextKey::ActionToInstructionHandler, "ACTION_TO_INSTRUCTION_HANDLER"),
];

impl ContextKey {
    pub fn as_str(self) -> &'static str {
        KEY_NAMES
            .iter()
            .find(|(key, _)| *key == self)
            .map(|(_, name)| *name)
            .unwrap_or_default()
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextKey {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        KEY_NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s))
            .map(|(key, _)| *key)
            .ok_or_else(|| ConversionError::InvalidConfig(format!("unknown context key '{s}'")))
    }
}

/// Per-call settings supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversionContext {
    values: HashMap<ContextKey, Scalar>,
}

impl ConversionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from string keys, ignoring keys it does not recognize.
    pub fn from_entries<K, V, I>(entries: I) -> Self
    where
        K: AsRef<str>,
        V: Into<Scalar>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut context = Self::new();
        for (key, value) in entries {
            match key.as_ref().parse::<ContextKey>() {
                Ok(key) => context.insert(key, value),
                Err(_) => tracing::trace!(key = key.as_ref(), "ignoring unknown context key"),
            }
        }
        context
    }

    pub fn insert(&mut self, key: ContextKey, value: impl Into<Scalar>) {
        self.values.insert(key, value.into());
    }

    #[must_use]
    pub fn with(mut self, key: ContextKey, value: impl Into<Scalar>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: ContextKey) -> Option<&Scalar> {
        self.values.get(&key).filter(|value| !value.is_blank())
    }

    /// Trimmed, non-blank text of `key`.
    pub fn text(&self, key: ContextKey) -> Option<String> {
        self.get(key)
            .and_then(Scalar::trimmed)
            .map(|value| value.into_owned())
    }

    /// `true` when `key` holds `true` or the text `true`.
    pub fn flag(&self, key: ContextKey) -> bool {
        match self.get(key) {
            Some(Scalar::Bool(value)) => *value,
            Some(Scalar::Text(text)) => text.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

/// Values filled in where the payload leaves an RM attribute unaddressed.
#[derive(Clone)]
pub(crate) struct CallDefaults {
    pub language: CodePhrase,
    pub territory: CodePhrase,
    pub encoding: CodePhrase,
    pub composer: PartyProxy,
    pub id_scheme: Option<String>,
    pub id_namespace: Option<String>,
    pub start_time: DvDateTime,
    pub end_time: Option<DvDateTime>,
    pub history_origin: Option<DvDateTime>,
    pub setting: DvCodedText,
    pub health_care_facility: Option<PartyIdentified>,
    pub provider: Option<PartyProxy>,
    pub narrative: DvText,
    pub timing: DvParsable,
    pub action_time: Option<DvDateTime>,
    pub ism_state: DvCodedText,
    pub locale: Arc<dyn LocaleConverter>,
    pub zone: FixedOffset,
    pub link_handler: bool,
}

impl fmt::Debug for CallDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDefaults")
            .field("language", &self.language.code_string)
            .field("territory", &self.territory.code_string)
            .field("locale", &self.locale.tag())
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

fn leaf(attribute: &str, literal: &Scalar) -> PayloadNode {
    let mut node = PayloadNode::default();
    node.attrs.insert(attribute.to_string(), literal.clone());
    node
}

fn text_leaf(attributes: &[(&str, Option<String>)]) -> PayloadNode {
    let mut node = PayloadNode::default();
    for (attribute, value) in attributes {
        if let Some(value) = value {
            node.attrs.insert(attribute.to_string(), Scalar::text(value.as_str()));
        }
    }
    node
}

fn ctx_path(key: &str) -> String {
    format!("ctx/{key}")
}

impl CallDefaults {
    /// Resolves the defaults of one call.
    ///
    /// # Errors
    ///
    /// Coercion and vocabulary errors for `ctx/*` literals, reported at their `ctx/…` path.
    pub(crate) fn resolve(
        payload: &Payload,
        context: &ConversionContext,
        config: &ConverterConfig,
        tree: &SchemaTree,
        now: DateTime<Utc>,
        locale_override: Option<Arc<dyn LocaleConverter>>,
    ) -> ConversionResult<Self> {
        let locale: Arc<dyn LocaleConverter> = match locale_override {
            Some(locale) => locale,
            None => {
                let tag = context
                    .text(ContextKey::Locale)
                    .unwrap_or_else(|| config.default_locale().to_string());
                Arc::new(StandardLocale::for_tag(&tag))
            }
        };
        let zone = config.default_zone();
        let ctx = CodecContext {
            locale: locale.as_ref(),
            zone,
        };

        let language = payload
            .ctx_text("language")
            .or_else(|| context.text(ContextKey::Language))
            .unwrap_or_else(|| tree.default_language.clone());
        let territory = payload
            .ctx_text("territory")
            .or_else(|| context.text(ContextKey::Territory))
            .unwrap_or_else(|| config.default_territory().to_string());

        let id_scheme = payload
            .ctx_text("id_scheme")
            .or_else(|| context.text(ContextKey::IdScheme));
        let id_namespace = payload
            .ctx_text("id_namespace")
            .or_else(|| context.text(ContextKey::IdNamespace));
        let party_defaults = PartyDefaults {
            id_scheme: id_scheme.as_deref(),
            id_namespace: id_namespace.as_deref(),
        };

        let composer_name = payload
            .ctx_text("composer_name")
            .or_else(|| context.text(ContextKey::ComposerName))
            .or_else(|| config.default_composer_name().map(str::to_string));
        let composer = decode_party(
            &ctx_path("composer"),
            &text_leaf(&[("name", composer_name), ("id", payload.ctx_text("composer_id"))]),
            party_defaults,
        )?
        .unwrap_or_else(|| PartyProxy::Self_(PartySelf::default()));

        let start_time = match date_time(payload, "time", &ctx)? {
            Some(time) => time,
            None => {
                let now = Scalar::Temporal(Temporal::DateTime(now.with_timezone(&zone)));
                DvDateTime::new(date_time_literal(&now, false, &ctx).unwrap_or_default())
            }
        };

        let health_care_facility = decode_party(
            &ctx_path("health_care_facility"),
            &text_leaf(&[
                ("name", payload.ctx_text("health_care_facility|name")),
                ("id", payload.ctx_text("health_care_facility|id")),
            ]),
            party_defaults,
        )?
        .map(into_identified);
        let provider = decode_party(
            &ctx_path("provider"),
            &text_leaf(&[
                ("name", payload.ctx_text("provider_name")),
                ("id", payload.ctx_text("provider_id")),
            ]),
            party_defaults,
        )?;

        let setting = openehr_coded(payload, "setting", DEFAULT_SETTING_CODE, &ctx)?;
        let ism_state = openehr_coded(
            payload,
            "action_ism_transition_current_state",
            DEFAULT_ISM_STATE_CODE,
            &ctx,
        )?;

        let narrative = DvText::new(
            payload
                .ctx_text("instruction_narrative")
                .unwrap_or_else(|| DEFAULT_NARRATIVE.to_string()),
        );
        let timing = DvParsable::new(
            payload
                .ctx_text("activity_timing")
                .unwrap_or_else(|| DEFAULT_TIMING.to_string()),
            TIMING_FORMALISM,
        );

        Ok(Self {
            language: CodePhrase::new(TERMINOLOGY_LANGUAGE, language),
            territory: CodePhrase::new(TERMINOLOGY_TERRITORY, territory),
            encoding: CodePhrase::new(TERMINOLOGY_CHARSET, DEFAULT_ENCODING),
            composer,
            end_time: date_time(payload, "end_time", &ctx)?,
            history_origin: date_time(payload, "history_origin", &ctx)?,
            action_time: date_time(payload, "action_time", &ctx)?,
            id_scheme,
            id_namespace,
            start_time,
            setting,
            health_care_facility,
            provider,
            narrative,
            timing,
            ism_state,
            link_handler: context.flag(ContextKey::ActionToInstructionHandler),
            locale,
            zone,
        })
    }

    pub(crate) fn codec_context(&self) -> CodecContext<'_> {
        CodecContext {
            locale: self.locale.as_ref(),
            zone: self.zone,
        }
    }

    pub(crate) fn party_defaults(&self) -> PartyDefaults<'_> {
        PartyDefaults {
            id_scheme: self.id_scheme.as_deref(),
            id_namespace: self.id_namespace.as_deref(),
        }
    }

    /// Time of an event or action without its own.
    pub(crate) fn event_time(&self) -> DvDateTime {
        self.start_time.clone()
    }

    pub(crate) fn origin(&self) -> DvDateTime {
        self.history_origin
            .clone()
            .unwrap_or_else(|| self.start_time.clone())
    }
}

fn date_time(
    payload: &Payload,
    key: &str,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<DvDateTime>> {
    let Some(literal) = payload.ctx.get(key).filter(|value| !value.is_blank()) else {
        return Ok(None);
    };
    let path = ctx_path(key);
    match decode_value(
        RmType::DvDateTime,
        &path,
        &leaf("value", literal),
        &ValueConstraint::default(),
        ctx,
    )? {
        Some(DataValue::DateTime(value)) => Ok(Some(value)),
        _ => Ok(None),
    }
}

fn openehr_coded(
    payload: &Payload,
    key: &str,
    default_code: &str,
    ctx: &CodecContext<'_>,
) -> ConversionResult<DvCodedText> {
    let literal = payload
        .ctx
        .get(key)
        .filter(|value| !value.is_blank())
        .cloned()
        .unwrap_or_else(|| Scalar::text(default_code));
    let constraint = ValueConstraint {
        terminology: Some(TERMINOLOGY_OPENEHR.to_string()),
        ..ValueConstraint::default()
    };
    let path = ctx_path(key);
    match decode_value(RmType::DvCodedText, &path, &leaf("code", &literal), &constraint, ctx)? {
        Some(DataValue::CodedText(value)) => Ok(value),
        _ => Err(ConversionError::vocabulary(
            path,
            literal.as_text(),
            "openehr code expected",
        )),
    }
}
