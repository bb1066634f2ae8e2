use super::{CodecContext, LeafInput, ValueCodec};
use crate::constants::DEFAULT_PARSABLE_FORMALISM;
use crate::fragment::Fragment;
use crate::schema::ValueConstraint;
use crate::ConversionResult;
use flatehr_types::Scalar;
use openehr::rm_1_1_0::constants::TERMINOLOGY_MEDIA_TYPES;
use openehr::{
    CodePhrase, DataValue, DvBoolean, DvEhrUri, DvIdentifier, DvMultimedia, DvParsable, DvUri,
    RmType,
};

pub(crate) struct BooleanCodec;

pub(crate) struct IdentifierCodec;

pub(crate) struct UriCodec {
    pub(crate) ehr: bool,
}

pub(crate) struct MultimediaCodec;

pub(crate) struct ParsableCodec;

/// `true` when `literal` starts with an RFC 3986 scheme.
fn has_scheme(literal: &str) -> bool {
    match literal.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

impl ValueCodec for BooleanCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvBoolean
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
        _constraint: &ValueConstraint,
        _ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        Ok(input
            .boolean("value", RmType::DvBoolean)?
            .map(|value| {
                DataValue::Boolean(DvBoolean {
                    value,
                    ..DvBoolean::default()
                })
            }))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        if let DataValue::Boolean(boolean) = value {
            out.bare(boolean.value);
        }
    }
}

impl ValueCodec for IdentifierCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvIdentifier
    }

    fn attributes(&self) -> &'static [&'static str] {
        &["id", "issuer", "assigner", "type"]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        Some("id")
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        _constraint: &ValueConstraint,
        _ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let Some(id) = input.text("id") else {
            return Ok(None);
        };
        Ok(Some(DataValue::Identifier(DvIdentifier {
            id,
            issuer: input.text("issuer"),
            assigner: input.text("assigner"),
            type_: input.text("type"),
            ..DvIdentifier::default()
        })))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        let DataValue::Identifier(identifier) = value else {
            return;
        };
        out.set("id", identifier.id.as_str());
        out.set_opt("issuer", identifier.issuer.as_deref());
        out.set_opt("assigner", identifier.assigner.as_deref());
        out.set_opt("type", identifier.type_.as_deref());
    }
}

impl ValueCodec for UriCodec {
    fn rm_type(&self) -> RmType {
        if self.ehr {
            RmType::DvEhrUri
        } else {
            RmType::DvUri
        }
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
        _constraint: &ValueConstraint,
        _ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let Some(value) = input.text("value") else {
            return Ok(None);
        };
        if self.ehr {
            if !value.starts_with("ehr:") {
                return Err(input.coercion(
                    "value",
                    &Scalar::text(value),
                    self.rm_type(),
                    "URI with the ehr scheme expected",
                ));
            }
            return Ok(Some(DataValue::EhrUri(DvEhrUri {
                value,
                ..DvEhrUri::default()
            })));
        }
        if !has_scheme(&value) {
            return Err(input.coercion(
                "value",
                &Scalar::text(value),
                self.rm_type(),
                "URI expected",
            ));
        }
        Ok(Some(DataValue::Uri(DvUri {
            value,
            ..DvUri::default()
        })))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        match value {
            DataValue::Uri(uri) => out.bare(uri.value.as_str()),
            DataValue::EhrUri(uri) => out.bare(uri.value.as_str()),
            _ => {}
        }
    }
}

impl ValueCodec for MultimediaCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvMultimedia
    }

    fn attributes(&self) -> &'static [&'static str] {
        &["url", "mediatype", "size", "alternatetext"]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        Some("url")
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        _constraint: &ValueConstraint,
        _ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let url = input.text("url");
        let media_type = input.text("mediatype");
        if url.is_none() && media_type.is_none() {
            return Ok(None);
        }
        let media_type = media_type
            .ok_or_else(|| input.vocabulary("mediatype", "", "media type required"))?;
        let size = input.integer("size", RmType::DvMultimedia)?.unwrap_or(0);
        Ok(Some(DataValue::Multimedia(DvMultimedia {
            uri: url.map(|value| DvUri {
                value,
                ..DvUri::default()
            }),
            media_type: CodePhrase::new(TERMINOLOGY_MEDIA_TYPES, media_type),
            size,
            alternate_text: input.text("alternatetext"),
            ..DvMultimedia::default()
        })))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        let DataValue::Multimedia(multimedia) = value else {
            return;
        };
        if let Some(uri) = &multimedia.uri {
            out.bare(uri.value.as_str());
        }
        out.set("mediatype", multimedia.media_type.code_string.as_str());
        out.set("size", Scalar::Integer(multimedia.size));
        out.set_opt("alternatetext", multimedia.alternate_text.as_deref());
    }
}

impl ValueCodec for ParsableCodec {
    fn rm_type(&self) -> RmType {
        RmType::DvParsable
    }

    fn attributes(&self) -> &'static [&'static str] {
        &["value", "formalism"]
    }

    fn bare_attribute(&self) -> Option<&'static str> {
        Some("value")
    }

    fn decode(
        &self,
        input: &LeafInput<'_>,
        _constraint: &ValueConstraint,
        _ctx: &CodecContext<'_>,
    ) -> ConversionResult<Option<DataValue>> {
        let Some(value) = input.text("value") else {
            return Ok(None);
        };
        let formalism = input
            .text("formalism")
            .unwrap_or_else(|| DEFAULT_PARSABLE_FORMALISM.to_string());
        Ok(Some(DataValue::Parsable(DvParsable::new(value, formalism))))
    }

    fn encode(&self, value: &DataValue, _constraint: &ValueConstraint, out: &mut Fragment) {
        if let DataValue::Parsable(parsable) = value {
            out.bare(parsable.value.as_str());
            out.set("formalism", parsable.formalism.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{decode, encode, node};
    use super::*;
    use crate::ConversionError;

    #[test]
    fn booleans_accept_text() {
        let input = node(&[("", Scalar::text("TRUE"))]);
        let value = decode(RmType::DvBoolean, &input, &ValueConstraint::default()).expect("decoded");
        assert!(matches!(value, Some(DataValue::Boolean(ref b)) if b.value));

        let input = node(&[("", Scalar::text("yes"))]);
        let err = decode(RmType::DvBoolean, &input, &ValueConstraint::default())
            .expect_err("not a boolean");
        assert!(matches!(err, ConversionError::TypeCoercion { .. }));
    }

    #[test]
    fn multimedia_size_must_be_numeric() {
        let input = node(&[
            ("url", Scalar::text("https://example.org/scan.png")),
            ("mediatype", Scalar::text("image/png")),
            ("size", Scalar::text("large")),
        ]);
        let err = decode(RmType::DvMultimedia, &input, &ValueConstraint::default())
            .expect_err("size is not a number");
        assert!(matches!(
            err,
            ConversionError::TypeCoercion { ref path, ref reason, .. }
                if path == "test/value|size" && reason == "numeric value expected"
        ));
    }

    #[test]
    fn multimedia_writes_url_as_bare_value() {
        let input = node(&[
            ("", Scalar::text("https://example.org/scan.png")),
            ("mediatype", Scalar::text("image/png")),
            ("size", Scalar::Integer(2048)),
        ]);
        let value = decode(RmType::DvMultimedia, &input, &ValueConstraint::default())
            .expect("decoded")
            .expect("value");
        let out = encode(&value, &ValueConstraint::default());
        assert_eq!(out.bare_name, Some("url"));
        assert_eq!(
            out.attrs.get(""),
            Some(&Scalar::text("https://example.org/scan.png"))
        );
        assert_eq!(out.attrs.get("size"), Some(&Scalar::Integer(2048)));
    }

    #[test]
    fn uris_need_a_scheme() {
        let input = node(&[("", Scalar::text("not a uri"))]);
        assert!(decode(RmType::DvUri, &input, &ValueConstraint::default()).is_err());

        let input = node(&[("", Scalar::text("ehr://system/abc"))]);
        assert!(decode(RmType::DvEhrUri, &input, &ValueConstraint::default())
            .expect("ehr uri")
            .is_some());
        let input = node(&[("", Scalar::text("https://example.org"))]);
        assert!(decode(RmType::DvEhrUri, &input, &ValueConstraint::default()).is_err());
    }

    #[test]
    fn parsable_defaults_its_formalism() {
        let input = node(&[("", Scalar::text("R2/PT8H"))]);
        let value = decode(RmType::DvParsable, &input, &ValueConstraint::default())
            .expect("decoded");
        assert!(matches!(
            value,
            Some(DataValue::Parsable(ref p)) if p.formalism == DEFAULT_PARSABLE_FORMALISM
        ));
    }
}
