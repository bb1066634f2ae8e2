//! Codecs for the non-`DV_*` attribute types: `CODE_PHRASE`, `PARTY_PROXY` and plain strings.

use super::{check_attributes, LeafInput};
use crate::constants::{DEFAULT_PARTY_NAMESPACE, PARTY_REF_TYPE};
use crate::fragment::Fragment;
use crate::payload::PayloadNode;
use crate::ConversionResult;
use openehr::{
    CodePhrase, GenericId, ObjectId, PartyIdentified, PartyProxy, PartyRef, PartySelf, RmType,
};

pub const CODE_PHRASE_ATTRIBUTES: &[&str] = &["code", "terminology", "value"];

pub const PARTY_ATTRIBUTES: &[&str] = &["name", "id", "id_scheme", "id_namespace"];

const STRING_ATTRIBUTES: &[&str] = &["value"];

/// Decodes a code phrase; `default_terminology` applies when `|terminology` is absent.
pub fn decode_code_phrase(
    path: &str,
    node: &PayloadNode,
    default_terminology: &str,
) -> ConversionResult<Option<CodePhrase>> {
    check_attributes(path, node, RmType::CodePhrase, CODE_PHRASE_ATTRIBUTES, Some("code"))?;
    let input = LeafInput::new(path, node, Some("code"));
    let Some(code) = input.text("code") else {
        return Ok(None);
    };
    let terminology = input
        .text("terminology")
        .unwrap_or_else(|| default_terminology.to_string());
    let mut phrase = CodePhrase::new(terminology, code);
    phrase.preferred_term = input.text("value");
    Ok(Some(phrase))
}

pub fn encode_code_phrase(phrase: &CodePhrase, out: &mut Fragment) {
    out.bare_name = Some("code");
    out.set("code", phrase.code_string.as_str());
    out.set("terminology", phrase.terminology());
    out.set_opt("value", phrase.preferred_term.as_deref());
}

/// Scheme and namespace a party reference falls back to.
#[derive(Clone, Copy, Debug, Default)]
pub struct PartyDefaults<'a> {
    pub id_scheme: Option<&'a str>,
    pub id_namespace: Option<&'a str>,
}

fn party_ref(input: &LeafInput<'_>, defaults: PartyDefaults<'_>) -> Option<PartyRef> {
    let id = input.text("id")?;
    let scheme = input
        .text("id_scheme")
        .or_else(|| defaults.id_scheme.map(str::to_string));
    let namespace = input
        .text("id_namespace")
        .or_else(|| defaults.id_namespace.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_PARTY_NAMESPACE.to_string());
    Some(PartyRef {
        class: Default::default(),
        id: ObjectId::Generic(GenericId {
            value: id,
            scheme,
            ..GenericId::default()
        }),
        namespace,
        type_: PARTY_REF_TYPE.to_string(),
    })
}

/// Decodes a party: a name makes it `PARTY_IDENTIFIED`, an id alone a `PARTY_SELF` with a
/// reference. `None` when neither is given.
pub fn decode_party(
    path: &str,
    node: &PayloadNode,
    defaults: PartyDefaults<'_>,
) -> ConversionResult<Option<PartyProxy>> {
    check_attributes(path, node, RmType::PartyProxy, PARTY_ATTRIBUTES, Some("name"))?;
    let input = LeafInput::new(path, node, Some("name"));
    let name = input.text("name");
    let external_ref = party_ref(&input, defaults);
    Ok(match (name, external_ref) {
        (None, None) => None,
        (Some(name), external_ref) => Some(PartyProxy::Identified(PartyIdentified {
            name: Some(name),
            external_ref,
            ..PartyIdentified::default()
        })),
        (None, external_ref) => Some(PartyProxy::Self_(PartySelf {
            external_ref,
            ..PartySelf::default()
        })),
    })
}

fn encode_party_ref(external_ref: &Option<PartyRef>, out: &mut Fragment) {
    let Some(external_ref) = external_ref else {
        return;
    };
    out.set("id", external_ref.id.value());
    out.set_opt("id_scheme", external_ref.id.scheme());
    out.set("id_namespace", external_ref.namespace.as_str());
}

/// Writes a party; `PARTY_SELF` without a reference writes nothing.
pub fn encode_party(party: &PartyProxy, out: &mut Fragment) {
    out.bare_name = Some("name");
    match party {
        PartyProxy::Self_(party) => encode_party_ref(&party.external_ref, out),
        PartyProxy::Identified(party) => {
            out.set_opt("name", party.name.as_deref());
            encode_party_ref(&party.external_ref, out);
        }
    }
}

pub fn decode_string(path: &str, node: &PayloadNode) -> ConversionResult<Option<String>> {
    check_attributes(path, node, RmType::String, STRING_ATTRIBUTES, Some("value"))?;
    Ok(LeafInput::new(path, node, Some("value")).text("value"))
}

pub fn encode_string(value: &str, out: &mut Fragment) {
    out.bare_name = Some("value");
    out.bare(value);
}

#[cfg(test)]
mod tests {
    use super::super::test_support::node;
    use super::*;
    use crate::ConversionError;
    use flatehr_types::Scalar;

    #[test]
    fn code_phrase_defaults_terminology() {
        let input = node(&[("", Scalar::text("de"))]);
        let phrase = decode_code_phrase("ctx/language", &input, "ISO_639-1")
            .expect("decoded")
            .expect("phrase");
        assert_eq!(phrase.code_string, "de");
        assert_eq!(phrase.terminology(), "ISO_639-1");
    }

    #[test]
    fn party_shapes() {
        let named = node(&[("name", Scalar::text("Dr. Who")), ("id", Scalar::text("199"))]);
        let party = decode_party("composer", &named, PartyDefaults::default())
            .expect("decoded")
            .expect("party");
        let PartyProxy::Identified(identified) = &party else {
            panic!("expected PARTY_IDENTIFIED");
        };
        assert_eq!(identified.name.as_deref(), Some("Dr. Who"));
        let external_ref = identified.external_ref.as_ref().expect("reference");
        assert_eq!(external_ref.namespace, DEFAULT_PARTY_NAMESPACE);

        let id_only = node(&[("id", Scalar::text("42"))]);
        let party = decode_party(
            "subject",
            &id_only,
            PartyDefaults {
                id_scheme: Some("MRN"),
                id_namespace: Some("HOSPITAL"),
            },
        )
        .expect("decoded")
        .expect("party");
        let PartyProxy::Self_(self_) = &party else {
            panic!("expected PARTY_SELF");
        };
        let external_ref = self_.external_ref.as_ref().expect("reference");
        assert_eq!(external_ref.id.scheme(), Some("MRN"));
        assert_eq!(external_ref.namespace, "HOSPITAL");

        let mut out = Fragment::new();
        encode_party(&party, &mut out);
        assert_eq!(out.attrs.get("id"), Some(&Scalar::text("42")));
    }

    #[test]
    fn unknown_party_attribute() {
        let input = node(&[("email", Scalar::text("x@example.org"))]);
        let err = decode_party("composer", &input, PartyDefaults::default())
            .expect_err("unknown attribute");
        assert!(matches!(err, ConversionError::Vocabulary { ref path, .. } if path == "composer|email"));
    }
}
