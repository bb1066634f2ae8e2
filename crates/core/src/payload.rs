//! Flat and structured payloads decoded into one internal trie.
//!
//! Both input representations address the same tree: flat keys spell the path of every
//! literal, structured documents nest it. Decoding either produces a [`Payload`], so the
//! builder never looks at untyped JSON.

use crate::path::PathAddress;
use crate::{ConversionError, ConversionResult};
use flatehr_types::Scalar;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;

/// Flat composition: path to literal, in document order.
pub type FlatComposition = IndexMap<String, Scalar>;

/// `ctx/…` keys a payload may carry.
pub const CONTEXT_KEYS: &[&str] = &[
    "language",
    "territory",
    "composer_name",
    "composer_id",
    "id_scheme",
    "id_namespace",
    "time",
    "end_time",
    "history_origin",
    "setting",
    "health_care_facility|name",
    "health_care_facility|id",
    "provider_name",
    "provider_id",
    "instruction_narrative",
    "activity_timing",
    "action_time",
    "action_ism_transition_current_state",
];

/// Instances of one named child, keyed by instance index.
pub type Instances = BTreeMap<usize, PayloadNode>;

/// One addressed node instance of the payload trie.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PayloadNode {
    /// Attribute literals; the empty key is the bare value (`path` without `|attribute`).
    pub attrs: IndexMap<String, Scalar>,
    pub children: IndexMap<String, Instances>,
}

impl PayloadNode {
    /// Literal of `attribute` unless blank.
    pub fn attr(&self, attribute: &str) -> Option<&Scalar> {
        self.attrs.get(attribute).filter(|value| !value.is_blank())
    }

    pub fn child(&self, name: &str) -> Option<&Instances> {
        self.children.get(name)
    }

    /// First instance of `name`, the way an unindexed path addresses it.
    pub fn first_child(&self, name: &str) -> Option<&PayloadNode> {
        self.child(name).and_then(|instances| instances.values().next())
    }

    /// `true` if any literal in this subtree is non-blank.
    pub fn has_values(&self) -> bool {
        self.attrs.values().any(|value| !value.is_blank())
            || self
                .children
                .values()
                .flat_map(BTreeMap::values)
                .any(PayloadNode::has_values)
    }

    fn descend(&mut self, name: &str, index: usize) -> &mut PayloadNode {
        self.children
            .entry(name.to_string())
            .or_default()
            .entry(index)
            .or_default()
    }
}

/// A decoded payload: the node trie plus `ctx/…` defaults.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Payload {
    /// Holds the template root as its only child.
    pub root: PayloadNode,
    pub ctx: IndexMap<String, Scalar>,
}

impl Payload {
    /// Decodes a flat composition.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::PathResolution`] for malformed paths and unknown `ctx/…` keys.
    pub fn from_flat(flat: &FlatComposition) -> ConversionResult<Self> {
        let mut payload = Payload::default();
        for (raw_path, value) in flat {
            let address = PathAddress::parse(raw_path)?;
            if address.is_context() {
                let key = address.context_key().ok_or_else(|| {
                    ConversionError::path_resolution(raw_path, "context path names no key")
                })?;
                payload.insert_context(raw_path, key, value.clone())?;
                continue;
            }

            let mut node = &mut payload.root;
            for segment in &address.segments {
                node = node.descend(&segment.name, segment.index_or_default());
            }
            let attribute = address.attribute.unwrap_or_default();
            node.attrs.insert(attribute, value.clone());
        }
        Ok(payload)
    }

    /// Decodes a structured composition.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::Payload`] when the document is not an object of arrays,
    /// objects and scalars, and [`ConversionError::PathResolution`] for unknown `ctx` keys.
    pub fn from_structured(document: &Value) -> ConversionResult<Self> {
        let Value::Object(top) = document else {
            return Err(ConversionError::Payload(
                "structured composition must be a JSON object".into(),
            ));
        };

        let mut payload = Payload::default();
        for (name, value) in top {
            if name == crate::constants::CTX_PREFIX {
                payload.decode_structured_context(value)?;
                continue;
            }
            let instances = decode_instances(value, name)?;
            payload.root.children.insert(name.clone(), instances);
        }
        Ok(payload)
    }

    /// Non-blank, trimmed `ctx/…` literal.
    pub fn ctx_text(&self, key: &str) -> Option<String> {
        self.ctx
            .get(key)
            .and_then(Scalar::trimmed)
            .map(|value| value.into_owned())
    }

    fn insert_context(
        &mut self,
        raw_path: &str,
        key: String,
        value: Scalar,
    ) -> ConversionResult<()> {
        if !CONTEXT_KEYS.contains(&key.as_str()) {
            return Err(ConversionError::path_resolution(
                raw_path,
                format!("unknown context key '{key}'"),
            ));
        }
        self.ctx.insert(key, value);
        Ok(())
    }

    fn decode_structured_context(&mut self, value: &Value) -> ConversionResult<()> {
        let Value::Object(entries) = value else {
            return Err(ConversionError::Payload("'ctx' must be a JSON object".into()));
        };
        for (key, value) in entries {
            let raw_path = format!("ctx/{key}");
            match value {
                Value::Object(attributes) => {
                    for (attribute, literal) in attributes {
                        let attribute = attribute.strip_prefix('|').unwrap_or(attribute);
                        let literal = scalar_from_json(literal, &raw_path)?;
                        self.insert_context(&raw_path, format!("{key}|{attribute}"), literal)?;
                    }
                }
                other => {
                    let literal = scalar_from_json(other, &raw_path)?;
                    self.insert_context(&raw_path, key.clone(), literal)?;
                }
            }
        }
        Ok(())
    }
}

fn decode_instances(value: &Value, path: &str) -> ConversionResult<Instances> {
    let mut instances = Instances::new();
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                if item.is_array() {
                    return Err(ConversionError::Payload(format!(
                        "nested array at '{path}:{index}'"
                    )));
                }
                instances.insert(index, decode_instance(item, &format!("{path}:{index}"))?);
            }
        }
        other => {
            instances.insert(0, decode_instance(other, path)?);
        }
    }
    Ok(instances)
}

fn decode_instance(value: &Value, path: &str) -> ConversionResult<PayloadNode> {
    let mut node = PayloadNode::default();
    match value {
        Value::Object(entries) => {
            for (key, value) in entries {
                if let Some(attribute) = key.strip_prefix('|') {
                    if attribute.trim().is_empty() {
                        return Err(ConversionError::path_resolution(
                            format!("{path}/{key}"),
                            "attribute name is empty",
                        ));
                    }
                    let literal = scalar_from_json(value, &format!("{path}|{attribute}"))?;
                    node.attrs.insert(attribute.trim().to_string(), literal);
                } else {
                    if key.trim().is_empty() {
                        return Err(ConversionError::path_resolution(
                            path,
                            "path contains an empty segment",
                        ));
                    }
                    let child_path = format!("{path}/{key}");
                    node.children
                        .insert(key.clone(), decode_instances(value, &child_path)?);
                }
            }
        }
        scalar => {
            node.attrs
                .insert(String::new(), scalar_from_json(scalar, path)?);
        }
    }
    Ok(node)
}

fn scalar_from_json(value: &Value, path: &str) -> ConversionResult<Scalar> {
    match value {
        Value::Null => Ok(Scalar::Null),
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Scalar::Integer(i)),
            None => n.as_f64().map(Scalar::Decimal).ok_or_else(|| {
                ConversionError::Payload(format!("number at '{path}' is out of range"))
            }),
        },
        Value::String(s) => Ok(Scalar::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(ConversionError::Payload(format!(
            "expected a scalar at '{path}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_paths_build_a_trie() {
        let mut flat = FlatComposition::new();
        flat.insert(
            "vital_signs/body_temperature:0/any_event:1/temperature|magnitude".into(),
            Scalar::Decimal(37.5),
        );
        flat.insert(
            "vital_signs/body_temperature/any_event:1/temperature|unit".into(),
            Scalar::text("°C"),
        );
        flat.insert("ctx/language".into(), Scalar::text("en"));

        let payload = Payload::from_flat(&flat).expect("valid flat payload");
        assert_eq!(payload.ctx_text("language").as_deref(), Some("en"));

        let temperature = payload
            .root
            .first_child("vital_signs")
            .and_then(|n| n.first_child("body_temperature"))
            .and_then(|n| n.child("any_event"))
            .and_then(|events| events.get(&1))
            .and_then(|n| n.first_child("temperature"))
            .expect("temperature node");
        assert_eq!(temperature.attr("magnitude"), Some(&Scalar::Decimal(37.5)));
        assert_eq!(temperature.attr("unit"), Some(&Scalar::text("°C")));
    }

    #[test]
    fn unknown_context_key_is_rejected() {
        let mut flat = FlatComposition::new();
        flat.insert("ctx/weather".into(), Scalar::text("sunny"));
        let err = Payload::from_flat(&flat).expect_err("unknown ctx key");
        assert!(matches!(err, ConversionError::PathResolution { path, .. } if path == "ctx/weather"));
    }

    #[test]
    fn structured_documents_decode_to_the_same_trie() {
        let document = json!({
            "ctx": {"language": "en", "health_care_facility": {"|name": "Hospital"}},
            "vital_signs": {
                "body_temperature": [{
                    "any_event": [
                        {"temperature": [{"|magnitude": 37.5, "|unit": "°C"}]},
                        {"temperature": [{"|magnitude": 38, "|unit": "°C"}]}
                    ]
                }],
                "flag": true
            }
        });
        let payload = Payload::from_structured(&document).expect("valid structured payload");
        assert_eq!(
            payload.ctx_text("health_care_facility|name").as_deref(),
            Some("Hospital")
        );

        let composition = payload.root.first_child("vital_signs").expect("root");
        assert_eq!(composition.first_child("flag").and_then(|n| n.attr("")), Some(&Scalar::Bool(true)));
        let events = composition
            .first_child("body_temperature")
            .and_then(|n| n.child("any_event"))
            .expect("events");
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[&1].first_child("temperature").and_then(|n| n.attr("magnitude")),
            Some(&Scalar::Integer(38))
        );
    }

    #[test]
    fn structured_rejects_nested_arrays() {
        let err = Payload::from_structured(&json!({"a": {"b": [[1]]}})).expect_err("nested");
        assert!(matches!(err, ConversionError::Payload(_)));
        let err = Payload::from_structured(&json!([1])).expect_err("not an object");
        assert!(matches!(err, ConversionError::Payload(_)));
    }

    #[test]
    fn blank_literals_do_not_count_as_values() {
        let mut flat = FlatComposition::new();
        flat.insert("a/b:0/c".into(), Scalar::text("  "));
        flat.insert("a/b:0/d".into(), Scalar::Null);
        let payload = Payload::from_flat(&flat).expect("valid");
        assert!(!payload.root.has_values());
    }
}
