//! Extraction output tree.
//!
//! The extractor produces one [`Fragment`] per schema node instance. A fragment renders either
//! as flat `path|attribute` keys or as a structured JSON object with `|attribute` pseudo-keys.

use crate::FlatComposition;
use flatehr_types::Scalar;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Instances of one child node, in output order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FragmentGroup {
    /// Whether the node may repeat; repeating nodes always carry an index in flat output.
    pub multiple: bool,
    pub instances: Vec<Fragment>,
}

/// One extracted node instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fragment {
    /// Attribute literals; the empty key is the bare value.
    pub attrs: IndexMap<String, Scalar>,
    /// Name of the bare attribute when written as a structured object key.
    pub bare_name: Option<&'static str>,
    pub children: IndexMap<String, FragmentGroup>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bare_name(bare_name: Option<&'static str>) -> Self {
        Self {
            bare_name,
            ..Self::default()
        }
    }

    /// Sets the bare value.
    pub fn bare(&mut self, value: impl Into<Scalar>) {
        self.attrs.insert(String::new(), value.into());
    }

    pub fn set(&mut self, attribute: &str, value: impl Into<Scalar>) {
        self.attrs.insert(attribute.to_string(), value.into());
    }

    /// Sets `attribute` when `value` is present.
    pub fn set_opt<T: Into<Scalar>>(&mut self, attribute: &str, value: Option<T>) {
        if let Some(value) = value {
            self.set(attribute, value);
        }
    }

    /// Appends an instance under `name`.
    pub fn push_child(&mut self, name: &str, multiple: bool, child: Fragment) {
        let group = self.children.entry(name.to_string()).or_default();
        group.multiple |= multiple;
        group.instances.push(child);
    }

    /// `true` when the fragment renders no keys at all.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
            && self
                .children
                .values()
                .all(|group| group.instances.iter().all(Fragment::is_empty))
    }

    /// Writes flat keys below `path`.
    pub fn write_flat(&self, path: &str, out: &mut FlatComposition) {
        for (attribute, value) in &self.attrs {
            if attribute.is_empty() {
                out.insert(path.to_string(), value.clone());
            } else {
                out.insert(format!("{path}|{attribute}"), value.clone());
            }
        }
        for (name, group) in &self.children {
            let indexed = group.multiple || group.instances.len() > 1;
            for (index, child) in group.instances.iter().enumerate() {
                let child_path = if indexed {
                    format!("{path}/{name}:{index}")
                } else {
                    format!("{path}/{name}")
                };
                child.write_flat(&child_path, out);
            }
        }
    }

    /// Structured JSON for this instance: a lone bare value renders as a scalar.
    pub fn to_structured(&self) -> Value {
        if self.children.is_empty() && self.attrs.len() == 1 {
            if let Some(value) = self.attrs.get("") {
                return scalar_to_json(value);
            }
        }

        let mut object = Map::new();
        for (attribute, value) in &self.attrs {
            let key = if attribute.is_empty() {
                format!("|{}", self.bare_name.unwrap_or("value"))
            } else {
                format!("|{attribute}")
            };
            object.insert(key, scalar_to_json(value));
        }
        for (name, group) in &self.children {
            let instances = group
                .instances
                .iter()
                .filter(|child| !child.is_empty())
                .map(Fragment::to_structured)
                .collect::<Vec<_>>();
            if !instances.is_empty() {
                object.insert(name.clone(), Value::Array(instances));
            }
        }
        Value::Object(object)
    }
}

/// JSON form of a literal; non-finite decimals have no JSON number and are written as text.
pub(crate) fn scalar_to_json(value: &Scalar) -> Value {
    match value {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Integer(i) => Value::from(*i),
        Scalar::Decimal(d) => serde_json::Number::from_f64(*d)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(d.to_string())),
        Scalar::Text(s) => Value::String(s.clone()),
        Scalar::Temporal(t) => Value::String(t.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn quantity(magnitude: f64) -> Fragment {
        let mut fragment = Fragment::with_bare_name(Some("magnitude"));
        fragment.set("magnitude", magnitude);
        fragment.set("unit", "°C");
        fragment
    }

    #[test]
    fn flat_output_indexes_repeating_nodes_only() {
        let mut event_a = Fragment::new();
        event_a.push_child("temperature", false, quantity(37.5));
        let mut event_b = Fragment::new();
        event_b.push_child("temperature", false, quantity(38.0));

        let mut root = Fragment::new();
        root.push_child("any_event", true, event_a);
        root.push_child("any_event", true, event_b);

        let mut flat = FlatComposition::new();
        root.write_flat("obs", &mut flat);
        let keys: Vec<&str> = flat.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "obs/any_event:0/temperature|magnitude",
                "obs/any_event:0/temperature|unit",
                "obs/any_event:1/temperature|magnitude",
                "obs/any_event:1/temperature|unit",
            ]
        );
    }

    #[test]
    fn bare_only_fragment_is_a_structured_scalar() {
        let mut flag = Fragment::with_bare_name(Some("value"));
        flag.bare(true);
        assert_eq!(flag.to_structured(), json!(true));

        let mut parsable = Fragment::with_bare_name(Some("value"));
        parsable.bare("R1");
        parsable.set("formalism", "timing");
        assert_eq!(
            parsable.to_structured(),
            json!({"|value": "R1", "|formalism": "timing"})
        );
    }

    #[test]
    fn structured_children_are_arrays() {
        let mut root = Fragment::new();
        root.push_child("temperature", false, quantity(37.5));
        root.push_child("empty", false, Fragment::new());
        assert_eq!(
            root.to_structured(),
            json!({"temperature": [{"|magnitude": 37.5, "|unit": "°C"}]})
        );
    }
}
