use crate::{ConversionError, ConversionResult};
use flatehr_types::Scalar;
use indexmap::IndexMap;
use openehr::RmType;
use std::fmt;

/// One `attribute[predicate]` step of an RM path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RmStep {
    pub attribute: String,
    pub node_id: Option<String>,
    pub name: Option<String>,
}

impl RmStep {
    pub fn new(attribute: impl Into<String>, node_id: Option<&str>) -> Self {
        Self {
            attribute: attribute.into(),
            node_id: node_id.map(str::to_string),
            name: None,
        }
    }

    fn parse(raw: &str, path: &str) -> ConversionResult<Self> {
        let invalid = |reason: &str| ConversionError::Schema(format!("path '{path}': {reason}"));

        let (attribute, predicate) = match raw.find('[') {
            Some(open) => {
                let predicate = raw[open + 1..]
                    .strip_suffix(']')
                    .ok_or_else(|| invalid("unterminated predicate"))?;
                (&raw[..open], Some(predicate))
            }
            None => (raw, None),
        };
        let attribute = attribute.trim();
        if attribute.is_empty() {
            return Err(invalid("step has no attribute"));
        }

        let mut step = RmStep::new(attribute, None);
        if let Some(predicate) = predicate {
            let (node_id, rest) = match predicate.find([',', ' ']) {
                Some(split) => (&predicate[..split], &predicate[split..]),
                None => (predicate, ""),
            };
            let node_id = node_id.trim();
            if !node_id.is_empty() {
                step.node_id = Some(node_id.to_string());
            }
            step.name = quoted(rest);
        }
        Ok(step)
    }
}

fn quoted(raw: &str) -> Option<String> {
    let start = raw.find('\'')?;
    let rest = &raw[start + 1..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

impl fmt::Display for RmStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.attribute)?;
        if let Some(node_id) = &self.node_id {
            write!(f, "[{node_id}]")?;
        }
        Ok(())
    }
}

/// Splits an RM path into steps, ignoring `/` inside predicates.
pub fn parse_rm_path(path: &str) -> ConversionResult<Vec<RmStep>> {
    split_steps(path)
        .into_iter()
        .map(|raw| RmStep::parse(raw, path))
        .collect()
}

/// Raw step strings of a path, split on `/` outside brackets and quotes.
pub(crate) fn split_steps(path: &str) -> Vec<&str> {
    let mut steps = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in path.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '[' if !quoted => depth += 1,
            ']' if !quoted => depth = depth.saturating_sub(1),
            '/' if !quoted && depth == 0 => {
                if i > start {
                    steps.push(&path[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < path.len() {
        steps.push(&path[start..]);
    }
    steps
}

/// An allowed code of a coded value set.
#[derive(Clone, Debug, PartialEq)]
pub struct CodedOption {
    pub code: String,
    pub label: String,
    pub ordinal: Option<i64>,
}

/// An allowed unit of a quantity.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitConstraint {
    pub unit: String,
    pub precision: Option<i64>,
}

/// Value-set constraints of a leaf node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueConstraint {
    pub terminology: Option<String>,
    pub codes: Vec<CodedOption>,
    /// Coded text accepts free text outside the value set.
    pub list_open: bool,
    pub units: Vec<UnitConstraint>,
    pub proportion_types: Vec<i64>,
    /// Partial dates and times are allowed.
    pub partial: bool,
    /// Value type of the bounds of a `DV_INTERVAL`.
    pub interval_of: Option<RmType>,
}

impl ValueConstraint {
    pub fn code(&self, code: &str) -> Option<&CodedOption> {
        self.codes.iter().find(|option| option.code == code)
    }

    pub fn label(&self, label: &str) -> Option<&CodedOption> {
        let label = label.trim();
        self.codes
            .iter()
            .find(|option| option.label.eq_ignore_ascii_case(label))
    }

    pub fn unit(&self, unit: &str) -> Option<&UnitConstraint> {
        self.units.iter().find(|constraint| constraint.unit == unit)
    }
}

/// One node of a compiled template.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaNode {
    /// Flat path segment.
    pub id: String,
    /// Declared name in the default language.
    pub name: String,
    pub name_constraint: Vec<CodedOption>,
    pub rm_type: RmType,
    pub node_id: Option<String>,
    pub aql_path: String,
    /// Attribute chain from the parent node.
    pub rm_path: Vec<RmStep>,
    pub min: u32,
    /// `None` is unbounded.
    pub max: Option<u32>,
    pub in_context: bool,
    pub children: Vec<SchemaNode>,
    pub constraint: ValueConstraint,
    pub fixed: Option<IndexMap<String, Scalar>>,
}

impl SchemaNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, rm_type: RmType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            name_constraint: Vec::new(),
            rm_type,
            node_id: None,
            aql_path: String::new(),
            rm_path: Vec::new(),
            min: 0,
            max: Some(1),
            in_context: false,
            children: Vec::new(),
            constraint: ValueConstraint::default(),
            fixed: None,
        }
    }

    pub fn is_multiple(&self) -> bool {
        self.max != Some(1)
    }

    pub fn child(&self, id: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|child| child.id == id)
    }

    /// First RM attribute of the path from the parent.
    pub fn attribute(&self) -> &str {
        self.rm_path
            .first()
            .map(|step| step.attribute.as_str())
            .unwrap_or_default()
    }

    /// Last RM attribute of the path from the parent.
    pub fn last_attribute(&self) -> &str {
        self.rm_path
            .last()
            .map(|step| step.attribute.as_str())
            .unwrap_or_default()
    }

    /// `true` for nodes whose node id is an archetype id.
    pub fn is_archetype_root(&self) -> bool {
        self.node_id
            .as_deref()
            .is_some_and(openehr::ArchetypeId::is_archetype_id)
    }

    /// A value node placed as an `ELEMENT` in an item list rather than an RM attribute.
    pub fn is_element_value(&self) -> bool {
        self.rm_type.is_data_value() && matches!(self.last_attribute(), "items" | "item")
    }

    /// RM attribute leaves: typed attributes of their parent object, not elements.
    pub fn is_attribute(&self) -> bool {
        self.rm_type.is_leaf() && !self.is_element_value()
    }

    /// Depth-first iterator over this node and its descendants.
    pub fn descendants(&self) -> Vec<&SchemaNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.descendants());
        }
        out
    }
}

/// A compiled template for one default language.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaTree {
    pub template_id: String,
    pub default_language: String,
    pub languages: Vec<String>,
    pub root: SchemaNode,
}

impl SchemaTree {
    pub fn find_all(&self, rm_type: RmType) -> Vec<&SchemaNode> {
        self.root
            .descendants()
            .into_iter()
            .filter(|node| node.rm_type == rm_type)
            .collect()
    }
}
