//! Flat path grammar.
//!
//! ```text
//! path    := segment ("/" segment)* ["|" attribute]
//! segment := name [":" index]
//! ```
//!
//! A leading `ctx` segment addresses call-context defaults. A segment whose name starts with
//! `_` addresses a meta structure attached to the enclosing node (see [`MetaKind`]).

use crate::constants::CTX_PREFIX;
use crate::{ConversionError, ConversionResult};
use std::fmt;

/// Meta structures addressable with an underscore-prefixed segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetaKind {
    Uid,
    Provider,
    FeederAudit,
    HealthCareFacility,
    Name,
    InstructionDetails,
    Mapping,
    NullFlavour,
    NullReason,
    NormalRange,
    OtherReferenceRanges,
    Link,
    WorkFlowId,
    WfDefinition,
}

const META_NAMES: &[(MetaKind, &str)] = &[
    (MetaKind::Uid, "_uid"),
    (MetaKind::Provider, "_provider"),
    (MetaKind::FeederAudit, "_feeder_audit"),
    (MetaKind::HealthCareFacility, "_health_care_facility"),
    (MetaKind::Name, "_name"),
    (MetaKind::InstructionDetails, "_instruction_details"),
    (MetaKind::Mapping, "_mapping"),
    (MetaKind::NullFlavour, "_null_flavour"),
    (MetaKind::NullReason, "_null_reason"),
    (MetaKind::NormalRange, "_normal_range"),
    (MetaKind::OtherReferenceRanges, "_other_reference_ranges"),
    (MetaKind::Link, "_link"),
    (MetaKind::WorkFlowId, "_work_flow_id"),
    (MetaKind::WfDefinition, "_wf_definition"),
];

impl MetaKind {
    pub fn from_name(name: &str) -> Option<Self> {
        META_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(kind, _)| *kind)
    }

    pub fn name(self) -> &'static str {
        META_NAMES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, name)| *name)
            .unwrap_or("_")
    }

    /// Whether the meta structure repeats, and so is always written with an index.
    pub fn is_repeating(self) -> bool {
        matches!(
            self,
            MetaKind::Mapping | MetaKind::OtherReferenceRanges | MetaKind::Link
        )
    }
}

/// One `name[:index]` step of a flat path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<usize>,
}

impl PathSegment {
    pub fn new(name: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Instance index, `0` when omitted.
    pub fn index_or_default(&self) -> usize {
        self.index.unwrap_or(0)
    }

    pub fn is_meta(&self) -> bool {
        self.name.starts_with('_')
    }

    /// The meta structure addressed, or `None` for schema children and unknown `_` names.
    pub fn meta(&self) -> Option<MetaKind> {
        MetaKind::from_name(&self.name)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}:{}", self.name, index),
            None => f.write_str(&self.name),
        }
    }
}

/// A parsed flat path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathAddress {
    pub segments: Vec<PathSegment>,
    pub attribute: Option<String>,
}

impl PathAddress {
    /// Parses a flat path.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::PathResolution`] for an empty path, an empty segment or
    /// attribute, a non-numeric index, or an attribute separator anywhere but the last segment.
    pub fn parse(raw: &str) -> ConversionResult<Self> {
        let fail = |reason: &str| ConversionError::path_resolution(raw, reason);

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(fail("path is empty"));
        }

        let (body, attribute) = match trimmed.split_once('|') {
            Some((body, attribute)) => {
                if attribute.contains('|') || attribute.contains('/') {
                    return Err(fail("attribute must be the last element of the path"));
                }
                if attribute.trim().is_empty() {
                    return Err(fail("attribute name is empty"));
                }
                (body, Some(attribute.trim().to_string()))
            }
            None => (trimmed, None),
        };

        let mut segments = Vec::new();
        for part in body.split('/') {
            let part = part.trim();
            if part.is_empty() {
                return Err(fail("path contains an empty segment"));
            }
            let segment = match part.split_once(':') {
                Some((name, index)) => {
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(fail("segment name is empty"));
                    }
                    let index = index
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| fail(&format!("index '{index}' of '{name}' is not numeric")))?;
                    PathSegment::new(name, Some(index))
                }
                None => PathSegment::new(part, None),
            };
            segments.push(segment);
        }

        Ok(Self {
            segments,
            attribute,
        })
    }

    /// `true` for `ctx/...` paths.
    pub fn is_context(&self) -> bool {
        self.segments
            .first()
            .is_some_and(|segment| segment.name == CTX_PREFIX && segment.index.is_none())
    }

    /// For a `ctx/...` path, the context key below the prefix including any attribute,
    /// e.g. `health_care_facility|name`.
    pub fn context_key(&self) -> Option<String> {
        if !self.is_context() || self.segments.len() < 2 {
            return None;
        }
        let mut key = self.segments[1..]
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("/");
        if let Some(attribute) = &self.attribute {
            key.push('|');
            key.push_str(attribute);
        }
        Some(key)
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        if let Some(attribute) = &self.attribute {
            write!(f, "|{attribute}")?;
        }
        Ok(())
    }
}

/// Tracks the flat path of the node being visited, for error messages.
#[derive(Clone, Debug, Default)]
pub(crate) struct PathStack {
    segments: Vec<String>,
}

impl PathStack {
    pub(crate) fn push(&mut self, name: &str, index: Option<usize>) {
        match index {
            Some(index) => self.segments.push(format!("{name}:{index}")),
            None => self.segments.push(name.to_string()),
        }
    }

    pub(crate) fn pop(&mut self) {
        self.segments.pop();
    }

    pub(crate) fn current(&self) -> String {
        self.segments.join("/")
    }

    /// Current path with an attribute suffix; the bare attribute (`""`) adds nothing.
    pub(crate) fn with_attribute(&self, attribute: &str) -> String {
        if attribute.is_empty() {
            self.current()
        } else {
            format!("{}|{}", self.current(), attribute)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_indices_and_attribute() {
        let address =
            PathAddress::parse("vital_signs/body_temperature:0/any_event:1/temperature|magnitude")
                .expect("valid path");
        assert_eq!(address.segments.len(), 4);
        assert_eq!(address.segments[1], PathSegment::new("body_temperature", Some(0)));
        assert_eq!(address.segments[2].index_or_default(), 1);
        assert_eq!(address.segments[3].index, None);
        assert_eq!(address.attribute.as_deref(), Some("magnitude"));
        assert_eq!(
            address.to_string(),
            "vital_signs/body_temperature:0/any_event:1/temperature|magnitude"
        );
    }

    #[test]
    fn recognises_meta_segments() {
        let address = PathAddress::parse("a/b/_null_flavour|code").expect("valid path");
        assert_eq!(address.segments[2].meta(), Some(MetaKind::NullFlavour));
        assert!(PathSegment::new("_unknown", None).is_meta());
        assert_eq!(PathSegment::new("_unknown", None).meta(), None);
        assert!(MetaKind::Mapping.is_repeating());
        assert!(!MetaKind::Uid.is_repeating());
    }

    #[test]
    fn context_paths() {
        let address = PathAddress::parse("ctx/health_care_facility|name").expect("valid path");
        assert!(address.is_context());
        assert_eq!(address.context_key().as_deref(), Some("health_care_facility|name"));

        let address = PathAddress::parse("ctx/language").expect("valid path");
        assert_eq!(address.context_key().as_deref(), Some("language"));

        assert!(!PathAddress::parse("vital_signs/ctx").expect("valid").is_context());
    }

    #[test]
    fn rejects_malformed_paths() {
        for raw in ["", "a//b", "a/b:x", "a/b|", "a|b/c", "a/:1", "a|b|c"] {
            let err = PathAddress::parse(raw).expect_err(raw);
            assert!(
                matches!(err, ConversionError::PathResolution { .. }),
                "unexpected error for '{raw}': {err}"
            );
        }
    }

    #[test]
    fn path_stack_renders_current_path() {
        let mut stack = PathStack::default();
        stack.push("vital_signs", None);
        stack.push("body_temperature", Some(0));
        assert_eq!(stack.with_attribute("magnitude"), "vital_signs/body_temperature:0|magnitude");
        assert_eq!(stack.with_attribute(""), "vital_signs/body_temperature:0");
        stack.pop();
        assert_eq!(stack.current(), "vital_signs");
    }
}
