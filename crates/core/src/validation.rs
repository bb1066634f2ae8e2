//! Structural validation contract.
//!
//! The converter never checks occurrences, required attributes or archetype rules. Those are
//! reported against a finished raw composition by a [`StructuralValidator`] the caller supplies.

use crate::schema::SchemaTree;
use openehr::Composition;
use std::fmt;

/// One structural problem found in a raw composition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationIssue {
    /// AQL-style path of the offending node.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Checks a built composition against its template.
pub trait StructuralValidator: Send + Sync {
    /// Every issue found; an empty list means the composition is valid.
    fn validate(&self, tree: &SchemaTree, composition: &Composition) -> Vec<ValidationIssue>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_display_path_first() {
        let issue = ValidationIssue::new("/content[0]", "missing mandatory node");
        assert_eq!(issue.to_string(), "/content[0]: missing mandatory node");
    }
}
