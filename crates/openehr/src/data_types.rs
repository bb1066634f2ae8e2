//! Parsed openEHR identifiers.
//!
//! Key types:
//! - [`ArchetypeId`]: parsed archetype identifier, used to recognise archetype roots in a schema
//!   and to match actions against the activities that permit them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::OpenEhrError;

/// Parsed representation of an openEHR archetype identifier.
///
/// # Canonical Form
///
/// `<authority>-<rm_package>-<RM_CLASS>.<concept>.v<version>`
///
/// Example: `openEHR-EHR-OBSERVATION.body_temperature.v2`
///
/// The concept may carry specialisation segments (`problem_diagnosis-histopathology`) and the
/// version may be a full release number (`v1.0.2`); both are preserved verbatim.
///
/// # Examples
///
/// ```rust
/// # use openehr::data_types::ArchetypeId;
/// let id = ArchetypeId::parse("openEHR-EHR-INSTRUCTION.medication_order.v3")?;
/// assert_eq!(id.rm_class, "INSTRUCTION");
/// assert_eq!(id.major_version(), 3);
/// assert_eq!(id.to_string(), "openEHR-EHR-INSTRUCTION.medication_order.v3");
/// # Ok::<(), openehr::OpenEhrError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchetypeId {
    /// Archetype authority (e.g. "openEHR")
    pub authority: String,

    /// Reference Model package (e.g. "EHR")
    pub rm_package: String,

    /// Reference Model class (e.g. "OBSERVATION", "ACTION")
    pub rm_class: String,

    /// Archetype concept (e.g. "body_temperature")
    pub concept: String,

    /// Version text following the `v` (e.g. "2" or "1.0.2")
    pub version: String,
}

impl ArchetypeId {
    fn validate_components(
        raw: &str,
        authority: &str,
        rm_package: &str,
        rm_class: &str,
        concept: &str,
        version: &str,
    ) -> Result<(), OpenEhrError> {
        if authority.is_empty() || rm_package.is_empty() || concept.is_empty() {
            return Err(OpenEhrError::InvalidArchetypeId(raw.to_string()));
        }

        if rm_class.is_empty()
            || !rm_class
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b == b'_' || b.is_ascii_digit())
        {
            return Err(OpenEhrError::InvalidArchetypeId(format!(
                "rm_class must be an upper-case RM class name, got '{}'",
                rm_class
            )));
        }

        let numeric = version
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
        if !numeric {
            return Err(OpenEhrError::InvalidArchetypeId(format!(
                "version must be numeric, got '{}'",
                version
            )));
        }

        Ok(())
    }

    /// Parses an archetype identifier string.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidArchetypeId`] if the string does not have the
    /// `<authority>-<package>-<CLASS>.<concept>.v<version>` shape.
    pub fn parse(raw: &str) -> Result<Self, OpenEhrError> {
        let (authority, rest) = raw
            .split_once('-')
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        let (rm_package, remainder) = rest
            .split_once('-')
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        let (rm_class, remainder) = remainder
            .split_once('.')
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        let (concept, version) = remainder
            .rsplit_once(".v")
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        Self::validate_components(raw, authority, rm_package, rm_class, concept, version)?;

        Ok(Self {
            authority: authority.to_string(),
            rm_package: rm_package.to_string(),
            rm_class: rm_class.to_string(),
            concept: concept.to_string(),
            version: version.to_string(),
        })
    }

    /// Returns `true` when `raw` parses as an archetype identifier.
    ///
    /// Archetype node ids (`at0004`) and free text do not.
    pub fn is_archetype_id(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    /// Major version number, `0` when the leading version part overflows.
    pub fn major_version(&self) -> u32 {
        self.version
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
            .unwrap_or(0)
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}.{}.v{}",
            self.authority, self.rm_package, self.rm_class, self.concept, self.version
        )
    }
}

impl Serialize for ArchetypeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ArchetypeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
