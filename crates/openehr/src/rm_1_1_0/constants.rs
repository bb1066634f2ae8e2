//! Constants for RM 1.1.0 structures.

/// RM release written into `ARCHETYPED.rm_version`.
pub const RM_VERSION: &str = "1.1.0";

/// openEHR support terminology.
pub const TERMINOLOGY_OPENEHR: &str = "openehr";

/// Local archetype terminology.
pub const TERMINOLOGY_LOCAL: &str = "local";

/// Language code set.
pub const TERMINOLOGY_LANGUAGE: &str = "ISO_639-1";

/// Territory code set.
pub const TERMINOLOGY_TERRITORY: &str = "ISO_3166-1";

/// Character set code set.
pub const TERMINOLOGY_CHARSET: &str = "IANA_character-sets";

/// Media type code set.
pub const TERMINOLOGY_MEDIA_TYPES: &str = "IANA_media-types";

/// Normal status code set used by quantities and counts.
pub const TERMINOLOGY_NORMAL_STATUS: &str = "openehr_normal_statuses";
