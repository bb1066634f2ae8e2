//! Constants used throughout the flatehr core crate.
//!
//! Engine-wide defaults applied when neither the payload, the call context nor the
//! configuration supplies a value.

/// Flat path prefix addressing call-context defaults.
pub const CTX_PREFIX: &str = "ctx";

/// Default territory when no configuration is supplied.
pub const DEFAULT_TERRITORY: &str = "US";

/// Default locale tag when no configuration is supplied.
pub const DEFAULT_LOCALE: &str = "en";

/// Instruction narrative used when none is given.
pub const DEFAULT_NARRATIVE: &str = "<none>";

/// Activity timing used when none is given.
pub const DEFAULT_TIMING: &str = "R1";

/// Formalism of the default activity timing.
pub const TIMING_FORMALISM: &str = "timing";

/// Formalism of a `DV_PARSABLE` given without one.
pub const DEFAULT_PARSABLE_FORMALISM: &str = "text/plain";

/// Character encoding of every entry.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Pattern permitting any action archetype on an activity.
pub const ANY_ACTION_ARCHETYPE: &str = "/.*/";

/// Default `ISM_TRANSITION.current_state` (completed).
pub const DEFAULT_ISM_STATE_CODE: &str = "532";

/// Default composition category (event).
pub const DEFAULT_CATEGORY_CODE: &str = "433";

/// Category of compositions that carry no event context (persistent).
pub const PERSISTENT_CATEGORY_CODE: &str = "431";

/// Default event context setting (other care).
pub const DEFAULT_SETTING_CODE: &str = "238";

/// Default interval event math function (actual).
pub const DEFAULT_MATH_FUNCTION_CODE: &str = "640";

/// Default interval event width.
pub const DEFAULT_EVENT_WIDTH: &str = "PT0S";

/// Name of a synthesized `HISTORY`.
pub const HISTORY_NAME: &str = "History";

/// Name of a synthesized `ITEM_TREE`.
pub const TREE_NAME: &str = "Tree";

/// Composition reference meaning "the composition being built".
pub const SELF_REFERENCE: &str = "self";

/// Code written for coded text given as free text on a coded-with-other node.
pub const OTHER_CODE: &str = "other";

/// Namespace of the instruction reference written on an action.
pub const LINK_NAMESPACE: &str = "local";

/// Type of the instruction reference written on an action.
pub const LINK_TYPE: &str = "INSTRUCTION";

/// Term mapping match symbol used when none is given.
pub const DEFAULT_MAPPING_MATCH: &str = "?";

/// Party reference type for subjects and composers given by id.
pub const PARTY_REF_TYPE: &str = "PERSON";

/// Party reference namespace used when the context names none.
pub const DEFAULT_PARTY_NAMESPACE: &str = "DEMOGRAPHIC";

/// Extensions tried, in order, when loading a template definition from a directory.
pub const DEFINITION_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Object reference type written for a workflow id given without one.
pub const WORKFLOW_REF_TYPE: &str = "ANY";

/// Archetype node id of synthesized structures, and of nodes declared without one.
pub const STRUCTURE_NODE_ID: &str = "at0001";
