use std::fmt;

/// Coarse classification of a [`ConversionError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PathResolution,
    TypeCoercion,
    Vocabulary,
    LinkResolution,
    Schema,
    Payload,
    Config,
    Openehr,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::PathResolution => "path resolution",
            ErrorKind::TypeCoercion => "type coercion",
            ErrorKind::Vocabulary => "vocabulary",
            ErrorKind::LinkResolution => "link resolution",
            ErrorKind::Schema => "schema",
            ErrorKind::Payload => "payload",
            ErrorKind::Config => "config",
            ErrorKind::Openehr => "openEHR",
        };
        f.write_str(name)
    }
}

/// The single error a conversion call fails with.
///
/// Every conversion is fail-fast: the first error aborts the call and no partially built
/// document is returned.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("cannot resolve path '{path}': {reason}")]
    PathResolution { path: String, reason: String },

    #[error("cannot convert '{literal}' at '{path}' to {rm_type}: {reason}")]
    TypeCoercion {
        path: String,
        literal: String,
        rm_type: String,
        reason: String,
    },

    #[error("vocabulary error at '{path}' for '{literal}': {reason}")]
    Vocabulary {
        path: String,
        literal: String,
        reason: String,
    },

    #[error("cannot resolve instruction link at '{path}': {reason}")]
    LinkResolution { path: String, reason: String },

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("invalid payload: {0}")]
    Payload(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("openEHR error: {0}")]
    Openehr(#[from] openehr::OpenEhrError),
}

impl ConversionError {
    pub fn path_resolution(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ConversionError::PathResolution {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn type_coercion(
        path: impl Into<String>,
        literal: impl Into<String>,
        rm_type: impl fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        ConversionError::TypeCoercion {
            path: path.into(),
            literal: literal.into(),
            rm_type: rm_type.to_string(),
            reason: reason.into(),
        }
    }

    pub fn vocabulary(
        path: impl Into<String>,
        literal: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConversionError::Vocabulary {
            path: path.into(),
            literal: literal.into(),
            reason: reason.into(),
        }
    }

    pub fn link_resolution(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ConversionError::LinkResolution {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::PathResolution { .. } => ErrorKind::PathResolution,
            ConversionError::TypeCoercion { .. } => ErrorKind::TypeCoercion,
            ConversionError::Vocabulary { .. } => ErrorKind::Vocabulary,
            ConversionError::LinkResolution { .. } => ErrorKind::LinkResolution,
            ConversionError::Schema(_) => ErrorKind::Schema,
            ConversionError::Payload(_) => ErrorKind::Payload,
            ConversionError::InvalidConfig(_) => ErrorKind::Config,
            ConversionError::Openehr(_) => ErrorKind::Openehr,
        }
    }

    /// Offending payload path, for the kinds that carry one.
    pub fn path(&self) -> Option<&str> {
        match self {
            ConversionError::PathResolution { path, .. }
            | ConversionError::TypeCoercion { path, .. }
            | ConversionError::Vocabulary { path, .. }
            | ConversionError::LinkResolution { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Offending literal, for the kinds that carry one.
    pub fn literal(&self) -> Option<&str> {
        match self {
            ConversionError::TypeCoercion { literal, .. }
            | ConversionError::Vocabulary { literal, .. } => Some(literal),
            _ => None,
        }
    }
}

pub type ConversionResult<T> = std::result::Result<T, ConversionError>;
