use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("sheet '{0}' is not present in the workbook")]
    MissingSheet(String),
    #[error("row {position} could not be decoded: {message}")]
    Row { position: usize, message: String },
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("invalid field declaration: {0}")]
    Schema(String),
    #[error("header not found in the first {limit} rows")]
    HeaderNotFound { limit: usize },
    #[error("possible duplicate headers found: {0}")]
    HeaderAmbiguity(String),
    #[error("cannot convert '{raw}' to {target} for field '{field}': {reason}")]
    Coercion {
        field: String,
        target: String,
        raw: String,
        reason: String,
    },
    #[error("field '{field}' of type {target} cannot be null")]
    NonNullableNull { field: String, target: String },
    #[error("sheet at index {index} not found")]
    SheetNotFound { index: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("error processing row {position}: {source}")]
    Row {
        position: usize,
        #[source]
        source: Box<ReadError>,
    },
}

/// Flat classification of a [`ReadError`], stable across row wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Schema,
    HeaderNotFound,
    HeaderAmbiguity,
    Coercion,
    NonNullableNull,
    SheetNotFound,
    InvalidConfig,
    Source,
}

impl ReadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReadError::Schema(_) => ErrorKind::Schema,
            ReadError::HeaderNotFound { .. } => ErrorKind::HeaderNotFound,
            ReadError::HeaderAmbiguity(_) => ErrorKind::HeaderAmbiguity,
            ReadError::Coercion { .. } => ErrorKind::Coercion,
            ReadError::NonNullableNull { .. } => ErrorKind::NonNullableNull,
            ReadError::SheetNotFound { .. } => ErrorKind::SheetNotFound,
            ReadError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            ReadError::Source(_) => ErrorKind::Source,
            ReadError::Row { source, .. } => source.kind(),
        }
    }

    /// Attaches the 1-based row position; already-positioned errors are kept as is.
    pub fn at_row(self, position: usize) -> Self {
        match self {
            ReadError::Row { .. } => self,
            other => ReadError::Row {
                position,
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn coercion(
        field: &str,
        target: impl fmt::Display,
        raw: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ReadError::Coercion {
            field: field.to_string(),
            target: target.to_string(),
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Schema => "schema",
            ErrorKind::HeaderNotFound => "header-not-found",
            ErrorKind::HeaderAmbiguity => "header-ambiguity",
            ErrorKind::Coercion => "coercion",
            ErrorKind::NonNullableNull => "non-nullable-null",
            ErrorKind::SheetNotFound => "sheet-not-found",
            ErrorKind::InvalidConfig => "invalid-config",
            ErrorKind::Source => "source",
        };
        f.write_str(label)
    }
}
